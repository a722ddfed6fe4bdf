//! Validation and parsing of uploaded entity lists

pub mod parse;
pub mod validate;

pub use parse::{build_entities, parse_table, ParsedTable, UploadRow};
pub use validate::{file_extension, validate_upload, FileKind};

use crate::error::UploadError;

pub const DEFAULT_NAME_COLUMN: &str = "name";

/// Validate, parse and extract the named rows of one upload
pub fn read_upload(
    filename: &str,
    content: &[u8],
    name_column: &str,
    allowed_extensions: &[String],
    max_bytes: usize,
) -> Result<Vec<UploadRow>, UploadError> {
    let kind = validate_upload(filename, content, allowed_extensions, max_bytes)?;
    parse_table(kind, content)?.entity_rows(name_column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_upload() {
        let allowed = vec![".csv".to_string()];
        let rows = read_upload(
            "charities.csv",
            b"Charity Name,Notes\nOxfam,\nBritish Red Cross,big\n",
            "Charity Name",
            &allowed,
            1024,
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].name, "British Red Cross");

        assert!(matches!(
            read_upload("charities.csv", b"a,b\n1,2\n", "name", &allowed, 1024),
            Err(UploadError::MissingColumn { .. })
        ));
    }
}
