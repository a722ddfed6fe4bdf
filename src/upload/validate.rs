//! Upload checks run before any parsing: extension, size, signature, content

use tracing::{info, warn};

use crate::error::UploadError;

pub const XLSX_MAGIC: &[u8] = b"PK\x03\x04";
pub const XLS_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

const DANGEROUS_PATTERNS: [&str; 6] = [
    "<script",
    "javascript:",
    "vbscript:",
    "onclick=",
    "onerror=",
    "onload=",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Xlsx,
    Xls,
}

impl FileKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            ".csv" => Some(FileKind::Csv),
            ".xlsx" => Some(FileKind::Xlsx),
            ".xls" => Some(FileKind::Xls),
            _ => None,
        }
    }

    fn magic(&self) -> Option<&'static [u8]> {
        match self {
            FileKind::Csv => None,
            FileKind::Xlsx => Some(XLSX_MAGIC),
            FileKind::Xls => Some(XLS_MAGIC),
        }
    }
}

/// Lowercased extension including the dot, empty when there is none
pub fn file_extension(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((_, ext)) => format!(".{}", ext.to_lowercase()),
        None => String::new(),
    }
}

/// Validate an uploaded file and return its kind.
///
/// Checks run in order: extension, size, emptiness, signature, and for CSV
/// binary or script content.
pub fn validate_upload(
    filename: &str,
    content: &[u8],
    allowed_extensions: &[String],
    max_bytes: usize,
) -> Result<FileKind, UploadError> {
    let extension = file_extension(filename);
    let kind = allowed_extensions
        .iter()
        .any(|a| a.eq_ignore_ascii_case(&extension))
        .then(|| FileKind::from_extension(&extension))
        .flatten()
        .ok_or_else(|| UploadError::InvalidExtension {
            extension: extension.clone(),
            allowed: allowed_extensions.join(", "),
        })?;

    if content.len() > max_bytes {
        return Err(UploadError::TooLarge {
            max_mb: max_bytes / (1024 * 1024),
        });
    }

    if content.is_empty() {
        return Err(UploadError::Empty);
    }

    match kind.magic() {
        Some(magic) if !content.starts_with(magic) => {
            warn!(
                filename = filename,
                expected = %hex::encode(magic),
                actual = %hex::encode(&content[..content.len().min(magic.len())]),
                "File magic bytes mismatch"
            );
            return Err(UploadError::ContentMismatch(format!(
                "expected {} signature",
                extension
            )));
        }
        Some(_) => {}
        None => validate_csv_content(content)?,
    }

    info!(filename = filename, size_bytes = content.len(), "File validation passed");
    Ok(kind)
}

fn validate_csv_content(content: &[u8]) -> Result<(), UploadError> {
    if content.contains(&0) {
        return Err(UploadError::DangerousContent("binary content".into()));
    }

    let lower = content.to_ascii_lowercase();
    for pattern in DANGEROUS_PATTERNS {
        if lower
            .windows(pattern.len())
            .any(|w| w == pattern.as_bytes())
        {
            warn!(pattern = pattern, "Dangerous pattern found in CSV");
            return Err(UploadError::DangerousContent(pattern.to_string()));
        }
    }
    Ok(())
}
