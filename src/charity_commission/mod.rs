//! Charity Commission register integration
//!
//! - `client`: rate-limited HTTP client with retry and offline fallback
//! - `types`: normalised register records
//! - `mock`: offline data for well-known charities

pub mod client;
pub mod mock;
pub mod types;

pub use client::CharityCommissionClient;
pub use types::{parse_charity_data, CharityDetails, CharitySummary, Subsidiary, Trustee};

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

/// The register operations resolution and ownership discovery depend on
#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// Name search, first page only
    async fn search_charities(&self, query: &str, page_size: u32) -> Result<Vec<CharitySummary>>;

    /// Record plus trustees, accounts and subsidiaries; `None` if unknown
    async fn get_full_charity_details(&self, charity_number: &str)
        -> Result<Option<CharityDetails>>;

    async fn get_charity_subsidiaries(&self, charity_number: &str) -> Result<Vec<Subsidiary>>;
}

/// Strip everything but letters and digits, uppercased
pub fn normalize_charity_number(charity_number: &str) -> String {
    charity_number
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase()
}

fn number_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // England & Wales
            Regex::new(r"(?i)\b(\d{6,8})\b").expect("valid regex"),
            // Scotland
            Regex::new(r"(?i)\b(SC\d{5,6})\b").expect("valid regex"),
            // Northern Ireland
            Regex::new(r"(?i)\b(NI\d{5,6})\b").expect("valid regex"),
        ]
    })
}

/// Find a registered charity number embedded in free text
pub fn extract_charity_number(text: &str) -> Option<String> {
    number_patterns()
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_charity_number() {
        assert_eq!(normalize_charity_number(" 220-949 "), "220949");
        assert_eq!(normalize_charity_number("sc.012345"), "SC012345");
        assert_eq!(normalize_charity_number(""), "");
    }

    #[test]
    fn test_extract_charity_number() {
        assert_eq!(
            extract_charity_number("British Red Cross (220949)").as_deref(),
            Some("220949")
        );
        assert_eq!(
            extract_charity_number("Registered in Scotland sc012345").as_deref(),
            Some("SC012345")
        );
        assert_eq!(
            extract_charity_number("NI number ni12345").as_deref(),
            Some("NI12345")
        );
        // too short, too long and glued to letters
        assert_eq!(extract_charity_number("Room 12345"), None);
        assert_eq!(extract_charity_number("Ref 123456789"), None);
        assert_eq!(extract_charity_number("ABC123456"), None);
    }

    #[test]
    fn test_digits_take_priority_over_prefixed() {
        assert_eq!(
            extract_charity_number("SC012345 and 1089464").as_deref(),
            Some("1089464")
        );
    }
}
