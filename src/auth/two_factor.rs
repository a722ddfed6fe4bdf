//! TOTP two-factor authentication and single-use backup codes

use rand::RngCore;
use serde::Serialize;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::AuthError;

pub const TOTP_ISSUER: &str = "Charity Commission Data Enrichment";
pub const TOTP_DIGITS: usize = 6;
pub const TOTP_SKEW: u8 = 1;
pub const TOTP_STEP_SECS: u64 = 30;
pub const BACKUP_CODE_COUNT: usize = 10;

/// Material handed to the user when 2FA is being set up
#[derive(Debug, Clone, Serialize)]
pub struct TwoFactorSetup {
    pub secret: String,
    pub otpauth_uri: String,
    pub backup_codes: Vec<String>,
}

/// Random base32 secret
pub fn generate_secret() -> String {
    Secret::generate_secret().to_encoded().to_string()
}

/// 8 uppercase hex characters each
pub fn generate_backup_codes(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let mut bytes = [0u8; 4];
            rng.fill_bytes(&mut bytes);
            hex::encode_upper(bytes)
        })
        .collect()
}

fn totp(secret: &str, account: &str) -> Result<TOTP, AuthError> {
    let bytes = Secret::Encoded(secret.to_string())
        .to_bytes()
        .map_err(|e| AuthError::TwoFactor(format!("invalid secret: {:?}", e)))?;

    TOTP::new(
        Algorithm::SHA1,
        TOTP_DIGITS,
        TOTP_SKEW,
        TOTP_STEP_SECS,
        bytes,
        Some(TOTP_ISSUER.to_string()),
        account.to_string(),
    )
    .map_err(|e| AuthError::TwoFactor(e.to_string()))
}

/// otpauth:// provisioning URI for authenticator apps
pub fn provisioning_uri(secret: &str, email: &str) -> Result<String, AuthError> {
    Ok(totp(secret, email)?.get_url())
}

pub fn setup(email: &str) -> Result<TwoFactorSetup, AuthError> {
    let secret = generate_secret();
    Ok(TwoFactorSetup {
        otpauth_uri: provisioning_uri(&secret, email)?,
        backup_codes: generate_backup_codes(BACKUP_CODE_COUNT),
        secret,
    })
}

/// Check a 6-digit code against the current step, one step either side
pub fn verify_totp(secret: &str, code: &str) -> bool {
    let code = code.trim();
    if code.len() != TOTP_DIGITS || !code.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    match totp(secret, "verify") {
        Ok(totp) => totp.check_current(code).unwrap_or(false),
        Err(_) => false,
    }
}

/// Consume `provided` from `codes` if present.
///
/// Returns the remaining codes on success.
pub fn consume_backup_code(codes: &[String], provided: &str) -> Option<Vec<String>> {
    let provided = provided.trim().to_uppercase();
    let position = codes.iter().position(|c| *c == provided)?;
    let mut remaining = codes.to_vec();
    remaining.remove(position);
    Some(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn test_backup_codes_shape() {
        let codes = generate_backup_codes(BACKUP_CODE_COUNT);
        assert_eq!(codes.len(), 10);
        for code in &codes {
            assert_eq!(code.len(), 8);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        }
    }

    #[test]
    fn test_backup_code_is_single_use() {
        let codes = vec!["ABCD1234".to_string(), "DEADBEEF".to_string()];
        let remaining = consume_backup_code(&codes, " deadbeef ").unwrap();
        assert_eq!(remaining, vec!["ABCD1234".to_string()]);
        assert!(consume_backup_code(&remaining, "DEADBEEF").is_none());
    }

    #[test]
    fn test_setup_uri() {
        let setup = setup("analyst@example.org").unwrap();
        assert!(setup.otpauth_uri.starts_with("otpauth://totp/"));
        assert!(setup.otpauth_uri.contains(&setup.secret));
        assert!(setup.otpauth_uri.contains("issuer=Charity"));
        assert_eq!(setup.backup_codes.len(), BACKUP_CODE_COUNT);
    }

    #[test]
    fn test_verify_current_and_adjacent_codes() {
        let secret = generate_secret();
        let totp = totp(&secret, "t").unwrap();
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();

        assert!(verify_totp(&secret, &totp.generate(now)));
        assert!(verify_totp(&secret, &totp.generate(now - TOTP_STEP_SECS)));
        assert!(!verify_totp(&secret, &totp.generate(now - 10 * TOTP_STEP_SECS)));
        assert!(!verify_totp(&secret, "12345"));
        assert!(!verify_totp(&secret, "abcdef"));
        assert!(!verify_totp("not base32!", "123456"));
    }
}
