//! Password policy and bcrypt hashing

use anyhow::Context;

use crate::error::AuthError;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;
pub const SPECIAL_CHARACTERS: &str = "!@#$%^&*()_+-=[]{}|;:',.<>?/\\`~";

/// Reject passwords that do not meet the complexity rules
pub fn validate_password_strength(password: &str) -> Result<(), AuthError> {
    let weak = |msg: &str| Err(AuthError::WeakPassword(msg.to_string()));
    let len = password.chars().count();

    if len < MIN_PASSWORD_LEN {
        return weak("Password must be at least 8 characters long");
    }
    if len > MAX_PASSWORD_LEN {
        return weak("Password must be at most 128 characters long");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return weak("Password must contain at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return weak("Password must contain at least one lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return weak("Password must contain at least one digit");
    }
    if !password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
        return weak("Password must contain at least one special character");
    }
    Ok(())
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

/// False for a mismatch or a malformed hash
pub fn verify_password(password: &str, hashed: &str) -> bool {
    bcrypt::verify(password, hashed).unwrap_or(false)
}

/// `hash_password` off the async executor
pub async fn hash_password_async(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("Password hashing task panicked")?
}

pub async fn verify_password_async(password: String, hashed: String) -> bool {
    tokio::task::spawn_blocking(move || verify_password(&password, &hashed))
        .await
        .unwrap_or(false)
}
