//! Domain error types
//!
//! Services and repositories return `anyhow::Result` with context; the enums
//! here carry the failures callers need to branch on (HTTP status mapping,
//! mock fallback, user-facing validation messages).

use thiserror::Error;

/// Failure talking to the Charity Commission register
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Register API rejected credentials (status {0})")]
    Unauthorized(u16),

    #[error("Register API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected register response: {0}")]
    Decode(String),
}

impl RegistryError {
    /// Transport failures and 5xx responses are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            RegistryError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            RegistryError::Status { status, .. } => *status >= 500 || *status == 429,
            RegistryError::Unauthorized(_) | RegistryError::Decode(_) => false,
        }
    }
}

/// Rejections raised while validating or parsing an uploaded file
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("File type '{extension}' not allowed. Allowed types: {allowed}")]
    InvalidExtension { extension: String, allowed: String },

    #[error("File too large. Maximum size is {max_mb}MB")]
    TooLarge { max_mb: usize },

    #[error("Uploaded file is empty")]
    Empty,

    #[error("File content does not match its extension: {0}")]
    ContentMismatch(String),

    #[error("File contains potentially dangerous content: {0}")]
    DangerousContent(String),

    #[error("Column '{column}' not found. Available columns: {}", available.join(", "))]
    MissingColumn {
        column: String,
        available: Vec<String>,
    },

    #[error("Could not parse file: {0}")]
    Parse(String),
}

/// Authentication and credential failures
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Token has been invalidated")]
    TokenInvalidated,

    #[error("Token reuse detected - all sessions invalidated")]
    TokenReuse,

    #[error("User account is inactive")]
    Inactive,

    #[error("{0}")]
    WeakPassword(String),

    #[error("Two-factor error: {0}")]
    TwoFactor(String),

    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Token encoding failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failures of manual confirmation and re-resolution callers map to HTTP statuses
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("Entity {0} not found")]
    EntityNotFound(uuid::Uuid),

    #[error("Resolution candidate {0} not found")]
    CandidateNotFound(uuid::Uuid),

    #[error("Charity {0} not found in the register")]
    CharityNotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A stored text value did not match any variant of a status/type enum
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {kind}: '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
