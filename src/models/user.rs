//! Platform users and their credential state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Full user row, secrets included. Never serialized directly.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub hashed_password: String,
    pub full_name: Option<String>,
    pub organization: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_verified: bool,

    // API key (sha256 of the key plus a short lookup prefix)
    pub api_key_hash: Option<String>,
    pub api_key_prefix: Option<String>,
    pub api_key_created_at: Option<DateTime<Utc>>,

    // Token rotation
    pub token_version: i32,
    pub refresh_token_family: Option<String>,
    pub current_refresh_jti: Option<String>,

    // Two-factor
    pub two_factor_enabled: bool,
    pub two_factor_secret: Option<String>,
    pub backup_codes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Remaining single-use backup codes
    pub fn backup_code_list(&self) -> Vec<String> {
        self.backup_codes
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
            .unwrap_or_default()
    }
}

/// Public view of a user returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub organization: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_verified: bool,
    pub two_factor_enabled: bool,
    pub has_api_key: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            organization: user.organization.clone(),
            is_active: user.is_active,
            is_superuser: user.is_superuser,
            is_verified: user.is_verified,
            two_factor_enabled: user.two_factor_enabled,
            has_api_key: user.api_key_hash.is_some(),
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}
