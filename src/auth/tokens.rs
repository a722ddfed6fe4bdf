//! HS256 access and refresh tokens
//!
//! Every token carries the user's `token_version` (`ver`); bumping the version
//! invalidates everything issued before. Refresh tokens also carry a family id
//! (`fam`) and a unique id (`jti`) so that replaying a rotated token can be
//! detected.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::AuthError;
use crate::models::User;

pub const TOKEN_TYPE_ACCESS: &str = "access";
pub const TOKEN_TYPE_REFRESH: &str = "refresh";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: String,
    #[serde(default)]
    pub ver: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_superuser: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fam: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::InvalidToken)
    }

    pub fn is_access(&self) -> bool {
        self.token_type == TOKEN_TYPE_ACCESS
    }

    pub fn is_refresh(&self) -> bool {
        self.token_type == TOKEN_TYPE_REFRESH
    }
}

/// Response body of login and refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Signing keys and lifetimes
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKeys")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenKeys {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.jwt_secret_key.as_bytes(),
            Duration::minutes(settings.jwt_access_token_expire_minutes.max(1)),
            Duration::days(settings.jwt_refresh_token_expire_days.max(1)),
        )
    }

    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    pub fn encode_claims(&self, claims: &Claims) -> Result<String, AuthError> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding)?)
    }

    pub fn create_access_token(&self, user: &User) -> Result<String, AuthError> {
        self.encode_claims(&Claims {
            sub: user.id.to_string(),
            exp: (Utc::now() + self.access_ttl).timestamp(),
            token_type: TOKEN_TYPE_ACCESS.to_string(),
            ver: user.token_version,
            email: Some(user.email.clone()),
            is_superuser: Some(user.is_superuser),
            fam: None,
            jti: None,
        })
    }

    pub fn create_refresh_token(
        &self,
        user: &User,
        family: &str,
        jti: &str,
    ) -> Result<String, AuthError> {
        self.encode_claims(&Claims {
            sub: user.id.to_string(),
            exp: (Utc::now() + self.refresh_ttl).timestamp(),
            token_type: TOKEN_TYPE_REFRESH.to_string(),
            ver: user.token_version,
            email: None,
            is_superuser: None,
            fam: Some(family.to_string()),
            jti: Some(jti.to_string()),
        })
    }

    /// Verify signature and expiry
    pub fn decode_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }
}

/// Outcome of checking refresh claims against the stored user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshCheck {
    Valid,
    /// Issued before the last logout or password change
    Invalidated,
    /// Superseded family or jti: the token was replayed
    Reused,
}

/// Compare refresh claims with the user's current token state.
///
/// Type and activity checks are the caller's concern.
pub fn check_refresh(claims: &Claims, user: &User) -> RefreshCheck {
    if claims.ver != user.token_version {
        return RefreshCheck::Invalidated;
    }

    if let (Some(fam), Some(current)) = (&claims.fam, &user.refresh_token_family) {
        if fam != current {
            return RefreshCheck::Reused;
        }
        if let (Some(jti), Some(current_jti)) = (&claims.jti, &user.current_refresh_jti) {
            if jti != current_jti {
                return RefreshCheck::Reused;
            }
        }
    }

    RefreshCheck::Valid
}
