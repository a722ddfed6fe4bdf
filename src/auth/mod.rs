//! Users, tokens, API keys, login lockout and two-factor authentication

pub mod api_keys;
pub mod lockout;
pub mod password;
pub mod tokens;
pub mod two_factor;

pub use api_keys::{generate_api_key, hash_api_key, GeneratedApiKey};
pub use lockout::{FailedAttempt, LoginRateLimiter};
pub use password::{
    hash_password, hash_password_async, validate_password_strength, verify_password,
    verify_password_async,
};
pub use tokens::{check_refresh, Claims, RefreshCheck, TokenKeys, TokenPair};

use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::UserRepository;
use crate::error::AuthError;
use crate::models::User;

/// Credential checks and token lifecycle on top of the user table
pub struct AuthService {
    users: UserRepository,
    keys: TokenKeys,
}

impl AuthService {
    pub fn new(pool: PgPool, keys: TokenKeys) -> Self {
        Self {
            users: UserRepository::new(pool),
            keys,
        }
    }

    pub fn keys(&self) -> &TokenKeys {
        &self.keys
    }

    pub fn users(&self) -> &UserRepository {
        &self.users
    }

    // ========================================================================
    // Passwords
    // ========================================================================

    /// The user when the email exists and the password verifies
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>, AuthError> {
        let Some(user) = self.users.find_by_email(email).await? else {
            return Ok(None);
        };
        if verify_password_async(password.to_string(), user.hashed_password.clone()).await {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    /// Set a new password and invalidate every outstanding token
    pub async fn change_password(&self, user: &User, new_password: &str) -> Result<(), AuthError> {
        validate_password_strength(new_password)?;
        let hashed = hash_password_async(new_password.to_string()).await?;
        self.users.update_password(user.id, &hashed).await?;
        info!(user_id = %user.id, "Password changed - all tokens invalidated");
        Ok(())
    }

    // ========================================================================
    // Tokens
    // ========================================================================

    /// Issue an access/refresh pair, starting a new family when `family` is
    /// `None`, and record the family and jti as current
    pub async fn rotate_tokens(&self, user: &User, family: Option<&str>) -> Result<TokenPair, AuthError> {
        let family = family
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let jti = Uuid::new_v4().simple().to_string();

        let access_token = self.keys.create_access_token(user)?;
        let refresh_token = self.keys.create_refresh_token(user, &family, &jti)?;
        self.users.set_refresh_family(user.id, &family, &jti).await?;

        info!(
            user_id = %user.id,
            family = family.get(..8).unwrap_or(&family),
            "Token rotation completed"
        );

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in: self.keys.access_ttl_seconds(),
        })
    }

    /// Resolve refresh claims to their user.
    ///
    /// A replayed token invalidates all of the user's tokens before failing.
    pub async fn validate_refresh_token(&self, claims: &Claims) -> Result<User, AuthError> {
        if !claims.is_refresh() {
            return Err(AuthError::InvalidToken);
        }
        let user = self
            .users
            .get(claims.user_id()?)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if !user.is_active {
            return Err(AuthError::Inactive);
        }

        match check_refresh(claims, &user) {
            RefreshCheck::Valid => Ok(user),
            RefreshCheck::Invalidated => {
                warn!(
                    user_id = %user.id,
                    token_version = claims.ver,
                    user_token_version = user.token_version,
                    "Token version mismatch"
                );
                Err(AuthError::TokenInvalidated)
            }
            RefreshCheck::Reused => {
                error!(user_id = %user.id, "Refresh token reuse detected - invalidating all tokens");
                self.users.invalidate_tokens(user.id).await?;
                Err(AuthError::TokenReuse)
            }
        }
    }

    /// Active user behind a bearer access token
    pub async fn user_for_access_token(&self, token: &str) -> Result<User, AuthError> {
        let claims = self.keys.decode_token(token)?;
        if !claims.is_access() {
            return Err(AuthError::InvalidToken);
        }
        let user = self
            .users
            .get(claims.user_id()?)
            .await?
            .ok_or(AuthError::InvalidToken)?;
        if claims.ver != user.token_version {
            return Err(AuthError::TokenInvalidated);
        }
        if !user.is_active {
            return Err(AuthError::Inactive);
        }
        Ok(user)
    }

    pub async fn logout(&self, user: &User) -> Result<(), AuthError> {
        self.users.invalidate_tokens(user.id).await?;
        info!(user_id = %user.id, "User logged out - all tokens invalidated");
        Ok(())
    }

    // ========================================================================
    // API keys
    // ========================================================================

    /// Replace the user's key and return the plain value
    pub async fn issue_api_key(&self, user: &User) -> Result<String, AuthError> {
        let key = generate_api_key();
        self.users.set_api_key(user.id, &key.hash, &key.prefix).await?;
        info!(user_id = %user.id, prefix = %key.prefix, "API key generated");
        Ok(key.plain)
    }

    pub async fn revoke_api_key(&self, user: &User) -> Result<(), AuthError> {
        self.users.clear_api_key(user.id).await?;
        Ok(())
    }

    /// Active user owning `key`, if any
    pub async fn user_for_api_key(&self, key: &str) -> Result<Option<User>, AuthError> {
        let prefix = api_keys::api_key_prefix(key);
        let candidates = self.users.find_by_api_key_prefix(&prefix).await?;
        Ok(candidates.into_iter().find(|u| {
            u.is_active
                && u
                    .api_key_hash
                    .as_deref()
                    .is_some_and(|h| api_keys::verify_api_key(key, h))
        }))
    }

    // ========================================================================
    // Two-factor
    // ========================================================================

    /// Accept a TOTP code, or a backup code which is then consumed
    pub async fn verify_second_factor(&self, user: &User, code: &str) -> Result<bool, AuthError> {
        let Some(secret) = user.two_factor_secret.as_deref() else {
            return Ok(false);
        };
        if two_factor::verify_totp(secret, code) {
            return Ok(true);
        }

        if let Some(remaining) = two_factor::consume_backup_code(&user.backup_code_list(), code) {
            self.users.set_backup_codes(user.id, &remaining).await?;
            info!(
                user_id = %user.id,
                remaining = remaining.len(),
                "Backup code used"
            );
            return Ok(true);
        }
        Ok(false)
    }
}
