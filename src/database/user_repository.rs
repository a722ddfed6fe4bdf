//! User accounts and their credential state

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::User;

const USER_COLUMNS: &str = r#"
    id, email, hashed_password, full_name, organization,
    is_active, is_superuser, is_verified,
    api_key_hash, api_key_prefix, api_key_created_at,
    token_version, refresh_token_family, current_refresh_jti,
    two_factor_enabled, two_factor_secret, backup_codes,
    created_at, updated_at, last_login_at
"#;

/// Fields needed to create an account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub hashed_password: String,
    pub full_name: Option<String>,
    pub organization: Option<String>,
    pub is_superuser: bool,
}

pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ==========================================
    // LOOKUP
    // ==========================================

    pub async fn get(&self, user_id: Uuid) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user")
    }

    /// Case-insensitive email lookup
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        sqlx::query_as::<_, User>(&sql)
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by email")
    }

    /// Users whose API key starts with `prefix`; the caller verifies the hash
    pub async fn find_by_api_key_prefix(&self, prefix: &str) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE api_key_prefix = $1 AND api_key_hash IS NOT NULL",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(prefix)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch users by API key prefix")
    }

    pub async fn list(&self) -> Result<Vec<User>> {
        let sql = format!("SELECT {} FROM users ORDER BY created_at", USER_COLUMNS);
        sqlx::query_as::<_, User>(&sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list users")
    }

    // ==========================================
    // ACCOUNT
    // ==========================================

    pub async fn create(&self, new_user: NewUser) -> Result<User> {
        let sql = format!(
            r#"
            INSERT INTO users (id, email, hashed_password, full_name, organization, is_superuser)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(new_user.email.trim().to_lowercase())
            .bind(&new_user.hashed_password)
            .bind(&new_user.full_name)
            .bind(&new_user.organization)
            .bind(new_user.is_superuser)
            .fetch_one(&self.pool)
            .await
            .context("Failed to create user")?;

        info!(user_id = %user.id, email = %user.email, "Created user");
        Ok(user)
    }

    /// Update name and organisation; `None` keeps the stored value
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        full_name: Option<String>,
        organization: Option<String>,
    ) -> Result<User> {
        let sql = format!(
            r#"
            UPDATE users
            SET full_name = COALESCE($2, full_name),
                organization = COALESCE($3, organization),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .bind(full_name)
            .bind(organization)
            .fetch_one(&self.pool)
            .await
            .context("Failed to update user profile")
    }

    /// Store a new password hash and invalidate every issued token
    pub async fn update_password(&self, user_id: Uuid, hashed_password: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET hashed_password = $2,
                token_version = token_version + 1,
                refresh_token_family = NULL,
                current_refresh_jti = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(hashed_password)
        .execute(&self.pool)
        .await
        .context("Failed to update password")?;
        Ok(())
    }

    pub async fn touch_last_login(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to update last login")?;
        Ok(())
    }

    /// Flip `is_superuser` by email. Returns false if no such user.
    pub async fn set_superuser(&self, email: &str, is_superuser: bool) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET is_superuser = $2, updated_at = NOW() WHERE email = $1",
        )
        .bind(email.trim().to_lowercase())
        .bind(is_superuser)
        .execute(&self.pool)
        .await
        .context("Failed to update superuser flag")?;
        Ok(result.rows_affected() > 0)
    }

    /// Flip `is_active` by email. Returns false if no such user.
    pub async fn set_active(&self, email: &str, is_active: bool) -> Result<bool> {
        let result =
            sqlx::query("UPDATE users SET is_active = $2, updated_at = NOW() WHERE email = $1")
                .bind(email.trim().to_lowercase())
                .bind(is_active)
                .execute(&self.pool)
                .await
                .context("Failed to update active flag")?;
        Ok(result.rows_affected() > 0)
    }

    // ==========================================
    // TOKENS
    // ==========================================

    /// Record the refresh token family and the jti of the latest refresh token
    pub async fn set_refresh_family(&self, user_id: Uuid, family: &str, jti: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET refresh_token_family = $2, current_refresh_jti = $3
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(family)
        .bind(jti)
        .execute(&self.pool)
        .await
        .context("Failed to store refresh token family")?;
        Ok(())
    }

    /// Bump `token_version` so every outstanding token stops validating
    pub async fn invalidate_tokens(&self, user_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET token_version = token_version + 1,
                refresh_token_family = NULL,
                current_refresh_jti = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("Failed to invalidate tokens")?;
        Ok(())
    }

    // ==========================================
    // API KEYS
    // ==========================================

    pub async fn set_api_key(&self, user_id: Uuid, key_hash: &str, prefix: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET api_key_hash = $2, api_key_prefix = $3, api_key_created_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(key_hash)
        .bind(prefix)
        .execute(&self.pool)
        .await
        .context("Failed to store API key")?;
        Ok(())
    }

    pub async fn clear_api_key(&self, user_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET api_key_hash = NULL, api_key_prefix = NULL, api_key_created_at = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("Failed to revoke API key")?;
        Ok(())
    }

    // ==========================================
    // TWO-FACTOR
    // ==========================================

    /// Store a pending secret and backup codes without enabling 2FA
    pub async fn store_two_factor_setup(
        &self,
        user_id: Uuid,
        secret: &str,
        backup_codes: &[String],
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET two_factor_secret = $2, backup_codes = $3, two_factor_enabled = FALSE, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(secret)
        .bind(serde_json::to_string(backup_codes)?)
        .execute(&self.pool)
        .await
        .context("Failed to store two-factor setup")?;
        Ok(())
    }

    pub async fn enable_two_factor(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET two_factor_enabled = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to enable two-factor")?;
        Ok(())
    }

    pub async fn disable_two_factor(&self, user_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET two_factor_enabled = FALSE, two_factor_secret = NULL, backup_codes = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("Failed to disable two-factor")?;
        Ok(())
    }

    /// Replace the remaining backup codes (after one is consumed)
    pub async fn set_backup_codes(&self, user_id: Uuid, backup_codes: &[String]) -> Result<()> {
        sqlx::query("UPDATE users SET backup_codes = $2 WHERE id = $1")
            .bind(user_id)
            .bind(serde_json::to_string(backup_codes)?)
            .execute(&self.pool)
            .await
            .context("Failed to update backup codes")?;
        Ok(())
    }
}
