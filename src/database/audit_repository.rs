//! Audit trail writer
//!
//! Audit writes never fail the request that triggered them: errors are
//! logged and swallowed.

use sqlx::PgPool;
use tracing::{error, warn};
use uuid::Uuid;

use crate::models::{AuditAction, NewAuditLog};

#[derive(Clone)]
pub struct AuditRepository {
    pool: PgPool,
}

impl AuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn log(&self, entry: NewAuditLog) {
        if !entry.success {
            warn!(
                action = %entry.action,
                user_id = ?entry.user_id,
                ip = ?entry.ip_address,
                error = ?entry.error_message,
                "Audited failure"
            );
        }

        let result = sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, user_id, action, resource_type, resource_id, ip_address, user_agent,
                endpoint, method, description, details, success, error_message
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.user_id)
        .bind(entry.action.as_str())
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(&entry.endpoint)
        .bind(&entry.method)
        .bind(&entry.description)
        .bind(&entry.details)
        .bind(entry.success)
        .bind(&entry.error_message)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            error!(action = %entry.action, error = %e, "Failed to write audit log");
        }
    }

    /// Shorthand for an action by a user on a resource
    pub async fn record(
        &self,
        action: AuditAction,
        user_id: Uuid,
        resource_type: &str,
        resource_id: impl ToString,
        description: impl Into<String>,
    ) {
        self.log(
            NewAuditLog::new(action)
                .user(user_id)
                .resource(resource_type, resource_id)
                .description(description),
        )
        .await
    }
}
