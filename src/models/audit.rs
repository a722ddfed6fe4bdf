//! Audit trail records

use serde_json::Value;
use uuid::Uuid;

use super::text_enum;

text_enum! {
    /// Security-relevant action recorded in `audit_logs`
    AuditAction, "audit action" {
        Register => "register",
        Login => "login",
        Logout => "logout",
        PasswordChange => "password_change",
        ApiKeyCreate => "api_key_create",
        ApiKeyRevoke => "api_key_revoke",
        TwoFactorEnable => "two_factor_enable",
        TwoFactorDisable => "two_factor_disable",
        BatchUpload => "batch_upload",
        BatchProcess => "batch_process",
        BatchDelete => "batch_delete",
        EntityResolve => "entity_resolve",
        EntityConfirm => "entity_confirm",
        EntityReject => "entity_reject",
        OwnershipBuild => "ownership_build",
        Export => "export",
        ApiCall => "api_call",
        Error => "error",
    }
}

/// Audit entry under construction
#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub description: Option<String>,
    pub details: Option<Value>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl NewAuditLog {
    pub fn new(action: AuditAction) -> Self {
        Self {
            user_id: None,
            action,
            resource_type: None,
            resource_id: None,
            ip_address: None,
            user_agent: None,
            endpoint: None,
            method: None,
            description: None,
            details: None,
            success: true,
            error_message: None,
        }
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn resource(mut self, kind: &str, id: impl ToString) -> Self {
        self.resource_type = Some(kind.to_string());
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn request(
        mut self,
        method: &str,
        endpoint: &str,
        ip: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        self.method = Some(method.to_string());
        self.endpoint = Some(endpoint.to_string());
        self.ip_address = ip;
        self.user_agent = user_agent.map(|ua| ua.chars().take(500).collect());
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(error.into());
        self
    }
}
