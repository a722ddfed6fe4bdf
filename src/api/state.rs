//! Shared application state

use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;

use crate::auth::{AuthService, LoginRateLimiter, TokenKeys};
use crate::charity_commission::{CharityCommissionClient, RegistrySource};
use crate::config::Settings;
use crate::database::{
    AuditRepository, BatchRepository, EnrichmentStore, EntityRepository, PgStore, UserRepository,
};
use crate::export::ExportService;
use crate::ownership::OwnershipBuilder;
use crate::resolution::{BatchProcessor, EntityResolver};

/// Handles shared by every request. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub settings: Arc<Settings>,
    pub registry: Arc<dyn RegistrySource>,
    pub store: Arc<dyn EnrichmentStore>,
    pub auth: Arc<AuthService>,
    pub limiter: Arc<LoginRateLimiter>,
}

impl AppState {
    /// State backed by the live register client
    pub fn new(pool: PgPool, settings: Settings) -> Result<Self> {
        let registry = Arc::new(CharityCommissionClient::from_settings(&settings)?);
        Ok(Self::with_registry(pool, settings, registry))
    }

    pub fn with_registry(
        pool: PgPool,
        settings: Settings,
        registry: Arc<dyn RegistrySource>,
    ) -> Self {
        let limiter = LoginRateLimiter::new(settings.login_max_attempts, settings.lockout_window());
        let auth = AuthService::new(pool.clone(), TokenKeys::from_settings(&settings));

        Self {
            store: Arc::new(PgStore::new(pool.clone())),
            pool,
            settings: Arc::new(settings),
            registry,
            auth: Arc::new(auth),
            limiter: Arc::new(limiter),
        }
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone())
    }

    pub fn batches(&self) -> BatchRepository {
        BatchRepository::new(self.pool.clone())
    }

    pub fn entities(&self) -> EntityRepository {
        EntityRepository::new(self.pool.clone())
    }

    pub fn audit(&self) -> AuditRepository {
        AuditRepository::new(self.pool.clone())
    }

    pub fn exports(&self) -> ExportService {
        ExportService::new(self.pool.clone())
    }

    pub fn resolver(&self) -> EntityResolver {
        EntityResolver::new(self.store.clone(), self.registry.clone())
    }

    pub fn processor(&self) -> BatchProcessor {
        BatchProcessor::new(self.store.clone(), self.registry.clone())
    }

    pub fn ownership(&self) -> OwnershipBuilder {
        OwnershipBuilder::new(self.store.clone(), self.registry.clone())
    }
}
