//! charity-enrich - Charity Commission data enrichment
//!
//! Users upload batches of organisation names (CSV or Excel). Each row is
//! resolved against the Charity Commission register, enriched with registry
//! data, expanded into a bounded-depth ownership tree and exported back out
//! as a multi-tab workbook.
//!
//! ## Pipeline
//! Upload -> Entities (pending) -> Resolver -> Ownership builder -> Export
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use charity_enrich::resolution::{calculate_similarity, normalize_name};
//!
//! assert_eq!(normalize_name("The Oxfam Trust Ltd."), "the oxfam");
//! assert!(calculate_similarity("OXFAM", "Oxfam Limited") > 0.95);
//! ```

// Configuration and core error handling
pub mod config;
pub mod error;

// Persistent records and their status enums
pub mod models;

// Postgres repositories
pub mod database;

// External register client
pub mod charity_commission;

// Entity resolution and batch processing
pub mod resolution;

// Recursive ownership discovery
pub mod ownership;

// Workbook and CSV export
pub mod export;

// Passwords, tokens, API keys, lockout and two-factor
pub mod auth;

// Upload validation and tabular parsing
pub mod upload;

// REST API surface (when enabled)
#[cfg(feature = "server")]
pub mod api;

pub use config::Settings;
pub use error::{ParseEnumError, RegistryError, ResolutionError, UploadError};
