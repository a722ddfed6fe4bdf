//! Request handlers, one module per resource

pub mod admin;
pub mod auth;
pub mod batches;
pub mod charity;
pub mod entities;
pub mod exports;
pub mod health;
pub mod two_factor;
