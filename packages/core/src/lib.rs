//! CDD Core
//!
//! Geography mirroring and task completion reporting for a community-driven
//! development (CDD) field programme.
//!
//! # Architecture
//!
//! - **Relational store** (libsql): administrative levels
//!   (département > commune > arrondissement > village) and facilitator
//!   accounts. Authoritative for geography.
//! - **Document store** (SurrealDB, or in-memory for tests): one shared mirror
//!   collection of the geography plus one private collection per facilitator
//!   holding the profile and task documents.
//! - **Mirror sync**: every relational geography save is followed by a write
//!   to the mirror, through an explicit post-save hook.
//! - **Reports**: hierarchy walks over an immutable mirror snapshot, then full
//!   scans of facilitator collections.
//!
//! # Modules
//!
//! - [`models`] - Geography, facilitator and task data structures
//! - [`db`] - Relational store, document store trait and backends
//! - [`services`] - Mirror sync, hierarchy walker, aggregation and reports
//! - [`config`] - TOML / environment configuration
//! - [`runtime`] - Wiring of stores and services

pub mod config;
pub mod db;
pub mod models;
pub mod runtime;
pub mod services;

// Re-export commonly used types
pub use config::{CddConfig, ConfigError, DocumentBackend};
pub use db::{DatabaseError, DocumentStore, RelationalStore};
pub use models::*;
pub use runtime::CddRuntime;
pub use services::*;
