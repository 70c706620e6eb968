//! Database Layer
//!
//! This module handles all interactions with the two backing stores:
//!
//! - [`RelationalStore`] - libsql tables for administrative levels and
//!   facilitator accounts (source of truth for geography and users)
//! - [`DocumentStore`] - schemaless per-entity collections (source of truth for
//!   field activity), with an embedded SurrealDB backend and an in-memory one
//!
//! # Architecture
//!
//! There are no transactions across the two stores. The relational store
//! notifies a [`PostSaveHook`] after each geography save, and the hook keeps
//! the document mirror up to date on a best-effort basis.

pub mod database;
mod document_store;
mod error;
pub mod events;
mod memory_store;
mod surreal_store;

pub use database::RelationalStore;
pub use document_store::{Collection, Document, DocumentStore, Selector};
pub use error::DatabaseError;
pub use events::{HookOutcome, PostSaveHook, SaveKind};
pub use memory_store::MemoryDocumentStore;
pub use surreal_store::SurrealDocumentStore;
