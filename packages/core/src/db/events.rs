//! Post-save Events for RelationalStore
//!
//! The relational store notifies an optional observer after every
//! administrative level save. The geography mirror sync is the only observer
//! in practice, but the store knows nothing about document stores: it only
//! hands the saved row to the hook and persists whatever link comes back.
//!
//! # Event Flow
//!
//! 1. RelationalStore commits an insert or update of an administrative level
//! 2. The hook runs synchronously with the saved row and the [`SaveKind`]
//! 3. If the hook reports [`HookOutcome::MirrorLinked`], the store writes the
//!    new mirror id back with a plain UPDATE (which does not fire the hook)
//! 4. Hook errors propagate to the caller of the save; the row itself stays
//!    committed

use crate::db::DatabaseError;
use crate::models::AdministrativeLevel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Whether a save inserted a new row or updated an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveKind {
    Created,
    Updated,
}

impl SaveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveKind::Created => "created",
            SaveKind::Updated => "updated",
        }
    }
}

/// What a hook did with the saved row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// Nothing to persist on the relational side
    Unchanged,
    /// A mirror document was created; its id must be stored on the row
    MirrorLinked(String),
}

/// Observer invoked after each administrative level save
#[async_trait]
pub trait PostSaveHook: Send + Sync {
    async fn after_save(
        &self,
        level: &AdministrativeLevel,
        kind: SaveKind,
    ) -> Result<HookOutcome, DatabaseError>;
}
