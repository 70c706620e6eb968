//! SurrealDocumentStore - DocumentStore Implementation for SurrealDB Backend
//!
//! Every collection maps to one SCHEMALESS table in an embedded RocksDB
//! database. Records keep the store-assigned id next to the document body:
//!
//! ```text
//! administrative_levels:⟨0190f…⟩ = { doc_id: "0190f…", body: { type: …, … } }
//! ```
//!
//! Keeping the body in its own field leaves user fields free to use any name
//! (including `id`) without colliding with SurrealDB's record id.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cdd_core::db::{DocumentStore, Selector, SurrealDocumentStore};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SurrealDocumentStore::new(PathBuf::from("./data/documents")).await?;
//!     let mirror = store.get_collection("administrative_levels").await?;
//!     let villages = store
//!         .get_by_query(&mirror, &Selector::of_type("administrative_level"))
//!         .await?;
//!     println!("{} mirror documents", villages.len());
//!     Ok(())
//! }
//! ```

use crate::db::document_store::{into_body, merge_fields};
use crate::db::{Collection, DatabaseError, Document, DocumentStore, Selector};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use surrealdb::engine::local::{Db, RocksDb};
use surrealdb::Surreal;
use tokio::sync::Mutex;
use uuid::Uuid;

const NAMESPACE: &str = "cdd";
const DATABASE: &str = "documents";

/// Row shape of every collection table
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDocument {
    doc_id: String,
    body: Value,
}

impl TryFrom<StoredDocument> for Document {
    type Error = DatabaseError;

    fn try_from(stored: StoredDocument) -> Result<Self, Self::Error> {
        Ok(Document::new(stored.doc_id, into_body(stored.body)?))
    }
}

/// DocumentStore backed by embedded SurrealDB (RocksDB engine)
pub struct SurrealDocumentStore {
    db: Arc<Surreal<Db>>,
    /// Tables already defined by this process
    provisioned: Mutex<HashSet<String>>,
}

impl SurrealDocumentStore {
    /// Open (or create) the RocksDB directory at `db_path`
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The parent directory cannot be created
    /// - RocksDB initialization fails (e.g. the directory is locked by
    ///   another process)
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Surreal::new::<RocksDb>(db_path.clone()).await.map_err(|e| {
            DatabaseError::initialization_failed(format!(
                "Failed to open SurrealDB at {}: {}",
                db_path.display(),
                e
            ))
        })?;

        db.use_ns(NAMESPACE).use_db(DATABASE).await.map_err(|e| {
            DatabaseError::initialization_failed(format!(
                "Failed to set namespace/database: {}",
                e
            ))
        })?;

        tracing::debug!(path = %db_path.display(), "Opened document store");

        Ok(Self {
            db: Arc::new(db),
            provisioned: Mutex::new(HashSet::new()),
        })
    }

    async fn fetch(
        &self,
        collection: &Collection,
        id: &str,
    ) -> Result<Option<Document>, DatabaseError> {
        let mut response = self
            .db
            .query("SELECT doc_id, body FROM type::table($table) WHERE doc_id = $doc_id LIMIT 1;")
            .bind(("table", collection.name().to_string()))
            .bind(("doc_id", id.to_string()))
            .await?;

        let stored: Vec<StoredDocument> = response.take(0)?;
        stored.into_iter().next().map(Document::try_from).transpose()
    }
}

/// Build the WHERE clause for a validated selector; values are bound as
/// `$p0..$pN` by the caller
fn where_clause(selector: &Selector) -> String {
    if selector.is_empty() {
        return String::new();
    }
    let conditions: Vec<String> = selector
        .conditions()
        .iter()
        .enumerate()
        .map(|(i, (field, _))| format!("body.{} = $p{}", field, i))
        .collect();
    format!(" WHERE {}", conditions.join(" AND "))
}

#[async_trait]
impl DocumentStore for SurrealDocumentStore {
    async fn get_collection(&self, name: &str) -> Result<Collection, DatabaseError> {
        let collection = Collection::new(name)?;

        let mut provisioned = self.provisioned.lock().await;
        if !provisioned.contains(collection.name()) {
            // Name is validated as an identifier, so interpolation is safe
            self.db
                .query(format!(
                    "DEFINE TABLE IF NOT EXISTS {} SCHEMALESS;",
                    collection.name()
                ))
                .await?
                .check()?;
            provisioned.insert(collection.name().to_string());
            tracing::debug!(collection = %collection, "Provisioned collection");
        }

        Ok(collection)
    }

    async fn create(&self, collection: &Collection, body: Value) -> Result<String, DatabaseError> {
        let body = Value::Object(into_body(body)?);
        let id = Uuid::now_v7().simple().to_string();

        self.db
            .query("CREATE type::thing($table, $doc_id) CONTENT { doc_id: $doc_id, body: $body };")
            .bind(("table", collection.name().to_string()))
            .bind(("doc_id", id.clone()))
            .bind(("body", body))
            .await?
            .check()?;

        Ok(id)
    }

    async fn get(
        &self,
        collection: &Collection,
        id: &str,
    ) -> Result<Option<Document>, DatabaseError> {
        self.fetch(collection, id).await
    }

    async fn get_by_query(
        &self,
        collection: &Collection,
        selector: &Selector,
    ) -> Result<Vec<Document>, DatabaseError> {
        selector.validate()?;

        let sql = format!(
            "SELECT doc_id, body FROM type::table($table){} ORDER BY doc_id;",
            where_clause(selector)
        );
        let mut query = self
            .db
            .query(sql)
            .bind(("table", collection.name().to_string()));
        for (i, (_, value)) in selector.conditions().iter().enumerate() {
            query = query.bind((format!("p{}", i), value.clone()));
        }

        let mut response = query.await?;
        let stored: Vec<StoredDocument> = response.take(0)?;
        stored.into_iter().map(Document::try_from).collect()
    }

    async fn update(
        &self,
        collection: &Collection,
        id: &str,
        partial: Map<String, Value>,
    ) -> Result<(), DatabaseError> {
        let mut current = self
            .fetch(collection, id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Document", id))?;
        merge_fields(&mut current.body, partial);

        self.db
            .query("UPDATE type::table($table) SET body = $body WHERE doc_id = $doc_id;")
            .bind(("table", collection.name().to_string()))
            .bind(("doc_id", id.to_string()))
            .bind(("body", Value::Object(current.body)))
            .await?
            .check()?;

        Ok(())
    }

    async fn list_all(&self, collection: &Collection) -> Result<Vec<Document>, DatabaseError> {
        self.get_by_query(collection, &Selector::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_where_clause_binds_positionally() {
        let selector = Selector::of_type("task").where_eq("sql_id", 3);
        assert_eq!(
            where_clause(&selector),
            " WHERE body.type = $p0 AND body.sql_id = $p1"
        );
        assert_eq!(where_clause(&Selector::new()), "");
    }
}
