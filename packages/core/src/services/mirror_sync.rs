//! Geography Mirror Sync
//!
//! Keeps one [`GeographyMirrorDocument`] per relational administrative level.
//!
//! - **Insert**: build the full mirror, create it, then re-query by
//!   `(type, administrative_id)` to learn the assigned id. If several mirrors
//!   match, the last one returned wins.
//! - **Update**: load the mirror by the stored `mirror_doc_id` and merge only
//!   truthy fields of the refreshed payload (sparse merge). A missing or stale
//!   id fails with `NotFound`; an update never creates a second mirror.
//!
//! Registered on the [`RelationalStore`] as its [`PostSaveHook`], so both
//! paths run synchronously inside the save call. There is no cross-store
//! transaction: when the mirror write fails the relational row stays saved
//! and the error goes back to the caller.

use crate::db::{
    Collection, DatabaseError, DocumentStore, HookOutcome, PostSaveHook, RelationalStore,
    SaveKind, Selector,
};
use crate::models::{
    AdministrativeLevel, AdministrativeLevelType, GeographyMirrorDocument, MIRROR_DOCUMENT_TYPE,
};
use crate::services::ServiceError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Default name of the shared mirror collection
pub const DEFAULT_MIRROR_COLLECTION: &str = "administrative_levels";

pub struct GeographyMirrorSync {
    documents: Arc<dyn DocumentStore>,
    collection_name: String,
}

/// Result of a bulk [`GeographyMirrorSync::sync_all`] run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub created: usize,
    pub refreshed: usize,
    /// Levels whose stored mirror id no longer resolves
    pub stale: Vec<i64>,
}

impl GeographyMirrorSync {
    pub fn new(documents: Arc<dyn DocumentStore>, collection_name: impl Into<String>) -> Self {
        Self {
            documents,
            collection_name: collection_name.into(),
        }
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    async fn collection(&self) -> Result<Collection, ServiceError> {
        Ok(self.documents.get_collection(&self.collection_name).await?)
    }

    /// Create the mirror for a freshly inserted level and return its id
    pub async fn create_mirror(&self, level: &AdministrativeLevel) -> Result<String, ServiceError> {
        let collection = self.collection().await?;
        let mirror = GeographyMirrorDocument::from_level(level);
        self.documents.create(&collection, mirror.to_value()).await?;

        // Read back the assigned id through the join key
        let selector = Selector::of_type(MIRROR_DOCUMENT_TYPE)
            .where_eq("administrative_id", mirror.administrative_id.as_str());
        let matches = self.documents.get_by_query(&collection, &selector).await?;
        if matches.len() > 1 {
            tracing::warn!(
                administrative_id = %mirror.administrative_id,
                count = matches.len(),
                "Several mirror documents share one administrative id, keeping the last"
            );
        }

        let mirror_doc_id = matches
            .last()
            .map(|doc| doc.id.clone())
            .ok_or_else(|| ServiceError::not_found("MirrorDocument", &mirror.administrative_id))?;

        tracing::debug!(level_id = level.id, %mirror_doc_id, "Created geography mirror");
        Ok(mirror_doc_id)
    }

    /// Sparse-merge the current values of `level` into its existing mirror
    pub async fn refresh_mirror(&self, level: &AdministrativeLevel) -> Result<(), ServiceError> {
        let mirror_doc_id = level
            .mirror_doc_id
            .as_deref()
            .ok_or_else(|| ServiceError::not_found("MirrorDocument", level.id.to_string()))?;

        let collection = self.collection().await?;
        if self.documents.get(&collection, mirror_doc_id).await?.is_none() {
            return Err(ServiceError::not_found("MirrorDocument", mirror_doc_id));
        }

        let payload = sparse_payload(GeographyMirrorDocument::update_payload(level));
        self.documents
            .update(&collection, mirror_doc_id, payload)
            .await?;

        tracing::debug!(level_id = level.id, %mirror_doc_id, "Refreshed geography mirror");
        Ok(())
    }

    /// Mirror every relational level, parents before children
    ///
    /// Levels without a mirror get one (and the id is stored back); the others
    /// are refreshed. Stale mirror ids are reported, not repaired.
    pub async fn sync_all(&self, store: &RelationalStore) -> Result<SyncSummary, ServiceError> {
        let mut summary = SyncSummary::default();

        for level_type in AdministrativeLevelType::ALL {
            let levels = store.list_administrative_levels(Some(level_type)).await?;
            tracing::info!(%level_type, count = levels.len(), "Syncing geography mirrors");

            for level in levels {
                match level.mirror_doc_id {
                    None => {
                        let mirror_doc_id = self.create_mirror(&level).await?;
                        store.set_mirror_doc_id(level.id, &mirror_doc_id).await?;
                        summary.created += 1;
                    }
                    Some(_) => match self.refresh_mirror(&level).await {
                        Ok(()) => summary.refreshed += 1,
                        Err(ServiceError::NotFound { .. }) => {
                            tracing::warn!(level_id = level.id, "Mirror id does not resolve");
                            summary.stale.push(level.id);
                        }
                        Err(e) => return Err(e),
                    },
                }
            }
        }

        tracing::info!(
            created = summary.created,
            refreshed = summary.refreshed,
            stale = summary.stale.len(),
            "Geography sync finished"
        );
        Ok(summary)
    }
}

#[async_trait]
impl PostSaveHook for GeographyMirrorSync {
    async fn after_save(
        &self,
        level: &AdministrativeLevel,
        kind: SaveKind,
    ) -> Result<HookOutcome, DatabaseError> {
        match kind {
            SaveKind::Created => Ok(HookOutcome::MirrorLinked(self.create_mirror(level).await?)),
            SaveKind::Updated => {
                self.refresh_mirror(level).await?;
                Ok(HookOutcome::Unchanged)
            }
        }
    }
}

/// Drop every field whose value is falsy
pub fn sparse_payload(payload: Map<String, Value>) -> Map<String, Value> {
    payload
        .into_iter()
        .filter(|(_, value)| is_truthy(value))
        .collect()
}

/// `null`, `false`, zero, `""` and empty arrays/objects are falsy
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDocumentStore;
    use serde_json::json;

    fn level(id: i64, mirror_doc_id: Option<&str>) -> AdministrativeLevel {
        AdministrativeLevel {
            id,
            name: "Kozah".to_string(),
            level_type: AdministrativeLevelType::Commune,
            parent_id: Some(1),
            headquarter_id: None,
            latitude: Some(9.5),
            longitude: None,
            mirror_doc_id: mirror_doc_id.map(str::to_string),
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(0.0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!("0")));
        assert!(is_truthy(&json!(-1.5)));
        assert!(is_truthy(&json!(true)));
    }

    #[test]
    fn test_sparse_payload_keeps_truthy_fields() {
        let mut payload = Map::new();
        payload.insert("name".to_string(), json!("X"));
        payload.insert("parent_id".to_string(), json!(""));
        payload.insert("latitude".to_string(), json!(null));
        payload.insert("longitude".to_string(), json!(0.0));
        let sparse = sparse_payload(payload);
        assert_eq!(Value::Object(sparse), json!({"name": "X"}));
    }

    #[tokio::test]
    async fn test_create_returns_queryable_id() {
        let documents = Arc::new(MemoryDocumentStore::new());
        let sync = GeographyMirrorSync::new(documents.clone(), DEFAULT_MIRROR_COLLECTION);

        let id = sync.create_mirror(&level(2, None)).await.unwrap();
        let collection = documents
            .get_collection(DEFAULT_MIRROR_COLLECTION)
            .await
            .unwrap();
        let doc = documents.get(&collection, &id).await.unwrap().unwrap();
        assert_eq!(doc.get_str("administrative_id"), Some("2"));
        assert_eq!(doc.get("longitude"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_refresh_without_mirror_id_is_not_found() {
        let documents = Arc::new(MemoryDocumentStore::new());
        let sync = GeographyMirrorSync::new(documents, DEFAULT_MIRROR_COLLECTION);

        assert!(sync
            .refresh_mirror(&level(2, None))
            .await
            .unwrap_err()
            .is_not_found());
        assert!(sync
            .refresh_mirror(&level(2, Some("stale")))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_refresh_skips_cleared_values() {
        let documents = Arc::new(MemoryDocumentStore::new());
        let sync = GeographyMirrorSync::new(documents.clone(), DEFAULT_MIRROR_COLLECTION);

        let id = sync.create_mirror(&level(2, None)).await.unwrap();
        let mut changed = level(2, Some(&id));
        changed.name = "Kozah Nord".to_string();
        changed.latitude = None;
        sync.refresh_mirror(&changed).await.unwrap();

        let collection = documents
            .get_collection(DEFAULT_MIRROR_COLLECTION)
            .await
            .unwrap();
        let doc = documents.get(&collection, &id).await.unwrap().unwrap();
        assert_eq!(doc.get_str("name"), Some("Kozah Nord"));
        // Cleared latitude is not propagated
        assert_eq!(doc.get("latitude"), Some(&json!(9.5)));
    }
}
