//! MemoryDocumentStore - in-process DocumentStore backend
//!
//! Keeps every collection in a `Vec` behind a tokio `RwLock`, preserving
//! creation order. Used for tests and ephemeral runs; nothing is persisted.

use crate::db::document_store::{into_body, merge_fields};
use crate::db::{Collection, DatabaseError, Document, DocumentStore, Selector};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection (0 if it was never provisioned)
    pub async fn len(&self, collection: &Collection) -> usize {
        self.collections
            .read()
            .await
            .get(collection.name())
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn missing_collection(collection: &Collection) -> DatabaseError {
        DatabaseError::not_found("Collection", collection.name())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_collection(&self, name: &str) -> Result<Collection, DatabaseError> {
        let collection = Collection::new(name)?;
        self.collections
            .write()
            .await
            .entry(collection.name().to_string())
            .or_default();
        Ok(collection)
    }

    async fn create(&self, collection: &Collection, body: Value) -> Result<String, DatabaseError> {
        let body = into_body(body)?;
        let id = Uuid::now_v7().simple().to_string();

        let mut collections = self.collections.write().await;
        let docs = collections
            .get_mut(collection.name())
            .ok_or_else(|| Self::missing_collection(collection))?;
        docs.push(Document::new(id.clone(), body));
        Ok(id)
    }

    async fn get(
        &self,
        collection: &Collection,
        id: &str,
    ) -> Result<Option<Document>, DatabaseError> {
        let collections = self.collections.read().await;
        let docs = collections
            .get(collection.name())
            .ok_or_else(|| Self::missing_collection(collection))?;
        Ok(docs.iter().find(|doc| doc.id == id).cloned())
    }

    async fn get_by_query(
        &self,
        collection: &Collection,
        selector: &Selector,
    ) -> Result<Vec<Document>, DatabaseError> {
        selector.validate()?;
        let collections = self.collections.read().await;
        let docs = collections
            .get(collection.name())
            .ok_or_else(|| Self::missing_collection(collection))?;
        Ok(docs
            .iter()
            .filter(|doc| selector.matches(&doc.body))
            .cloned()
            .collect())
    }

    async fn update(
        &self,
        collection: &Collection,
        id: &str,
        partial: Map<String, Value>,
    ) -> Result<(), DatabaseError> {
        let mut collections = self.collections.write().await;
        let docs = collections
            .get_mut(collection.name())
            .ok_or_else(|| Self::missing_collection(collection))?;
        let doc = docs
            .iter_mut()
            .find(|doc| doc.id == id)
            .ok_or_else(|| DatabaseError::not_found("Document", id))?;
        merge_fields(&mut doc.body, partial);
        Ok(())
    }

    async fn list_all(&self, collection: &Collection) -> Result<Vec<Document>, DatabaseError> {
        let collections = self.collections.read().await;
        let docs = collections
            .get(collection.name())
            .ok_or_else(|| Self::missing_collection(collection))?;
        Ok(docs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_query_update_roundtrip() {
        let store = MemoryDocumentStore::new();
        let collection = store.get_collection("administrative_levels").await.unwrap();

        let id = store
            .create(&collection, json!({"type": "administrative_level", "name": "Kara"}))
            .await
            .unwrap();
        store
            .create(&collection, json!({"type": "facilitator", "name": "Other"}))
            .await
            .unwrap();

        let found = store
            .get_by_query(&collection, &Selector::of_type("administrative_level"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);

        let mut partial = Map::new();
        partial.insert("latitude".to_string(), json!(9.5));
        store.update(&collection, &id, partial).await.unwrap();

        let doc = store.get(&collection, &id).await.unwrap().unwrap();
        assert_eq!(doc.get_str("name"), Some("Kara"));
        assert_eq!(doc.get("latitude"), Some(&json!(9.5)));
    }

    #[tokio::test]
    async fn test_get_collection_is_idempotent() {
        let store = MemoryDocumentStore::new();
        let first = store.get_collection("facilitator_a").await.unwrap();
        store.create(&first, json!({"type": "task"})).await.unwrap();

        let second = store.get_collection("facilitator_a").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.len(&second).await, 1);
    }

    #[tokio::test]
    async fn test_update_missing_document_is_not_found() {
        let store = MemoryDocumentStore::new();
        let collection = store.get_collection("administrative_levels").await.unwrap();
        let err = store
            .update(&collection, "nope", Map::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_all_preserves_creation_order() {
        let store = MemoryDocumentStore::new();
        let collection = store.get_collection("facilitator_b").await.unwrap();
        for order in 0..5 {
            store
                .create(&collection, json!({"type": "task", "order": order}))
                .await
                .unwrap();
        }
        let orders: Vec<i64> = store
            .list_all(&collection)
            .await
            .unwrap()
            .iter()
            .filter_map(|doc| doc.get("order").and_then(Value::as_i64))
            .collect();
        assert_eq!(orders, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_non_object_body_is_rejected() {
        let store = MemoryDocumentStore::new();
        let collection = store.get_collection("facilitator_c").await.unwrap();
        assert!(store.create(&collection, json!([1, 2])).await.is_err());
    }
}
