//! Integration tests for the geography mirror
//!
//! Tests cover:
//! - Mirror creation through the post-save hook
//! - Sparse refresh on update
//! - Stale mirror ids
//! - Bulk sync of rows saved without a hook

use anyhow::Result;
use cdd_core::db::{DocumentStore, MemoryDocumentStore, RelationalStore};
use cdd_core::services::{GeographyMirrorSync, MirrorSnapshot, DEFAULT_MIRROR_COLLECTION};
use cdd_core::{AdministrativeLevelType, NewAdministrativeLevel};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

/// Test helper: relational store with the mirror sync registered
async fn create_test_env() -> Result<(RelationalStore, Arc<MemoryDocumentStore>, TempDir)> {
    let temp_dir = TempDir::new()?;
    let documents = Arc::new(MemoryDocumentStore::new());
    let sync = Arc::new(GeographyMirrorSync::new(
        documents.clone(),
        DEFAULT_MIRROR_COLLECTION,
    ));
    let store = RelationalStore::new(temp_dir.path().join("cdd.db"))
        .await?
        .with_post_save_hook(sync);
    Ok((store, documents, temp_dir))
}

async fn mirror_body(
    documents: &MemoryDocumentStore,
    mirror_doc_id: &str,
) -> Result<serde_json::Value> {
    let collection = documents.get_collection(DEFAULT_MIRROR_COLLECTION).await?;
    let doc = documents
        .get(&collection, mirror_doc_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("mirror {} missing", mirror_doc_id))?;
    Ok(serde_json::Value::Object(doc.body))
}

// =========================================================================
// Insert Path
// =========================================================================

#[tokio::test]
async fn test_created_level_is_mirrored_and_linked() -> Result<()> {
    let (store, documents, _temp_dir) = create_test_env().await?;

    let kara = store
        .create_administrative_level(
            NewAdministrativeLevel::new("Kara", AdministrativeLevelType::Department)
                .with_coordinates(9.55, 1.19),
        )
        .await?;
    let mirror_doc_id = kara
        .mirror_doc_id
        .clone()
        .expect("hook should link the mirror");

    let body = mirror_body(&documents, &mirror_doc_id).await?;
    assert_eq!(
        body,
        json!({
            "administrative_id": kara.id.to_string(),
            "name": "Kara",
            "administrative_level": "département",
            "type": "administrative_level",
            "parent_id": "",
            "latitude": 9.55,
            "longitude": 1.19,
        })
    );

    // The link is persisted, not only returned
    let reloaded = store.get_administrative_level(kara.id).await?.unwrap();
    assert_eq!(reloaded.mirror_doc_id.as_deref(), Some(mirror_doc_id.as_str()));
    Ok(())
}

#[tokio::test]
async fn test_child_mirror_references_parent_id() -> Result<()> {
    let (store, documents, _temp_dir) = create_test_env().await?;

    let kara = store
        .create_administrative_level(NewAdministrativeLevel::new(
            "Kara",
            AdministrativeLevelType::Department,
        ))
        .await?;
    let kozah = store
        .create_administrative_level(
            NewAdministrativeLevel::new("Kozah", AdministrativeLevelType::Commune)
                .with_parent(kara.id),
        )
        .await?;

    let body = mirror_body(&documents, kozah.mirror_doc_id.as_deref().unwrap()).await?;
    assert_eq!(body["parent_id"], json!(kara.id.to_string()));

    let snapshot = MirrorSnapshot::load(documents.as_ref(), DEFAULT_MIRROR_COLLECTION).await?;
    assert_eq!(snapshot.len(), 2);
    assert_eq!(
        snapshot
            .find_by_type_and_parent_id(AdministrativeLevelType::Commune, &kara.id.to_string())
            .len(),
        1
    );
    Ok(())
}

// =========================================================================
// Update Path
// =========================================================================

#[tokio::test]
async fn test_update_refreshes_existing_mirror() -> Result<()> {
    let (store, documents, _temp_dir) = create_test_env().await?;
    let collection = documents.get_collection(DEFAULT_MIRROR_COLLECTION).await?;

    let mut level = store
        .create_administrative_level(
            NewAdministrativeLevel::new("Kozah", AdministrativeLevelType::Commune)
                .with_coordinates(9.5, 1.2),
        )
        .await?;
    let mirror_doc_id = level.mirror_doc_id.clone().unwrap();

    level.name = "Kozah Nord".to_string();
    level.latitude = None;
    store.update_administrative_level(&level).await?;

    let body = mirror_body(&documents, &mirror_doc_id).await?;
    assert_eq!(body["name"], "Kozah Nord");
    // Falsy values never overwrite
    assert_eq!(body["latitude"], json!(9.5));

    // Still exactly one mirror
    assert_eq!(documents.len(&collection).await, 1);
    Ok(())
}

#[tokio::test]
async fn test_repeated_update_is_idempotent() -> Result<()> {
    let (store, documents, _temp_dir) = create_test_env().await?;

    let level = store
        .create_administrative_level(NewAdministrativeLevel::new(
            "Lama",
            AdministrativeLevelType::Arrondissement,
        ))
        .await?;
    let mirror_doc_id = level.mirror_doc_id.clone().unwrap();

    store.update_administrative_level(&level).await?;
    let first = mirror_body(&documents, &mirror_doc_id).await?;
    store.update_administrative_level(&level).await?;
    let second = mirror_body(&documents, &mirror_doc_id).await?;

    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn test_stale_mirror_id_fails_but_keeps_row() -> Result<()> {
    let (store, _documents, _temp_dir) = create_test_env().await?;

    let mut level = store
        .create_administrative_level(NewAdministrativeLevel::new(
            "Tchitchao",
            AdministrativeLevelType::Village,
        ))
        .await?;
    store.set_mirror_doc_id(level.id, "gone").await?;
    level.mirror_doc_id = Some("gone".to_string());
    level.name = "Tchitchao Centre".to_string();

    let err = store.update_administrative_level(&level).await.unwrap_err();
    assert!(err.to_string().contains("not found"), "{}", err);

    // No rollback across stores: the relational row is updated
    let reloaded = store.get_administrative_level(level.id).await?.unwrap();
    assert_eq!(reloaded.name, "Tchitchao Centre");
    Ok(())
}

// =========================================================================
// Bulk Sync
// =========================================================================

#[tokio::test]
async fn test_sync_all_mirrors_unlinked_rows() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("cdd.db");

    // Rows written before the hook existed
    let plain = RelationalStore::new(db_path.clone()).await?;
    let kara = plain
        .create_administrative_level(NewAdministrativeLevel::new(
            "Kara",
            AdministrativeLevelType::Department,
        ))
        .await?;
    plain
        .create_administrative_level(
            NewAdministrativeLevel::new("Kozah", AdministrativeLevelType::Commune)
                .with_parent(kara.id),
        )
        .await?;
    assert!(kara.mirror_doc_id.is_none());

    let documents = Arc::new(MemoryDocumentStore::new());
    let sync = GeographyMirrorSync::new(documents.clone(), DEFAULT_MIRROR_COLLECTION);

    let summary = sync.sync_all(&plain).await?;
    assert_eq!(summary.created, 2);
    assert_eq!(summary.refreshed, 0);
    assert!(summary.stale.is_empty());

    let levels = plain.list_administrative_levels(None).await?;
    assert!(levels.iter().all(|level| level.mirror_doc_id.is_some()));

    // Second run refreshes instead of duplicating
    let summary = sync.sync_all(&plain).await?;
    assert_eq!(summary.created, 0);
    assert_eq!(summary.refreshed, 2);

    let collection = documents.get_collection(DEFAULT_MIRROR_COLLECTION).await?;
    assert_eq!(documents.len(&collection).await, 2);
    Ok(())
}

#[tokio::test]
async fn test_sync_all_reports_stale_ids() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = RelationalStore::new(temp_dir.path().join("cdd.db")).await?;
    let level = store
        .create_administrative_level(NewAdministrativeLevel::new(
            "Kara",
            AdministrativeLevelType::Department,
        ))
        .await?;
    store.set_mirror_doc_id(level.id, "missing").await?;

    let sync = GeographyMirrorSync::new(
        Arc::new(MemoryDocumentStore::new()),
        DEFAULT_MIRROR_COLLECTION,
    );
    let summary = sync.sync_all(&store).await?;
    assert_eq!(summary.stale, vec![level.id]);
    Ok(())
}
