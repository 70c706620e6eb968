//! Service wiring
//!
//! Opens both stores from a [`CddConfig`], registers the geography mirror
//! sync as the relational store's post-save hook and builds the services
//! on top of the shared handles.

use crate::config::{CddConfig, DocumentBackend};
use crate::db::{
    DatabaseError, DocumentStore, MemoryDocumentStore, RelationalStore, SurrealDocumentStore,
};
use crate::services::{
    CompletionAggregator, CompletionCache, FacilitatorService, GeographyMirrorSync, TaskReport,
};
use std::sync::Arc;

pub struct CddRuntime {
    pub config: CddConfig,
    pub relational: Arc<RelationalStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub mirror_sync: Arc<GeographyMirrorSync>,
    pub aggregator: CompletionAggregator,
    pub facilitators: FacilitatorService,
    pub tasks: TaskReport,
}

impl CddRuntime {
    pub async fn open(config: CddConfig) -> Result<Self, DatabaseError> {
        let documents: Arc<dyn DocumentStore> = match config.document_backend {
            DocumentBackend::Surreal => {
                Arc::new(SurrealDocumentStore::new(config.document_store_path.clone()).await?)
            }
            DocumentBackend::Memory => Arc::new(MemoryDocumentStore::new()),
        };
        Self::with_documents(config, documents).await
    }

    /// Wire everything around an already opened document store
    pub async fn with_documents(
        config: CddConfig,
        documents: Arc<dyn DocumentStore>,
    ) -> Result<Self, DatabaseError> {
        let mirror_sync = Arc::new(GeographyMirrorSync::new(
            documents.clone(),
            config.mirror_collection.clone(),
        ));
        let relational = Arc::new(
            RelationalStore::new(config.database_path.clone())
                .await?
                .with_post_save_hook(mirror_sync.clone()),
        );

        let aggregator = CompletionAggregator::new(
            relational.clone(),
            documents.clone(),
            config.mirror_collection.clone(),
        );
        let facilitators = FacilitatorService::new(
            relational.clone(),
            documents.clone(),
            config.mirror_collection.clone(),
        )
        .with_cache(CompletionCache::with_ttl(config.completion_cache_ttl()))
        .with_excluded_username_markers(config.excluded_username_markers.clone());
        let tasks = TaskReport::new(documents.clone());

        tracing::info!(
            database = %config.database_path.display(),
            backend = ?config.document_backend,
            mirror_collection = %config.mirror_collection,
            "CDD runtime ready"
        );

        Ok(Self {
            config,
            relational,
            documents,
            mirror_sync,
            aggregator,
            facilitators,
            tasks,
        })
    }
}
