//! Hierarchy Walker
//!
//! Walks the geography tree held in the mirror collection by following
//! `parent_id` back-references; the document store has no joins.
//!
//! # Architecture
//!
//! A [`MirrorSnapshot`] is built once per request from the full mirror
//! collection: an arena of parsed documents in scan order plus two indexes
//! (`administrative_id` and `parent_id` to arena positions). It is never
//! mutated afterwards, so every lookup within one request sees the same tree.
//!
//! Lookups return matches in scan order. Callers must not depend on that order
//! for correctness.

use crate::db::{DatabaseError, Document, DocumentStore};
use crate::models::{AdministrativeLevelType, GeographyMirrorDocument, MIRROR_DOCUMENT_TYPE};
use std::collections::HashMap;

/// Immutable, indexed view of every mirror document.
#[derive(Debug, Clone, Default)]
pub struct MirrorSnapshot {
    arena: Vec<GeographyMirrorDocument>,
    by_id: HashMap<String, Vec<usize>>,
    by_parent: HashMap<String, Vec<usize>>,
}

impl MirrorSnapshot {
    /// Parse and index `docs`, skipping anything that is not a readable mirror
    pub fn from_documents(docs: &[Document]) -> Self {
        let mut snapshot = Self::default();

        for doc in docs {
            if !doc.is_type(MIRROR_DOCUMENT_TYPE) {
                tracing::warn!(doc_id = %doc.id, doc_type = ?doc.document_type(), "Skipping non-geography document in mirror collection");
                continue;
            }
            let mirror: GeographyMirrorDocument = match doc.parse() {
                Ok(mirror) => mirror,
                Err(e) => {
                    tracing::warn!(doc_id = %doc.id, error = %e, "Skipping malformed mirror document");
                    continue;
                }
            };
            if mirror.administrative_id.is_empty() {
                tracing::warn!(doc_id = %doc.id, "Skipping mirror document without administrative id");
                continue;
            }
            snapshot.push(mirror);
        }

        tracing::debug!(documents = docs.len(), indexed = snapshot.len(), "Built mirror snapshot");
        snapshot
    }

    /// Build from already-parsed mirrors (scan order preserved)
    pub fn from_mirrors(mirrors: impl IntoIterator<Item = GeographyMirrorDocument>) -> Self {
        let mut snapshot = Self::default();
        for mirror in mirrors {
            snapshot.push(mirror);
        }
        snapshot
    }

    /// Fetch the whole mirror collection and index it
    pub async fn load(
        documents: &dyn DocumentStore,
        collection_name: &str,
    ) -> Result<Self, DatabaseError> {
        let collection = documents.get_collection(collection_name).await?;
        let docs = documents.list_all(&collection).await?;
        Ok(Self::from_documents(&docs))
    }

    fn push(&mut self, mirror: GeographyMirrorDocument) {
        let index = self.arena.len();
        self.by_id
            .entry(mirror.administrative_id.clone())
            .or_default()
            .push(index);
        if mirror.has_parent() {
            self.by_parent
                .entry(mirror.parent_id.clone())
                .or_default()
                .push(index);
        }
        self.arena.push(mirror);
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeographyMirrorDocument> {
        self.arena.iter()
    }

    fn lookup<'a>(
        &'a self,
        index: &'a HashMap<String, Vec<usize>>,
        key: &str,
        level_type: AdministrativeLevelType,
    ) -> Vec<&'a GeographyMirrorDocument> {
        index
            .get(key)
            .into_iter()
            .flatten()
            .map(|&i| &self.arena[i])
            .filter(|mirror| mirror.administrative_level == level_type)
            .collect()
    }

    /// Case-sensitive exact name match
    pub fn find_by_type_and_name(
        &self,
        level_type: AdministrativeLevelType,
        name: &str,
    ) -> Vec<&GeographyMirrorDocument> {
        self.arena
            .iter()
            .filter(|mirror| mirror.administrative_level == level_type && mirror.name == name)
            .collect()
    }

    pub fn find_by_type_and_administrative_id(
        &self,
        level_type: AdministrativeLevelType,
        administrative_id: &str,
    ) -> Vec<&GeographyMirrorDocument> {
        self.lookup(&self.by_id, administrative_id, level_type)
    }

    pub fn find_by_type_and_parent_id(
        &self,
        level_type: AdministrativeLevelType,
        parent_id: &str,
    ) -> Vec<&GeographyMirrorDocument> {
        self.lookup(&self.by_parent, parent_id, level_type)
    }

    /// Children of `parent_id`, but only if a document of `parent_type` exists
    /// under that id
    pub fn find_by_type_and_parent_id_including_parent(
        &self,
        level_type: AdministrativeLevelType,
        parent_type: AdministrativeLevelType,
        parent_id: &str,
    ) -> Vec<&GeographyMirrorDocument> {
        if self
            .find_by_type_and_administrative_id(parent_type, parent_id)
            .is_empty()
        {
            return Vec::new();
        }
        self.find_by_type_and_parent_id(level_type, parent_id)
    }

    /// Every village below (or equal to) the node `(level_type, administrative_id)`
    ///
    /// Walks one level per step. The requested id is resolved once, at its own
    /// level; every later step only uses the nodes carried over from the
    /// previous one as parents. An id that does not exist at `level_type`
    /// expands to nothing, even if another level uses the same id.
    pub fn expand_to_villages(
        &self,
        level_type: AdministrativeLevelType,
        administrative_id: &str,
    ) -> Vec<&GeographyMirrorDocument> {
        let mut current_type = level_type;
        let mut held = self.find_by_type_and_administrative_id(current_type, administrative_id);

        loop {
            if held.is_empty() {
                return held;
            }

            let Some(child_type) = current_type.child() else {
                return held;
            };

            let mut children = Vec::new();
            for parent in &held {
                children.extend(self.find_by_type_and_parent_id_including_parent(
                    child_type,
                    current_type,
                    &parent.administrative_id,
                ));
            }

            tracing::trace!(
                from = %current_type,
                to = %child_type,
                parents = held.len(),
                children = children.len(),
                "Expanded hierarchy level"
            );
            current_type = child_type;
            held = children;
        }
    }

    /// Owning department of any node, found by walking parent ids upward
    ///
    /// Returns `None` for unknown ids, dangling parents and cycles.
    pub fn department_of(&self, administrative_id: &str) -> Option<&GeographyMirrorDocument> {
        let mut current = self
            .find_by_type_and_administrative_id(AdministrativeLevelType::Village, administrative_id)
            .into_iter()
            .next()
            .or_else(|| self.first_with_id(administrative_id))?;

        for _ in 0..AdministrativeLevelType::ALL.len() {
            if current.administrative_level == AdministrativeLevelType::Department {
                return Some(current);
            }
            if !current.has_parent() {
                return None;
            }
            let expected = current.administrative_level.parent()?;
            let parent_id = current.parent_id.as_str();
            current = self
                .find_by_type_and_administrative_id(expected, parent_id)
                .into_iter()
                .next()
                .or_else(|| self.first_with_id(parent_id))?;
        }

        None
    }

    /// All departments, scan order
    pub fn departments(&self) -> Vec<&GeographyMirrorDocument> {
        self.arena
            .iter()
            .filter(|mirror| mirror.administrative_level == AdministrativeLevelType::Department)
            .collect()
    }

    fn first_with_id(&self, administrative_id: &str) -> Option<&GeographyMirrorDocument> {
        self.by_id
            .get(administrative_id)
            .and_then(|indexes| indexes.first())
            .map(|&i| &self.arena[i])
    }
}
