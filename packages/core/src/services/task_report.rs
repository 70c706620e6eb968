//! Task Report
//!
//! Per-agent task listing and completion breakdown.
//!
//! Tasks are filtered in the document store, then ordered in memory by
//! `(phase order, activity order, task order)`. Phase and activity orders come
//! from name-keyed maps; a name missing from its map sorts as `0`.

use crate::db::{Collection, Document, DocumentStore, Selector};
use crate::models::{
    Facilitator, FacilitatorProfileDocument, TaskDocument, WorkflowDocument, WorkflowKind,
    PROFILE_DOCUMENT_TYPE, TASK_DOCUMENT_TYPE,
};
use crate::services::completion_aggregator::{completion_percentage, parse_tasks};
use crate::services::ServiceError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Optional exact-match filters on task documents
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TaskFilter {
    pub administrative_level_id: Option<String>,
    pub phase_name: Option<String>,
    pub activity_name: Option<String>,
    pub task_name: Option<String>,
}

impl TaskFilter {
    /// Store-side conditions. `administrative_level_id` is stored as a string
    /// or a number, so it is checked by [`TaskFilter::matches_geography`] after
    /// parsing instead.
    pub fn selector(&self) -> Selector {
        let mut selector = Selector::of_type(TASK_DOCUMENT_TYPE);
        let fields = [
            ("phase_name", &self.phase_name),
            ("activity_name", &self.activity_name),
            ("name", &self.task_name),
        ];
        for (field, value) in fields {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                selector = selector.where_eq(field, value);
            }
        }
        selector
    }

    pub fn matches_geography(&self, task: &TaskDocument) -> bool {
        match self.administrative_level_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => task.administrative_level_id == id,
            _ => true,
        }
    }
}

/// Phase and activity name to order maps
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOrdering {
    pub phases: HashMap<String, i64>,
    pub activities: HashMap<String, i64>,
}

impl TaskOrdering {
    /// Build the maps from phase and activity documents; other types are ignored
    pub fn from_workflow_documents<'a>(docs: impl IntoIterator<Item = &'a WorkflowDocument>) -> Self {
        let mut ordering = Self::default();
        for doc in docs {
            if doc.document_type == WorkflowKind::Phase.document_type() {
                ordering.phases.insert(doc.name.clone(), doc.order);
            } else if doc.document_type == WorkflowKind::Activity.document_type() {
                ordering.activities.insert(doc.name.clone(), doc.order);
            }
        }
        ordering
    }

    pub fn sort_key(&self, task: &TaskDocument) -> (i64, i64, i64) {
        (
            self.phases.get(&task.phase_name).copied().unwrap_or(0),
            self.activities.get(&task.activity_name).copied().unwrap_or(0),
            task.order,
        )
    }

    /// Stable sort, so equal keys keep store order
    pub fn sort(&self, tasks: &mut [TaskDocument]) {
        tasks.sort_by_key(|task| self.sort_key(task));
    }
}

/// `offset` tasks starting at `index`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Page {
    pub index: usize,
    pub offset: usize,
}

impl Page {
    pub fn new(index: usize, offset: usize) -> Self {
        Self { index, offset }
    }

    pub fn all() -> Self {
        Self {
            index: 0,
            offset: usize::MAX,
        }
    }

    /// Out-of-range pages yield an empty slice
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items.into_iter().skip(self.index).take(self.offset).collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::all()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskListing {
    /// Matching tasks before paging
    pub total: usize,
    pub tasks: Vec<TaskDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelTaskCompletion {
    pub name: String,
    pub id: String,
    pub total_tasks_completed: u64,
    pub total_tasks_uncompleted: u64,
    pub completion_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskCompletionBreakdown {
    pub total_tasks: u64,
    pub total_tasks_completed: u64,
    pub total_tasks_uncompleted: u64,
    pub completion_percentage: f64,
    /// One entry per level assigned in the profile, in profile order
    pub levels: Vec<LevelTaskCompletion>,
}

pub struct TaskReport {
    documents: Arc<dyn DocumentStore>,
}

impl TaskReport {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }

    async fn collection_of(&self, facilitator: &Facilitator) -> Result<Collection, ServiceError> {
        Ok(self
            .documents
            .get_collection(&facilitator.document_db_name)
            .await?)
    }

    async fn filtered_tasks(
        &self,
        facilitator: &Facilitator,
        filter: &TaskFilter,
    ) -> Result<Vec<TaskDocument>, ServiceError> {
        let collection = self.collection_of(facilitator).await?;
        let docs = self
            .documents
            .get_by_query(&collection, &filter.selector())
            .await?;
        let mut tasks = parse_tasks(&docs);
        tasks.retain(|task| filter.matches_geography(task));
        Ok(tasks)
    }

    /// Order maps built from the agent's own phase and activity documents
    pub async fn ordering_for(&self, facilitator: &Facilitator) -> Result<TaskOrdering, ServiceError> {
        let collection = self.collection_of(facilitator).await?;
        let mut workflow = Vec::new();
        for kind in [WorkflowKind::Phase, WorkflowKind::Activity] {
            let docs = self
                .documents
                .get_by_query(&collection, &Selector::of_type(kind.document_type()))
                .await?;
            workflow.extend(parse_workflow(&docs));
        }
        Ok(TaskOrdering::from_workflow_documents(&workflow))
    }

    pub async fn list_tasks(
        &self,
        facilitator: &Facilitator,
        filter: &TaskFilter,
        ordering: &TaskOrdering,
        page: Page,
    ) -> Result<TaskListing, ServiceError> {
        let mut tasks = self.filtered_tasks(facilitator, filter).await?;
        ordering.sort(&mut tasks);

        let total = tasks.len();
        let tasks = page.apply(tasks);
        tracing::debug!(username = %facilitator.username, total, returned = tasks.len(), "Listed tasks");
        Ok(TaskListing { total, tasks })
    }

    /// Totals over the filtered tasks, then per assigned level
    ///
    /// A task belongs to a level when its `administrative_level_id` equals the
    /// level's id as a string.
    pub async fn completion_by_level(
        &self,
        facilitator: &Facilitator,
        filter: &TaskFilter,
    ) -> Result<TaskCompletionBreakdown, ServiceError> {
        let profile = self.profile(facilitator).await?;
        let tasks = self.filtered_tasks(facilitator, filter).await?;

        let completed = tasks.iter().filter(|task| task.completed).count() as u64;
        let total = tasks.len() as u64;

        let levels = profile
            .administrative_levels
            .iter()
            .map(|level| {
                let (done, open) = tasks
                    .iter()
                    .filter(|task| task.administrative_level_id == level.id)
                    .fold((0u64, 0u64), |(done, open), task| {
                        if task.completed {
                            (done + 1, open)
                        } else {
                            (done, open + 1)
                        }
                    });
                LevelTaskCompletion {
                    name: level.name.clone(),
                    id: level.id.clone(),
                    total_tasks_completed: done,
                    total_tasks_uncompleted: open,
                    completion_percentage: completion_percentage(done, done + open),
                }
            })
            .collect();

        Ok(TaskCompletionBreakdown {
            total_tasks: total,
            total_tasks_completed: completed,
            total_tasks_uncompleted: total - completed,
            completion_percentage: completion_percentage(completed, total),
            levels,
        })
    }

    async fn profile(
        &self,
        facilitator: &Facilitator,
    ) -> Result<FacilitatorProfileDocument, ServiceError> {
        let collection = self.collection_of(facilitator).await?;
        let doc = self
            .documents
            .get_by_query(&collection, &Selector::of_type(PROFILE_DOCUMENT_TYPE))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::not_found("FacilitatorProfile", &facilitator.username))?;
        doc.parse()
            .map_err(|e| ServiceError::StoreUnavailable(crate::db::DatabaseError::Serialization(e)))
    }
}

fn parse_workflow(docs: &[Document]) -> Vec<WorkflowDocument> {
    docs.iter()
        .filter_map(|doc| match doc.parse::<WorkflowDocument>() {
            Ok(workflow) => Some(workflow),
            Err(e) => {
                tracing::warn!(doc_id = %doc.id, error = %e, "Skipping malformed workflow document");
                None
            }
        })
        .collect()
}
