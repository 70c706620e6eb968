//! Completion Aggregator
//!
//! Task completion statistics for a reporting scope, computed by scanning
//! the collection of every reporting facilitator.
//!
//! # Scope Shapes
//!
//! - **Locality** (`département`, `commune`, `arrondissement`, `village`):
//!   the scope is expanded to its villages and a task counts when its
//!   `administrative_level_id` is a digit id of one of those villages.
//!   Tasks without a digit id are dropped before any lookup.
//! - **Workflow** (`phase`, `activity`, `task`): tasks are matched through
//!   the workflow link and bucketed per owning department. A task with a
//!   digit id counts its facilitator even when the department cannot be
//!   resolved; tasks without a digit id are tallied as unassigned.
//!
//! Every request loads a fresh [`MirrorSnapshot`] and performs full scans.

use crate::db::{Collection, Document, DocumentStore, RelationalStore, Selector};
use crate::models::{
    AdministrativeLevelType, Facilitator, TaskDocument, WorkflowKind, TASK_DOCUMENT_TYPE,
};
use crate::services::{MirrorSnapshot, ServiceError};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Aggregation boundary requested by a report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportScope {
    Locality {
        level_type: AdministrativeLevelType,
        administrative_id: String,
    },
    Workflow {
        kind: WorkflowKind,
        sql_id: i64,
    },
}

impl ReportScope {
    /// Parse a `(type, id)` pair as received from a report request
    ///
    /// `departement` is accepted for `département`. A blank id, an unknown
    /// type or a non-integer workflow id is a precondition failure.
    pub fn parse(scope_type: &str, id: &str) -> Result<Self, ServiceError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ServiceError::precondition("scope id must not be blank"));
        }

        if let Ok(level_type) = scope_type.parse::<AdministrativeLevelType>() {
            return Ok(Self::Locality {
                level_type,
                administrative_id: id.to_string(),
            });
        }

        if let Ok(kind) = scope_type.parse::<WorkflowKind>() {
            let sql_id = id.parse::<i64>().map_err(|_| {
                ServiceError::precondition(format!("{} id must be an integer, got '{}'", kind, id))
            })?;
            return Ok(Self::Workflow { kind, sql_id });
        }

        Err(ServiceError::precondition(format!(
            "unknown scope type '{}'",
            scope_type.trim()
        )))
    }
}

impl fmt::Display for ReportScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locality {
                level_type,
                administrative_id,
            } => write!(f, "{} {}", level_type, administrative_id),
            Self::Workflow { kind, sql_id } => write!(f, "{} {}", kind, sql_id),
        }
    }
}

/// Seen / done tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompletionCounts {
    pub tasks_seen: u64,
    pub tasks_done: u64,
}

impl CompletionCounts {
    pub fn record(&mut self, completed: bool) {
        self.tasks_seen += 1;
        if completed {
            self.tasks_done += 1;
        }
    }

    /// `done / seen * 100`, or `0` when nothing was seen
    pub fn completion_percentage(&self) -> f64 {
        completion_percentage(self.tasks_done, self.tasks_seen)
    }
}

pub fn completion_percentage(done: u64, seen: u64) -> f64 {
    if seen == 0 {
        return 0.0;
    }
    done as f64 / seen as f64 * 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalityCompletion {
    pub level_type: AdministrativeLevelType,
    pub administrative_id: String,
    pub tasks_seen: u64,
    pub tasks_done: u64,
    pub completion_percentage: f64,
    pub facilitators_in_scope: u64,
    pub villages_in_scope: usize,
    /// Name of the department owning the first village in scope
    pub department: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartmentCompletion {
    pub tasks_seen: u64,
    pub tasks_done: u64,
    pub completion_percentage: f64,
}

impl From<CompletionCounts> for DepartmentCompletion {
    fn from(counts: CompletionCounts) -> Self {
        Self {
            tasks_seen: counts.tasks_seen,
            tasks_done: counts.tasks_done,
            completion_percentage: counts.completion_percentage(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowCompletion {
    pub kind: WorkflowKind,
    pub sql_id: i64,
    /// One bucket per department of the mirror, keyed by department name
    pub departments: BTreeMap<String, DepartmentCompletion>,
    pub facilitators_in_scope: u64,
    /// Matched tasks whose geography id is not a digit string
    pub unassigned_tasks: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "search", rename_all = "snake_case")]
pub enum CompletionReport {
    Locality(LocalityCompletion),
    Workflow(WorkflowCompletion),
}

pub struct CompletionAggregator {
    relational: Arc<RelationalStore>,
    documents: Arc<dyn DocumentStore>,
    mirror_collection: String,
}

impl CompletionAggregator {
    pub fn new(
        relational: Arc<RelationalStore>,
        documents: Arc<dyn DocumentStore>,
        mirror_collection: impl Into<String>,
    ) -> Self {
        Self {
            relational,
            documents,
            mirror_collection: mirror_collection.into(),
        }
    }

    pub async fn snapshot(&self) -> Result<MirrorSnapshot, ServiceError> {
        Ok(MirrorSnapshot::load(self.documents.as_ref(), &self.mirror_collection).await?)
    }

    pub async fn report(&self, scope: &ReportScope) -> Result<CompletionReport, ServiceError> {
        match scope {
            ReportScope::Locality {
                level_type,
                administrative_id,
            } => Ok(CompletionReport::Locality(
                self.locality_completion(*level_type, administrative_id)
                    .await?,
            )),
            ReportScope::Workflow { kind, sql_id } => Ok(CompletionReport::Workflow(
                self.workflow_completion(*kind, *sql_id).await?,
            )),
        }
    }

    pub async fn locality_completion(
        &self,
        level_type: AdministrativeLevelType,
        administrative_id: &str,
    ) -> Result<LocalityCompletion, ServiceError> {
        if administrative_id.trim().is_empty() {
            return Err(ServiceError::precondition("scope id must not be blank"));
        }

        let snapshot = self.snapshot().await?;
        let villages = snapshot.expand_to_villages(level_type, administrative_id.trim());
        let village_ids: HashSet<&str> = villages
            .iter()
            .map(|village| village.administrative_id.as_str())
            .collect();

        let mut counts = CompletionCounts::default();
        let mut facilitators_in_scope = 0;

        for facilitator in self.relational.list_reporting_facilitators(None).await? {
            let collection = self.agent_collection(&facilitator).await?;
            let tasks = self
                .documents
                .get_by_query(&collection, &Selector::of_type(TASK_DOCUMENT_TYPE))
                .await?;

            let mut counted = false;
            for task in parse_tasks(&tasks) {
                if !task.has_geography()
                    || !village_ids.contains(task.administrative_level_id.as_str())
                {
                    continue;
                }
                if !counted {
                    facilitators_in_scope += 1;
                    counted = true;
                }
                counts.record(task.completed);
            }
        }

        let department = villages
            .first()
            .and_then(|village| snapshot.department_of(&village.administrative_id))
            .map(|department| department.name.clone());

        tracing::debug!(
            %level_type,
            administrative_id,
            villages = villages.len(),
            tasks_seen = counts.tasks_seen,
            "Computed locality completion"
        );

        Ok(LocalityCompletion {
            level_type,
            administrative_id: administrative_id.trim().to_string(),
            tasks_seen: counts.tasks_seen,
            tasks_done: counts.tasks_done,
            completion_percentage: counts.completion_percentage(),
            facilitators_in_scope,
            villages_in_scope: villages.len(),
            department,
        })
    }

    pub async fn workflow_completion(
        &self,
        kind: WorkflowKind,
        sql_id: i64,
    ) -> Result<WorkflowCompletion, ServiceError> {
        let snapshot = self.snapshot().await?;

        // Keyed by department name: departments sharing a name share a bucket
        let mut buckets: BTreeMap<String, CompletionCounts> = snapshot
            .departments()
            .into_iter()
            .map(|department| (department.name.clone(), CompletionCounts::default()))
            .collect();
        let mut facilitators_in_scope = 0;
        let mut unassigned_tasks = 0;

        for facilitator in self.relational.list_reporting_facilitators(None).await? {
            let collection = self.agent_collection(&facilitator).await?;
            let Some(selector) = self.task_selector(&collection, kind, sql_id).await? else {
                continue;
            };
            let tasks = self.documents.get_by_query(&collection, &selector).await?;

            let mut counted = false;
            for task in parse_tasks(&tasks) {
                if !task.has_geography() {
                    unassigned_tasks += 1;
                    continue;
                }
                if !counted {
                    facilitators_in_scope += 1;
                    counted = true;
                }
                match snapshot.department_of(&task.administrative_level_id) {
                    Some(department) => buckets
                        .entry(department.name.clone())
                        .or_default()
                        .record(task.completed),
                    None => tracing::debug!(
                        administrative_level_id = %task.administrative_level_id,
                        "Task geography has no resolvable department"
                    ),
                }
            }
        }

        Ok(WorkflowCompletion {
            kind,
            sql_id,
            departments: buckets
                .into_iter()
                .map(|(name, counts)| (name, counts.into()))
                .collect(),
            facilitators_in_scope,
            unassigned_tasks,
        })
    }

    /// Selector for the agent's tasks in a workflow scope, `None` when the
    /// agent has no workflow document for it
    async fn task_selector(
        &self,
        collection: &Collection,
        kind: WorkflowKind,
        sql_id: i64,
    ) -> Result<Option<Selector>, ServiceError> {
        let link_field = match kind {
            WorkflowKind::Phase => "phase_id",
            WorkflowKind::Activity => "activity_id",
            WorkflowKind::Task => {
                return Ok(Some(
                    Selector::of_type(TASK_DOCUMENT_TYPE).where_eq("sql_id", sql_id),
                ))
            }
        };

        let workflow_docs = self
            .documents
            .get_by_query(
                collection,
                &Selector::of_type(kind.document_type()).where_eq("sql_id", sql_id),
            )
            .await?;

        Ok(workflow_docs.first().map(|doc| {
            Selector::of_type(TASK_DOCUMENT_TYPE).where_eq(link_field, doc.id.as_str())
        }))
    }

    async fn agent_collection(&self, facilitator: &Facilitator) -> Result<Collection, ServiceError> {
        Ok(self
            .documents
            .get_collection(&facilitator.document_db_name)
            .await?)
    }
}

/// Parse task documents, skipping (and logging) those without the fields
/// aggregation needs
pub fn parse_tasks(docs: &[Document]) -> Vec<TaskDocument> {
    docs.iter()
        .filter_map(|doc| match doc.parse::<TaskDocument>() {
            Ok(task) => Some(task),
            Err(e) => {
                tracing::warn!(doc_id = %doc.id, error = %e, "Skipping malformed task document");
                None
            }
        })
        .collect()
}
