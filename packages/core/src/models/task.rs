//! Task and workflow documents
//!
//! Task documents are written by field agents and are loosely structured: ids
//! may arrive as numbers or strings, and optional fields are often missing.
//! Deserialization is lenient on everything except `completed`, without which
//! a task cannot be aggregated.

use crate::models::{
    is_digit_id, lenient_i64, lenient_optional_i64, loose_optional_string, loose_string,
    ValidationError,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// `type` value of task documents
pub const TASK_DOCUMENT_TYPE: &str = "task";

/// Format of `last_updated` in task documents
pub const TASK_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Task document in an agent collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDocument {
    /// Relational id of the village (or placeholder text when unassigned)
    #[serde(default, deserialize_with = "loose_string")]
    pub administrative_level_id: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub phase_name: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub activity_name: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub name: String,
    pub completed: bool,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub order: i64,
    #[serde(default, deserialize_with = "loose_optional_string")]
    pub last_updated: Option<String>,
    /// Relational id of the task definition
    #[serde(default, deserialize_with = "lenient_optional_i64")]
    pub sql_id: Option<i64>,
    /// Internal id of the phase document this task belongs to
    #[serde(default, deserialize_with = "loose_optional_string")]
    pub phase_id: Option<String>,
    /// Internal id of the activity document this task belongs to
    #[serde(default, deserialize_with = "loose_optional_string")]
    pub activity_id: Option<String>,
}

impl TaskDocument {
    /// Whether the task references a real geography id
    pub fn has_geography(&self) -> bool {
        is_digit_id(&self.administrative_level_id)
    }

    /// Parsed `last_updated`, `None` when missing or malformed
    pub fn last_updated_at(&self) -> Option<NaiveDateTime> {
        self.last_updated
            .as_deref()
            .and_then(|s| NaiveDateTime::parse_from_str(s, TASK_TIMESTAMP_FORMAT).ok())
    }

    /// Value of the workflow link field for `kind`
    pub fn workflow_link(&self, kind: WorkflowKind) -> Option<&str> {
        match kind {
            WorkflowKind::Phase => self.phase_id.as_deref(),
            WorkflowKind::Activity => self.activity_id.as_deref(),
            WorkflowKind::Task => None,
        }
    }
}

/// Workflow scope kinds usable as aggregation boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowKind {
    Phase,
    Activity,
    Task,
}

impl WorkflowKind {
    /// `type` value of the workflow document for this kind
    pub fn document_type(&self) -> &'static str {
        match self {
            Self::Phase => "phase",
            Self::Activity => "activity",
            Self::Task => TASK_DOCUMENT_TYPE,
        }
    }
}

impl FromStr for WorkflowKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "phase" => Ok(Self::Phase),
            "activity" => Ok(Self::Activity),
            "task" => Ok(Self::Task),
            other => Err(ValidationError::InvalidWorkflowKind(other.to_string())),
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.document_type())
    }
}

/// Phase or activity document in an agent collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDocument {
    #[serde(rename = "type")]
    pub document_type: String,
    #[serde(default, deserialize_with = "lenient_optional_i64")]
    pub sql_id: Option<i64>,
    #[serde(default, deserialize_with = "loose_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub order: i64,
}
