//! Business Services
//!
//! This module contains the reporting and synchronization services:
//!
//! - `GeographyMirrorSync` - Keeps the document-store geography mirror in step
//!   with relational saves (registered as the post-save hook)
//! - `MirrorSnapshot` - Indexed, read-only view of the mirror for hierarchy walks
//! - `CompletionAggregator` - Task completion per locality or workflow scope
//! - `FacilitatorService` - Agent enrollment, activity and diagnostics
//! - `TaskReport` - Ordered, paged task listings per agent
//!
//! Services coordinate between the two stores and never hold state across
//! requests apart from the completion cache.

pub mod completion_aggregator;
pub mod completion_cache;
pub mod error;
pub mod facilitator_service;
pub mod hierarchy;
pub mod mirror_sync;
pub mod task_report;


pub use completion_aggregator::{
    CompletionAggregator, CompletionCounts, CompletionReport, DepartmentCompletion,
    LocalityCompletion, ReportScope, WorkflowCompletion,
};
pub use completion_cache::{CacheStats, CompletionCache, DEFAULT_COMPLETION_TTL};
pub use error::ServiceError;
pub use facilitator_service::{
    CompletionDistribution, EnrollOutcome, EnrollSummary, FacilitatorImportRow,
    FacilitatorService, FacilitatorSummary, DEFAULT_EXCLUDED_USERNAME_MARKERS,
};
pub use hierarchy::MirrorSnapshot;
pub use mirror_sync::{GeographyMirrorSync, SyncSummary, DEFAULT_MIRROR_COLLECTION};
pub use task_report::{
    LevelTaskCompletion, Page, TaskCompletionBreakdown, TaskFilter, TaskListing, TaskOrdering,
    TaskReport,
};
