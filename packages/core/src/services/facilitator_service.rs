//! Facilitator Service
//!
//! Agent enrollment and per-agent activity views:
//!
//! - `enroll` - get-or-create the account from an import row and keep the
//!   profile's geography assignments free of duplicate `(name, id)` pairs
//! - `tasks_completion` / `cached_completion` - share of completed tasks
//! - `last_activity` / `monthly_activity` - timestamps from task documents
//! - `facilitators_in_locality` - agents assigned to villages of a locality
//! - `completion_distribution` - diagnostics over deployed agents
//!
//! The import file itself is parsed elsewhere; this service receives rows
//! that are already split into fields.

use crate::db::{Collection, Document, DocumentStore, RelationalStore, Selector};
use crate::models::{
    derive_username, AdministrativeLevelRef, AdministrativeLevelType, Facilitator,
    FacilitatorProfileDocument, FacilitatorRole, GeographyMirrorDocument, Sex,
    PROFILE_DOCUMENT_TYPE, TASK_DOCUMENT_TYPE,
};
use crate::services::completion_aggregator::{completion_percentage, parse_tasks};
use crate::services::{CompletionCache, MirrorSnapshot, ServiceError};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Usernames containing any of these are test or undeployed accounts
pub const DEFAULT_EXCLUDED_USERNAME_MARKERS: [&str; 2] = ["test", "FC_"];

/// One agent from an import file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FacilitatorImportRow {
    /// Display name; the username is derived from its first two tokens
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    /// `"Masculin"` or anything else (female)
    pub sex: String,
    pub role: FacilitatorRole,
    pub department: String,
    pub commune: String,
    pub arrondissement: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EnrollOutcome {
    Created {
        facilitator_id: i64,
        username: String,
    },
    Updated {
        facilitator_id: i64,
        username: String,
        levels_added: usize,
    },
}

impl EnrollOutcome {
    pub fn username(&self) -> &str {
        match self {
            Self::Created { username, .. } | Self::Updated { username, .. } => username,
        }
    }
}

/// Totals of a batch import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrollSummary {
    pub created: usize,
    pub updated: usize,
    /// `(row index, error message)` for rows that were not saved
    pub failed: Vec<(usize, String)>,
}

/// Agent row of a locality listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacilitatorSummary {
    pub id: i64,
    pub username: String,
    pub role: FacilitatorRole,
    pub document_db_name: String,
    pub completion_percentage: f64,
}

/// Completion buckets over deployed agents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompletionDistribution {
    pub total_fc: usize,
    pub total_sc: usize,
    pub percent_le_30: usize,
    pub percent_in_30_50: usize,
    pub percent_in_50_80: usize,
    pub percent_gt_80: usize,
    pub percent_at_100: usize,
    /// Month (`YYYY-MM`) to number of agents with activity that month
    pub active_facilitators_monthly: BTreeMap<String, usize>,
}

impl CompletionDistribution {
    /// Buckets are not exclusive: 100% counts in both `> 80` and `= 100`
    pub fn record(&mut self, percentage: f64) {
        if percentage <= 30.0 {
            self.percent_le_30 += 1;
        }
        if percentage > 30.0 && percentage <= 50.0 {
            self.percent_in_30_50 += 1;
        }
        if percentage > 50.0 && percentage <= 80.0 {
            self.percent_in_50_80 += 1;
        }
        if percentage > 80.0 {
            self.percent_gt_80 += 1;
        }
        if percentage == 100.0 {
            self.percent_at_100 += 1;
        }
    }
}

pub struct FacilitatorService {
    relational: Arc<RelationalStore>,
    documents: Arc<dyn DocumentStore>,
    mirror_collection: String,
    cache: CompletionCache,
    excluded_username_markers: Vec<String>,
}

impl FacilitatorService {
    pub fn new(
        relational: Arc<RelationalStore>,
        documents: Arc<dyn DocumentStore>,
        mirror_collection: impl Into<String>,
    ) -> Self {
        Self {
            relational,
            documents,
            mirror_collection: mirror_collection.into(),
            cache: CompletionCache::new(),
            excluded_username_markers: DEFAULT_EXCLUDED_USERNAME_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }

    pub fn with_cache(mut self, cache: CompletionCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_excluded_username_markers(mut self, markers: Vec<String>) -> Self {
        self.excluded_username_markers = markers;
        self
    }

    pub fn cache(&self) -> &CompletionCache {
        &self.cache
    }

    async fn collection_of(&self, facilitator: &Facilitator) -> Result<Collection, ServiceError> {
        Ok(self
            .documents
            .get_collection(&facilitator.document_db_name)
            .await?)
    }

    async fn find_facilitator(&self, facilitator_id: i64) -> Result<Facilitator, ServiceError> {
        self.relational
            .get_facilitator(facilitator_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Facilitator", facilitator_id.to_string()))
    }

    /// The profile document and its id
    pub async fn profile(
        &self,
        facilitator: &Facilitator,
    ) -> Result<(String, FacilitatorProfileDocument), ServiceError> {
        let collection = self.collection_of(facilitator).await?;
        let doc = self
            .documents
            .get_by_query(&collection, &Selector::of_type(PROFILE_DOCUMENT_TYPE))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::not_found("FacilitatorProfile", &facilitator.username))?;

        let profile = doc
            .parse::<FacilitatorProfileDocument>()
            .map_err(to_store_error)?;
        Ok((doc.id, profile))
    }

    async fn task_documents(&self, facilitator: &Facilitator) -> Result<Vec<Document>, ServiceError> {
        let collection = self.collection_of(facilitator).await?;
        Ok(self
            .documents
            .get_by_query(&collection, &Selector::of_type(TASK_DOCUMENT_TYPE))
            .await?)
    }

    //
    // ENROLLMENT
    //

    /// Create or update one agent from an import row
    ///
    /// Geography names are resolved against the mirror (first match per
    /// level). A new agent gets a fresh profile; an existing one only gains
    /// the `{name, id}` assignments it does not already have.
    pub async fn enroll(&self, row: &FacilitatorImportRow) -> Result<EnrollOutcome, ServiceError> {
        let snapshot =
            MirrorSnapshot::load(self.documents.as_ref(), &self.mirror_collection).await?;
        self.enroll_with_snapshot(&snapshot, row).await
    }

    /// Enroll every row against one mirror snapshot; failures are collected
    /// per row instead of aborting the batch
    pub async fn enroll_all(
        &self,
        rows: &[FacilitatorImportRow],
    ) -> Result<EnrollSummary, ServiceError> {
        let snapshot =
            MirrorSnapshot::load(self.documents.as_ref(), &self.mirror_collection).await?;
        let mut summary = EnrollSummary::default();

        for (index, row) in rows.iter().enumerate() {
            match self.enroll_with_snapshot(&snapshot, row).await {
                Ok(EnrollOutcome::Created { .. }) => summary.created += 1,
                Ok(EnrollOutcome::Updated { .. }) => summary.updated += 1,
                Err(e @ ServiceError::StoreUnavailable(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(row = index, name = %row.name, error = %e, "Import row skipped");
                    summary.failed.push((index, e.to_string()));
                }
            }
        }

        tracing::info!(
            created = summary.created,
            updated = summary.updated,
            failed = summary.failed.len(),
            "Facilitator import finished"
        );
        Ok(summary)
    }

    async fn enroll_with_snapshot(
        &self,
        snapshot: &MirrorSnapshot,
        row: &FacilitatorImportRow,
    ) -> Result<EnrollOutcome, ServiceError> {
        let username = derive_username(&row.name)?;
        let levels = [
            resolve_by_name(snapshot, AdministrativeLevelType::Department, &row.department)?,
            resolve_by_name(snapshot, AdministrativeLevelType::Commune, &row.commune)?,
            resolve_by_name(
                snapshot,
                AdministrativeLevelType::Arrondissement,
                &row.arrondissement,
            )?,
        ];

        let (facilitator, created) = self
            .relational
            .get_or_create_facilitator(&username, row.role)
            .await?;
        let collection = self.collection_of(&facilitator).await?;

        if created {
            let mut profile = FacilitatorProfileDocument::new(
                row.name.clone(),
                row.phone.clone(),
                Sex::from_label(&row.sex),
                row.role,
            );
            profile.email = row.email.clone();
            for level in levels {
                profile.add_administrative_level(level);
            }
            self.documents
                .create(&collection, serde_json::to_value(&profile).map_err(to_store_error)?)
                .await?;

            tracing::info!(%username, "Enrolled facilitator");
            return Ok(EnrollOutcome::Created {
                facilitator_id: facilitator.id,
                username,
            });
        }

        let (profile_id, mut profile) = self.profile(&facilitator).await?;
        let levels_added = levels
            .into_iter()
            .filter(|level| profile.add_administrative_level(level.clone()))
            .count();

        if levels_added > 0 {
            let mut partial = serde_json::Map::new();
            partial.insert(
                "administrative_levels".to_string(),
                serde_json::to_value(&profile.administrative_levels).map_err(to_store_error)?,
            );
            self.documents
                .update(&collection, &profile_id, partial)
                .await?;
        }

        tracing::info!(%username, levels_added, "Updated facilitator assignments");
        Ok(EnrollOutcome::Updated {
            facilitator_id: facilitator.id,
            username,
            levels_added,
        })
    }

    //
    // COMPLETION AND ACTIVITY
    //

    /// Completed share of all task documents, `0` when there are none
    pub async fn tasks_completion(&self, facilitator: &Facilitator) -> Result<f64, ServiceError> {
        let docs = self.task_documents(facilitator).await?;
        let done = docs
            .iter()
            .filter(|doc| doc.get("completed").and_then(Value::as_bool) == Some(true))
            .count();
        Ok(completion_percentage(done as u64, docs.len() as u64))
    }

    /// [`tasks_completion`](Self::tasks_completion) through the per-agent cache
    pub async fn cached_completion(&self, facilitator: &Facilitator) -> Result<f64, ServiceError> {
        self.cache
            .get_or_compute(facilitator.id, || self.tasks_completion(facilitator))
            .await
    }

    /// Cached completion looked up by account id
    pub async fn completion_for(&self, facilitator_id: i64) -> Result<f64, ServiceError> {
        let facilitator = self.find_facilitator(facilitator_id).await?;
        self.cached_completion(&facilitator).await
    }

    /// Latest parseable `last_updated` among the agent's tasks
    pub async fn last_activity(
        &self,
        facilitator: &Facilitator,
    ) -> Result<Option<NaiveDateTime>, ServiceError> {
        let docs = self.task_documents(facilitator).await?;
        Ok(parse_tasks(&docs)
            .iter()
            .filter_map(|task| task.last_updated_at())
            .max())
    }

    /// Completed tasks per month (`YYYY-MM`) of their `last_updated`
    pub async fn monthly_activity(
        &self,
        facilitator: &Facilitator,
    ) -> Result<BTreeMap<String, u64>, ServiceError> {
        let docs = self.task_documents(facilitator).await?;
        let mut months = BTreeMap::new();
        for task in parse_tasks(&docs).iter().filter(|task| task.completed) {
            if let Some(at) = task.last_updated_at() {
                *months.entry(at.format("%Y-%m").to_string()).or_insert(0) += 1;
            }
        }
        Ok(months)
    }

    //
    // LISTINGS
    //

    /// Reporting agents whose profile lists a village of the locality
    ///
    /// When `role` is given and the locality has no villages, every
    /// reporting agent of that role is returned.
    pub async fn facilitators_in_locality(
        &self,
        level_type: AdministrativeLevelType,
        administrative_id: &str,
        role: Option<FacilitatorRole>,
    ) -> Result<Vec<FacilitatorSummary>, ServiceError> {
        if administrative_id.trim().is_empty() && role.is_none() {
            return Err(ServiceError::precondition(
                "a locality id or a role is required",
            ));
        }

        let snapshot =
            MirrorSnapshot::load(self.documents.as_ref(), &self.mirror_collection).await?;
        let village_ids: HashSet<&str> = snapshot
            .expand_to_villages(level_type, administrative_id.trim())
            .into_iter()
            .map(|village| village.administrative_id.as_str())
            .collect();

        let mut results = Vec::new();
        for facilitator in self.relational.list_reporting_facilitators(role).await? {
            let in_scope = if village_ids.is_empty() {
                role.is_some()
            } else {
                match self.profile(&facilitator).await {
                    Ok((_, profile)) => profile
                        .assigned_level_ids()
                        .any(|id| village_ids.contains(id)),
                    Err(ServiceError::NotFound { .. }) => {
                        tracing::warn!(username = %facilitator.username, "Facilitator has no profile document");
                        false
                    }
                    Err(e) => return Err(e),
                }
            };

            if in_scope {
                let completion_percentage = self.cached_completion(&facilitator).await?;
                results.push(FacilitatorSummary {
                    id: facilitator.id,
                    username: facilitator.username,
                    role: facilitator.role,
                    document_db_name: facilitator.document_db_name,
                    completion_percentage,
                });
            }
        }
        Ok(results)
    }

    /// Completion buckets over every account whose username contains none of
    /// the excluded markers
    pub async fn completion_distribution(&self) -> Result<CompletionDistribution, ServiceError> {
        let mut distribution = CompletionDistribution::default();

        for facilitator in self.relational.list_facilitators().await? {
            if self.is_excluded(&facilitator.username) {
                continue;
            }
            match facilitator.role {
                FacilitatorRole::Fc => distribution.total_fc += 1,
                FacilitatorRole::Sc => distribution.total_sc += 1,
                _ => {}
            }

            distribution.record(self.tasks_completion(&facilitator).await?);

            for (month, count) in self.monthly_activity(&facilitator).await? {
                if count > 0 {
                    *distribution
                        .active_facilitators_monthly
                        .entry(month)
                        .or_insert(0) += 1;
                }
            }
        }

        Ok(distribution)
    }

    fn is_excluded(&self, username: &str) -> bool {
        let lowered = username.to_lowercase();
        self.excluded_username_markers
            .iter()
            .any(|marker| lowered.contains(&marker.to_lowercase()))
    }
}

fn resolve_by_name(
    snapshot: &MirrorSnapshot,
    level_type: AdministrativeLevelType,
    name: &str,
) -> Result<AdministrativeLevelRef, ServiceError> {
    let found: Option<&GeographyMirrorDocument> = snapshot
        .find_by_type_and_name(level_type, name.trim())
        .into_iter()
        .next();
    found
        .map(|mirror| AdministrativeLevelRef::new(mirror.name.clone(), mirror.administrative_id.clone()))
        .ok_or_else(|| ServiceError::not_found(level_type.as_str(), name))
}

fn to_store_error(err: serde_json::Error) -> ServiceError {
    ServiceError::StoreUnavailable(crate::db::DatabaseError::Serialization(err))
}
