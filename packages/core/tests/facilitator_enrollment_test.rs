//! Integration tests for facilitator enrollment and per-agent reports
//!
//! Tests cover:
//! - Import rows parsed from JSON
//! - Repeated imports keeping assignments unique
//! - Locality listings and task reports for an enrolled agent

use anyhow::Result;
use cdd_core::config::{CddConfig, DocumentBackend};
use cdd_core::db::{DocumentStore, MemoryDocumentStore};
use cdd_core::services::{EnrollOutcome, FacilitatorImportRow, Page, TaskFilter};
use cdd_core::{AdministrativeLevelType, CddRuntime, FacilitatorRole, NewAdministrativeLevel};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

async fn create_test_env() -> Result<(CddRuntime, TempDir)> {
    let temp_dir = TempDir::new()?;
    let config = CddConfig {
        database_path: temp_dir.path().join("cdd.db"),
        document_backend: DocumentBackend::Memory,
        ..CddConfig::default()
    };
    let runtime =
        CddRuntime::with_documents(config, Arc::new(MemoryDocumentStore::new())).await?;

    let kara = runtime
        .relational
        .create_administrative_level(NewAdministrativeLevel::new(
            "Kara",
            AdministrativeLevelType::Department,
        ))
        .await?;
    let kozah = runtime
        .relational
        .create_administrative_level(
            NewAdministrativeLevel::new("Kozah", AdministrativeLevelType::Commune)
                .with_parent(kara.id),
        )
        .await?;
    for name in ["Lama", "Tchitchao"] {
        runtime
            .relational
            .create_administrative_level(
                NewAdministrativeLevel::new(name, AdministrativeLevelType::Arrondissement)
                    .with_parent(kozah.id),
            )
            .await?;
    }

    Ok((runtime, temp_dir))
}

fn import_rows() -> Result<Vec<FacilitatorImportRow>> {
    Ok(serde_json::from_value(json!([
        {
            "name": "ABALO Kossi Jean",
            "phone": "90112233",
            "sex": "Masculin",
            "role": "FC",
            "department": "Kara",
            "commune": "Kozah",
            "arrondissement": "Lama"
        },
        {
            "name": "ESSO Akossiwa",
            "sex": "Féminin",
            "role": "SC",
            "department": "Kara",
            "commune": "Kozah",
            "arrondissement": "Tchitchao"
        },
        {
            "name": "ABALO Kossi",
            "sex": "Masculin",
            "role": "FC",
            "department": "Kara",
            "commune": "Kozah",
            "arrondissement": "Tchitchao"
        }
    ]))?)
}

#[tokio::test]
async fn test_batch_import_merges_assignments() -> Result<()> {
    let (runtime, _temp_dir) = create_test_env().await?;

    let summary = runtime.facilitators.enroll_all(&import_rows()?).await?;
    assert_eq!(summary.created, 2);
    assert_eq!(summary.updated, 1);
    assert!(summary.failed.is_empty());

    let abalo = runtime
        .relational
        .get_facilitator_by_username("ABALO_Kossi")
        .await?
        .expect("enrolled");
    let (_, profile) = runtime.facilitators.profile(&abalo).await?;
    let names: Vec<&str> = profile
        .administrative_levels
        .iter()
        .map(|level| level.name.as_str())
        .collect();
    // Kara and Kozah are not repeated by the second row
    assert_eq!(names, vec!["Kara", "Kozah", "Lama", "Tchitchao"]);
    assert_eq!(profile.phone, "90112233");
    Ok(())
}

#[tokio::test]
async fn test_reimport_is_idempotent() -> Result<()> {
    let (runtime, _temp_dir) = create_test_env().await?;
    let rows = import_rows()?;
    runtime.facilitators.enroll_all(&rows).await?;

    for row in &rows {
        match runtime.facilitators.enroll(row).await? {
            EnrollOutcome::Updated { levels_added, .. } => assert_eq!(levels_added, 0),
            other => panic!("expected update, got {:?}", other),
        }
    }
    assert_eq!(runtime.relational.list_facilitators().await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_unknown_geography_name_fails_row() -> Result<()> {
    let (runtime, _temp_dir) = create_test_env().await?;
    let mut rows = import_rows()?;
    rows[1].commune = "Binah".to_string();

    let summary = runtime.facilitators.enroll_all(&rows).await?;
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, 1);
    assert!(runtime
        .relational
        .get_facilitator_by_username("ESSO_Akossiwa")
        .await?
        .is_none());
    Ok(())
}

#[tokio::test]
async fn test_enrolled_agent_task_report() -> Result<()> {
    let (runtime, _temp_dir) = create_test_env().await?;
    runtime.facilitators.enroll_all(&import_rows()?).await?;

    let abalo = runtime
        .relational
        .get_facilitator_by_username("ABALO_Kossi")
        .await?
        .expect("enrolled");
    let (_, profile) = runtime.facilitators.profile(&abalo).await?;
    let lama_id = profile.administrative_levels[2].id.clone();

    let collection = runtime
        .documents
        .get_collection(&abalo.document_db_name)
        .await?;
    for (name, order, completed) in [("Visite", 2, true), ("Réunion", 1, false)] {
        runtime
            .documents
            .create(
                &collection,
                json!({"type": "task", "name": name, "order": order, "completed": completed,
                       "administrative_level_id": lama_id}),
            )
            .await?;
    }

    let ordering = runtime.tasks.ordering_for(&abalo).await?;
    let listing = runtime
        .tasks
        .list_tasks(&abalo, &TaskFilter::default(), &ordering, Page::all())
        .await?;
    let names: Vec<&str> = listing.tasks.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["Réunion", "Visite"]);

    let breakdown = runtime
        .tasks
        .completion_by_level(&abalo, &TaskFilter::default())
        .await?;
    assert_eq!(breakdown.completion_percentage, 50.0);
    let lama = breakdown
        .levels
        .iter()
        .find(|level| level.name == "Lama")
        .expect("assigned level");
    assert_eq!(lama.total_tasks_completed, 1);
    assert_eq!(lama.total_tasks_uncompleted, 1);

    assert_eq!(runtime.facilitators.completion_for(abalo.id).await?, 50.0);
    Ok(())
}

#[tokio::test]
async fn test_diagnostics_over_enrolled_agents() -> Result<()> {
    let (runtime, _temp_dir) = create_test_env().await?;
    runtime.facilitators.enroll_all(&import_rows()?).await?;
    runtime
        .relational
        .get_or_create_facilitator("test_account", FacilitatorRole::Fc)
        .await?;

    let distribution = runtime.facilitators.completion_distribution().await?;
    assert_eq!(distribution.total_fc, 1);
    assert_eq!(distribution.total_sc, 1);
    assert_eq!(distribution.percent_le_30, 2);
    Ok(())
}
