//! Relational Store
//!
//! libsql (embedded SQLite) persistence for the authoritative records:
//! administrative levels and facilitator accounts.
//!
//! # Architecture
//!
//! - **Source of truth**: geography and accounts live here; the document store
//!   only holds mirrors
//! - **WAL mode**: Write-Ahead Logging for better concurrency
//! - **Post-save hook**: every administrative level save runs the registered
//!   [`PostSaveHook`] synchronously before returning
//!
//! # Database Connection Patterns
//!
//! Every async method opens its connection through `connect_with_timeout()`,
//! which sets a 5-second busy timeout so concurrent writers wait instead of
//! failing with `SQLITE_BUSY`.

use crate::db::error::DatabaseError;
use crate::db::events::{HookOutcome, PostSaveHook, SaveKind};
use crate::models::{
    collection_name_for, AdministrativeLevel, AdministrativeLevelType, Facilitator,
    FacilitatorRole, NewAdministrativeLevel,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;

const LEVEL_COLUMNS: &str = "id, name, type, parent_id, headquarter_id, latitude, longitude, \
                             mirror_doc_id, created_at, updated_at";

const FACILITATOR_COLUMNS: &str =
    "id, username, role, active, develop_mode, training_mode, document_db_name";

/// Relational store for administrative levels and facilitator accounts
///
/// # Examples
///
/// ```no_run
/// use cdd_core::db::RelationalStore;
/// use cdd_core::models::{AdministrativeLevelType, NewAdministrativeLevel};
/// use std::path::PathBuf;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = RelationalStore::new(PathBuf::from("./data/cdd.db")).await?;
///     let kara = store
///         .create_administrative_level(NewAdministrativeLevel::new(
///             "Kara",
///             AdministrativeLevelType::Department,
///         ))
///         .await?;
///     println!("created level {}", kara.id);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct RelationalStore {
    /// libsql database (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,

    hook: Option<Arc<dyn PostSaveHook>>,
}

impl RelationalStore {
    /// Open or create the database at `db_path` and initialize the schema
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        let is_new_database = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let store = Self {
            db: Arc::new(db),
            db_path,
            hook: None,
        };

        store.initialize_schema(is_new_database).await?;

        Ok(store)
    }

    /// Register the observer run after every administrative level save
    pub fn with_post_save_hook(mut self, hook: Arc<dyn PostSaveHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn has_post_save_hook(&self) -> bool {
        self.hook.is_some()
    }

    /// PRAGMA statements return rows, so they go through query() rather than
    /// execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Create tables and indexes (idempotent)
    ///
    /// # Schema
    ///
    /// - `administrative_levels`: self-referential geography tree, unique on
    ///   `(name, parent_id, type)` with NULL parents treated as equal
    /// - `facilitators`: agent accounts keyed by unique username
    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS administrative_levels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                type TEXT NOT NULL,
                parent_id INTEGER,
                headquarter_id INTEGER,
                latitude REAL,
                longitude REAL,
                mirror_doc_id TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (parent_id) REFERENCES administrative_levels(id) ON DELETE CASCADE,
                FOREIGN KEY (headquarter_id) REFERENCES administrative_levels(id) ON DELETE SET NULL
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to create administrative_levels table: {}",
                e
            ))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS facilitators (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                develop_mode INTEGER NOT NULL DEFAULT 0,
                training_mode INTEGER NOT NULL DEFAULT 0,
                document_db_name TEXT NOT NULL UNIQUE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to create facilitators table: {}", e))
        })?;

        self.create_indexes(&conn).await?;

        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        Ok(())
    }

    async fn create_indexes(&self, conn: &libsql::Connection) -> Result<(), DatabaseError> {
        let indexes = [
            (
                "idx_levels_identity",
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_levels_identity
                 ON administrative_levels(name, COALESCE(parent_id, 0), type)",
            ),
            (
                "idx_levels_parent",
                "CREATE INDEX IF NOT EXISTS idx_levels_parent ON administrative_levels(parent_id)",
            ),
            (
                "idx_levels_type",
                "CREATE INDEX IF NOT EXISTS idx_levels_type ON administrative_levels(type)",
            ),
            (
                "idx_facilitators_role",
                "CREATE INDEX IF NOT EXISTS idx_facilitators_role ON facilitators(role)",
            ),
        ];

        for (name, sql) in indexes {
            conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to create index '{}': {}", name, e))
            })?;
        }

        Ok(())
    }

    /// Synchronous connection handle; prefer `connect_with_timeout()` in async code
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Connection with a 5-second busy timeout configured
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;

        Ok(conn)
    }

    //
    // ADMINISTRATIVE LEVELS
    //

    /// Insert a level, then run the post-save hook with `SaveKind::Created`
    ///
    /// A parent whose type is not exactly one level above is accepted with a
    /// warning.
    ///
    /// # Errors
    ///
    /// - `RecordNotFound` if `parent_id` does not exist
    /// - `SqlExecutionError` on a `(name, parent_id, type)` collision
    /// - Any error returned by the hook (the row stays committed)
    pub async fn create_administrative_level(
        &self,
        new_level: NewAdministrativeLevel,
    ) -> Result<AdministrativeLevel, DatabaseError> {
        new_level.validate()?;
        self.check_parent(&new_level.name, new_level.level_type, new_level.parent_id)
            .await?;

        let conn = self.connect_with_timeout().await?;
        conn.execute(
            "INSERT INTO administrative_levels (name, type, parent_id, headquarter_id, latitude, longitude)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                new_level.name.as_str(),
                new_level.level_type.as_str(),
                new_level.parent_id,
                new_level.headquarter_id,
                new_level.latitude,
                new_level.longitude,
            ),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to insert administrative level '{}': {}",
                new_level.name, e
            ))
        })?;
        let id = conn.last_insert_rowid();

        let level = self
            .get_administrative_level(id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("AdministrativeLevel", id.to_string()))?;

        tracing::debug!(id, level_name = %level.name, level_type = %level.level_type, "Inserted administrative level");

        self.run_post_save_hook(level, SaveKind::Created).await
    }

    /// Persist every field of `level`, then run the post-save hook with
    /// `SaveKind::Updated`
    ///
    /// `mirror_doc_id` is not written here; it is owned by the mirror sync
    /// (see [`RelationalStore::set_mirror_doc_id`]).
    pub async fn update_administrative_level(
        &self,
        level: &AdministrativeLevel,
    ) -> Result<AdministrativeLevel, DatabaseError> {
        level.validate()?;
        self.check_parent(&level.name, level.level_type, level.parent_id)
            .await?;

        let conn = self.connect_with_timeout().await?;
        let affected = conn
            .execute(
                "UPDATE administrative_levels
                 SET name = ?, type = ?, parent_id = ?, headquarter_id = ?, latitude = ?,
                     longitude = ?, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?",
                (
                    level.name.as_str(),
                    level.level_type.as_str(),
                    level.parent_id,
                    level.headquarter_id,
                    level.latitude,
                    level.longitude,
                    level.id,
                ),
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!(
                    "Failed to update administrative level {}: {}",
                    level.id, e
                ))
            })?;

        if affected == 0 {
            return Err(DatabaseError::not_found(
                "AdministrativeLevel",
                level.id.to_string(),
            ));
        }

        let saved = self
            .get_administrative_level(level.id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("AdministrativeLevel", level.id.to_string()))?;

        self.run_post_save_hook(saved, SaveKind::Updated).await
    }

    /// Store the mirror document id on a level without firing the hook
    pub async fn set_mirror_doc_id(
        &self,
        id: i64,
        mirror_doc_id: &str,
    ) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        let affected = conn
            .execute(
                "UPDATE administrative_levels SET mirror_doc_id = ? WHERE id = ?",
                (mirror_doc_id, id),
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!(
                    "Failed to set mirror_doc_id on level {}: {}",
                    id, e
                ))
            })?;

        if affected == 0 {
            return Err(DatabaseError::not_found("AdministrativeLevel", id.to_string()));
        }
        Ok(())
    }

    pub async fn get_administrative_level(
        &self,
        id: i64,
    ) -> Result<Option<AdministrativeLevel>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM administrative_levels WHERE id = ?",
                LEVEL_COLUMNS
            ))
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!(
                    "Failed to prepare get_administrative_level query: {}",
                    e
                ))
            })?;

        let mut rows = stmt.query([id]).await.map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to execute get_administrative_level query: {}",
                e
            ))
        })?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => Ok(Some(level_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Levels ordered by id, optionally restricted to one type
    pub async fn list_administrative_levels(
        &self,
        level_type: Option<AdministrativeLevelType>,
    ) -> Result<Vec<AdministrativeLevel>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        let mut rows = if let Some(level_type) = level_type {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM administrative_levels WHERE type = ? ORDER BY id",
                    LEVEL_COLUMNS
                ))
                .await
                .map_err(|e| {
                    DatabaseError::sql_execution(format!("Failed to prepare query: {}", e))
                })?;
            stmt.query([level_type.as_str()]).await.map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to execute query: {}", e))
            })?
        } else {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM administrative_levels ORDER BY id",
                    LEVEL_COLUMNS
                ))
                .await
                .map_err(|e| {
                    DatabaseError::sql_execution(format!("Failed to prepare query: {}", e))
                })?;
            stmt.query(()).await.map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to execute query: {}", e))
            })?
        };

        let mut levels = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            levels.push(level_from_row(&row)?);
        }
        Ok(levels)
    }

    async fn check_parent(
        &self,
        name: &str,
        level_type: AdministrativeLevelType,
        parent_id: Option<i64>,
    ) -> Result<(), DatabaseError> {
        let Some(parent_id) = parent_id else {
            if level_type != AdministrativeLevelType::Department {
                tracing::warn!(level_name = name, %level_type, "Administrative level saved without a parent");
            }
            return Ok(());
        };

        let parent = self
            .get_administrative_level(parent_id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("AdministrativeLevel", parent_id.to_string()))?;

        if !level_type.is_direct_child_of(parent.level_type) {
            tracing::warn!(
                level_name = name,
                %level_type,
                parent_id,
                parent_type = %parent.level_type,
                "Parent is not exactly one level above"
            );
        }
        Ok(())
    }

    async fn run_post_save_hook(
        &self,
        mut level: AdministrativeLevel,
        kind: SaveKind,
    ) -> Result<AdministrativeLevel, DatabaseError> {
        let Some(hook) = &self.hook else {
            return Ok(level);
        };

        match hook.after_save(&level, kind).await? {
            HookOutcome::Unchanged => {}
            HookOutcome::MirrorLinked(mirror_doc_id) => {
                self.set_mirror_doc_id(level.id, &mirror_doc_id).await?;
                level.mirror_doc_id = Some(mirror_doc_id);
            }
        }
        Ok(level)
    }

    //
    // FACILITATORS
    //

    /// Fetch the account for `username`, creating an active one with `role`
    /// if none exists. Returns the account and whether it was created.
    pub async fn get_or_create_facilitator(
        &self,
        username: &str,
        role: FacilitatorRole,
    ) -> Result<(Facilitator, bool), DatabaseError> {
        if let Some(existing) = self.get_facilitator_by_username(username).await? {
            return Ok((existing, false));
        }

        let conn = self.connect_with_timeout().await?;
        let document_db_name = collection_name_for(username);
        conn.execute(
            "INSERT INTO facilitators (username, role, active, develop_mode, training_mode, document_db_name)
             VALUES (?, ?, 1, 0, 0, ?)",
            (username, role.as_str(), document_db_name.as_str()),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to insert facilitator '{}': {}",
                username, e
            ))
        })?;

        let facilitator = self
            .get_facilitator_by_username(username)
            .await?
            .ok_or_else(|| DatabaseError::not_found("Facilitator", username))?;

        tracing::info!(username, role = %role, "Created facilitator account");
        Ok((facilitator, true))
    }

    pub async fn get_facilitator(&self, id: i64) -> Result<Option<Facilitator>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM facilitators WHERE id = ?",
                FACILITATOR_COLUMNS
            ))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to prepare query: {}", e)))?;
        let mut rows = stmt
            .query([id])
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to execute query: {}", e)))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => Ok(Some(facilitator_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn get_facilitator_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Facilitator>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM facilitators WHERE username = ?",
                FACILITATOR_COLUMNS
            ))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to prepare query: {}", e)))?;
        let mut rows = stmt
            .query([username])
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to execute query: {}", e)))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => Ok(Some(facilitator_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Update the account status flags
    pub async fn set_facilitator_flags(
        &self,
        id: i64,
        active: bool,
        develop_mode: bool,
        training_mode: bool,
    ) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        let affected = conn
            .execute(
                "UPDATE facilitators SET active = ?, develop_mode = ?, training_mode = ? WHERE id = ?",
                (active as i64, develop_mode as i64, training_mode as i64, id),
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to update facilitator {}: {}", id, e))
            })?;

        if affected == 0 {
            return Err(DatabaseError::not_found("Facilitator", id.to_string()));
        }
        Ok(())
    }

    /// Active accounts that are neither development nor training accounts,
    /// ordered by id, optionally restricted to one role
    pub async fn list_reporting_facilitators(
        &self,
        role: Option<FacilitatorRole>,
    ) -> Result<Vec<Facilitator>, DatabaseError> {
        let base = format!(
            "SELECT {} FROM facilitators
             WHERE active = 1 AND develop_mode = 0 AND training_mode = 0",
            FACILITATOR_COLUMNS
        );
        match role {
            Some(role) => {
                self.query_facilitators(&format!("{} AND role = ? ORDER BY id", base), Some(role))
                    .await
            }
            None => {
                self.query_facilitators(&format!("{} ORDER BY id", base), None)
                    .await
            }
        }
    }

    /// Every account regardless of status, ordered by id
    pub async fn list_facilitators(&self) -> Result<Vec<Facilitator>, DatabaseError> {
        self.query_facilitators(
            &format!("SELECT {} FROM facilitators ORDER BY id", FACILITATOR_COLUMNS),
            None,
        )
        .await
    }

    async fn query_facilitators(
        &self,
        sql: &str,
        role: Option<FacilitatorRole>,
    ) -> Result<Vec<Facilitator>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        let mut stmt = conn
            .prepare(sql)
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to prepare query: {}", e)))?;

        let mut rows = match role {
            Some(role) => stmt.query([role.as_str()]).await,
            None => stmt.query(()).await,
        }
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to execute query: {}", e)))?;

        let mut facilitators = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            facilitators.push(facilitator_from_row(&row)?);
        }
        Ok(facilitators)
    }
}

fn level_from_row(row: &libsql::Row) -> Result<AdministrativeLevel, DatabaseError> {
    let type_str: String = row.get(2)?;
    let level_type = type_str
        .parse::<AdministrativeLevelType>()
        .map_err(|e| DatabaseError::InvalidRow(e.to_string()))?;
    let created_at: Option<String> = row.get(8)?;
    let updated_at: Option<String> = row.get(9)?;

    Ok(AdministrativeLevel {
        id: row.get(0)?,
        name: row.get(1)?,
        level_type,
        parent_id: row.get(3)?,
        headquarter_id: row.get(4)?,
        latitude: row.get(5)?,
        longitude: row.get(6)?,
        mirror_doc_id: row.get(7)?,
        created_at: created_at.as_deref().and_then(parse_sqlite_timestamp),
        updated_at: updated_at.as_deref().and_then(parse_sqlite_timestamp),
    })
}

fn facilitator_from_row(row: &libsql::Row) -> Result<Facilitator, DatabaseError> {
    let role_str: String = row.get(2)?;
    let role = role_str
        .parse::<FacilitatorRole>()
        .map_err(|e| DatabaseError::InvalidRow(e.to_string()))?;

    Ok(Facilitator {
        id: row.get(0)?,
        username: row.get(1)?,
        role,
        active: row.get::<i64>(3)? != 0,
        develop_mode: row.get::<i64>(4)? != 0,
        training_mode: row.get::<i64>(5)? != 0,
        document_db_name: row.get(6)?,
    })
}

/// SQLite `CURRENT_TIMESTAMP` format (`YYYY-MM-DD HH:MM:SS`, UTC)
fn parse_sqlite_timestamp(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Hook recording each call and linking a fixed mirror id on create
    #[derive(Default)]
    struct RecordingHook {
        calls: Mutex<Vec<(i64, SaveKind)>>,
    }

    #[async_trait]
    impl PostSaveHook for RecordingHook {
        async fn after_save(
            &self,
            level: &AdministrativeLevel,
            kind: SaveKind,
        ) -> Result<HookOutcome, DatabaseError> {
            self.calls.lock().unwrap().push((level.id, kind));
            Ok(match kind {
                SaveKind::Created => HookOutcome::MirrorLinked(format!("mirror-{}", level.id)),
                SaveKind::Updated => HookOutcome::Unchanged,
            })
        }
    }

    async fn create_test_store() -> (RelationalStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let store = RelationalStore::new(db_path).await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_database_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");

        let store = RelationalStore::new(db_path.clone()).await.unwrap();

        assert_eq!(store.db_path, db_path);
        assert!(db_path.exists());
        assert!(!store.has_post_save_hook());
    }

    #[tokio::test]
    async fn test_schema_initialization() {
        let (store, _temp_dir) = create_test_store().await;
        let conn = store.connect().unwrap();

        for table in ["administrative_levels", "facilitators"] {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
                .await
                .unwrap();
            let mut rows = stmt.query([table]).await.unwrap();
            let row = rows.next().await.unwrap().unwrap();
            let table_name: String = row.get(0).unwrap();
            assert_eq!(table_name, table);
        }
    }

    #[tokio::test]
    async fn test_create_and_get_level() {
        let (store, _temp_dir) = create_test_store().await;

        let kara = store
            .create_administrative_level(
                NewAdministrativeLevel::new("Kara", AdministrativeLevelType::Department)
                    .with_coordinates(9.55, 1.19),
            )
            .await
            .unwrap();
        let kozah = store
            .create_administrative_level(
                NewAdministrativeLevel::new("Kozah", AdministrativeLevelType::Commune)
                    .with_parent(kara.id),
            )
            .await
            .unwrap();

        let fetched = store.get_administrative_level(kozah.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Kozah");
        assert_eq!(fetched.parent_id, Some(kara.id));
        assert_eq!(fetched.level_type, AdministrativeLevelType::Commune);
        assert!(fetched.created_at.is_some());
        assert_eq!(fetched.mirror_doc_id, None);

        let communes = store
            .list_administrative_levels(Some(AdministrativeLevelType::Commune))
            .await
            .unwrap();
        assert_eq!(communes.len(), 1);
        assert_eq!(store.list_administrative_levels(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_identity_is_unique() {
        let (store, _temp_dir) = create_test_store().await;

        store
            .create_administrative_level(NewAdministrativeLevel::new(
                "Kara",
                AdministrativeLevelType::Department,
            ))
            .await
            .unwrap();
        let duplicate = store
            .create_administrative_level(NewAdministrativeLevel::new(
                "Kara",
                AdministrativeLevelType::Department,
            ))
            .await;
        assert!(duplicate.is_err());

        // Same name at another level is allowed
        store
            .create_administrative_level(NewAdministrativeLevel::new(
                "Kara",
                AdministrativeLevelType::Commune,
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_parent_is_rejected() {
        let (store, _temp_dir) = create_test_store().await;
        let err = store
            .create_administrative_level(
                NewAdministrativeLevel::new("Orphan", AdministrativeLevelType::Village)
                    .with_parent(999),
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_hook_runs_on_create_and_update() {
        let (store, _temp_dir) = create_test_store().await;
        let hook = Arc::new(RecordingHook::default());
        let store = store.with_post_save_hook(hook.clone());

        let mut kara = store
            .create_administrative_level(NewAdministrativeLevel::new(
                "Kara",
                AdministrativeLevelType::Department,
            ))
            .await
            .unwrap();
        assert_eq!(kara.mirror_doc_id, Some(format!("mirror-{}", kara.id)));

        let persisted = store.get_administrative_level(kara.id).await.unwrap().unwrap();
        assert_eq!(persisted.mirror_doc_id, kara.mirror_doc_id);

        kara.latitude = Some(9.6);
        let updated = store.update_administrative_level(&kara).await.unwrap();
        assert_eq!(updated.latitude, Some(9.6));

        let calls = hook.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![(kara.id, SaveKind::Created), (kara.id, SaveKind::Updated)]
        );
    }

    #[tokio::test]
    async fn test_update_unknown_level_is_not_found() {
        let (store, _temp_dir) = create_test_store().await;
        let ghost = AdministrativeLevel {
            id: 42,
            name: "Ghost".to_string(),
            level_type: AdministrativeLevelType::Village,
            parent_id: None,
            headquarter_id: None,
            latitude: None,
            longitude: None,
            mirror_doc_id: None,
            created_at: None,
            updated_at: None,
        };
        assert!(store
            .update_administrative_level(&ghost)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_get_or_create_facilitator() {
        let (store, _temp_dir) = create_test_store().await;

        let (created, was_created) = store
            .get_or_create_facilitator("KOFFI_Ama", FacilitatorRole::Fc)
            .await
            .unwrap();
        assert!(was_created);
        assert!(created.is_reporting());
        assert_eq!(created.document_db_name, collection_name_for("KOFFI_Ama"));

        let (again, was_created) = store
            .get_or_create_facilitator("KOFFI_Ama", FacilitatorRole::Sc)
            .await
            .unwrap();
        assert!(!was_created);
        assert_eq!(again, created);
    }

    #[tokio::test]
    async fn test_reporting_filter() {
        let (store, _temp_dir) = create_test_store().await;

        let (fc, _) = store
            .get_or_create_facilitator("A_One", FacilitatorRole::Fc)
            .await
            .unwrap();
        let (trainee, _) = store
            .get_or_create_facilitator("B_Two", FacilitatorRole::Fc)
            .await
            .unwrap();
        let (sc, _) = store
            .get_or_create_facilitator("C_Three", FacilitatorRole::Sc)
            .await
            .unwrap();
        store
            .set_facilitator_flags(trainee.id, true, false, true)
            .await
            .unwrap();

        let reporting: Vec<i64> = store
            .list_reporting_facilitators(None)
            .await
            .unwrap()
            .iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(reporting, vec![fc.id, sc.id]);

        let fcs = store
            .list_reporting_facilitators(Some(FacilitatorRole::Fc))
            .await
            .unwrap();
        assert_eq!(fcs.len(), 1);
        assert_eq!(store.list_facilitators().await.unwrap().len(), 3);
    }
}
