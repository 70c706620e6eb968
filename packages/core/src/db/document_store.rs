//! DocumentStore Trait - Document Store Abstraction Layer
//!
//! This module defines the `DocumentStore` trait over schemaless, per-entity
//! document collections. The geography mirror lives in one shared collection
//! and every facilitator owns a private collection of profile, workflow and
//! task documents.
//!
//! # Architecture
//!
//! - **Multiple Backends**: Embedded SurrealDB ([`SurrealDocumentStore`]) and an
//!   in-process [`MemoryDocumentStore`]
//! - **Flat Equality Selectors**: Queries are AND-ed `field = value` maps, no
//!   range or sort operators
//! - **No Transactions**: Every write persists immediately
//! - **No Retries**: Transport failures propagate to the caller
//!
//! Results are returned in creation order by every backend, but callers must
//! not rely on ordering for correctness.
//!
//! [`SurrealDocumentStore`]: crate::db::SurrealDocumentStore
//! [`MemoryDocumentStore`]: crate::db::MemoryDocumentStore

use crate::db::DatabaseError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;

/// Handle to a provisioned collection.
///
/// Names are restricted to `[a-z][a-z0-9_]*` so they can be used directly as
/// backend table names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Collection {
    name: String,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Result<Self, DatabaseError> {
        let name = name.into();
        let lowercase = name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
        if !lowercase || !name.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Err(DatabaseError::InvalidCollectionName { name });
        }
        Ok(Self { name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A stored document: store-assigned id plus a JSON object body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub body: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, body: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.body.get(field).and_then(Value::as_str)
    }

    /// The document's `type` discriminator
    pub fn document_type(&self) -> Option<&str> {
        self.get_str("type")
    }

    pub fn is_type(&self, document_type: &str) -> bool {
        self.document_type() == Some(document_type)
    }

    /// Deserialize the body into a typed model
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.body.clone()))
    }
}

/// Flat equality selector; all conditions must hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    conditions: Vec<(String, Value)>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selector on the `type` discriminator
    pub fn of_type(document_type: &str) -> Self {
        Self::new().where_eq("type", document_type)
    }

    /// Add a `field = value` condition
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Reject field names that are not plain identifiers
    pub fn validate(&self) -> Result<(), DatabaseError> {
        for (field, _) in &self.conditions {
            if !is_identifier(field) {
                return Err(DatabaseError::InvalidSelector {
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }

    /// Whether a document body satisfies every condition
    pub fn matches(&self, body: &Map<String, Value>) -> bool {
        self.conditions.iter().all(|(field, expected)| {
            body.get(field)
                .map(|actual| values_equal(actual, expected))
                .unwrap_or(false)
        })
    }
}

/// Equality with numeric normalization (`1 == 1.0`)
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => match (l.as_i64(), r.as_i64()) {
            (Some(l), Some(r)) => l == r,
            _ => l.as_f64() == r.as_f64(),
        },
        _ => left == right,
    }
}

/// Shallow merge of `partial` onto `target`
pub(crate) fn merge_fields(target: &mut Map<String, Value>, partial: Map<String, Value>) {
    for (key, value) in partial {
        target.insert(key, value);
    }
}

/// Convert a JSON value into a document body
pub(crate) fn into_body(value: Value) -> Result<Map<String, Value>, DatabaseError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DatabaseError::document_store(format!(
            "document body must be a JSON object, got {}",
            other
        ))),
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
        && !s.starts_with(|c: char| c.is_ascii_digit())
}

/// Abstraction over schemaless document collections
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one store is shared by every
/// service through an `Arc<dyn DocumentStore>`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Resolve a collection by name, provisioning it on first use
    ///
    /// Idempotent: calling it again for the same name returns an equal handle
    /// and leaves existing documents untouched.
    async fn get_collection(&self, name: &str) -> Result<Collection, DatabaseError>;

    /// Create a document and return its store-assigned id
    async fn create(&self, collection: &Collection, body: Value) -> Result<String, DatabaseError>;

    /// Fetch a document by id
    ///
    /// - `Ok(Some(doc))` if the document exists
    /// - `Ok(None)` if it does not (not an error)
    async fn get(&self, collection: &Collection, id: &str)
        -> Result<Option<Document>, DatabaseError>;

    /// All documents matching every selector condition
    async fn get_by_query(
        &self,
        collection: &Collection,
        selector: &Selector,
    ) -> Result<Vec<Document>, DatabaseError>;

    /// Merge the top-level fields of `partial` into an existing document
    ///
    /// # Errors
    ///
    /// `DatabaseError::RecordNotFound` if no document has this id.
    async fn update(
        &self,
        collection: &Collection,
        id: &str,
        partial: Map<String, Value>,
    ) -> Result<(), DatabaseError>;

    /// Every document of the collection
    async fn list_all(&self, collection: &Collection) -> Result<Vec<Document>, DatabaseError>;
}
