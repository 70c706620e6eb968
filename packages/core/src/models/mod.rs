//! Data Models
//!
//! This module contains the data structures shared by both stores:
//!
//! - `AdministrativeLevel` - Relational geography row and its level type
//! - `GeographyMirrorDocument` - Document-store mirror of a geography row
//! - `Facilitator` / `FacilitatorProfileDocument` - Agent account and profile
//! - `TaskDocument` / `WorkflowDocument` - Agent task completion records
//!
//! Documents coming back from the document store are loosely typed. Id fields
//! accept numbers as well as strings (see [`lenient_string`]) so that a
//! type-mismatched field does not make a whole record unreadable.

mod administrative_level;
mod facilitator;
mod mirror_document;
mod task;

pub use administrative_level::{
    AdministrativeLevel, AdministrativeLevelType, NewAdministrativeLevel,
};
pub use facilitator::{
    collection_name_for, derive_username, AdministrativeLevelRef, Facilitator,
    FacilitatorProfileDocument, FacilitatorRole, Sex, PROFILE_DOCUMENT_TYPE,
};
pub use mirror_document::{GeographyMirrorDocument, MIRROR_DOCUMENT_TYPE};
pub use task::{
    TaskDocument, WorkflowDocument, WorkflowKind, TASK_DOCUMENT_TYPE, TASK_TIMESTAMP_FORMAT,
};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

/// Validation errors for model construction and parsing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid administrative level type: {0}")]
    InvalidLevelType(String),

    #[error("Invalid parent reference: {0}")]
    InvalidParent(String),

    #[error("Invalid facilitator role: {0}")]
    InvalidRole(String),

    #[error("Invalid workflow kind: {0}")]
    InvalidWorkflowKind(String),
}

/// Whether `id` is a non-empty string of ASCII digits (a relational id rather
/// than a placeholder such as `"unknown"`)
pub fn is_digit_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Deserialize a string that may have been stored as a number, bool or null.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(D::Error::custom(format!(
            "expected a string or number, found {}",
            other
        ))),
    }
}

/// Deserialize an integer that may be stored as a string, a float or null.
/// Anything unusable falls back to `0`.
pub fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_optional_i64(deserializer)?.unwrap_or_default())
}

/// Optional variant of [`lenient_i64`]; unusable values map to `None`.
pub fn lenient_optional_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Deserialize a coordinate that may be stored as a string; unparseable
/// values map to `None`.
pub fn lenient_optional_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok().filter(|f: &f64| f.is_finite()),
        _ => None,
    })
}

/// Text field that never fails: values other than strings and numbers
/// become an empty string.
pub fn loose_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(loose_optional_string(deserializer)?.unwrap_or_default())
}

/// Optional string stored as a string or number; anything else (null,
/// bools, objects, arrays) maps to `None`.
pub fn loose_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Loose {
        #[serde(default, deserialize_with = "lenient_i64")]
        order: i64,
        #[serde(default, deserialize_with = "lenient_optional_i64")]
        sql_id: Option<i64>,
        #[serde(default, deserialize_with = "lenient_optional_f64")]
        latitude: Option<f64>,
    }

    #[test]
    fn test_digit_ids() {
        assert!(is_digit_id("4"));
        assert!(is_digit_id("0042"));
        assert!(!is_digit_id(""));
        assert!(!is_digit_id("unknown"));
        assert!(!is_digit_id("-4"));
        assert!(!is_digit_id("4.0"));
        assert!(!is_digit_id("٤"));
    }

    #[test]
    fn test_lenient_numbers() {
        let loose: Loose =
            serde_json::from_value(json!({"order": "2", "sql_id": "17", "latitude": "9.55"}))
                .unwrap();
        assert_eq!(loose.order, 2);
        assert_eq!(loose.sql_id, Some(17));
        assert_eq!(loose.latitude, Some(9.55));

        let loose: Loose =
            serde_json::from_value(json!({"order": null, "sql_id": "n/a", "latitude": "nord"}))
                .unwrap();
        assert_eq!(loose.order, 0);
        assert_eq!(loose.sql_id, None);
        assert_eq!(loose.latitude, None);

        let loose: Loose = serde_json::from_value(json!({"order": {"x": 1}})).unwrap();
        assert_eq!(loose.order, 0);
    }
}
