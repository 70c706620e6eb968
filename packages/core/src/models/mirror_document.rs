//! Geography Mirror Document
//!
//! Denormalized copy of an [`AdministrativeLevel`] kept in the document store so
//! that geography can be filtered and walked without touching the relational
//! store. The wire field names are fixed for interoperability with mirrored data
//! that already exists.

use crate::models::{
    lenient_optional_f64, lenient_string, loose_string, AdministrativeLevel,
    AdministrativeLevelType,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `type` value carried by every mirror document
pub const MIRROR_DOCUMENT_TYPE: &str = "administrative_level";

/// Mirror of a relational administrative level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeographyMirrorDocument {
    /// String form of the relational id (join key)
    #[serde(deserialize_with = "lenient_string")]
    pub administrative_id: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub name: String,
    pub administrative_level: AdministrativeLevelType,
    /// String form of the relational parent id, empty when there is none
    #[serde(default, deserialize_with = "lenient_string")]
    pub parent_id: String,
    /// Unparseable coordinates read as `None`
    #[serde(default, deserialize_with = "lenient_optional_f64")]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_optional_f64")]
    pub longitude: Option<f64>,
    #[serde(rename = "type")]
    pub document_type: String,
}

impl GeographyMirrorDocument {
    pub fn from_level(level: &AdministrativeLevel) -> Self {
        Self {
            administrative_id: level.id.to_string(),
            name: level.name.clone(),
            administrative_level: level.level_type,
            parent_id: level.parent_id.map(|id| id.to_string()).unwrap_or_default(),
            latitude: level.latitude,
            longitude: level.longitude,
            document_type: MIRROR_DOCUMENT_TYPE.to_string(),
        }
    }

    /// Fields refreshed on update. `administrative_id` and `type` never change
    /// after creation so they are not part of the payload.
    pub fn update_payload(level: &AdministrativeLevel) -> Map<String, Value> {
        let mirror = Self::from_level(level);
        let mut payload = Map::new();
        payload.insert("name".to_string(), Value::String(mirror.name));
        payload.insert(
            "administrative_level".to_string(),
            Value::String(mirror.administrative_level.as_str().to_string()),
        );
        payload.insert("parent_id".to_string(), Value::String(mirror.parent_id));
        payload.insert("latitude".to_string(), optional_number(mirror.latitude));
        payload.insert("longitude".to_string(), optional_number(mirror.longitude));
        payload
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "administrative_id": self.administrative_id,
            "name": self.name,
            "administrative_level": self.administrative_level.as_str(),
            "type": self.document_type,
            "parent_id": self.parent_id,
            "latitude": optional_number(self.latitude),
            "longitude": optional_number(self.longitude),
        })
    }

    pub fn has_parent(&self) -> bool {
        !self.parent_id.is_empty()
    }
}

fn optional_number(value: Option<f64>) -> Value {
    value
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
