//! Administrative Level Data Structures
//!
//! Relational representation of the geography hierarchy:
//! Département > Commune > Arrondissement > Village.
//!
//! # Architecture
//!
//! - **Authoritative**: The relational row is the source of truth; the document
//!   store only holds a mirror (see [`crate::models::GeographyMirrorDocument`])
//! - **Fixed Order**: A level's type should sit exactly one step below its
//!   parent's type. Storage does not reject violations, but the hierarchy walker
//!   only follows one level per step.
//!
//! # Examples
//!
//! ```rust
//! use cdd_core::models::AdministrativeLevelType;
//!
//! let level: AdministrativeLevelType = "departement".parse().unwrap();
//! assert_eq!(level, AdministrativeLevelType::Department);
//! assert_eq!(level.child(), Some(AdministrativeLevelType::Commune));
//! assert_eq!(level.as_str(), "département");
//! ```

use crate::models::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Administrative level type, ordered from the top of the hierarchy down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AdministrativeLevelType {
    #[serde(rename = "département", alias = "departement")]
    Department,
    #[serde(rename = "commune")]
    Commune,
    #[serde(rename = "arrondissement")]
    Arrondissement,
    #[serde(rename = "village")]
    Village,
}

impl AdministrativeLevelType {
    /// All levels in hierarchy order (top-down).
    pub const ALL: [AdministrativeLevelType; 4] = [
        Self::Department,
        Self::Commune,
        Self::Arrondissement,
        Self::Village,
    ];

    /// Wire value used in mirror documents and relational rows
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Department => "département",
            Self::Commune => "commune",
            Self::Arrondissement => "arrondissement",
            Self::Village => "village",
        }
    }

    /// The level directly below this one, `None` for villages
    pub fn child(&self) -> Option<Self> {
        match self {
            Self::Department => Some(Self::Commune),
            Self::Commune => Some(Self::Arrondissement),
            Self::Arrondissement => Some(Self::Village),
            Self::Village => None,
        }
    }

    /// The level directly above this one, `None` for departments
    pub fn parent(&self) -> Option<Self> {
        match self {
            Self::Department => None,
            Self::Commune => Some(Self::Department),
            Self::Arrondissement => Some(Self::Commune),
            Self::Village => Some(Self::Arrondissement),
        }
    }

    /// Whether `self` sits exactly one level below `parent`
    pub fn is_direct_child_of(&self, parent: AdministrativeLevelType) -> bool {
        parent.child() == Some(*self)
    }
}

impl FromStr for AdministrativeLevelType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "département" | "departement" | "Département" | "Departement" => {
                Ok(Self::Department)
            }
            "commune" | "Commune" => Ok(Self::Commune),
            "arrondissement" | "Arrondissement" => Ok(Self::Arrondissement),
            "village" | "Village" => Ok(Self::Village),
            other => Err(ValidationError::InvalidLevelType(other.to_string())),
        }
    }
}

impl fmt::Display for AdministrativeLevelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted administrative level (relational row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdministrativeLevel {
    pub id: i64,
    pub name: String,
    pub level_type: AdministrativeLevelType,
    pub parent_id: Option<i64>,
    /// Child level acting as seat (chef-lieu)
    pub headquarter_id: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Id of the mirror document in the document store, set after the first sync
    pub mirror_doc_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Values for inserting a new administrative level.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAdministrativeLevel {
    pub name: String,
    pub level_type: AdministrativeLevelType,
    pub parent_id: Option<i64>,
    pub headquarter_id: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl NewAdministrativeLevel {
    pub fn new(name: impl Into<String>, level_type: AdministrativeLevelType) -> Self {
        Self {
            name: name.into(),
            level_type,
            parent_id: None,
            headquarter_id: None,
            latitude: None,
            longitude: None,
        }
    }

    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name".to_string()));
        }
        Ok(())
    }
}

impl AdministrativeLevel {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name".to_string()));
        }
        if self.parent_id == Some(self.id) {
            return Err(ValidationError::InvalidParent(format!(
                "level {} cannot be its own parent",
                self.id
            )));
        }
        Ok(())
    }
}
