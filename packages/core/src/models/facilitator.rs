//! Facilitator (field agent) models
//!
//! A facilitator has a relational account row and a private document
//! collection. The collection holds one profile document (`type = "facilitator"`)
//! and the agent's task and workflow documents.
//!
//! # Collection routing
//!
//! The collection name is a pure function of the username
//! ([`collection_name_for`]), so routing never depends on runtime state.

use crate::models::{lenient_string, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// `type` value of the profile document
pub const PROFILE_DOCUMENT_TYPE: &str = "facilitator";

/// Agent role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FacilitatorRole {
    /// Assistant coordonnateur spécialiste du DCC
    #[serde(rename = "AC-SDCC")]
    AcSdcc,
    /// Formateur en gestion à la base
    #[serde(rename = "FGB")]
    Fgb,
    /// Superviseur communal
    #[serde(rename = "SC")]
    Sc,
    /// Facilitateur technique
    #[serde(rename = "FT")]
    Ft,
    /// Facilitateur communautaire
    #[serde(rename = "FC")]
    Fc,
}

impl FacilitatorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AcSdcc => "AC-SDCC",
            Self::Fgb => "FGB",
            Self::Sc => "SC",
            Self::Ft => "FT",
            Self::Fc => "FC",
        }
    }
}

impl FromStr for FacilitatorRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "AC-SDCC" => Ok(Self::AcSdcc),
            "FGB" => Ok(Self::Fgb),
            "SC" => Ok(Self::Sc),
            "FT" => Ok(Self::Ft),
            "FC" => Ok(Self::Fc),
            other => Err(ValidationError::InvalidRole(other.to_string())),
        }
    }
}

impl fmt::Display for FacilitatorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Salutation stored in the profile document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "M.")]
    Male,
    #[serde(rename = "Mme")]
    Female,
}

impl Sex {
    /// Map the import sheet's `SEXE` column. Anything other than "Masculin"
    /// is recorded as "Mme".
    pub fn from_label(label: &str) -> Self {
        if label.trim() == "Masculin" {
            Self::Male
        } else {
            Self::Female
        }
    }
}

/// Relational facilitator account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facilitator {
    pub id: i64,
    pub username: String,
    pub role: FacilitatorRole,
    pub active: bool,
    pub develop_mode: bool,
    pub training_mode: bool,
    /// Name of the agent's private document collection
    pub document_db_name: String,
}

impl Facilitator {
    /// Active accounts that are neither development nor training accounts
    pub fn is_reporting(&self) -> bool {
        self.active && !self.develop_mode && !self.training_mode
    }
}

/// Derive a username from a display name: the first two whitespace-separated
/// tokens joined with `_`, or the single token when there is only one.
///
/// ```rust
/// use cdd_core::models::derive_username;
///
/// assert_eq!(derive_username("KOFFI Ama Esther").unwrap(), "KOFFI_Ama");
/// assert_eq!(derive_username("Tchala").unwrap(), "Tchala");
/// assert!(derive_username("   ").is_err());
/// ```
pub fn derive_username(display_name: &str) -> Result<String, ValidationError> {
    let mut tokens = display_name.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some(first), Some(second)) => Ok(format!("{}_{}", first, second)),
        (Some(first), None) => Ok(first.to_string()),
        _ => Err(ValidationError::MissingField("name".to_string())),
    }
}

/// Deterministic collection name for an agent.
///
/// Uses a v5 UUID of the username so names are stable across processes, valid
/// as collection identifiers, and distinct for usernames that only differ in
/// accents or punctuation.
pub fn collection_name_for(username: &str) -> String {
    let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, username.as_bytes());
    format!("facilitator_{}", id.simple())
}

/// `{name, id}` reference to an administrative level inside a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdministrativeLevelRef {
    pub name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
}

impl AdministrativeLevelRef {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

/// Profile document stored once in every agent collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilitatorProfileDocument {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: String,
    pub sex: Sex,
    pub role: FacilitatorRole,
    #[serde(default)]
    pub administrative_levels: Vec<AdministrativeLevelRef>,
    #[serde(rename = "type")]
    pub document_type: String,
}

impl FacilitatorProfileDocument {
    pub fn new(
        name: impl Into<String>,
        phone: impl Into<String>,
        sex: Sex,
        role: FacilitatorRole,
    ) -> Self {
        Self {
            name: name.into(),
            email: String::new(),
            phone: phone.into(),
            sex,
            role,
            administrative_levels: Vec::new(),
            document_type: PROFILE_DOCUMENT_TYPE.to_string(),
        }
    }

    /// Append a level unless the same `(name, id)` pair is already assigned.
    ///
    /// Returns `true` when the level was appended.
    pub fn add_administrative_level(&mut self, level: AdministrativeLevelRef) -> bool {
        if self.administrative_levels.contains(&level) {
            return false;
        }
        self.administrative_levels.push(level);
        true
    }

    /// Ids of assigned levels that are real relational ids (digit strings)
    pub fn assigned_level_ids(&self) -> impl Iterator<Item = &str> {
        self.administrative_levels
            .iter()
            .map(|level| level.id.as_str())
            .filter(|id| crate::models::is_digit_id(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_username_derivation() {
        assert_eq!(derive_username("ABALO Kossi").unwrap(), "ABALO_Kossi");
        assert_eq!(derive_username("  ABALO   Kossi  Jean ").unwrap(), "ABALO_Kossi");
        assert_eq!(derive_username("Mawuli").unwrap(), "Mawuli");
        assert!(derive_username("").is_err());
    }

    #[test]
    fn test_collection_name_is_stable_and_distinct() {
        let a = collection_name_for("ABALO_Kossi");
        assert_eq!(a, collection_name_for("ABALO_Kossi"));
        assert_ne!(a, collection_name_for("ABALO_Kossí"));
        assert!(a.starts_with("facilitator_"));
        assert!(a
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
    }

    #[test]
    fn test_profile_levels_are_deduplicated() {
        let mut profile =
            FacilitatorProfileDocument::new("ABALO Kossi", "90000000", Sex::Male, FacilitatorRole::Sc);
        assert!(profile.add_administrative_level(AdministrativeLevelRef::new("X", "5")));
        assert!(!profile.add_administrative_level(AdministrativeLevelRef::new("X", "5")));
        assert_eq!(profile.administrative_levels.len(), 1);

        // Same id under a different name is a distinct pair
        assert!(profile.add_administrative_level(AdministrativeLevelRef::new("Y", "5")));
        assert_eq!(profile.administrative_levels.len(), 2);
    }

    #[test]
    fn test_numeric_level_ids_compare_equal_to_strings() {
        let mut profile: FacilitatorProfileDocument = serde_json::from_value(json!({
            "name": "ABALO Kossi",
            "phone": 90000000,
            "sex": "M.",
            "role": "SC",
            "administrative_levels": [{"name": "X", "id": 5}],
            "type": "facilitator"
        }))
        .unwrap();
        assert_eq!(profile.phone, "90000000");
        assert!(!profile.add_administrative_level(AdministrativeLevelRef::new("X", "5")));
        assert_eq!(profile.administrative_levels.len(), 1);
    }

    #[test]
    fn test_assigned_level_ids_skip_placeholders() {
        let mut profile =
            FacilitatorProfileDocument::new("A", "", Sex::Female, FacilitatorRole::Fc);
        profile.add_administrative_level(AdministrativeLevelRef::new("Kara", "1"));
        profile.add_administrative_level(AdministrativeLevelRef::new("?", "unknown"));
        let ids: Vec<&str> = profile.assigned_level_ids().collect();
        assert_eq!(ids, vec!["1"]);
    }

    #[test]
    fn test_sex_labels() {
        assert_eq!(Sex::from_label("Masculin"), Sex::Male);
        assert_eq!(Sex::from_label("Féminin"), Sex::Female);
        assert_eq!(serde_json::to_value(Sex::Female).unwrap(), "Mme");
    }
}
