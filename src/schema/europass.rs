//! Structured (Europass) CV record returned by the structured parse endpoint

use super::null_as_default;
use serde::{Deserialize, Serialize};

/// Proficiency labels for the 0-4 language scale
pub const LANGUAGE_LEVEL_LABELS: [&str; 5] =
    ["Beginner", "Elementary", "Intermediate", "Advanced", "Proficient"];

/// Label for a numeric language level, `Unknown` when out of range
pub fn language_level_label(level: u8) -> &'static str {
    LANGUAGE_LEVEL_LABELS
        .get(level as usize)
        .copied()
        .unwrap_or("Unknown")
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EuropassRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub proposed_role: String,
    #[serde(deserialize_with = "null_as_default")]
    pub family_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub first_name: String,
    pub date_of_birth: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub nationality: String,
    pub civil_status: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub residence_city: String,
    #[serde(deserialize_with = "null_as_default")]
    pub education: Vec<EuropassEducation>,
    #[serde(deserialize_with = "null_as_default")]
    pub training: Vec<TrainingEntry>,
    #[serde(deserialize_with = "null_as_default")]
    pub language_skills: Vec<EuropassLanguage>,
    #[serde(deserialize_with = "null_as_default")]
    pub membership_professional_bodies: String,
    #[serde(deserialize_with = "null_as_default")]
    pub other_skills: String,
    #[serde(deserialize_with = "null_as_default")]
    pub present_position: String,
    pub years_within_firm: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub specific_experience_in_region: Vec<EuropassRegion>,
    #[serde(deserialize_with = "null_as_default")]
    pub professional_experience: Vec<EuropassExperience>,
    #[serde(deserialize_with = "null_as_default")]
    pub publications: String,
    pub signature_name: Option<String>,
    pub signature_date: Option<String>,
}

impl EuropassRecord {
    /// `first family`, used when no signature name is given
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.family_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EuropassEducation {
    #[serde(deserialize_with = "null_as_default")]
    pub institution: String,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub diploma: String,
}

/// A training entry. Upstream sends either an object or a bare description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "TrainingWire")]
pub struct TrainingEntry {
    pub period: String,
    pub topic: String,
    pub provider: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TrainingWire {
    Text(String),
    Fields {
        #[serde(default, deserialize_with = "null_as_default")]
        period: String,
        #[serde(default, deserialize_with = "null_as_default")]
        topic: String,
        #[serde(default, deserialize_with = "null_as_default")]
        provider: String,
    },
}

impl From<TrainingWire> for TrainingEntry {
    fn from(wire: TrainingWire) -> Self {
        match wire {
            TrainingWire::Text(topic) => TrainingEntry {
                topic,
                ..Default::default()
            },
            TrainingWire::Fields {
                period,
                topic,
                provider,
            } => TrainingEntry {
                period,
                topic,
                provider,
            },
        }
    }
}

/// Language skill with reading/speaking/writing levels on the 0-4 scale
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EuropassLanguage {
    #[serde(deserialize_with = "null_as_default")]
    pub language: String,
    #[serde(deserialize_with = "null_as_default")]
    pub reading: u8,
    #[serde(deserialize_with = "null_as_default")]
    pub speaking: u8,
    #[serde(deserialize_with = "null_as_default")]
    pub writing: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EuropassRegion {
    #[serde(deserialize_with = "null_as_default")]
    pub country: String,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EuropassExperience {
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub location: String,
    #[serde(deserialize_with = "null_as_default")]
    pub company_reference_person: String,
    #[serde(deserialize_with = "null_as_default")]
    pub position: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
}
