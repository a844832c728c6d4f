//! Canonical candidate/CV schema

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized candidate record. Every field is always present: absent upstream
/// values resolve to an empty string or an empty list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalCandidate {
    pub first_name: String,
    pub family_name: String,
    pub gender: String,
    pub date_of_birth: String,
    pub residence_city: String,
    pub email: Vec<String>,
    pub phone: Vec<String>,
    pub social_media: Vec<String>,
    pub last_cv_update: String,
    pub years_of_experience: String,
    pub role_experience: Vec<String>,
    /// Comma-separated nationalities
    pub nationality: String,
    pub language_skills: Vec<LanguageSkill>,
    pub specific_experience_in_region: Vec<RegionExperience>,
    pub clients_donors: Vec<String>,
    pub technical_sectors: Vec<String>,
    pub functional_areas: Vec<String>,
    pub education: Vec<EducationRecord>,
}

impl CanonicalCandidate {
    /// First and family name joined, skipping empty parts
    pub fn full_name(&self) -> String {
        [self.first_name.as_str(), self.family_name.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Individual nationalities from the comma-separated field
    pub fn nationalities(&self) -> Vec<&str> {
        self.nationality
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .collect()
    }

    /// Countries from the regional experience entries
    pub fn countries_of_work(&self) -> Vec<&str> {
        self.specific_experience_in_region
            .iter()
            .map(|r| r.country.as_str())
            .collect()
    }
}

/// Spoken-language proficiency on the canonical three-level scale
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LanguageLevel {
    Native,
    Fluent,
    #[default]
    Intermediate,
}

impl LanguageLevel {
    /// Map a free-text descriptor such as `Excellent` or `Good` to a level
    pub fn from_descriptor(descriptor: &str) -> Self {
        let lowered = descriptor.to_lowercase();
        if lowered.contains("excellent") || lowered.contains("native") {
            LanguageLevel::Native
        } else if lowered.contains("good") || lowered.contains("fluent") {
            LanguageLevel::Fluent
        } else {
            LanguageLevel::Intermediate
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageLevel::Native => "Native",
            LanguageLevel::Fluent => "Fluent",
            LanguageLevel::Intermediate => "Intermediate",
        }
    }
}

impl fmt::Display for LanguageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSkill {
    pub language: String,
    pub level: LanguageLevel,
}

impl LanguageSkill {
    /// Parse an entry formatted as `Language (Descriptor)`
    pub fn parse(entry: &str) -> Self {
        let (language, descriptor) = match entry.split_once(" (") {
            Some((language, rest)) => (language, rest.trim_end().trim_end_matches(')')),
            None => (entry, ""),
        };

        Self {
            language: language.trim().to_string(),
            level: LanguageLevel::from_descriptor(descriptor),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionExperience {
    pub country: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EducationRecord {
    pub diploma: String,
    pub institution: String,
    pub year: String,
}

impl EducationRecord {
    /// Parse an entry formatted as `Degree, Institution, Year`
    ///
    /// Segments map positionally; missing segments stay empty and the year keeps
    /// only its first four characters.
    pub fn parse(entry: &str) -> Self {
        let mut segments = entry.split(',').map(str::trim);
        let diploma = segments.next().unwrap_or_default().to_string();
        let institution = segments.next().unwrap_or_default().to_string();
        let year = leading_year(segments.next().unwrap_or_default());

        Self {
            diploma,
            institution,
            year,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.diploma.is_empty() && self.institution.is_empty() && self.year.is_empty()
    }
}

/// First four characters of a year or date string
pub(crate) fn leading_year(raw: &str) -> String {
    let year: String = raw.trim().chars().take(4).collect();
    year.trim_end().to_string()
}
