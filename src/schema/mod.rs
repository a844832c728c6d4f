//! Canonical record shapes and the normalization layer
//!
//! Upstream services return candidate records with inconsistent field names
//! (PascalCase service fields next to snake_case internal fields). Everything that
//! enters tracked state is first mapped into [`CanonicalCandidate`] by [`normalize`]
//! or validated into a [`EuropassRecord`].

pub mod candidate;
pub mod europass;
pub mod normalize;

pub use candidate::{
    CanonicalCandidate, EducationRecord, LanguageLevel, LanguageSkill, RegionExperience,
};
pub use europass::{
    language_level_label, EuropassEducation, EuropassExperience, EuropassLanguage,
    EuropassRecord, EuropassRegion, TrainingEntry,
};
pub use normalize::normalize;

use serde::{Deserialize, Deserializer};

/// Deserialize `null` as the type's default value
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
