//! Mapping of arbitrary upstream records into [`CanonicalCandidate`]
//!
//! Two key conventions are accepted at once: the PascalCase keys emitted by the
//! matching service (`Name`, `TechnicalSectors`, ...) and the canonical snake_case
//! keys. When both are present the legacy key wins, unless its value is empty.

use super::candidate::{
    leading_year, CanonicalCandidate, EducationRecord, LanguageLevel, LanguageSkill,
    RegionExperience,
};
use serde_json::{Map, Value};

/// Normalize a raw upstream record. Non-object input yields an empty candidate.
///
/// The mapping is idempotent: feeding the serialized output back in returns the
/// same candidate.
pub fn normalize(raw: &Value) -> CanonicalCandidate {
    let Some(record) = raw.as_object() else {
        return CanonicalCandidate::default();
    };

    let (first_name, family_name) = split_name(record);

    CanonicalCandidate {
        first_name,
        family_name,
        gender: prefer_text(record, "Gender", "gender"),
        date_of_birth: prefer_text(record, "DOB", "date_of_birth"),
        residence_city: prefer_text(record, "Location", "residence_city"),
        email: prefer_list(record, "Email", "email", delimited_list),
        phone: prefer_list(record, "Phone", "phone", delimited_list),
        social_media: prefer_list(record, "SocialMedia", "social_media", delimited_list),
        last_cv_update: prefer_text(record, "LastCVUpdate", "last_cv_update"),
        years_of_experience: prefer_text(record, "YearsOfExperience", "years_of_experience"),
        role_experience: prefer_list(record, "RoleExperience", "role_experience", entry_list),
        nationality: prefer_text(record, "Nationalities", "nationality"),
        language_skills: prefer_list(record, "Languages", "language_skills", language_list),
        specific_experience_in_region: prefer_list(
            record,
            "CountriesOfWork",
            "specific_experience_in_region",
            region_list,
        ),
        clients_donors: prefer_list(record, "ClientsOrDonors", "clients_donors", delimited_list),
        technical_sectors: prefer_list(
            record,
            "TechnicalSectors",
            "technical_sectors",
            delimited_list,
        ),
        functional_areas: prefer_list(
            record,
            "FunctionalAreas",
            "functional_areas",
            delimited_list,
        ),
        education: prefer_list(record, "AcademicQualifications", "education", education_list),
    }
}

/// `Name` splits on its first space; otherwise the canonical name fields are used
fn split_name(record: &Map<String, Value>) -> (String, String) {
    let name = scalar(record.get("Name"));
    if name.is_empty() {
        return (
            scalar(record.get("first_name")),
            scalar(record.get("family_name")),
        );
    }

    match name.split_once(' ') {
        Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
        None => (name, String::new()),
    }
}

fn prefer_text(record: &Map<String, Value>, legacy: &str, canonical: &str) -> String {
    let value = scalar(record.get(legacy));
    if value.is_empty() {
        scalar(record.get(canonical))
    } else {
        value
    }
}

fn prefer_list<T>(
    record: &Map<String, Value>,
    legacy: &str,
    canonical: &str,
    parse: fn(Option<&Value>) -> Vec<T>,
) -> Vec<T> {
    let values = parse(record.get(legacy));
    if values.is_empty() {
        parse(record.get(canonical))
    } else {
        values
    }
}

/// Render a JSON value as trimmed text. Arrays join their scalar items with `, `.
fn scalar(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .filter(|item| !item.is_array() && !item.is_object())
            .map(|item| scalar(Some(item)))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Some(Value::Null) | Some(Value::Object(_)) | None => String::new(),
    }
}

/// Items of a list field; a bare string is treated as a comma-joined list
fn delimited_items(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|part| Value::String(part.to_string()))
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other.clone()],
    }
}

fn delimited_list(value: Option<&Value>) -> Vec<String> {
    delimited_items(value)
        .iter()
        .filter(|item| !item.is_array() && !item.is_object())
        .map(|item| scalar(Some(item)))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Like [`delimited_list`], but a bare string stays a single entry
fn entry_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(_)) => delimited_list(value),
        other => {
            let single = scalar(other);
            if single.is_empty() {
                Vec::new()
            } else {
                vec![single]
            }
        }
    }
}

fn language_list(value: Option<&Value>) -> Vec<LanguageSkill> {
    delimited_items(value)
        .iter()
        .filter_map(|item| match item {
            Value::Object(entry) => Some(LanguageSkill {
                language: scalar(entry.get("language")),
                level: LanguageLevel::from_descriptor(&scalar(entry.get("level"))),
            }),
            Value::String(entry) => Some(LanguageSkill::parse(entry)),
            _ => None,
        })
        .filter(|skill| !skill.language.is_empty())
        .collect()
}

fn region_list(value: Option<&Value>) -> Vec<RegionExperience> {
    delimited_items(value)
        .iter()
        .filter_map(|item| {
            let country = match item {
                Value::Object(entry) => scalar(entry.get("country")),
                Value::Array(_) => return None,
                other => scalar(Some(other)),
            };
            (!country.is_empty()).then_some(RegionExperience { country })
        })
        .collect()
}

fn education_list(value: Option<&Value>) -> Vec<EducationRecord> {
    let items = match value {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other.clone()],
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(entry) => Some(EducationRecord::parse(entry)),
            Value::Object(entry) => {
                let year = match scalar(entry.get("year")) {
                    year if !year.is_empty() => year,
                    _ => scalar(entry.get("to_date")),
                };
                Some(EducationRecord {
                    diploma: scalar(entry.get("diploma")),
                    institution: scalar(entry.get("institution")),
                    year: leading_year(&year),
                })
            }
            _ => None,
        })
        .filter(|record| !record.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn renormalize(candidate: &CanonicalCandidate) -> CanonicalCandidate {
        normalize(&serde_json::to_value(candidate).unwrap())
    }

    #[test]
    fn test_legacy_service_record() {
        let raw = json!({
            "id": 17,
            "Name": "Amina Wanjiru Otieno",
            "Gender": "Female",
            "DOB": null,
            "Location": "Nairobi",
            "Email": ["amina@example.org"],
            "Phone": null,
            "YearsOfExperience": 14,
            "Nationalities": ["Kenyan", "British"],
            "Languages": ["English (Native)", "French (Good)", "Swahili"],
            "CountriesOfWork": ["Kenya", "Uganda"],
            "ClientsOrDonors": "World Bank, EU,USAID",
            "RoleExperience": ["Team Leader", "Evaluator"],
            "AcademicQualifications": ["MSc Economics, University of Nairobi, 2008-07"],
            "TechnicalSectors": ["Health", "Governance"],
            "FunctionalAreas": ["M&E"],
            "score": 8.7
        });

        let candidate = normalize(&raw);

        assert_eq!(candidate.first_name, "Amina");
        assert_eq!(candidate.family_name, "Wanjiru Otieno");
        assert_eq!(candidate.gender, "Female");
        assert_eq!(candidate.date_of_birth, "");
        assert_eq!(candidate.residence_city, "Nairobi");
        assert_eq!(candidate.email, vec!["amina@example.org"]);
        assert!(candidate.phone.is_empty());
        assert_eq!(candidate.years_of_experience, "14");
        assert_eq!(candidate.nationality, "Kenyan, British");
        assert_eq!(candidate.language_skills.len(), 3);
        assert_eq!(candidate.language_skills[0].level, LanguageLevel::Native);
        assert_eq!(candidate.language_skills[1].level, LanguageLevel::Fluent);
        assert_eq!(
            candidate.language_skills[2].level,
            LanguageLevel::Intermediate
        );
        assert_eq!(candidate.countries_of_work(), vec!["Kenya", "Uganda"]);
        assert_eq!(candidate.clients_donors, vec!["World Bank", "EU", "USAID"]);
        assert_eq!(candidate.education[0].year, "2008");
        assert_eq!(candidate.education[0].institution, "University of Nairobi");
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let candidate = normalize(&json!({}));
        assert_eq!(candidate, CanonicalCandidate::default());

        let candidate = normalize(&json!("not an object"));
        assert_eq!(candidate, CanonicalCandidate::default());
    }

    #[test]
    fn test_delimited_string_and_sequence_agree() {
        let from_string = normalize(&json!({"TechnicalSectors": "A, B,C"}));
        let from_sequence = normalize(&json!({"TechnicalSectors": ["A", "B", "C"]}));

        assert_eq!(from_string.technical_sectors, vec!["A", "B", "C"]);
        assert_eq!(from_string, from_sequence);
    }

    #[test]
    fn test_legacy_key_preferred() {
        let candidate = normalize(&json!({
            "Location": "Kampala",
            "residence_city": "Lyon",
            "FunctionalAreas": ["Procurement"],
            "functional_areas": ["Finance"],
        }));

        assert_eq!(candidate.residence_city, "Kampala");
        assert_eq!(candidate.functional_areas, vec!["Procurement"]);
    }

    #[test]
    fn test_empty_legacy_value_falls_back_to_canonical() {
        let candidate = normalize(&json!({
            "Name": "",
            "first_name": "Jean",
            "family_name": "Dupont",
            "Location": null,
            "residence_city": "Lyon",
        }));

        assert_eq!(candidate.first_name, "Jean");
        assert_eq!(candidate.family_name, "Dupont");
        assert_eq!(candidate.residence_city, "Lyon");
    }

    #[test]
    fn test_single_word_name() {
        let candidate = normalize(&json!({"Name": "Madonna"}));
        assert_eq!(candidate.first_name, "Madonna");
        assert_eq!(candidate.family_name, "");
    }

    #[test]
    fn test_canonical_education_uses_to_date() {
        let candidate = normalize(&json!({
            "education": [
                {"diploma": "PhD", "institution": "LSE", "from_date": "2001", "to_date": "2005-09-01"}
            ]
        }));

        assert_eq!(
            candidate.education,
            vec![EducationRecord {
                diploma: "PhD".into(),
                institution: "LSE".into(),
                year: "2005".into()
            }]
        );
    }

    #[test]
    fn test_canonical_record_round_trips() {
        let candidate = normalize(&json!({
            "Name": "Jean Dupont",
            "Languages": ["French (Native)", "Spanish (Fluent)"],
            "CountriesOfWork": ["Mali"],
            "AcademicQualifications": ["MA, Sorbonne, 1999"],
        }));

        assert_eq!(renormalize(&candidate), candidate);
    }

    fn arb_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            (-1.0e6f64..1.0e6f64).prop_map(Value::from),
            "[ a-zA-Z0-9,()\\-]{0,24}".prop_map(Value::String),
        ]
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        arb_leaf().prop_recursive(2, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map(
                    prop::sample::select(vec![
                        "language",
                        "level",
                        "country",
                        "diploma",
                        "institution",
                        "year",
                        "to_date",
                    ]),
                    inner,
                    0..4,
                )
                .prop_map(|m| {
                    Value::Object(m.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
                }),
            ]
        })
    }

    const RECORD_KEYS: &[&str] = &[
        "Name",
        "first_name",
        "family_name",
        "Gender",
        "gender",
        "DOB",
        "date_of_birth",
        "Location",
        "residence_city",
        "Email",
        "email",
        "Phone",
        "SocialMedia",
        "LastCVUpdate",
        "YearsOfExperience",
        "years_of_experience",
        "RoleExperience",
        "role_experience",
        "Nationalities",
        "nationality",
        "Languages",
        "language_skills",
        "CountriesOfWork",
        "specific_experience_in_region",
        "ClientsOrDonors",
        "TechnicalSectors",
        "technical_sectors",
        "FunctionalAreas",
        "AcademicQualifications",
        "education",
    ];

    fn arb_record() -> impl Strategy<Value = Value> {
        prop::collection::btree_map(prop::sample::select(RECORD_KEYS.to_vec()), arb_value(), 0..12)
            .prop_map(|m| Value::Object(m.into_iter().map(|(k, v)| (k.to_string(), v)).collect()))
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(raw in arb_record()) {
            let once = normalize(&raw);
            let twice = renormalize(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn legacy_key_always_wins(legacy in "[A-Za-z]{1,12}", canonical in "[A-Za-z]{1,12}") {
            let candidate = normalize(&json!({
                "Gender": legacy.clone(),
                "gender": canonical.clone(),
                "TechnicalSectors": [legacy.clone()],
                "technical_sectors": [canonical],
            }));
            prop_assert_eq!(&candidate.gender, &legacy);
            prop_assert_eq!(candidate.technical_sectors, vec![legacy]);
        }

        #[test]
        fn delimited_strings_match_sequences(parts in prop::collection::vec("[A-Za-z]{1,8}", 1..6)) {
            let joined = parts.join(" , ");
            let from_string = normalize(&json!({"ClientsOrDonors": joined}));
            let from_sequence = normalize(&json!({"ClientsOrDonors": parts.clone()}));
            prop_assert_eq!(&from_string.clients_donors, &parts);
            prop_assert_eq!(from_string, from_sequence);
        }
    }
}
