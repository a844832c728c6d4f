//! Artifact export: pretty JSON documents and template-merged CVs
//!
//! The exporter builds the merge fields of the Europass CV template. Merging them into
//! an office document is left to a [`TemplateRenderer`] supplied by the caller; without
//! one, the merge fields themselves are exported as JSON.

use crate::config::ExportSection;
use crate::events::{EventSink, NoOpEvents, PipelineEvent};
use crate::export_span;
use crate::schema::{CanonicalCandidate, EuropassRecord, LanguageLevel};
use crate::workflow::{Stage, WorkflowSession};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, Instrument};

pub const CONTENT_TYPE_JSON: &str = "application/json";

const NOT_SPECIFIED: &str = "Not specified";
const NO_TRAINING: &str = "No training data available";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Failed to write artifact: {0}")]
    Io(#[from] std::io::Error),
}

/// Merges template data into a template document
pub trait TemplateRenderer: Send + Sync {
    /// Mime type of rendered documents
    fn content_type(&self) -> &str;

    /// File extension of rendered documents, without the dot
    fn extension(&self) -> &str;

    fn render(&self, template: &[u8], data: &Value) -> Result<Vec<u8>, ExportError>;
}

/// A downloadable document
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EducationRow {
    pub period: String,
    pub institution: String,
    pub diploma: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrainingRow {
    pub period: String,
    pub topic: String,
    pub provider: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LanguageRow {
    pub language: String,
    pub read: String,
    pub speak: String,
    pub write: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegionRow {
    pub country: String,
    pub period: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExperienceRow {
    pub period: String,
    pub location: String,
    pub company: String,
    pub position: String,
    pub description: String,
}

/// Merge fields of the Europass CV template
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EuropassTemplateData {
    pub proposed_role: String,
    pub family_name: String,
    pub first_name: String,
    pub date_of_birth: String,
    pub nationality: String,
    pub civil_status: String,
    pub residence_city: String,
    pub education: Vec<EducationRow>,
    pub training: Vec<TrainingRow>,
    pub languages: Vec<LanguageRow>,
    pub membership_professional_bodies: String,
    pub other_skills: String,
    pub present_position: String,
    pub years_within_firm: String,
    pub region_experience: Vec<RegionRow>,
    pub professional_experience: Vec<ExperienceRow>,
    pub publications: String,
    pub signature_name: String,
    pub signature_date: String,
}

/// Turns results into artifacts and writes them to the output directory
pub struct ResultExporter {
    placeholder: String,
    output_dir: PathBuf,
    events: Arc<dyn EventSink>,
}

impl Default for ResultExporter {
    fn default() -> Self {
        Self::new(&ExportSection::default())
    }
}

impl ResultExporter {
    pub fn new(config: &ExportSection) -> Self {
        Self {
            placeholder: config.placeholder.clone(),
            output_dir: config.output_dir.clone(),
            events: Arc::new(NoOpEvents),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Pretty-printed JSON artifact named `<name>.json`
    pub fn export_json<T: Serialize + ?Sized>(
        &self,
        value: &T,
        name: &str,
    ) -> Result<Artifact, ExportError> {
        let filename = if name.ends_with(".json") {
            name.to_string()
        } else {
            format!("{name}.json")
        };

        Ok(Artifact {
            filename,
            content_type: CONTENT_TYPE_JSON.to_string(),
            bytes: serde_json::to_vec_pretty(value)?,
        })
    }

    /// Output of one workflow stage as `step<N>_<slug>.json`, if the stage has run
    pub fn export_stage(
        &self,
        session: &WorkflowSession,
        stage: Stage,
    ) -> Result<Option<Artifact>, ExportError> {
        session
            .output_json(stage)
            .map(|output| {
                self.export_json(&output, &format!("step{}_{}", stage.number(), stage.slug()))
            })
            .transpose()
    }

    /// Merge fields for a structured record
    ///
    /// `today` is used as the signature date when the record has none.
    pub fn template_data(&self, record: &EuropassRecord, today: NaiveDate) -> EuropassTemplateData {
        let training = if record.training.is_empty() {
            vec![TrainingRow {
                period: self.placeholder.clone(),
                topic: NO_TRAINING.to_string(),
                provider: String::new(),
            }]
        } else {
            record
                .training
                .iter()
                .map(|entry| TrainingRow {
                    period: entry.period.clone(),
                    topic: entry.topic.clone(),
                    provider: entry.provider.clone(),
                })
                .collect()
        };

        EuropassTemplateData {
            proposed_role: record.proposed_role.clone(),
            family_name: record.family_name.clone(),
            first_name: record.first_name.clone(),
            date_of_birth: self.or_placeholder(record.date_of_birth.as_deref()),
            nationality: record.nationality.clone(),
            civil_status: self.or_placeholder(record.civil_status.as_deref()),
            residence_city: record.residence_city.clone(),
            education: record
                .education
                .iter()
                .map(|edu| EducationRow {
                    period: format_period(edu.from_date.as_deref(), edu.to_date.as_deref()),
                    institution: edu.institution.clone(),
                    diploma: edu.diploma.clone(),
                })
                .collect(),
            training,
            languages: record
                .language_skills
                .iter()
                .map(|lang| LanguageRow {
                    language: lang.language.clone(),
                    read: lang.reading.to_string(),
                    speak: lang.speaking.to_string(),
                    write: lang.writing.to_string(),
                })
                .collect(),
            membership_professional_bodies: self
                .or_placeholder(Some(record.membership_professional_bodies.as_str())),
            other_skills: self.or_placeholder(Some(record.other_skills.as_str())),
            present_position: record.present_position.clone(),
            years_within_firm: self.or_placeholder(record.years_within_firm.as_deref()),
            region_experience: record
                .specific_experience_in_region
                .iter()
                .map(|region| RegionRow {
                    country: region.country.clone(),
                    period: format_period(region.from_date.as_deref(), region.to_date.as_deref()),
                })
                .collect(),
            professional_experience: record
                .professional_experience
                .iter()
                .map(|exp| ExperienceRow {
                    period: format_period(exp.from_date.as_deref(), exp.to_date.as_deref()),
                    location: exp.location.clone(),
                    company: self.or_placeholder(Some(exp.company_reference_person.as_str())),
                    position: exp.position.clone(),
                    description: exp.description.clone(),
                })
                .collect(),
            publications: self.or_placeholder(Some(record.publications.as_str())),
            signature_name: non_empty(record.signature_name.as_deref())
                .map(str::to_string)
                .unwrap_or_else(|| record.display_name()),
            signature_date: non_empty(record.signature_date.as_deref())
                .map(str::to_string)
                .unwrap_or_else(|| today.format("%d/%m/%Y").to_string()),
        }
    }

    /// Merge fields for a normalized candidate, mapped onto the same template
    pub fn candidate_template_data(
        &self,
        candidate: &CanonicalCandidate,
        today: NaiveDate,
    ) -> EuropassTemplateData {
        let record = EuropassRecord {
            proposed_role: candidate.role_experience.first().cloned().unwrap_or_default(),
            family_name: candidate.family_name.clone(),
            first_name: candidate.first_name.clone(),
            date_of_birth: non_empty(Some(candidate.date_of_birth.as_str())).map(str::to_string),
            nationality: candidate.nationality.clone(),
            residence_city: candidate.residence_city.clone(),
            education: candidate
                .education
                .iter()
                .map(|edu| crate::schema::EuropassEducation {
                    institution: edu.institution.clone(),
                    from_date: None,
                    to_date: non_empty(Some(edu.year.as_str())).map(str::to_string),
                    diploma: edu.diploma.clone(),
                })
                .collect(),
            language_skills: candidate
                .language_skills
                .iter()
                .map(|skill| {
                    let level = match skill.level {
                        LanguageLevel::Native => 4,
                        LanguageLevel::Fluent => 3,
                        LanguageLevel::Intermediate => 2,
                    };
                    crate::schema::EuropassLanguage {
                        language: skill.language.clone(),
                        reading: level,
                        speaking: level,
                        writing: level,
                    }
                })
                .collect(),
            other_skills: candidate.technical_sectors.join(", "),
            specific_experience_in_region: candidate
                .specific_experience_in_region
                .iter()
                .map(|region| crate::schema::EuropassRegion {
                    country: region.country.clone(),
                    from_date: None,
                    to_date: None,
                })
                .collect(),
            ..Default::default()
        };

        self.template_data(&record, today)
    }

    /// Render template data into a document named `Europass_CV_<first>_<family>.<ext>`
    pub fn export_document(
        &self,
        data: &EuropassTemplateData,
        template: &[u8],
        renderer: &dyn TemplateRenderer,
    ) -> Result<Artifact, ExportError> {
        let merge_fields = serde_json::to_value(data)?;
        let bytes = renderer.render(template, &merge_fields)?;

        Ok(Artifact {
            filename: europass_filename(&data.first_name, &data.family_name, renderer.extension()),
            content_type: renderer.content_type().to_string(),
            bytes,
        })
    }

    /// Merge fields as `Europass_CV_<first>_<family>.json`, ready for an external renderer
    pub fn export_template_data(
        &self,
        data: &EuropassTemplateData,
    ) -> Result<Artifact, ExportError> {
        Ok(Artifact {
            filename: europass_filename(&data.first_name, &data.family_name, "json"),
            content_type: CONTENT_TYPE_JSON.to_string(),
            bytes: serde_json::to_vec_pretty(data)?,
        })
    }

    /// Write an artifact into the output directory
    pub async fn write(&self, artifact: &Artifact) -> Result<PathBuf, ExportError> {
        let span = export_span!(artifact = %artifact.filename, bytes = artifact.bytes.len());
        async {
            tokio::fs::create_dir_all(&self.output_dir).await?;
            let path = self.output_dir.join(&artifact.filename);
            tokio::fs::write(&path, &artifact.bytes).await?;
            debug!(path = %path.display(), "Artifact written");
            info!("Exported {}", artifact.filename);

            self.events
                .emit(PipelineEvent::ArtifactExported {
                    filename: artifact.filename.clone(),
                    bytes: artifact.bytes.len(),
                })
                .await;
            Ok(path)
        }
        .instrument(span)
        .await
    }

    fn or_placeholder(&self, value: Option<&str>) -> String {
        non_empty(value)
            .map(str::to_string)
            .unwrap_or_else(|| self.placeholder.clone())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// `<from> - <to>` with each side formatted by [`format_date`]
pub fn format_period(from: Option<&str>, to: Option<&str>) -> String {
    format!("{} - {}", format_date(from), format_date(to))
}

/// Full ISO dates become `DD/MM/YYYY`; partial dates (`2016`, `2020-07`, `present`)
/// are kept as they are; absent dates read `Not specified`.
pub fn format_date(date: Option<&str>) -> String {
    let Some(date) = non_empty(date) else {
        return NOT_SPECIFIED.to_string();
    };

    let bytes = date.as_bytes();
    let iso_shaped = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());

    if iso_shaped {
        if let Ok(parsed) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            return parsed.format("%d/%m/%Y").to_string();
        }
    }
    date.to_string()
}

pub fn europass_filename(first_name: &str, family_name: &str, extension: &str) -> String {
    let clean = |part: &str| -> String {
        part.trim()
            .chars()
            .map(|c| if c.is_whitespace() || c == '/' || c == '\\' { '_' } else { c })
            .collect()
    };
    format!(
        "Europass_CV_{}_{}.{}",
        clean(first_name),
        clean(family_name),
        extension
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EuropassEducation, EuropassExperience, TrainingEntry};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
    }

    fn record() -> EuropassRecord {
        EuropassRecord {
            first_name: "Jean".into(),
            family_name: "Dupont".into(),
            education: vec![EuropassEducation {
                institution: "Sorbonne".into(),
                from_date: Some("1995-09-01".into()),
                to_date: Some("present".into()),
                diploma: "MA".into(),
            }],
            professional_experience: vec![EuropassExperience {
                from_date: None,
                to_date: Some("2020-07".into()),
                position: "Team Leader".into(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date(Some("2019-03-15")), "15/03/2019");
        assert_eq!(format_date(Some("2016")), "2016");
        assert_eq!(format_date(Some("2020-07")), "2020-07");
        assert_eq!(format_date(Some("present")), "present");
        assert_eq!(format_date(Some("2019-13-45")), "2019-13-45");
        assert_eq!(format_date(None), "Not specified");
        assert_eq!(format_date(Some("  ")), "Not specified");
    }

    #[test]
    fn test_template_data_fallbacks() {
        let exporter = ResultExporter::default();
        let data = exporter.template_data(&record(), today());

        assert_eq!(data.education[0].period, "01/09/1995 - present");
        assert_eq!(data.professional_experience[0].period, "Not specified - 2020-07");
        assert_eq!(data.professional_experience[0].company, "N/A");
        assert_eq!(data.date_of_birth, "N/A");
        assert_eq!(data.years_within_firm, "N/A");
        assert_eq!(data.publications, "N/A");
        assert_eq!(data.signature_name, "Jean Dupont");
        assert_eq!(data.signature_date, "09/03/2026");
        assert_eq!(
            data.training,
            vec![TrainingRow {
                period: "N/A".into(),
                topic: "No training data available".into(),
                provider: String::new(),
            }]
        );
    }

    #[test]
    fn test_template_data_keeps_given_values() {
        let exporter = ResultExporter::default();
        let mut record = record();
        record.signature_name = Some("J. Dupont".into());
        record.signature_date = Some("01/02/2026".into());
        record.training = vec![TrainingEntry {
            period: "2019".into(),
            topic: "PRINCE2".into(),
            provider: "Axelos".into(),
        }];

        let data = exporter.template_data(&record, today());
        assert_eq!(data.signature_name, "J. Dupont");
        assert_eq!(data.signature_date, "01/02/2026");
        assert_eq!(data.training[0].topic, "PRINCE2");
    }

    #[test]
    fn test_custom_placeholder() {
        let exporter = ResultExporter::new(&ExportSection {
            placeholder: "-".into(),
            ..Default::default()
        });
        let data = exporter.template_data(&record(), today());
        assert_eq!(data.other_skills, "-");
    }

    #[test]
    fn test_export_json_is_pretty() {
        let exporter = ResultExporter::default();
        let artifact = exporter
            .export_json(&serde_json::json!({"a": 1}), "expert_profile")
            .unwrap();
        assert_eq!(artifact.filename, "expert_profile.json");
        assert_eq!(artifact.content_type, CONTENT_TYPE_JSON);
        assert_eq!(String::from_utf8(artifact.bytes).unwrap(), "{\n  \"a\": 1\n}");
    }

    #[test]
    fn test_export_stage_requires_output() {
        let exporter = ResultExporter::default();
        let session = WorkflowSession::default();
        assert!(exporter
            .export_stage(&session, Stage::SelectAndRank)
            .unwrap()
            .is_none());
    }

    /// Appends the merged name and first education period to the template bytes
    struct SuffixRenderer;

    impl TemplateRenderer for SuffixRenderer {
        fn content_type(&self) -> &str {
            "text/plain"
        }

        fn extension(&self) -> &str {
            "txt"
        }

        fn render(&self, template: &[u8], data: &Value) -> Result<Vec<u8>, ExportError> {
            let field = |value: &Value| {
                value
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ExportError::Template("missing merge field".into()))
            };
            let line = format!(
                "{} {} ({})",
                field(&data["first_name"])?,
                field(&data["family_name"])?,
                field(&data["education"][0]["period"])?
            );
            let mut out = template.to_vec();
            out.extend_from_slice(line.as_bytes());
            Ok(out)
        }
    }

    #[test]
    fn test_export_document_delegates_to_renderer() {
        let exporter = ResultExporter::default();
        let data = exporter.template_data(&record(), today());
        let artifact = exporter
            .export_document(&data, b"CV: ", &SuffixRenderer)
            .unwrap();

        assert_eq!(artifact.filename, "Europass_CV_Jean_Dupont.txt");
        assert_eq!(artifact.content_type, "text/plain");
        assert_eq!(
            String::from_utf8(artifact.bytes).unwrap(),
            "CV: Jean Dupont (01/09/1995 - present)"
        );
    }

    #[test]
    fn test_renderer_errors_propagate() {
        let exporter = ResultExporter::default();
        let data = EuropassTemplateData::default();
        let error = exporter
            .export_document(&data, b"", &SuffixRenderer)
            .unwrap_err();
        assert!(matches!(error, ExportError::Template(_)));
    }

    #[test]
    fn test_export_template_data_as_json() {
        let exporter = ResultExporter::default();
        let data = exporter.template_data(&record(), today());
        let artifact = exporter.export_template_data(&data).unwrap();

        assert_eq!(artifact.filename, "Europass_CV_Jean_Dupont.json");
        assert_eq!(artifact.content_type, CONTENT_TYPE_JSON);
        let fields: Value = serde_json::from_slice(&artifact.bytes).unwrap();
        assert_eq!(fields["education"][0]["diploma"], "MA");
        assert_eq!(fields["signature_name"], "Jean Dupont");
    }

    #[test]
    fn test_candidate_template_data() {
        let exporter = ResultExporter::default();
        let candidate = crate::schema::normalize(&serde_json::json!({
            "Name": "Amina Otieno",
            "Languages": ["English (Native)"],
            "AcademicQualifications": ["MSc, Nairobi, 2008"],
        }));

        let data = exporter.candidate_template_data(&candidate, today());
        assert_eq!(data.first_name, "Amina");
        assert_eq!(data.languages[0].read, "4");
        assert_eq!(data.education[0].period, "Not specified - 2008");
        assert_eq!(data.signature_name, "Amina Otieno");
    }

    #[test]
    fn test_europass_filename_sanitized() {
        assert_eq!(
            europass_filename("Mary Ann", "van Dijk", "docx"),
            "Europass_CV_Mary_Ann_van_Dijk.docx"
        );
    }

    #[tokio::test]
    async fn test_write_creates_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ResultExporter::default().with_output_dir(dir.path().join("out"));
        let artifact = exporter.export_json(&vec![1, 2], "numbers").unwrap();

        let path = exporter.write(&artifact).await.unwrap();
        assert_eq!(path, dir.path().join("out").join("numbers.json"));
        assert!(tokio::fs::read(&path).await.unwrap().starts_with(b"["));
    }
}
