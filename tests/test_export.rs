//! Artifact export tests: merge fields, delegated rendering and writes to disk

use chrono::NaiveDate;
use cvflow::config::ExportSection;
use cvflow::events::PipelineEvent;
use cvflow::export::{ExportError, ResultExporter, TemplateRenderer};
use cvflow::schema::{normalize, EuropassRecord};
use cvflow::testing::RecordingEventSink;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

/// Renders one line per education row after the template header
struct EducationListRenderer;

impl TemplateRenderer for EducationListRenderer {
    fn content_type(&self) -> &str {
        "text/plain"
    }

    fn extension(&self) -> &str {
        "txt"
    }

    fn render(&self, template: &[u8], data: &Value) -> Result<Vec<u8>, ExportError> {
        let rows = data["education"]
            .as_array()
            .ok_or_else(|| ExportError::Template("education is not a list".into()))?;
        let mut out = String::from_utf8_lossy(template).into_owned();
        for row in rows {
            out.push_str(&format!(
                "\n- {} {}, {}",
                row["period"].as_str().unwrap_or_default(),
                row["diploma"].as_str().unwrap_or_default(),
                row["institution"].as_str().unwrap_or_default()
            ));
        }
        Ok(out.into_bytes())
    }
}

fn record() -> EuropassRecord {
    serde_json::from_value(json!({
        "first_name": "Jean",
        "family_name": "Dupont",
        "date_of_birth": null,
        "education": [
            {"institution": "Sciences Po", "from_date": "2001-09-01", "to_date": "2003-06-30", "diploma": "MPA"}
        ],
        "training": [],
        "language_skills": [
            {"language": "French", "reading": 5, "speaking": 5, "writing": 4}
        ]
    }))
    .unwrap()
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
}

#[test]
fn test_merge_fields_follow_template_rules() {
    let exporter = ResultExporter::default();
    let data = exporter.template_data(&record(), today());

    let artifact = exporter.export_template_data(&data).unwrap();
    assert_eq!(artifact.filename, "Europass_CV_Jean_Dupont.json");

    let fields: Value = serde_json::from_slice(&artifact.bytes).unwrap();
    assert_eq!(fields["date_of_birth"], "N/A");
    assert_eq!(fields["education"][0]["period"], "01/09/2001 - 30/06/2003");
    assert_eq!(
        fields["training"],
        json!([{"period": "N/A", "topic": "No training data available", "provider": ""}])
    );
    assert_eq!(
        fields["languages"],
        json!([{"language": "French", "read": "5", "speak": "5", "write": "4"}])
    );
    assert_eq!(fields["signature_name"], "Jean Dupont");
    assert_eq!(fields["signature_date"], "14/03/2026");
}

#[test]
fn test_document_rendering_is_delegated_to_renderer() {
    let exporter = ResultExporter::default();
    let data = exporter.template_data(&record(), today());

    let artifact = exporter
        .export_document(&data, b"Education", &EducationListRenderer)
        .unwrap();

    assert_eq!(artifact.filename, "Europass_CV_Jean_Dupont.txt");
    assert_eq!(artifact.content_type, "text/plain");
    assert_eq!(
        String::from_utf8(artifact.bytes).unwrap(),
        "Education\n- 01/09/2001 - 30/06/2003 MPA, Sciences Po"
    );
}

#[test]
fn test_custom_placeholder_is_used() {
    let exporter = ResultExporter::new(&ExportSection {
        placeholder: "-".to_string(),
        ..Default::default()
    });
    let data = exporter.template_data(&record(), today());
    assert_eq!(data.date_of_birth, "-");
    assert_eq!(data.publications, "-");
}

#[test]
fn test_normalized_candidate_maps_onto_template() {
    let candidate = normalize(&json!({
        "Name": "Amina Otieno",
        "Languages": ["English (Native)", "French (Good)"],
        "AcademicQualifications": ["MSc Economics, University of Nairobi, 2008"]
    }));

    let exporter = ResultExporter::default();
    let data = exporter.candidate_template_data(&candidate, today());

    assert_eq!(data.first_name, "Amina");
    assert_eq!(data.languages[0].read, "4");
    assert_eq!(data.languages[1].read, "3");
    assert_eq!(data.education[0].period, "Not specified - 2008");
}

#[tokio::test]
async fn test_write_creates_output_dir_and_notifies() {
    let dir = TempDir::new().unwrap();
    let events = Arc::new(RecordingEventSink::new());
    let exporter = ResultExporter::default()
        .with_output_dir(dir.path().join("exports"))
        .with_events(events.clone());

    let artifact = exporter
        .export_json(&json!({"selected_assignments": []}), "step2_selection")
        .unwrap();
    let path = exporter.write(&artifact).await.unwrap();

    assert_eq!(path, dir.path().join("exports").join("step2_selection.json"));
    let written: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(written, json!({"selected_assignments": []}));
    assert_eq!(
        events.events().await,
        vec![PipelineEvent::ArtifactExported {
            filename: "step2_selection.json".to_string(),
            bytes: artifact.bytes.len(),
        }]
    );
}
