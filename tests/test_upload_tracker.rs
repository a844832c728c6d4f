//! Batch upload tracking tests
//!
//! Exercises admission, per-file correlation, independent completion and removal
//! against the scripted extraction service.

mod test_helpers;

use cvflow::client::{ParseResponse, ProcessedRecord};
use cvflow::document::AdmissionError;
use cvflow::events::PipelineEvent;
use cvflow::testing::{MockCall, MockExtractionService, RecordingEventSink};
use cvflow::tracker::{FileStatus, FileUploadTracker, ParseTarget};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{docx, pdf_of_size};

const MB: usize = 1024 * 1024;

fn tracker(
    service: &Arc<MockExtractionService>,
    events: &Arc<RecordingEventSink>,
    target: ParseTarget,
) -> FileUploadTracker {
    FileUploadTracker::new(service.clone(), target).with_events(events.clone())
}

#[tokio::test]
async fn test_oversized_file_rejected_without_upload() {
    let service = Arc::new(MockExtractionService::new());
    let events = Arc::new(RecordingEventSink::new());
    service.set_parsed("small.pdf", json!({"Name": "Small File"})).await;

    let report = tracker(&service, &events, ParseTarget::Candidate)
        .submit(vec![pdf_of_size("big.pdf", 5 * MB), pdf_of_size("small.pdf", MB)])
        .await;

    assert_eq!(report.accepted.len(), 1);
    assert!(matches!(
        report.rejected.as_slice(),
        [AdmissionError::TooLarge { name, .. }] if name == "big.pdf"
    ));
    assert_eq!(
        service.calls().await,
        vec![MockCall::UploadMultipleFiles(vec!["small.pdf".to_string()])]
    );

    let rejected = events.events().await.into_iter().find_map(|event| match event {
        PipelineEvent::FileRejected { name, reason } => Some((name, reason)),
        _ => None,
    });
    let (name, reason) = rejected.unwrap();
    assert_eq!(name, "big.pdf");
    assert!(reason.contains("4.5 MB"));
}

#[tokio::test]
async fn test_unsupported_type_rejected() {
    let service = Arc::new(MockExtractionService::new());
    let events = Arc::new(RecordingEventSink::new());
    let image = cvflow::DocumentFile::new("photo.png", "image/png", vec![1, 2, 3]);

    let tracker = tracker(&service, &events, ParseTarget::Candidate);
    let report = tracker.submit(vec![image]).await;

    assert!(report.accepted.is_empty());
    assert!(matches!(
        report.rejected[0],
        AdmissionError::UnsupportedType { .. }
    ));
    assert_eq!(service.call_count().await, 0);
    assert!(tracker.files().await.is_empty());
}

#[tokio::test]
async fn test_files_complete_independently_of_arrival_order() {
    let service = Arc::new(MockExtractionService::new());
    let events = Arc::new(RecordingEventSink::new());
    service.set_parsed("slow.pdf", json!({"Name": "Slow Candidate"})).await;
    service.set_parsed("fast.pdf", json!({"Name": "Fast Candidate"})).await;
    service.set_delay("slow.pdf", Duration::from_millis(80)).await;

    let tracker = tracker(&service, &events, ParseTarget::Candidate);
    let report = tracker
        .submit(vec![pdf_of_size("slow.pdf", 64), pdf_of_size("fast.pdf", 64)])
        .await;

    let slow = tracker.get(report.accepted[0]).await.unwrap();
    let fast = tracker.get(report.accepted[1]).await.unwrap();
    assert_eq!(slow.status, FileStatus::Completed);
    assert_eq!(fast.status, FileStatus::Completed);
    assert_eq!(
        slow.result.as_ref().and_then(|r| r.as_candidate()).map(|c| c.first_name.as_str()),
        Some("Slow")
    );
    assert_eq!(
        fast.result.as_ref().and_then(|r| r.as_candidate()).map(|c| c.first_name.as_str()),
        Some("Fast")
    );

    let completions: Vec<String> = events
        .events()
        .await
        .into_iter()
        .filter_map(|event| match event {
            PipelineEvent::FileCompleted { name, .. } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(completions, vec!["fast.pdf", "slow.pdf"]);
}

#[tokio::test]
async fn test_one_failure_does_not_affect_other_files() {
    let service = Arc::new(MockExtractionService::new());
    let events = Arc::new(RecordingEventSink::new());
    service.set_parsed("good.pdf", json!({"Name": "Good Candidate"})).await;
    service.set_file_error("bad.pdf", "Could not extract text").await;

    let tracker = tracker(&service, &events, ParseTarget::Candidate);
    tracker
        .submit(vec![pdf_of_size("good.pdf", 64), pdf_of_size("bad.pdf", 64)])
        .await;

    let files = tracker.files().await;
    assert_eq!(files[0].status, FileStatus::Completed);
    assert_eq!(files[0].progress, 100);
    assert_eq!(files[1].status, FileStatus::Error);
    assert_eq!(files[1].error.as_deref(), Some("Could not extract text"));
    assert!(files[1].result.is_none());

    let summary = tracker.summary().await;
    assert_eq!((summary.completed, summary.error, summary.total()), (1, 1, 2));
    assert!(events
        .events()
        .await
        .contains(&PipelineEvent::BatchFinished {
            completed: 1,
            failed: 1
        }));
}

#[tokio::test]
async fn test_duplicate_filenames_get_distinct_entries() {
    let service = Arc::new(MockExtractionService::new());
    let events = Arc::new(RecordingEventSink::new());
    service.set_parsed("cv.pdf", json!({"Name": "Same Name"})).await;

    let tracker = tracker(&service, &events, ParseTarget::Candidate);
    let report = tracker
        .submit(vec![pdf_of_size("cv.pdf", 10), pdf_of_size("cv.pdf", 20)])
        .await;

    assert_eq!(report.accepted.len(), 2);
    assert_ne!(report.accepted[0], report.accepted[1]);

    let files = tracker.files().await;
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].size, 10);
    assert_eq!(files[1].size, 20);
    assert!(files.iter().all(|f| f.status == FileStatus::Completed));
}

#[tokio::test]
async fn test_missing_record_fails_the_file() {
    let service = Arc::new(MockExtractionService::new());
    let events = Arc::new(RecordingEventSink::new());
    service
        .set_raw_response(
            "lost.pdf",
            ParseResponse {
                processed: vec![
                    ProcessedRecord {
                        filename: Some("other-1.pdf".to_string()),
                        parsed: Some(json!({})),
                        result: None,
                    },
                    ProcessedRecord {
                        filename: Some("other-2.pdf".to_string()),
                        parsed: Some(json!({})),
                        result: None,
                    },
                ],
                errors: vec![],
            },
        )
        .await;

    let tracker = tracker(&service, &events, ParseTarget::Candidate);
    tracker.submit(vec![pdf_of_size("lost.pdf", 10)]).await;

    let entry = &tracker.files().await[0];
    assert_eq!(entry.status, FileStatus::Error);
    assert_eq!(entry.error.as_deref(), Some("No result returned for lost.pdf"));
}

#[tokio::test]
async fn test_non_object_record_is_malformed() {
    let service = Arc::new(MockExtractionService::new());
    let events = Arc::new(RecordingEventSink::new());
    service.set_parsed("odd.pdf", json!(["not", "a", "record"])).await;

    let tracker = tracker(&service, &events, ParseTarget::Candidate);
    tracker.submit(vec![pdf_of_size("odd.pdf", 10)]).await;

    let entry = &tracker.files().await[0];
    assert_eq!(entry.status, FileStatus::Error);
    assert!(entry.error.as_deref().unwrap().starts_with("Malformed record"));
}

#[tokio::test]
async fn test_structured_target_validates_records() {
    let service = Arc::new(MockExtractionService::new());
    let events = Arc::new(RecordingEventSink::new());
    service
        .set_parsed(
            "europass.docx",
            json!({
                "first_name": "Jean",
                "family_name": "Dupont",
                "language_skills": [
                    {"language": "French", "reading": 5, "speaking": 5, "writing": 5}
                ]
            }),
        )
        .await;
    service
        .set_parsed("broken.docx", json!({"language_skills": "French"}))
        .await;

    let tracker = tracker(&service, &events, ParseTarget::Structured);
    tracker
        .submit(vec![docx("europass.docx"), docx("broken.docx")])
        .await;

    let files = tracker.files().await;
    let record = files[0]
        .result
        .as_ref()
        .and_then(|r| r.as_structured())
        .unwrap();
    assert_eq!(record.display_name(), "Jean Dupont");
    assert_eq!(record.language_skills[0].reading, 5);

    assert_eq!(files[1].status, FileStatus::Error);
    assert!(files[1].error.as_deref().unwrap().starts_with("Malformed record"));
    assert!(matches!(
        service.calls().await[0],
        MockCall::ParseStructured(_)
    ));
}

#[tokio::test]
async fn test_remove_is_idempotent() {
    let service = Arc::new(MockExtractionService::new());
    let events = Arc::new(RecordingEventSink::new());
    service.set_parsed("cv.pdf", json!({"Name": "Amina Otieno"})).await;

    let tracker = tracker(&service, &events, ParseTarget::Candidate);
    let report = tracker.submit(vec![pdf_of_size("cv.pdf", 10)]).await;
    let id = report.accepted[0];

    assert!(tracker.remove(id).await);
    assert!(!tracker.remove(id).await);
    assert!(tracker.get(id).await.is_none());
    assert_eq!(tracker.summary().await.total(), 0);
}

#[tokio::test]
async fn test_removed_entry_ignores_late_result() {
    let service = Arc::new(MockExtractionService::new());
    let events = Arc::new(RecordingEventSink::new());
    service.set_parsed("slow.pdf", json!({"Name": "Late Result"})).await;
    service.set_delay("slow.pdf", Duration::from_millis(100)).await;

    let tracker = Arc::new(tracker(&service, &events, ParseTarget::Candidate));
    let submitting = {
        let tracker = tracker.clone();
        tokio::spawn(async move { tracker.submit(vec![pdf_of_size("slow.pdf", 10)]).await })
    };

    // Wait for the entry to be dispatched, then remove it mid-flight
    let mut id = None;
    for _ in 0..50 {
        if let Some(entry) = tracker.files().await.first() {
            if entry.status == FileStatus::Processing {
                id = Some(entry.id);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let id = id.expect("entry should reach processing");
    assert!(tracker.remove(id).await);

    submitting.await.unwrap();
    assert!(tracker.files().await.is_empty());
    assert!(!events
        .events()
        .await
        .iter()
        .any(|event| matches!(event, PipelineEvent::FileCompleted { .. })));
}
