//! reqwest implementation of [`ExtractionService`]

use super::wire::{
    error_detail, Assignment, Narrative, ParseResponse, Stage1Output, Stage2Output, Stage3Output,
    Stage4Output, TenderResponse,
};
use super::{ExtractionService, ServiceError};
use crate::config::{EndpointsSection, PipelineConfig};
use crate::document::{mime_from_extension, DocumentFile};
use crate::error::PipelineError;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const UPLOAD_FAILED: &str = "Upload failed";

/// HTTP client for the extraction service
///
/// Requests wait indefinitely unless a timeout is configured.
pub struct HttpExtractionService {
    base_url: String,
    endpoints: EndpointsSection,
    client: Client,
}

impl HttpExtractionService {
    pub fn new(
        base_url: impl Into<String>,
        endpoints: EndpointsSection,
        timeout: Option<Duration>,
    ) -> Result<Self, ServiceError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into(),
            endpoints,
            client,
        })
    }

    /// Build a client from configuration, applying the base URL override
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let base_url = config.resolve_base_url()?;
        debug!(base_url = %base_url, "Creating extraction service client");
        Ok(Self::new(
            base_url,
            config.endpoints.clone(),
            config.timeout(),
        )?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn file_part(file: &DocumentFile) -> Result<Part, ServiceError> {
        let mime = match file.mime_type.trim() {
            "" => mime_from_extension(&file.name),
            declared => declared,
        };
        Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(mime)
            .map_err(|e| ServiceError::Transport(format!("Invalid mime type '{mime}': {e}")))
    }

    /// Send a request and decode a 2xx JSON body
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        fallback: &str,
    ) -> Result<T, ServiceError> {
        let response = request.send().await.map_err(|e| {
            warn!(
                is_connect = e.is_connect(),
                is_timeout = e.is_timeout(),
                "Extraction service request failed: {}",
                e
            );
            ServiceError::Transport(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = upstream_detail(&body).unwrap_or_else(|| fallback.to_string());
            warn!(status = status.as_u16(), "Extraction service returned an error: {}", message);
            return Err(ServiceError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_slice(&body).map_err(|e| {
            warn!("Extraction service response did not match expected shape: {}", e);
            ServiceError::MalformedResponse(e.to_string())
        })
    }

    async fn parse_batch(&self, path: &str, files: &[DocumentFile]) -> ParseResponse {
        let mut form = Form::new();
        for file in files {
            match Self::file_part(file) {
                Ok(part) => form = form.part("files", part),
                Err(e) => return ParseResponse::failed(files, &e.to_string()),
            }
        }

        debug!(path, files = files.len(), "Uploading documents for parsing");
        let request = self.client.post(self.url(path)).multipart(form);
        match self.send::<ParseResponse>(request, UPLOAD_FAILED).await {
            Ok(response) => response,
            Err(e) => ParseResponse::failed(files, &e.to_string()),
        }
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        step: u8,
    ) -> Result<T, ServiceError> {
        debug!(path, step, "Posting workflow step");
        let request = self.client.post(self.url(path)).json(body);
        self.send(request, &step_fallback(step)).await
    }
}

fn step_fallback(step: u8) -> String {
    format!("Failed to process step {step}")
}

/// Human-readable detail from an error body (`detail`, `error` or `message`)
fn upstream_detail(body: &[u8]) -> Option<String> {
    match serde_json::from_slice::<Value>(body).ok()? {
        Value::Object(map) => error_detail(&map),
        _ => None,
    }
}

#[async_trait]
impl ExtractionService for HttpExtractionService {
    async fn upload_multiple_files(&self, files: &[DocumentFile]) -> ParseResponse {
        self.parse_batch(&self.endpoints.upload_multiple_files, files)
            .await
    }

    async fn parse_structured(&self, files: &[DocumentFile]) -> ParseResponse {
        self.parse_batch(&self.endpoints.parse_structured, files)
            .await
    }

    async fn workflow_step1(
        &self,
        cv: &DocumentFile,
        tender: &DocumentFile,
    ) -> Result<Stage1Output, ServiceError> {
        let form = Form::new()
            .part("cv", Self::file_part(cv)?)
            .part("tender", Self::file_part(tender)?);

        debug!(cv = %cv.name, tender = %tender.name, "Posting workflow step 1");
        let request = self
            .client
            .post(self.url(&self.endpoints.workflow_step1))
            .multipart(form);
        self.send(request, &step_fallback(1)).await
    }

    async fn workflow_step2(
        &self,
        cv_assignments: &[Assignment],
        tender_assignments: &[Assignment],
    ) -> Result<Stage2Output, ServiceError> {
        #[derive(Serialize)]
        struct Body<'a> {
            cv_assignments: &'a [Assignment],
            tender_assignments: &'a [Assignment],
        }

        self.post_json(
            &self.endpoints.workflow_step2,
            &Body {
                cv_assignments,
                tender_assignments,
            },
            2,
        )
        .await
    }

    async fn workflow_step3(
        &self,
        selected_assignments: &[Assignment],
        cv_text: &str,
    ) -> Result<Stage3Output, ServiceError> {
        #[derive(Serialize)]
        struct Body<'a> {
            selected_assignments: &'a [Assignment],
            cv_text: &'a str,
        }

        self.post_json(
            &self.endpoints.workflow_step3,
            &Body {
                selected_assignments,
                cv_text,
            },
            3,
        )
        .await
    }

    async fn workflow_step4(
        &self,
        write_up: &Narrative,
        cv_text: &str,
        tender_assignments: &[Assignment],
    ) -> Result<Stage4Output, ServiceError> {
        #[derive(Serialize)]
        struct Body<'a> {
            write_up: &'a Narrative,
            cv_text: &'a str,
            tender_assignments: &'a [Assignment],
        }

        self.post_json(
            &self.endpoints.workflow_step4,
            &Body {
                write_up,
                cv_text,
                tender_assignments,
            },
            4,
        )
        .await
    }

    async fn upload_single_document(&self, file: &DocumentFile) -> TenderResponse {
        let part = match Self::file_part(file) {
            Ok(part) => part,
            Err(e) => return TenderResponse::failed(e.to_string()),
        };

        debug!(file = %file.name, "Submitting tender for matching");
        let request = self
            .client
            .post(self.url(&self.endpoints.upload_single_document))
            .multipart(Form::new().part("file", part));

        match self.send::<TenderResponse>(request, UPLOAD_FAILED).await {
            Ok(response) => response,
            Err(e) => TenderResponse::failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let service = HttpExtractionService::new(
            "http://localhost:8000/",
            EndpointsSection::default(),
            None,
        )
        .unwrap();
        assert_eq!(
            service.url("/upload-tender"),
            "http://localhost:8000/upload-tender"
        );
    }

    #[test]
    fn test_upstream_detail_extraction() {
        assert_eq!(
            upstream_detail(br#"{"detail": "CV text could not be extracted"}"#),
            Some("CV text could not be extracted".to_string())
        );
        assert_eq!(
            upstream_detail(br#"{"error": "bad file"}"#),
            Some("bad file".to_string())
        );
        assert_eq!(upstream_detail(br#"{"detail": ""}"#), None);
        assert_eq!(upstream_detail(b"<html>502</html>"), None);
    }

    #[test]
    fn test_structured_detail_is_stringified() {
        let detail = upstream_detail(br#"{"detail": [{"loc": ["body", "cv"]}]}"#).unwrap();
        assert!(detail.contains("body"));
    }

    #[test]
    fn test_step_fallback_message() {
        assert_eq!(step_fallback(3), "Failed to process step 3");
    }
}
