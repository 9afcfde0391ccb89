//! HTTP backend for the OCR.space parse API

use super::OcrBackend;
use crate::config::OcrConfig;
use crate::diagnostics::{ServiceKind, ServiceStatus};
use crate::error::{ConsentLexError, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const SERVICE: &str = "ocr";

/// OCR.space client for a single chunk
pub struct OcrSpaceBackend {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    language: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParseResponse {
    #[serde(default)]
    parsed_results: Vec<ParsedResult>,
    #[serde(default, rename = "OCRExitCode")]
    ocr_exit_code: Option<Value>,
    #[serde(default)]
    is_errored_on_processing: bool,
    #[serde(default)]
    error_message: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ParsedResult {
    #[serde(default)]
    parsed_text: String,
    #[serde(default)]
    error_message: Value,
}

impl OcrSpaceBackend {
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConsentLexError::from_transport(SERVICE, e))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            language: config.language.clone(),
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            ConsentLexError::Configuration("OCR api_key is not set".to_string())
        })
    }

    fn parse_url(&self) -> String {
        format!("{}/parse/image", self.base_url)
    }
}

/// Flatten the API's `ErrorMessage`, which is a string, a list of strings or null.
fn error_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; "),
        _ => String::new(),
    }
}

fn is_quota_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("quota") || lower.contains("maximum") || lower.contains("limit exceeded")
}

/// Map a processing error reported inside a 200 response.
fn processing_error(message: String) -> ConsentLexError {
    let lower = message.to_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        ConsentLexError::Timeout(format!("{SERVICE}: {message}"))
    } else if is_quota_message(&message) {
        ConsentLexError::Extraction(format!("OCR quota exceeded: {message}"))
    } else if message.is_empty() {
        ConsentLexError::Extraction("OCR service reported a processing error".to_string())
    } else {
        ConsentLexError::Extraction(message)
    }
}

#[async_trait]
impl OcrBackend for OcrSpaceBackend {
    async fn recognize(&self, chunk: &[u8], media_type: &str) -> Result<String> {
        let api_key = self.api_key()?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(chunk);
        let data_url = format!("data:{media_type};base64,{encoded}");

        let form = [
            ("base64Image", data_url.as_str()),
            ("language", self.language.as_str()),
            ("isOverlayRequired", "false"),
            ("detectOrientation", "true"),
            ("scale", "true"),
            ("OCREngine", "2"),
        ];

        let response = self
            .http_client
            .post(self.parse_url())
            .header("apikey", api_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| ConsentLexError::from_transport(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::FORBIDDEN && is_quota_message(&body) {
                return Err(ConsentLexError::Extraction(format!(
                    "OCR quota exceeded: {}",
                    body.trim()
                )));
            }
            return Err(ConsentLexError::from_status(SERVICE, status, body, None));
        }

        let parsed: ParseResponse = response
            .json()
            .await
            .map_err(|e| ConsentLexError::from_transport(SERVICE, e))?;

        let exit_code = parsed.ocr_exit_code.as_ref().and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        });
        tracing::debug!(
            exit_code,
            results = parsed.parsed_results.len(),
            errored = parsed.is_errored_on_processing,
            "OCR response"
        );

        if parsed.is_errored_on_processing || matches!(exit_code, Some(3) | Some(4)) {
            let mut message = error_text(&parsed.error_message);
            if message.is_empty() {
                message = parsed
                    .parsed_results
                    .iter()
                    .map(|r| error_text(&r.error_message))
                    .find(|m| !m.is_empty())
                    .unwrap_or_default();
            }
            return Err(processing_error(message));
        }

        let text = parsed
            .parsed_results
            .iter()
            .map(|r| r.parsed_text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(text)
    }

    async fn probe(&self) -> ServiceStatus {
        let Some(ref api_key) = self.api_key else {
            return ServiceStatus::unconfigured(ServiceKind::Ocr);
        };

        // An empty URL submission costs no quota and still exercises the key.
        let response = self
            .http_client
            .post(self.parse_url())
            .header("apikey", api_key)
            .form(&[("url", ""), ("language", self.language.as_str())])
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status();
                let credential_valid = !matches!(status.as_u16(), 401 | 403);
                let body = resp.text().await.unwrap_or_default();
                let mut result =
                    ServiceStatus::probed(ServiceKind::Ocr, true, Some(credential_valid));
                if !credential_valid {
                    result = result.with_error(format!("HTTP {status}: {}", body.trim()));
                }
                result
            }
            Err(e) => ServiceStatus::probed(ServiceKind::Ocr, false, None)
                .with_error(ConsentLexError::from_transport(SERVICE, e).to_string()),
        }
    }

    fn name(&self) -> &str {
        "ocr.space"
    }
}
