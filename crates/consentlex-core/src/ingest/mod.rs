//! Document ingestion pipeline
//!
//! Drives each upload through
//! `Uploaded → Validated → (Optimizing) → Submitted → Extracted | Failed`.
//! Failures are recorded on the [`DocumentRecord`]; they never abort the
//! session, the document simply contributes no text.

mod optimize;
mod text;
mod validate;

pub use optimize::{optimize_image, optimize_pdf, Optimized};
pub use text::{docx_text, normalize_text, pdf_text_layer, plain_text};
pub use validate::{
    extension_of, media_type_for, validate_upload, UploadKind, ValidatedUpload,
    SUPPORTED_EXTENSIONS,
};

use crate::config::IngestionConfig;
use crate::error::{ConsentLexError, ErrorKind, Result};
use crate::ocr::OcrClient;
use crate::session::{DocumentId, DocumentRecord, DocumentState, FailureReason, SessionState};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::Instrument;

/// Where the extracted text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    PlainText,
    WordProcessor,
    TextLayer,
    Ocr,
}

impl fmt::Display for TextSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TextSource::PlainText => "plain text",
            TextSource::WordProcessor => "Word document",
            TextSource::TextLayer => "PDF text layer",
            TextSource::Ocr => "OCR",
        })
    }
}

/// Outcome of ingesting one upload
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document: DocumentId,
    pub filename: String,
    pub state: DocumentState,
    pub source: Option<TextSource>,
    pub chars: usize,
    pub partial: bool,
    pub failure: Option<FailureReason>,
    /// Message for the user
    pub notice: String,
}

impl IngestReport {
    pub fn is_extracted(&self) -> bool {
        self.state == DocumentState::Extracted
    }
}

/// Map an adapter error onto the reason stored on the record.
pub fn failure_reason(error: &ConsentLexError) -> FailureReason {
    let detail = error.root().to_string();
    match error.root().kind() {
        ErrorKind::Validation => FailureReason::Unsupported(detail),
        ErrorKind::Configuration => FailureReason::Configuration(detail),
        ErrorKind::TransientNetwork | ErrorKind::Timeout | ErrorKind::RateLimit => {
            FailureReason::Unavailable(error.to_string())
        }
        _ => FailureReason::Extraction(detail),
    }
}

/// Validation, optimization and extraction of uploads
pub struct IngestionPipeline {
    config: IngestionConfig,
    ocr: Arc<dyn OcrClient>,
}

impl IngestionPipeline {
    pub fn new(config: IngestionConfig, ocr: Arc<dyn OcrClient>) -> Self {
        Self { config, ocr }
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    /// Register `bytes` as a new session document and process it.
    pub async fn ingest(
        &self,
        session: &mut SessionState,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestReport> {
        let id = session.add_document(filename, media_type_for(filename), bytes);
        let record = session.document_mut(id)?;
        Ok(self.process(record).await)
    }

    /// Run a freshly uploaded record through the state machine.
    pub async fn process(&self, record: &mut DocumentRecord) -> IngestReport {
        let span =
            tracing::info_span!("ingest", document = %record.id, filename = %record.filename);
        self.run_state_machine(record).instrument(span).await
    }

    async fn run_state_machine(&self, record: &mut DocumentRecord) -> IngestReport {
        let max_bytes = self.config.max_upload_bytes;
        let upload = match validate_upload(&record.filename, &record.bytes, max_bytes) {
            Ok(upload) => upload,
            Err(e) => {
                tracing::warn!(error = %e, "upload rejected");
                record.mark_failed(failure_reason(&e));
                return report(record, None);
            }
        };
        record.media_type = upload.media_type.clone();
        record.advance(DocumentState::Validated);

        let extracted = match upload.kind {
            UploadKind::PlainText => {
                record.advance(DocumentState::Submitted);
                Ok((plain_text(&record.bytes), TextSource::PlainText, false))
            }
            UploadKind::WordProcessor => {
                record.advance(DocumentState::Submitted);
                docx_text(&record.bytes).map(|t| (t, TextSource::WordProcessor, false))
            }
            UploadKind::Pdf | UploadKind::Image => self.extract_binary(record, &upload).await,
        };

        let source = match extracted {
            Ok((raw, source, partial)) => {
                let text = normalize_text(&raw);
                if text.is_empty() {
                    record.mark_failed(FailureReason::Extraction(
                        "no text could be extracted".to_string(),
                    ));
                    None
                } else {
                    tracing::info!(
                        source = %source,
                        chars = text.chars().count(),
                        partial,
                        "document extracted"
                    );
                    record.mark_extracted(text, partial);
                    Some(source)
                }
            }
            Err(e) => {
                tracing::warn!(
                    error_kind = %e.root().kind(),
                    error = %e,
                    "document extraction failed"
                );
                record.mark_failed(failure_reason(&e));
                None
            }
        };

        report(record, source)
    }

    async fn extract_binary(
        &self,
        record: &mut DocumentRecord,
        upload: &ValidatedUpload,
    ) -> Result<(String, TextSource, bool)> {
        if upload.kind == UploadKind::Pdf && self.config.prefer_text_layer {
            if let Some(text) = pdf_text_layer(&record.bytes) {
                record.advance(DocumentState::Submitted);
                return Ok((text, TextSource::TextLayer, false));
            }
        }

        let mut payload = Optimized {
            bytes: record.bytes.clone(),
            media_type: upload.media_type.clone(),
        };
        if self.config.optimize {
            record.advance(DocumentState::Optimizing);
            let optimized = match upload.kind {
                UploadKind::Pdf => optimize_pdf(&record.bytes),
                _ => optimize_image(&record.bytes, self.config.max_image_dimension),
            };
            match optimized {
                Ok(Some(better)) => payload = better,
                Ok(None) => tracing::debug!("optimization gave no improvement, sending original"),
                Err(e) => tracing::warn!(error = %e, "optimization failed, sending original"),
            }
        }

        record.advance(DocumentState::Submitted);
        let output = self.ocr.extract_text(&payload.bytes, &payload.media_type).await?;
        if output.is_partial() {
            tracing::warn!(
                failed_chunks = ?output.failed_chunks,
                chunks = output.chunks,
                "OCR succeeded only partially"
            );
        }
        let partial = output.is_partial();
        Ok((output.text, TextSource::Ocr, partial))
    }
}

fn report(record: &DocumentRecord, source: Option<TextSource>) -> IngestReport {
    let chars = record
        .extracted_text
        .as_ref()
        .map(|t| t.chars().count())
        .unwrap_or(0);

    let notice = match (&record.failure, source) {
        (Some(reason), _) => {
            let hint = match reason {
                FailureReason::Unsupported(_) => {
                    "Upload a PDF, an image, a .txt/.md or a .docx file."
                }
                FailureReason::Extraction(_) => "Try a clearer scan or another format.",
                FailureReason::Unavailable(_) => {
                    "The OCR service could not be reached; try again later."
                }
                FailureReason::Configuration(_) => "Check the OCR api_key in your configuration.",
            };
            format!("{} was not processed ({}). {}", record.filename, reason, hint)
        }
        (None, Some(source)) if record.partial => format!(
            "{}: {} characters extracted via {}, but part of the document could not be read.",
            record.filename, chars, source
        ),
        (None, Some(source)) => format!(
            "{}: {} characters extracted via {}.",
            record.filename, chars, source
        ),
        (None, None) => format!("{} is {}.", record.filename, record.state),
    };

    IngestReport {
        document: record.id,
        filename: record.filename.clone(),
        state: record.state,
        source,
        chars,
        partial: record.partial,
        failure: record.failure.clone(),
        notice,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{ServiceKind, ServiceStatus};
    use crate::ocr::OcrOutput;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// OCR fake that counts calls and returns a fixed result
    struct FakeOcr {
        calls: AtomicU32,
        result: Mutex<Option<Result<OcrOutput>>>,
    }

    impl FakeOcr {
        fn returning(result: Result<OcrOutput>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                result: Mutex::new(Some(result)),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OcrClient for FakeOcr {
        async fn extract_text(&self, _bytes: &[u8], _media_type: &str) -> Result<OcrOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(ConsentLexError::Extraction("exhausted".into())))
        }

        async fn probe(&self) -> ServiceStatus {
            ServiceStatus::unconfigured(ServiceKind::Ocr)
        }
    }

    fn text_output(text: &str, failed: Vec<usize>) -> Result<OcrOutput> {
        Ok(OcrOutput {
            text: text.to_string(),
            chunks: 2,
            failed_chunks: failed,
            cached: false,
        })
    }

    fn pipeline(ocr: Arc<FakeOcr>) -> IngestionPipeline {
        IngestionPipeline::new(IngestionConfig::default(), ocr)
    }

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[tokio::test]
    async fn test_unsupported_extension_fails_without_ocr() {
        let ocr = FakeOcr::returning(text_output("never", vec![]));
        let mut session = SessionState::new();

        let report = pipeline(ocr.clone())
            .ingest(&mut session, "malware.exe", b"MZ\x90\0".to_vec())
            .await
            .unwrap();

        assert_eq!(report.state, DocumentState::Failed);
        assert_eq!(report.failure.as_ref().map(|f| f.code()), Some("unsupported"));
        assert_eq!(ocr.calls(), 0);
        assert!(session.document(report.document).unwrap().extracted_text.is_none());
    }

    #[tokio::test]
    async fn test_plain_text_skips_ocr() {
        let ocr = FakeOcr::returning(text_output("never", vec![]));
        let mut session = SessionState::new();

        let report = pipeline(ocr.clone())
            .ingest(&mut session, "notas.md", b"# Consentimiento\r\n\r\n\r\nRiesgos".to_vec())
            .await
            .unwrap();

        assert!(report.is_extracted());
        assert_eq!(report.source, Some(TextSource::PlainText));
        assert_eq!(ocr.calls(), 0);
        assert_eq!(
            session.document(report.document).unwrap().extracted_text.as_deref(),
            Some("# Consentimiento\n\nRiesgos")
        );
    }

    #[tokio::test]
    async fn test_image_goes_through_ocr_with_original_bytes_when_optimization_fails() {
        let ocr = FakeOcr::returning(text_output("Texto reconocido", vec![]));
        let mut session = SessionState::new();

        // Valid magic bytes but not decodable: optimization fails, original is sent.
        let report = pipeline(ocr.clone())
            .ingest(&mut session, "scan.png", PNG_MAGIC.to_vec())
            .await
            .unwrap();

        assert!(report.is_extracted());
        assert_eq!(report.source, Some(TextSource::Ocr));
        assert_eq!(ocr.calls(), 1);
    }

    #[tokio::test]
    async fn test_partial_ocr_is_flagged() {
        let ocr = FakeOcr::returning(text_output("Página 1", vec![1]));
        let mut session = SessionState::new();

        let report = pipeline(ocr)
            .ingest(&mut session, "scan.png", PNG_MAGIC.to_vec())
            .await
            .unwrap();

        assert!(report.is_extracted());
        assert!(report.partial);
        assert!(report.notice.contains("could not be read"));
        assert!(session.document(report.document).unwrap().partial);
    }

    #[tokio::test]
    async fn test_ocr_failure_keeps_session_going() {
        let ocr = FakeOcr::returning(Err(ConsentLexError::RetriesExhausted {
            operation: "ocr.recognize[1/1]".into(),
            attempts: 4,
            source: Box::new(ConsentLexError::TransientNetwork("down".into())),
        }));
        let mut session = SessionState::new();
        let pipeline = pipeline(ocr);

        let failed = pipeline
            .ingest(&mut session, "scan.png", PNG_MAGIC.to_vec())
            .await
            .unwrap();
        assert_eq!(failed.state, DocumentState::Failed);
        assert_eq!(failed.failure.as_ref().map(|f| f.code()), Some("unavailable"));

        let ok = pipeline
            .ingest(&mut session, "notas.txt", b"sigue".to_vec())
            .await
            .unwrap();
        assert!(ok.is_extracted());
        assert!(session.context_bundle().unwrap().contains("sigue"));
    }

    #[tokio::test]
    async fn test_blank_ocr_text_is_extraction_failure() {
        let ocr = FakeOcr::returning(text_output(" \n\n ", vec![]));
        let mut session = SessionState::new();

        let report = pipeline(ocr)
            .ingest(&mut session, "scan.png", PNG_MAGIC.to_vec())
            .await
            .unwrap();
        assert_eq!(report.failure.as_ref().map(|f| f.code()), Some("extraction"));
    }

    #[test]
    fn test_failure_reason_mapping() {
        assert_eq!(
            failure_reason(&ConsentLexError::Validation("x".into())).code(),
            "unsupported"
        );
        assert_eq!(
            failure_reason(&ConsentLexError::Configuration("x".into())).code(),
            "configuration"
        );
        assert_eq!(
            failure_reason(&ConsentLexError::Extraction("x".into())).code(),
            "extraction"
        );
        assert_eq!(failure_reason(&ConsentLexError::Timeout("x".into())).code(), "unavailable");
    }
}
