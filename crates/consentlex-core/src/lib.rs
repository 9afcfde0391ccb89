//! ConsentLex Core Library
//!
//! Resilient plumbing for a consent-document review assistant.
//!
//! # Features
//! - Retry executor with exponential backoff and error classification
//! - Assistants API adapter with run polling and stall detection
//! - OCR adapter with page chunking, partial results and a result cache
//! - Upload ingestion: validation, image/PDF optimization, text extraction
//! - Transcript export with ordered fallback strategies (Markdown, HTML, PDF)
//! - In-memory session state and service diagnostics

pub mod assistant;
pub mod config;
pub mod consult;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod ingest;
pub mod ocr;
pub mod retry;
pub mod session;

pub use assistant::{AssistantClient, AssistantReply, OpenAiAssistantClient, RunOutcome, RunStatus};
pub use config::Config;
pub use consult::Consultation;
pub use diagnostics::{DiagnosticsReport, ServiceKind, ServiceMonitor, ServiceStatus};
pub use error::{ConsentLexError, Error, ErrorKind, Result};
pub use export::{
    ExportArtifact, ExportFormat, ExportOutcome, ExportPipeline, ExportRequest, ExportStrategy,
};
pub use ingest::{IngestReport, IngestionPipeline, TextSource};
pub use ocr::{OcrAdapter, OcrBackend, OcrClient, OcrOutput, OcrSpaceBackend};
pub use retry::{with_retry, Operation, RetryPolicy};
pub use session::{ConversationTurn, DocumentId, DocumentRecord, DocumentState, Role, SessionState};

/// Crate version reported by diagnostics
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default cache directory name
pub const CACHE_DIR_NAME: &str = "consentlex";

/// Default config directory name
pub const CONFIG_DIR_NAME: &str = "consentlex";
