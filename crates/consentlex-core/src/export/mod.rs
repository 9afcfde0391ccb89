//! Multi-strategy conversation export
//!
//! Each [`ExportFormat`] has a fixed, ordered chain of [`ExportStrategy`]
//! implementations. The pipeline tries them in order, validates whatever a
//! strategy produced, and stops at the first acceptable artifact. When the
//! whole chain fails the plain-text fallback renders the conversation and the
//! artifact is flagged as degraded.

mod html;
mod markdown;
mod pdf;
mod plain;

pub use html::{EscapedHtmlStrategy, PulldownHtmlStrategy};
pub use markdown::{render_markdown, MarkdownStrategy};
pub use pdf::{LopdfStrategy, PrintPdfStrategy};
pub use plain::{render_plain, PlainTextStrategy};

use crate::error::{ConsentLexError, Result};
use crate::session::{ConversationTurn, SessionState};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Artifact formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Markdown,
    Html,
    Pdf,
    /// Only produced by the fallback
    PlainText,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Html => "html",
            ExportFormat::Pdf => "pdf",
            ExportFormat::PlainText => "txt",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
            ExportFormat::Html => "text/html; charset=utf-8",
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::PlainText => "text/plain; charset=utf-8",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "markdown",
            ExportFormat::Html => "html",
            ExportFormat::Pdf => "pdf",
            ExportFormat::PlainText => "text",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ConsentLexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "html" | "htm" => Ok(ExportFormat::Html),
            "pdf" => Ok(ExportFormat::Pdf),
            "text" | "txt" | "plain" => Ok(ExportFormat::PlainText),
            other => Err(ConsentLexError::Validation(format!(
                "unknown export format '{other}' (use markdown, html or pdf)"
            ))),
        }
    }
}

/// What to export
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub title: String,
    /// Short session discriminator used in headers and file names
    pub session_label: String,
    pub generated_at: DateTime<Local>,
    pub turns: Vec<ConversationTurn>,
}

impl ExportRequest {
    pub fn new(
        title: impl Into<String>,
        session_label: impl Into<String>,
        turns: Vec<ConversationTurn>,
    ) -> Self {
        Self {
            title: title.into(),
            session_label: session_label.into(),
            generated_at: Local::now(),
            turns,
        }
    }

    pub fn from_session(session: &SessionState, title: impl Into<String>) -> Self {
        Self::new(title, session.short_id(), session.turns().to_vec())
    }

    pub fn with_generated_at(mut self, at: DateTime<Local>) -> Self {
        self.generated_at = at;
        self
    }

    /// `consentlex_<session>_<YYYYmmdd_HHMMSS>.<ext>`
    pub fn filename(&self, format: ExportFormat) -> String {
        format!(
            "consentlex_{}_{}.{}",
            self.session_label,
            self.generated_at.format("%Y%m%d_%H%M%S"),
            format.extension()
        )
    }
}

/// One way of producing an artifact
pub trait ExportStrategy: Send + Sync {
    /// Stable identifier recorded on the artifact
    fn id(&self) -> &str;

    fn format(&self) -> ExportFormat;

    fn attempt(&self, request: &ExportRequest) -> Result<Vec<u8>>;
}

/// Record of one strategy attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyResult {
    pub strategy: String,
    pub success: bool,
    pub failure: Option<String>,
}

/// A validated export
#[derive(Debug, Clone, Serialize)]
pub struct ExportArtifact {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub requested: ExportFormat,
    /// Format actually produced; differs from `requested` only when degraded
    pub format: ExportFormat,
    pub strategy: String,
    /// Produced by the first strategy of the chain
    pub primary: bool,
    /// Produced by the plain-text fallback instead of the requested format
    pub degraded: bool,
    pub attempts: Vec<StrategyResult>,
    pub filename: String,
}

impl ExportArtifact {
    /// Write the artifact into `dir` under its file name.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.filename);
        std::fs::write(&path, &self.bytes)?;
        tracing::info!(path = %path.display(), bytes = self.bytes.len(), "export written");
        Ok(path)
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Result of an export request
#[derive(Debug, Clone)]
pub enum ExportOutcome {
    /// The conversation has no turns; no file is produced
    NothingToExport,
    Produced(ExportArtifact),
}

impl ExportOutcome {
    pub fn artifact(&self) -> Option<&ExportArtifact> {
        match self {
            ExportOutcome::Produced(artifact) => Some(artifact),
            ExportOutcome::NothingToExport => None,
        }
    }
}

/// Reject artifacts that are empty or malformed for their format.
pub fn validate_artifact(format: ExportFormat, bytes: &[u8]) -> std::result::Result<(), String> {
    if bytes.is_empty() {
        return Err("empty output".to_string());
    }
    match format {
        ExportFormat::Pdf => {
            if !bytes.starts_with(b"%PDF-") {
                return Err("missing %PDF- header".to_string());
            }
            let doc = lopdf::Document::load_mem(bytes)
                .map_err(|e| format!("unreadable PDF: {e}"))?;
            if doc.get_pages().is_empty() {
                return Err("PDF has no pages".to_string());
            }
            Ok(())
        }
        ExportFormat::Html => {
            let text = std::str::from_utf8(bytes).map_err(|e| format!("invalid UTF-8: {e}"))?;
            let lower = text.to_ascii_lowercase();
            if lower.contains("<html") && lower.contains("</html>") {
                Ok(())
            } else {
                Err("not a complete HTML document".to_string())
            }
        }
        ExportFormat::Markdown | ExportFormat::PlainText => {
            let text = std::str::from_utf8(bytes).map_err(|e| format!("invalid UTF-8: {e}"))?;
            if text.trim().is_empty() {
                Err("blank output".to_string())
            } else {
                Ok(())
            }
        }
    }
}

/// Ordered strategy chains per format plus the guaranteed fallback
pub struct ExportPipeline {
    chains: HashMap<ExportFormat, Vec<Box<dyn ExportStrategy>>>,
    fallback: Box<dyn ExportStrategy>,
}

impl Default for ExportPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportPipeline {
    /// Default chains: pulldown-cmark then hand-escaped HTML; printpdf then lopdf.
    pub fn new() -> Self {
        let mut chains: HashMap<ExportFormat, Vec<Box<dyn ExportStrategy>>> = HashMap::new();
        chains.insert(ExportFormat::Markdown, vec![Box::new(MarkdownStrategy)]);
        chains.insert(
            ExportFormat::Html,
            vec![Box::new(PulldownHtmlStrategy), Box::new(EscapedHtmlStrategy)],
        );
        chains.insert(
            ExportFormat::Pdf,
            vec![Box::new(PrintPdfStrategy::default()), Box::new(LopdfStrategy::default())],
        );
        Self {
            chains,
            fallback: Box::new(PlainTextStrategy),
        }
    }

    /// Replace the chain for `format`.
    pub fn with_strategies(
        mut self,
        format: ExportFormat,
        strategies: Vec<Box<dyn ExportStrategy>>,
    ) -> Self {
        self.chains.insert(format, strategies);
        self
    }

    pub fn with_fallback(mut self, fallback: Box<dyn ExportStrategy>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Strategy ids for `format`, in the order they are tried
    pub fn strategy_ids(&self, format: ExportFormat) -> Vec<String> {
        self.chains
            .get(&format)
            .map(|chain| chain.iter().map(|s| s.id().to_string()).collect())
            .unwrap_or_default()
    }

    pub fn export(&self, request: &ExportRequest, format: ExportFormat) -> Result<ExportOutcome> {
        if request.turns.is_empty() {
            tracing::info!(format = %format, "nothing to export");
            return Ok(ExportOutcome::NothingToExport);
        }

        let chain = self.chains.get(&format).map(Vec::as_slice).unwrap_or(&[]);
        let mut attempts = Vec::with_capacity(chain.len() + 1);

        for (index, strategy) in chain.iter().enumerate() {
            match run_strategy(strategy.as_ref(), request) {
                Ok(bytes) => {
                    attempts.push(StrategyResult {
                        strategy: strategy.id().to_string(),
                        success: true,
                        failure: None,
                    });
                    tracing::info!(
                        format = %format,
                        strategy = strategy.id(),
                        primary = index == 0,
                        bytes = bytes.len(),
                        "export produced"
                    );
                    return Ok(ExportOutcome::Produced(ExportArtifact {
                        filename: request.filename(strategy.format()),
                        bytes,
                        requested: format,
                        format: strategy.format(),
                        strategy: strategy.id().to_string(),
                        primary: index == 0,
                        degraded: false,
                        attempts,
                    }));
                }
                Err(reason) => {
                    tracing::warn!(
                        format = %format,
                        strategy = strategy.id(),
                        error = %reason,
                        "export strategy failed, trying next"
                    );
                    attempts.push(StrategyResult {
                        strategy: strategy.id().to_string(),
                        success: false,
                        failure: Some(reason),
                    });
                }
            }
        }

        let fallback = self.fallback.as_ref();
        match run_strategy(fallback, request) {
            Ok(bytes) => {
                attempts.push(StrategyResult {
                    strategy: fallback.id().to_string(),
                    success: true,
                    failure: None,
                });
                let degraded = fallback.format() != format;
                if degraded {
                    tracing::warn!(
                        format = %format,
                        strategy = fallback.id(),
                        "degraded export produced"
                    );
                }
                Ok(ExportOutcome::Produced(ExportArtifact {
                    filename: request.filename(fallback.format()),
                    bytes,
                    requested: format,
                    format: fallback.format(),
                    strategy: fallback.id().to_string(),
                    primary: chain.is_empty(),
                    degraded,
                    attempts,
                }))
            }
            Err(reason) => {
                tracing::error!(
                    strategy = fallback.id(),
                    error = %reason,
                    "export fallback failed"
                );
                Err(ConsentLexError::ExportStrategy {
                    strategy: fallback.id().to_string(),
                    reason,
                })
            }
        }
    }
}

/// Attempt and validate, turning errors and panics into a failure reason.
fn run_strategy(
    strategy: &dyn ExportStrategy,
    request: &ExportRequest,
) -> std::result::Result<Vec<u8>, String> {
    let bytes = match catch_unwind(AssertUnwindSafe(|| strategy.attempt(request))) {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => return Err(e.to_string()),
        Err(_) => return Err("strategy panicked".to_string()),
    };
    validate_artifact(strategy.format(), &bytes).map_err(|e| format!("invalid artifact: {e}"))?;
    Ok(bytes)
}

/// Role label and local timestamp for a turn header
pub(crate) fn turn_heading(turn: &ConversationTurn) -> String {
    format!(
        "{} ({})",
        turn.role.label(),
        turn.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M")
    )
}

/// "Documents: #1, #2" line for turns with attachments
pub(crate) fn attachment_line(turn: &ConversationTurn) -> Option<String> {
    if turn.attachments.is_empty() {
        return None;
    }
    let ids: Vec<String> = turn.attachments.iter().map(ToString::to_string).collect();
    Some(format!("Documents: {}", ids.join(", ")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn request(turns: Vec<ConversationTurn>) -> ExportRequest {
        ExportRequest::new("ConsentLex report", "abcd1234", turns)
            .with_generated_at(Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap())
    }

    pub(crate) fn sample_turns() -> Vec<ConversationTurn> {
        vec![
            ConversationTurn::user("¿Este consentimiento cumple la Ley 41/2002?"),
            ConversationTurn::assistant(
                "**Sí**, en general.\n\n- Identifica el procedimiento\n- Describe riesgos <b>típicos</b>",
            ),
        ]
    }

    /// Strategy that always fails
    pub(crate) struct Broken(pub &'static str, pub ExportFormat);

    impl ExportStrategy for Broken {
        fn id(&self) -> &str {
            self.0
        }

        fn format(&self) -> ExportFormat {
            self.1
        }

        fn attempt(&self, _request: &ExportRequest) -> Result<Vec<u8>> {
            Err(ConsentLexError::ExportStrategy {
                strategy: self.0.to_string(),
                reason: "library unavailable".to_string(),
            })
        }
    }

    /// Strategy that returns bytes which fail validation
    struct Corrupt;

    impl ExportStrategy for Corrupt {
        fn id(&self) -> &str {
            "corrupt"
        }

        fn format(&self) -> ExportFormat {
            ExportFormat::Pdf
        }

        fn attempt(&self, _request: &ExportRequest) -> Result<Vec<u8>> {
            Ok(b"%PDF-1.4 truncated".to_vec())
        }
    }

    struct Panics;

    impl ExportStrategy for Panics {
        fn id(&self) -> &str {
            "panics"
        }

        fn format(&self) -> ExportFormat {
            ExportFormat::Html
        }

        fn attempt(&self, _request: &ExportRequest) -> Result<Vec<u8>> {
            panic!("font table missing")
        }
    }

    #[test]
    fn test_filename_format() {
        let req = request(sample_turns());
        assert_eq!(
            req.filename(ExportFormat::Pdf),
            "consentlex_abcd1234_20240305_140709.pdf"
        );
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("PDF".parse::<ExportFormat>().unwrap(), ExportFormat::Pdf);
        assert_eq!("md".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
        assert!("docx".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_empty_conversation_is_nothing_to_export() {
        let pipeline = ExportPipeline::new();
        for format in [ExportFormat::Markdown, ExportFormat::Html, ExportFormat::Pdf] {
            let outcome = pipeline.export(&request(vec![]), format).unwrap();
            assert!(matches!(outcome, ExportOutcome::NothingToExport));
        }
    }

    #[test]
    fn test_default_chains_use_primary_strategy() {
        let pipeline = ExportPipeline::new();
        let req = request(sample_turns());

        let md = pipeline.export(&req, ExportFormat::Markdown).unwrap();
        let md = md.artifact().unwrap();
        assert_eq!(md.strategy, "markdown");
        assert!(md.primary && !md.degraded);

        let html = pipeline.export(&req, ExportFormat::Html).unwrap();
        let html = html.artifact().unwrap();
        assert_eq!(html.strategy, "html-pulldown");
        assert_eq!(html.format, ExportFormat::Html);

        let pdf = pipeline.export(&req, ExportFormat::Pdf).unwrap();
        let pdf = pdf.artifact().unwrap();
        assert_eq!(pdf.strategy, "pdf-printpdf");
        assert!(pdf.bytes.starts_with(b"%PDF-"));
        assert!(pdf.filename.ends_with(".pdf"));
    }

    #[test]
    fn test_secondary_strategy_is_flagged_non_primary() {
        let pipeline = ExportPipeline::new().with_strategies(
            ExportFormat::Pdf,
            vec![
                Box::new(Broken("pdf-printpdf", ExportFormat::Pdf)),
                Box::new(LopdfStrategy::default()),
            ],
        );

        let outcome = pipeline.export(&request(sample_turns()), ExportFormat::Pdf).unwrap();
        let artifact = outcome.artifact().unwrap();
        assert_eq!(artifact.strategy, "pdf-lopdf");
        assert!(!artifact.primary);
        assert!(!artifact.degraded);
        assert_eq!(artifact.attempts.len(), 2);
        assert!(!artifact.attempts[0].success);
        assert!(artifact.attempts[0]
            .failure
            .as_deref()
            .unwrap()
            .contains("library unavailable"));
    }

    #[test]
    fn test_corrupt_artifacts_are_never_returned() {
        let pipeline = ExportPipeline::new().with_strategies(
            ExportFormat::Pdf,
            vec![Box::new(Corrupt), Box::new(LopdfStrategy::default())],
        );

        let outcome = pipeline.export(&request(sample_turns()), ExportFormat::Pdf).unwrap();
        let artifact = outcome.artifact().unwrap();
        assert_eq!(artifact.strategy, "pdf-lopdf");
        assert!(artifact.attempts[0].failure.as_deref().unwrap().contains("invalid artifact"));
    }

    #[test]
    fn test_panicking_strategy_falls_through() {
        let pipeline = ExportPipeline::new().with_strategies(
            ExportFormat::Html,
            vec![Box::new(Panics), Box::new(EscapedHtmlStrategy)],
        );
        let outcome = pipeline.export(&request(sample_turns()), ExportFormat::Html).unwrap();
        assert_eq!(outcome.artifact().unwrap().strategy, "html-escaped");
    }

    #[test]
    fn test_all_strategies_failing_yields_degraded_text() {
        let pipeline = ExportPipeline::new().with_strategies(
            ExportFormat::Pdf,
            vec![
                Box::new(Broken("a", ExportFormat::Pdf)),
                Box::new(Broken("b", ExportFormat::Pdf)),
            ],
        );

        let outcome = pipeline.export(&request(sample_turns()), ExportFormat::Pdf).unwrap();
        let artifact = outcome.artifact().unwrap();
        assert!(artifact.degraded);
        assert!(!artifact.primary);
        assert_eq!(artifact.format, ExportFormat::PlainText);
        assert_eq!(artifact.strategy, "plain-text");
        assert!(artifact.filename.ends_with(".txt"));
        assert_eq!(artifact.attempts.len(), 3);
        let text = String::from_utf8(artifact.bytes.clone()).unwrap();
        assert!(text.contains("Ley 41/2002"));
    }

    #[test]
    fn test_fallback_failure_is_fatal() {
        let pipeline = ExportPipeline::new()
            .with_strategies(ExportFormat::Markdown, vec![])
            .with_fallback(Box::new(Broken("plain-text", ExportFormat::PlainText)));

        let err = pipeline
            .export(&request(sample_turns()), ExportFormat::Markdown)
            .unwrap_err();
        assert!(matches!(err, ConsentLexError::ExportStrategy { .. }));
    }

    #[test]
    fn test_validate_artifact() {
        assert!(validate_artifact(ExportFormat::Markdown, b"").is_err());
        assert!(validate_artifact(ExportFormat::Markdown, b"  \n").is_err());
        assert!(validate_artifact(ExportFormat::Html, b"<p>x</p>").is_err());
        assert!(validate_artifact(ExportFormat::Html, b"<!DOCTYPE html><html></html>").is_ok());
        assert!(validate_artifact(ExportFormat::Pdf, b"hello").is_err());
    }

    #[test]
    fn test_write_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = ExportPipeline::new()
            .export(&request(sample_turns()), ExportFormat::Markdown)
            .unwrap();
        let path = outcome.artifact().unwrap().write_to(dir.path()).unwrap();
        assert!(path.ends_with("consentlex_abcd1234_20240305_140709.md"));
        assert!(std::fs::read_to_string(path).unwrap().contains("ConsentLex report"));
    }
}
