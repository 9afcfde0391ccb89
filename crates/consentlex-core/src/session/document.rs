//! Uploaded document records and their ingestion state

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Session-unique document identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl std::str::FromStr for DocumentId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().trim_start_matches('#').parse().map(DocumentId)
    }
}

/// Position in the ingestion state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Uploaded,
    Validated,
    Optimizing,
    Submitted,
    Extracted,
    Failed,
}

impl DocumentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentState::Extracted | DocumentState::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: DocumentState) -> bool {
        use DocumentState::*;
        matches!(
            (self, next),
            (Uploaded, Validated)
                | (Uploaded, Failed)
                | (Validated, Optimizing)
                | (Validated, Submitted)
                | (Optimizing, Submitted)
                | (Submitted, Extracted)
                | (Submitted, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentState::Uploaded => "uploaded",
            DocumentState::Validated => "validated",
            DocumentState::Optimizing => "optimizing",
            DocumentState::Submitted => "submitted",
            DocumentState::Extracted => "extracted",
            DocumentState::Failed => "failed",
        }
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a document ended in [`DocumentState::Failed`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// Extension, content type or size outside the accepted set
    Unsupported(String),
    /// OCR produced no usable text or reported a terminal error
    Extraction(String),
    /// OCR could not be reached after all retries
    Unavailable(String),
    /// Credentials missing or rejected
    Configuration(String),
}

impl FailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::Unsupported(_) => "unsupported",
            FailureReason::Extraction(_) => "extraction",
            FailureReason::Unavailable(_) => "unavailable",
            FailureReason::Configuration(_) => "configuration",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            FailureReason::Unsupported(d)
            | FailureReason::Extraction(d)
            | FailureReason::Unavailable(d)
            | FailureReason::Configuration(d) => d,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.detail())
    }
}

/// An uploaded file, held only in memory
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub filename: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
    /// SHA-256 of the original upload
    pub hash: String,
    pub extracted_text: Option<String>,
    /// Whether the text goes into the next message to the assistant
    pub included: bool,
    pub state: DocumentState,
    pub failure: Option<FailureReason>,
    /// Some OCR chunks failed; the text covers only the readable part
    pub partial: bool,
}

impl DocumentRecord {
    pub fn new(id: DocumentId, filename: String, media_type: String, bytes: Vec<u8>) -> Self {
        let hash = hash_bytes(&bytes);
        Self {
            id,
            filename,
            media_type,
            bytes,
            hash,
            extracted_text: None,
            included: true,
            state: DocumentState::Uploaded,
            failure: None,
            partial: false,
        }
    }

    /// Move to `next`, logging and ignoring transitions the state machine forbids.
    pub fn advance(&mut self, next: DocumentState) -> bool {
        if self.state.can_transition_to(next) {
            tracing::debug!(document = %self.id, from = %self.state, to = %next, "document state");
            self.state = next;
            true
        } else {
            tracing::warn!(
                document = %self.id,
                from = %self.state,
                to = %next,
                "ignored invalid document state transition"
            );
            false
        }
    }

    pub fn mark_extracted(&mut self, text: String, partial: bool) {
        self.extracted_text = Some(text);
        self.partial = partial;
        self.failure = None;
        self.state = DocumentState::Extracted;
    }

    pub fn mark_failed(&mut self, reason: FailureReason) {
        self.failure = Some(reason);
        self.state = DocumentState::Failed;
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
    }
}

/// Hex SHA-256 of `bytes`
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_edges() {
        use DocumentState::*;
        assert!(Uploaded.can_transition_to(Validated));
        assert!(Uploaded.can_transition_to(Failed));
        assert!(Validated.can_transition_to(Optimizing));
        assert!(Optimizing.can_transition_to(Submitted));
        assert!(Submitted.can_transition_to(Extracted));
        assert!(!Uploaded.can_transition_to(Extracted));
        assert!(!Extracted.can_transition_to(Submitted));
        assert!(!Failed.can_transition_to(Validated));
    }

    #[test]
    fn test_invalid_advance_is_ignored() {
        let mut record = DocumentRecord::new(
            DocumentId(1),
            "a.pdf".into(),
            "application/pdf".into(),
            vec![],
        );
        assert!(!record.advance(DocumentState::Extracted));
        assert_eq!(record.state, DocumentState::Uploaded);
        assert!(record.advance(DocumentState::Validated));
    }

    #[test]
    fn test_document_id_parse() {
        assert_eq!("#3".parse::<DocumentId>().unwrap(), DocumentId(3));
        assert_eq!(" 7 ".parse::<DocumentId>().unwrap(), DocumentId(7));
        assert!("abc".parse::<DocumentId>().is_err());
    }

    #[test]
    fn test_failure_reason_display() {
        let reason = FailureReason::Unsupported("extension .exe".into());
        assert_eq!(reason.code(), "unsupported");
        assert_eq!(reason.to_string(), "unsupported: extension .exe");
    }

    #[test]
    fn test_extension_is_lowercased() {
        let record = DocumentRecord::new(DocumentId(1), "Scan.PDF".into(), String::new(), vec![]);
        assert_eq!(record.extension().as_deref(), Some("pdf"));
    }

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(hash_bytes(b"abc"), hash_bytes(b"abc"));
        assert_eq!(hash_bytes(b"").len(), 64);
    }
}
