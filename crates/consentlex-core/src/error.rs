//! Error types for consentlex

use std::time::Duration;
use thiserror::Error;

/// Result type alias using ConsentLexError
pub type Result<T> = std::result::Result<T, ConsentLexError>;

/// Error type alias for convenience
pub type Error = ConsentLexError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const NOT_FOUND: i32 = 2;
    pub const INVALID_INPUT: i32 = 3;
    pub const CONFIGURATION: i32 = 4;
    pub const SERVICE_UNAVAILABLE: i32 = 5;
}

/// Coarse classification used by the retry executor and the user-facing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    TransientNetwork,
    Timeout,
    RateLimit,
    Validation,
    Extraction,
    ExportStrategy,
    Stalled,
    NotFound,
    Exhausted,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::TransientNetwork => "transient_network",
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::Validation => "validation",
            Self::Extraction => "extraction",
            Self::ExportStrategy => "export_strategy",
            Self::Stalled => "stalled",
            Self::NotFound => "not_found",
            Self::Exhausted => "exhausted",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for consentlex
#[derive(Debug, Error)]
pub enum ConsentLexError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    TransientNetwork(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rate limited: {message}")]
    RateLimit {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Export strategy '{strategy}' failed: {reason}")]
    ExportStrategy { strategy: String, reason: String },

    #[error("Assistant run stalled: no terminal state after {waited:?}")]
    Stalled { waited: Duration },

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<ConsentLexError>,
    },

    #[error("Remote service error (HTTP {status}): {body}")]
    RemoteService { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ConsentLexError {
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimit {
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::TransientNetwork(_) => ErrorKind::TransientNetwork,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Extraction(_) => ErrorKind::Extraction,
            Self::ExportStrategy { .. } => ErrorKind::ExportStrategy,
            Self::Stalled { .. } => ErrorKind::Stalled,
            Self::ConversationNotFound(_) | Self::DocumentNotFound(_) => ErrorKind::NotFound,
            Self::RetriesExhausted { .. } => ErrorKind::Exhausted,
            Self::RemoteService { status, .. } if *status >= 500 => ErrorKind::TransientNetwork,
            Self::RemoteService { .. } => ErrorKind::Validation,
            Self::Io(_) | Self::Serialization(_) | Self::Yaml(_) | Self::Other(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether the retry executor may try the operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransientNetwork | ErrorKind::Timeout | ErrorKind::RateLimit
        )
    }

    /// The innermost error, looking through retry exhaustion.
    pub fn root(&self) -> &ConsentLexError {
        match self {
            Self::RetriesExhausted { source, .. } => source.root(),
            other => other,
        }
    }

    /// Short remediation hint shown to the user.
    pub fn remediation(&self) -> &'static str {
        match self.root().kind() {
            ErrorKind::Configuration => {
                "Check the API key and assistant id in your configuration."
            }
            ErrorKind::RateLimit => {
                "The service rate limit was reached. Wait a few minutes and try again."
            }
            ErrorKind::TransientNetwork | ErrorKind::Timeout => {
                "Connection problem. Check your internet connection and proxy settings."
            }
            ErrorKind::Validation => "The input was rejected. Use a supported file or message.",
            ErrorKind::Extraction => {
                "The document could not be read. Try a clearer scan or another format."
            }
            ErrorKind::Stalled => "The assistant did not answer in time. Send the message again.",
            ErrorKind::NotFound => "The conversation no longer exists. Reset the session.",
            ErrorKind::ExportStrategy => "Export failed unexpectedly. Please report this problem.",
            ErrorKind::Exhausted | ErrorKind::Internal => "Unexpected error. See the log file.",
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self.root().kind() {
            ErrorKind::NotFound => exit_codes::NOT_FOUND,
            ErrorKind::Validation | ErrorKind::Extraction => exit_codes::INVALID_INPUT,
            ErrorKind::Configuration => exit_codes::CONFIGURATION,
            ErrorKind::TransientNetwork
            | ErrorKind::Timeout
            | ErrorKind::RateLimit
            | ErrorKind::Stalled => exit_codes::SERVICE_UNAVAILABLE,
            _ => exit_codes::GENERAL_ERROR,
        }
    }

    /// Map a transport failure into the taxonomy.
    pub fn from_transport(service: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(format!("{service}: {err}"))
        } else if err.is_connect() || err.is_request() || err.is_body() {
            Self::TransientNetwork(format!("{service}: {err}"))
        } else if err.is_decode() {
            Self::RemoteService {
                status: 200,
                body: format!("{service}: undecodable response: {err}"),
            }
        } else {
            Self::TransientNetwork(format!("{service}: {err}"))
        }
    }

    /// Map a non-success HTTP status into the taxonomy.
    pub fn from_status(
        service: &str,
        status: reqwest::StatusCode,
        body: String,
        retry_after: Option<Duration>,
    ) -> Self {
        match status.as_u16() {
            401 | 403 => Self::Configuration(format!(
                "{service} rejected the credentials (HTTP {status}): {}",
                truncate(&body, 200)
            )),
            408 => Self::Timeout(format!("{service} request timeout")),
            429 => Self::RateLimit {
                message: format!("{service}: {}", truncate(&body, 200)),
                retry_after,
            },
            code if code >= 500 => Self::TransientNetwork(format!(
                "{service} unavailable (HTTP {status}): {}",
                truncate(&body, 200)
            )),
            code => Self::RemoteService { status: code, body },
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_retryable_kinds() {
        assert!(ConsentLexError::TransientNetwork("x".into()).is_retryable());
        assert!(ConsentLexError::Timeout("x".into()).is_retryable());
        assert!(ConsentLexError::rate_limited("x").is_retryable());
        assert!(!ConsentLexError::Configuration("x".into()).is_retryable());
        assert!(!ConsentLexError::Validation("x".into()).is_retryable());
        assert!(!ConsentLexError::Extraction("x".into()).is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        let err = ConsentLexError::from_status(
            "assistant",
            StatusCode::UNAUTHORIZED,
            "bad key".into(),
            None,
        );
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = ConsentLexError::from_status(
            "assistant",
            StatusCode::TOO_MANY_REQUESTS,
            String::new(),
            None,
        );
        assert_eq!(err.kind(), ErrorKind::RateLimit);

        let err = ConsentLexError::from_status("ocr", StatusCode::BAD_GATEWAY, String::new(), None);
        assert!(err.is_retryable());

        let err = ConsentLexError::from_status("ocr", StatusCode::BAD_REQUEST, "nope".into(), None);
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_remediation_looks_through_exhaustion() {
        let err = ConsentLexError::RetriesExhausted {
            operation: "assistant.send_message".into(),
            attempts: 3,
            source: Box::new(ConsentLexError::rate_limited("slow down")),
        };
        assert_eq!(err.kind(), ErrorKind::Exhausted);
        assert!(err.remediation().contains("rate limit"));
        assert_eq!(err.exit_code(), exit_codes::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_config_error_mentions_api_key() {
        let err = ConsentLexError::Configuration("missing".into());
        assert!(err.remediation().contains("API key"));
        assert_eq!(err.exit_code(), exit_codes::CONFIGURATION);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("consentimiento", 7), "consent");
        assert_eq!(truncate("añadir", 2), "añ");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
