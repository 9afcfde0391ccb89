//! Chat/assistant service integration
//!
//! The [`AssistantClient`] trait is the seam the consultation flow talks to.
//! [`OpenAiAssistantClient`] implements it over the OpenAI Assistants API:
//! a conversation is a thread, each message starts a run, and the reply is
//! read back once the run reaches a terminal state.

mod openai;

pub use openai::OpenAiAssistantClient;

use crate::diagnostics::ServiceStatus;
use crate::error::{ConsentLexError, Result};
use crate::session::DocumentId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an assistant run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Whether polling can stop
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::RequiresAction
                | RunStatus::Cancelled
                | RunStatus::Failed
                | RunStatus::Completed
                | RunStatus::Incomplete
                | RunStatus::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
            RunStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by the service for a run that did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Terminal state reached by `await_response`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub run_id: String,
    pub status: RunStatus,
    pub last_error: Option<RunError>,
}

impl RunOutcome {
    /// Convert a non-completed run into the error taxonomy.
    pub fn ensure_completed(self) -> Result<()> {
        if self.status == RunStatus::Completed {
            return Ok(());
        }
        let (code, message) = self
            .last_error
            .map(|e| (e.code, e.message))
            .unwrap_or_default();
        let detail = if message.is_empty() {
            format!("run {} ended as {}", self.run_id, self.status)
        } else {
            format!("run {} ended as {}: {}", self.run_id, self.status, message)
        };

        Err(match code.as_str() {
            "rate_limit_exceeded" => ConsentLexError::rate_limited(detail),
            "server_error" => ConsentLexError::TransientNetwork(detail),
            "invalid_api_key" => ConsentLexError::Configuration(detail),
            _ if self.status == RunStatus::Expired => ConsentLexError::Timeout(detail),
            _ => ConsentLexError::RemoteService {
                status: 200,
                body: detail,
            },
        })
    }
}

/// The newest assistant message of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssistantReply {
    /// Message id on the remote service
    pub message_id: String,
    pub run_id: Option<String>,
    pub text: String,
}

/// Chat/assistant adapter contract
#[async_trait]
pub trait AssistantClient: Send + Sync {
    /// Create a remote conversation and return its id.
    async fn open_conversation(&self) -> Result<String>;

    /// Post `content` and start a run; returns the run id.
    ///
    /// `attachments` name the session documents whose text is part of `content`.
    async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        attachments: &[DocumentId],
    ) -> Result<String>;

    /// Wait for the latest run of `conversation_id` to reach a terminal state.
    async fn await_response(&self, conversation_id: &str) -> Result<RunOutcome>;

    /// Fetch the newest assistant message of `conversation_id`.
    async fn read_response(&self, conversation_id: &str) -> Result<AssistantReply>;

    /// Check reachability and credentials.
    async fn probe(&self) -> ServiceStatus;

    /// Forget per-conversation bookkeeping after a session reset.
    fn reset(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn outcome(status: RunStatus, code: &str) -> RunOutcome {
        RunOutcome {
            run_id: "run_1".into(),
            status,
            last_error: Some(RunError {
                code: code.into(),
                message: "boom".into(),
            }),
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::RequiresAction.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::InProgress.is_terminal());
        assert!(!RunStatus::Cancelling.is_terminal());
    }

    #[test]
    fn test_unknown_status_deserializes() {
        let status: RunStatus = serde_json::from_str("\"something_new\"").unwrap();
        assert_eq!(status, RunStatus::Unknown);
        let status: RunStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(status, RunStatus::InProgress);
    }

    #[test]
    fn test_failed_run_mapping() {
        assert!(outcome(RunStatus::Completed, "").ensure_completed().is_ok());
        assert_eq!(
            outcome(RunStatus::Failed, "rate_limit_exceeded")
                .ensure_completed()
                .unwrap_err()
                .kind(),
            ErrorKind::RateLimit
        );
        assert_eq!(
            outcome(RunStatus::Failed, "server_error")
                .ensure_completed()
                .unwrap_err()
                .kind(),
            ErrorKind::TransientNetwork
        );
        let err = outcome(RunStatus::Failed, "invalid_prompt")
            .ensure_completed()
            .unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("boom"));
    }
}
