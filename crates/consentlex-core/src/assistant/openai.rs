//! OpenAI Assistants (v2) client

use super::{AssistantClient, AssistantReply, RunError, RunOutcome, RunStatus};
use crate::config::AssistantConfig;
use crate::diagnostics::{ServiceKind, ServiceMonitor, ServiceStatus};
use crate::error::{ConsentLexError, ErrorKind, Result};
use crate::retry::{Operation, RetryPolicy};
use crate::session::DocumentId;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

const SERVICE: &str = "assistant";

lazy_static! {
    /// File-search citation markers such as `【4:0†source】`
    static ref CITATION: Regex = Regex::new(r"【[^】]*】").unwrap();
}

#[derive(Debug, Deserialize)]
struct IdObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    id: String,
    status: RunStatus,
    #[serde(default)]
    last_error: Option<RunError>,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<MessageObject>,
}

#[derive(Debug, Deserialize)]
struct MessageObject {
    id: String,
    role: String,
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<TextPart>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    value: String,
}

/// Assistants API client with retries and run polling
pub struct OpenAiAssistantClient {
    http_client: reqwest::Client,
    config: AssistantConfig,
    policy: RetryPolicy,
    runs: Mutex<HashMap<String, String>>,
    monitor: Option<Arc<ServiceMonitor>>,
}

impl OpenAiAssistantClient {
    pub fn new(config: AssistantConfig, policy: RetryPolicy) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConsentLexError::from_transport(SERVICE, e))?;

        Ok(Self {
            http_client,
            config,
            policy,
            runs: Mutex::new(HashMap::new()),
            monitor: None,
        })
    }

    pub fn with_monitor(mut self, monitor: Arc<ServiceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn credentials(&self) -> Result<(&str, &str)> {
        let key = self.config.api_key.as_deref().filter(|k| !k.trim().is_empty());
        let assistant = self
            .config
            .assistant_id
            .as_deref()
            .filter(|a| !a.trim().is_empty());
        match (key, assistant) {
            (Some(k), Some(a)) => Ok((k, a)),
            (None, _) => Err(ConsentLexError::Configuration(
                "assistant api_key is not set".to_string(),
            )),
            (_, None) => Err(ConsentLexError::Configuration(
                "assistant_id is not set".to_string(),
            )),
        }
    }

    /// One HTTP exchange, mapped into the error taxonomy.
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        conversation_id: Option<&str>,
    ) -> Result<Value> {
        let (api_key, _) = self.credentials()?;
        let mut req = self
            .http_client
            .request(method, self.url(path))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("OpenAI-Beta", "assistants=v2");
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req
            .send()
            .await
            .map_err(|e| ConsentLexError::from_transport(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::NOT_FOUND {
                if let Some(id) = conversation_id {
                    return Err(ConsentLexError::ConversationNotFound(id.to_string()));
                }
            }
            return Err(ConsentLexError::from_status(SERVICE, status, body, retry_after));
        }

        response
            .json()
            .await
            .map_err(|e| ConsentLexError::from_transport(SERVICE, e))
    }

    /// [`Self::call`] under the retry executor.
    async fn call_with_retry(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        body: Option<Value>,
        conversation_id: Option<&str>,
    ) -> Result<Value> {
        let result = Operation::new(operation, self.policy.clone(), || {
            self.call(method.clone(), path, body.as_ref(), conversation_id)
        })
        .run()
        .await;

        if let Some(ref monitor) = self.monitor {
            match result {
                Ok(_) => monitor.record_success(ServiceKind::Assistant),
                Err(ref e) => monitor.record_error(ServiceKind::Assistant, e),
            }
        }
        result
    }

    async fn create_run(&self, conversation_id: &str, assistant_id: &str) -> Result<RunObject> {
        let path = format!("threads/{conversation_id}/runs");
        let model = self
            .config
            .model_name
            .as_deref()
            .filter(|m| !m.trim().is_empty());

        let mut body = json!({ "assistant_id": assistant_id });
        if let Some(model) = model {
            body["model"] = Value::String(model.to_string());
        }

        let created = self
            .call_with_retry(
                "assistant.create_run",
                Method::POST,
                &path,
                Some(body),
                Some(conversation_id),
            )
            .await;

        let value = match created {
            Err(ConsentLexError::RemoteService { status: 400, body }) if model.is_some() => {
                tracing::warn!(
                    model = ?model,
                    error = %body,
                    "model override rejected, using the assistant's default model"
                );
                self.call_with_retry(
                    "assistant.create_run",
                    Method::POST,
                    &path,
                    Some(json!({ "assistant_id": assistant_id })),
                    Some(conversation_id),
                )
                .await?
            }
            other => other?,
        };

        Ok(serde_json::from_value(value)?)
    }

    fn last_run(&self, conversation_id: &str) -> Option<String> {
        self.runs.lock().ok()?.get(conversation_id).cloned()
    }

    async fn latest_run_id(&self, conversation_id: &str) -> Result<String> {
        if let Some(run) = self.last_run(conversation_id) {
            return Ok(run);
        }
        // Unknown to this client; ask the service for the most recent run.
        let value = self
            .call_with_retry(
                "assistant.list_runs",
                Method::GET,
                &format!("threads/{conversation_id}/runs?limit=1&order=desc"),
                None,
                Some(conversation_id),
            )
            .await?;
        value["data"][0]["id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| {
                ConsentLexError::Validation(format!(
                    "conversation {conversation_id} has no run to wait for"
                ))
            })
    }
}

/// Text of a message with citation markers removed
fn message_text(message: &MessageObject) -> String {
    let joined = message
        .content
        .iter()
        .filter(|part| part.kind == "text")
        .filter_map(|part| part.text.as_ref())
        .map(|t| t.value.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    strip_citations(&joined)
}

pub(crate) fn strip_citations(text: &str) -> String {
    CITATION.replace_all(text, "").trim().to_string()
}

#[async_trait]
impl AssistantClient for OpenAiAssistantClient {
    async fn open_conversation(&self) -> Result<String> {
        self.credentials()?;
        let value = self
            .call_with_retry(
                "assistant.open_conversation",
                Method::POST,
                "threads",
                Some(json!({})),
                None,
            )
            .await?;
        let thread: IdObject = serde_json::from_value(value)?;
        tracing::info!(conversation = %thread.id, "conversation opened");
        Ok(thread.id)
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        attachments: &[DocumentId],
    ) -> Result<String> {
        let (_, assistant_id) = self.credentials()?;
        if content.trim().is_empty() {
            return Err(ConsentLexError::Validation("message is empty".to_string()));
        }

        let mut body = json!({ "role": "user", "content": content });
        if !attachments.is_empty() {
            let ids: Vec<String> = attachments.iter().map(ToString::to_string).collect();
            body["metadata"] = json!({ "documents": ids.join(",") });
        }

        self.call_with_retry(
            "assistant.send_message",
            Method::POST,
            &format!("threads/{conversation_id}/messages"),
            Some(body),
            Some(conversation_id),
        )
        .await?;

        let run = self.create_run(conversation_id, assistant_id).await?;
        tracing::info!(
            conversation = %conversation_id,
            run = %run.id,
            chars = content.len(),
            attachments = attachments.len(),
            "message sent"
        );
        if let Ok(mut runs) = self.runs.lock() {
            runs.insert(conversation_id.to_string(), run.id.clone());
        }
        Ok(run.id)
    }

    async fn await_response(&self, conversation_id: &str) -> Result<RunOutcome> {
        self.credentials()?;
        let run_id = self.latest_run_id(conversation_id).await?;
        let path = format!("threads/{conversation_id}/runs/{run_id}");

        let timeout = self.config.run_timeout();
        let max_interval = self.config.max_poll_interval();
        let mut interval = self.config.poll_interval();
        let started = Instant::now();
        let mut polls = 0u32;

        loop {
            polls += 1;
            match self
                .call(Method::GET, &path, None, Some(conversation_id))
                .await
            {
                Ok(value) => {
                    let run: RunObject = serde_json::from_value(value)?;
                    tracing::debug!(run = %run.id, status = %run.status, polls, "run polled");
                    if run.status.is_terminal() {
                        tracing::info!(
                            run = %run.id,
                            status = %run.status,
                            polls,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "run finished"
                        );
                        return Ok(RunOutcome {
                            run_id: run.id,
                            status: run.status,
                            last_error: run.last_error,
                        });
                    }
                }
                Err(e) if e.is_retryable() => {
                    interval = interval.mul_f64(1.5).min(max_interval);
                    tracing::warn!(
                        run = %run_id,
                        polls,
                        delay_ms = interval.as_millis() as u64,
                        error_kind = %e.kind(),
                        error = %e,
                        "run poll failed, backing off"
                    );
                    if let Some(ref monitor) = self.monitor {
                        monitor.record_error(ServiceKind::Assistant, &e);
                    }
                }
                Err(e) => return Err(e),
            }

            let waited = started.elapsed();
            if waited + interval > timeout {
                tracing::error!(
                    run = %run_id,
                    polls,
                    waited_ms = waited.as_millis() as u64,
                    "run stalled"
                );
                return Err(ConsentLexError::Stalled { waited: timeout });
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn read_response(&self, conversation_id: &str) -> Result<AssistantReply> {
        self.credentials()?;
        let value = self
            .call_with_retry(
                "assistant.read_response",
                Method::GET,
                &format!("threads/{conversation_id}/messages?order=desc&limit=20"),
                None,
                Some(conversation_id),
            )
            .await?;
        let list: MessageList = serde_json::from_value(value)?;
        let run = self.last_run(conversation_id);

        let newest = list
            .data
            .iter()
            .filter(|m| m.role == "assistant")
            .find(|m| match (&run, &m.run_id) {
                (Some(expected), Some(actual)) => expected == actual,
                _ => true,
            })
            .ok_or_else(|| {
                ConsentLexError::Extraction("the assistant has not replied yet".to_string())
            })?;

        let text = message_text(newest);
        if text.is_empty() {
            return Err(ConsentLexError::Extraction(
                "the assistant reply has no text content".to_string(),
            ));
        }

        Ok(AssistantReply {
            message_id: newest.id.clone(),
            run_id: newest.run_id.clone(),
            text,
        })
    }

    async fn probe(&self) -> ServiceStatus {
        let Ok((_, assistant_id)) = self.credentials() else {
            return ServiceStatus::unconfigured(ServiceKind::Assistant);
        };

        match self.call(Method::GET, "models", None, None).await {
            Ok(_) => {}
            Err(e) => {
                let status = match e.kind() {
                    ErrorKind::Configuration => {
                        ServiceStatus::probed(ServiceKind::Assistant, true, Some(false))
                    }
                    ErrorKind::TransientNetwork | ErrorKind::Timeout => {
                        ServiceStatus::probed(ServiceKind::Assistant, false, None)
                    }
                    _ => ServiceStatus::probed(ServiceKind::Assistant, true, None),
                };
                return status.with_error(e.to_string());
            }
        }

        match self
            .call(Method::GET, &format!("assistants/{assistant_id}"), None, None)
            .await
        {
            Ok(_) => ServiceStatus::probed(ServiceKind::Assistant, true, Some(true)),
            Err(e) => ServiceStatus::probed(ServiceKind::Assistant, true, Some(false))
                .with_error(format!("assistant {assistant_id} is not usable: {e}")),
        }
    }

    fn reset(&self) {
        if let Ok(mut runs) = self.runs.lock() {
            runs.clear();
        }
    }
}
