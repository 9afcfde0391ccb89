//! One consultation: the session plus every service it talks to
//!
//! [`Consultation`] is the single flow of control behind the front ends.
//! Uploads go through the ingestion pipeline, questions go to the
//! assistant together with the text of the included documents, and the
//! transcript can be exported at any point.

use crate::assistant::{AssistantClient, OpenAiAssistantClient};
use crate::config::Config;
use crate::diagnostics::{DiagnosticsReport, EnvironmentReport, ServiceMonitor};
use crate::error::{ConsentLexError, Result};
use crate::export::{ExportFormat, ExportOutcome, ExportPipeline, ExportRequest};
use crate::ingest::{IngestReport, IngestionPipeline};
use crate::ocr::{ocr_client_from_config, OcrClient};
use crate::session::{ConversationTurn, DocumentId, SessionState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Instrument;

/// Heading placed between the question and the attached document text
const CONTEXT_HEADER: &str = "Reference documents provided by the user:";

/// Request for a compliance review of an uploaded document
pub fn analysis_prompt(filename: &str) -> String {
    format!(
        "Please analyze the document '{filename}' I just uploaded and check whether it \
         complies with the current regulations on informed consent."
    )
}

/// Outgoing message: the question followed by the document context, if any.
pub fn compose_message(question: &str, context: Option<&str>) -> String {
    match context {
        Some(context) => format!("{question}\n\n{CONTEXT_HEADER}\n\n{context}"),
        None => question.to_string(),
    }
}

pub struct Consultation {
    config: Config,
    session: SessionState,
    assistant: Arc<dyn AssistantClient>,
    ocr: Arc<dyn OcrClient>,
    ingestion: IngestionPipeline,
    exporter: ExportPipeline,
    monitor: Arc<ServiceMonitor>,
    config_dir: PathBuf,
}

impl Consultation {
    pub fn new(
        config: Config,
        assistant: Arc<dyn AssistantClient>,
        ocr: Arc<dyn OcrClient>,
        monitor: Arc<ServiceMonitor>,
    ) -> Self {
        let ingestion = IngestionPipeline::new(config.ingestion.clone(), Arc::clone(&ocr));
        Self {
            config,
            session: SessionState::new(),
            assistant,
            ocr,
            ingestion,
            exporter: ExportPipeline::new(),
            monitor,
            config_dir: Config::default_dir(),
        }
    }

    /// Wire the HTTP adapters described by `config`.
    ///
    /// Missing credentials are not an error here; they surface when a
    /// service is first used and in [`Consultation::diagnostics`].
    pub fn from_config(config: Config) -> Result<Self> {
        let monitor = Arc::new(ServiceMonitor::new());
        let policy = config.retry.policy();
        let assistant = OpenAiAssistantClient::new(config.assistant.clone(), policy.clone())?
            .with_monitor(Arc::clone(&monitor));
        let ocr = ocr_client_from_config(&config.ocr, policy, Arc::clone(&monitor))?;
        Ok(Self::new(config, Arc::new(assistant), Arc::new(ocr), monitor))
    }

    pub fn with_exporter(mut self, exporter: ExportPipeline) -> Self {
        self.exporter = exporter;
        self
    }

    /// Directory the configuration was loaded from, shown by diagnostics.
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionState {
        &mut self.session
    }

    pub fn monitor(&self) -> &Arc<ServiceMonitor> {
        &self.monitor
    }

    /// Add an upload to the session and extract its text.
    pub async fn upload(&mut self, filename: &str, bytes: Vec<u8>) -> Result<IngestReport> {
        self.ingestion.ingest(&mut self.session, filename, bytes).await
    }

    pub fn toggle_document(&mut self, id: DocumentId) -> Result<bool> {
        self.session.toggle_inclusion(id)
    }

    /// Send `question` with the included document text and record the exchange.
    ///
    /// The user turn is recorded before the remote calls so a failed
    /// exchange still shows what was asked. Returns the assistant turn.
    pub async fn ask(&mut self, question: &str) -> Result<ConversationTurn> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ConsentLexError::Validation("the question is empty".to_string()));
        }

        let attachments = self.session.active_documents();
        let content = compose_message(question, self.session.context_bundle().as_deref());
        self.session
            .append_turn(ConversationTurn::user(question).with_attachments(attachments.clone()))?;

        let span = tracing::info_span!(
            "ask",
            session = %self.session.short_id(),
            documents = attachments.len(),
            chars = content.len()
        );
        self.exchange(&content, &attachments).instrument(span).await
    }

    async fn exchange(
        &mut self,
        content: &str,
        attachments: &[DocumentId],
    ) -> Result<ConversationTurn> {
        let conversation = self.send(content, attachments).await?;
        let outcome = self.assistant.await_response(&conversation).await?;
        tracing::debug!(run = %outcome.run_id, status = %outcome.status, "run finished");
        outcome.ensure_completed()?;

        let reply = self.assistant.read_response(&conversation).await?;
        if self.session.is_consumed(&reply.message_id) {
            tracing::warn!(message = %reply.message_id, "assistant reply was already shown");
            return Err(ConsentLexError::Extraction(
                "the assistant did not produce a new reply, try again".to_string(),
            ));
        }

        let turn = ConversationTurn::assistant(reply.text).with_remote_id(reply.message_id);
        self.session.append_turn(turn.clone())?;
        tracing::info!(turns = self.session.turns().len(), "assistant reply recorded");
        Ok(turn)
    }

    /// Post the message, opening (or reopening) the remote conversation as needed.
    async fn send(&mut self, content: &str, attachments: &[DocumentId]) -> Result<String> {
        let conversation = self.ensure_conversation().await?;
        match self
            .assistant
            .send_message(&conversation, content, attachments)
            .await
        {
            Ok(_) => Ok(conversation),
            Err(e) if matches!(e.root(), ConsentLexError::ConversationNotFound(_)) => {
                tracing::warn!(
                    conversation = %conversation,
                    "remote conversation lost, opening a new one"
                );
                let fresh = self.assistant.open_conversation().await?;
                self.session.set_conversation_id(fresh.clone());
                self.assistant.send_message(&fresh, content, attachments).await?;
                Ok(fresh)
            }
            Err(e) => Err(e),
        }
    }

    async fn ensure_conversation(&mut self) -> Result<String> {
        if let Some(id) = self.session.conversation_id() {
            return Ok(id.to_string());
        }
        let id = self.assistant.open_conversation().await?;
        tracing::info!(conversation = %id, "conversation opened");
        self.session.set_conversation_id(id.clone());
        Ok(id)
    }

    pub fn export_request(&self) -> ExportRequest {
        ExportRequest::from_session(&self.session, self.config.export.title.clone())
    }

    /// Render the transcript in `format`, degrading through the fallback chain.
    pub fn export(&self, format: ExportFormat) -> Result<ExportOutcome> {
        self.exporter.export(&self.export_request(), format)
    }

    /// Start over: new session, no documents, no turns, no remote conversation.
    pub fn reset(&mut self) {
        self.session.clear_session();
        self.assistant.reset();
    }

    /// Drop cached OCR results and remembered service errors.
    pub fn clear_caches(&self) {
        self.ocr.clear_cache();
        self.monitor.clear();
        tracing::info!("caches cleared");
    }

    /// Probe both services and describe the environment.
    pub async fn diagnostics(&self) -> DiagnosticsReport {
        let (assistant, ocr) = tokio::join!(self.assistant.probe(), self.ocr.probe());
        DiagnosticsReport {
            services: vec![self.monitor.annotate(assistant), self.monitor.annotate(ocr)],
            environment: EnvironmentReport::collect(&self.config, &self.config_dir, |key| {
                std::env::var(key).ok()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::{AssistantReply, RunError, RunOutcome, RunStatus};
    use crate::diagnostics::{ServiceKind, ServiceStatus};
    use crate::ocr::OcrOutput;
    use crate::session::Role;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeAssistant {
        opened: AtomicU32,
        sent: Mutex<Vec<(String, String, Vec<DocumentId>)>>,
        replies: Mutex<Vec<AssistantReply>>,
        status: Mutex<Option<RunStatus>>,
        lose_conversation: AtomicU32,
        resets: AtomicU32,
    }

    impl FakeAssistant {
        fn replying(ids: &[&str]) -> Self {
            let fake = Self::default();
            *fake.replies.lock().unwrap() = ids
                .iter()
                .map(|id| AssistantReply {
                    message_id: id.to_string(),
                    run_id: Some("run_1".into()),
                    text: format!("reply {id}"),
                })
                .collect();
            fake
        }
    }

    #[async_trait]
    impl AssistantClient for FakeAssistant {
        async fn open_conversation(&self) -> Result<String> {
            let n = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("thread_{n}"))
        }

        async fn send_message(
            &self,
            conversation_id: &str,
            content: &str,
            attachments: &[DocumentId],
        ) -> Result<String> {
            if self.lose_conversation.load(Ordering::SeqCst) > 0 {
                self.lose_conversation.fetch_sub(1, Ordering::SeqCst);
                return Err(ConsentLexError::ConversationNotFound(conversation_id.to_string()));
            }
            self.sent.lock().unwrap().push((
                conversation_id.to_string(),
                content.to_string(),
                attachments.to_vec(),
            ));
            Ok("run_1".to_string())
        }

        async fn await_response(&self, _conversation_id: &str) -> Result<RunOutcome> {
            let status = self.status.lock().unwrap().unwrap_or(RunStatus::Completed);
            Ok(RunOutcome {
                run_id: "run_1".into(),
                status,
                last_error: (status == RunStatus::Failed).then(|| RunError {
                    code: "server_error".into(),
                    message: "boom".into(),
                }),
            })
        }

        async fn read_response(&self, _conversation_id: &str) -> Result<AssistantReply> {
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                Ok(replies.remove(0))
            } else {
                replies
                    .first()
                    .cloned()
                    .ok_or_else(|| ConsentLexError::Extraction("no reply".into()))
            }
        }

        async fn probe(&self) -> ServiceStatus {
            ServiceStatus::probed(ServiceKind::Assistant, true, Some(true))
        }

        fn reset(&self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeOcr {
        calls: AtomicU32,
        cleared: AtomicU32,
    }

    #[async_trait]
    impl OcrClient for FakeOcr {
        async fn extract_text(&self, _bytes: &[u8], _media_type: &str) -> Result<OcrOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(OcrOutput {
                text: "scanned".into(),
                chunks: 1,
                failed_chunks: Vec::new(),
                cached: false,
            })
        }

        async fn probe(&self) -> ServiceStatus {
            ServiceStatus::unconfigured(ServiceKind::Ocr)
        }

        fn clear_cache(&self) {
            self.cleared.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn consultation(assistant: Arc<FakeAssistant>, ocr: Arc<FakeOcr>) -> Consultation {
        Consultation::new(
            Config::default(),
            assistant,
            ocr,
            Arc::new(ServiceMonitor::new()),
        )
    }

    #[test]
    fn test_compose_message() {
        assert_eq!(compose_message("Hola", None), "Hola");
        let composed = compose_message("Hola", Some("=== Document 1: a.txt ===\ntexto"));
        assert!(composed.starts_with("Hola\n\n"));
        assert!(composed.ends_with("texto"));
        assert!(composed.contains(CONTEXT_HEADER));
    }

    #[tokio::test]
    async fn test_ask_bundles_included_documents() {
        let assistant = Arc::new(FakeAssistant::replying(&["msg_1"]));
        let ocr = Arc::new(FakeOcr::default());
        let mut c = consultation(assistant.clone(), ocr.clone());

        let first = c.upload("a.txt", b"Riesgos del procedimiento".to_vec()).await.unwrap();
        let second = c.upload("b.txt", b"Texto excluido".to_vec()).await.unwrap();
        c.toggle_document(second.document).unwrap();

        let turn = c.ask("  Es valido?  ").await.unwrap();
        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.content, "reply msg_1");
        assert_eq!(turn.remote_id.as_deref(), Some("msg_1"));

        let sent = assistant.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "thread_1");
        assert!(sent[0].1.contains("Riesgos del procedimiento"));
        assert!(!sent[0].1.contains("Texto excluido"));
        assert_eq!(sent[0].2, vec![first.document]);

        let turns = c.session().turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "Es valido?");
        assert_eq!(turns[0].attachments, vec![first.document]);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_conversation_is_reused() {
        let assistant = Arc::new(FakeAssistant::replying(&["msg_1", "msg_2"]));
        let mut c = consultation(assistant.clone(), Arc::new(FakeOcr::default()));

        c.ask("uno").await.unwrap();
        c.ask("dos").await.unwrap();
        assert_eq!(assistant.opened.load(Ordering::SeqCst), 1);
        assert_eq!(c.session().turns().len(), 4);
    }

    #[tokio::test]
    async fn test_consumed_reply_is_not_appended_twice() {
        let assistant = Arc::new(FakeAssistant::replying(&["msg_1"]));
        let mut c = consultation(assistant, Arc::new(FakeOcr::default()));

        c.ask("uno").await.unwrap();
        let err = c.ask("dos").await.unwrap_err();
        assert!(err.to_string().contains("new reply"));

        let assistant_turns = c
            .session()
            .turns()
            .iter()
            .filter(|t| t.role == Role::Assistant)
            .count();
        assert_eq!(assistant_turns, 1);
    }

    #[tokio::test]
    async fn test_failed_run_surfaces_error() {
        let assistant = Arc::new(FakeAssistant::replying(&["msg_1"]));
        *assistant.status.lock().unwrap() = Some(RunStatus::Failed);
        let mut c = consultation(assistant, Arc::new(FakeOcr::default()));

        let err = c.ask("uno").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(c.session().turns().len(), 1);
    }

    #[tokio::test]
    async fn test_lost_conversation_is_reopened() {
        let assistant = Arc::new(FakeAssistant::replying(&["msg_1"]));
        assistant.lose_conversation.store(1, Ordering::SeqCst);
        let mut c = consultation(assistant.clone(), Arc::new(FakeOcr::default()));

        c.ask("uno").await.unwrap();
        assert_eq!(assistant.opened.load(Ordering::SeqCst), 2);
        assert_eq!(c.session().conversation_id(), Some("thread_2"));
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let mut c = consultation(
            Arc::new(FakeAssistant::default()),
            Arc::new(FakeOcr::default()),
        );
        assert!(c.ask("   ").await.is_err());
        assert!(c.session().turns().is_empty());
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let assistant = Arc::new(FakeAssistant::replying(&["msg_1"]));
        let mut c = consultation(assistant.clone(), Arc::new(FakeOcr::default()));
        c.upload("a.txt", b"texto".to_vec()).await.unwrap();
        c.ask("uno").await.unwrap();
        let before = c.session().id();

        c.reset();
        assert_ne!(c.session().id(), before);
        assert_eq!(c.session().document_count(), 0);
        assert!(c.session().turns().is_empty());
        assert!(c.session().conversation_id().is_none());
        assert_eq!(assistant.resets.load(Ordering::SeqCst), 1);
        assert!(matches!(
            c.export(ExportFormat::Markdown).unwrap(),
            ExportOutcome::NothingToExport
        ));
    }

    #[tokio::test]
    async fn test_export_uses_session_transcript() {
        let mut c = consultation(
            Arc::new(FakeAssistant::replying(&["msg_1"])),
            Arc::new(FakeOcr::default()),
        );
        c.ask("Consulta").await.unwrap();

        let outcome = c.export(ExportFormat::Markdown).unwrap();
        let artifact = outcome.artifact().unwrap();
        assert!(artifact.primary);
        let text = String::from_utf8(artifact.bytes.clone()).unwrap();
        assert!(text.contains("Consulta"));
        assert!(text.contains("reply msg_1"));
        assert!(artifact.filename.contains(&c.session().short_id()));
    }

    #[tokio::test]
    async fn test_clear_caches_and_diagnostics() {
        let ocr = Arc::new(FakeOcr::default());
        let c = consultation(Arc::new(FakeAssistant::default()), ocr.clone())
            .with_config_dir("/srv/consentlex");
        c.monitor()
            .record_error(ServiceKind::Ocr, &ConsentLexError::Timeout("slow".into()));

        let report = c.diagnostics().await;
        assert_eq!(
            report.environment.config_path,
            PathBuf::from("/srv/consentlex/config.yml")
        );
        assert_eq!(report.services.len(), 2);
        assert!(report.services[0].is_healthy());
        assert!(report.services[1].last_error.is_some());
        assert!(!report.all_healthy());

        c.clear_caches();
        assert_eq!(ocr.cleared.load(Ordering::SeqCst), 1);
        assert!(c.monitor().last_error(ServiceKind::Ocr).is_none());
    }

    #[test]
    fn test_analysis_prompt_names_file() {
        assert!(analysis_prompt("consent.pdf").contains("'consent.pdf'"));
    }
}
