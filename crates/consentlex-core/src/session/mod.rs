//! In-memory session state for a single user flow
//!
//! A [`SessionState`] owns the uploaded documents and the conversation.
//! Nothing is persisted; [`SessionState::clear_session`] swaps in a fresh
//! state and is the only destructive operation.

mod document;

pub use document::{hash_bytes, DocumentId, DocumentRecord, DocumentState, FailureReason};

use crate::error::{ConsentLexError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Who authored a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "ConsentLex",
        }
    }
}

/// One message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<DocumentId>,
    pub timestamp: DateTime<Utc>,
    /// Message id on the assistant service, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            attachments: Vec::new(),
            timestamp: Utc::now(),
            remote_id: None,
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<DocumentId>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_remote_id(mut self, id: impl Into<String>) -> Self {
        self.remote_id = Some(id.into());
        self
    }
}

/// Documents and turns of the current session
#[derive(Debug)]
pub struct SessionState {
    id: Uuid,
    started_at: DateTime<Utc>,
    next_document: u64,
    documents: BTreeMap<DocumentId, DocumentRecord>,
    turns: Vec<ConversationTurn>,
    conversation_id: Option<String>,
    consumed_messages: HashSet<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            next_document: 1,
            documents: BTreeMap::new(),
            turns: Vec::new(),
            conversation_id: None,
            consumed_messages: HashSet::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// First eight hex digits of the session id, used in file names
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Register an upload and return its new id. The record starts included.
    pub fn add_document(
        &mut self,
        filename: impl Into<String>,
        media_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> DocumentId {
        let id = DocumentId(self.next_document);
        self.next_document += 1;
        let record = DocumentRecord::new(id, filename.into(), media_type.into(), bytes);
        tracing::debug!(document = %id, filename = %record.filename, "document added");
        self.documents.insert(id, record);
        id
    }

    /// Flip the inclusion flag and return the new value. Extracted text is kept.
    pub fn toggle_inclusion(&mut self, id: DocumentId) -> Result<bool> {
        let record = self.document_mut(id)?;
        record.included = !record.included;
        Ok(record.included)
    }

    pub fn set_inclusion(&mut self, id: DocumentId, included: bool) -> Result<()> {
        self.document_mut(id)?.included = included;
        Ok(())
    }

    /// Append a turn; every attachment must name a document of this session.
    pub fn append_turn(&mut self, turn: ConversationTurn) -> Result<()> {
        if let Some(missing) = turn
            .attachments
            .iter()
            .find(|id| !self.documents.contains_key(*id))
        {
            return Err(ConsentLexError::DocumentNotFound(missing.to_string()));
        }
        if let Some(ref remote) = turn.remote_id {
            self.consumed_messages.insert(remote.clone());
        }
        self.turns.push(turn);
        Ok(())
    }

    /// Discard every document and turn, starting a new session.
    pub fn clear_session(&mut self) {
        let previous = self.id;
        *self = SessionState::new();
        tracing::info!(previous = %previous, session = %self.id, "session cleared");
    }

    pub fn document(&self, id: DocumentId) -> Option<&DocumentRecord> {
        self.documents.get(&id)
    }

    pub fn document_mut(&mut self, id: DocumentId) -> Result<&mut DocumentRecord> {
        self.documents
            .get_mut(&id)
            .ok_or_else(|| ConsentLexError::DocumentNotFound(id.to_string()))
    }

    /// Documents in upload order
    pub fn documents(&self) -> impl Iterator<Item = &DocumentRecord> {
        self.documents.values()
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn set_conversation_id(&mut self, id: impl Into<String>) {
        self.conversation_id = Some(id.into());
    }

    pub fn is_consumed(&self, remote_id: &str) -> bool {
        self.consumed_messages.contains(remote_id)
    }

    /// Ids of included documents whose text is available
    pub fn active_documents(&self) -> Vec<DocumentId> {
        self.documents
            .values()
            .filter(|d| d.included && d.extracted_text.is_some())
            .map(|d| d.id)
            .collect()
    }

    /// Text of included, extracted documents for the next outgoing message.
    pub fn context_bundle(&self) -> Option<String> {
        let sections: Vec<String> = self
            .documents
            .values()
            .filter(|d| d.included)
            .filter_map(|d| {
                d.extracted_text.as_ref().map(|text| {
                    format!("=== Document {}: {} ===\n{}", d.id, d.filename, text.trim())
                })
            })
            .collect();

        if sections.is_empty() {
            None
        } else {
            Some(sections.join("\n\n"))
        }
    }
}
