//! JSON output formatter

use consentlex_core::diagnostics::DiagnosticsReport;
use consentlex_core::{ConversationTurn, ExportArtifact, IngestReport, SessionState};
use serde_json::json;
use std::path::Path;

pub fn format_report(report: &IngestReport, text: Option<&str>) -> String {
    let mut value = serde_json::to_value(report).unwrap_or_default();
    if let Some(text) = text {
        value["text"] = json!(text);
    }
    value.to_string()
}

pub fn format_turn(turn: &ConversationTurn) -> String {
    serde_json::to_string(turn).unwrap_or_default()
}

pub fn format_documents(session: &SessionState) -> String {
    let docs: Vec<_> = session
        .documents()
        .map(|d| {
            json!({
                "id": d.id,
                "filename": d.filename,
                "media_type": d.media_type,
                "state": d.state,
                "included": d.included,
                "partial": d.partial,
                "chars": d.extracted_text.as_ref().map(|t| t.chars().count()),
                "failure": d.failure,
            })
        })
        .collect();
    serde_json::to_string_pretty(&docs).unwrap_or_default()
}

pub fn format_artifact(artifact: &ExportArtifact, path: &Path) -> String {
    let mut value = serde_json::to_value(artifact).unwrap_or_default();
    value["path"] = json!(path.display().to_string());
    value["bytes"] = json!(artifact.size());
    value.to_string()
}

pub fn format_diagnostics(report: &DiagnosticsReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_default()
}
