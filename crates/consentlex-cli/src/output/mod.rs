//! Output formatters

pub mod json;
pub mod terminal;

use crate::app::OutputFormat;
use consentlex_core::diagnostics::DiagnosticsReport;
use consentlex_core::{ConversationTurn, ExportArtifact, IngestReport, SessionState};
use std::path::Path;

pub fn print_report(report: &IngestReport, text: Option<&str>, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", json::format_report(report, text)),
        OutputFormat::Cli => {
            terminal::print_state_line(report);
            if let Some(text) = text {
                println!("{}", terminal::indent(text));
            }
        }
    }
}

pub fn print_turn(turn: &ConversationTurn, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", json::format_turn(turn)),
        OutputFormat::Cli => terminal::print_turn(turn),
    }
}

pub fn print_documents(session: &SessionState, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", json::format_documents(session)),
        OutputFormat::Cli => print!("{}", terminal::format_documents(session)),
    }
}

pub fn print_artifact(artifact: &ExportArtifact, path: &Path, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", json::format_artifact(artifact, path)),
        OutputFormat::Cli => println!("{}", terminal::format_artifact(artifact, path)),
    }
}

pub fn print_diagnostics(report: &DiagnosticsReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", json::format_diagnostics(report)),
        OutputFormat::Cli => terminal::print_diagnostics(report),
    }
}

pub fn print_nothing_to_export(format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "exported": false })),
        OutputFormat::Cli => println!("Nothing to export: the conversation is empty."),
    }
}
