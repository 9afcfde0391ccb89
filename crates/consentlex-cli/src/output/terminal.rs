//! Terminal output formatter

use consentlex_core::diagnostics::{DiagnosticsReport, ServiceStatus};
use consentlex_core::{
    ConversationTurn, DocumentState, ExportArtifact, IngestReport, Role, SessionState,
};
use std::io::{IsTerminal, Write};
use std::path::Path;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

fn stdout() -> StandardStream {
    let choice = if std::io::stdout().is_terminal() {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stdout(choice)
}

/// Write `label` in `color`, then `rest` uncolored, then a newline.
fn colored_line(label: &str, color: Color, bold: bool, rest: &str) {
    let mut out = stdout();
    let _ = out.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(bold));
    let _ = write!(out, "{label}");
    let _ = out.reset();
    let _ = writeln!(out, "{rest}");
}

fn state_color(state: DocumentState) -> Color {
    match state {
        DocumentState::Extracted => Color::Green,
        DocumentState::Failed => Color::Red,
        _ => Color::Yellow,
    }
}

pub fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn print_state_line(report: &IngestReport) {
    let label = format!("{:<10}", report.state.as_str());
    colored_line(
        &label,
        state_color(report.state),
        true,
        &format!(" {} {}", report.document, report.notice),
    );
}

pub fn print_turn(turn: &ConversationTurn) {
    let color = match turn.role {
        Role::User => Color::Cyan,
        Role::Assistant => Color::Magenta,
    };
    colored_line(&format!("{}:", turn.role.label()), color, true, "");
    println!("{}", turn.content.trim());
    println!();
}

pub fn format_documents(session: &SessionState) -> String {
    if session.document_count() == 0 {
        return "No documents uploaded.\n".to_string();
    }

    let mut output = String::new();
    for doc in session.documents() {
        let mark = if doc.included { "[x]" } else { "[ ]" };
        let detail = match (&doc.extracted_text, &doc.failure) {
            (Some(text), _) => {
                let partial = if doc.partial { ", partial" } else { "" };
                format!("{} chars{partial}", text.chars().count())
            }
            (None, Some(reason)) => reason.to_string(),
            (None, None) => doc.state.to_string(),
        };
        output.push_str(&format!(
            "{mark} {:>4} {:<32} {:<10} {}\n",
            doc.id.to_string(),
            doc.filename,
            doc.state.as_str(),
            detail
        ));
    }
    output
}

pub fn format_artifact(artifact: &ExportArtifact, path: &Path) -> String {
    let mut line = format!(
        "Exported {} ({} bytes, {}) to {}",
        artifact.format,
        artifact.size(),
        artifact.strategy,
        path.display()
    );
    if artifact.degraded {
        line.push_str(&format!(
            "\nNote: {} export failed, saved as plain text instead.",
            artifact.requested
        ));
    } else if !artifact.primary {
        line.push_str("\nNote: produced by a backup renderer.");
    }
    line
}

fn status_color(status: &ServiceStatus) -> Color {
    if status.is_healthy() {
        Color::Green
    } else if !status.configured {
        Color::Yellow
    } else {
        Color::Red
    }
}

pub fn print_diagnostics(report: &DiagnosticsReport) {
    println!("Services:");
    for status in &report.services {
        colored_line(
            &format!("  {:<10}", status.service.as_str()),
            status_color(status),
            true,
            &format!(" {}", status.summary()),
        );
        if let Some(ref error) = status.last_error {
            println!("             last error: {error}");
        }
    }

    let env = &report.environment;
    println!();
    println!("Environment:");
    println!("  Version:       {}", env.version);
    println!(
        "  Config:        {}{}",
        env.config_path.display(),
        if env.config_exists { "" } else { " (not found)" }
    );
    println!("  Log dir:       {}", env.log_dir.display());
    println!("  Assistant URL: {}", env.assistant_url);
    println!("  OCR URL:       {}", env.ocr_url);
    if env.proxies.is_empty() {
        println!("  Proxies:       none");
    } else {
        for (name, value) in &env.proxies {
            println!("  {name}: {value}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consentlex_core::session::FailureReason;

    #[test]
    fn test_indent() {
        assert_eq!(indent("a\nb"), "  a\n  b");
    }

    #[test]
    fn test_document_listing() {
        let mut session = SessionState::new();
        assert_eq!(format_documents(&session), "No documents uploaded.\n");

        let ok = session.add_document("consent.txt", "text/plain", b"abc".to_vec());
        session.document_mut(ok).unwrap().mark_extracted("abc".into(), false);
        let bad = session.add_document("scan.exe", "application/octet-stream", b"MZ".to_vec());
        session
            .document_mut(bad)
            .unwrap()
            .mark_failed(FailureReason::Unsupported("unsupported file".into()));
        session.toggle_inclusion(bad).unwrap();

        let listing = format_documents(&session);
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("[x]"));
        assert!(lines[0].contains("3 chars"));
        assert!(lines[1].starts_with("[ ]"));
        assert!(lines[1].contains("scan.exe"));
    }
}
