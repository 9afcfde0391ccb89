//! Interactive consultation loop

use crate::app::{ChatArgs, Cli, OutputFormat};
use crate::output;
use crate::progress::StatusLine;
use anyhow::{Context, Result};
use consentlex_core::consult::analysis_prompt;
use consentlex_core::{Config, ConsentLexError, Consultation, DocumentId, ExportFormat};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
Commands:
  /upload <file>       add a document (pdf, image, txt, md, docx)
  /analyze <id>        ask for a compliance review of a document
  /docs                list documents
  /toggle <id>         include or exclude a document from the context
  /export [format]     export the conversation (markdown, html, pdf, text)
  /save <file>         save the transcript as JSON
  /clear               start a new session
  /status              check services and environment
  /cache-clear         drop cached OCR results
  /quit                leave
Anything else is sent to the assistant.";

#[derive(Debug, PartialEq)]
pub enum ReplCommand {
    Empty,
    Quit,
    Help,
    Upload(PathBuf),
    Analyze(DocumentId),
    Docs,
    Toggle(DocumentId),
    Export(ExportFormat),
    Save(PathBuf),
    Clear,
    Status,
    ClearCache,
    Ask(String),
    Invalid(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ReplCommand::Empty;
        }
        let Some(command) = line.strip_prefix('/') else {
            return ReplCommand::Ask(line.to_string());
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };
        let document = |arg: &str| {
            arg.parse::<DocumentId>()
                .map_err(|_| format!("'{arg}' is not a document id"))
        };

        let parsed = match (name, arg) {
            ("quit" | "exit" | "q", _) => Ok(ReplCommand::Quit),
            ("help" | "?", _) => Ok(ReplCommand::Help),
            ("upload", "") | ("save", "") => Err(format!("/{name} needs a file path")),
            ("upload", path) => Ok(ReplCommand::Upload(PathBuf::from(path))),
            ("save", path) => Ok(ReplCommand::Save(PathBuf::from(path))),
            ("analyze", id) => document(id).map(ReplCommand::Analyze),
            ("toggle", id) => document(id).map(ReplCommand::Toggle),
            ("docs", _) => Ok(ReplCommand::Docs),
            ("export", "") => Ok(ReplCommand::Export(ExportFormat::Pdf)),
            ("export", format) => format
                .parse::<ExportFormat>()
                .map(ReplCommand::Export)
                .map_err(|e| e.to_string()),
            ("clear", _) => Ok(ReplCommand::Clear),
            ("status", _) => Ok(ReplCommand::Status),
            ("cache-clear", _) => Ok(ReplCommand::ClearCache),
            _ => Err(format!("unknown command /{name}, type /help")),
        };
        parsed.unwrap_or_else(ReplCommand::Invalid)
    }
}

fn show_error(err: &anyhow::Error) {
    eprintln!("Error: {err:#}");
    if let Some(e) = err.downcast_ref::<ConsentLexError>() {
        eprintln!("Hint: {}", e.remediation());
    }
}

pub async fn run(args: &ChatArgs, config: Config, cli: &Cli) -> Result<()> {
    let mut consultation = super::open(cli, config, true)?;
    if let Err(e) = consultation.config().validate_assistant() {
        eprintln!("Warning: {e}. Questions will fail until it is configured.");
    }

    for path in &args.files {
        if let Err(e) = super::upload(&mut consultation, path, cli.format).await {
            show_error(&e);
        }
    }

    let prompt = crate::settings::interactive(cli);
    if cli.format == OutputFormat::Cli {
        println!("ConsentLex {} - type /help for commands", consentlex_core::VERSION);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if prompt {
            print!("> ");
            std::io::stdout().flush().ok();
        }
        let Some(line) = lines.next_line().await.context("failed to read input")? else {
            break;
        };

        let command = ReplCommand::parse(&line);
        if command == ReplCommand::Quit {
            break;
        }
        if let Err(e) = handle(&mut consultation, command, cli).await {
            show_error(&e);
        }
    }

    tracing::info!(
        turns = consultation.session().turns().len(),
        documents = consultation.session().document_count(),
        "chat finished"
    );
    Ok(())
}

async fn handle(consultation: &mut Consultation, command: ReplCommand, cli: &Cli) -> Result<()> {
    let format = cli.format;
    match command {
        ReplCommand::Empty | ReplCommand::Quit => {}
        ReplCommand::Help => println!("{HELP}"),
        ReplCommand::Invalid(message) => eprintln!("{message}"),
        ReplCommand::Upload(path) => {
            super::upload(consultation, &path, format).await?;
        }
        ReplCommand::Docs => output::print_documents(consultation.session(), format),
        ReplCommand::Toggle(id) => {
            let included = consultation.toggle_document(id)?;
            println!(
                "Document {id} {}",
                if included { "included" } else { "excluded" }
            );
        }
        ReplCommand::Analyze(id) => {
            let filename = consultation
                .session()
                .document(id)
                .map(|d| d.filename.clone())
                .ok_or_else(|| ConsentLexError::DocumentNotFound(id.to_string()))?;
            ask(consultation, &analysis_prompt(&filename), cli).await?;
        }
        ReplCommand::Ask(question) => ask(consultation, &question, cli).await?,
        ReplCommand::Export(export_format) => {
            let outcome = consultation.export(export_format)?;
            let dir = consultation.config().export.output_dir.clone();
            super::write_outcome(&outcome, &dir, format)?;
        }
        ReplCommand::Save(path) => {
            let json = serde_json::to_string_pretty(consultation.session().turns())?;
            std::fs::write(&path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Transcript saved to {}", path.display());
        }
        ReplCommand::Clear => {
            consultation.reset();
            println!("Session cleared.");
        }
        ReplCommand::Status => {
            let report = consultation.diagnostics().await;
            output::print_diagnostics(&report, format);
        }
        ReplCommand::ClearCache => {
            consultation.clear_caches();
            println!("Caches cleared.");
        }
    }
    Ok(())
}

async fn ask(consultation: &mut Consultation, question: &str, cli: &Cli) -> Result<()> {
    let status = StatusLine::start("Waiting for the assistant...");
    let reply = consultation.ask(question).await;
    status.finish(cli.verbose);
    output::print_turn(&reply?, cli.format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_a_question() {
        assert_eq!(
            ReplCommand::parse("  ¿Es válido?  "),
            ReplCommand::Ask("¿Es válido?".into())
        );
        assert_eq!(ReplCommand::parse("   "), ReplCommand::Empty);
    }

    #[test]
    fn test_commands() {
        assert_eq!(ReplCommand::parse("/quit"), ReplCommand::Quit);
        assert_eq!(ReplCommand::parse("/docs"), ReplCommand::Docs);
        assert_eq!(
            ReplCommand::parse("/upload scans/consent form.pdf"),
            ReplCommand::Upload(PathBuf::from("scans/consent form.pdf"))
        );
        assert_eq!(ReplCommand::parse("/toggle #2"), ReplCommand::Toggle(DocumentId(2)));
        assert_eq!(ReplCommand::parse("/analyze 1"), ReplCommand::Analyze(DocumentId(1)));
        assert_eq!(ReplCommand::parse("/export"), ReplCommand::Export(ExportFormat::Pdf));
        assert_eq!(
            ReplCommand::parse("/export md"),
            ReplCommand::Export(ExportFormat::Markdown)
        );
        assert_eq!(ReplCommand::parse("/cache-clear"), ReplCommand::ClearCache);
    }

    #[test]
    fn test_invalid_commands() {
        assert!(matches!(ReplCommand::parse("/upload"), ReplCommand::Invalid(_)));
        assert!(matches!(ReplCommand::parse("/toggle abc"), ReplCommand::Invalid(_)));
        assert!(matches!(ReplCommand::parse("/export docx"), ReplCommand::Invalid(_)));
        assert!(matches!(ReplCommand::parse("/frobnicate"), ReplCommand::Invalid(_)));
    }
}
