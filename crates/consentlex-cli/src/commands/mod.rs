//! CLI command handlers

pub mod ask;
pub mod chat;
pub mod config;
pub mod doctor;
pub mod export;
pub mod extract;

use crate::app::{Cli, OutputFormat};
use crate::output;
use crate::settings;
use anyhow::{Context, Result};
use consentlex_core::{Config, Consultation, ExportOutcome, IngestReport};
use std::path::{Path, PathBuf};

/// File name and contents of an upload
pub fn read_upload(path: &Path) -> Result<(String, Vec<u8>)> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(String::from)
        .unwrap_or_else(|| path.display().to_string());
    Ok((name, bytes))
}

/// Build a consultation, prompting for what the command needs first.
pub fn open(cli: &Cli, mut config: Config, needs_assistant: bool) -> Result<Consultation> {
    if settings::interactive(cli) {
        if needs_assistant {
            settings::prompt_assistant_credentials(&mut config)?;
        }
        settings::prompt_ocr_credentials(&mut config)?;
    }
    Ok(Consultation::from_config(config)?.with_config_dir(settings::config_dir(cli)))
}

pub async fn upload(
    consultation: &mut Consultation,
    path: &Path,
    format: OutputFormat,
) -> Result<IngestReport> {
    let (name, bytes) = read_upload(path)?;
    let report = consultation.upload(&name, bytes).await?;
    output::print_report(&report, None, format);
    Ok(report)
}

/// Write a produced artifact into `dir` and print where it went.
pub fn write_outcome(
    outcome: &ExportOutcome,
    dir: &Path,
    format: OutputFormat,
) -> Result<Option<PathBuf>> {
    match outcome.artifact() {
        Some(artifact) => {
            let path = artifact.write_to(dir)?;
            output::print_artifact(artifact, &path, format);
            Ok(Some(path))
        }
        None => {
            output::print_nothing_to_export(format);
            Ok(None)
        }
    }
}
