//! Export of a saved transcript

use crate::app::{Cli, ExportArgs};
use anyhow::{Context, Result};
use consentlex_core::session::hash_bytes;
use consentlex_core::{Config, ConversationTurn, ExportFormat, ExportPipeline, ExportRequest};

pub async fn run(args: &ExportArgs, config: Config, cli: &Cli) -> Result<()> {
    let raw = std::fs::read(&args.transcript)
        .with_context(|| format!("failed to read {}", args.transcript.display()))?;
    let turns: Vec<ConversationTurn> = serde_json::from_slice(&raw)
        .with_context(|| format!("{} is not a transcript", args.transcript.display()))?;

    let label: String = hash_bytes(&raw).chars().take(8).collect();
    let title = args.title.clone().unwrap_or(config.export.title);
    let request = ExportRequest::new(title, label, turns);

    let outcome = ExportPipeline::new().export(&request, ExportFormat::from(args.to))?;
    let dir = args.output.clone().unwrap_or(config.export.output_dir);
    super::write_outcome(&outcome, &dir, cli.format)?;
    Ok(())
}
