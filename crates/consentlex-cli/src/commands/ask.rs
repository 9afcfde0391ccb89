//! One-shot question

use crate::app::{AskArgs, Cli};
use crate::output;
use crate::progress::StatusLine;
use anyhow::Result;
use consentlex_core::{Config, ExportFormat};

pub async fn run(args: &AskArgs, config: Config, cli: &Cli) -> Result<()> {
    let mut consultation = super::open(cli, config, true)?;
    for path in &args.files {
        super::upload(&mut consultation, path, cli.format).await?;
    }

    let question = args.question.join(" ");
    let status = StatusLine::start("Waiting for the assistant...");
    let reply = consultation.ask(&question).await;
    status.finish(cli.verbose);
    output::print_turn(&reply?, cli.format);

    if let Some(format) = args.export {
        let dir = args
            .output
            .clone()
            .unwrap_or_else(|| consultation.config().export.output_dir.clone());
        let outcome = consultation.export(ExportFormat::from(format))?;
        super::write_outcome(&outcome, &dir, cli.format)?;
    }
    Ok(())
}
