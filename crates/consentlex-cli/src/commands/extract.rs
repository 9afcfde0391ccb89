//! Text extraction without the assistant

use crate::app::{Cli, ExtractArgs};
use crate::output;
use anyhow::{bail, Result};
use consentlex_core::Config;

pub async fn run(args: &ExtractArgs, config: Config, cli: &Cli) -> Result<()> {
    let mut consultation = super::open(cli, config, false)?;
    let mut failed = 0usize;

    for path in &args.files {
        let (name, bytes) = super::read_upload(path)?;
        let report = consultation.upload(&name, bytes).await?;
        if !report.is_extracted() {
            failed += 1;
        }
        let text = if args.text {
            consultation
                .session()
                .document(report.document)
                .and_then(|d| d.extracted_text.as_deref())
        } else {
            None
        };
        output::print_report(&report, text, cli.format);
    }

    if failed == args.files.len() {
        bail!("no document could be read");
    }
    Ok(())
}
