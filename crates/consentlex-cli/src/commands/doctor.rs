//! Service and environment diagnostics

use crate::app::{Cli, DoctorArgs};
use crate::output;
use crate::settings;
use anyhow::Result;
use consentlex_core::{Config, Consultation};

pub async fn run(args: &DoctorArgs, config: Config, cli: &Cli) -> Result<()> {
    let consultation =
        Consultation::from_config(config)?.with_config_dir(settings::config_dir(cli));
    if args.clear_cache {
        consultation.clear_caches();
    }
    let report = consultation.diagnostics().await;
    output::print_diagnostics(&report, cli.format);
    Ok(())
}
