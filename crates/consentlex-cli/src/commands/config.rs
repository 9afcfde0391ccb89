//! Configuration inspection

use crate::app::{Cli, ConfigAction, ConfigArgs, OutputFormat};
use crate::settings;
use anyhow::{bail, Result};
use consentlex_core::Config;

pub async fn run(args: &ConfigArgs, config: Config, cli: &Cli) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let redacted = config.redacted();
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&redacted)?),
                OutputFormat::Cli => print!("{}", serde_yaml::to_string(&redacted)?),
            }
        }
        ConfigAction::Path => {
            println!("{}", settings::config_dir(cli).join("config.yml").display());
        }
        ConfigAction::Init { force } => {
            let dir = settings::config_dir(cli);
            let path = dir.join("config.yml");
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            let written = Config::default().save_to(&dir)?;
            println!("Wrote {}", written.display());
        }
    }
    Ok(())
}
