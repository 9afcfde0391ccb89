//! Configuration resolution for the CLI
//!
//! Core layering (defaults, files, environment) happens in
//! [`Config::load_from`]; this module adds flags and, on a terminal,
//! interactive entry of missing credentials.

use crate::app::Cli;
use anyhow::{bail, Context, Result};
use consentlex_core::Config;
use inquire::{InquireError, Password, PasswordDisplayMode, Text};
use std::io::IsTerminal;
use std::path::PathBuf;

pub fn config_dir(cli: &Cli) -> PathBuf {
    cli.config_dir.clone().unwrap_or_else(Config::default_dir)
}

/// Load the layered configuration and apply command-line overrides.
pub fn load(cli: &Cli) -> Result<Config> {
    let dir = config_dir(cli);
    let mut config = Config::load_from(&dir)
        .with_context(|| format!("failed to load configuration from {}", dir.display()))?;
    if let Some(ref model) = cli.model {
        config.assistant.model_name = Some(model.clone());
    }
    Ok(config)
}

/// Prompts are only shown on a terminal and never with `--no-input`.
pub fn interactive(cli: &Cli) -> bool {
    !cli.no_input && std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
}

fn missing(value: &Option<String>) -> bool {
    value.as_deref().map(|v| v.trim().is_empty()).unwrap_or(true)
}

fn answer(result: std::result::Result<String, InquireError>) -> Result<Option<String>> {
    match result {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => {
            bail!("cancelled")
        }
        Err(e) => Err(e).context("prompt failed"),
    }
}

/// Ask for the assistant key and id when they are not configured.
pub fn prompt_assistant_credentials(config: &mut Config) -> Result<()> {
    if missing(&config.assistant.api_key) {
        config.assistant.api_key = answer(
            Password::new("OpenAI API key:")
                .without_confirmation()
                .with_display_mode(PasswordDisplayMode::Masked)
                .with_help_message("Stored only for this run. Put it in secrets.yml to keep it.")
                .prompt(),
        )?;
    }
    if missing(&config.assistant.assistant_id) {
        config.assistant.assistant_id = answer(
            Text::new("Assistant id:")
                .with_placeholder("asst_...")
                .prompt(),
        )?;
    }
    Ok(())
}

/// Ask for the OCR key; an empty answer leaves OCR unconfigured.
pub fn prompt_ocr_credentials(config: &mut Config) -> Result<()> {
    if missing(&config.ocr.api_key) {
        config.ocr.api_key = answer(
            Password::new("OCR.space API key (empty to skip):")
                .without_confirmation()
                .with_display_mode(PasswordDisplayMode::Masked)
                .prompt(),
        )?;
    }
    Ok(())
}
