//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use consentlex_core::ExportFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "consentlex")]
#[command(
    author,
    version,
    about = "Review informed-consent documents with an AI assistant"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "cli")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration directory (config.yml, secrets.yml)
    #[arg(long, global = true, env = "CONSENTLEX_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Model override for assistant runs
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Never prompt for missing settings
    #[arg(long, global = true)]
    pub no_input: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive consultation
    Chat(ChatArgs),

    /// Ask a single question, optionally about some documents
    Ask(AskArgs),

    /// Extract the text of documents without asking anything
    Extract(ExtractArgs),

    /// Export a saved transcript
    Export(ExportArgs),

    /// Check service connectivity and the local environment
    Doctor(DoctorArgs),

    /// Inspect or create the configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct ChatArgs {
    /// Documents to upload before the first question
    pub files: Vec<PathBuf>,
}

#[derive(Args)]
pub struct AskArgs {
    /// Question text
    #[arg(required = true)]
    pub question: Vec<String>,

    /// Document to include (repeatable)
    #[arg(short = 'f', long = "file")]
    pub files: Vec<PathBuf>,

    /// Also export the exchange in this format
    #[arg(long, value_enum)]
    pub export: Option<ExportFormatArg>,

    /// Directory for exported files
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ExtractArgs {
    /// Documents to extract
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Print the extracted text
    #[arg(long)]
    pub text: bool,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Transcript JSON written by `/save` in chat
    pub transcript: PathBuf,

    /// Target format
    #[arg(long = "to", value_enum, default_value = "pdf")]
    pub to: ExportFormatArg,

    /// Directory for the exported file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Document title
    #[arg(long)]
    pub title: Option<String>,
}

#[derive(Args)]
pub struct DoctorArgs {
    /// Drop cached OCR results before probing
    #[arg(long)]
    pub clear_cache: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration with secrets masked
    Show,
    /// Print the configuration file path
    Path,
    /// Write a default config.yml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Cli,
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormatArg {
    Markdown,
    Html,
    Pdf,
    Text,
}

impl From<ExportFormatArg> for ExportFormat {
    fn from(arg: ExportFormatArg) -> Self {
        match arg {
            ExportFormatArg::Markdown => ExportFormat::Markdown,
            ExportFormatArg::Html => ExportFormat::Html,
            ExportFormatArg::Pdf => ExportFormat::Pdf,
            ExportFormatArg::Text => ExportFormat::PlainText,
        }
    }
}
