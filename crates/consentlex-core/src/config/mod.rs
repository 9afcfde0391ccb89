//! Configuration management
//!
//! Values are layered: built-in defaults, `config.yml`, `secrets.yml`,
//! then environment variables. The CLI applies flags and interactive
//! entry on top of the result.

use crate::error::{ConsentLexError, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const REDACTED: &str = "********";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub assistant: AssistantConfig,

    #[serde(default)]
    pub ocr: OcrConfig,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub ingestion: IngestionConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Chat/assistant service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Base URL of the assistant API
    #[serde(default = "default_assistant_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub assistant_id: Option<String>,

    /// Model override for runs; the assistant's own model is used when unset
    #[serde(default)]
    pub model_name: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,

    /// How long `await_response` waits for a terminal run state
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_max_poll_interval")]
    pub max_poll_interval_ms: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            base_url: default_assistant_url(),
            api_key: None,
            assistant_id: None,
            model_name: None,
            timeout_secs: default_request_timeout(),
            run_timeout_secs: default_run_timeout(),
            poll_interval_ms: default_poll_interval(),
            max_poll_interval_ms: default_max_poll_interval(),
        }
    }
}

impl AssistantConfig {
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_poll_interval(&self) -> Duration {
        Duration::from_millis(self.max_poll_interval_ms.max(self.poll_interval_ms))
    }

    pub fn is_configured(&self) -> bool {
        has_value(&self.api_key) && has_value(&self.assistant_id)
    }
}

fn default_assistant_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_run_timeout() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    1500
}

fn default_max_poll_interval() -> u64 {
    5000
}

/// OCR service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_ocr_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// OCR language code passed to the service
    #[serde(default = "default_ocr_language")]
    pub language: String,

    /// Largest document accepted by the service, in bytes
    #[serde(default = "default_ocr_max_bytes")]
    pub max_bytes: usize,

    /// Pages per submitted PDF chunk
    #[serde(default = "default_pages_per_chunk")]
    pub pages_per_chunk: usize,

    #[serde(default = "default_ocr_timeout")]
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            base_url: default_ocr_url(),
            api_key: None,
            language: default_ocr_language(),
            max_bytes: default_ocr_max_bytes(),
            pages_per_chunk: default_pages_per_chunk(),
            timeout_secs: default_ocr_timeout(),
        }
    }
}

impl OcrConfig {
    pub fn is_configured(&self) -> bool {
        has_value(&self.api_key)
    }
}

fn default_ocr_url() -> String {
    "https://api.ocr.space".to_string()
}

fn default_ocr_language() -> String {
    "spa".to_string()
}

fn default_ocr_max_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_pages_per_chunk() -> usize {
    3
}

fn default_ocr_timeout() -> u64 {
    90
}

/// Retry policy settings, in milliseconds so they read well in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default = "default_rate_limit_multiplier")]
    pub rate_limit_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay(),
            rate_limit_multiplier: default_rate_limit_multiplier(),
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier.max(1.0),
            max_delay: Duration::from_millis(self.max_delay_ms.max(self.base_delay_ms)),
            rate_limit_multiplier: self.rate_limit_multiplier.max(1.0),
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_rate_limit_multiplier() -> f64 {
    3.0
}

/// Upload validation and pre-processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Upload size ceiling in bytes
    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: usize,

    /// Images larger than this (longest side, pixels) are down-scaled
    #[serde(default = "default_max_image_dimension")]
    pub max_image_dimension: u32,

    #[serde(default = "default_true")]
    pub optimize: bool,

    /// Read the embedded text layer of PDFs before falling back to OCR
    #[serde(default = "default_true")]
    pub prefer_text_layer: bool,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload(),
            max_image_dimension: default_max_image_dimension(),
            optimize: true,
            prefer_text_layer: true,
        }
    }
}

fn default_max_upload() -> usize {
    20 * 1024 * 1024
}

fn default_max_image_dimension() -> u32 {
    2400
}

fn default_true() -> bool {
    true
}

/// Export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_export_title")]
    pub title: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_export_dir(),
            title: default_export_title(),
        }
    }
}

fn default_export_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_export_title() -> String {
    "ConsentLex - Informed consent review".to_string()
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Directory for the daily rotating log file
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            dir: default_log_dir(),
        }
    }
}

fn default_log_filter() -> String {
    "consentlex=info,consentlex_core=info,warn".to_string()
}

fn default_log_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(crate::CACHE_DIR_NAME)
        .join("logs")
}

/// Credentials that may be kept apart from the main config file
#[derive(Debug, Clone, Default, Deserialize)]
struct Secrets {
    #[serde(default, alias = "OPENAI_API_KEY")]
    openai_api_key: Option<String>,
    #[serde(default, alias = "ASSISTANT_ID")]
    assistant_id: Option<String>,
    #[serde(default, alias = "OCR_API_KEY")]
    ocr_api_key: Option<String>,
}

impl Config {
    /// Load `config.yml` and `secrets.yml` from `dir`, then apply the environment
    pub fn load_from(dir: &Path) -> Result<Self> {
        Self::load_with_env(dir, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load_from`] with an explicit environment lookup
    pub fn load_with_env<F>(dir: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_path = dir.join("config.yml");
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_yaml::from_str(&content)?
        } else {
            Config::default()
        };

        let secrets_path = dir.join("secrets.yml");
        if secrets_path.exists() {
            let content = std::fs::read_to_string(&secrets_path)?;
            let secrets: Secrets = serde_yaml::from_str(&content)?;
            config.apply_secrets(secrets);
        }

        config.apply_env(lookup);
        Ok(config)
    }

    /// Write `config.yml` (without secrets) into `dir`
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("config.yml");
        let content = serde_yaml::to_string(&self.without_secrets())?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// `$CONSENTLEX_CONFIG_DIR`, else `consentlex` under the platform config dir
    pub fn default_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("CONSENTLEX_CONFIG_DIR") {
            return PathBuf::from(dir);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(crate::CONFIG_DIR_NAME)
    }

    fn apply_secrets(&mut self, secrets: Secrets) {
        if let Some(key) = secrets.openai_api_key {
            self.assistant.api_key = Some(key);
        }
        if let Some(id) = secrets.assistant_id {
            self.assistant.assistant_id = Some(id);
        }
        if let Some(key) = secrets.ocr_api_key {
            self.ocr.api_key = Some(key);
        }
    }

    /// Apply environment overrides using `lookup` (injectable for tests)
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| lookup(k))
                .find(|v| !v.trim().is_empty())
        };

        if let Some(v) = get(&["CONSENTLEX_API_KEY", "OPENAI_API_KEY"]) {
            self.assistant.api_key = Some(v);
        }
        if let Some(v) = get(&["CONSENTLEX_ASSISTANT_ID", "ASSISTANT_ID"]) {
            self.assistant.assistant_id = Some(v);
        }
        if let Some(v) = get(&["CONSENTLEX_MODEL", "OPENAI_MODEL"]) {
            self.assistant.model_name = Some(v);
        }
        if let Some(v) = get(&["CONSENTLEX_ASSISTANT_URL", "OPENAI_BASE_URL"]) {
            self.assistant.base_url = v;
        }
        if let Some(v) = get(&["CONSENTLEX_OCR_API_KEY", "OCR_API_KEY"]) {
            self.ocr.api_key = Some(v);
        }
        if let Some(v) = get(&["CONSENTLEX_OCR_URL"]) {
            self.ocr.base_url = v;
        }
        if let Some(v) = get(&["CONSENTLEX_LOG_DIR"]) {
            self.logging.dir = PathBuf::from(v);
        }
        if let Some(v) = get(&["CONSENTLEX_EXPORT_DIR"]) {
            self.export.output_dir = PathBuf::from(v);
        }
        if let Some(n) = get(&["CONSENTLEX_MAX_ATTEMPTS"]).and_then(|v| v.parse().ok()) {
            self.retry.max_attempts = n;
        }
    }

    /// Fail with a configuration error naming every missing assistant credential
    pub fn validate_assistant(&self) -> Result<()> {
        let mut missing = Vec::new();
        if !has_value(&self.assistant.api_key) {
            missing.push("api_key");
        }
        if !has_value(&self.assistant.assistant_id) {
            missing.push("assistant_id");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConsentLexError::Configuration(format!(
                "missing assistant settings: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn validate_ocr(&self) -> Result<()> {
        if self.ocr.is_configured() {
            Ok(())
        } else {
            Err(ConsentLexError::Configuration(
                "missing OCR setting: api_key".to_string(),
            ))
        }
    }

    /// Copy of the config safe to print
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.assistant.api_key.is_some() {
            copy.assistant.api_key = Some(REDACTED.to_string());
        }
        if copy.assistant.assistant_id.is_some() {
            copy.assistant.assistant_id = Some(REDACTED.to_string());
        }
        if copy.ocr.api_key.is_some() {
            copy.ocr.api_key = Some(REDACTED.to_string());
        }
        copy
    }

    fn without_secrets(&self) -> Self {
        let mut copy = self.clone();
        copy.assistant.api_key = None;
        copy.assistant.assistant_id = None;
        copy.ocr.api_key = None;
        copy
    }
}

fn has_value(value: &Option<String>) -> bool {
    value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
}
