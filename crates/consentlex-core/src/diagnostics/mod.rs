//! Health reporting for the external services and the local environment

use crate::config::Config;
use crate::error::ConsentLexError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Proxy variables that change how outgoing requests are routed
pub const PROXY_VARIABLES: &[&str] = &[
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "ALL_PROXY",
    "NO_PROXY",
    "http_proxy",
    "https_proxy",
    "all_proxy",
    "no_proxy",
];

/// External services the application depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Assistant,
    Ocr,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Assistant => "assistant",
            ServiceKind::Ocr => "ocr",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of probing one service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub service: ServiceKind,
    pub configured: bool,
    /// `None` when no probe was attempted
    pub reachable: Option<bool>,
    pub credential_valid: Option<bool>,
    pub last_error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ServiceStatus {
    /// Status for a service whose credentials are missing; nothing was probed.
    pub fn unconfigured(service: ServiceKind) -> Self {
        Self {
            service,
            configured: false,
            reachable: None,
            credential_valid: None,
            last_error: None,
            checked_at: Utc::now(),
        }
    }

    /// Status after a completed probe
    pub fn probed(service: ServiceKind, reachable: bool, credential_valid: Option<bool>) -> Self {
        Self {
            service,
            configured: true,
            reachable: Some(reachable),
            credential_valid,
            last_error: None,
            checked_at: Utc::now(),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.configured && self.reachable == Some(true) && self.credential_valid != Some(false)
    }

    /// One-word summary for tables
    pub fn summary(&self) -> &'static str {
        if !self.configured {
            "unconfigured"
        } else if self.reachable == Some(false) {
            "unreachable"
        } else if self.credential_valid == Some(false) {
            "bad-credentials"
        } else if self.reachable == Some(true) {
            "ok"
        } else {
            "unknown"
        }
    }
}

#[derive(Debug, Clone)]
struct RecordedError {
    message: String,
    at: DateTime<Utc>,
}

/// Remembers the most recent failure of each service as calls happen.
#[derive(Debug, Default)]
pub struct ServiceMonitor {
    errors: Mutex<HashMap<ServiceKind, RecordedError>>,
}

impl ServiceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_error(&self, service: ServiceKind, error: &ConsentLexError) {
        tracing::debug!(
            service = %service,
            error_kind = %error.root().kind(),
            "service error recorded"
        );
        if let Ok(mut errors) = self.errors.lock() {
            errors.insert(
                service,
                RecordedError {
                    message: error.to_string(),
                    at: Utc::now(),
                },
            );
        }
    }

    pub fn record_success(&self, service: ServiceKind) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.remove(&service);
        }
    }

    pub fn last_error(&self, service: ServiceKind) -> Option<String> {
        self.errors
            .lock()
            .ok()?
            .get(&service)
            .map(|e| format!("{} ({})", e.message, e.at.format("%H:%M:%S")))
    }

    /// Fill in the recorded error when the probe itself did not report one.
    pub fn annotate(&self, mut status: ServiceStatus) -> ServiceStatus {
        if status.last_error.is_none() {
            status.last_error = self.last_error(status.service);
        }
        status
    }

    pub fn clear(&self) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.clear();
        }
    }
}

/// Local settings that commonly explain connection problems
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentReport {
    pub version: String,
    /// Proxy variables that are set, with credentials masked
    pub proxies: Vec<(String, String)>,
    pub config_path: PathBuf,
    pub config_exists: bool,
    pub log_dir: PathBuf,
    pub assistant_url: String,
    pub ocr_url: String,
}

impl EnvironmentReport {
    /// Describe the environment for `config`, loaded from `config_dir`.
    pub fn collect<F>(config: &Config, config_dir: &Path, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let proxies = PROXY_VARIABLES
            .iter()
            .filter_map(|name| {
                lookup(name).map(|v| (name.to_string(), mask_proxy_credentials(&v)))
            })
            .collect();
        let config_path = config_dir.join("config.yml");

        Self {
            version: crate::VERSION.to_string(),
            proxies,
            config_exists: config_path.exists(),
            config_path,
            log_dir: config.logging.dir.clone(),
            assistant_url: config.assistant.base_url.clone(),
            ocr_url: config.ocr.base_url.clone(),
        }
    }
}

/// Service probes plus environment details
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub services: Vec<ServiceStatus>,
    pub environment: EnvironmentReport,
}

impl DiagnosticsReport {
    pub fn all_healthy(&self) -> bool {
        self.services.iter().all(ServiceStatus::is_healthy)
    }
}

/// Replace `user:password@` in a proxy URL with `***@`.
pub fn mask_proxy_credentials(value: &str) -> String {
    lazy_static::lazy_static! {
        static ref USERINFO: Regex = Regex::new(r"^([a-zA-Z][a-zA-Z0-9+.-]*://)[^/@]+@").unwrap();
    }
    USERINFO.replace(value, "${1}***@").into_owned()
}
