//! OCR integration
//!
//! Provides:
//! - [`OcrClient`], the adapter contract used by the ingestion pipeline
//! - [`OcrAdapter`], which validates input, splits PDFs into page chunks,
//!   retries each chunk and caches results around any [`OcrBackend`]
//! - [`OcrSpaceBackend`], an HTTP backend for the OCR.space API

mod cache;
mod chunk;
mod ocr_space;

pub use cache::OcrCache;
pub use chunk::split_pdf;
pub use ocr_space::OcrSpaceBackend;

use crate::config::OcrConfig;
use crate::diagnostics::{ServiceKind, ServiceMonitor, ServiceStatus};
use crate::error::{ConsentLexError, ErrorKind, Result};
use crate::retry::{Operation, RetryPolicy};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Media types the OCR service accepts
pub const OCR_MEDIA_TYPES: &[&str] = &[
    "application/pdf",
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/bmp",
    "image/tiff",
    "image/webp",
];

pub fn is_ocr_media_type(media_type: &str) -> bool {
    OCR_MEDIA_TYPES.contains(&media_type)
}

/// Text recognized from a whole document
#[derive(Debug, Clone, Default, Serialize)]
pub struct OcrOutput {
    pub text: String,
    /// Number of chunks submitted
    pub chunks: usize,
    /// Zero-based indexes of chunks that produced no text
    pub failed_chunks: Vec<usize>,
    /// Served from the result cache
    pub cached: bool,
}

impl OcrOutput {
    pub fn is_partial(&self) -> bool {
        !self.failed_chunks.is_empty()
    }
}

/// Document-level OCR contract
#[async_trait]
pub trait OcrClient: Send + Sync {
    /// Recognize text in `bytes` of type `media_type`.
    async fn extract_text(&self, bytes: &[u8], media_type: &str) -> Result<OcrOutput>;

    /// Check reachability and credentials without processing a document.
    async fn probe(&self) -> ServiceStatus;

    /// Drop cached results.
    fn clear_cache(&self) {}
}

/// One remote recognition call on a single chunk
#[async_trait]
pub trait OcrBackend: Send + Sync {
    async fn recognize(&self, chunk: &[u8], media_type: &str) -> Result<String>;

    async fn probe(&self) -> ServiceStatus;

    fn name(&self) -> &str;
}

/// Validation, chunking, retry and caching around an [`OcrBackend`]
pub struct OcrAdapter<B> {
    backend: B,
    policy: RetryPolicy,
    max_bytes: usize,
    pages_per_chunk: usize,
    cache: OcrCache,
    monitor: Option<Arc<ServiceMonitor>>,
}

impl<B: OcrBackend> OcrAdapter<B> {
    pub fn new(backend: B, config: &OcrConfig, policy: RetryPolicy) -> Self {
        Self {
            backend,
            policy,
            max_bytes: config.max_bytes.max(1),
            pages_per_chunk: config.pages_per_chunk.max(1),
            cache: OcrCache::new(),
            monitor: None,
        }
    }

    /// Record failures on `monitor` for the diagnostics surface.
    pub fn with_monitor(mut self, monitor: Arc<ServiceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Reject unsupported input before anything leaves the process.
    fn validate(&self, bytes: &[u8], media_type: &str) -> Result<()> {
        if !is_ocr_media_type(media_type) {
            return Err(ConsentLexError::Validation(format!(
                "unsupported format for OCR: {media_type}"
            )));
        }
        if bytes.is_empty() {
            return Err(ConsentLexError::Validation("empty document".to_string()));
        }
        Ok(())
    }

    fn chunks(&self, bytes: &[u8], media_type: &str) -> Result<Vec<Vec<u8>>> {
        let chunks = if media_type == "application/pdf" {
            let pages = if bytes.len() > self.max_bytes {
                1
            } else {
                self.pages_per_chunk
            };
            split_pdf(bytes, pages)?
        } else {
            vec![bytes.to_vec()]
        };

        if let Some((idx, chunk)) = chunks
            .iter()
            .enumerate()
            .find(|(_, c)| c.len() > self.max_bytes)
        {
            return Err(ConsentLexError::Validation(format!(
                "unsupported size: chunk {} is {} bytes, the OCR limit is {} bytes",
                idx + 1,
                chunk.len(),
                self.max_bytes
            )));
        }
        Ok(chunks)
    }

    async fn recognize_chunk(
        &self,
        index: usize,
        total: usize,
        chunk: &[u8],
        media_type: &str,
    ) -> Result<String> {
        let name = format!("ocr.recognize[{}/{}]", index + 1, total);
        let text = Operation::new(name, self.policy.clone(), || {
            self.backend.recognize(chunk, media_type)
        })
        .run()
        .await?;

        if text.trim().is_empty() {
            return Err(ConsentLexError::Extraction(format!(
                "no text recognized in chunk {} (illegible scan?)",
                index + 1
            )));
        }
        Ok(text)
    }

    fn note_error(&self, error: &ConsentLexError) {
        if let Some(ref monitor) = self.monitor {
            monitor.record_error(ServiceKind::Ocr, error);
        }
    }
}

#[async_trait]
impl<B: OcrBackend> OcrClient for OcrAdapter<B> {
    async fn extract_text(&self, bytes: &[u8], media_type: &str) -> Result<OcrOutput> {
        self.validate(bytes, media_type)?;

        let cache_key = cache::ocr_cache_key(media_type, bytes);
        if let Some(mut cached) = self.cache.get(&cache_key) {
            tracing::debug!(media_type, "OCR cache hit");
            cached.cached = true;
            return Ok(cached);
        }

        let chunks = self.chunks(bytes, media_type)?;
        let total = chunks.len();
        tracing::info!(
            backend = self.backend.name(),
            media_type,
            bytes = bytes.len(),
            chunks = total,
            "submitting document for OCR"
        );

        let mut texts = Vec::with_capacity(total);
        let mut failed = Vec::new();
        let mut last_error = None;

        for (index, chunk) in chunks.iter().enumerate() {
            match self.recognize_chunk(index, total, chunk, media_type).await {
                Ok(text) => texts.push(text.trim().to_string()),
                Err(e) if e.root().kind() == ErrorKind::Configuration => {
                    self.note_error(&e);
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(chunk = index + 1, total, error = %e, "OCR chunk failed");
                    self.note_error(&e);
                    failed.push(index);
                    last_error = Some(e);
                }
            }
        }

        if texts.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                ConsentLexError::Extraction("no text recognized".to_string())
            }));
        }

        if let Some(ref monitor) = self.monitor {
            monitor.record_success(ServiceKind::Ocr);
        }

        let output = OcrOutput {
            text: texts.join("\n\n"),
            chunks: total,
            failed_chunks: failed,
            cached: false,
        };
        if !output.is_partial() {
            let _ = self.cache.set(cache_key, output.clone());
        }
        Ok(output)
    }

    async fn probe(&self) -> ServiceStatus {
        self.backend.probe().await
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }
}

/// Build the default HTTP OCR client from configuration.
pub fn ocr_client_from_config(
    config: &OcrConfig,
    policy: RetryPolicy,
    monitor: Arc<ServiceMonitor>,
) -> Result<OcrAdapter<OcrSpaceBackend>> {
    let backend = OcrSpaceBackend::new(config)?;
    Ok(OcrAdapter::new(backend, config, policy).with_monitor(monitor))
}
