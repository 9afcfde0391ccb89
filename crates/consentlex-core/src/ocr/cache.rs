//! OCR result caching so re-uploads of the same file skip the remote call

use super::OcrOutput;
use crate::session::hash_bytes;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

/// Cache entry with TTL
#[derive(Clone)]
struct CacheEntry {
    value: OcrOutput,
    expires_at: SystemTime,
}

/// In-memory cache of OCR results keyed by content hash
pub struct OcrCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    default_ttl: Duration,
}

impl Default for OcrCache {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrCache {
    /// Create new cache with default TTL of 1 hour
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(3600))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            default_ttl: ttl,
        }
    }

    /// Get cached value if exists and not expired
    pub fn get(&self, key: &str) -> Option<OcrOutput> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key)?;

        if SystemTime::now() < entry.expires_at {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    pub fn set(&self, key: String, value: OcrOutput) -> bool {
        let expires_at = SystemTime::now() + self.default_ttl;
        match self.entries.write() {
            Ok(mut entries) => {
                entries.retain(|_, entry| SystemTime::now() < entry.expires_at);
                entries.insert(key, CacheEntry { value, expires_at });
                true
            }
            Err(_) => false,
        }
    }

    /// Clear all entries
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            let dropped = entries.len();
            entries.clear();
            tracing::info!(dropped, "OCR cache cleared");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache key for a document of `media_type`
pub fn ocr_cache_key(media_type: &str, bytes: &[u8]) -> String {
    format!("ocr:{}:{}", media_type, hash_bytes(bytes))
}
