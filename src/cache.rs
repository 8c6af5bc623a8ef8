//! TTL/LRU cache regions for embeddings, AI responses, and file metadata
//!
//! Four logical regions share one entry shape but carry different keys and
//! TTLs. Expiry is evaluated lazily at read time; there is no background
//! sweep. When a region is at capacity the single oldest-inserted entry is
//! evicted (insertion order, deliberately not LRU-by-access, so eviction
//! behavior stays predictable under test).
//!
//! The embedding and metadata regions support best-effort persistence as a
//! single JSON blob. A malformed or stale blob is discarded wholesale and
//! the cache starts cold; a corrupt payload is never partially trusted.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CtxError, Result};
use crate::schema::FileMetadata;

/// TTL for cached embedding vectors
pub const EMBEDDING_TTL_MS: u64 = 24 * 60 * 60 * 1000;
/// TTL for memoized AI responses
pub const AI_RESPONSE_TTL_MS: u64 = 60 * 60 * 1000;

/// Persisted blobs older than this are discarded wholesale on load
const PERSIST_MAX_AGE_MS: u64 = 7 * 24 * 60 * 60 * 1000;
/// Persisted blob schema version; bump on incompatible layout changes
const PERSIST_VERSION: u32 = 1;

const MAX_EMBEDDING_ENTRIES: usize = 1000;
const MAX_AI_ENTRIES: usize = 100;
const MAX_GENERIC_ENTRIES: usize = 1000;

/// Milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A cached value with creation and optional expiry stamps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    pub created_at: u64,
    /// `None` means the entry never expires
    pub expires_at: Option<u64>,
}

impl<T> CacheEntry<T> {
    fn new(data: T, ttl_ms: Option<u64>) -> Self {
        let now = now_ms();
        Self {
            data,
            created_at: now,
            expires_at: ttl_ms.map(|ttl| now + ttl),
        }
    }

    fn is_expired(&self, now: u64) -> bool {
        matches!(self.expires_at, Some(at) if now > at)
    }
}

/// One bounded, insertion-ordered cache region
struct Region<T> {
    entries: HashMap<String, CacheEntry<T>>,
    /// Keys in insertion order, kept in sync with `entries` so eviction
    /// always drops the oldest live entry
    order: VecDeque<String>,
    max_entries: usize,
}

impl<T> Region<T> {
    fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
        }
    }

    fn insert(&mut self, key: String, value: T, ttl_ms: Option<u64>) {
        if !self.entries.contains_key(&key) {
            while self.entries.len() >= self.max_entries {
                match self.order.pop_front() {
                    Some(oldest) => {
                        self.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
            self.order.push_back(key.clone());
        }
        self.entries.insert(key, CacheEntry::new(value, ttl_ms));
    }

    /// Get a live entry, lazily purging it if expired
    fn get(&mut self, key: &str) -> Option<&CacheEntry<T>> {
        let now = now_ms();
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.remove(key);
            return None;
        }
        self.entries.get(key)
    }

    fn remove(&mut self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// Hit/miss counters and region sizes
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Generic region size
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub embedding_entries: usize,
    pub ai_entries: usize,
    pub metadata_entries: usize,
}

struct CacheInner {
    embeddings: Region<Vec<f32>>,
    ai_responses: Region<String>,
    /// No TTL, no capacity bound; overwritten on change
    metadata: HashMap<String, FileMetadata>,
    generic: Region<serde_json::Value>,
    hits: u64,
    misses: u64,
}

/// Shared in-process cache with four regions.
///
/// Single writer, multiple readers per process; no cross-process
/// coordination. All methods take `&self`.
pub struct CacheStore {
    inner: Mutex<CacheInner>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                embeddings: Region::new(MAX_EMBEDDING_ENTRIES),
                ai_responses: Region::new(MAX_AI_ENTRIES),
                metadata: HashMap::new(),
                generic: Region::new(MAX_GENERIC_ENTRIES),
                hits: 0,
                misses: 0,
            }),
        }
    }

    // ========== Embedding region ==========

    pub fn get_embedding(&self, key: &str) -> Option<Vec<f32>> {
        let mut inner = self.inner.lock();
        inner.embeddings.get(key).map(|e| e.data.clone())
    }

    pub fn set_embedding(&self, key: &str, embedding: Vec<f32>) {
        let mut inner = self.inner.lock();
        inner
            .embeddings
            .insert(key.to_string(), embedding, Some(EMBEDDING_TTL_MS));
    }

    // ========== AI response region ==========

    pub fn get_ai_response(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock();
        inner.ai_responses.get(key).map(|e| e.data.clone())
    }

    pub fn set_ai_response(&self, key: &str, response: &str) {
        let mut inner = self.inner.lock();
        inner.ai_responses.insert(
            key.to_string(),
            response.to_string(),
            Some(AI_RESPONSE_TTL_MS),
        );
    }

    // ========== File metadata region ==========

    pub fn get_file_metadata(&self, path: &str) -> Option<FileMetadata> {
        self.inner.lock().metadata.get(path).cloned()
    }

    pub fn set_file_metadata(&self, metadata: FileMetadata) {
        self.inner
            .lock()
            .metadata
            .insert(metadata.path.clone(), metadata);
    }

    /// Compare a file's current mtime against the cached fingerprint.
    /// Unknown files count as changed.
    pub fn has_file_changed(&self, path: &str, current_modified: u64) -> bool {
        match self.get_file_metadata(path) {
            Some(meta) => meta.last_modified != current_modified,
            None => true,
        }
    }

    // ========== Generic region ==========

    /// Store a value; `ttl_ms = None` means the entry never expires.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl_ms: Option<u64>) {
        let json = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Dropping unserializable cache value for {}: {}", key, e);
                return;
            }
        };
        self.inner.lock().generic.insert(key.to_string(), json, ttl_ms);
    }

    /// Hit/miss counters increment only here, on the generic region.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut inner = self.inner.lock();
        match inner.generic.get(key).map(|e| e.data.clone()) {
            Some(value) => match serde_json::from_value(value) {
                Ok(v) => {
                    inner.hits += 1;
                    Some(v)
                }
                Err(_) => {
                    inner.misses += 1;
                    None
                }
            },
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner.lock().generic.get(key).is_some()
    }

    pub fn delete(&self, key: &str) {
        self.inner.lock().generic.remove(key);
    }

    /// Clear the generic region and reset counters
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.generic.clear();
        inner.hits = 0;
        inner.misses = 0;
    }

    /// Clear every region
    pub fn clear_all(&self) {
        let mut inner = self.inner.lock();
        inner.embeddings.clear();
        inner.ai_responses.clear();
        inner.metadata.clear();
        inner.generic.clear();
        inner.hits = 0;
        inner.misses = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            size: inner.generic.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
            embedding_entries: inner.embeddings.entries.len(),
            ai_entries: inner.ai_responses.entries.len(),
            metadata_entries: inner.metadata.len(),
        }
    }

    // ========== Persistence ==========

    /// Serialize the embedding and metadata regions to `path`.
    ///
    /// Best effort: expired embedding entries are dropped at save time.
    /// The write goes through a temp file and a rename so a crashed save
    /// never leaves a half-written blob.
    pub fn save(&self, path: &Path) -> Result<()> {
        let blob = {
            let inner = self.inner.lock();
            let now = now_ms();
            PersistedCache {
                version: PERSIST_VERSION,
                saved_at: now,
                saved_at_rfc3339: chrono::Utc::now().to_rfc3339(),
                embeddings: inner
                    .embeddings
                    .entries
                    .iter()
                    .filter(|(_, e)| !e.is_expired(now))
                    .map(|(k, e)| (k.clone(), e.clone()))
                    .collect(),
                metadata: inner
                    .metadata
                    .iter()
                    .map(|(k, m)| (k.clone(), m.clone()))
                    .collect(),
            }
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec(&blob).map_err(io_other)?)?;
        fs::rename(&tmp, path)?;
        tracing::debug!(
            "Persisted cache: {} embeddings, {} metadata entries",
            blob.embeddings.len(),
            blob.metadata.len()
        );
        Ok(())
    }

    /// Restore the embedding and metadata regions from `path`.
    ///
    /// A missing file is not an error. A malformed blob, a wrong schema
    /// version, or a blob past the global max age is discarded wholesale
    /// and the cache starts cold.
    pub fn load(&self, path: &Path) -> Result<()> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let blob: PersistedCache = match serde_json::from_slice(&raw) {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!("Discarding corrupt cache blob {}: {}", path.display(), e);
                let _ = fs::remove_file(path);
                return Err(CtxError::CacheCorrupted {
                    message: e.to_string(),
                });
            }
        };

        if blob.version != PERSIST_VERSION {
            tracing::warn!("Discarding cache blob with schema v{}", blob.version);
            let _ = fs::remove_file(path);
            return Ok(());
        }

        let now = now_ms();
        if now.saturating_sub(blob.saved_at) > PERSIST_MAX_AGE_MS {
            tracing::info!("Cache blob older than max age, starting cold");
            let _ = fs::remove_file(path);
            return Ok(());
        }

        let mut inner = self.inner.lock();
        for (key, entry) in blob.embeddings {
            if !entry.is_expired(now) {
                inner
                    .embeddings
                    .insert(key, entry.data, entry.expires_at.map(|at| at.saturating_sub(now)));
            }
        }
        for (key, meta) in blob.metadata {
            inner.metadata.insert(key, meta);
        }
        tracing::debug!(
            "Loaded cache: {} embeddings, {} metadata entries",
            inner.embeddings.entries.len(),
            inner.metadata.len()
        );
        Ok(())
    }
}

fn io_other(e: serde_json::Error) -> CtxError {
    CtxError::Io(std::io::Error::other(e))
}

#[derive(Serialize, Deserialize)]
struct PersistedCache {
    version: u32,
    saved_at: u64,
    /// Human-readable stamp for debugging the blob by hand
    saved_at_rfc3339: String,
    embeddings: Vec<(String, CacheEntry<Vec<f32>>)>,
    metadata: Vec<(String, FileMetadata)>,
}

/// Get the base cache directory (XDG-compliant)
pub fn get_cache_base_dir() -> PathBuf {
    if let Ok(xdg_cache) = std::env::var("XDG_CACHE_HOME") {
        return PathBuf::from(xdg_cache).join("ctx-engine");
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".cache").join("ctx-engine");
    }

    std::env::temp_dir().join("ctx-engine")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_set_get() {
        let cache = CacheStore::new();
        cache.set("k", &42u32, None);
        assert_eq!(cache.get::<u32>("k"), Some(42));
        assert!(cache.has("k"));

        cache.delete("k");
        assert_eq!(cache.get::<u32>("k"), None);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = CacheStore::new();
        cache.set("short", &"v", Some(10));
        assert_eq!(cache.get::<String>("short"), Some("v".to_string()));

        std::thread::sleep(std::time::Duration::from_millis(30));
        assert_eq!(cache.get::<String>("short"), None);
        assert!(!cache.has("short"));
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let cache = CacheStore::new();
        cache.set("forever", &1u8, None);
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(cache.get::<u8>("forever"), Some(1));
    }

    #[test]
    fn test_hit_miss_counters_generic_only() {
        let cache = CacheStore::new();
        cache.set("a", &1u8, None);
        let _ = cache.get::<u8>("a");
        let _ = cache.get::<u8>("missing");
        // Embedding region reads must not move the counters
        let _ = cache.get_embedding("emb:none");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_insertion_order_eviction() {
        let mut region: Region<u8> = Region::new(2);
        region.insert("first".into(), 1, None);
        region.insert("second".into(), 2, None);
        // Re-inserting an existing key must not evict anything
        region.insert("first".into(), 10, None);
        region.insert("third".into(), 3, None);

        assert!(region.get("first").is_none(), "oldest-inserted evicted");
        assert!(region.get("second").is_some());
        assert!(region.get("third").is_some());
    }

    #[test]
    fn test_reinsert_after_delete_is_newest() {
        let mut region: Region<u8> = Region::new(2);
        region.insert("a".into(), 1, None);
        region.insert("b".into(), 2, None);
        region.remove("a");
        region.insert("a".into(), 3, None);
        region.insert("c".into(), 4, None);

        // "b" is now the oldest live entry; the re-inserted "a" survives
        assert!(region.get("b").is_none());
        assert_eq!(region.get("a").map(|e| e.data), Some(3));
        assert!(region.get("c").is_some());
    }

    #[test]
    fn test_expired_entry_leaves_no_stale_order_slot() {
        let mut region: Region<u8> = Region::new(2);
        region.insert("a".into(), 1, Some(10));
        region.insert("b".into(), 2, None);

        std::thread::sleep(std::time::Duration::from_millis(30));
        assert!(region.get("a").is_none());

        region.insert("a".into(), 3, None);
        region.insert("c".into(), 4, None);
        assert!(region.get("b").is_none(), "oldest live entry evicted");
        assert!(region.get("a").is_some());
        assert!(region.get("c").is_some());
    }

    #[test]
    fn test_ai_response_region_roundtrip() {
        let cache = CacheStore::new();
        cache.set_ai_response("ai:q1", "the answer");
        assert_eq!(cache.get_ai_response("ai:q1"), Some("the answer".into()));
        assert_eq!(cache.get_ai_response("ai:other"), None);
        assert_eq!(cache.stats().ai_entries, 1);

        cache.clear_all();
        assert_eq!(cache.get_ai_response("ai:q1"), None);
        assert_eq!(cache.stats().ai_entries, 0);
    }

    #[test]
    fn test_embedding_region_roundtrip() {
        let cache = CacheStore::new();
        cache.set_embedding("emb:abc", vec![0.5, 0.25]);
        assert_eq!(cache.get_embedding("emb:abc"), Some(vec![0.5, 0.25]));
        assert_eq!(cache.get_embedding("emb:other"), None);
    }

    #[test]
    fn test_metadata_change_detection() {
        let cache = CacheStore::new();
        assert!(cache.has_file_changed("src/a.ts", 100));

        cache.set_file_metadata(FileMetadata {
            path: "src/a.ts".into(),
            last_modified: 100,
            size: 10,
            hash: Some("abc".into()),
        });
        assert!(!cache.has_file_changed("src/a.ts", 100));
        assert!(cache.has_file_changed("src/a.ts", 200));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let blob = dir.path().join("cache.json");

        let cache = CacheStore::new();
        cache.set_embedding("emb:x", vec![1.0, 2.0]);
        cache.set_file_metadata(FileMetadata {
            path: "src/a.ts".into(),
            last_modified: 1,
            size: 2,
            hash: Some("h".into()),
        });
        cache.save(&blob).unwrap();

        let restored = CacheStore::new();
        restored.load(&blob).unwrap();
        assert_eq!(restored.get_embedding("emb:x"), Some(vec![1.0, 2.0]));
        assert!(restored.get_file_metadata("src/a.ts").is_some());
    }

    #[test]
    fn test_load_corrupt_blob_starts_cold() {
        let dir = tempfile::tempdir().unwrap();
        let blob = dir.path().join("cache.json");
        fs::write(&blob, b"{ not json at all").unwrap();

        let cache = CacheStore::new();
        assert!(cache.load(&blob).is_err());
        assert_eq!(cache.stats().embedding_entries, 0);
        // The corrupt blob is removed so the next run loads nothing
        assert!(!blob.exists());
    }

    #[test]
    fn test_load_missing_file_is_ok() {
        let cache = CacheStore::new();
        assert!(cache.load(Path::new("/nonexistent/cache.json")).is_ok());
    }

    #[test]
    fn test_cache_base_dir() {
        let base = get_cache_base_dir();
        assert!(base.to_string_lossy().contains("ctx-engine"));
    }
}
