//! Embedding backends and the memoizing embedding service
//!
//! The service converts text into fixed-length dense vectors. It memoizes by
//! content hash, degrades through a fallback backend, and ultimately falls
//! back to the zero vector: embedding is never a hard failure path for the
//! indexer or the context assembler.
//!
//! The primary/fallback switch is a one-way latch for the process lifetime.
//! Once the primary has failed or timed out, every later call goes straight
//! to the fallback; there is no per-call retry of the primary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::CacheStore;
use crate::error::{CtxError, Result};
use crate::hash::embedding_cache_key;
use crate::schema::FileRecord;

/// Vector dimension, fixed for the process lifetime
pub const EMBEDDING_DIM: usize = 384;

/// Bound on a single backend call
pub const EMBED_TIMEOUT: Duration = Duration::from_secs(30);

/// Similarity floor below which a file is not considered relevant
pub const MIN_SIMILARITY: f32 = 0.15;

/// Input longer than this is truncated before reaching a backend
const MAX_EMBED_INPUT: usize = 5000;

/// A pluggable text-to-vector backend
pub trait EmbeddingBackend: Send + Sync {
    fn name(&self) -> &str;
    fn dimension(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Deterministic offline backend: token and character-trigram feature
/// hashing into a fixed-dimension vector, L2-normalized.
///
/// Not a learned model; useful as a fallback and for reproducible tests.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(EMBEDDING_DIM)
    }
}

impl EmbeddingBackend for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();

        for token in lowered.split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            bump(&mut vector, token, 1.0);

            let chars: Vec<char> = token.chars().collect();
            for window in chars.windows(3) {
                let tri: String = window.iter().collect();
                bump(&mut vector, &tri, 0.5);
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

/// Add a hashed feature with a sign derived from the hash
fn bump(vector: &mut [f32], feature: &str, weight: f32) {
    let h = crate::hash::fnv1a_hash(feature);
    let idx = (h % vector.len() as u64) as usize;
    let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
    vector[idx] += sign * weight;
}

/// OpenAI-compatible `/embeddings` endpoint backend
pub struct HttpEmbedder {
    endpoint: String,
    model: String,
    dimension: usize,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingsRow>,
}

#[derive(Deserialize)]
struct EmbeddingsRow {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            dimension,
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl EmbeddingBackend for HttpEmbedder {
    fn name(&self) -> &str {
        "http"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = truncate_chars(text, MAX_EMBED_INPUT);
        let body = serde_json::json!({
            "model": self.model,
            "input": input,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .timeout(EMBED_TIMEOUT)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| CtxError::EmbeddingFailure {
                message: format!("{}: {}", self.endpoint, e),
            })?;

        let parsed: EmbeddingsResponse =
            response.json().map_err(|e| CtxError::EmbeddingFailure {
                message: format!("malformed embeddings response: {}", e),
            })?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|row| row.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CtxError::EmbeddingFailure {
                message: "backend returned an empty embedding".to_string(),
            })?;

        Ok(embedding)
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Memoizing embedding service with a primary/fallback backend chain
pub struct EmbeddingService {
    primary: Arc<dyn EmbeddingBackend>,
    fallback: Arc<dyn EmbeddingBackend>,
    cache: Arc<CacheStore>,
    timeout: Duration,
    fallback_latched: AtomicBool,
}

impl EmbeddingService {
    pub fn new(
        primary: Arc<dyn EmbeddingBackend>,
        fallback: Arc<dyn EmbeddingBackend>,
        cache: Arc<CacheStore>,
    ) -> Self {
        Self {
            primary,
            fallback,
            cache,
            timeout: EMBED_TIMEOUT,
            fallback_latched: AtomicBool::new(false),
        }
    }

    /// Service backed by the deterministic hashing embedder on both slots
    pub fn offline(cache: Arc<CacheStore>) -> Self {
        Self::new(
            Arc::new(HashingEmbedder::default()),
            Arc::new(HashingEmbedder::default()),
            cache,
        )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn dimension(&self) -> usize {
        self.primary.dimension()
    }

    /// Whether the primary backend has been abandoned for this process
    pub fn is_fallback_active(&self) -> bool {
        self.fallback_latched.load(Ordering::Relaxed)
    }

    /// Embed text, returning the zero vector rather than an error when
    /// every backend fails. Successful results are written back to the
    /// embedding cache keyed by content hash.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let key = embedding_cache_key(text);
        if let Some(cached) = self.cache.get_embedding(&key) {
            return cached;
        }

        if text.trim().is_empty() {
            return vec![0.0; self.dimension()];
        }

        if !self.fallback_latched.load(Ordering::Relaxed) {
            match self.call_backend(&self.primary, text) {
                Ok(embedding) => {
                    self.cache.set_embedding(&key, embedding.clone());
                    return embedding;
                }
                Err(e) => {
                    tracing::warn!(
                        "Primary embedding backend '{}' failed, latching fallback: {}",
                        self.primary.name(),
                        e
                    );
                    self.fallback_latched.store(true, Ordering::Relaxed);
                }
            }
        }

        match self.call_backend(&self.fallback, text) {
            Ok(embedding) => {
                self.cache.set_embedding(&key, embedding.clone());
                embedding
            }
            Err(e) => {
                tracing::warn!(
                    "Fallback embedding backend '{}' failed, using zero vector: {}",
                    self.fallback.name(),
                    e
                );
                vec![0.0; self.dimension()]
            }
        }
    }

    /// Run one backend call on a worker thread with a bounded wait.
    /// A timed-out worker is abandoned, not joined.
    fn call_backend(
        &self,
        backend: &Arc<dyn EmbeddingBackend>,
        text: &str,
    ) -> Result<Vec<f32>> {
        let (tx, rx) = mpsc::channel();
        let backend = Arc::clone(backend);
        let text = text.to_string();
        std::thread::spawn(move || {
            let _ = tx.send(backend.embed(&text));
        });

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(embedding)) if embedding.is_empty() => Err(CtxError::EmbeddingFailure {
                message: "backend returned an empty embedding".to_string(),
            }),
            Ok(result) => result,
            Err(_) => Err(CtxError::EmbeddingFailure {
                message: format!("timed out after {:?}", self.timeout),
            }),
        }
    }
}

/// Cosine similarity of two vectors.
///
/// Vectors of unequal length are truncated to the shorter length rather
/// than raising; returns 0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }
    let (a, b) = (&a[..len], &b[..len]);

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..len {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator == 0.0 {
        return 0.0;
    }
    dot / denominator
}

/// Rank files by similarity to the query embedding, keeping the top-k
/// above [`MIN_SIMILARITY`].
pub fn find_relevant_files(
    query_embedding: &[f32],
    files: &[Arc<FileRecord>],
    top_k: usize,
) -> Vec<(Arc<FileRecord>, f32)> {
    let mut scored: Vec<(Arc<FileRecord>, f32)> = files
        .iter()
        .map(|f| (Arc::clone(f), cosine_similarity(query_embedding, &f.embedding)))
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored.retain(|(_, score)| *score > MIN_SIMILARITY);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingBackend;

    impl EmbeddingBackend for FailingBackend {
        fn name(&self) -> &str {
            "failing"
        }
        fn dimension(&self) -> usize {
            EMBEDDING_DIM
        }
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(CtxError::EmbeddingFailure {
                message: "always fails".to_string(),
            })
        }
    }

    struct SlowBackend;

    impl EmbeddingBackend for SlowBackend {
        fn name(&self) -> &str {
            "slow"
        }
        fn dimension(&self) -> usize {
            EMBEDDING_DIM
        }
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            std::thread::sleep(Duration::from_millis(200));
            HashingEmbedder::default().embed(text)
        }
    }

    fn offline_service() -> EmbeddingService {
        EmbeddingService::offline(Arc::new(CacheStore::new()))
    }

    #[test]
    fn test_embed_deterministic_self_similarity() {
        let service = offline_service();
        let a = service.embed("fn parse_config(path: &str)");
        let b = service.embed("fn parse_config(path: &str)");
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let service = offline_service();
        let v = service.embed("   \n\t  ");
        assert_eq!(v.len(), EMBEDDING_DIM);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_similarity_commutative() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![0.5, -1.0, 2.0];
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
    }

    #[test]
    fn test_similarity_length_mismatch_truncates() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 5.0, 5.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_zero_magnitude() {
        let zero = vec![0.0, 0.0, 0.0];
        let other = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&zero, &other), 0.0);
        assert_eq!(cosine_similarity(&[], &other), 0.0);
    }

    #[test]
    fn test_fallback_latch_is_one_way() {
        let service = EmbeddingService::new(
            Arc::new(FailingBackend),
            Arc::new(HashingEmbedder::default()),
            Arc::new(CacheStore::new()),
        );
        assert!(!service.is_fallback_active());

        let v = service.embed("some text");
        assert!(service.is_fallback_active());
        assert!(v.iter().any(|x| *x != 0.0), "fallback produced a vector");

        // Latch stays flipped for later calls
        let _ = service.embed("other text");
        assert!(service.is_fallback_active());
    }

    #[test]
    fn test_both_backends_failing_yields_zero_vector() {
        let service = EmbeddingService::new(
            Arc::new(FailingBackend),
            Arc::new(FailingBackend),
            Arc::new(CacheStore::new()),
        );
        let v = service.embed("anything");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_timeout_latches_fallback() {
        let service = EmbeddingService::new(
            Arc::new(SlowBackend),
            Arc::new(HashingEmbedder::default()),
            Arc::new(CacheStore::new()),
        )
        .with_timeout(Duration::from_millis(20));

        let v = service.embed("slow path");
        assert!(service.is_fallback_active());
        assert!(v.iter().any(|x| *x != 0.0));
    }

    #[test]
    fn test_embed_writes_back_to_cache() {
        let cache = Arc::new(CacheStore::new());
        let service = EmbeddingService::offline(Arc::clone(&cache));
        let _ = service.embed("cached text");

        let key = embedding_cache_key("cached text");
        assert!(cache.get_embedding(&key).is_some());
    }

    #[test]
    fn test_find_relevant_files_applies_floor_and_topk() {
        let service = offline_service();
        let query = service.embed("user authentication login");

        let make = |path: &str, text: &str| {
            Arc::new(FileRecord {
                path: path.into(),
                content: text.into(),
                embedding: service.embed(text),
                last_modified: 0,
            })
        };

        let files = vec![
            make("auth.ts", "function login(user) { authenticate(user); }"),
            make("math.ts", "function add(a, b) { return a + b; }"),
            make("session.ts", "login session for an authenticated user"),
        ];

        let hits = find_relevant_files(&query, &files, 2);
        assert!(hits.len() <= 2);
        for (_, score) in &hits {
            assert!(*score > MIN_SIMILARITY);
        }
    }
}
