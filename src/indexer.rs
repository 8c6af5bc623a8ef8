//! Incremental project indexing
//!
//! Re-indexing a project only pays for what changed: files whose modified
//! time matches the previous run are carried over as the same `Arc`-shared
//! record, and files whose content hash is already cached reuse their stored
//! embedding. Only genuinely new content reaches the embedding service.
//!
//! Changed files are embedded in small batches so one slow file cannot stall
//! the whole run, with the batch itself fanned out across the rayon pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ahash::{AHashMap, AHashSet};
use rayon::prelude::*;

use crate::cache::CacheStore;
use crate::embedding::EmbeddingService;
use crate::error::Result;
use crate::hash::file_cache_key;
use crate::schema::{FileMetadata, FileRecord};
use crate::workspace::Workspace;

/// Stored file content is capped at this many bytes
pub const MAX_CONTENT_BYTES: usize = 10 * 1024;

/// Changed files are embedded this many at a time
pub const EMBED_BATCH_SIZE: usize = 5;

/// Progress callback receiving (current, total, path)
pub type IndexProgressCallback = Box<dyn Fn(usize, usize, &str) + Send + Sync>;

/// Result of one indexing pass
#[derive(Debug)]
pub struct IndexOutcome {
    /// All live records, previous-run records reused untouched where possible
    pub indexed: Vec<Arc<FileRecord>>,
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub removed: usize,
    pub duration_ms: u64,
}

/// Indexer that diffs the workspace against a previous run
pub struct IncrementalIndexer {
    embeddings: Arc<EmbeddingService>,
    cache: Arc<CacheStore>,
}

impl IncrementalIndexer {
    pub fn new(embeddings: Arc<EmbeddingService>, cache: Arc<CacheStore>) -> Self {
        Self { embeddings, cache }
    }

    /// Index the workspace, reusing `previous` records where the file is
    /// unchanged.
    ///
    /// Unchanged files (same modified time as their previous record) are
    /// returned as the identical `Arc`, so downstream holders can detect
    /// reuse by pointer. Files that fail to read are skipped without
    /// counting toward any bucket. Files present in `previous` but no
    /// longer on disk only increment `removed`.
    pub fn index_project(
        &self,
        workspace: &dyn Workspace,
        previous: &[Arc<FileRecord>],
        progress: Option<IndexProgressCallback>,
    ) -> Result<IndexOutcome> {
        let start = Instant::now();
        let files = workspace.scan()?;
        let total = files.len();

        let previous_by_path: AHashMap<&str, &Arc<FileRecord>> = previous
            .iter()
            .map(|record| (record.path.as_str(), record))
            .collect();

        let mut indexed: Vec<Arc<FileRecord>> = Vec::with_capacity(total);
        let mut skipped = 0usize;
        let mut pending: Vec<(String, FileMetadata)> = Vec::new();
        let processed = AtomicUsize::new(0);

        let report = |path: &str| {
            let current = processed.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(ref cb) = progress {
                cb(current, total, path);
            }
        };

        for path in &files {
            let meta = match workspace.stat(path) {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path, e);
                    report(path);
                    continue;
                }
            };

            match previous_by_path.get(path.as_str()) {
                Some(record) if record.last_modified == meta.last_modified => {
                    indexed.push(Arc::clone(record));
                    skipped += 1;
                    report(path);
                }
                _ => pending.push((path.clone(), meta)),
            }
        }

        let mut added = 0usize;
        let mut updated = 0usize;

        for batch in pending.chunks(EMBED_BATCH_SIZE) {
            let records: Vec<Option<(Arc<FileRecord>, FileMetadata)>> = batch
                .par_iter()
                .map(|(path, meta)| {
                    let record = match self.build_record(workspace, path, meta.last_modified) {
                        Ok(record) => record,
                        Err(e) => {
                            tracing::warn!("Skipping {}: {}", path, e);
                            report(path);
                            return None;
                        }
                    };
                    report(path);
                    Some((record, meta.clone()))
                })
                .collect();

            for entry in records.into_iter().flatten() {
                let (record, mut meta) = entry;
                meta.hash = Some(crate::hash::content_hash(&record.content));
                if previous_by_path.contains_key(record.path.as_str()) {
                    updated += 1;
                } else {
                    added += 1;
                }
                self.cache.set_file_metadata(meta);
                indexed.push(record);
            }
        }

        let scanned: AHashSet<&str> = files.iter().map(|p| p.as_str()).collect();
        let removed = previous
            .iter()
            .filter(|record| !scanned.contains(record.path.as_str()))
            .count();

        indexed.sort_by(|a, b| a.path.cmp(&b.path));

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Indexed {} files in {}ms ({} added, {} updated, {} skipped, {} removed)",
            indexed.len(),
            duration_ms,
            added,
            updated,
            skipped,
            removed
        );

        Ok(IndexOutcome {
            indexed,
            added,
            updated,
            skipped,
            removed,
            duration_ms,
        })
    }

    /// Index one file, reusing the previous record when unchanged
    pub fn index_single_file(
        &self,
        workspace: &dyn Workspace,
        rel_path: &str,
        previous: Option<&Arc<FileRecord>>,
    ) -> Result<Arc<FileRecord>> {
        let mut meta = workspace.stat(rel_path)?;
        if let Some(record) = previous {
            if record.last_modified == meta.last_modified {
                return Ok(Arc::clone(record));
            }
        }
        let record = self.build_record(workspace, rel_path, meta.last_modified)?;
        meta.hash = Some(crate::hash::content_hash(&record.content));
        self.cache.set_file_metadata(meta);
        Ok(record)
    }

    fn build_record(
        &self,
        workspace: &dyn Workspace,
        rel_path: &str,
        last_modified: u64,
    ) -> Result<Arc<FileRecord>> {
        let content = cap_content(workspace.read(rel_path)?);

        // A content-identical version may already have an embedding cached
        let key = file_cache_key(rel_path, &content);
        let embedding = match self.cache.get_embedding(&key) {
            Some(embedding) => embedding,
            None => {
                let embedding = self.embeddings.embed(&content);
                self.cache.set_embedding(&key, embedding.clone());
                embedding
            }
        };

        Ok(Arc::new(FileRecord {
            path: rel_path.to_string(),
            content,
            embedding,
            last_modified,
        }))
    }
}

/// Truncate content to the byte cap on a char boundary
fn cap_content(mut content: String) -> String {
    if content.len() <= MAX_CONTENT_BYTES {
        return content;
    }
    let mut cut = MAX_CONTENT_BYTES;
    while !content.is_char_boundary(cut) {
        cut -= 1;
    }
    content.truncate(cut);
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    use crate::workspace::OsWorkspace;

    fn indexer() -> IncrementalIndexer {
        let cache = Arc::new(CacheStore::new());
        let embeddings = Arc::new(EmbeddingService::offline(Arc::clone(&cache)));
        IncrementalIndexer::new(embeddings, cache)
    }

    fn touch(path: &std::path::Path, offset_secs: u64) {
        let file = fs::File::options().write(true).open(path).unwrap();
        let mtime = SystemTime::now() + Duration::from_secs(offset_secs);
        file.set_modified(mtime).unwrap();
    }

    #[test]
    fn test_fresh_index_counts_added() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.ts"), "export const a = 1;").unwrap();
        fs::write(dir.path().join("b.ts"), "export const b = 2;").unwrap();

        let outcome = indexer()
            .index_project(&OsWorkspace::new(dir.path()), &[], None)
            .unwrap();

        assert_eq!(outcome.added, 2);
        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(outcome.removed, 0);
        assert_eq!(outcome.indexed.len(), 2);
        assert_eq!(outcome.indexed[0].path, "a.ts");
    }

    #[test]
    fn test_unchanged_files_reuse_records() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.ts"), "export const a = 1;").unwrap();

        let indexer = indexer();
        let workspace = OsWorkspace::new(dir.path());
        let first = indexer.index_project(&workspace, &[], None).unwrap();
        let second = indexer
            .index_project(&workspace, &first.indexed, None)
            .unwrap();

        assert_eq!(second.skipped, 1);
        assert_eq!(second.added, 0);
        assert!(Arc::ptr_eq(&first.indexed[0], &second.indexed[0]));
    }

    #[test]
    fn test_modified_file_counts_updated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.ts");
        fs::write(&path, "export const a = 1;").unwrap();

        let indexer = indexer();
        let workspace = OsWorkspace::new(dir.path());
        let first = indexer.index_project(&workspace, &[], None).unwrap();

        fs::write(&path, "export const a = 2;").unwrap();
        touch(&path, 5);

        let second = indexer
            .index_project(&workspace, &first.indexed, None)
            .unwrap();

        assert_eq!(second.updated, 1);
        assert_eq!(second.added, 0);
        assert!(!Arc::ptr_eq(&first.indexed[0], &second.indexed[0]));
        assert_eq!(second.indexed[0].content, "export const a = 2;");
    }

    #[test]
    fn test_deleted_file_counts_removed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.ts"), "export const a = 1;").unwrap();
        fs::write(dir.path().join("b.ts"), "export const b = 2;").unwrap();

        let indexer = indexer();
        let workspace = OsWorkspace::new(dir.path());
        let first = indexer.index_project(&workspace, &[], None).unwrap();

        fs::remove_file(dir.path().join("b.ts")).unwrap();
        let second = indexer
            .index_project(&workspace, &first.indexed, None)
            .unwrap();

        assert_eq!(second.removed, 1);
        assert_eq!(second.indexed.len(), 1);
        assert_eq!(second.indexed[0].path, "a.ts");
    }

    #[test]
    fn test_progress_reports_every_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.ts"), "1").unwrap();
        fs::write(dir.path().join("b.ts"), "2").unwrap();
        fs::write(dir.path().join("c.ts"), "3").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_cb = Arc::clone(&calls);
        let progress: IndexProgressCallback = Box::new(move |current, total, _path| {
            assert!(current <= total);
            calls_cb.fetch_add(1, Ordering::Relaxed);
        });

        indexer()
            .index_project(&OsWorkspace::new(dir.path()), &[], Some(progress))
            .unwrap();

        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_content_is_capped() {
        let dir = TempDir::new().unwrap();
        let big = "x".repeat(MAX_CONTENT_BYTES + 500);
        fs::write(dir.path().join("big.ts"), &big).unwrap();

        let workspace = OsWorkspace::new(dir.path());
        let record = indexer()
            .index_single_file(&workspace, "big.ts", None)
            .unwrap();

        assert_eq!(record.content.len(), MAX_CONTENT_BYTES);
    }

    #[test]
    fn test_cap_respects_char_boundary() {
        let mut content = "a".repeat(MAX_CONTENT_BYTES - 1);
        content.push('é'); // two bytes, straddles the cap
        let capped = cap_content(content);
        assert_eq!(capped.len(), MAX_CONTENT_BYTES - 1);
        assert!(capped.chars().all(|c| c == 'a'));
    }

    #[test]
    fn test_single_file_reuses_unchanged() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.ts"), "export const a = 1;").unwrap();

        let indexer = indexer();
        let workspace = OsWorkspace::new(dir.path());
        let first = indexer.index_single_file(&workspace, "a.ts", None).unwrap();
        let second = indexer
            .index_single_file(&workspace, "a.ts", Some(&first))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }
}
