//! Owned service facade over the index, cache, and assembler
//!
//! One `IndexService` per process holds all mutable engine state; nothing
//! lives in globals. A single mutex around the index snapshot and the
//! assembler serializes re-index runs, so a second request issued while one
//! is in flight queues behind it instead of racing the previous-index
//! snapshot.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::cache::{CacheStats, CacheStore};
use crate::context::{ContextAssembler, ContextOptions, ContextQuality, SemanticStats};
use crate::embedding::EmbeddingService;
use crate::error::Result;
use crate::graph::CriticalFile;
use crate::indexer::{IncrementalIndexer, IndexProgressCallback};
use crate::schema::{ContextEntry, FileRecord};
use crate::workspace::Workspace;

/// Counters from one re-index run
#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub total: usize,
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub removed: usize,
    pub duration_ms: u64,
}

/// Combined service counters
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub indexed_files: usize,
    pub cache: CacheStats,
    pub semantic: SemanticStats,
}

/// Graph-level diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct GraphReport {
    pub nodes: usize,
    pub edges: usize,
    pub cycles: Vec<Vec<String>>,
    pub critical_files: Vec<CriticalFile>,
}

struct ServiceState {
    index: Vec<Arc<FileRecord>>,
    assembler: ContextAssembler,
}

/// Long-lived engine handle: cache, embeddings, indexer, assembler, and the
/// current index snapshot
pub struct IndexService {
    cache: Arc<CacheStore>,
    embeddings: Arc<EmbeddingService>,
    indexer: IncrementalIndexer,
    state: Mutex<ServiceState>,
}

impl IndexService {
    pub fn new(cache: Arc<CacheStore>, embeddings: Arc<EmbeddingService>) -> Self {
        let indexer = IncrementalIndexer::new(Arc::clone(&embeddings), Arc::clone(&cache));
        Self {
            cache,
            embeddings,
            indexer,
            state: Mutex::new(ServiceState {
                index: Vec::new(),
                assembler: ContextAssembler::new(),
            }),
        }
    }

    /// Service with no network embedding backend
    pub fn offline() -> Self {
        let cache = Arc::new(CacheStore::new());
        let embeddings = Arc::new(EmbeddingService::offline(Arc::clone(&cache)));
        Self::new(cache, embeddings)
    }

    /// Re-index the workspace against the current snapshot.
    ///
    /// Holds the state lock for the whole run, so concurrent calls queue.
    pub fn reindex(
        &self,
        workspace: &dyn Workspace,
        progress: Option<IndexProgressCallback>,
    ) -> Result<IndexSummary> {
        let mut state = self.state.lock();
        let outcome = self
            .indexer
            .index_project(workspace, &state.index, progress)?;

        let summary = IndexSummary {
            total: outcome.indexed.len(),
            added: outcome.added,
            updated: outcome.updated,
            skipped: outcome.skipped,
            removed: outcome.removed,
            duration_ms: outcome.duration_ms,
        };
        state.index = outcome.indexed;
        Ok(summary)
    }

    /// Embed the query text and assemble ranked context for it
    pub fn query(
        &self,
        query: &str,
        current_file: Option<&str>,
        options: &ContextOptions,
    ) -> Vec<ContextEntry> {
        let query_embedding = self.embeddings.embed(query);
        let mut state = self.state.lock();
        let index = state.index.clone();
        state
            .assembler
            .build_context(query, &query_embedding, &index, current_file, options)
    }

    /// Grade a previously assembled context
    pub fn evaluate_quality(&self, entries: &[ContextEntry]) -> ContextQuality {
        self.state.lock().assembler.evaluate_quality(entries)
    }

    /// Graph diagnostics over the current index
    pub fn graph_report(&self, critical_top_n: usize) -> GraphReport {
        let mut state = self.state.lock();
        let index = state.index.clone();
        state.assembler.refresh_graph(&index);

        match state.assembler.graph() {
            Some(graph) => GraphReport {
                nodes: graph.node_count(),
                edges: graph.edge_count(),
                cycles: graph.detect_cycles(),
                critical_files: graph.critical_files(critical_top_n),
            },
            None => GraphReport {
                nodes: 0,
                edges: 0,
                cycles: Vec::new(),
                critical_files: Vec::new(),
            },
        }
    }

    pub fn stats(&self) -> ServiceStats {
        let state = self.state.lock();
        ServiceStats {
            indexed_files: state.index.len(),
            cache: self.cache.stats(),
            semantic: state.assembler.semantic_stats(),
        }
    }

    pub fn indexed_files(&self) -> usize {
        self.state.lock().index.len()
    }

    pub fn track_file_edit(&self, path: &str) {
        self.state.lock().assembler.track_file_edit(path);
    }

    pub fn track_file_open(&self, path: &str) {
        self.state.lock().assembler.track_file_open(path);
    }

    pub fn track_file_close(&self, path: &str) {
        self.state.lock().assembler.track_file_close(path);
    }

    pub fn clear_history(&self) {
        self.state.lock().assembler.clear_history();
    }

    /// Persist the durable cache regions to disk
    pub fn save_cache(&self, path: &Path) -> Result<()> {
        self.cache.save(path)
    }

    /// Load persisted cache regions; corrupt payloads start cold
    pub fn load_cache(&self, path: &Path) -> Result<()> {
        self.cache.load(path)
    }
}
