//! ctx-engine: semantic code context engine
//!
//! Indexes a TypeScript/JavaScript project into an embedding-backed file
//! index plus a symbol-level dependency graph, then assembles ranked,
//! token-budgeted context for free-text queries.
//!
//! The pipeline: [`workspace`] enumerates indexable files, [`indexer`]
//! diffs them against the previous pass and embeds what changed through
//! [`embedding`], [`analyze`] extracts symbols and imports with
//! tree-sitter, [`graph`] wires the import edges, and [`context`] ranks
//! and budgets the final selection. [`service::IndexService`] owns all of
//! it behind one handle.
//!
//! # Example
//!
//! ```ignore
//! use ctx_engine::context::ContextOptions;
//! use ctx_engine::service::IndexService;
//! use ctx_engine::workspace::OsWorkspace;
//!
//! let service = IndexService::offline();
//! service.reindex(&OsWorkspace::new("path/to/project"), None)?;
//!
//! let entries = service.query("explain parseConfig", None, &ContextOptions::default());
//! for entry in entries {
//!     println!("{} ({:.2}): {}", entry.path, entry.score, entry.reason);
//! }
//! ```

pub mod analyze;
pub mod cache;
pub mod cli;
pub mod context;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod hash;
pub mod indexer;
pub mod lang;
pub mod schema;
pub mod service;
pub mod workspace;

// Re-export commonly used types
pub use analyze::analyze;
pub use cache::CacheStore;
pub use context::{ContextAssembler, ContextOptions};
pub use embedding::{cosine_similarity, EmbeddingBackend, EmbeddingService};
pub use error::{CtxError, Result};
pub use graph::DependencyGraph;
pub use indexer::{IncrementalIndexer, IndexOutcome};
pub use lang::Lang;
pub use schema::{
    ContextEntry, ExportInfo, FileAnalysis, FileMetadata, FileRecord, ImportInfo, Symbol,
    SymbolKind,
};
pub use service::IndexService;
pub use workspace::{OsWorkspace, Workspace};
