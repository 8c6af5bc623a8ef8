//! ctx-engine CLI entry point

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use ctx_engine::cache::{get_cache_base_dir, CacheStore};
use ctx_engine::cli::{Cli, Commands, GraphArgs, IndexArgs, QueryArgs, StatsArgs};
use ctx_engine::context::ContextOptions;
use ctx_engine::embedding::{EmbeddingBackend, EmbeddingService, HashingEmbedder, HttpEmbedder, EMBEDDING_DIM};
use ctx_engine::indexer::IndexProgressCallback;
use ctx_engine::service::IndexService;
use ctx_engine::workspace::OsWorkspace;
use ctx_engine::{CtxError, Result};

fn main() -> ExitCode {
    match run() {
        Ok(output) => {
            print!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn run() -> Result<String> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Index(args) => run_index(&cli, args),
        Commands::Query(args) => run_query(&cli, args),
        Commands::Graph(args) => run_graph(&cli, args),
        Commands::Stats(args) => run_stats(&cli, args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "ctx_engine=debug" } else { "ctx_engine=info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Build the engine service.
///
/// With `CTX_ENGINE_EMBED_URL` set, the primary backend is that HTTP
/// endpoint (model from `CTX_ENGINE_EMBED_MODEL`) and the hashing embedder
/// is the fallback; otherwise the service runs fully offline.
fn build_service() -> IndexService {
    let cache = Arc::new(CacheStore::new());

    let embeddings = match std::env::var("CTX_ENGINE_EMBED_URL") {
        Ok(url) => {
            let model = std::env::var("CTX_ENGINE_EMBED_MODEL")
                .unwrap_or_else(|_| "bge-small-en-v1.5".to_string());
            let primary: Arc<dyn EmbeddingBackend> =
                Arc::new(HttpEmbedder::new(url, model, EMBEDDING_DIM));
            let fallback: Arc<dyn EmbeddingBackend> = Arc::new(HashingEmbedder::default());
            Arc::new(EmbeddingService::new(primary, fallback, Arc::clone(&cache)))
        }
        Err(_) => Arc::new(EmbeddingService::offline(Arc::clone(&cache))),
    };

    IndexService::new(cache, embeddings)
}

fn cache_file_for(project: &Path) -> PathBuf {
    let key = ctx_engine::hash::content_hash(&project.display().to_string());
    get_cache_base_dir().join(format!("{}.json", key))
}

/// Index the project, restoring and persisting the embedding cache around
/// the run
fn index_project(service: &IndexService, path: &Path, progress: bool) -> Result<ctx_engine::service::IndexSummary> {
    let cache_file = cache_file_for(path);
    if let Err(e) = service.load_cache(&cache_file) {
        tracing::warn!("Starting with a cold cache: {}", e);
    }

    let workspace = OsWorkspace::new(path);
    let callback: Option<IndexProgressCallback> = if progress {
        Some(Box::new(|current, total, file| {
            eprintln!("[{}/{}] {}", current, total, file);
        }))
    } else {
        None
    };

    let summary = service.reindex(&workspace, callback)?;

    if let Err(e) = service.save_cache(&cache_file) {
        tracing::warn!("Cache not persisted: {}", e);
    }
    Ok(summary)
}

fn run_index(cli: &Cli, args: &IndexArgs) -> Result<String> {
    let service = build_service();
    let summary = index_project(&service, &args.path, args.progress)?;

    if cli.json {
        return to_json(&summary);
    }

    Ok(format!(
        "Indexed {} files in {}ms ({} added, {} updated, {} skipped, {} removed)\n",
        summary.total,
        summary.duration_ms,
        summary.added,
        summary.updated,
        summary.skipped,
        summary.removed
    ))
}

fn run_query(cli: &Cli, args: &QueryArgs) -> Result<String> {
    let service = build_service();
    index_project(&service, &args.path, false)?;

    let options = ContextOptions {
        max_files: args.max_files,
        max_tokens: args.max_tokens,
        ..ContextOptions::default()
    };
    let entries = service.query(&args.query, args.current_file.as_deref(), &options);

    if cli.json {
        if args.quality {
            let quality = service.evaluate_quality(&entries);
            return to_json(&serde_json::json!({
                "entries": entries,
                "quality": quality,
            }));
        }
        return to_json(&entries);
    }

    let mut out = String::new();
    if entries.is_empty() {
        out.push_str("No relevant files found.\n");
        return Ok(out);
    }

    for (i, entry) in entries.iter().enumerate() {
        out.push_str(&format!(
            "{}. {} (score {:.2}, {})\n",
            i + 1,
            entry.path,
            entry.score,
            entry.reason
        ));
    }
    out.push('\n');
    for entry in &entries {
        out.push_str(&format!("=== {} ===\n{}\n\n", entry.path, entry.content));
    }

    if args.quality {
        let quality = service.evaluate_quality(&entries);
        out.push_str(&format!(
            "Quality: {:.0} ({:?})\n",
            quality.score, quality.coverage
        ));
        for suggestion in &quality.suggestions {
            out.push_str(&format!("  - {}\n", suggestion));
        }
    }

    Ok(out)
}

fn run_graph(cli: &Cli, args: &GraphArgs) -> Result<String> {
    let service = build_service();
    index_project(&service, &args.path, false)?;

    let report = service.graph_report(args.critical);

    if cli.json {
        return to_json(&report);
    }

    let mut out = format!("Graph: {} files, {} edges\n", report.nodes, report.edges);

    if args.cycles {
        if report.cycles.is_empty() {
            out.push_str("No import cycles.\n");
        } else {
            out.push_str(&format!("{} import cycle(s):\n", report.cycles.len()));
            for cycle in &report.cycles {
                out.push_str(&format!("  {}\n", cycle.join(" -> ")));
            }
        }
    }

    if !report.critical_files.is_empty() {
        out.push_str("Most depended-upon files:\n");
        for file in &report.critical_files {
            out.push_str(&format!("  {} ({} dependents)\n", file.path, file.score));
        }
    }

    Ok(out)
}

fn run_stats(cli: &Cli, args: &StatsArgs) -> Result<String> {
    let service = build_service();
    index_project(&service, &args.path, false)?;

    // Build the graph so semantic counters are populated
    service.graph_report(0);
    let stats = service.stats();

    if cli.json {
        return to_json(&stats);
    }

    Ok(format!(
        "Files indexed:     {}\n\
         Symbols:           {}\n\
         Graph:             {} nodes, {} edges\n\
         Cache:             {} embeddings, {} metadata, {} generic ({} hits / {} misses)\n",
        stats.indexed_files,
        stats.semantic.total_symbols,
        stats.semantic.graph_nodes,
        stats.semantic.graph_edges,
        stats.cache.embedding_entries,
        stats.cache.metadata_entries,
        stats.cache.size,
        stats.cache.hits,
        stats.cache.misses
    ))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map(|s| format!("{}\n", s))
        .map_err(|e| CtxError::ExtractionFailure {
            message: format!("JSON serialization failed: {}", e),
        })
}
