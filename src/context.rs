//! Query-time context assembly
//!
//! Builds a ranked, token-budgeted set of files to accompany a query.
//! Selection runs as a fixed sequence of stages, each skipping paths an
//! earlier stage already chose: symbol matches, the active file, embedding
//! similarity, dependency neighbors, recency and open-file signals, and
//! finally raw keyword matches. Entries are then sorted by score, cut to
//! the file limit, and squeezed into the token budget with symbol-aware
//! chunking.
//!
//! The assembler also owns the editor-state tracking (recent edits, open
//! files) and a throttled dependency-graph rebuild over the current index.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::{AHashMap, AHashSet};
use serde::Serialize;

use crate::analyze;
use crate::embedding::find_relevant_files;
use crate::graph::DependencyGraph;
use crate::schema::{ContextEntry, FileAnalysis, FileRecord, Symbol};

/// At most this many files are kept in the recency list
const RECENT_LIMIT: usize = 20;

/// Minimum interval between dependency graph rebuilds
const GRAPH_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

/// Chunked or truncated content below this size is dropped instead
const MIN_USEFUL_CHARS: usize = 500;

/// Marker appended when content had to be cut to fit the budget
const TRUNCATION_MARKER: &str = "\n\n[... truncated]";

/// Tuning knobs for [`ContextAssembler::build_context`]
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub max_files: usize,
    pub max_tokens: usize,
    pub include_recent: bool,
    pub include_dependencies: bool,
    pub prioritize_open: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            max_files: 10,
            max_tokens: 8000,
            include_recent: true,
            include_dependencies: true,
            prioritize_open: true,
        }
    }
}

/// Coverage grade attached to a quality report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Coverage {
    Excellent,
    Good,
    Fair,
    Poor,
    None,
}

/// Heuristic assessment of an assembled context
#[derive(Debug, Clone, Serialize)]
pub struct ContextQuality {
    pub score: f32,
    pub coverage: Coverage,
    pub suggestions: Vec<String>,
}

/// Counters over the assembler's analysis cache and graph
#[derive(Debug, Clone, Serialize)]
pub struct SemanticStats {
    pub cached_files: usize,
    pub total_symbols: usize,
    pub graph_nodes: usize,
    pub graph_edges: usize,
}

/// Stateful context builder
pub struct ContextAssembler {
    recent_files: Vec<String>,
    open_files: AHashSet<String>,
    /// path -> last edit timestamp (ms)
    edit_history: AHashMap<String, u64>,

    /// Per-path analysis cache, invalidated on edit
    analyses: AHashMap<String, FileAnalysis>,
    graph: Option<DependencyGraph>,
    last_graph_update: Option<Instant>,
    graph_update_interval: Duration,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextAssembler {
    pub fn new() -> Self {
        Self {
            recent_files: Vec::new(),
            open_files: AHashSet::new(),
            edit_history: AHashMap::new(),
            analyses: AHashMap::new(),
            graph: None,
            last_graph_update: None,
            graph_update_interval: GRAPH_UPDATE_INTERVAL,
        }
    }

    /// Override the graph rebuild throttle, mainly for tests
    pub fn with_graph_interval(mut self, interval: Duration) -> Self {
        self.graph_update_interval = interval;
        self
    }

    /// Assemble ranked context for `query` against the indexed files.
    ///
    /// Never fails: per-file analysis faults are skipped and the remaining
    /// stages still run.
    pub fn build_context(
        &mut self,
        query: &str,
        query_embedding: &[f32],
        all_files: &[Arc<FileRecord>],
        current_file: Option<&str>,
        options: &ContextOptions,
    ) -> Vec<ContextEntry> {
        self.refresh_graph(all_files);

        let mut entries: Vec<ContextEntry> = Vec::new();
        let mut selected: AHashSet<String> = AHashSet::new();
        let push = |entry: ContextEntry, entries: &mut Vec<ContextEntry>, selected: &mut AHashSet<String>| {
            if selected.insert(entry.path.clone()) {
                entries.push(entry);
            }
        };

        // Symbol matches carry the most signal
        for entry in self.find_symbol_entries(query) {
            push(entry, &mut entries, &mut selected);
        }

        // Active file
        if let Some(current) = current_file {
            if let Some(file) = all_files.iter().find(|f| f.path == current) {
                let symbols = self
                    .analyses
                    .get(current)
                    .map(|a| a.symbols.iter().map(|s| s.name.clone()).collect());
                push(
                    ContextEntry {
                        path: file.path.clone(),
                        content: file.content.clone(),
                        score: 1.0,
                        reason: "Active file".to_string(),
                        relevant_symbols: symbols,
                    },
                    &mut entries,
                    &mut selected,
                );
            }
        }

        // Embedding similarity
        for (file, score) in find_relevant_files(query_embedding, all_files, 5) {
            if selected.contains(&file.path) {
                continue;
            }
            push(
                ContextEntry {
                    path: file.path.clone(),
                    content: file.content.clone(),
                    score,
                    reason: format!("Semantic match ({:.0}%)", score * 100.0),
                    relevant_symbols: None,
                },
                &mut entries,
                &mut selected,
            );
        }

        // Dependency neighbors of the active file
        if options.include_dependencies {
            if let Some(current) = current_file {
                for entry in self.dependency_entries(current, all_files, &selected) {
                    push(entry, &mut entries, &mut selected);
                }
            }
        }

        // Recently edited
        if options.include_recent {
            let recent: Vec<String> = self
                .recently_edited(3)
                .into_iter()
                .filter(|p| !selected.contains(p))
                .collect();
            for path in recent {
                if let Some(file) = all_files.iter().find(|f| f.path == path) {
                    push(
                        ContextEntry {
                            path: file.path.clone(),
                            content: file.content.clone(),
                            score: 0.7,
                            reason: "Recently edited".to_string(),
                            relevant_symbols: None,
                        },
                        &mut entries,
                        &mut selected,
                    );
                }
            }
        }

        // Open files
        if options.prioritize_open {
            let mut open: Vec<&String> = self
                .open_files
                .iter()
                .filter(|p| !selected.contains(p.as_str()))
                .collect();
            open.sort();
            let open: Vec<String> = open.into_iter().take(2).cloned().collect();
            for path in open {
                if let Some(file) = all_files.iter().find(|f| f.path == path) {
                    push(
                        ContextEntry {
                            path: file.path.clone(),
                            content: file.content.clone(),
                            score: 0.75,
                            reason: "Open file".to_string(),
                            relevant_symbols: None,
                        },
                        &mut entries,
                        &mut selected,
                    );
                }
            }
        }

        // Keyword matches on path or content
        let keyword: Vec<Arc<FileRecord>> = keyword_matches(query, all_files)
            .into_iter()
            .filter(|f| !selected.contains(&f.path))
            .take(2)
            .collect();
        for file in keyword {
            push(
                ContextEntry {
                    path: file.path.clone(),
                    content: file.content.clone(),
                    score: 0.85,
                    reason: "Keyword match".to_string(),
                    relevant_symbols: None,
                },
                &mut entries,
                &mut selected,
            );
        }

        entries.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.path.cmp(&b.path))
        });
        entries.truncate(options.max_files);

        apply_token_budget(entries, options.max_tokens)
    }

    /// Rebuild the dependency graph if the throttle interval has elapsed.
    /// Callers that need graph data outside of `build_context` (cycle
    /// reports, critical-file lists) invoke this directly.
    pub fn refresh_graph(&mut self, all_files: &[Arc<FileRecord>]) {
        if let (Some(_), Some(last)) = (&self.graph, self.last_graph_update) {
            if last.elapsed() < self.graph_update_interval {
                return;
            }
        }

        for file in all_files {
            if self.analyses.contains_key(&file.path) {
                continue;
            }
            match analyze::analyze(std::path::Path::new(&file.path), &file.content) {
                Ok(analysis) => {
                    self.analyses.insert(file.path.clone(), analysis);
                }
                Err(e) => {
                    tracing::debug!("Analysis skipped for {}: {}", file.path, e);
                }
            }
        }

        if self.analyses.is_empty() {
            return;
        }

        let analyses: Vec<FileAnalysis> = self.analyses.values().cloned().collect();
        let graph = DependencyGraph::build(analyses);

        // Copy the graph's dependent fill back into the analysis cache
        for node in graph.nodes() {
            if let Some(analysis) = self.analyses.get_mut(&node.file_path) {
                analysis.dependents = node.dependents.clone();
            }
        }

        self.graph = Some(graph);
        self.last_graph_update = Some(Instant::now());
    }

    /// Stage 1: symbol-name matches and their related symbols
    fn find_symbol_entries(&self, query: &str) -> Vec<ContextEntry> {
        let Some(graph) = &self.graph else {
            return Vec::new();
        };

        let symbols = find_symbols(query, graph, 5);
        let mut entries = Vec::new();

        for symbol in &symbols {
            let related = related_symbols(&symbol.name, graph);

            if let Some(analysis) = self.analyses.get(&symbol.file_path) {
                entries.push(ContextEntry {
                    path: symbol.file_path.clone(),
                    content: symbol_summary(analysis, Some(symbol), &related),
                    score: 0.95,
                    reason: format!("Symbol: {}", symbol.name),
                    relevant_symbols: Some(related.iter().map(|s| s.name.clone()).collect()),
                });
            }

            let mut related_paths: Vec<&str> = related
                .iter()
                .map(|s| s.file_path.as_str())
                .filter(|p| *p != symbol.file_path)
                .collect();
            related_paths.sort();
            related_paths.dedup();

            for path in related_paths {
                let Some(analysis) = self.analyses.get(path) else {
                    continue;
                };
                let file_symbols: Vec<Symbol> = analysis
                    .symbols
                    .iter()
                    .filter(|s| related.iter().any(|r| r.name == s.name))
                    .cloned()
                    .collect();
                entries.push(ContextEntry {
                    path: path.to_string(),
                    content: symbol_summary(analysis, None, &file_symbols),
                    score: 0.85,
                    reason: format!("Related to {}", symbol.name),
                    relevant_symbols: Some(file_symbols.iter().map(|s| s.name.clone()).collect()),
                });
            }
        }

        entries
    }

    /// Stage 4: direct dependencies and up to two dependents of `current`
    fn dependency_entries(
        &self,
        current: &str,
        all_files: &[Arc<FileRecord>],
        selected: &AHashSet<String>,
    ) -> Vec<ContextEntry> {
        let Some(analysis) = self.analyses.get(current) else {
            return Vec::new();
        };

        let mut entries = Vec::new();

        for dep in &analysis.dependencies {
            if selected.contains(dep) {
                continue;
            }
            // Resolved imports carry no extension, so match loosely
            let found = all_files
                .iter()
                .find(|f| f.path == *dep || f.path.contains(dep.as_str()));
            if let Some(file) = found {
                if selected.contains(&file.path) || entries.iter().any(|e: &ContextEntry| e.path == file.path) {
                    continue;
                }
                let symbols = self
                    .analyses
                    .get(&file.path)
                    .map(|a| a.symbols.iter().map(|s| s.name.clone()).collect());
                entries.push(ContextEntry {
                    path: file.path.clone(),
                    content: file.content.clone(),
                    score: 0.85,
                    reason: "Dependency".to_string(),
                    relevant_symbols: symbols,
                });
            }
        }

        for dependent in analysis.dependents.iter().take(2) {
            if selected.contains(dependent) || entries.iter().any(|e| e.path == *dependent) {
                continue;
            }
            if let Some(file) = all_files.iter().find(|f| f.path == *dependent) {
                let symbols = self
                    .analyses
                    .get(&file.path)
                    .map(|a| a.symbols.iter().map(|s| s.name.clone()).collect());
                entries.push(ContextEntry {
                    path: file.path.clone(),
                    content: file.content.clone(),
                    score: 0.75,
                    reason: "Dependent".to_string(),
                    relevant_symbols: symbols,
                });
            }
        }

        entries
    }

    fn recently_edited(&self, count: usize) -> Vec<String> {
        let mut history: Vec<(&String, &u64)> = self.edit_history.iter().collect();
        history.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        history.into_iter().take(count).map(|(p, _)| p.clone()).collect()
    }

    // ----- editor state tracking -----

    pub fn track_file_edit(&mut self, path: &str) {
        self.edit_history.insert(path.to_string(), crate::cache::now_ms());
        self.analyses.remove(path);
        self.add_to_recent(path);
    }

    pub fn track_file_open(&mut self, path: &str) {
        self.open_files.insert(path.to_string());
        self.add_to_recent(path);
    }

    pub fn track_file_close(&mut self, path: &str) {
        self.open_files.remove(path);
    }

    fn add_to_recent(&mut self, path: &str) {
        self.recent_files.retain(|p| p != path);
        self.recent_files.insert(0, path.to_string());
        self.recent_files.truncate(RECENT_LIMIT);
    }

    pub fn recent_files(&self) -> &[String] {
        &self.recent_files
    }

    pub fn open_files(&self) -> Vec<String> {
        let mut open: Vec<String> = self.open_files.iter().cloned().collect();
        open.sort();
        open
    }

    pub fn clear_history(&mut self) {
        self.recent_files.clear();
        self.open_files.clear();
        self.edit_history.clear();
    }

    pub fn clear_analysis_cache(&mut self) {
        self.analyses.clear();
        self.graph = None;
        self.last_graph_update = None;
    }

    pub fn graph(&self) -> Option<&DependencyGraph> {
        self.graph.as_ref()
    }

    pub fn semantic_stats(&self) -> SemanticStats {
        SemanticStats {
            cached_files: self.analyses.len(),
            total_symbols: self.analyses.values().map(|a| a.symbols.len()).sum(),
            graph_nodes: self.graph.as_ref().map(|g| g.node_count()).unwrap_or(0),
            graph_edges: self.graph.as_ref().map(|g| g.edge_count()).unwrap_or(0),
        }
    }

    /// Grade an assembled context: file count, mean score, reason diversity,
    /// and a bonus when symbol data made it in
    pub fn evaluate_quality(&self, entries: &[ContextEntry]) -> ContextQuality {
        let mut suggestions = Vec::new();

        if entries.is_empty() {
            suggestions.push("Empty context, index more files or broaden the query".to_string());
            return ContextQuality {
                score: 0.0,
                coverage: Coverage::None,
                suggestions,
            };
        }

        let mut score = (entries.len() as f32 * 10.0).min(50.0);

        let avg: f32 = entries.iter().map(|e| e.score).sum::<f32>() / entries.len() as f32;
        score += avg * 30.0;

        let reasons: AHashSet<&str> = entries.iter().map(|e| e.reason.as_str()).collect();
        score += reasons.len() as f32 * 5.0;

        let has_symbol_data = entries
            .iter()
            .any(|e| e.relevant_symbols.as_ref().is_some_and(|s| !s.is_empty()));
        if has_symbol_data {
            score += 10.0;
        }

        if avg < 0.5 {
            suggestions.push("Low relevance, make the query more specific".to_string());
        }
        if entries.len() < 3 {
            suggestions.push("Few files selected, consider widening the query".to_string());
        }
        if reasons.len() == 1 {
            suggestions.push("Single selection signal, results may be one-sided".to_string());
        }
        if !has_symbol_data {
            suggestions.push("No symbol data, only text-level ranking was available".to_string());
        }

        let coverage = if score > 80.0 {
            Coverage::Excellent
        } else if score > 60.0 {
            Coverage::Good
        } else if score > 40.0 {
            Coverage::Fair
        } else {
            Coverage::Poor
        };

        ContextQuality {
            score,
            coverage,
            suggestions,
        }
    }
}

/// Estimated token count of a string, roughly 4 chars per token
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Symbols whose name matches the query, either as a substring of the query
/// or containing the whole query. Deterministic order by file path.
fn find_symbols<'a>(query: &str, graph: &'a DependencyGraph, limit: usize) -> Vec<&'a Symbol> {
    let lower = query.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() >= 3)
        .collect();

    let mut nodes: Vec<&FileAnalysis> = graph.nodes().collect();
    nodes.sort_by(|a, b| a.file_path.cmp(&b.file_path));

    let mut results = Vec::new();
    for node in nodes {
        for symbol in &node.symbols {
            let name = symbol.name.to_lowercase();
            if name.contains(&lower) || tokens.iter().any(|t| name.contains(t)) {
                results.push(symbol);
                if results.len() >= limit {
                    return results;
                }
            }
        }
    }
    results
}

/// Symbols called by `name` plus symbols that call it
fn related_symbols(name: &str, graph: &DependencyGraph) -> Vec<Symbol> {
    let mut nodes: Vec<&FileAnalysis> = graph.nodes().collect();
    nodes.sort_by(|a, b| a.file_path.cmp(&b.file_path));

    let target = nodes
        .iter()
        .flat_map(|n| n.symbols.iter())
        .find(|s| s.name == name);
    let Some(target) = target else {
        return Vec::new();
    };

    let mut related = Vec::new();

    for dep in &target.dependencies {
        for node in &nodes {
            for symbol in &node.symbols {
                if symbol.name == *dep {
                    related.push(symbol.clone());
                }
            }
        }
    }

    for node in &nodes {
        for symbol in &node.symbols {
            if symbol.dependencies.iter().any(|d| d == name) {
                related.push(symbol.clone());
            }
        }
    }

    related
}

/// Compact summary of a file built around a target symbol
fn symbol_summary(
    analysis: &FileAnalysis,
    target: Option<&Symbol>,
    related: &[Symbol],
) -> String {
    let mut out = format!("// File: {}\n", analysis.file_path);
    out.push_str(&format!(
        "// Symbols: {}, Complexity: {}\n\n",
        analysis.symbols.len(),
        analysis.complexity
    ));

    if !analysis.imports.is_empty() {
        out.push_str("// Imports:\n");
        for import in &analysis.imports {
            out.push_str(&format!(
                "// - {}: {}\n",
                import.module_name,
                import.imported_symbols.join(", ")
            ));
        }
        out.push('\n');
    }

    if let Some(symbol) = target {
        out.push_str(&format!("// Target symbol: {}\n", symbol.name));
        if let Some(doc) = &symbol.documentation {
            out.push_str(&format!("// {}\n", doc));
        }
        out.push_str(&symbol.signature);
        out.push_str("\n\n");
    }

    if !related.is_empty() {
        out.push_str("// Related symbols:\n");
        for symbol in related {
            out.push_str(&format!("// - {} ({})\n", symbol.name, symbol.kind));
            if !symbol.signature.is_empty() {
                out.push_str(&symbol.signature);
                out.push_str("\n\n");
            }
        }
    }

    if !analysis.dependencies.is_empty() {
        out.push_str(&format!(
            "// Dependencies: {}\n",
            analysis.dependencies.join(", ")
        ));
    }
    if !analysis.dependents.is_empty() {
        out.push_str(&format!("// Used by: {}\n", analysis.dependents.join(", ")));
    }

    out
}

/// Files ranked by keyword hits, filename hits weighted over content hits
fn keyword_matches(query: &str, files: &[Arc<FileRecord>]) -> Vec<Arc<FileRecord>> {
    let keywords: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(|s| s.to_string())
        .collect();

    let mut scored: Vec<(Arc<FileRecord>, usize)> = Vec::new();
    for file in files {
        let name = file.path.to_lowercase();
        let content = file.content.to_lowercase();

        let mut hits = 0usize;
        for keyword in &keywords {
            if name.contains(keyword.as_str()) {
                hits += 3;
            }
            if content.contains(keyword.as_str()) {
                hits += 1;
            }
        }
        if hits > 0 {
            scored.push((Arc::clone(file), hits));
        }
    }

    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.path.cmp(&b.0.path)));
    scored.into_iter().map(|(f, _)| f).collect()
}

/// Enforce the token budget over score-sorted entries.
///
/// Once an entry would overflow the budget, try symbol-aware chunking, then
/// raw truncation; either way that boundary entry is the last one kept.
fn apply_token_budget(entries: Vec<ContextEntry>, max_tokens: usize) -> Vec<ContextEntry> {
    let mut total = 0usize;
    let mut result = Vec::new();

    for mut entry in entries {
        let tokens = estimate_tokens(&entry.content);

        if total + tokens > max_tokens {
            let remaining = max_tokens.saturating_sub(total);

            let chunked = entry
                .relevant_symbols
                .as_ref()
                .filter(|symbols| !symbols.is_empty())
                .map(|symbols| smart_chunk(&entry.content, symbols, remaining * 4));

            match chunked {
                Some(content) if content.len() > MIN_USEFUL_CHARS => {
                    total += estimate_tokens(&content);
                    entry.content = content;
                    entry.reason.push_str(" (chunked)");
                    result.push(entry);
                }
                _ => {
                    let remaining_chars = remaining * 4;
                    if remaining_chars > MIN_USEFUL_CHARS {
                        let mut cut = remaining_chars.min(entry.content.len());
                        while !entry.content.is_char_boundary(cut) {
                            cut -= 1;
                        }
                        entry.content.truncate(cut);
                        entry.content.push_str(TRUNCATION_MARKER);
                        result.push(entry);
                    }
                }
            }
            break;
        }

        total += tokens;
        result.push(entry);
    }

    result
}

/// Extract only the source blocks declaring the given symbols.
///
/// Blocks are found by scanning for declaration keywords and balancing
/// braces from there; two lines of leading context are kept for any doc
/// comment. Falls back to a plain prefix when nothing matches.
fn smart_chunk(content: &str, symbol_names: &[String], max_chars: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let mut out = String::new();

    for name in symbol_names {
        let needles = [
            format!("function {}", name),
            format!("class {}", name),
            format!("interface {}", name),
            format!("const {}", name),
            format!("export {}", name),
        ];

        let mut start = None;
        let mut end = None;
        let mut depth: i32 = 0;
        let mut inside = false;

        for (i, line) in lines.iter().enumerate() {
            if !inside && needles.iter().any(|n| line.contains(n.as_str())) {
                start = Some(i.saturating_sub(2));
                inside = true;
            }
            if inside {
                depth += line.matches('{').count() as i32;
                depth -= line.matches('}').count() as i32;
                if depth == 0 && line.contains('}') {
                    end = Some(i);
                    break;
                }
            }
        }

        if let (Some(start), Some(end)) = (start, end) {
            let block = lines[start..=end].join("\n");
            if out.len() + block.len() < max_chars {
                out.push_str(&block);
                out.push_str("\n\n");
            }
        }
    }

    if out.is_empty() {
        let mut cut = max_chars.min(content.len());
        while !content.is_char_boundary(cut) {
            cut -= 1;
        }
        out.push_str(&content[..cut]);
    }

    out.push_str(TRUNCATION_MARKER);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, content: &str, embedding: Vec<f32>) -> Arc<FileRecord> {
        Arc::new(FileRecord {
            path: path.to_string(),
            content: content.to_string(),
            embedding,
            last_modified: 0,
        })
    }

    fn fixture_files() -> Vec<Arc<FileRecord>> {
        vec![
            record(
                "src/util.ts",
                "/** Formats things. */\nexport function foo(x: string): string {\n  return x.trim();\n}\n",
                vec![1.0, 0.0, 0.0],
            ),
            record(
                "src/app.ts",
                "import { foo } from './util';\nexport function run() {\n  return foo('hi');\n}\n",
                vec![0.0, 1.0, 0.0],
            ),
            record(
                "src/other.ts",
                "export const unrelated = 42;\n",
                vec![0.0, 0.0, 1.0],
            ),
        ]
    }

    #[test]
    fn test_symbol_match_ranks_first() {
        let mut assembler = ContextAssembler::new();
        let files = fixture_files();

        let entries = assembler.build_context(
            "explain foo",
            &[0.0, 0.0, 0.0],
            &files,
            None,
            &ContextOptions::default(),
        );

        assert!(!entries.is_empty());
        assert_eq!(entries[0].path, "src/util.ts");
        assert!(entries[0].score >= 0.85);
        assert!(entries[0].reason.starts_with("Symbol:"));
    }

    #[test]
    fn test_active_file_outranks_symbols() {
        let mut assembler = ContextAssembler::new();
        let files = fixture_files();

        let entries = assembler.build_context(
            "explain foo",
            &[0.0, 0.0, 0.0],
            &files,
            Some("src/other.ts"),
            &ContextOptions::default(),
        );

        assert_eq!(entries[0].path, "src/other.ts");
        assert_eq!(entries[0].score, 1.0);
        assert_eq!(entries[0].reason, "Active file");
    }

    #[test]
    fn test_max_files_respected() {
        let mut assembler = ContextAssembler::new();
        let files = fixture_files();

        let options = ContextOptions {
            max_files: 1,
            ..ContextOptions::default()
        };
        let entries = assembler.build_context("explain foo", &[0.0; 3], &files, None, &options);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_token_budget_bounds_output() {
        let big = "x".repeat(4000);
        let entries = vec![
            ContextEntry {
                path: "a.ts".into(),
                content: big.clone(),
                score: 0.9,
                reason: "Keyword match".into(),
                relevant_symbols: None,
            },
            ContextEntry {
                path: "b.ts".into(),
                content: big,
                score: 0.8,
                reason: "Keyword match".into(),
                relevant_symbols: None,
            },
        ];

        // 1000 tokens each; budget admits the first and truncates the second
        let result = apply_token_budget(entries, 1500);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].content.len(), 4000);
        assert!(result[1].content.ends_with(TRUNCATION_MARKER));
        let total: usize = result
            .iter()
            .map(|e| estimate_tokens(&e.content))
            .sum();
        // One boundary entry may overshoot by its marker only
        assert!(total <= 1500 + estimate_tokens(TRUNCATION_MARKER));
    }

    #[test]
    fn test_token_budget_drops_tiny_remainder() {
        let entries = vec![
            ContextEntry {
                path: "a.ts".into(),
                content: "x".repeat(4000),
                score: 0.9,
                reason: "Keyword match".into(),
                relevant_symbols: None,
            },
            ContextEntry {
                path: "b.ts".into(),
                content: "y".repeat(4000),
                score: 0.8,
                reason: "Keyword match".into(),
                relevant_symbols: None,
            },
        ];

        // 1000 tokens fit; 50 remaining tokens = 200 chars, below the floor
        let result = apply_token_budget(entries, 1050);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_smart_chunk_extracts_symbol_block() {
        let content = "\
import { a } from './a';

/** Adds numbers. */
export function add(x: number, y: number): number {
  return x + y;
}

export function noise() {
  return 0;
}
";
        let chunk = smart_chunk(content, &["add".to_string()], 10_000);
        assert!(chunk.contains("function add"));
        assert!(chunk.contains("Adds numbers"));
        assert!(!chunk.contains("function noise"));
    }

    #[test]
    fn test_smart_chunk_ends_at_closing_brace() {
        // The next declaration starts directly after the closing brace
        let content = "\
export function add(x: number, y: number): number {
  return x + y;
}
export function noise() {
  return 0;
}
";
        let chunk = smart_chunk(content, &["add".to_string()], 10_000);
        assert!(chunk.contains("function add"));
        assert!(!chunk.contains("function noise"));
    }

    #[test]
    fn test_recent_list_capped_and_ordered() {
        let mut assembler = ContextAssembler::new();
        for i in 0..25 {
            assembler.track_file_edit(&format!("f{}.ts", i));
        }
        assert_eq!(assembler.recent_files().len(), RECENT_LIMIT);
        assert_eq!(assembler.recent_files()[0], "f24.ts");
    }

    #[test]
    fn test_open_close_tracking() {
        let mut assembler = ContextAssembler::new();
        assembler.track_file_open("a.ts");
        assembler.track_file_open("b.ts");
        assembler.track_file_close("a.ts");
        assert_eq!(assembler.open_files(), vec!["b.ts".to_string()]);
    }

    #[test]
    fn test_clear_history() {
        let mut assembler = ContextAssembler::new();
        assembler.track_file_edit("a.ts");
        assembler.track_file_open("b.ts");
        assembler.clear_history();
        assert!(assembler.recent_files().is_empty());
        assert!(assembler.open_files().is_empty());
    }

    #[test]
    fn test_evaluate_quality_empty() {
        let assembler = ContextAssembler::new();
        let quality = assembler.evaluate_quality(&[]);
        assert_eq!(quality.score, 0.0);
        assert_eq!(quality.coverage, Coverage::None);
        assert!(!quality.suggestions.is_empty());
    }

    #[test]
    fn test_evaluate_quality_scores_diversity() {
        let assembler = ContextAssembler::new();
        let entries = vec![
            ContextEntry {
                path: "a.ts".into(),
                content: String::new(),
                score: 0.95,
                reason: "Symbol: foo".into(),
                relevant_symbols: Some(vec!["foo".into()]),
            },
            ContextEntry {
                path: "b.ts".into(),
                content: String::new(),
                score: 0.85,
                reason: "Dependency".into(),
                relevant_symbols: None,
            },
            ContextEntry {
                path: "c.ts".into(),
                content: String::new(),
                score: 0.7,
                reason: "Recently edited".into(),
                relevant_symbols: None,
            },
        ];
        let quality = assembler.evaluate_quality(&entries);
        assert!(quality.score > 60.0);
        assert!(matches!(quality.coverage, Coverage::Good | Coverage::Excellent));
    }

    #[test]
    fn test_keyword_matches_weight_filename() {
        let files = vec![
            record("src/config.ts", "const x = 1;", vec![0.0]),
            record("src/misc.ts", "loads the config file", vec![0.0]),
        ];
        let matches = keyword_matches("config", &files);
        assert_eq!(matches[0].path, "src/config.ts");
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
