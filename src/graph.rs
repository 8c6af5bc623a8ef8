//! Project-wide dependency graph
//!
//! Edges point from the imported file to its importers, so "who depends on
//! me" is an O(1) lookup. For every edge recorded because A imports B,
//! `B.dependents` contains A and `edges[B]` contains A.
//!
//! Path matching is heuristic: an exact node-path match is tried first,
//! then a partial (substring) match in either direction. The fallback can
//! produce false-positive edges; that looseness is intentional because
//! resolved relative imports carry no extension and are never checked
//! against the filesystem.

use ahash::{AHashMap, AHashSet};
use serde::Serialize;

use crate::schema::FileAnalysis;

/// How two files relate through the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Relationship {
    DependsOn,
    DependedBy,
    Related,
    Unrelated,
}

/// A file path with its impact score
#[derive(Debug, Clone, Serialize)]
pub struct CriticalFile {
    pub path: String,
    pub score: usize,
}

/// Directed file dependency graph
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: AHashMap<String, FileAnalysis>,
    /// imported path -> set of importer paths
    edges: AHashMap<String, AHashSet<String>>,
}

impl DependencyGraph {
    /// Build the graph from per-file analyses.
    ///
    /// Registers every analysis as a node, then wires edges for each
    /// resolved dependency that matches another node, filling in
    /// `dependents` on the target as it goes.
    pub fn build(analyses: Vec<FileAnalysis>) -> Self {
        let mut nodes: AHashMap<String, FileAnalysis> = AHashMap::new();
        let mut edges: AHashMap<String, AHashSet<String>> = AHashMap::new();

        for mut analysis in analyses {
            analysis.dependents.clear();
            edges.entry(analysis.file_path.clone()).or_default();
            nodes.insert(analysis.file_path.clone(), analysis);
        }

        let paths: Vec<String> = nodes.keys().cloned().collect();
        let mut links: Vec<(String, String)> = Vec::new(); // (importer, imported)

        for (importer, analysis) in &nodes {
            for dep in &analysis.dependencies {
                if let Some(target) = match_node_path(&paths, dep) {
                    if target != *importer {
                        links.push((importer.clone(), target));
                    }
                }
            }
        }

        for (importer, imported) in links {
            let inserted = edges.entry(imported.clone()).or_default().insert(importer.clone());
            if inserted {
                if let Some(target) = nodes.get_mut(&imported) {
                    target.dependents.push(importer);
                }
            }
        }

        let edge_count: usize = edges.values().map(|s| s.len()).sum();
        tracing::debug!("Dependency graph built: {} nodes, {} edges", nodes.len(), edge_count);

        Self { nodes, edges }
    }

    pub fn node(&self, path: &str) -> Option<&FileAnalysis> {
        self.nodes.get(path)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &FileAnalysis> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|s| s.len()).sum()
    }

    /// Files that import `path`, directly
    pub fn direct_dependents(&self, path: &str) -> Vec<String> {
        self.nodes
            .get(path)
            .map(|n| n.dependents.clone())
            .unwrap_or_default()
    }

    /// Transitive closure of `path`'s dependencies (files it imports)
    pub fn all_dependencies(&self, path: &str) -> Vec<String> {
        let mut visited = AHashSet::new();
        let mut out = Vec::new();
        self.collect_dependencies(path, &mut visited, &mut out);
        out
    }

    fn collect_dependencies(
        &self,
        path: &str,
        visited: &mut AHashSet<String>,
        out: &mut Vec<String>,
    ) {
        if !visited.insert(path.to_string()) {
            return;
        }
        let Some(node) = self.nodes.get(path) else {
            return;
        };
        for dep in &node.dependencies {
            let Some(resolved) = self.resolve(dep) else {
                continue;
            };
            if !out.contains(&resolved) && resolved != path {
                out.push(resolved.clone());
            }
            self.collect_dependencies(&resolved, visited, out);
        }
    }

    /// Transitive closure of files that depend on `path`
    pub fn all_dependents(&self, path: &str) -> Vec<String> {
        let mut visited = AHashSet::new();
        let mut out = Vec::new();
        self.collect_dependents(path, &mut visited, &mut out);
        out
    }

    fn collect_dependents(
        &self,
        path: &str,
        visited: &mut AHashSet<String>,
        out: &mut Vec<String>,
    ) {
        if !visited.insert(path.to_string()) {
            return;
        }
        let Some(node) = self.nodes.get(path) else {
            return;
        };
        for dependent in &node.dependents {
            if !out.contains(dependent) {
                out.push(dependent.clone());
            }
            self.collect_dependents(dependent, visited, out);
        }
    }

    /// Number of files transitively affected by a change to `path`
    pub fn impact_score(&self, path: &str) -> usize {
        self.all_dependents(path).len()
    }

    /// Files sorted descending by impact score
    pub fn critical_files(&self, top_n: usize) -> Vec<CriticalFile> {
        let mut scores: Vec<CriticalFile> = self
            .nodes
            .keys()
            .map(|path| CriticalFile {
                path: path.clone(),
                score: self.impact_score(path),
            })
            .collect();

        scores.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
        scores.truncate(top_n);
        scores
    }

    /// Detect import cycles via DFS with a recursion stack.
    ///
    /// Each reported cycle is an ordered path list ending where it began.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();
        let mut visited = AHashSet::new();

        let mut paths: Vec<&String> = self.nodes.keys().collect();
        paths.sort();

        for path in paths {
            if !visited.contains(path.as_str()) {
                let mut stack = Vec::new();
                let mut on_stack = AHashSet::new();
                self.dfs_cycles(path, &mut visited, &mut stack, &mut on_stack, &mut cycles);
            }
        }
        cycles
    }

    fn dfs_cycles(
        &self,
        path: &str,
        visited: &mut AHashSet<String>,
        stack: &mut Vec<String>,
        on_stack: &mut AHashSet<String>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        visited.insert(path.to_string());
        stack.push(path.to_string());
        on_stack.insert(path.to_string());

        let deps: Vec<String> = self
            .nodes
            .get(path)
            .map(|n| {
                n.dependencies
                    .iter()
                    .filter_map(|d| self.resolve(d))
                    .collect()
            })
            .unwrap_or_default();

        for dep in deps {
            if on_stack.contains(&dep) {
                // Close the cycle from the first occurrence of dep
                if let Some(start) = stack.iter().position(|p| *p == dep) {
                    let mut cycle: Vec<String> = stack[start..].to_vec();
                    cycle.push(dep.clone());
                    cycles.push(cycle);
                }
            } else if !visited.contains(&dep) {
                self.dfs_cycles(&dep, visited, stack, on_stack, cycles);
            }
        }

        stack.pop();
        on_stack.remove(path);
    }

    /// Relationship between two files through the graph
    pub fn relationship(&self, a: &str, b: &str) -> Relationship {
        let (Some(node_a), Some(_)) = (self.nodes.get(a), self.nodes.get(b)) else {
            return Relationship::Unrelated;
        };

        if node_a
            .dependencies
            .iter()
            .filter_map(|d| self.resolve(d))
            .any(|d| d == b)
        {
            return Relationship::DependsOn;
        }
        if node_a.dependents.iter().any(|d| d == b) {
            return Relationship::DependedBy;
        }

        let deps_a: AHashSet<String> = self.all_dependencies(a).into_iter().collect();
        let deps_b: AHashSet<String> = self.all_dependencies(b).into_iter().collect();
        if deps_a.intersection(&deps_b).next().is_some() {
            return Relationship::Related;
        }

        Relationship::Unrelated
    }

    /// Suggest files to send alongside `path`: its direct dependencies,
    /// up to two dependents, then same-directory neighbors.
    pub fn suggest_context(&self, path: &str, max_files: usize) -> Vec<String> {
        let Some(node) = self.nodes.get(path) else {
            return Vec::new();
        };

        let mut suggestions: Vec<String> = Vec::new();
        let push = |p: String, suggestions: &mut Vec<String>| {
            if p != path && !suggestions.contains(&p) {
                suggestions.push(p);
            }
        };

        for dep in &node.dependencies {
            if let Some(resolved) = self.resolve(dep) {
                push(resolved, &mut suggestions);
            }
        }
        for dependent in node.dependents.iter().take(2) {
            push(dependent.clone(), &mut suggestions);
        }

        let dir = path.rfind('/').map(|idx| &path[..idx]).unwrap_or("");
        let mut neighbors: Vec<&String> = self
            .nodes
            .keys()
            .filter(|p| p.as_str() != path && p.starts_with(dir))
            .collect();
        neighbors.sort();
        for neighbor in neighbors {
            push(neighbor.clone(), &mut suggestions);
        }

        suggestions.truncate(max_files);
        suggestions
    }

    /// Resolve a recorded dependency path to a node path, exact match
    /// first, then the partial fallback
    fn resolve(&self, dep: &str) -> Option<String> {
        if self.nodes.contains_key(dep) {
            return Some(dep.to_string());
        }
        let paths: Vec<String> = self.nodes.keys().cloned().collect();
        match_node_path(&paths, dep)
    }
}

/// Exact path match first; otherwise the first node whose path contains
/// the dependency or vice versa. Deterministic by sorted order.
fn match_node_path(paths: &[String], dep: &str) -> Option<String> {
    if paths.iter().any(|p| p == dep) {
        return Some(dep.to_string());
    }
    let mut sorted: Vec<&String> = paths.iter().collect();
    sorted.sort();
    sorted
        .into_iter()
        .find(|p| p.contains(dep) || dep.contains(p.as_str()))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(path: &str, deps: &[&str]) -> FileAnalysis {
        FileAnalysis {
            file_path: path.to_string(),
            symbols: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            dependents: Vec::new(),
            complexity: 0,
            lines_of_code: 0,
        }
    }

    fn chain_graph() -> DependencyGraph {
        // a.ts -> b.ts -> c.ts
        DependencyGraph::build(vec![
            analysis("src/a.ts", &["src/b"]),
            analysis("src/b.ts", &["src/c"]),
            analysis("src/c.ts", &[]),
        ])
    }

    #[test]
    fn test_edges_point_to_importers() {
        let graph = chain_graph();
        let b = graph.node("src/b.ts").unwrap();
        assert_eq!(b.dependents, vec!["src/a.ts".to_string()]);
        assert_eq!(graph.direct_dependents("src/c.ts"), vec!["src/b.ts".to_string()]);
    }

    #[test]
    fn test_transitive_queries() {
        let graph = chain_graph();
        let deps = graph.all_dependencies("src/a.ts");
        assert_eq!(deps, vec!["src/b.ts".to_string(), "src/c.ts".to_string()]);

        let dependents = graph.all_dependents("src/c.ts");
        assert!(dependents.contains(&"src/b.ts".to_string()));
        assert!(dependents.contains(&"src/a.ts".to_string()));
    }

    #[test]
    fn test_impact_and_critical_files() {
        let graph = chain_graph();
        assert_eq!(graph.impact_score("src/c.ts"), 2);
        assert_eq!(graph.impact_score("src/a.ts"), 0);

        let critical = graph.critical_files(1);
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].path, "src/c.ts");
        assert_eq!(critical[0].score, 2);
    }

    #[test]
    fn test_detect_cycles_on_cycle() {
        let graph = DependencyGraph::build(vec![
            analysis("a.ts", &["b"]),
            analysis("b.ts", &["c"]),
            analysis("c.ts", &["a"]),
        ]);

        let cycles = graph.detect_cycles();
        assert!(!cycles.is_empty());
        let members: AHashSet<&str> = cycles[0].iter().map(|s| s.as_str()).collect();
        assert_eq!(
            members,
            ["a.ts", "b.ts", "c.ts"].iter().copied().collect::<AHashSet<&str>>()
        );
    }

    #[test]
    fn test_detect_cycles_acyclic() {
        assert!(chain_graph().detect_cycles().is_empty());
    }

    #[test]
    fn test_cycle_termination_on_self_loop_free_traversal() {
        let graph = DependencyGraph::build(vec![
            analysis("x.ts", &["y"]),
            analysis("y.ts", &["x"]),
        ]);
        // Traversals must terminate despite the cycle
        let deps = graph.all_dependencies("x.ts");
        assert!(deps.contains(&"y.ts".to_string()));
        let dependents = graph.all_dependents("x.ts");
        assert!(dependents.contains(&"y.ts".to_string()));
    }

    #[test]
    fn test_relationship() {
        let graph = chain_graph();
        assert_eq!(graph.relationship("src/a.ts", "src/b.ts"), Relationship::DependsOn);
        assert_eq!(graph.relationship("src/b.ts", "src/a.ts"), Relationship::DependedBy);
        assert_eq!(graph.relationship("src/a.ts", "missing.ts"), Relationship::Unrelated);
    }

    #[test]
    fn test_partial_match_fallback() {
        // "src/b" matches node "src/b.ts" by substring, not exact path
        let graph = chain_graph();
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_suggest_context() {
        let graph = chain_graph();
        let suggestions = graph.suggest_context("src/b.ts", 5);
        assert!(suggestions.contains(&"src/c.ts".to_string())); // dependency
        assert!(suggestions.contains(&"src/a.ts".to_string())); // dependent
        assert!(!suggestions.contains(&"src/b.ts".to_string()));
    }
}
