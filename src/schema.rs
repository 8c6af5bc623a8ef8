//! Core data model for the context engine
//!
//! These types flow between the extractor, the dependency graph, the
//! incremental indexer, and the context assembler. Symbol sets and file
//! analyses are produced fresh on every parse and replaced atomically;
//! only `FileAnalysis::dependents` is filled in later, by the graph builder.

use serde::{Deserialize, Serialize};

/// Kind of a declared symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    Variable,
    Const,
    Type,
    Enum,
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Variable => "variable",
            Self::Const => "const",
            Self::Type => "type",
            Self::Enum => "enum",
        };
        write!(f, "{}", s)
    }
}

/// A named declaration extracted from a source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,

    /// File the symbol was declared in
    pub file_path: String,

    /// 1-based line of the declaration
    pub line: usize,

    /// 1-based column of the declaration
    pub column: usize,

    /// Human-readable signature, e.g. `function foo(a: string): void`
    pub signature: String,

    /// Attached doc comment, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,

    pub is_exported: bool,

    /// Names referenced via call expressions inside the declaration body.
    /// Name-only heuristic; may over- or under-match.
    pub dependencies: Vec<String>,
}

/// One import statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportInfo {
    /// Module specifier as written in the source
    pub module_name: String,

    /// Names bound by the import clause
    pub imported_symbols: Vec<String>,

    pub is_default: bool,

    /// 1-based line of the statement
    pub line: usize,
}

/// One export statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportInfo {
    pub symbol_name: String,
    pub is_default: bool,
    pub line: usize,
}

/// Per-file result of semantic extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub file_path: String,
    pub symbols: Vec<Symbol>,
    pub imports: Vec<ImportInfo>,
    pub exports: Vec<ExportInfo>,

    /// Resolved file paths this file imports
    pub dependencies: Vec<String>,

    /// File paths that import this file. Empty until the graph is built.
    pub dependents: Vec<String>,

    /// Accumulated cyclomatic complexity across declarations
    pub complexity: usize,

    /// Non-blank, non-comment lines
    pub lines_of_code: usize,
}

/// One indexed file: path, capped content, embedding, and mtime fingerprint.
///
/// Owned by the incremental indexer and replaced wholesale on re-index.
/// Stored behind `Arc` so an unchanged file re-used across passes stays
/// pointer-identical.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,

    /// First 10KB of content, truncated at a char boundary
    pub content: String,

    pub embedding: Vec<f32>,

    /// Modification time, milliseconds since the Unix epoch
    pub last_modified: u64,
}

/// Metadata fingerprint for change detection (cache metadata region)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub path: String,
    pub last_modified: u64,
    pub size: u64,

    /// Content hash at the time of indexing, unset until the file is read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// One ranked entry produced by the context assembler.
///
/// Ephemeral: produced per query, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ContextEntry {
    pub path: String,
    pub content: String,

    /// Relevance in [0, 1]
    pub score: f32,

    /// Why this file was selected, e.g. `Symbol: parseConfig`
    pub reason: String,

    /// Symbol names that made this file relevant, used for chunking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevant_symbols: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_kind_display() {
        assert_eq!(SymbolKind::Function.to_string(), "function");
        assert_eq!(SymbolKind::Const.to_string(), "const");
        assert_eq!(SymbolKind::Interface.to_string(), "interface");
    }

    #[test]
    fn test_symbol_kind_serde_roundtrip() {
        let json = serde_json::to_string(&SymbolKind::Enum).unwrap();
        assert_eq!(json, "\"enum\"");
        let back: SymbolKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SymbolKind::Enum);
    }

    #[test]
    fn test_file_record_serde() {
        let rec = FileRecord {
            path: "src/a.ts".into(),
            content: "export const x = 1;".into(),
            embedding: vec![0.1, 0.2],
            last_modified: 1700000000,
        };
        let json = serde_json::to_string(&rec).unwrap();
        let back: FileRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.path, rec.path);
        assert_eq!(back.embedding, rec.embedding);
    }
}
