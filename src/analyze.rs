//! Symbol and dependency extraction via tree-sitter
//!
//! One parse per file, one walk over the tree. The walk dispatches on node
//! kind to extractors for imports, exports, and the seven declaration kinds.
//! Per-declaration dependencies are the call-expression texts inside the
//! body; this is a name-only heuristic, not binding resolution.
//!
//! Relative import specifiers are resolved against the importing file's
//! directory by textual `..`-segment collapsing. There is no filesystem
//! existence check and no extension probing; bare specifiers are treated as
//! external and never enter `FileAnalysis::dependencies`.

use std::path::Path;

use tree_sitter::{Node, Tree};

use crate::error::{CtxError, Result};
use crate::lang::Lang;
use crate::schema::{ExportInfo, FileAnalysis, ImportInfo, Symbol, SymbolKind};

/// Parse source text with the grammar for `lang`
pub fn parse_source(file_path: &Path, source: &str, lang: Lang) -> Result<Tree> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&lang.tree_sitter_language())
        .map_err(|e| CtxError::ParseFailure {
            message: format!("Failed to set language for {}: {:?}", file_path.display(), e),
        })?;

    parser.parse(source, None).ok_or_else(|| CtxError::ParseFailure {
        message: format!("Failed to parse file: {}", file_path.display()),
    })
}

/// Analyze one file's source text into a [`FileAnalysis`].
///
/// Files whose extension is not a supported source language return
/// `UnsupportedLanguage`; callers treat those as opaque, not as failures.
pub fn analyze(file_path: &Path, source: &str) -> Result<FileAnalysis> {
    let lang = Lang::from_path(file_path)?;
    let tree = parse_source(file_path, source, lang)?;

    let path_str = file_path.to_string_lossy().replace('\\', "/");
    let mut ctx = ExtractCtx {
        file_path: path_str.clone(),
        source,
        symbols: Vec::new(),
        imports: Vec::new(),
        exports: Vec::new(),
        dependencies: Vec::new(),
        complexity: 0,
    };

    walk(tree.root_node(), &mut ctx);

    let lines_of_code = source
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with("//") && !trimmed.starts_with("/*")
        })
        .count();

    tracing::debug!(
        "Analyzed {}: {} symbols, {} imports, {} exports",
        path_str,
        ctx.symbols.len(),
        ctx.imports.len(),
        ctx.exports.len()
    );

    Ok(FileAnalysis {
        file_path: path_str,
        symbols: ctx.symbols,
        imports: ctx.imports,
        exports: ctx.exports,
        dependencies: ctx.dependencies,
        dependents: Vec::new(),
        complexity: ctx.complexity,
        lines_of_code,
    })
}

struct ExtractCtx<'a> {
    file_path: String,
    source: &'a str,
    symbols: Vec<Symbol>,
    imports: Vec<ImportInfo>,
    exports: Vec<ExportInfo>,
    dependencies: Vec<String>,
    complexity: usize,
}

fn walk(node: Node, ctx: &mut ExtractCtx) {
    match node.kind() {
        "import_statement" => extract_import(node, ctx),
        "export_statement" => extract_export(node, ctx),
        "function_declaration" | "generator_function_declaration" => {
            if let Some(symbol) = extract_function(node, ctx) {
                ctx.symbols.push(symbol);
                ctx.complexity += cyclomatic_complexity(node, ctx.source);
            }
        }
        "class_declaration" => {
            if let Some(symbol) = extract_class(node, ctx) {
                ctx.symbols.push(symbol);
                ctx.complexity += cyclomatic_complexity(node, ctx.source);
            }
        }
        "interface_declaration" => {
            if let Some(symbol) = extract_interface(node, ctx) {
                ctx.symbols.push(symbol);
            }
        }
        "lexical_declaration" | "variable_declaration" => {
            extract_variables(node, ctx);
        }
        "type_alias_declaration" => {
            if let Some(symbol) = extract_type_alias(node, ctx) {
                ctx.symbols.push(symbol);
            }
        }
        "enum_declaration" => {
            if let Some(symbol) = extract_enum(node, ctx) {
                ctx.symbols.push(symbol);
            }
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, ctx);
    }
}

fn text<'a>(node: Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// 1-based (line, column) of a node's start
fn position(node: Node) -> (usize, usize) {
    let point = node.start_position();
    (point.row + 1, point.column + 1)
}

// ========== Imports / exports ==========

fn extract_import(node: Node, ctx: &mut ExtractCtx) {
    let Some(source_node) = node.child_by_field_name("source") else {
        return;
    };
    let module_name = string_content(source_node, ctx.source);
    if module_name.is_empty() {
        return;
    }

    let mut imported_symbols = Vec::new();
    let mut is_default = false;

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != "import_clause" {
            continue;
        }
        let mut clause_cursor = child.walk();
        for part in child.children(&mut clause_cursor) {
            match part.kind() {
                // `import Default from ...`
                "identifier" => {
                    imported_symbols.push(text(part, ctx.source).to_string());
                    is_default = true;
                }
                // `import { a, b as c } from ...`
                "named_imports" => {
                    let mut spec_cursor = part.walk();
                    for spec in part.children(&mut spec_cursor) {
                        if spec.kind() == "import_specifier" {
                            if let Some(name) = spec.child_by_field_name("name") {
                                imported_symbols.push(text(name, ctx.source).to_string());
                            }
                        }
                    }
                }
                // `import * as ns from ...`
                "namespace_import" => {
                    let mut ns_cursor = part.walk();
                    for ns_child in part.children(&mut ns_cursor) {
                        if ns_child.kind() == "identifier" {
                            imported_symbols.push(text(ns_child, ctx.source).to_string());
                        }
                    }
                }
                _ => {}
            }
        }
    }

    let (line, _) = position(node);
    if let Some(resolved) = resolve_relative_import(&ctx.file_path, &module_name) {
        if !ctx.dependencies.contains(&resolved) {
            ctx.dependencies.push(resolved);
        }
    }
    ctx.imports.push(ImportInfo {
        module_name,
        imported_symbols,
        is_default,
        line,
    });
}

fn extract_export(node: Node, ctx: &mut ExtractCtx) {
    let (line, _) = position(node);

    // `export default ...`
    let mut cursor = node.walk();
    let has_default = node
        .children(&mut cursor)
        .any(|c| c.kind() == "default");
    if has_default {
        ctx.exports.push(ExportInfo {
            symbol_name: "default".to_string(),
            is_default: true,
            line,
        });
        return;
    }

    // `export { a, b as c }`
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != "export_clause" {
            continue;
        }
        let mut spec_cursor = child.walk();
        for spec in child.children(&mut spec_cursor) {
            if spec.kind() == "export_specifier" {
                if let Some(name) = spec.child_by_field_name("name") {
                    ctx.exports.push(ExportInfo {
                        symbol_name: text(name, ctx.source).to_string(),
                        is_default: false,
                        line,
                    });
                }
            }
        }
    }
    // Declarations wrapped in `export ...` surface through the symbol's
    // `is_exported` flag instead.
}

/// Content of a string literal node without its quotes
fn string_content(node: Node, source: &str) -> String {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "string_fragment" {
            return text(child, source).to_string();
        }
    }
    text(node, source).trim_matches(['"', '\'', '`']).to_string()
}

// ========== Declarations ==========

fn extract_function(node: Node, ctx: &ExtractCtx) -> Option<Symbol> {
    let name = text(node.child_by_field_name("name")?, ctx.source).to_string();
    let (line, column) = position(node);

    let params = node
        .child_by_field_name("parameters")
        .map(|p| text(p, ctx.source).to_string())
        .unwrap_or_else(|| "()".to_string());
    let return_type = node
        .child_by_field_name("return_type")
        .map(|t| text(t, ctx.source).trim_start_matches(':').trim().to_string())
        .unwrap_or_else(|| "void".to_string());
    let signature = format!("function {}{}: {}", name, params, return_type);

    Some(Symbol {
        name,
        kind: SymbolKind::Function,
        file_path: ctx.file_path.clone(),
        line,
        column,
        signature,
        documentation: doc_comment(node, ctx.source),
        is_exported: is_exported(node),
        dependencies: call_targets(node, ctx.source),
    })
}

fn extract_class(node: Node, ctx: &ExtractCtx) -> Option<Symbol> {
    let name = text(node.child_by_field_name("name")?, ctx.source).to_string();
    let (line, column) = position(node);

    let heritage = heritage_names(node, ctx.source);
    let signature = if heritage.is_empty() {
        format!("class {}", name)
    } else {
        format!("class {} extends {}", name, heritage.join(", "))
    };

    Some(Symbol {
        name,
        kind: SymbolKind::Class,
        file_path: ctx.file_path.clone(),
        line,
        column,
        signature,
        documentation: doc_comment(node, ctx.source),
        is_exported: is_exported(node),
        // Base classes and implemented interfaces, by name
        dependencies: heritage,
    })
}

fn extract_interface(node: Node, ctx: &ExtractCtx) -> Option<Symbol> {
    let name = text(node.child_by_field_name("name")?, ctx.source).to_string();
    let (line, column) = position(node);

    let heritage = heritage_names(node, ctx.source);
    let signature = if heritage.is_empty() {
        format!("interface {}", name)
    } else {
        format!("interface {} extends {}", name, heritage.join(", "))
    };

    Some(Symbol {
        name,
        kind: SymbolKind::Interface,
        file_path: ctx.file_path.clone(),
        line,
        column,
        signature,
        documentation: doc_comment(node, ctx.source),
        is_exported: is_exported(node),
        dependencies: Vec::new(),
    })
}

fn extract_variables(node: Node, ctx: &mut ExtractCtx) {
    let is_const = node
        .child(0)
        .map(|c| text(c, ctx.source) == "const")
        .unwrap_or(false);
    let exported = is_exported(node);
    let documentation = doc_comment(node, ctx.source);

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != "variable_declarator" {
            continue;
        }
        let Some(name_node) = child.child_by_field_name("name") else {
            continue;
        };
        if name_node.kind() != "identifier" {
            // Destructuring patterns are skipped, matching the
            // identifier-only extraction of declarations
            continue;
        }
        let name = text(name_node, ctx.source).to_string();
        let (line, column) = position(child);

        let ty = child
            .child_by_field_name("type")
            .map(|t| text(t, ctx.source).trim_start_matches(':').trim().to_string())
            .unwrap_or_else(|| "any".to_string());
        let keyword = if is_const { "const" } else { "let" };
        let signature = format!("{} {}: {}", keyword, name, ty);

        ctx.symbols.push(Symbol {
            name,
            kind: if is_const {
                SymbolKind::Const
            } else {
                SymbolKind::Variable
            },
            file_path: ctx.file_path.clone(),
            line,
            column,
            signature,
            documentation: documentation.clone(),
            is_exported: exported,
            dependencies: Vec::new(),
        });
    }
}

fn extract_type_alias(node: Node, ctx: &ExtractCtx) -> Option<Symbol> {
    let name = text(node.child_by_field_name("name")?, ctx.source).to_string();
    let (line, column) = position(node);

    let value = node
        .child_by_field_name("value")
        .map(|v| text(v, ctx.source).to_string())
        .unwrap_or_default();
    let signature = format!("type {} = {}", name, value);

    Some(Symbol {
        name,
        kind: SymbolKind::Type,
        file_path: ctx.file_path.clone(),
        line,
        column,
        signature,
        documentation: doc_comment(node, ctx.source),
        is_exported: is_exported(node),
        dependencies: Vec::new(),
    })
}

fn extract_enum(node: Node, ctx: &ExtractCtx) -> Option<Symbol> {
    let name = text(node.child_by_field_name("name")?, ctx.source).to_string();
    let (line, column) = position(node);

    let mut members = Vec::new();
    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for member in body.children(&mut cursor) {
            match member.kind() {
                "property_identifier" => members.push(text(member, ctx.source).to_string()),
                "enum_assignment" => {
                    if let Some(n) = member.child_by_field_name("name") {
                        members.push(text(n, ctx.source).to_string());
                    }
                }
                _ => {}
            }
        }
    }
    let signature = format!("enum {} {{ {} }}", name, members.join(", "));

    Some(Symbol {
        name,
        kind: SymbolKind::Enum,
        file_path: ctx.file_path.clone(),
        line,
        column,
        signature,
        documentation: doc_comment(node, ctx.source),
        is_exported: is_exported(node),
        dependencies: Vec::new(),
    })
}

// ========== Shared helpers ==========

/// Base-class / implemented-interface names from any heritage clause
fn heritage_names(node: Node, source: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        let kind = child.kind();
        if kind == "class_heritage" || kind.contains("extends") || kind.contains("implements") {
            collect_heritage_idents(child, source, &mut names);
        }
    }
    names
}

fn collect_heritage_idents(node: Node, source: &str, out: &mut Vec<String>) {
    match node.kind() {
        "identifier" | "type_identifier" => {
            let name = text(node, source).to_string();
            if !out.contains(&name) {
                out.push(name);
            }
        }
        _ => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                collect_heritage_idents(child, source, out);
            }
        }
    }
}

/// A declaration is exported when an `export_statement` wraps it
fn is_exported(node: Node) -> bool {
    let mut current = node.parent();
    while let Some(parent) = current {
        match parent.kind() {
            "export_statement" => return true,
            "program" => return false,
            _ => current = parent.parent(),
        }
    }
    false
}

/// JSDoc-style comment immediately preceding the declaration (or its
/// wrapping export statement), cleaned of comment markers
fn doc_comment(node: Node, source: &str) -> Option<String> {
    let anchor = match node.parent() {
        Some(p) if p.kind() == "export_statement" => p,
        _ => node,
    };
    let prev = anchor.prev_named_sibling()?;
    if prev.kind() != "comment" {
        return None;
    }
    let raw = text(prev, source);
    if !raw.starts_with("/**") {
        return None;
    }

    let cleaned: Vec<String> = raw
        .trim_start_matches("/**")
        .trim_end_matches("*/")
        .lines()
        .map(|line| line.trim().trim_start_matches('*').trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.join("\n"))
    }
}

/// Call-expression targets inside a declaration body.
/// Full expression text, so method calls keep their receiver.
fn call_targets(node: Node, source: &str) -> Vec<String> {
    let mut calls = Vec::new();
    collect_calls(node, source, &mut calls);
    calls
}

fn collect_calls(node: Node, source: &str, out: &mut Vec<String>) {
    if node.kind() == "call_expression" {
        if let Some(function) = node.child_by_field_name("function") {
            out.push(text(function, source).to_string());
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_calls(child, source, out);
    }
}

/// Cyclomatic complexity: 1 base per declaration, +1 per decision point
/// (conditional, loop, switch case, catch, short-circuit boolean operator)
fn cyclomatic_complexity(node: Node, source: &str) -> usize {
    let mut complexity = 1;
    count_decision_points(node, source, &mut complexity);
    complexity
}

fn count_decision_points(node: Node, source: &str, complexity: &mut usize) {
    match node.kind() {
        "if_statement" | "ternary_expression" | "while_statement" | "do_statement"
        | "for_statement" | "for_in_statement" | "switch_case" | "catch_clause" => {
            *complexity += 1;
        }
        "binary_expression" => {
            if let Some(op) = node.child_by_field_name("operator") {
                let op_text = text(op, source);
                if op_text == "&&" || op_text == "||" {
                    *complexity += 1;
                }
            }
        }
        _ => {}
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        count_decision_points(child, source, complexity);
    }
}

/// Resolve a relative import specifier against the importing file's
/// directory by textual segment collapsing. Returns `None` for bare
/// (package) specifiers, which stay external.
pub fn resolve_relative_import(from_path: &str, specifier: &str) -> Option<String> {
    if !specifier.starts_with("./") && !specifier.starts_with("../") && specifier != "." {
        return None;
    }

    let dir = match from_path.rfind('/') {
        Some(idx) => &from_path[..idx],
        None => "",
    };
    let mut segments: Vec<&str> = if dir.is_empty() {
        Vec::new()
    } else {
        dir.split('/').collect()
    };

    for segment in specifier.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    Some(segments.join("/"))
}
