//! Per-language parsing and module-resolution hooks.
//!
//! A language plugs into the engine by implementing [`LanguageSupport`]: one
//! node-class table, an extraction pass that turns the typed syntax tree into
//! detached [`Entity`] values, and the module-path rules the resolver needs.
//! Neither the graph store nor the resolver branch on the language.

pub mod python;
pub mod typescript;

use crate::language::Language;
use crate::node::{ExportData, ImportData, Reference, SymbolData};
use crate::references::ScopeRules;
use crate::syntax::{ByteRange, NodeClass, NodeClassTable, StatementClass, SyntaxNode};

// ============================================================================
// Extraction output
// ============================================================================

/// A definition found by the extraction pass, not yet in the graph.
#[derive(Debug, Clone)]
pub struct Entity {
    /// Full range, including decorators and `export` wrappers
    pub range: ByteRange,
    pub ts_kind: &'static str,
    pub kind: EntityKind,
    /// Nested entities (methods, attributes, function-local imports)
    pub children: Vec<Entity>,
}

/// Payload of an [`Entity`].
#[derive(Debug, Clone)]
pub enum EntityKind {
    /// A symbol, with the export that declares it, if any
    Symbol {
        data: SymbolData,
        export: Option<ExportData>,
    },
    Import(ImportData),
    Export(ExportData),
}

impl Entity {
    pub fn symbol(range: ByteRange, ts_kind: &'static str, data: SymbolData) -> Self {
        Self {
            range,
            ts_kind,
            kind: EntityKind::Symbol { data, export: None },
            children: Vec::new(),
        }
    }

    pub fn import(range: ByteRange, ts_kind: &'static str, data: ImportData) -> Self {
        Self {
            range,
            ts_kind,
            kind: EntityKind::Import(data),
            children: Vec::new(),
        }
    }

    pub fn export(range: ByteRange, ts_kind: &'static str, data: ExportData) -> Self {
        Self {
            range,
            ts_kind,
            kind: EntityKind::Export(data),
            children: Vec::new(),
        }
    }

    /// Name of the symbol, if this entity is one.
    pub fn symbol_name(&self) -> Option<&str> {
        match &self.kind {
            EntityKind::Symbol { data, .. } => Some(&data.name),
            _ => None,
        }
    }
}

/// Everything the extraction pass produces for one file.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Top-level entities in source order
    pub entities: Vec<Entity>,
    /// References made by module-level code outside any symbol
    pub references: Vec<Reference>,
    /// Top-level statement ranges in source order
    pub statements: Vec<ByteRange>,
    pub docstring_range: Option<ByteRange>,
}

// ============================================================================
// Language hooks
// ============================================================================

/// Language-specific behaviour consumed by the parser, resolver and editor.
pub trait LanguageSupport: Send + Sync {
    fn language(&self) -> Language;

    /// Node-class table for every grammar of this language.
    fn class_table(&self) -> &'static NodeClassTable;

    /// Scoping rules for the reference collector.
    fn scope_rules(&self) -> &'static dyn ScopeRules;

    /// Walk a file's typed syntax tree once and extract its entities.
    fn extract(&self, root: &SyntaxNode, source: &str) -> Extraction;

    /// Module name of a repository-relative file path.
    fn module_name(&self, path: &str) -> String;

    /// Normalize an import's module as written into an absolute module key,
    /// relative to the importing file.
    fn absolute_module(&self, importer: &str, module: &str) -> String;

    /// Separator between module segments, used to match override prefixes.
    fn module_separator(&self) -> char;

    /// Candidate file paths for an absolute module key, in priority order.
    fn module_candidates(&self, module: &str) -> Vec<String>;

    /// Candidate file paths when a named import actually names a submodule
    /// (`from pkg import sub`).
    fn submodule_candidates(&self, _module: &str, _name: &str) -> Vec<String> {
        Vec::new()
    }

    /// Whether files of this language export every top-level name.
    fn exports_all_top_level(&self) -> bool;

    /// Render an import statement.
    fn import_string(
        &self,
        module: &str,
        name: Option<&str>,
        alias: Option<&str>,
        is_type_only: bool,
    ) -> String;

    /// Module string `importer` would use to import `target`.
    fn module_specifier(&self, importer: &str, target: &str) -> String;

    /// Imports that must precede all others (`from __future__ import ...`).
    fn is_leading_import(&self, _import: &ImportData) -> bool {
        false
    }

    /// Same as [`is_leading_import`](Self::is_leading_import), for import text
    /// that has not been parsed yet.
    fn is_leading_import_source(&self, _text: &str) -> bool {
        false
    }

    /// Line comment prefix.
    fn comment_prefix(&self) -> &'static str;
}

// ============================================================================
// Shared extraction helpers
// ============================================================================

/// Strip comment markers from a comment node's text.
pub(crate) fn comment_text(raw: &str) -> String {
    let raw = raw.trim();
    if let Some(body) = raw.strip_prefix("/*") {
        let body = body.strip_suffix("*/").unwrap_or(body);
        let body = body.strip_prefix('*').unwrap_or(body);
        return body
            .lines()
            .map(|line| {
                let line = line.trim();
                line.strip_prefix('*').unwrap_or(line).trim()
            })
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
    }
    let body = raw
        .strip_prefix("//")
        .or_else(|| raw.strip_prefix('#'))
        .unwrap_or(raw);
    body.trim().to_string()
}

fn is_comment(node: &SyntaxNode) -> bool {
    node.class == NodeClass::Statement(StatementClass::Comment)
}

/// Comments immediately preceding `siblings[index]`, one per line with no
/// blank line in between.
pub(crate) fn leading_comments(
    siblings: &[SyntaxNode],
    index: usize,
    source: &str,
) -> Option<String> {
    let mut lines = Vec::new();
    let mut next_start = siblings.get(index)?.range.start;
    for sibling in siblings[..index].iter().rev() {
        if !is_comment(sibling) {
            break;
        }
        let gap = source.get(sibling.range.end..next_start).unwrap_or("\n\n");
        if gap.matches('\n').count() > 1 || !gap.trim().is_empty() {
            break;
        }
        // a comment trailing code on its own line belongs to that code
        let before = source.get(..sibling.range.start).unwrap_or_default();
        if !before[before.rfind('\n').map_or(0, |i| i + 1)..].trim().is_empty() {
            break;
        }
        lines.push(comment_text(sibling.text(source)));
        next_start = sibling.range.start;
    }
    if lines.is_empty() {
        return None;
    }
    lines.reverse();
    Some(lines.join("\n"))
}

/// Comment that follows `siblings[index]` on the same line.
pub(crate) fn trailing_comment(
    siblings: &[SyntaxNode],
    index: usize,
    source: &str,
) -> Option<String> {
    let node = siblings.get(index)?;
    let next = siblings.get(index + 1)?;
    if !is_comment(next) {
        return None;
    }
    let gap = source.get(node.range.end..next.range.start)?;
    if gap.contains('\n') {
        return None;
    }
    Some(comment_text(next.text(source)))
}

/// Strip quotes from a string literal's text.
pub(crate) fn unquote(raw: &str) -> &str {
    let raw = raw.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    for quote in ["\"\"\"", "'''", "\"", "'", "`"] {
        if let Some(inner) = raw
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    raw
}

/// Ranges of an entity list, for skipping during reference collection.
pub(crate) fn entity_ranges(entities: &[Entity]) -> Vec<ByteRange> {
    entities.iter().map(|e| e.range).collect()
}
