//! Graph node model.
//!
//! Nodes share a base struct ([`Node`]) holding identity, location and
//! lifecycle data; everything kind-specific lives in the [`NodeData`]
//! variant. Payloads are plain data produced by the parser and never hold
//! tree-sitter handles: `(ts_kind, range)` is the re-lookup key into a fresh
//! parse of the owning file.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::language::{Grammar, Language};
use crate::syntax::ByteRange;

// ============================================================================
// Identity
// ============================================================================

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique node identifier.
///
/// Ids are never reused, even across `Codebase` instances.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Node and symbol types
// ============================================================================

/// High-level node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    File,
    Symbol,
    Import,
    Export,
    External,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::File => "FILE",
            NodeType::Symbol => "SYMBOL",
            NodeType::Import => "IMPORT",
            NodeType::Export => "EXPORT",
            NodeType::External => "EXTERNAL",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a symbol definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Class,
    Function,
    Variable,
    TypeAlias,
    Interface,
    Namespace,
    Enum,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Function => "function",
            SymbolKind::Variable => "variable",
            SymbolKind::TypeAlias => "type_alias",
            SymbolKind::Interface => "interface",
            SymbolKind::Namespace => "namespace",
            SymbolKind::Enum => "enum",
        }
    }

    /// Kinds that may name superclasses.
    pub fn has_superclasses(&self) -> bool {
        matches!(self, SymbolKind::Class | SymbolKind::Interface)
    }
}

/// Shape of an import specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportKind {
    /// `import a.b` / `import a.b as c`
    Module,
    /// `from m import x` / `import { x } from "m"`
    Named,
    /// `import x from "m"`
    Default,
    /// `import * as ns from "m"`
    Namespace,
    /// `from m import *`
    Wildcard,
    /// `import "./polyfill"`
    SideEffect,
}

/// Shape of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    /// `export function f() {}`
    Declaration,
    /// `export { a, b as c }`
    Named,
    /// `export { a } from "./m"`
    ReExport,
    /// `export * from "./m"`
    Wildcard,
    /// `export * as ns from "./m"`
    Namespace,
    /// `export default expr`
    Default,
}

// ============================================================================
// References
// ============================================================================

/// An identifier occurrence with its byte range.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    pub name: String,
    pub range: ByteRange,
}

impl Ident {
    pub fn new(name: impl Into<String>, range: ByteRange) -> Self {
        Self {
            name: name.into(),
            range,
        }
    }
}

/// Syntactic position of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsagePosition {
    Body,
    Typed,
    Return,
    Decorator,
}

/// An identifier in use position, extracted once at parse time.
///
/// `head` is the leftmost name; `chain` holds the attribute names that
/// follow it (`a.b.c` → head `a`, chain `[b, c]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub head: Ident,
    pub chain: Vec<Ident>,
    pub position: UsagePosition,
    /// Head is `self`, `cls` or `this`
    pub self_reference: bool,
    /// Reference sits inside generic type arguments
    pub in_generic: bool,
}

impl Reference {
    pub fn simple(head: Ident, position: UsagePosition) -> Self {
        Self {
            head,
            chain: Vec::new(),
            position,
            self_reference: false,
            in_generic: false,
        }
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// File payload.
#[derive(Debug, Clone)]
pub struct FileData {
    /// Repository-relative path with forward slashes
    pub path: String,
    pub grammar: Grammar,
    pub content: Arc<str>,
    /// SHA-256 of `content`
    pub hash: String,
    /// Parse produced error nodes
    pub has_errors: bool,
    /// Module docstring range, if any
    pub docstring_range: Option<ByteRange>,
    /// Top-level statement ranges in source order
    pub statements: Vec<ByteRange>,
    /// References made by module-level code outside any symbol
    pub references: Vec<Reference>,
    /// Every node owned by this file, in source order
    pub nodes: Vec<NodeId>,
    /// Module-scope name → local definition (symbol or import)
    pub locals: HashMap<String, NodeId>,
}

impl FileData {
    /// File name component.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Symbol payload.
#[derive(Debug, Clone)]
pub struct SymbolData {
    pub name: String,
    pub kind: SymbolKind,
    pub name_range: ByteRange,
    /// Body block, if the definition has one
    pub body_range: Option<ByteRange>,
    /// Named superclasses / extended interfaces
    pub superclasses: Vec<Reference>,
    /// Range of the superclass list, including delimiters
    pub superclass_list_range: Option<ByteRange>,
    /// References made by this symbol's own code (children excluded)
    pub references: Vec<Reference>,
    pub docstring: Option<String>,
    pub inline_comment: Option<String>,
    pub is_exported: bool,
    /// Direct child symbols (methods, class attributes, ...)
    pub children: Vec<NodeId>,
}

impl SymbolData {
    pub fn new(name: impl Into<String>, kind: SymbolKind, name_range: ByteRange) -> Self {
        Self {
            name: name.into(),
            kind,
            name_range,
            body_range: None,
            superclasses: Vec::new(),
            superclass_list_range: None,
            references: Vec::new(),
            docstring: None,
            inline_comment: None,
            is_exported: false,
            children: Vec::new(),
        }
    }
}

/// Import payload; one node per imported name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportData {
    /// Module as written (`..pkg.mod`, `a.b`, `./util`)
    pub module: String,
    pub module_range: Option<ByteRange>,
    /// Imported name; `None` for module, namespace and side-effect imports
    pub name: Option<String>,
    pub name_range: Option<ByteRange>,
    pub alias: Option<String>,
    pub alias_range: Option<ByteRange>,
    pub kind: ImportKind,
    /// Range of the whole import statement
    pub statement_range: ByteRange,
    pub is_dynamic: bool,
    pub is_type_only: bool,
}

impl ImportData {
    /// Name this import binds in its scope.
    pub fn local_name(&self) -> Option<&str> {
        if let Some(alias) = &self.alias {
            return Some(alias);
        }
        match self.kind {
            ImportKind::Module => self.module.split('.').find(|s| !s.is_empty()),
            ImportKind::Named | ImportKind::Default => self.name.as_deref(),
            ImportKind::Namespace | ImportKind::Wildcard | ImportKind::SideEffect => None,
        }
    }

    /// For `import a.b.c` without alias: the segments after the bound head
    /// (`[b, c]`), which a use site must spell out.
    pub fn implied_segments(&self) -> Vec<&str> {
        if self.kind != ImportKind::Module || self.alias.is_some() {
            return Vec::new();
        }
        self.module
            .split('.')
            .filter(|s| !s.is_empty())
            .skip(1)
            .collect()
    }

    pub fn is_wildcard(&self) -> bool {
        self.kind == ImportKind::Wildcard
    }

    pub fn is_aliased(&self) -> bool {
        match (&self.alias, &self.name) {
            (Some(alias), Some(name)) => alias != name,
            (Some(_), None) => true,
            _ => false,
        }
    }
}

/// Export payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportData {
    pub kind: ExportKind,
    /// Name visible to importers (`default` for default exports)
    pub exported_name: Option<String>,
    /// Name referenced in this file or in the source module
    pub local_name: Option<String>,
    pub local_range: Option<ByteRange>,
    /// Source module for re-exports
    pub module: Option<String>,
    pub module_range: Option<ByteRange>,
    pub statement_range: ByteRange,
    /// Declared symbol for declaration exports
    pub declaration: Option<NodeId>,
}

/// External module payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalData {
    pub module: String,
    pub name: String,
}

impl ExternalData {
    /// Interning key, `"module::name"`.
    pub fn key(&self) -> String {
        external_key(&self.module, &self.name)
    }
}

/// Build an external interning key.
pub fn external_key(module: &str, name: &str) -> String {
    format!("{}::{}", module, name)
}

/// Kind-specific node state.
#[derive(Debug, Clone)]
pub enum NodeData {
    File(FileData),
    Symbol(SymbolData),
    Import(ImportData),
    Export(ExportData),
    External(ExternalData),
}

// ============================================================================
// Node
// ============================================================================

/// A node in the codebase graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub language: Language,
    /// Byte range in the owning file
    pub range: ByteRange,
    /// Tree-sitter kind; with `range`, the re-lookup key into a fresh parse
    pub ts_kind: &'static str,
    /// Owning file (self for files, `None` for externals)
    pub file: Option<NodeId>,
    /// Enclosing node (`None` for files, externals and top-level nodes)
    pub parent: Option<NodeId>,
    /// Sync in which this node was last (re)created
    pub generation: u64,
    pub data: NodeData,
}

impl Node {
    pub fn node_type(&self) -> NodeType {
        match self.data {
            NodeData::File(_) => NodeType::File,
            NodeData::Symbol(_) => NodeType::Symbol,
            NodeData::Import(_) => NodeType::Import,
            NodeData::Export(_) => NodeType::Export,
            NodeData::External(_) => NodeType::External,
        }
    }

    /// Display name of the node.
    pub fn name(&self) -> Option<&str> {
        match &self.data {
            NodeData::File(f) => Some(&f.path),
            NodeData::Symbol(s) => Some(&s.name),
            NodeData::Import(i) => i.local_name().or(i.name.as_deref()),
            NodeData::Export(e) => e.exported_name.as_deref(),
            NodeData::External(x) => Some(&x.name),
        }
    }

    pub fn as_file(&self) -> Option<&FileData> {
        match &self.data {
            NodeData::File(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&SymbolData> {
        match &self.data {
            NodeData::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_import(&self) -> Option<&ImportData> {
        match &self.data {
            NodeData::Import(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_export(&self) -> Option<&ExportData> {
        match &self.data {
            NodeData::Export(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_external(&self) -> Option<&ExternalData> {
        match &self.data {
            NodeData::External(x) => Some(x),
            _ => None,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.data, NodeData::File(_))
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self.data, NodeData::Symbol(_))
    }

    pub fn is_import(&self) -> bool {
        matches!(self.data, NodeData::Import(_))
    }

    pub fn is_export(&self) -> bool {
        matches!(self.data, NodeData::Export(_))
    }

    pub fn is_external(&self) -> bool {
        matches!(self.data, NodeData::External(_))
    }

    /// Symbol kind, for symbol nodes.
    pub fn symbol_kind(&self) -> Option<SymbolKind> {
        self.as_symbol().map(|s| s.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn import(module: &str, name: Option<&str>, alias: Option<&str>, kind: ImportKind) -> ImportData {
        ImportData {
            module: module.to_string(),
            module_range: None,
            name: name.map(str::to_string),
            name_range: None,
            alias: alias.map(str::to_string),
            alias_range: None,
            kind,
            statement_range: ByteRange::default(),
            is_dynamic: false,
            is_type_only: false,
        }
    }

    #[test]
    fn test_node_ids_unique_and_increasing() {
        let a = NodeId::next();
        let b = NodeId::next();
        assert!(b > a);
        assert_ne!(a, b);
    }

    #[test]
    fn test_import_local_names() {
        assert_eq!(
            import("a.b", None, None, ImportKind::Module).local_name(),
            Some("a")
        );
        assert_eq!(
            import("a.b", None, Some("ab"), ImportKind::Module).local_name(),
            Some("ab")
        );
        assert_eq!(
            import("m", Some("x"), None, ImportKind::Named).local_name(),
            Some("x")
        );
        assert_eq!(
            import("m", Some("x"), Some("y"), ImportKind::Named).local_name(),
            Some("y")
        );
        assert_eq!(import("m", None, None, ImportKind::Wildcard).local_name(), None);
    }

    #[test]
    fn test_implied_segments() {
        assert_eq!(
            import("a.b.c", None, None, ImportKind::Module).implied_segments(),
            vec!["b", "c"]
        );
        assert!(import("a.b", None, Some("x"), ImportKind::Module)
            .implied_segments()
            .is_empty());
    }

    #[test]
    fn test_aliasing() {
        assert!(import("m", Some("x"), Some("y"), ImportKind::Named).is_aliased());
        assert!(!import("m", Some("x"), Some("x"), ImportKind::Named).is_aliased());
        assert!(!import("m", Some("x"), None, ImportKind::Named).is_aliased());
    }

    #[test]
    fn test_external_key() {
        let ext = ExternalData {
            module: "os.path".to_string(),
            name: "join".to_string(),
        };
        assert_eq!(ext.key(), "os.path::join");
        assert_eq!(NodeType::External.as_str(), "EXTERNAL");
    }
}
