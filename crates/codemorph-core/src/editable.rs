//! Editable surface over the graph.
//!
//! A [`Session`] borrows the graph and the file layer for the duration of one
//! batch of edits. Handles ([`Symbol`], [`Import`], [`SourceFile`], ...) are
//! cheap `Copy` views onto graph nodes; every mutating call turns into one or
//! more queued transactions, and nothing touches disk until the session is
//! committed by the [`Codebase`](crate::codebase::Codebase).
//!
//! ## Usage
//!
//! ```ignore
//! codebase.session(SessionOptions::default(), |session| {
//!     let helper = session.get_function("helper")?;
//!     helper.rename("assist")?;
//!     let utils = session.get_file("utils.py")?;
//!     helper.move_to_file(&utils, true, MoveStrategy::UpdateAllImports)?;
//!     Ok(())
//! })?;
//! ```

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;

use codemorph_config::SessionOptions;
use tracing::debug;

use crate::codebase::{CodebaseError, Result};
use crate::directory::Directory;
use crate::graph::{CodebaseGraph, EdgeType, UsageKinds};
use crate::io::{parent_dir, FileIo};
use crate::lang::unquote;
use crate::language::Language;
use crate::node::{
    ExportData, ExportKind, ExternalData, FileData, ImportData, ImportKind, Node, NodeData, NodeId,
    NodeType, SymbolData, SymbolKind,
};
use crate::resolver::{self, UsageRecord};
use crate::syntax::ByteRange;
use crate::transaction::{FileOperation, TransactionKind, TransactionManager};

/// How importers of a moved symbol are kept working.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveStrategy {
    /// Point every importer at the new file
    #[default]
    UpdateAllImports,
    /// Leave importers alone and re-import the symbol into the old file
    AddBackEdge,
}

// ============================================================================
// Text helpers
// ============================================================================

fn line_start(content: &str, offset: usize) -> usize {
    content
        .get(..offset)
        .and_then(|s| s.rfind('\n'))
        .map_or(0, |i| i + 1)
}

fn line_end(content: &str, offset: usize) -> usize {
    content
        .get(offset..)
        .and_then(|s| s.find('\n'))
        .map_or(content.len(), |i| offset + i)
}

/// Leading whitespace of the line containing `offset`.
fn line_indent(content: &str, offset: usize) -> &str {
    let start = line_start(content, offset);
    let line = &content[start..line_end(content, offset)];
    &line[..line.len() - line.trim_start().len()]
}

/// Whether `range` is alone on its lines (only whitespace around it).
fn owns_lines(content: &str, range: ByteRange) -> bool {
    let before = content.get(line_start(content, range.start)..range.start);
    let after = content.get(range.end..line_end(content, range.end));
    before.is_some_and(|s| s.trim().is_empty()) && after.is_some_and(|s| s.trim().is_empty())
}

/// Range to delete when removing `range`: whole lines plus the trailing
/// newline when the node owns its lines, the bare range otherwise.
fn removal_range(content: &str, range: ByteRange) -> ByteRange {
    if !owns_lines(content, range) {
        return range;
    }
    let start = line_start(content, range.start);
    let end = line_end(content, range.end);
    let end = if end < content.len() { end + 1 } else { end };
    ByteRange::new(start, end)
}

/// Range to delete when removing one specifier from a multi-name import,
/// taking a neighbouring comma with it.
fn spec_removal_range(content: &str, range: ByteRange) -> ByteRange {
    let after = content.get(range.end..).unwrap_or_default();
    let trimmed = after.trim_start_matches([' ', '\t']);
    if trimmed.starts_with(',') {
        let comma_end = range.end + (after.len() - trimmed.len()) + 1;
        let rest = content.get(comma_end..).unwrap_or_default();
        let ws = rest.len() - rest.trim_start_matches([' ', '\t', '\r', '\n']).len();
        return ByteRange::new(range.start, comma_end + ws);
    }
    let before = content.get(..range.start).unwrap_or_default();
    let trimmed = before.trim_end_matches([' ', '\t', '\r', '\n']);
    if trimmed.ends_with(',') {
        return ByteRange::new(trimmed.len() - 1, range.end);
    }
    range
}

fn indent_block(text: &str, indent: &str) -> String {
    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("{}{}", indent, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Session
// ============================================================================

/// One batch of edits against a borrowed graph.
pub struct Session<'c> {
    graph: &'c CodebaseGraph,
    io: &'c FileIo,
    transactions: RefCell<TransactionManager>,
    /// `(file, import text)` pairs queued this session
    added_imports: RefCell<BTreeSet<(String, String)>>,
    /// Specifiers removed so far, per import statement
    removed_specs: RefCell<BTreeMap<(String, ByteRange), BTreeSet<NodeId>>>,
}

impl<'c> Session<'c> {
    pub(crate) fn new(graph: &'c CodebaseGraph, io: &'c FileIo, options: &SessionOptions) -> Self {
        let mut transactions = TransactionManager::new();
        transactions.begin(options);
        Self {
            graph,
            io,
            transactions: RefCell::new(transactions),
            added_imports: RefCell::new(BTreeSet::new()),
            removed_specs: RefCell::new(BTreeMap::new()),
        }
    }

    pub(crate) fn into_transactions(self) -> TransactionManager {
        self.transactions.into_inner()
    }

    pub fn graph(&self) -> &'c CodebaseGraph {
        self.graph
    }

    /// Number of queued edits and file operations.
    pub fn pending_transactions(&self) -> usize {
        self.transactions.borrow().pending_count()
    }

    /// Fail once the session's time budget is spent.
    pub fn check_time_budget(&self) -> Result<()> {
        self.transactions.borrow().check_time_budget()?;
        Ok(())
    }

    fn enqueue(
        &self,
        file: &str,
        range: ByteRange,
        text: impl Into<String>,
        kind: TransactionKind,
    ) -> Result<()> {
        self.enqueue_with_priority(file, range, text, 0, kind)
    }

    fn enqueue_with_priority(
        &self,
        file: &str,
        range: ByteRange,
        text: impl Into<String>,
        priority: i32,
        kind: TransactionKind,
    ) -> Result<()> {
        self.transactions
            .borrow_mut()
            .enqueue(file, range, text, priority, kind)?;
        Ok(())
    }

    fn file_operation(&self, op: FileOperation) -> Result<()> {
        self.transactions.borrow_mut().file_operation(op)?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Handles
    // ------------------------------------------------------------------------

    /// Handle for any node.
    pub fn handle(&self, id: NodeId) -> Option<NodeHandle<'_>> {
        let node = self.graph.node(id)?;
        Some(match &node.data {
            NodeData::File(data) => NodeHandle::File(SourceFile {
                session: self,
                node,
                data,
            }),
            NodeData::Symbol(data) => NodeHandle::Symbol(Symbol {
                session: self,
                node,
                data,
            }),
            NodeData::Import(data) => NodeHandle::Import(Import {
                session: self,
                node,
                data,
            }),
            NodeData::Export(data) => NodeHandle::Export(Export {
                session: self,
                node,
                data,
            }),
            NodeData::External(data) => NodeHandle::External(ExternalModule {
                session: self,
                node,
                data,
            }),
        })
    }

    pub fn symbol(&self, id: NodeId) -> Option<Symbol<'_>> {
        self.handle(id)?.as_symbol()
    }

    pub fn import(&self, id: NodeId) -> Option<Import<'_>> {
        self.handle(id)?.as_import()
    }

    pub fn export(&self, id: NodeId) -> Option<Export<'_>> {
        self.handle(id)?.as_export()
    }

    pub fn external(&self, id: NodeId) -> Option<ExternalModule<'_>> {
        self.handle(id)?.as_external()
    }

    pub fn file_by_id(&self, id: NodeId) -> Option<SourceFile<'_>> {
        self.handle(id)?.as_file()
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    /// Indexed file at `path` (relative to the root, or absolute inside it).
    pub fn get_file(&self, path: &str) -> Result<SourceFile<'_>> {
        let rel = self.io.normalize(path)?;
        self.graph
            .file_id(&rel)
            .and_then(|id| self.file_by_id(id))
            .ok_or(CodebaseError::FileNotFound(rel))
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.io
            .normalize(path)
            .is_ok_and(|rel| self.graph.file_id(&rel).is_some())
    }

    /// Every indexed file, by path.
    pub fn files(&self) -> Vec<SourceFile<'_>> {
        let mut files: Vec<SourceFile<'_>> = self
            .graph
            .files()
            .filter_map(|n| self.file_by_id(n.id))
            .collect();
        files.sort_by(|a, b| a.path().cmp(b.path()));
        files
    }

    pub fn directory(&self, path: &str) -> Option<DirectoryHandle<'_>> {
        let dir = self.graph.directories().get(path.trim_end_matches('/'))?;
        Some(DirectoryHandle { session: self, dir })
    }

    pub fn root_directory(&self) -> Option<DirectoryHandle<'_>> {
        let dir = self.graph.directories().root()?;
        Some(DirectoryHandle { session: self, dir })
    }

    /// Top-level symbols of every file.
    pub fn symbols(&self) -> Vec<Symbol<'_>> {
        self.files().iter().flat_map(|f| f.symbols()).collect()
    }

    pub fn functions(&self) -> Vec<Symbol<'_>> {
        self.files().iter().flat_map(|f| f.functions()).collect()
    }

    pub fn classes(&self) -> Vec<Symbol<'_>> {
        self.files().iter().flat_map(|f| f.classes()).collect()
    }

    pub fn imports(&self) -> Vec<Import<'_>> {
        self.files().iter().flat_map(|f| f.imports()).collect()
    }

    pub fn exports(&self) -> Vec<Export<'_>> {
        self.files().iter().flat_map(|f| f.exports()).collect()
    }

    pub fn externals(&self) -> Vec<ExternalModule<'_>> {
        self.graph
            .externals()
            .filter_map(|n| self.external(n.id))
            .collect()
    }

    /// The single top-level symbol called `name`.
    pub fn get_symbol(&self, name: &str) -> Result<Symbol<'_>> {
        unique(name, self.symbols().into_iter().filter(|s| s.name() == name))
    }

    pub fn get_function(&self, name: &str) -> Result<Symbol<'_>> {
        unique(
            name,
            self.functions().into_iter().filter(|s| s.name() == name),
        )
    }

    pub fn get_class(&self, name: &str) -> Result<Symbol<'_>> {
        unique(name, self.classes().into_iter().filter(|s| s.name() == name))
    }

    /// Queue creation of a new file.
    pub fn create_file(&self, path: &str, content: &str) -> Result<()> {
        let rel = self.io.normalize(path)?;
        if self.graph.file_id(&rel).is_some() {
            return Err(CodebaseError::InvalidOperation(format!("{} already exists", rel)));
        }
        self.file_operation(FileOperation::Create {
            path: rel,
            content: content.to_string(),
        })
    }
}

fn unique<'s>(name: &str, found: impl Iterator<Item = Symbol<'s>>) -> Result<Symbol<'s>> {
    let mut found: Vec<Symbol<'s>> = found.collect();
    match found.len() {
        0 => Err(CodebaseError::SymbolNotFound(name.to_string())),
        1 => Ok(found.remove(0)),
        _ => Err(CodebaseError::AmbiguousSymbol {
            name: name.to_string(),
            candidates: found
                .iter()
                .map(|s| format!("{}:{}", s.file_path(), s.name()))
                .collect(),
        }),
    }
}

// ============================================================================
// Handles
// ============================================================================

macro_rules! handle_impls {
    ($handle:ident) => {
        impl fmt::Debug for $handle<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($handle))
                    .field("id", &self.node.id)
                    .field("name", &self.node.name())
                    .finish()
            }
        }

        impl PartialEq for $handle<'_> {
            fn eq(&self, other: &Self) -> bool {
                self.node.id == other.node.id
            }
        }

        impl Eq for $handle<'_> {}
    };
}

/// Any node, as a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeHandle<'s> {
    File(SourceFile<'s>),
    Symbol(Symbol<'s>),
    Import(Import<'s>),
    Export(Export<'s>),
    External(ExternalModule<'s>),
}

impl<'s> NodeHandle<'s> {
    pub fn node(&self) -> &'s Node {
        match self {
            NodeHandle::File(h) => h.node,
            NodeHandle::Symbol(h) => h.node,
            NodeHandle::Import(h) => h.node,
            NodeHandle::Export(h) => h.node,
            NodeHandle::External(h) => h.node,
        }
    }

    pub fn id(&self) -> NodeId {
        self.node().id
    }

    pub fn node_type(&self) -> NodeType {
        self.node().node_type()
    }

    pub fn name(&self) -> Option<&'s str> {
        self.node().name()
    }

    pub fn as_symbol(self) -> Option<Symbol<'s>> {
        match self {
            NodeHandle::Symbol(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_import(self) -> Option<Import<'s>> {
        match self {
            NodeHandle::Import(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_export(self) -> Option<Export<'s>> {
        match self {
            NodeHandle::Export(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_external(self) -> Option<ExternalModule<'s>> {
        match self {
            NodeHandle::External(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_file(self) -> Option<SourceFile<'s>> {
        match self {
            NodeHandle::File(h) => Some(h),
            _ => None,
        }
    }
}

/// Operations shared by every handle that maps to source text.
pub trait Editable<'s> {
    fn session(&self) -> &'s Session<'s>;

    fn node(&self) -> &'s Node;

    fn id(&self) -> NodeId {
        self.node().id
    }

    fn range(&self) -> ByteRange {
        self.node().range
    }

    fn generation(&self) -> u64 {
        self.node().generation
    }

    fn file_data(&self) -> Option<&'s FileData> {
        let file = self.node().file?;
        self.session().graph.node(file)?.as_file()
    }

    fn file(&self) -> Option<SourceFile<'s>> {
        self.node().file.and_then(|f| self.session().file_by_id(f))
    }

    fn file_path(&self) -> &'s str {
        self.file_data().map(|f| f.path.as_str()).unwrap_or_default()
    }

    /// Full content of the owning file.
    fn content(&self) -> &'s str {
        self.file_data().map(|f| &*f.content).unwrap_or_default()
    }

    /// Source text of this node.
    fn source(&self) -> &'s str {
        self.range().slice(self.content()).unwrap_or_default()
    }

    /// Replace this node's text.
    fn edit(&self, new_source: &str) -> Result<()> {
        self.session()
            .enqueue(self.file_path(), self.range(), new_source, TransactionKind::Replace)
    }

    /// Delete this node, whole lines included when it owns them.
    fn remove(&self) -> Result<()> {
        let range = removal_range(self.content(), self.range());
        self.session()
            .enqueue(self.file_path(), range, "", TransactionKind::Remove)
    }

    /// Insert `text` before this node, on its own lines at the node's
    /// indentation when the node owns its line.
    fn insert_before(&self, text: &str) -> Result<()> {
        let content = self.content();
        let range = self.range();
        let start = line_start(content, range.start);
        let prefix = content.get(start..range.start).unwrap_or_default();
        if prefix.trim().is_empty() {
            let block = indent_block(text, prefix);
            self.session().enqueue(
                self.file_path(),
                ByteRange::empty(start),
                format!("{}\n", block),
                TransactionKind::InsertBefore,
            )
        } else {
            self.session().enqueue(
                self.file_path(),
                ByteRange::empty(range.start),
                text,
                TransactionKind::InsertBefore,
            )
        }
    }

    /// Insert `text` after this node; see [`insert_before`](Self::insert_before).
    fn insert_after(&self, text: &str) -> Result<()> {
        let content = self.content();
        let range = self.range();
        let end = line_end(content, range.end);
        let rest = content.get(range.end..end).unwrap_or_default();
        if !rest.trim().is_empty() {
            return self.session().enqueue(
                self.file_path(),
                ByteRange::empty(range.end),
                text,
                TransactionKind::InsertAfter,
            );
        }
        let block = indent_block(text, line_indent(content, range.start));
        let text = if end == content.len() && (content.is_empty() || content.ends_with('\n')) {
            format!("{}\n", block)
        } else {
            format!("\n{}", block)
        };
        self.session().enqueue(
            self.file_path(),
            ByteRange::empty(end),
            text,
            TransactionKind::InsertAfter,
        )
    }
}

// ============================================================================
// Symbol
// ============================================================================

/// Class, function, variable or other definition.
#[derive(Clone, Copy)]
pub struct Symbol<'s> {
    session: &'s Session<'s>,
    node: &'s Node,
    data: &'s SymbolData,
}

handle_impls!(Symbol);

impl<'s> Editable<'s> for Symbol<'s> {
    fn session(&self) -> &'s Session<'s> {
        self.session
    }

    fn node(&self) -> &'s Node {
        self.node
    }
}

impl<'s> Symbol<'s> {
    pub fn data(&self) -> &'s SymbolData {
        self.data
    }

    pub fn name(&self) -> &'s str {
        &self.data.name
    }

    pub fn kind(&self) -> SymbolKind {
        self.data.kind
    }

    pub fn language(&self) -> Language {
        self.node.language
    }

    pub fn is_exported(&self) -> bool {
        self.data.is_exported
    }

    pub fn is_top_level(&self) -> bool {
        self.node.parent.is_none()
    }

    pub fn docstring(&self) -> Option<&'s str> {
        self.data.docstring.as_deref()
    }

    pub fn inline_comment(&self) -> Option<&'s str> {
        self.data.inline_comment.as_deref()
    }

    /// Enclosing symbol, if nested.
    pub fn parent(&self) -> Option<Symbol<'s>> {
        self.node.parent.and_then(|p| self.session.symbol(p))
    }

    /// Directly nested definitions.
    pub fn children(&self) -> Vec<Symbol<'s>> {
        self.data
            .children
            .iter()
            .filter_map(|id| self.session.symbol(*id))
            .collect()
    }

    pub fn methods(&self) -> Vec<Symbol<'s>> {
        self.children()
            .into_iter()
            .filter(|c| c.kind() == SymbolKind::Function)
            .collect()
    }

    /// Resolved superclasses and extended interfaces.
    pub fn superclasses(&self) -> Vec<NodeHandle<'s>> {
        self.session
            .graph
            .successors(self.node.id, Some(EdgeType::Subclass))
            .into_iter()
            .filter_map(|id| self.session.handle(id))
            .collect()
    }

    pub fn subclasses(&self) -> Vec<Symbol<'s>> {
        self.session
            .graph
            .predecessors(self.node.id, Some(EdgeType::Subclass))
            .into_iter()
            .filter_map(|id| self.session.symbol(id))
            .collect()
    }

    /// Definitions this symbol's code uses.
    pub fn dependencies(&self, mask: UsageKinds, max_depth: Option<usize>) -> Vec<NodeHandle<'s>> {
        resolver::dependencies(self.session.graph, self.node.id, mask, max_depth)
            .into_iter()
            .filter_map(|id| self.session.handle(id))
            .collect()
    }

    pub fn usages(&self, mask: UsageKinds, max_depth: Option<usize>) -> Vec<UsageRecord> {
        resolver::usages(self.session.graph, self.node.id, mask, max_depth)
    }

    /// Distinct nodes that use this symbol.
    pub fn symbol_usages(&self, mask: UsageKinds) -> Vec<NodeHandle<'s>> {
        resolver::symbol_usages(self.session.graph, self.node.id, mask)
            .into_iter()
            .filter_map(|id| self.session.handle(id))
            .collect()
    }

    /// Text from the start of the definition's first line to its end.
    fn definition_source(&self) -> &'s str {
        let content = self.content();
        let start = line_start(content, self.node.range.start);
        content.get(start..self.node.range.end).unwrap_or_default()
    }

    // ------------------------------------------------------------------------
    // Edits
    // ------------------------------------------------------------------------

    /// Rename the definition and every use that spells its name.
    pub fn rename(&self, new_name: &str) -> Result<()> {
        let old = self.name();
        if old == new_name {
            return Ok(());
        }
        let session = self.session;
        let graph = session.graph;
        session.enqueue(
            self.file_path(),
            self.data.name_range,
            new_name,
            TransactionKind::Replace,
        )?;

        let mut seen: BTreeSet<(&str, ByteRange)> = BTreeSet::new();
        for edge in graph.in_edges(self.node.id, Some(EdgeType::SymbolUsage)) {
            let Some(usage) = &edge.data.usage else {
                continue;
            };
            if usage.match_text != old {
                continue;
            }
            let Some(path) = graph
                .node(usage.file)
                .and_then(Node::as_file)
                .map(|f| f.path.as_str())
            else {
                continue;
            };
            if seen.insert((path, usage.match_range)) {
                session.enqueue(path, usage.match_range, new_name, TransactionKind::Replace)?;
            }
        }
        // export lists naming the symbol (`export { f }`, `export { f } from "./a"`)
        for export_id in graph.predecessors(self.node.id, Some(EdgeType::Export)) {
            let Some(export) = graph.node(export_id).and_then(Node::as_export) else {
                continue;
            };
            if export.declaration.is_some() || export.local_name.as_deref() != Some(old) {
                continue;
            }
            let (Some(range), Some(path)) = (export.local_range, graph.file_path_of(export_id)) else {
                continue;
            };
            if seen.insert((path, range)) {
                session.enqueue(path, range, new_name, TransactionKind::Replace)?;
            }
        }
        debug!(file = %self.file_path(), from = old, to = new_name, uses = seen.len(), "Queued rename");
        Ok(())
    }

    /// Add `name` to the superclass (or extended interface) list.
    pub fn add_superclass(&self, name: &str) -> Result<()> {
        if !self.data.kind.has_superclasses() {
            return Err(CodebaseError::InvalidOperation(format!(
                "{} is a {} and cannot have superclasses",
                self.name(),
                self.data.kind.as_str()
            )));
        }
        let session = self.session;
        let path = self.file_path();
        let content = self.content();
        let list = self.data.superclass_list_range;
        let list_text = list.and_then(|r| r.slice(content)).unwrap_or_default();

        match (self.node.language, self.data.kind, list) {
            (Language::Python, _, Some(list)) => {
                let inner = list_text.trim_start_matches('(').trim_end_matches(')');
                if inner.trim().is_empty() {
                    session.enqueue(path, list, format!("({})", name), TransactionKind::Replace)
                } else {
                    session.enqueue(
                        path,
                        ByteRange::empty(list.end - 1),
                        format!(", {}", name),
                        TransactionKind::InsertBefore,
                    )
                }
            }
            (Language::Python, _, None) => session.enqueue(
                path,
                ByteRange::empty(self.data.name_range.end),
                format!("({})", name),
                TransactionKind::InsertAfter,
            ),
            (Language::TypeScript, SymbolKind::Interface, Some(list)) => session.enqueue(
                path,
                ByteRange::empty(list.end),
                format!(", {}", name),
                TransactionKind::InsertAfter,
            ),
            (Language::TypeScript, SymbolKind::Class, Some(list)) => {
                if list_text.trim_start().starts_with("extends") {
                    return Err(CodebaseError::InvalidOperation(format!(
                        "{} already extends a class",
                        self.name()
                    )));
                }
                session.enqueue(
                    path,
                    ByteRange::empty(list.start),
                    format!("extends {} ", name),
                    TransactionKind::InsertBefore,
                )
            }
            (Language::TypeScript, _, _) => match self.data.body_range {
                Some(body) => session.enqueue(
                    path,
                    ByteRange::empty(body.start),
                    format!("extends {} ", name),
                    TransactionKind::InsertBefore,
                ),
                None => session.enqueue(
                    path,
                    ByteRange::empty(self.data.name_range.end),
                    format!(" extends {}", name),
                    TransactionKind::InsertAfter,
                ),
            },
        }
    }

    /// Move this top-level symbol into `target`.
    ///
    /// With `include_dependencies`, same-file top-level symbols it relies on
    /// travel with it. Imports the moved code needs are added to `target`;
    /// imports left unused in the source file are removed.
    pub fn move_to_file(
        &self,
        target: &SourceFile<'s>,
        include_dependencies: bool,
        strategy: MoveStrategy,
    ) -> Result<()> {
        let session = self.session;
        let graph = session.graph;
        if !self.is_top_level() {
            return Err(CodebaseError::InvalidOperation(format!(
                "{} is not a top-level symbol",
                self.name()
            )));
        }
        let source = self
            .file()
            .ok_or_else(|| CodebaseError::FileNotFound(self.file_path().to_string()))?;
        if source.id() == target.id() {
            return Ok(());
        }
        if source.language() != target.language() {
            return Err(CodebaseError::InvalidOperation(format!(
                "cannot move {} from {} into {}: languages differ",
                self.name(),
                source.path(),
                target.path()
            )));
        }
        let support = source.language().support();

        // Symbols that travel together
        let mut moving = vec![self.node.id];
        let mut moving_set = HashSet::from([self.node.id]);
        if include_dependencies {
            let mut queue = VecDeque::from([self.node.id]);
            while let Some(current) = queue.pop_front() {
                for dep in resolver::dependencies(graph, current, UsageKinds::ALL, None) {
                    let Some(node) = graph.node(dep) else {
                        continue;
                    };
                    if node.is_symbol()
                        && node.parent.is_none()
                        && node.file == self.node.file
                        && moving_set.insert(dep)
                    {
                        moving.push(dep);
                        queue.push_back(dep);
                    }
                }
            }
        }
        graph.sort_by_location(&mut moving);
        let inside_moving = |id: NodeId| moving.iter().any(|m| graph.is_within(id, *m));

        // Imports the moved code needs in its new home
        let mut used_imports: BTreeSet<NodeId> = BTreeSet::new();
        let mut needed: Vec<String> = Vec::new();
        for id in &moving {
            for dep in resolver::dependencies(graph, *id, UsageKinds::ALL, None) {
                let Some(node) = graph.node(dep) else {
                    continue;
                };
                if node.file != self.node.file || inside_moving(dep) {
                    continue;
                }
                match &node.data {
                    NodeData::Import(_) => {
                        used_imports.insert(dep);
                    }
                    NodeData::Symbol(symbol) if node.parent.is_none() => {
                        let module = support.module_specifier(target.path(), source.path());
                        needed.push(support.import_string(
                            &module,
                            Some(symbol.name.as_str()),
                            None,
                            false,
                        ));
                    }
                    _ => {}
                }
            }
        }
        for import in used_imports.iter().filter_map(|id| session.import(*id)) {
            if let Some(text) = import.render_for(target) {
                needed.push(text);
            }
        }

        for text in &needed {
            target.add_import_from_source(text)?;
        }
        for symbol in moving.iter().filter_map(|id| session.symbol(*id)) {
            target.add_symbol_from_source(symbol.definition_source())?;
        }
        for symbol in moving.iter().filter_map(|id| session.symbol(*id)) {
            symbol.remove()?;
        }

        // Importers elsewhere, and users left behind in the source file
        for symbol in moving.iter().filter_map(|id| session.symbol(*id)) {
            for importer in graph
                .predecessors(symbol.id(), Some(EdgeType::ImportSymbolResolution))
                .into_iter()
                .filter_map(|id| session.import(id))
            {
                let path = importer.file_path();
                if path == target.path() {
                    importer.remove()?;
                } else if path != source.path() && strategy == MoveStrategy::UpdateAllImports {
                    importer.repoint(target)?;
                }
            }

            let used_locally = graph
                .in_edges(symbol.id(), Some(EdgeType::SymbolUsage))
                .iter()
                .any(|edge| {
                    graph.node(edge.source).is_some_and(|n| n.file == self.node.file)
                        && !inside_moving(edge.source)
                });
            if used_locally || strategy == MoveStrategy::AddBackEdge {
                let module = support.module_specifier(source.path(), target.path());
                source.add_import_from_source(&support.import_string(
                    &module,
                    Some(symbol.name()),
                    None,
                    false,
                ))?;
            }
        }

        // Imports only the moved code used
        for import in used_imports.iter().filter_map(|id| session.import(*id)) {
            if import.is_dynamic() {
                continue;
            }
            let still_used = graph
                .in_edges(import.id(), Some(EdgeType::SymbolUsage))
                .iter()
                .any(|edge| !inside_moving(edge.source));
            if !still_used {
                import.remove()?;
            }
        }

        debug!(
            from = %source.path(),
            to = %target.path(),
            symbols = moving.len(),
            imports = needed.len(),
            "Queued move"
        );
        Ok(())
    }
}

// ============================================================================
// Import
// ============================================================================

/// One imported name.
#[derive(Clone, Copy)]
pub struct Import<'s> {
    session: &'s Session<'s>,
    node: &'s Node,
    data: &'s ImportData,
}

handle_impls!(Import);

impl<'s> Editable<'s> for Import<'s> {
    fn session(&self) -> &'s Session<'s> {
        self.session
    }

    fn node(&self) -> &'s Node {
        self.node
    }

    /// Remove this import. Removing one name of a multi-name statement
    /// rewrites the name list; once every name is gone the statement goes.
    ///
    /// Each successive removal from the same statement is queued at a
    /// higher priority so the latest rewrite wins over earlier ones.
    fn remove(&self) -> Result<()> {
        let session = self.session;
        let path = self.file_path();
        let content = self.content();
        let statement = self.data.statement_range;
        if self.node.range == statement {
            return session.enqueue(
                path,
                removal_range(content, statement),
                "",
                TransactionKind::Remove,
            );
        }

        let mut siblings: Vec<&Node> = self
            .file_data()
            .map(|f| {
                f.nodes
                    .iter()
                    .filter_map(|id| session.graph.node(*id))
                    .filter(|n| n.as_import().is_some_and(|i| i.statement_range == statement))
                    .collect()
            })
            .unwrap_or_default();
        siblings.sort_by_key(|n| n.range.start);
        let removed = {
            let mut removed = session.removed_specs.borrow_mut();
            let entry = removed.entry((path.to_string(), statement)).or_default();
            entry.insert(self.node.id);
            entry.clone()
        };
        let priority = removed.len() as i32;

        if siblings.iter().all(|n| removed.contains(&n.id)) {
            return session.enqueue_with_priority(
                path,
                removal_range(content, statement),
                "",
                priority,
                TransactionKind::Remove,
            );
        }

        // `{ a, b }` lists are rewritten apart from a default or namespace
        // binding sharing the statement
        let named = self.data.kind == ImportKind::Named;
        let group: Vec<&Node> = siblings
            .into_iter()
            .filter(|n| n.as_import().is_some_and(|i| (i.kind == ImportKind::Named) == named))
            .collect();
        if group.len() < 2 {
            return session.enqueue(
                path,
                spec_removal_range(content, self.node.range),
                "",
                TransactionKind::Remove,
            );
        }
        let span = ByteRange::new(group[0].range.start, group[group.len() - 1].range.end);
        let separator = content
            .get(group[0].range.end..group[1].range.start)
            .unwrap_or(", ");
        let kept: Vec<&str> = group
            .iter()
            .filter(|n| !removed.contains(&n.id))
            .filter_map(|n| n.range.slice(content))
            .collect();
        session.enqueue_with_priority(
            path,
            span,
            kept.join(separator),
            priority,
            TransactionKind::Replace,
        )
    }
}

impl<'s> Import<'s> {
    pub fn data(&self) -> &'s ImportData {
        self.data
    }

    pub fn module(&self) -> &'s str {
        &self.data.module
    }

    pub fn name(&self) -> Option<&'s str> {
        self.data.name.as_deref()
    }

    pub fn alias(&self) -> Option<&'s str> {
        self.data.alias.as_deref()
    }

    /// Name bound in the importing scope.
    pub fn local_name(&self) -> Option<&'s str> {
        self.data.local_name()
    }

    pub fn kind(&self) -> ImportKind {
        self.data.kind
    }

    pub fn is_dynamic(&self) -> bool {
        self.data.is_dynamic
    }

    pub fn is_type_only(&self) -> bool {
        self.data.is_type_only
    }

    pub fn is_wildcard(&self) -> bool {
        self.data.is_wildcard()
    }

    /// Text of the whole import statement.
    pub fn statement_source(&self) -> &'s str {
        self.data
            .statement_range
            .slice(self.content())
            .unwrap_or_default()
    }

    /// What this import resolved to: a symbol, a file, or an external.
    pub fn resolved(&self) -> Option<NodeHandle<'s>> {
        self.session
            .graph
            .successors(self.node.id, Some(EdgeType::ImportSymbolResolution))
            .first()
            .and_then(|id| self.session.handle(*id))
    }

    pub fn usages(&self) -> Vec<UsageRecord> {
        resolver::usages(self.session.graph, self.node.id, UsageKinds::NONE, None)
    }

    /// No code in the file refers to the imported name.
    pub fn is_unused(&self) -> bool {
        self.session
            .graph
            .in_degree(self.node.id, Some(EdgeType::SymbolUsage))
            == 0
    }

    /// Point the import at another module.
    pub fn set_module(&self, module: &str) -> Result<()> {
        let Some(range) = self.data.module_range else {
            return Err(CodebaseError::InvalidOperation(format!(
                "import in {} has no module to rewrite",
                self.file_path()
            )));
        };
        let current = range.slice(self.content()).unwrap_or_default();
        let text = if unquote(current) != current {
            // keep the original quote style
            let quote = &current[..1];
            format!("{}{}{}", quote, module, quote)
        } else {
            module.to_string()
        };
        self.session
            .enqueue(self.file_path(), range, text, TransactionKind::Replace)
    }

    /// Render this import for use from `target`, or `None` when it would
    /// resolve into `target` itself.
    fn render_for(&self, target: &SourceFile<'s>) -> Option<String> {
        let graph = self.session.graph;
        let data = self.data;
        let support = self.node.language.support();
        let resolved_file = graph
            .successors(self.node.id, Some(EdgeType::ImportSymbolResolution))
            .first()
            .and_then(|id| graph.file_path_of(*id));
        if resolved_file == Some(target.path()) {
            return None;
        }

        let module = if !data.module.starts_with('.') {
            data.module.clone()
        } else {
            match (self.node.language, resolved_file) {
                (Language::Python, _) => support.absolute_module(self.file_path(), &data.module),
                (Language::TypeScript, Some(file)) => support.module_specifier(target.path(), file),
                (Language::TypeScript, None) => data.module.clone(),
            }
        };
        Some(match data.kind {
            ImportKind::Named => support.import_string(
                &module,
                data.name.as_deref(),
                data.alias.as_deref(),
                data.is_type_only,
            ),
            ImportKind::Default => support.import_string(
                &module,
                Some("default"),
                data.name.as_deref(),
                data.is_type_only,
            ),
            ImportKind::Module | ImportKind::Namespace => {
                support.import_string(&module, None, data.alias.as_deref(), data.is_type_only)
            }
            ImportKind::SideEffect => support.import_string(&module, None, None, false),
            ImportKind::Wildcard => format!("from {} import *", module),
        })
    }

    /// Rewrite this import to take its name from `target`.
    fn repoint(&self, target: &SourceFile<'s>) -> Result<()> {
        let support = self.node.language.support();
        let module = support.module_specifier(self.file_path(), target.path());
        let data = self.data;
        let text = match data.kind {
            ImportKind::Default => support.import_string(
                &module,
                Some("default"),
                data.name.as_deref(),
                data.is_type_only,
            ),
            _ => support.import_string(
                &module,
                data.name.as_deref(),
                data.alias.as_deref(),
                data.is_type_only,
            ),
        };
        if self.node.range == data.statement_range {
            return self.session.enqueue(
                self.file_path(),
                data.statement_range,
                text,
                TransactionKind::Replace,
            );
        }
        self.remove()?;
        match self.file() {
            Some(file) => file.add_import_from_source(&text),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Export / External
// ============================================================================

/// One exported name.
#[derive(Clone, Copy)]
pub struct Export<'s> {
    session: &'s Session<'s>,
    node: &'s Node,
    data: &'s ExportData,
}

handle_impls!(Export);

impl<'s> Editable<'s> for Export<'s> {
    fn session(&self) -> &'s Session<'s> {
        self.session
    }

    fn node(&self) -> &'s Node {
        self.node
    }
}

impl<'s> Export<'s> {
    pub fn data(&self) -> &'s ExportData {
        self.data
    }

    pub fn kind(&self) -> ExportKind {
        self.data.kind
    }

    pub fn exported_name(&self) -> Option<&'s str> {
        self.data.exported_name.as_deref()
    }

    pub fn local_name(&self) -> Option<&'s str> {
        self.data.local_name.as_deref()
    }

    /// Source module of a re-export.
    pub fn module(&self) -> Option<&'s str> {
        self.data.module.as_deref()
    }

    /// Declaration exported in place (`export function f`).
    pub fn declaration(&self) -> Option<Symbol<'s>> {
        self.data.declaration.and_then(|id| self.session.symbol(id))
    }

    /// What the export resolved to.
    pub fn targets(&self) -> Vec<NodeHandle<'s>> {
        self.session
            .graph
            .successors(self.node.id, Some(EdgeType::Export))
            .into_iter()
            .filter_map(|id| self.session.handle(id))
            .collect()
    }
}

/// A name imported from outside the repository.
#[derive(Clone, Copy)]
pub struct ExternalModule<'s> {
    session: &'s Session<'s>,
    node: &'s Node,
    data: &'s ExternalData,
}

handle_impls!(ExternalModule);

impl<'s> ExternalModule<'s> {
    pub fn id(&self) -> NodeId {
        self.node.id
    }

    pub fn module(&self) -> &'s str {
        &self.data.module
    }

    /// Imported name, `*` for whole-module imports.
    pub fn name(&self) -> &'s str {
        &self.data.name
    }

    pub fn importers(&self) -> Vec<Import<'s>> {
        self.session
            .graph
            .predecessors(self.node.id, Some(EdgeType::ImportSymbolResolution))
            .into_iter()
            .filter_map(|id| self.session.import(id))
            .collect()
    }
}

// ============================================================================
// SourceFile
// ============================================================================

/// One indexed source file.
#[derive(Clone, Copy)]
pub struct SourceFile<'s> {
    session: &'s Session<'s>,
    node: &'s Node,
    data: &'s FileData,
}

handle_impls!(SourceFile);

impl<'s> Editable<'s> for SourceFile<'s> {
    fn session(&self) -> &'s Session<'s> {
        self.session
    }

    fn node(&self) -> &'s Node {
        self.node
    }

    fn file_data(&self) -> Option<&'s FileData> {
        Some(self.data)
    }

    /// Delete the file.
    fn remove(&self) -> Result<()> {
        self.session.file_operation(FileOperation::Delete {
            path: self.data.path.clone(),
        })
    }
}

impl<'s> SourceFile<'s> {
    pub fn data(&self) -> &'s FileData {
        self.data
    }

    pub fn path(&self) -> &'s str {
        &self.data.path
    }

    pub fn name(&self) -> &'s str {
        self.data.name()
    }

    pub fn language(&self) -> Language {
        self.node.language
    }

    pub fn hash(&self) -> &'s str {
        &self.data.hash
    }

    pub fn has_errors(&self) -> bool {
        self.data.has_errors
    }

    pub fn directory(&self) -> Option<DirectoryHandle<'s>> {
        self.session.directory(parent_dir(self.path()))
    }

    pub fn docstring(&self) -> Option<&'s str> {
        let raw = self.data.docstring_range?.slice(self.content())?;
        Some(unquote(raw).trim())
    }

    fn owned(&self) -> impl Iterator<Item = &'s Node> + 's {
        let graph = self.session.graph;
        self.data.nodes.iter().filter_map(move |id| graph.node(*id))
    }

    /// Top-level definitions, in source order.
    pub fn symbols(&self) -> Vec<Symbol<'s>> {
        let session = self.session;
        self.owned()
            .filter(|n| n.is_symbol() && n.parent.is_none())
            .filter_map(|n| session.symbol(n.id))
            .collect()
    }

    pub fn functions(&self) -> Vec<Symbol<'s>> {
        self.symbols()
            .into_iter()
            .filter(|s| s.kind() == SymbolKind::Function)
            .collect()
    }

    pub fn classes(&self) -> Vec<Symbol<'s>> {
        self.symbols()
            .into_iter()
            .filter(|s| s.kind() == SymbolKind::Class)
            .collect()
    }

    /// Every import in the file, nested ones included.
    pub fn imports(&self) -> Vec<Import<'s>> {
        let session = self.session;
        self.owned()
            .filter(|n| n.is_import())
            .filter_map(|n| session.import(n.id))
            .collect()
    }

    pub fn exports(&self) -> Vec<Export<'s>> {
        let session = self.session;
        self.owned()
            .filter(|n| n.is_export())
            .filter_map(|n| session.export(n.id))
            .collect()
    }

    pub fn get_symbol(&self, name: &str) -> Result<Symbol<'s>> {
        unique(name, self.symbols().into_iter().filter(|s| s.name() == name))
    }

    pub fn get_function(&self, name: &str) -> Result<Symbol<'s>> {
        unique(
            name,
            self.functions().into_iter().filter(|s| s.name() == name),
        )
    }

    pub fn get_class(&self, name: &str) -> Result<Symbol<'s>> {
        unique(name, self.classes().into_iter().filter(|s| s.name() == name))
    }

    /// Import binding `local_name`.
    pub fn get_import(&self, local_name: &str) -> Option<Import<'s>> {
        self.imports()
            .into_iter()
            .find(|i| i.local_name() == Some(local_name))
    }

    /// Imports elsewhere that resolve to this file as a module.
    pub fn importers(&self) -> Vec<Import<'s>> {
        self.session
            .graph
            .predecessors(self.node.id, Some(EdgeType::ImportSymbolResolution))
            .into_iter()
            .filter_map(|id| self.session.import(id))
            .collect()
    }

    fn top_level_imports(&self) -> Vec<Import<'s>> {
        self.imports()
            .into_iter()
            .filter(|i| i.node.parent.is_none() && !i.is_dynamic())
            .collect()
    }

    /// First statement that is not the module docstring.
    fn first_code_statement(&self) -> Option<ByteRange> {
        let mut statements = self.data.statements.clone();
        statements.sort();
        statements
            .into_iter()
            .find(|s| Some(*s) != self.data.docstring_range)
    }

    // ------------------------------------------------------------------------
    // Edits
    // ------------------------------------------------------------------------

    /// Add an import statement unless an identical one is already present.
    ///
    /// Goes after the last top-level import, or before the first statement
    /// when there are none. Leading imports (`__future__`) go first.
    pub fn add_import_from_source(&self, import: &str) -> Result<()> {
        let text = import.trim();
        if text.is_empty() {
            return Ok(());
        }
        let session = self.session;
        let path = self.path();
        let content = self.content();
        let imports = self.top_level_imports();
        if imports.iter().any(|i| i.statement_source().trim() == text) {
            return Ok(());
        }
        if !session
            .added_imports
            .borrow_mut()
            .insert((path.to_string(), text.to_string()))
        {
            return Ok(());
        }

        let support = self.language().support();
        let first_statement = self.first_code_statement();
        if support.is_leading_import_source(text) {
            let anchor = imports
                .first()
                .map(|i| i.data.statement_range)
                .or(first_statement);
            if let Some(anchor) = anchor {
                return session.enqueue(
                    path,
                    ByteRange::empty(line_start(content, anchor.start)),
                    format!("{}\n", text),
                    TransactionKind::InsertBefore,
                );
            }
        }
        if let Some(last) = imports.iter().map(|i| i.data.statement_range.end).max() {
            // next line start stays outside a removal of the last import line
            let end = line_end(content, last);
            if end < content.len() {
                return session.enqueue(
                    path,
                    ByteRange::empty(end + 1),
                    format!("{}\n", text),
                    TransactionKind::InsertBefore,
                );
            }
            return session.enqueue(
                path,
                ByteRange::empty(end),
                format!("\n{}", text),
                TransactionKind::InsertAfter,
            );
        }
        if let Some(first) = first_statement {
            return session.enqueue(
                path,
                ByteRange::empty(line_start(content, first.start)),
                format!("{}\n", text),
                TransactionKind::InsertBefore,
            );
        }
        if let Some(doc) = self.data.docstring_range {
            return session.enqueue(
                path,
                ByteRange::empty(line_end(content, doc.end)),
                format!("\n{}", text),
                TransactionKind::InsertAfter,
            );
        }
        let text = if content.is_empty() || content.ends_with('\n') {
            format!("{}\n", text)
        } else {
            format!("\n{}\n", text)
        };
        session.enqueue(
            path,
            ByteRange::empty(content.len()),
            text,
            TransactionKind::InsertAfter,
        )
    }

    /// Replace an arbitrary byte range of this file.
    pub fn edit_range(&self, range: ByteRange, new_source: &str) -> Result<()> {
        self.session
            .enqueue(self.path(), range, new_source, TransactionKind::Replace)
    }

    /// Import `symbol` into this file.
    pub fn add_symbol_import(&self, symbol: &Symbol<'_>, alias: Option<&str>) -> Result<()> {
        let support = self.language().support();
        let module = support.module_specifier(self.path(), symbol.file_path());
        self.add_import_from_source(&support.import_string(&module, Some(symbol.name()), alias, false))
    }

    /// Append a definition at the end of the file.
    pub fn add_symbol_from_source(&self, source: &str) -> Result<()> {
        let session = self.session;
        let path = self.path();
        let content = self.content();
        let separator = match self.language() {
            Language::Python => "\n\n",
            Language::TypeScript => "\n",
        };
        let body = format!("{}\n", source.trim_end());

        let text = if content.trim().is_empty() {
            let imported = session
                .added_imports
                .borrow()
                .iter()
                .any(|(p, _)| p == path);
            if imported {
                format!("{}{}", separator, body)
            } else {
                body
            }
        } else if content.ends_with('\n') {
            format!("{}{}", separator, body)
        } else {
            format!("\n{}{}", separator, body)
        };
        session.enqueue(
            path,
            ByteRange::empty(content.len()),
            text,
            TransactionKind::InsertAfter,
        )
    }

    /// Move `symbol` from this file into `target`.
    pub fn move_symbol(
        &self,
        symbol: &Symbol<'s>,
        target: &SourceFile<'s>,
        strategy: MoveStrategy,
    ) -> Result<()> {
        if symbol.node.file != Some(self.node.id) {
            return Err(CodebaseError::InvalidOperation(format!(
                "{} is not defined in {}",
                symbol.name(),
                self.path()
            )));
        }
        symbol.move_to_file(target, false, strategy)
    }

    /// Move the file to `new_path`.
    pub fn rename(&self, new_path: &str) -> Result<()> {
        let to = self.session.io.normalize(new_path)?;
        if to == self.data.path {
            return Ok(());
        }
        self.session.file_operation(FileOperation::Rename {
            from: self.data.path.clone(),
            to,
        })
    }
}

// ============================================================================
// Directory
// ============================================================================

/// A directory holding indexed files.
#[derive(Clone, Copy)]
pub struct DirectoryHandle<'s> {
    session: &'s Session<'s>,
    dir: &'s Directory,
}

impl fmt::Debug for DirectoryHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryHandle")
            .field("path", &self.dir.path)
            .finish()
    }
}

impl<'s> DirectoryHandle<'s> {
    pub fn path(&self) -> &'s str {
        &self.dir.path
    }

    pub fn name(&self) -> &'s str {
        self.dir.name()
    }

    /// Files directly in this directory.
    pub fn files(&self) -> Vec<SourceFile<'s>> {
        self.dir
            .files
            .values()
            .filter_map(|id| self.session.file_by_id(*id))
            .collect()
    }

    pub fn subdirectories(&self) -> Vec<DirectoryHandle<'s>> {
        self.dir
            .subdirectories
            .iter()
            .filter_map(|p| self.session.directory(p))
            .collect()
    }

    pub fn parent(&self) -> Option<DirectoryHandle<'s>> {
        self.dir.parent_path().and_then(|p| self.session.directory(p))
    }

    /// File directly in this directory, by file name.
    pub fn get_file(&self, name: &str) -> Option<SourceFile<'s>> {
        self.files().into_iter().find(|f| f.name() == name)
    }

    /// Delete every file under this directory.
    pub fn remove(&self) -> Result<()> {
        for (path, _) in self.session.graph.directories().files_under(&self.dir.path) {
            self.session
                .file_operation(FileOperation::Delete { path })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolverOptions;
    use crate::sync::{build, SyncSettings};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        io: FileIo,
        graph: CodebaseGraph,
    }

    impl Fixture {
        fn new(files: &[(&str, &str)]) -> Self {
            let dir = TempDir::new().unwrap();
            for (path, content) in files {
                let full = dir.path().join(path);
                std::fs::create_dir_all(full.parent().unwrap()).unwrap();
                std::fs::write(full, content).unwrap();
            }
            let io = FileIo::new(dir.path());
            let mut graph = CodebaseGraph::new(true, false);
            let options = ResolverOptions {
                method_usages: true,
                generics: true,
                overrides: Default::default(),
            };
            let settings = SyncSettings {
                resolver: &options,
                languages: &Language::ALL,
                ignore_process_errors: false,
            };
            let paths = files.iter().map(|(p, _)| p.to_string()).collect();
            build(&mut graph, &io, paths, &settings).unwrap();
            Fixture { dir, io, graph }
        }

        /// Run `edit` in a session and commit it.
        fn apply(&mut self, edit: impl FnOnce(&Session<'_>) -> Result<()>) {
            let mut tx = {
                let session = Session::new(&self.graph, &self.io, &SessionOptions::default());
                edit(&session).unwrap();
                session.into_transactions()
            };
            tx.commit(&mut self.io, true).unwrap();
        }

        fn read(&self, path: &str) -> String {
            std::fs::read_to_string(self.dir.path().join(path)).unwrap()
        }
    }

    #[test]
    fn test_removal_range_takes_whole_lines() {
        let content = "a = 1\n    b = 2\nc = 3\n";
        assert_eq!(removal_range(content, ByteRange::new(10, 15)), ByteRange::new(6, 16));
        assert_eq!(removal_range(content, ByteRange::new(0, 1)), ByteRange::new(0, 1));
        assert_eq!(indent_block("x\n\ny", "  "), "  x\n\n  y");
    }

    #[test]
    fn test_spec_removal_range_takes_a_comma() {
        let content = "from a import b, c, d\n";
        assert_eq!(spec_removal_range(content, ByteRange::new(14, 15)), ByteRange::new(14, 17));
        assert_eq!(spec_removal_range(content, ByteRange::new(20, 21)), ByteRange::new(18, 21));
    }

    #[test]
    fn test_rename_updates_importers() {
        let mut fx = Fixture::new(&[
            ("a.py", "def f():\n    return 1\n"),
            ("b.py", "from a import f\n\nprint(f())\n"),
        ]);
        fx.apply(|s| s.get_function("f")?.rename("g"));
        assert_eq!(fx.read("a.py"), "def g():\n    return 1\n");
        assert_eq!(fx.read("b.py"), "from a import g\n\nprint(g())\n");
    }

    #[test]
    fn test_removing_every_name_removes_the_statement() {
        let mut fx = Fixture::new(&[
            ("a.py", "def f():\n    pass\n\ndef g():\n    pass\n"),
            ("b.py", "from a import f, g\nx = 1\n"),
        ]);
        fx.apply(|s| s.get_file("b.py")?.get_import("f").unwrap().remove());
        assert_eq!(fx.read("b.py"), "from a import g\nx = 1\n");

        let mut fx = Fixture::new(&[
            ("a.py", "def f():\n    pass\n\ndef g():\n    pass\n"),
            ("b.py", "from a import f, g\nx = 1\n"),
        ]);
        fx.apply(|s| {
            let file = s.get_file("b.py")?;
            for import in file.imports() {
                import.remove()?;
            }
            Ok(())
        });
        assert_eq!(fx.read("b.py"), "x = 1\n");
    }

    #[test]
    fn test_add_import_placement() {
        let mut fx = Fixture::new(&[(
            "m.py",
            "\"\"\"Doc.\"\"\"\nimport os\n\nx = os.sep\n",
        )]);
        fx.apply(|s| {
            let file = s.get_file("m.py")?;
            file.add_import_from_source("import sys")?;
            file.add_import_from_source("import os")?;
            file.add_import_from_source("from __future__ import annotations")
        });
        assert_eq!(
            fx.read("m.py"),
            "\"\"\"Doc.\"\"\"\nfrom __future__ import annotations\nimport os\nimport sys\n\nx = os.sep\n"
        );
    }

    #[test]
    fn test_add_superclass_python() {
        let mut fx = Fixture::new(&[(
            "m.py",
            "class A:\n    pass\n\nclass B(A):\n    pass\n\nclass C():\n    pass\n",
        )]);
        fx.apply(|s| {
            s.get_class("A")?.add_superclass("Base")?;
            s.get_class("B")?.add_superclass("Mixin")?;
            s.get_class("C")?.add_superclass("A")
        });
        assert_eq!(
            fx.read("m.py"),
            "class A(Base):\n    pass\n\nclass B(A, Mixin):\n    pass\n\nclass C(A):\n    pass\n"
        );
    }

    #[test]
    fn test_get_symbol_reports_ambiguity() {
        let fx = Fixture::new(&[("a.py", "def f():\n    pass\n"), ("b.py", "def f():\n    pass\n")]);
        let session = Session::new(&fx.graph, &fx.io, &SessionOptions::default());
        match session.get_symbol("f") {
            Err(CodebaseError::AmbiguousSymbol { candidates, .. }) => {
                assert_eq!(candidates, vec!["a.py:f".to_string(), "b.py:f".to_string()]);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
        assert!(matches!(
            session.get_symbol("missing"),
            Err(CodebaseError::SymbolNotFound(_))
        ));
        assert_eq!(session.get_file("a.py").unwrap().get_symbol("f").unwrap().name(), "f");
    }

    #[test]
    fn test_insert_after_method_keeps_indentation() {
        let mut fx = Fixture::new(&[("m.py", "class A:\n    def run(self):\n        pass\n")]);
        fx.apply(|s| {
            let class = s.get_class("A")?;
            class.methods()[0].insert_after("def stop(self):\n    pass")
        });
        assert_eq!(
            fx.read("m.py"),
            "class A:\n    def run(self):\n        pass\n    def stop(self):\n        pass\n"
        );
    }

    #[test]
    fn test_move_updates_importers() {
        let mut fx = Fixture::new(&[
            ("a.py", "import os\n\ndef f():\n    return os.sep\n\nx = 1\n"),
            ("b.py", "x = 2\n"),
            ("c.py", "from a import f\n\nf()\n"),
        ]);
        fx.apply(|s| {
            let target = s.get_file("b.py")?;
            s.get_function("f")?
                .move_to_file(&target, false, MoveStrategy::UpdateAllImports)
        });
        assert_eq!(fx.read("a.py"), "\nx = 1\n");
        assert_eq!(
            fx.read("b.py"),
            "import os\nx = 2\n\n\ndef f():\n    return os.sep\n"
        );
        assert_eq!(fx.read("c.py"), "from b import f\n\nf()\n");
    }
}
