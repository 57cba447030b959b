//! Codebase graph store.
//!
//! A directed multigraph of [`Node`]s and typed edges, backed by
//! `petgraph::StableGraph` so removals never invalidate other indices.
//! Nodes are addressed by their own [`NodeId`]; the petgraph index is an
//! internal detail.
//!
//! The store also owns the lookup indices the resolver and the editable
//! surface need: path → FILE node, `"module::name"` → EXTERNAL node, an
//! optional `(file, start, end)` → node index, the directory tree, and the
//! path-watch index that tells incremental sync which nodes must be
//! re-resolved when a path changes.
//!
//! ## Usage
//!
//! ```ignore
//! let mut graph = CodebaseGraph::new(false, false);
//! graph.insert_file(parsed)?;
//! for target in graph.successors(id, Some(EdgeType::SymbolUsage)) {
//!     println!("{:?}", graph.node(target).and_then(|n| n.name()));
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::{BitOr, BitOrAssign};

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::directory::DirectoryTree;
use crate::language::Language;
use crate::node::{external_key, ExternalData, Node, NodeData, NodeId, NodeType};
use crate::parser::ParsedFile;
use crate::syntax::ByteRange;

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by the graph store.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("node already exists: {0}")]
    DuplicateNode(NodeId),

    #[error("file already indexed: {0}")]
    DuplicateFile(String),

    /// A public mutation was attempted while a sync is running
    #[error("graph mutation rejected during sync: {0}")]
    MutationDuringSync(String),
}

pub type Result<T> = std::result::Result<T, GraphError>;

// ============================================================================
// Edge types
// ============================================================================

/// Types of edges in the codebase graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    /// Import → resolved symbol, file or external module
    ImportSymbolResolution,
    /// Export → exported target
    Export,
    /// Class → superclass
    Subclass,
    /// User → used definition
    SymbolUsage,
}

impl EdgeType {
    /// Every edge type the resolver computes.
    pub const RESOLVER_OWNED: [EdgeType; 4] = [
        EdgeType::ImportSymbolResolution,
        EdgeType::Export,
        EdgeType::Subclass,
        EdgeType::SymbolUsage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::ImportSymbolResolution => "IMPORT_SYMBOL_RESOLUTION",
            EdgeType::Export => "EXPORT",
            EdgeType::Subclass => "SUBCLASS",
            EdgeType::SymbolUsage => "SYMBOL_USAGE",
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a usage reaches its target.
///
/// The first four kinds describe resolution, the last four the syntactic
/// position of the use site. A usage edge carries one of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UsageKind {
    /// Name bound in scope
    Direct,
    /// Attribute of a module or class (`mod.f`, `self.m`)
    Chained,
    /// Through an import, to the symbol it resolves to
    Indirect,
    /// Through an aliased import
    Aliased,
    /// Type annotation
    Typed,
    /// Ordinary expression
    Body,
    /// Return type annotation
    Return,
    /// Decorator
    Decorator,
}

impl UsageKind {
    pub const ALL: [UsageKind; 8] = [
        UsageKind::Direct,
        UsageKind::Chained,
        UsageKind::Indirect,
        UsageKind::Aliased,
        UsageKind::Typed,
        UsageKind::Body,
        UsageKind::Return,
        UsageKind::Decorator,
    ];

    fn bit(&self) -> u8 {
        1 << (*self as u8)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UsageKind::Direct => "DIRECT",
            UsageKind::Chained => "CHAINED",
            UsageKind::Indirect => "INDIRECT",
            UsageKind::Aliased => "ALIASED",
            UsageKind::Typed => "TYPED",
            UsageKind::Body => "BODY",
            UsageKind::Return => "RETURN",
            UsageKind::Decorator => "DECORATOR",
        }
    }
}

/// A set of [`UsageKind`]s, used both on edges and as a query mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "Vec<UsageKind>", into = "Vec<UsageKind>")]
pub struct UsageKinds(u8);

impl UsageKinds {
    pub const NONE: UsageKinds = UsageKinds(0);
    pub const DIRECT: UsageKinds = UsageKinds(1 << UsageKind::Direct as u8);
    pub const CHAINED: UsageKinds = UsageKinds(1 << UsageKind::Chained as u8);
    pub const INDIRECT: UsageKinds = UsageKinds(1 << UsageKind::Indirect as u8);
    pub const ALIASED: UsageKinds = UsageKinds(1 << UsageKind::Aliased as u8);
    pub const TYPED: UsageKinds = UsageKinds(1 << UsageKind::Typed as u8);
    pub const BODY: UsageKinds = UsageKinds(1 << UsageKind::Body as u8);
    pub const RETURN: UsageKinds = UsageKinds(1 << UsageKind::Return as u8);
    pub const DECORATOR: UsageKinds = UsageKinds(1 << UsageKind::Decorator as u8);

    /// Every resolution kind.
    pub const RESOLUTION: UsageKinds = UsageKinds(0b0000_1111);
    /// Every position kind.
    pub const POSITION: UsageKinds = UsageKinds(0b1111_0000);
    pub const ALL: UsageKinds = UsageKinds(0xff);

    pub fn contains(&self, other: UsageKinds) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(&self, other: UsageKinds) -> bool {
        self.0 & other.0 != 0
    }

    pub fn has(&self, kind: UsageKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Kinds in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = UsageKind> + '_ {
        UsageKind::ALL.into_iter().filter(move |k| self.has(*k))
    }

    /// Whether an edge with these kinds passes a query `mask`.
    ///
    /// The resolution and position halves are matched separately; a mask
    /// that names no kinds of one half places no constraint on it.
    pub fn matches(&self, mask: UsageKinds) -> bool {
        let resolution = mask.0 & Self::RESOLUTION.0;
        let position = mask.0 & Self::POSITION.0;
        (resolution == 0 || self.0 & resolution != 0) && (position == 0 || self.0 & position != 0)
    }
}

impl From<UsageKind> for UsageKinds {
    fn from(kind: UsageKind) -> Self {
        UsageKinds(kind.bit())
    }
}

impl From<Vec<UsageKind>> for UsageKinds {
    fn from(kinds: Vec<UsageKind>) -> Self {
        kinds.into_iter().fold(UsageKinds::NONE, |acc, k| acc | k)
    }
}

impl From<UsageKinds> for Vec<UsageKind> {
    fn from(kinds: UsageKinds) -> Self {
        kinds.iter().collect()
    }
}

impl BitOr for UsageKinds {
    type Output = UsageKinds;

    fn bitor(self, rhs: UsageKinds) -> UsageKinds {
        UsageKinds(self.0 | rhs.0)
    }
}

impl BitOr<UsageKind> for UsageKinds {
    type Output = UsageKinds;

    fn bitor(self, rhs: UsageKind) -> UsageKinds {
        UsageKinds(self.0 | rhs.bit())
    }
}

impl BitOrAssign for UsageKinds {
    fn bitor_assign(&mut self, rhs: UsageKinds) {
        self.0 |= rhs.0;
    }
}

/// Where and how a usage edge matched its source text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Usage {
    pub kinds: UsageKinds,
    /// Range of the matched identifier in `file`
    pub match_range: ByteRange,
    pub match_text: String,
    /// File containing the match
    pub file: NodeId,
}

/// Data stored on edges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeData {
    pub edge_type: EdgeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl EdgeData {
    pub fn plain(edge_type: EdgeType) -> Self {
        Self {
            edge_type,
            usage: None,
        }
    }

    pub fn usage(usage: Usage) -> Self {
        Self {
            edge_type: EdgeType::SymbolUsage,
            usage: Some(usage),
        }
    }
}

/// A borrowed edge with its endpoints.
#[derive(Debug, Clone, Copy)]
pub struct EdgeView<'a> {
    pub source: NodeId,
    pub target: NodeId,
    pub data: &'a EdgeData,
}

/// Node and edge counts by type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub files: usize,
    pub directories: usize,
    pub nodes: BTreeMap<NodeType, usize>,
    pub edges: BTreeMap<EdgeType, usize>,
    pub generation: u64,
}

// ============================================================================
// CodebaseGraph
// ============================================================================

/// The codebase graph.
#[derive(Debug, Clone, Default)]
pub struct CodebaseGraph {
    graph: StableGraph<Node, EdgeData, petgraph::Directed>,

    /// Map from node id to petgraph index for O(1) lookup
    index: HashMap<NodeId, NodeIndex>,

    /// Repository-relative path → FILE node
    files: BTreeMap<String, NodeId>,

    /// `"module::name"` → EXTERNAL node
    externals: BTreeMap<String, NodeId>,

    /// `(file, start, end)` → first node created with that range
    range_index: Option<HashMap<(NodeId, usize, usize), NodeId>>,

    directories: DirectoryTree,

    /// Path → nodes whose resolution looked up that path
    watchers: HashMap<String, BTreeSet<NodeId>>,

    /// Node → paths it watches
    watched: HashMap<NodeId, Vec<String>>,

    computing: bool,

    /// Reject (rather than warn about) mutations during sync, and report
    /// duplicate edges
    strict: bool,

    generation: u64,
}

impl CodebaseGraph {
    /// Create an empty graph.
    pub fn new(strict: bool, full_range_index: bool) -> Self {
        Self {
            strict,
            range_index: full_range_index.then(HashMap::new),
            ..Default::default()
        }
    }

    /// Last completed sync generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    // ------------------------------------------------------------------------
    // Sync state
    // ------------------------------------------------------------------------

    /// Whether a sync is currently running.
    pub fn is_computing(&self) -> bool {
        self.computing
    }

    pub(crate) fn begin_sync(&mut self) {
        self.computing = true;
    }

    pub(crate) fn end_sync(&mut self) {
        self.computing = false;
    }

    fn guard_mutation(&self, operation: &str) -> Result<()> {
        if !self.computing {
            return Ok(());
        }
        if self.strict || cfg!(debug_assertions) {
            return Err(GraphError::MutationDuringSync(operation.to_string()));
        }
        warn!(operation, "Graph mutated while a sync is running");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Node Operations
    // ------------------------------------------------------------------------

    /// Add a node, returning its id.
    pub fn add_node(&mut self, node: Node) -> Result<NodeId> {
        self.guard_mutation("add_node")?;
        self.insert_node(node)
    }

    /// Remove a node and its incident edges. Removing a FILE node removes
    /// every node it owns.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node> {
        self.guard_mutation("remove_node")?;
        self.delete_node(id)
    }

    pub(crate) fn insert_node(&mut self, node: Node) -> Result<NodeId> {
        let id = node.id;
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id));
        }
        match &node.data {
            NodeData::File(file) => {
                if self.files.contains_key(&file.path) {
                    return Err(GraphError::DuplicateFile(file.path.clone()));
                }
                self.files.insert(file.path.clone(), id);
            }
            NodeData::External(ext) => {
                self.externals.insert(ext.key(), id);
            }
            _ => {}
        }
        if let (Some(index), Some(file)) = (self.range_index.as_mut(), node.file) {
            index
                .entry((file, node.range.start, node.range.end))
                .or_insert(id);
        }
        let idx = self.graph.add_node(node);
        self.index.insert(id, idx);
        Ok(id)
    }

    pub(crate) fn delete_node(&mut self, id: NodeId) -> Result<Node> {
        let idx = self.index.get(&id).copied().ok_or(GraphError::NodeNotFound(id))?;

        let owned: Vec<NodeId> = self
            .graph
            .node_weight(idx)
            .and_then(|n| n.as_file())
            .map(|f| f.nodes.clone())
            .unwrap_or_default();
        for child in owned {
            if self.index.contains_key(&child) {
                self.delete_node(child)?;
            }
        }

        self.index.remove(&id);
        self.unwatch(id);
        let node = self.graph.remove_node(idx).ok_or(GraphError::NodeNotFound(id))?;
        match &node.data {
            NodeData::File(file) => {
                self.files.remove(&file.path);
            }
            NodeData::External(ext) => {
                self.externals.remove(&ext.key());
            }
            _ => {}
        }
        if let (Some(index), Some(file)) = (self.range_index.as_mut(), node.file) {
            let key = (file, node.range.start, node.range.end);
            if index.get(&key) == Some(&id) {
                index.remove(&key);
            }
        }
        Ok(node)
    }

    /// Merge a parsed file subtree into the graph.
    pub(crate) fn insert_file(&mut self, parsed: ParsedFile) -> Result<NodeId> {
        let ParsedFile { file, nodes } = parsed;
        let id = self.insert_node(file)?;
        for node in nodes {
            self.insert_node(node)?;
        }
        Ok(id)
    }

    /// Intern an EXTERNAL node for `module::name`.
    pub(crate) fn get_or_create_external(
        &mut self,
        language: Language,
        module: &str,
        name: &str,
    ) -> NodeId {
        if let Some(id) = self.externals.get(&external_key(module, name)) {
            return *id;
        }
        let id = NodeId::next();
        let node = Node {
            id,
            language,
            range: ByteRange::default(),
            ts_kind: "external",
            file: None,
            parent: None,
            generation: self.generation,
            data: NodeData::External(ExternalData {
                module: module.to_string(),
                name: name.to_string(),
            }),
        };
        let idx = self.graph.add_node(node);
        self.index.insert(id, idx);
        self.externals.insert(external_key(module, name), id);
        id
    }

    /// Get a node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.index.get(&id).and_then(|&idx| self.graph.node_weight(idx))
    }

    /// Get a node by id or fail.
    pub fn require(&self, id: NodeId) -> Result<&Node> {
        self.node(id).ok_or(GraphError::NodeNotFound(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// FILE node for a repository-relative path.
    pub fn file_id(&self, path: &str) -> Option<NodeId> {
        self.files.get(path).copied()
    }

    pub fn file(&self, path: &str) -> Option<&Node> {
        self.file_id(path).and_then(|id| self.node(id))
    }

    /// Indexed file paths in order.
    pub fn file_paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// FILE nodes in path order.
    pub fn files(&self) -> impl Iterator<Item = &Node> {
        self.files.values().filter_map(|id| self.node(*id))
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// EXTERNAL node for `module::name`.
    pub fn external(&self, module: &str, name: &str) -> Option<NodeId> {
        self.externals.get(&external_key(module, name)).copied()
    }

    /// EXTERNAL nodes in key order.
    pub fn externals(&self) -> impl Iterator<Item = &Node> {
        self.externals.values().filter_map(|id| self.node(*id))
    }

    /// Nodes of one type, lazily: files in path order (each followed by
    /// its owned nodes in source order), then externals.
    pub fn nodes_of_type(&self, node_type: NodeType) -> impl Iterator<Item = &Node> + '_ {
        let owned = self.files().flat_map(move |file| {
            let nodes = file.as_file().map(|f| f.nodes.as_slice()).unwrap_or(&[]);
            std::iter::once(file).chain(nodes.iter().filter_map(move |id| self.node(*id)))
        });
        owned
            .chain(self.externals())
            .filter(move |n| n.node_type() == node_type)
    }

    /// Every node: files in path order with their owned nodes, then externals.
    pub fn iter_nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.files()
            .flat_map(move |file| {
                let nodes = file.as_file().map(|f| f.nodes.as_slice()).unwrap_or(&[]);
                std::iter::once(file).chain(nodes.iter().filter_map(move |id| self.node(*id)))
            })
            .chain(self.externals())
    }

    /// Node created at exactly `range` in `file`, if the range index is on.
    pub fn node_at(&self, file: NodeId, range: ByteRange) -> Option<NodeId> {
        if let Some(index) = &self.range_index {
            return index.get(&(file, range.start, range.end)).copied();
        }
        let file_node = self.node(file)?.as_file()?;
        file_node
            .nodes
            .iter()
            .copied()
            .find(|id| self.node(*id).is_some_and(|n| n.range == range))
    }

    /// Path of a node's owning file.
    pub fn file_path_of(&self, id: NodeId) -> Option<&str> {
        let file = self.node(id)?.file?;
        self.node(file)?.as_file().map(|f| f.path.as_str())
    }

    /// Enclosing nodes from the direct parent outward (files excluded).
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.node(id).and_then(|n| n.parent);
        while let Some(parent) = current {
            out.push(parent);
            current = self.node(parent).and_then(|n| n.parent);
        }
        out
    }

    /// Whether `node` is `ancestor` or nested inside it.
    pub fn is_within(&self, node: NodeId, ancestor: NodeId) -> bool {
        node == ancestor || self.ancestors(node).contains(&ancestor)
    }

    /// Sort key placing nodes by file path, then start offset, then id.
    /// Externals sort last.
    pub fn location_key(&self, id: NodeId) -> (bool, String, usize, NodeId) {
        match self.node(id) {
            Some(node) if !node.is_external() => (
                false,
                self.file_path_of(id).unwrap_or("").to_string(),
                node.range.start,
                id,
            ),
            _ => (true, String::new(), 0, id),
        }
    }

    /// Sort ids by location and drop duplicates.
    pub fn sort_by_location(&self, ids: &mut Vec<NodeId>) {
        ids.sort_by_cached_key(|id| self.location_key(*id));
        ids.dedup();
    }

    // ------------------------------------------------------------------------
    // Edge Operations
    // ------------------------------------------------------------------------

    /// Add an edge. Returns `false` if an identical edge already existed.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, data: EdgeData) -> Result<bool> {
        self.guard_mutation("add_edge")?;
        self.insert_edge(source, target, data)
    }

    /// Remove every edge of `edge_type` from `source` to `target`.
    pub fn remove_edge(&mut self, source: NodeId, target: NodeId, edge_type: EdgeType) -> Result<usize> {
        self.guard_mutation("remove_edge")?;
        self.delete_edge(source, target, edge_type)
    }

    pub(crate) fn insert_edge(&mut self, source: NodeId, target: NodeId, data: EdgeData) -> Result<bool> {
        let s = self.index.get(&source).copied().ok_or(GraphError::NodeNotFound(source))?;
        let t = self.index.get(&target).copied().ok_or(GraphError::NodeNotFound(target))?;
        if self.graph.edges_connecting(s, t).any(|e| *e.weight() == data) {
            if self.strict {
                debug!(%source, %target, edge_type = %data.edge_type, "Duplicate edge ignored");
            }
            return Ok(false);
        }
        self.graph.add_edge(s, t, data);
        Ok(true)
    }

    pub(crate) fn delete_edge(&mut self, source: NodeId, target: NodeId, edge_type: EdgeType) -> Result<usize> {
        let s = self.index.get(&source).copied().ok_or(GraphError::NodeNotFound(source))?;
        let t = self.index.get(&target).copied().ok_or(GraphError::NodeNotFound(target))?;
        let doomed: Vec<EdgeIndex> = self
            .graph
            .edges_connecting(s, t)
            .filter(|e| e.weight().edge_type == edge_type)
            .map(|e| e.id())
            .collect();
        for edge in &doomed {
            self.graph.remove_edge(*edge);
        }
        Ok(doomed.len())
    }

    /// Remove every outgoing edge of the given types from `id`.
    pub(crate) fn clear_outgoing(&mut self, id: NodeId, types: &[EdgeType]) {
        let Some(idx) = self.index.get(&id).copied() else {
            return;
        };
        let doomed: Vec<EdgeIndex> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .filter(|e| types.contains(&e.weight().edge_type))
            .map(|e| e.id())
            .collect();
        for edge in doomed {
            self.graph.remove_edge(edge);
        }
    }

    fn edges_in(
        &self,
        id: NodeId,
        direction: Direction,
        edge_type: Option<EdgeType>,
    ) -> Vec<EdgeView<'_>> {
        let Some(idx) = self.index.get(&id).copied() else {
            return Vec::new();
        };
        let mut edges: Vec<EdgeView<'_>> = self
            .graph
            .edges_directed(idx, direction)
            .filter(|e| edge_type.is_none_or(|t| e.weight().edge_type == t))
            .filter_map(|e| {
                Some(EdgeView {
                    source: self.graph.node_weight(e.source())?.id,
                    target: self.graph.node_weight(e.target())?.id,
                    data: e.weight(),
                })
            })
            .collect();
        edges.sort_by_cached_key(|e| {
            let other = match direction {
                Direction::Outgoing => e.target,
                Direction::Incoming => e.source,
            };
            let start = e.data.usage.as_ref().map(|u| u.match_range.start);
            (self.location_key(other), start)
        });
        edges
    }

    /// Outgoing edges, ordered by target location.
    pub fn out_edges(&self, id: NodeId, edge_type: Option<EdgeType>) -> Vec<EdgeView<'_>> {
        self.edges_in(id, Direction::Outgoing, edge_type)
    }

    /// Incoming edges, ordered by source location.
    pub fn in_edges(&self, id: NodeId, edge_type: Option<EdgeType>) -> Vec<EdgeView<'_>> {
        self.edges_in(id, Direction::Incoming, edge_type)
    }

    /// Distinct successors by location.
    pub fn successors(&self, id: NodeId, edge_type: Option<EdgeType>) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.out_edges(id, edge_type).iter().map(|e| e.target).collect();
        ids.dedup();
        ids
    }

    /// Distinct predecessors by location.
    pub fn predecessors(&self, id: NodeId, edge_type: Option<EdgeType>) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.in_edges(id, edge_type).iter().map(|e| e.source).collect();
        ids.dedup();
        ids
    }

    pub fn in_degree(&self, id: NodeId, edge_type: Option<EdgeType>) -> usize {
        let Some(idx) = self.index.get(&id).copied() else {
            return 0;
        };
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .filter(|e| edge_type.is_none_or(|t| e.weight().edge_type == t))
            .count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Every edge, in no particular order.
    pub fn edges(&self) -> impl Iterator<Item = EdgeView<'_>> + '_ {
        self.graph.edge_indices().filter_map(move |e| {
            let (s, t) = self.graph.edge_endpoints(e)?;
            Some(EdgeView {
                source: self.graph.node_weight(s)?.id,
                target: self.graph.node_weight(t)?.id,
                data: self.graph.edge_weight(e)?,
            })
        })
    }

    // ------------------------------------------------------------------------
    // Path watches
    // ------------------------------------------------------------------------

    /// Record the paths `id`'s resolution looked at, replacing any earlier
    /// record.
    pub(crate) fn set_watches(&mut self, id: NodeId, paths: BTreeSet<String>) {
        self.unwatch(id);
        if paths.is_empty() {
            return;
        }
        for path in &paths {
            self.watchers.entry(path.clone()).or_default().insert(id);
        }
        self.watched.insert(id, paths.into_iter().collect());
    }

    fn unwatch(&mut self, id: NodeId) {
        if let Some(paths) = self.watched.remove(&id) {
            for path in paths {
                if let Some(set) = self.watchers.get_mut(&path) {
                    set.remove(&id);
                    if set.is_empty() {
                        self.watchers.remove(&path);
                    }
                }
            }
        }
    }

    /// Nodes whose resolution depends on `path`.
    pub(crate) fn watchers_of(&self, path: &str) -> impl Iterator<Item = NodeId> + '_ {
        self.watchers.get(path).into_iter().flatten().copied()
    }

    // ------------------------------------------------------------------------
    // Directories & stats
    // ------------------------------------------------------------------------

    pub fn directories(&self) -> &DirectoryTree {
        &self.directories
    }

    pub(crate) fn rebuild_directories(&mut self) {
        self.directories = DirectoryTree::build(self.files.iter().map(|(p, id)| (p.as_str(), *id)));
    }

    /// EXTERNAL nodes without an incoming import resolution.
    pub(crate) fn orphan_externals(&self) -> Vec<NodeId> {
        self.externals
            .values()
            .copied()
            .filter(|id| self.in_degree(*id, Some(EdgeType::ImportSymbolResolution)) == 0)
            .collect()
    }

    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            files: self.files.len(),
            directories: self.directories.len(),
            generation: self.generation,
            ..Default::default()
        };
        for node in self.graph.node_weights() {
            *stats.nodes.entry(node.node_type()).or_default() += 1;
        }
        for edge in self.graph.edge_weights() {
            *stats.edges.entry(edge.edge_type).or_default() += 1;
        }
        stats
    }
}
