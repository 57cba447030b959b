//! Graph verification.
//!
//! Two checks: structural invariants on the live graph, and drift against a
//! graph rebuilt from scratch out of the same file contents. Graphs are
//! compared in a canonical, id-free form so two builds of the same sources
//! compare equal.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::graph::{CodebaseGraph, EdgeType};
use crate::node::{Node, NodeData, NodeId, NodeType};
use crate::parser::parse_file;
use crate::resolver::{resolvable_nodes, resolve_nodes, ResolverOptions};

/// Violations reported per check before truncating.
const MAX_REPORTED: usize = 10;

/// Id-free identity of a node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeKey {
    pub node_type: NodeType,
    /// File path, or `module::name` for externals
    pub location: String,
    pub start: usize,
    pub end: usize,
    pub ts_kind: &'static str,
    pub name: String,
}

/// Id-free identity of an edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EdgeKey {
    pub source: NodeKey,
    pub target: NodeKey,
    pub edge_type: EdgeType,
    pub kinds: String,
    pub match_range: Option<(usize, usize)>,
}

/// Multiset view of a graph's nodes and edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalGraph {
    pub nodes: BTreeMap<NodeKey, usize>,
    pub edges: BTreeMap<EdgeKey, usize>,
}

fn node_key(graph: &CodebaseGraph, node: &Node) -> NodeKey {
    let location = match &node.data {
        NodeData::External(ext) => ext.key(),
        _ => graph.file_path_of(node.id).unwrap_or_default().to_string(),
    };
    NodeKey {
        node_type: node.node_type(),
        location,
        start: node.range.start,
        end: node.range.end,
        ts_kind: node.ts_kind,
        name: node.name().unwrap_or_default().to_string(),
    }
}

/// Canonical form of `graph`.
pub fn canonical_form(graph: &CodebaseGraph) -> CanonicalGraph {
    let mut canonical = CanonicalGraph::default();
    let mut keys: BTreeMap<NodeId, NodeKey> = BTreeMap::new();
    for node in graph.iter_nodes() {
        let key = node_key(graph, node);
        *canonical.nodes.entry(key.clone()).or_default() += 1;
        keys.insert(node.id, key);
    }
    for edge in graph.edges() {
        let (Some(source), Some(target)) = (keys.get(&edge.source), keys.get(&edge.target)) else {
            continue;
        };
        let key = EdgeKey {
            source: source.clone(),
            target: target.clone(),
            edge_type: edge.data.edge_type,
            kinds: edge
                .data
                .usage
                .as_ref()
                .map(|u| u.kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join("|"))
                .unwrap_or_default(),
            match_range: edge
                .data
                .usage
                .as_ref()
                .map(|u| (u.match_range.start, u.match_range.end)),
        };
        *canonical.edges.entry(key).or_default() += 1;
    }
    canonical
}

// ============================================================================
// Checks
// ============================================================================

/// Outcome of [`verify_graph`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub violations: Vec<String>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check structural invariants of the live graph.
pub fn check_invariants(graph: &CodebaseGraph) -> Vec<String> {
    let mut violations = Vec::new();
    let generation = graph.generation();

    for node in graph.iter_nodes() {
        if node.generation > generation {
            violations.push(format!(
                "{} has generation {} ahead of graph generation {}",
                node.id, node.generation, generation
            ));
        }
        match &node.data {
            NodeData::External(_) => {
                if graph.in_degree(node.id, Some(EdgeType::ImportSymbolResolution)) == 0 {
                    violations.push(format!("external {} has no incoming import", node.id));
                }
            }
            NodeData::File(file) => {
                if graph.file_id(&file.path) != Some(node.id) {
                    violations.push(format!("file {} is not indexed", file.path));
                }
                let mut statements = file.statements.clone();
                statements.sort();
                for pair in statements.windows(2) {
                    if pair[0].end > pair[1].start {
                        violations.push(format!(
                            "{}: statements {} and {} overlap",
                            file.path, pair[0], pair[1]
                        ));
                    }
                }
            }
            _ => {
                let owner = node.file.and_then(|f| graph.node(f));
                match owner.and_then(|f| f.as_file()) {
                    Some(file) if file.nodes.contains(&node.id) => {
                        if !owner.is_some_and(|f| f.range.contains(&node.range)) {
                            violations.push(format!("{} lies outside {}", node.id, file.path));
                        }
                    }
                    _ => violations.push(format!("{} has no owning file", node.id)),
                }
                if let Some(parent) = node.parent {
                    match graph.node(parent) {
                        Some(p) if p.file == node.file && p.range.contains(&node.range) => {}
                        Some(_) => violations.push(format!(
                            "{} is not contained in its parent {}",
                            node.id, parent
                        )),
                        None => violations.push(format!("{} has a dangling parent {}", node.id, parent)),
                    }
                }
            }
        }
    }
    violations
}

/// Rebuild a graph from the file contents held by `graph`.
pub fn rebuild(graph: &CodebaseGraph, options: &ResolverOptions) -> CodebaseGraph {
    let mut fresh = CodebaseGraph::new(false, false);
    for file in graph.files() {
        let Some(data) = file.as_file() else {
            continue;
        };
        match parse_file(&data.path, Arc::clone(&data.content), None, 0) {
            Ok(parsed) => {
                if let Err(e) = fresh.insert_file(parsed) {
                    warn!(file = %data.path, "Rebuild skipped file: {}", e);
                }
            }
            Err(e) => warn!(file = %data.path, "Rebuild failed to parse: {}", e),
        }
    }
    fresh.rebuild_directories();
    let ids = resolvable_nodes(&fresh);
    resolve_nodes(&mut fresh, &ids, options);
    for orphan in fresh.orphan_externals() {
        if let Err(e) = fresh.delete_node(orphan) {
            warn!(node = %orphan, "Rebuild failed to drop orphan external: {}", e);
        }
    }
    fresh
}

fn describe_drift<K: std::fmt::Debug + Ord>(
    label: &str,
    live: &BTreeMap<K, usize>,
    fresh: &BTreeMap<K, usize>,
    out: &mut Vec<String>,
) {
    let mut reported = 0;
    for (key, count) in live {
        let expected = fresh.get(key).copied().unwrap_or(0);
        if *count != expected && reported < MAX_REPORTED {
            out.push(format!("{} {:?}: live {} vs rebuilt {}", label, key, count, expected));
            reported += 1;
        }
    }
    for (key, count) in fresh {
        if !live.contains_key(key) && reported < MAX_REPORTED {
            out.push(format!("{} {:?}: live 0 vs rebuilt {}", label, key, count));
            reported += 1;
        }
    }
}

/// Compare `graph` against a rebuild from scratch.
pub fn compare_with_rebuild(graph: &CodebaseGraph, options: &ResolverOptions) -> Vec<String> {
    let live = canonical_form(graph);
    let fresh = canonical_form(&rebuild(graph, options));
    let mut drift = Vec::new();
    if live != fresh {
        describe_drift("node", &live.nodes, &fresh.nodes, &mut drift);
        describe_drift("edge", &live.edges, &fresh.edges, &mut drift);
    }
    drift
}

/// Run every check.
pub fn verify_graph(graph: &CodebaseGraph, options: &ResolverOptions) -> VerifyReport {
    let mut violations = check_invariants(graph);
    violations.extend(compare_with_rebuild(graph, options));
    debug!(violations = violations.len(), "Verified graph");
    VerifyReport { violations }
}
