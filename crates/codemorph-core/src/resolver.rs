//! Symbol & import resolver.
//!
//! Computes every non-structural edge of the graph:
//!
//! - `IMPORT_SYMBOL_RESOLUTION`: import → the definition it ultimately names
//!   (following re-imports up to [`MAX_IMPORT_HOPS`]), the imported file, or
//!   an interned EXTERNAL node
//! - `EXPORT`: export → exported symbol or re-exported file
//! - `SUBCLASS`: class → each resolvable superclass
//! - `SYMBOL_USAGE`: user → used definition, tagged with [`UsageKinds`]
//!
//! Resolution of one node reads only graph structure (locals, imports,
//! exports), never other resolver edges, so recomputing a node from scratch
//! is idempotent and nodes can be resolved in any order. [`Resolver`] is the
//! pure compute half; [`apply_resolutions`] writes the result.
//!
//! ## Usage
//!
//! ```ignore
//! let options = ResolverOptions::from_flags(&config.feature_flags);
//! let report = resolve_nodes(&mut graph, &resolvable_nodes(&graph), &options);
//! let deps = dependencies(&graph, symbol, UsageKinds::DIRECT, Some(2));
//! ```

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use codemorph_config::FeatureFlags;
use serde::Serialize;
use tracing::{debug, warn};

use crate::graph::{CodebaseGraph, EdgeData, EdgeType, Usage, UsageKind, UsageKinds};
use crate::lang::LanguageSupport;
use crate::node::{
    ExportData, ExportKind, FileData, Ident, ImportData, ImportKind, Node, NodeData, NodeId,
    Reference, SymbolData, UsagePosition,
};

/// Maximum number of imports followed while resolving one name.
pub const MAX_IMPORT_HOPS: usize = 64;

// ============================================================================
// Options & results
// ============================================================================

/// Resolver switches taken from the feature flags.
#[derive(Debug, Clone, Default)]
pub struct ResolverOptions {
    /// Resolve `self.x`, `this.x` and `Class.x`
    pub method_usages: bool,
    /// Keep usages found inside generic type arguments
    pub generics: bool,
    /// Module prefix rewrites applied before file lookup
    pub overrides: BTreeMap<String, String>,
}

impl ResolverOptions {
    pub fn from_flags(flags: &FeatureFlags) -> Self {
        Self {
            method_usages: flags.method_usages,
            generics: flags.generics,
            overrides: flags.import_resolution_overrides.clone(),
        }
    }
}

/// Where a resolution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    Node(NodeId),
    External { module: String, name: String },
}

/// An edge the resolver wants to create.
#[derive(Debug, Clone)]
pub(crate) struct PlannedEdge {
    pub target: Target,
    pub data: EdgeData,
}

/// The complete outgoing resolver state of one node.
#[derive(Debug, Clone)]
pub(crate) struct Resolution {
    pub node: NodeId,
    pub edges: Vec<PlannedEdge>,
    /// Paths whose contents this resolution depended on
    pub watches: BTreeSet<String>,
}

/// Counters from one resolver pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolveReport {
    pub nodes: usize,
    pub edges: usize,
    pub unresolved_imports: usize,
}

impl ResolveReport {
    pub fn merge(&mut self, other: ResolveReport) {
        self.nodes += other.nodes;
        self.edges += other.edges;
        self.unresolved_imports += other.unresolved_imports;
    }
}

/// Per-resolution bookkeeping: watched paths and the import chain followed.
#[derive(Debug, Default)]
pub(crate) struct Trail {
    watches: BTreeSet<String>,
    visited: HashSet<NodeId>,
    hops: usize,
}

/// A name bound in the scope of a use site.
enum Binding {
    Symbol(NodeId),
    Import(NodeId),
    Wildcard { import: NodeId, target: Target },
}

fn position_kind(position: UsagePosition) -> UsageKind {
    match position {
        UsagePosition::Body => UsageKind::Body,
        UsagePosition::Typed => UsageKind::Typed,
        UsagePosition::Return => UsageKind::Return,
        UsagePosition::Decorator => UsageKind::Decorator,
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Read-only resolver over a graph snapshot.
pub struct Resolver<'g> {
    graph: &'g CodebaseGraph,
    options: &'g ResolverOptions,
}

impl<'g> Resolver<'g> {
    pub fn new(graph: &'g CodebaseGraph, options: &'g ResolverOptions) -> Self {
        Self { graph, options }
    }

    /// Compute the full outgoing resolver state of `id`.
    pub(crate) fn resolve(&self, id: NodeId) -> Option<Resolution> {
        let node = self.graph.node(id)?;
        let mut trail = Trail::default();
        let mut edges = Vec::new();
        match &node.data {
            NodeData::Import(import) => self.import_edges(node, import, &mut trail, &mut edges),
            NodeData::Export(export) => self.export_edges(node, export, &mut trail, &mut edges),
            NodeData::Symbol(symbol) => {
                self.subclass_edges(node, symbol, &mut trail, &mut edges);
                self.usage_edges(node, &symbol.references, &mut trail, &mut edges);
            }
            NodeData::File(file) => self.usage_edges(node, &file.references, &mut trail, &mut edges),
            NodeData::External(_) => return None,
        }
        Some(Resolution {
            node: id,
            edges,
            watches: trail.watches,
        })
    }

    fn file_data(&self, node: &Node) -> Option<(NodeId, &'g FileData)> {
        let file = node.file?;
        Some((file, self.graph.node(file)?.as_file()?))
    }

    // ------------------------------------------------------------------------
    // Modules
    // ------------------------------------------------------------------------

    /// Absolute module key for an import or export written in `node`'s file,
    /// with overrides applied.
    fn absolute_module(&self, node: &Node, module: &str) -> String {
        let support = node.language.support();
        let importer = self.graph.file_path_of(node.id).unwrap_or("");
        let absolute = support.absolute_module(importer, module);
        self.apply_override(&absolute, support.module_separator())
    }

    /// Rewrite the longest matching override prefix.
    fn apply_override(&self, module: &str, separator: char) -> String {
        let mut best: Option<(&str, &str)> = None;
        for (from, to) in &self.options.overrides {
            let matches = module == from
                || module
                    .strip_prefix(from.as_str())
                    .is_some_and(|rest| rest.starts_with(separator));
            if matches && best.is_none_or(|(b, _)| from.len() > b.len()) {
                best = Some((from.as_str(), to.as_str()));
            }
        }
        match best {
            Some((from, to)) => format!("{}{}", to, &module[from.len()..]),
            None => module.to_string(),
        }
    }

    fn find_file(&self, candidates: Vec<String>, trail: &mut Trail) -> Option<NodeId> {
        for candidate in candidates {
            let hit = self.graph.file_id(&candidate);
            trail.watches.insert(candidate);
            if hit.is_some() {
                return hit;
            }
        }
        None
    }

    fn module_file(
        &self,
        support: &dyn LanguageSupport,
        module: &str,
        trail: &mut Trail,
    ) -> Option<NodeId> {
        self.find_file(support.module_candidates(module), trail)
    }

    // ------------------------------------------------------------------------
    // Imports
    // ------------------------------------------------------------------------

    /// Resolve an import to the definition it ultimately names.
    fn resolve_import(&self, node: &Node, import: &ImportData, trail: &mut Trail) -> Target {
        let support = node.language.support();
        let module = self.absolute_module(node, &import.module);
        let file = self.module_file(support, &module, trail);

        match import.kind {
            ImportKind::Named | ImportKind::Default => {
                let name = match import.kind {
                    ImportKind::Default => "default",
                    _ => import.name.as_deref().unwrap_or_default(),
                };
                if let Some(file) = file {
                    if let Some(target) = self.lookup_name(file, name, trail) {
                        return target;
                    }
                }
                if let Some(sub) = self.find_file(support.submodule_candidates(&module, name), trail) {
                    return Target::Node(sub);
                }
                Target::External {
                    module,
                    name: name.to_string(),
                }
            }
            ImportKind::Module
            | ImportKind::Namespace
            | ImportKind::Wildcard
            | ImportKind::SideEffect => match file {
                Some(file) => Target::Node(file),
                None => Target::External {
                    module,
                    name: "*".to_string(),
                },
            },
        }
    }

    /// Follow an import found while looking up a name elsewhere.
    fn follow_import(&self, id: NodeId, trail: &mut Trail) -> Option<Target> {
        let node = self.graph.node(id)?;
        let import = node.as_import()?;
        if trail.hops >= MAX_IMPORT_HOPS || !trail.visited.insert(id) {
            debug!(import = %id, "Import cycle detected");
            return Some(Target::External {
                module: self.absolute_module(node, &import.module),
                name: import.name.clone().unwrap_or_else(|| "*".to_string()),
            });
        }
        trail.hops += 1;
        Some(self.resolve_import(node, import, trail))
    }

    fn import_edges(
        &self,
        node: &Node,
        import: &ImportData,
        trail: &mut Trail,
        edges: &mut Vec<PlannedEdge>,
    ) {
        trail.visited.insert(node.id);
        let target = self.resolve_import(node, import, trail);

        if let Target::External { module, name } = &target {
            warn!(
                file = self.graph.file_path_of(node.id).unwrap_or(""),
                module = %module,
                name = %name,
                "UnresolvedImport: resolved to external module"
            );
        }

        if let (Target::Node(resolved), Some(name), Some(range), Some(file)) =
            (&target, &import.name, import.name_range, node.file)
        {
            if self.graph.node(*resolved).is_some_and(|n| n.is_symbol()) {
                edges.push(usage_edge(
                    *resolved,
                    UsageKinds::DIRECT | UsageKind::Body,
                    &Ident::new(name.clone(), range),
                    file,
                ));
            }
        }
        edges.push(PlannedEdge {
            target,
            data: EdgeData::plain(EdgeType::ImportSymbolResolution),
        });
    }

    // ------------------------------------------------------------------------
    // Name lookup
    // ------------------------------------------------------------------------

    /// Look `name` up in a file's public name table.
    fn lookup_name(&self, file_id: NodeId, name: &str, trail: &mut Trail) -> Option<Target> {
        let file_node = self.graph.node(file_id)?;
        let file = file_node.as_file()?;
        trail.watches.insert(file.path.clone());

        if file_node.language.support().exports_all_top_level() {
            if let Some(target) = self.lookup_local(file, name, trail) {
                return Some(target);
            }
            if name.starts_with('_') {
                return None;
            }
            for import_id in self.top_level(file) {
                let Some(node) = self.graph.node(import_id) else {
                    continue;
                };
                let Some(import) = node.as_import().filter(|i| i.is_wildcard()) else {
                    continue;
                };
                if !trail.visited.insert(import_id) || trail.hops >= MAX_IMPORT_HOPS {
                    continue;
                }
                trail.hops += 1;
                if let Target::Node(source) = self.resolve_import(node, import, trail) {
                    if let Some(target) = self.lookup_name(source, name, trail) {
                        return Some(target);
                    }
                }
            }
            return None;
        }

        self.lookup_export(file, name, trail)
    }

    /// Look `name` up among a file's explicit exports.
    fn lookup_export(&self, file: &FileData, name: &str, trail: &mut Trail) -> Option<Target> {
        let exports: Vec<(&Node, &ExportData)> = self
            .top_level(file)
            .filter_map(|id| self.graph.node(id))
            .filter_map(|n| n.as_export().map(|e| (n, e)))
            .collect();

        for (node, export) in &exports {
            if export.exported_name.as_deref() != Some(name) {
                continue;
            }
            if let Some(declaration) = export.declaration {
                return Some(Target::Node(declaration));
            }
            match export.kind {
                ExportKind::ReExport => {
                    if !trail.visited.insert(node.id) || trail.hops >= MAX_IMPORT_HOPS {
                        return None;
                    }
                    trail.hops += 1;
                    let local = export.local_name.as_deref().unwrap_or(name);
                    return Some(self.resolve_reexport(node, export, local, trail));
                }
                ExportKind::Namespace => {
                    let module = self.absolute_module(node, export.module.as_deref().unwrap_or(""));
                    let support = node.language.support();
                    return Some(match self.module_file(support, &module, trail) {
                        Some(file) => Target::Node(file),
                        None => Target::External {
                            module,
                            name: "*".to_string(),
                        },
                    });
                }
                _ => {
                    let Some(local) = export.local_name.as_deref() else {
                        return Some(Target::Node(node.id));
                    };
                    if let Some(target) = self.lookup_local(file, local, trail) {
                        return Some(target);
                    }
                }
            }
        }

        if name != "default" {
            for (node, export) in &exports {
                if export.kind != ExportKind::Wildcard {
                    continue;
                }
                if !trail.visited.insert(node.id) || trail.hops >= MAX_IMPORT_HOPS {
                    continue;
                }
                trail.hops += 1;
                let module = self.absolute_module(node, export.module.as_deref().unwrap_or(""));
                let support = node.language.support();
                if let Some(source) = self.module_file(support, &module, trail) {
                    if let Some(target) = self.lookup_name(source, name, trail) {
                        return Some(target);
                    }
                }
            }
        }

        // files without any export statement expose their top-level names
        if exports.is_empty() {
            return self.lookup_local(file, name, trail);
        }
        None
    }

    fn resolve_reexport(
        &self,
        node: &Node,
        export: &ExportData,
        local: &str,
        trail: &mut Trail,
    ) -> Target {
        let module = self.absolute_module(node, export.module.as_deref().unwrap_or(""));
        let support = node.language.support();
        self.module_file(support, &module, trail)
            .and_then(|file| self.lookup_name(file, local, trail))
            .unwrap_or(Target::External {
                module,
                name: local.to_string(),
            })
    }

    /// Module-scope definition of `name` in `file`, following imports.
    fn lookup_local(&self, file: &FileData, name: &str, trail: &mut Trail) -> Option<Target> {
        let id = *file.locals.get(name)?;
        let node = self.graph.node(id)?;
        match &node.data {
            NodeData::Symbol(_) => Some(Target::Node(id)),
            NodeData::Import(_) => self.follow_import(id, trail),
            _ => None,
        }
    }

    /// Attribute `name` of a module: a name it defines, or a submodule.
    fn lookup_module_member(&self, file_id: NodeId, name: &str, trail: &mut Trail) -> Option<Target> {
        if let Some(target) = self.lookup_name(file_id, name, trail) {
            return Some(target);
        }
        let file_node = self.graph.node(file_id)?;
        let path = &file_node.as_file()?.path;
        let support = file_node.language.support();
        let module = support.module_name(path);
        self.find_file(support.submodule_candidates(&module, name), trail)
            .map(Target::Node)
    }

    /// Member `name` of a class-like symbol, searching superclasses
    /// breadth-first.
    fn lookup_member(&self, class: NodeId, name: &str, trail: &mut Trail) -> Option<NodeId> {
        let mut queue = VecDeque::from([class]);
        let mut seen = HashSet::new();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) || seen.len() > MAX_IMPORT_HOPS {
                continue;
            }
            let Some(node) = self.graph.node(current) else {
                continue;
            };
            let Some(symbol) = node.as_symbol() else {
                continue;
            };
            if let Some(member) = symbol
                .children
                .iter()
                .copied()
                .find(|c| self.graph.node(*c).and_then(|n| n.name()) == Some(name))
            {
                return Some(member);
            }
            for superclass in &symbol.superclasses {
                if let Some(Target::Node(parent)) = self.reference_target(node, superclass, trail) {
                    queue.push_back(parent);
                }
            }
        }
        None
    }

    /// Nodes owned directly by the file (no parent).
    fn top_level<'f>(&'f self, file: &'f FileData) -> impl Iterator<Item = NodeId> + 'f {
        file.nodes
            .iter()
            .copied()
            .filter(|id| self.graph.node(*id).is_some_and(|n| n.parent.is_none()))
    }

    // ------------------------------------------------------------------------
    // Scopes & references
    // ------------------------------------------------------------------------

    /// Imports nested in `owner` or its enclosing symbols, innermost first.
    fn scoped_imports(&self, owner: &Node, file: &FileData) -> Vec<(String, NodeId)> {
        if !owner.is_symbol() {
            return Vec::new();
        }
        let mut scope = vec![owner.id];
        scope.extend(self.graph.ancestors(owner.id));

        let mut out = Vec::new();
        for scope_id in scope {
            for id in &file.nodes {
                let Some(node) = self.graph.node(*id) else {
                    continue;
                };
                if node.parent != Some(scope_id) {
                    continue;
                }
                if let Some(name) = node.as_import().and_then(|i| i.local_name()) {
                    out.push((name.to_string(), *id));
                }
            }
        }
        out
    }

    fn lookup_binding(
        &self,
        file: &FileData,
        scoped: &[(String, NodeId)],
        name: &str,
        trail: &mut Trail,
    ) -> Option<Binding> {
        if let Some((_, id)) = scoped.iter().find(|(n, _)| n == name) {
            return Some(Binding::Import(*id));
        }
        if let Some(id) = file.locals.get(name) {
            match self.graph.node(*id).map(|n| &n.data) {
                Some(NodeData::Symbol(_)) => return Some(Binding::Symbol(*id)),
                Some(NodeData::Import(_)) => return Some(Binding::Import(*id)),
                _ => {}
            }
        }
        if name.starts_with('_') {
            return None;
        }
        for import_id in self.top_level(file) {
            let Some(node) = self.graph.node(import_id) else {
                continue;
            };
            let Some(import) = node.as_import().filter(|i| i.is_wildcard()) else {
                continue;
            };
            let mut inner = Trail {
                visited: HashSet::from([import_id]),
                ..Default::default()
            };
            let found = match self.resolve_import(node, import, &mut inner) {
                Target::Node(source) => self.lookup_name(source, name, &mut inner),
                Target::External { .. } => None,
            };
            trail.watches.append(&mut inner.watches);
            if let Some(target) = found {
                return Some(Binding::Wildcard {
                    import: import_id,
                    target,
                });
            }
        }
        None
    }

    /// What an import binding stands for, starting a fresh chain.
    fn import_target(&self, import_id: NodeId, trail: &mut Trail) -> Option<Target> {
        let node = self.graph.node(import_id)?;
        let import = node.as_import()?;
        let mut inner = Trail {
            visited: HashSet::from([import_id]),
            ..Default::default()
        };
        let target = self.resolve_import(node, import, &mut inner);
        trail.watches.append(&mut inner.watches);
        Some(target)
    }

    /// Resolve the chain of a reference starting from `start`.
    ///
    /// Module attributes always resolve; class members only with
    /// `members`.
    fn chain_targets<'r>(
        &self,
        start: NodeId,
        chain: &'r [Ident],
        members: bool,
        trail: &mut Trail,
    ) -> Vec<(NodeId, &'r Ident)> {
        let mut out = Vec::new();
        let mut current = start;
        for ident in chain {
            let next = match self.graph.node(current).map(|n| &n.data) {
                Some(NodeData::File(_)) => {
                    match self.lookup_module_member(current, &ident.name, trail) {
                        Some(Target::Node(id)) => Some(id),
                        _ => None,
                    }
                }
                Some(NodeData::Symbol(_)) if members => {
                    self.lookup_member(current, &ident.name, trail)
                }
                _ => None,
            };
            match next {
                Some(id) => {
                    out.push((id, ident));
                    current = id;
                }
                None => break,
            }
        }
        out
    }

    /// Final target of a reference (used for superclasses).
    fn reference_target(&self, owner: &Node, reference: &Reference, trail: &mut Trail) -> Option<Target> {
        let (_, file) = self.file_data(owner)?;
        let scoped = self.scoped_imports(owner, file);
        let base = match self.lookup_binding(file, &scoped, &reference.head.name, trail)? {
            Binding::Symbol(id) => Target::Node(id),
            Binding::Import(id) => self.import_target(id, trail)?,
            Binding::Wildcard { target, .. } => target,
        };
        let Target::Node(start) = base else {
            return Some(base);
        };
        let chain = self.skip_implied(&reference.head, &reference.chain, file);
        if chain.is_empty() {
            return Some(Target::Node(start));
        }
        let steps = self.chain_targets(start, chain, true, trail);
        if steps.len() < chain.len() {
            return None;
        }
        steps.last().map(|(id, _)| Target::Node(*id))
    }

    /// Drop the leading chain segments a dotted module import already names
    /// (`import a.b` then `a.b.f` → `[f]`).
    fn skip_implied<'r>(&self, head: &Ident, chain: &'r [Ident], file: &FileData) -> &'r [Ident] {
        let Some(import) = file
            .locals
            .get(&head.name)
            .and_then(|id| self.graph.node(*id))
            .and_then(|n| n.as_import())
        else {
            return chain;
        };
        let implied = import.implied_segments();
        let matched = implied
            .iter()
            .zip(chain.iter())
            .take_while(|(segment, ident)| **segment == ident.name)
            .count();
        if matched == implied.len() {
            &chain[matched..]
        } else {
            chain
        }
    }

    fn enclosing_class(&self, owner: &Node) -> Option<NodeId> {
        std::iter::once(owner.id)
            .chain(self.graph.ancestors(owner.id))
            .find(|id| {
                self.graph
                    .node(*id)
                    .and_then(|n| n.symbol_kind())
                    .is_some_and(|k| k.has_superclasses())
            })
    }

    // ------------------------------------------------------------------------
    // Edge builders
    // ------------------------------------------------------------------------

    fn usage_edges(
        &self,
        owner: &Node,
        references: &[Reference],
        trail: &mut Trail,
        edges: &mut Vec<PlannedEdge>,
    ) {
        let Some((file_id, file)) = self.file_data(owner) else {
            return;
        };
        let scoped = self.scoped_imports(owner, file);

        for reference in references {
            if reference.in_generic && !self.options.generics {
                continue;
            }
            let position = position_kind(reference.position);

            if reference.self_reference {
                if !self.options.method_usages {
                    continue;
                }
                if let Some(class) = self.enclosing_class(owner) {
                    for (target, ident) in self.chain_targets(class, &reference.chain, true, trail) {
                        if target != owner.id {
                            edges.push(usage_edge(target, UsageKinds::CHAINED | position, ident, file_id));
                        }
                    }
                }
                continue;
            }

            let head = &reference.head;
            let Some(binding) = self.lookup_binding(file, &scoped, &head.name, trail) else {
                continue;
            };

            let (start, members) = match binding {
                Binding::Symbol(id) => {
                    if id != owner.id {
                        edges.push(usage_edge(id, UsageKinds::DIRECT | position, head, file_id));
                    }
                    (Some(id), self.options.method_usages)
                }
                Binding::Import(import_id) => {
                    edges.push(usage_edge(import_id, UsageKinds::DIRECT | position, head, file_id));
                    let aliased = self
                        .graph
                        .node(import_id)
                        .and_then(|n| n.as_import())
                        .is_some_and(|i| i.is_aliased());
                    match self.import_target(import_id, trail) {
                        Some(Target::Node(target)) => {
                            let is_symbol = self.graph.node(target).is_some_and(|n| n.is_symbol());
                            if is_symbol && target != owner.id {
                                let kind = if aliased {
                                    UsageKinds::ALIASED
                                } else {
                                    UsageKinds::INDIRECT
                                };
                                edges.push(usage_edge(target, kind | position, head, file_id));
                            }
                            (Some(target), !is_symbol || self.options.method_usages)
                        }
                        _ => (None, false),
                    }
                }
                Binding::Wildcard { import, target } => {
                    edges.push(usage_edge(import, UsageKinds::DIRECT | position, head, file_id));
                    match target {
                        Target::Node(target) => {
                            let is_symbol = self.graph.node(target).is_some_and(|n| n.is_symbol());
                            if is_symbol && target != owner.id {
                                edges.push(usage_edge(
                                    target,
                                    UsageKinds::INDIRECT | position,
                                    head,
                                    file_id,
                                ));
                            }
                            (Some(target), !is_symbol || self.options.method_usages)
                        }
                        Target::External { .. } => (None, false),
                    }
                }
            };

            let Some(start) = start else {
                continue;
            };
            if reference.chain.is_empty() {
                continue;
            }
            let is_module = self.graph.node(start).is_some_and(|n| n.is_file());
            if !is_module && !members {
                continue;
            }
            let chain = self.skip_implied(head, &reference.chain, file);
            for (target, ident) in self.chain_targets(start, chain, self.options.method_usages, trail) {
                if target != owner.id && self.graph.node(target).is_some_and(|n| n.is_symbol()) {
                    edges.push(usage_edge(target, UsageKinds::CHAINED | position, ident, file_id));
                }
            }
        }
    }

    fn subclass_edges(
        &self,
        node: &Node,
        symbol: &SymbolData,
        trail: &mut Trail,
        edges: &mut Vec<PlannedEdge>,
    ) {
        if !symbol.kind.has_superclasses() {
            return;
        }
        for superclass in &symbol.superclasses {
            if let Some(Target::Node(parent)) = self.reference_target(node, superclass, trail) {
                if parent != node.id && self.graph.node(parent).is_some_and(|n| n.is_symbol()) {
                    edges.push(PlannedEdge {
                        target: Target::Node(parent),
                        data: EdgeData::plain(EdgeType::Subclass),
                    });
                }
            }
        }
    }

    fn export_edges(
        &self,
        node: &Node,
        export: &ExportData,
        trail: &mut Trail,
        edges: &mut Vec<PlannedEdge>,
    ) {
        let Some((file_id, file)) = self.file_data(node) else {
            return;
        };
        trail.visited.insert(node.id);
        let export_edge = |target: NodeId| PlannedEdge {
            target: Target::Node(target),
            data: EdgeData::plain(EdgeType::Export),
        };

        if let Some(declaration) = export.declaration {
            edges.push(export_edge(declaration));
            return;
        }

        let local = export
            .local_name
            .as_deref()
            .zip(export.local_range)
            .map(|(name, range)| Ident::new(name, range));

        match export.kind {
            ExportKind::Named | ExportKind::Default | ExportKind::Declaration => {
                let Some(local) = local else {
                    return;
                };
                match file.locals.get(&local.name).and_then(|id| self.graph.node(*id)) {
                    Some(target) if target.is_symbol() => {
                        edges.push(export_edge(target.id));
                        edges.push(usage_edge(target.id, UsageKinds::DIRECT | UsageKind::Body, &local, file_id));
                    }
                    Some(import) if import.is_import() => {
                        edges.push(usage_edge(import.id, UsageKinds::DIRECT | UsageKind::Body, &local, file_id));
                        if let Some(Target::Node(target)) = self.import_target(import.id, trail) {
                            edges.push(export_edge(target));
                            if self.graph.node(target).is_some_and(|n| n.is_symbol()) {
                                edges.push(usage_edge(
                                    target,
                                    UsageKinds::INDIRECT | UsageKind::Body,
                                    &local,
                                    file_id,
                                ));
                            }
                        }
                    }
                    _ => {}
                }
            }
            ExportKind::ReExport => {
                let Some(local) = local else {
                    return;
                };
                if let Target::Node(target) = self.resolve_reexport(node, export, &local.name, trail) {
                    edges.push(export_edge(target));
                    if self.graph.node(target).is_some_and(|n| n.is_symbol()) {
                        edges.push(usage_edge(target, UsageKinds::DIRECT | UsageKind::Body, &local, file_id));
                    }
                }
            }
            ExportKind::Wildcard | ExportKind::Namespace => {
                let module = self.absolute_module(node, export.module.as_deref().unwrap_or(""));
                if let Some(source) = self.module_file(node.language.support(), &module, trail) {
                    edges.push(export_edge(source));
                }
            }
        }
    }
}

fn usage_edge(target: NodeId, kinds: UsageKinds, ident: &Ident, file: NodeId) -> PlannedEdge {
    PlannedEdge {
        target: Target::Node(target),
        data: EdgeData::usage(Usage {
            kinds,
            match_range: ident.range,
            match_text: ident.name.clone(),
            file,
        }),
    }
}

// ============================================================================
// Applying resolutions
// ============================================================================

/// Every node the resolver computes edges for, in graph order.
pub(crate) fn resolvable_nodes(graph: &CodebaseGraph) -> Vec<NodeId> {
    graph
        .iter_nodes()
        .filter(|n| !n.is_external())
        .map(|n| n.id)
        .collect()
}

/// Replace each node's resolver-owned outgoing edges with the computed ones.
pub(crate) fn apply_resolutions(graph: &mut CodebaseGraph, resolutions: Vec<Resolution>) -> ResolveReport {
    let mut report = ResolveReport::default();
    for resolution in resolutions {
        let Some(language) = graph.node(resolution.node).map(|n| n.language) else {
            continue;
        };
        graph.clear_outgoing(resolution.node, &EdgeType::RESOLVER_OWNED);
        report.nodes += 1;

        for edge in resolution.edges {
            let target = match edge.target {
                Target::Node(id) => id,
                Target::External { module, name } => {
                    if edge.data.edge_type != EdgeType::ImportSymbolResolution {
                        continue;
                    }
                    report.unresolved_imports += 1;
                    graph.get_or_create_external(language, &module, &name)
                }
            };
            match graph.insert_edge(resolution.node, target, edge.data) {
                Ok(true) => report.edges += 1,
                Ok(false) => {}
                Err(e) => debug!(node = %resolution.node, "Skipping edge: {}", e),
            }
        }
        graph.set_watches(resolution.node, resolution.watches);
    }
    report
}

/// Compute and apply resolutions for `ids`.
pub(crate) fn resolve_nodes(
    graph: &mut CodebaseGraph,
    ids: &[NodeId],
    options: &ResolverOptions,
) -> ResolveReport {
    let resolutions: Vec<Resolution> = {
        let resolver = Resolver::new(graph, options);
        ids.iter().filter_map(|id| resolver.resolve(*id)).collect()
    };
    apply_resolutions(graph, resolutions)
}

// ============================================================================
// Dependency and usage queries
// ============================================================================

/// One incoming usage edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageRecord {
    /// Node whose code contains the use
    pub user: NodeId,
    /// Definition being used
    pub target: NodeId,
    pub usage: Usage,
}

/// `id` and every symbol nested inside it.
fn subtree(graph: &CodebaseGraph, id: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![id];
    while let Some(current) = stack.pop() {
        out.push(current);
        if let Some(symbol) = graph.node(current).and_then(|n| n.as_symbol()) {
            stack.extend(symbol.children.iter().rev());
        }
    }
    out
}

/// Definitions `symbol` uses, walking usage edges forward.
///
/// `max_depth` of `None` means direct dependencies only; deeper levels
/// recurse through symbol targets. Results exclude `symbol`'s own nested
/// definitions and are sorted by location.
pub fn dependencies(
    graph: &CodebaseGraph,
    symbol: NodeId,
    mask: UsageKinds,
    max_depth: Option<usize>,
) -> Vec<NodeId> {
    let depth = max_depth.unwrap_or(1).max(1);
    let mut seen = HashSet::from([symbol]);
    let mut found = Vec::new();
    let mut frontier = vec![symbol];

    for _ in 0..depth {
        let mut next = Vec::new();
        for node in frontier {
            for source in subtree(graph, node) {
                for edge in graph.out_edges(source, Some(EdgeType::SymbolUsage)) {
                    let Some(usage) = &edge.data.usage else {
                        continue;
                    };
                    if !usage.kinds.matches(mask) || graph.is_within(edge.target, symbol) {
                        continue;
                    }
                    if seen.insert(edge.target) {
                        found.push(edge.target);
                        if graph.node(edge.target).is_some_and(|n| n.is_symbol()) {
                            next.push(edge.target);
                        }
                    }
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    graph.sort_by_location(&mut found);
    found
}

/// Usage edges into `target`, walking backward.
///
/// With `max_depth > 1` the walk continues from users reached through
/// `CHAINED` usages. Sorted by file, then reverse offset, then ids.
pub fn usages(
    graph: &CodebaseGraph,
    target: NodeId,
    mask: UsageKinds,
    max_depth: Option<usize>,
) -> Vec<UsageRecord> {
    let depth = max_depth.unwrap_or(1).max(1);
    let mut seen = HashSet::from([target]);
    let mut out = Vec::new();
    let mut frontier = vec![target];

    for level in 0..depth {
        let mut next = Vec::new();
        for current in frontier {
            for edge in graph.in_edges(current, Some(EdgeType::SymbolUsage)) {
                let Some(usage) = &edge.data.usage else {
                    continue;
                };
                if !usage.kinds.matches(mask) {
                    continue;
                }
                out.push(UsageRecord {
                    user: edge.source,
                    target: current,
                    usage: usage.clone(),
                });
                if level + 1 < depth && usage.kinds.has(UsageKind::Chained) && seen.insert(edge.source) {
                    next.push(edge.source);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    out.sort_by_cached_key(|r| {
        let path = graph
            .node(r.usage.file)
            .and_then(|n| n.as_file())
            .map(|f| f.path.clone())
            .unwrap_or_default();
        (path, Reverse(r.usage.match_range.start), r.user, r.target)
    });
    out.dedup();
    out
}

/// Distinct nodes that use `target`, sorted by location.
pub fn symbol_usages(graph: &CodebaseGraph, target: NodeId, mask: UsageKinds) -> Vec<NodeId> {
    let mut users: Vec<NodeId> = usages(graph, target, mask, None)
        .into_iter()
        .map(|r| r.user)
        .collect();
    graph.sort_by_location(&mut users);
    users
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;
    use crate::parser::parse_file;
    use std::sync::Arc;

    fn options() -> ResolverOptions {
        ResolverOptions {
            method_usages: true,
            generics: true,
            overrides: BTreeMap::new(),
        }
    }

    fn build_with(files: &[(&str, &str)], options: &ResolverOptions) -> CodebaseGraph {
        let mut graph = CodebaseGraph::new(true, false);
        for (path, source) in files {
            graph
                .insert_file(parse_file(path, Arc::from(*source), None, 0).unwrap())
                .unwrap();
        }
        graph.rebuild_directories();
        let ids = resolvable_nodes(&graph);
        resolve_nodes(&mut graph, &ids, options);
        graph
    }

    fn build(files: &[(&str, &str)]) -> CodebaseGraph {
        build_with(files, &options())
    }

    fn find(graph: &CodebaseGraph, node_type: NodeType, path: &str, name: &str) -> NodeId {
        graph
            .nodes_of_type(node_type)
            .find(|n| n.name() == Some(name) && graph.file_path_of(n.id) == Some(path))
            .map(|n| n.id)
            .unwrap_or_else(|| panic!("{} {} not found in {}", node_type, name, path))
    }

    fn names(graph: &CodebaseGraph, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .map(|id| graph.node(*id).and_then(|n| n.name()).unwrap_or("?").to_string())
            .collect()
    }

    #[test]
    fn test_named_import_and_call_usages() {
        let graph = build(&[("a.py", "def foo(): pass\n"), ("b.py", "from a import foo\nfoo()\n")]);
        let foo = find(&graph, NodeType::Symbol, "a.py", "foo");
        let import = find(&graph, NodeType::Import, "b.py", "foo");
        assert_eq!(graph.successors(import, Some(EdgeType::ImportSymbolResolution)), vec![foo]);

        let records = usages(&graph, foo, UsageKinds::RESOLUTION, None);
        let matched: Vec<(usize, &str)> = records
            .iter()
            .map(|r| (r.usage.match_range.start, r.usage.match_text.as_str()))
            .collect();
        assert_eq!(matched, vec![(18, "foo"), (14, "foo")]);
        assert!(records[0].usage.kinds.has(UsageKind::Indirect));
        assert!(records[1].usage.kinds.has(UsageKind::Direct));
    }

    #[test]
    fn test_unresolved_import_becomes_external() {
        let graph = build(&[("a.py", "import os\nfrom requests import get\n")]);
        let os = graph.external("os", "*").unwrap();
        let get = graph.external("requests", "get").unwrap();
        let import = find(&graph, NodeType::Import, "a.py", "get");
        assert_eq!(graph.successors(import, None), vec![get]);
        assert_eq!(graph.in_degree(os, Some(EdgeType::ImportSymbolResolution)), 1);
    }

    #[test]
    fn test_relative_import_and_submodule() {
        let graph = build(&[
            ("pkg/__init__.py", ""),
            ("pkg/util.py", "def helper():\n    pass\n"),
            ("pkg/main.py", "from . import util\nfrom .util import helper\n"),
        ]);
        let util_file = graph.file_id("pkg/util.py").unwrap();
        let helper = find(&graph, NodeType::Symbol, "pkg/util.py", "helper");
        let util_import = find(&graph, NodeType::Import, "pkg/main.py", "util");
        let helper_import = find(&graph, NodeType::Import, "pkg/main.py", "helper");
        assert_eq!(graph.successors(util_import, None), vec![util_file]);
        assert_eq!(
            graph.successors(helper_import, Some(EdgeType::ImportSymbolResolution)),
            vec![helper]
        );
    }

    #[test]
    fn test_import_chain_and_cycle() {
        let graph = build(&[
            ("a.py", "def f():\n    pass\n"),
            ("b.py", "from a import f\n"),
            ("c.py", "from b import f\n"),
            ("x.py", "from y import g\n"),
            ("y.py", "from x import g\n"),
        ]);
        let f = find(&graph, NodeType::Symbol, "a.py", "f");
        let c_import = find(&graph, NodeType::Import, "c.py", "f");
        assert_eq!(graph.successors(c_import, Some(EdgeType::ImportSymbolResolution)), vec![f]);

        let x_import = find(&graph, NodeType::Import, "x.py", "g");
        let target = graph.successors(x_import, Some(EdgeType::ImportSymbolResolution));
        assert_eq!(target.len(), 1);
        assert!(graph.node(target[0]).unwrap().is_external());
    }

    #[test]
    fn test_module_import_chained_usage() {
        let graph = build(&[
            ("pkg/__init__.py", ""),
            ("pkg/mod.py", "def run():\n    pass\n"),
            ("main.py", "import pkg.mod\n\ndef go():\n    pkg.mod.run()\n"),
        ]);
        let run = find(&graph, NodeType::Symbol, "pkg/mod.py", "run");
        let go = find(&graph, NodeType::Symbol, "main.py", "go");
        let records = usages(&graph, run, UsageKinds::CHAINED, None);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user, go);
        assert_eq!(records[0].usage.match_text, "run");
    }

    #[test]
    fn test_method_usages_through_self_and_superclass() {
        let source = "class Base:\n    def ping(self):\n        pass\n\nclass Child(Base):\n    def go(self):\n        self.ping()\n";
        let graph = build(&[("m.py", source)]);
        let ping = find(&graph, NodeType::Symbol, "m.py", "ping");
        let go = find(&graph, NodeType::Symbol, "m.py", "go");
        let base = find(&graph, NodeType::Symbol, "m.py", "Base");
        let child = find(&graph, NodeType::Symbol, "m.py", "Child");

        assert_eq!(symbol_usages(&graph, ping, UsageKinds::CHAINED), vec![go]);
        assert_eq!(graph.successors(child, Some(EdgeType::Subclass)), vec![base]);

        let without = build_with(
            &[("m.py", source)],
            &ResolverOptions {
                method_usages: false,
                ..options()
            },
        );
        let ping = find(&without, NodeType::Symbol, "m.py", "ping");
        assert!(symbol_usages(&without, ping, UsageKinds::ALL).is_empty());
    }

    #[test]
    fn test_dependencies_max_depth() {
        let graph = build(&[(
            "m.py",
            "class A:\n    pass\n\nclass B(A):\n    pass\n\nclass C(B):\n    pass\n\ndef use_c():\n    return C()\n",
        )]);
        let use_c = find(&graph, NodeType::Symbol, "m.py", "use_c");
        let deps = |depth| names(&graph, &dependencies(&graph, use_c, UsageKinds::DIRECT, Some(depth)));
        assert_eq!(deps(1), vec!["C"]);
        assert_eq!(deps(2), vec!["B", "C"]);
        assert_eq!(deps(3), vec!["A", "B", "C"]);
        assert_eq!(
            names(&graph, &dependencies(&graph, use_c, UsageKinds::DIRECT, None)),
            vec!["C"]
        );
    }

    #[test]
    fn test_local_scope_imports_shadow_module_names() {
        let graph = build(&[
            ("a.py", "def tool():\n    pass\n"),
            ("b.py", "def tool():\n    pass\n"),
            ("c.py", "from a import tool\n\ndef run():\n    from b import tool\n    tool()\n"),
        ]);
        let b_tool = find(&graph, NodeType::Symbol, "b.py", "tool");
        let a_tool = find(&graph, NodeType::Symbol, "a.py", "tool");
        let run = find(&graph, NodeType::Symbol, "c.py", "run");
        assert!(symbol_usages(&graph, b_tool, UsageKinds::INDIRECT).contains(&run));
        assert!(!symbol_usages(&graph, a_tool, UsageKinds::INDIRECT).contains(&run));
    }

    #[test]
    fn test_typescript_reexports_and_defaults() {
        let graph = build(&[
            ("src/a.ts", "export function f() {}\nexport default class K {}\n"),
            ("src/index.ts", "export { f } from \"./a\";\nexport * from \"./a\";\n"),
            ("src/use.ts", "import { f } from \"./index\";\nimport K from \"./a\";\nf();\nnew K();\n"),
        ]);
        let f = find(&graph, NodeType::Symbol, "src/a.ts", "f");
        let k = find(&graph, NodeType::Symbol, "src/a.ts", "K");
        let f_import = find(&graph, NodeType::Import, "src/use.ts", "f");
        let k_import = find(&graph, NodeType::Import, "src/use.ts", "K");
        assert_eq!(graph.successors(f_import, Some(EdgeType::ImportSymbolResolution)), vec![f]);
        assert_eq!(graph.successors(k_import, Some(EdgeType::ImportSymbolResolution)), vec![k]);

        let use_file = graph.file_id("src/use.ts").unwrap();
        assert!(symbol_usages(&graph, f, UsageKinds::INDIRECT).contains(&use_file));

        let reexport = graph
            .nodes_of_type(NodeType::Export)
            .find(|n| graph.file_path_of(n.id) == Some("src/index.ts") && n.name() == Some("f"))
            .unwrap()
            .id;
        assert_eq!(graph.successors(reexport, Some(EdgeType::Export)), vec![f]);
    }

    #[test]
    fn test_import_overrides() {
        let mut overrides = BTreeMap::new();
        overrides.insert("vendored.lib".to_string(), "lib".to_string());
        let graph = build_with(
            &[("lib/core.py", "def f():\n    pass\n"), ("m.py", "from vendored.lib.core import f\n")],
            &ResolverOptions {
                overrides,
                ..options()
            },
        );
        let f = find(&graph, NodeType::Symbol, "lib/core.py", "f");
        let import = find(&graph, NodeType::Import, "m.py", "f");
        assert_eq!(graph.successors(import, Some(EdgeType::ImportSymbolResolution)), vec![f]);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut graph = build(&[("a.py", "def foo(): pass\n"), ("b.py", "from a import foo\nfoo()\n")]);
        let before = graph.edge_count();
        let ids = resolvable_nodes(&graph);
        let report = resolve_nodes(&mut graph, &ids, &options());
        assert_eq!(graph.edge_count(), before);
        assert_eq!(report.edges, before);
    }

    #[test]
    fn test_watches_cover_missing_modules() {
        let graph = build(&[("m.py", "from later import thing\n")]);
        let import = find(&graph, NodeType::Import, "m.py", "thing");
        assert!(graph.watchers_of("later.py").any(|id| id == import));
    }
}
