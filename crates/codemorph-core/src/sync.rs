//! Incremental sync.
//!
//! Reconciles the graph with a list of file diffs. Each diff is classified
//! as ADD, REPARSE or DELETE; affected files are unparsed and reparsed while
//! every other file keeps its nodes (and their generation) untouched. Nodes
//! in other files whose resolution depended on a changed file are then
//! re-resolved in place.
//!
//! The initial build is a sync in which every file is an ADD.
//!
//! ## Usage
//!
//! ```ignore
//! let settings = SyncSettings { resolver: &options, languages: &languages, ignore_process_errors: true };
//! let report = build(&mut graph, &io, paths, &settings)?;
//! let result = sync(&mut graph, &io, &diffs, &settings)?;
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::diff::{ChangeType, Diff};
use crate::graph::{CodebaseGraph, GraphError};
use crate::io::{FileIo, IoError};
use crate::language::{Grammar, Language};
use crate::node::NodeId;
use crate::parser::{parse_file, ParsedFile, ParserError};
use crate::resolver::{resolve_nodes, ResolveReport, ResolverOptions};

// ============================================================================
// Errors
// ============================================================================

/// Errors that abort a sync before the graph is touched.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: IoError,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: ParserError,
    },

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
}

pub type Result<T> = std::result::Result<T, SyncError>;

// ============================================================================
// Classification
// ============================================================================

/// What a sync does with one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncAction {
    Add,
    Reparse,
    Delete,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::Add => "ADD",
            SyncAction::Reparse => "REPARSE",
            SyncAction::Delete => "DELETE",
        }
    }
}

/// Whether `path` is a source file of one of `languages`.
fn is_indexed(path: &str, languages: &[Language]) -> bool {
    Grammar::from_path(Path::new(path)).is_some_and(|g| languages.contains(&g.language()))
}

/// Classify diffs into per-file actions.
///
/// The diff's change type gives the intent; the graph and the file system
/// give the final say. A delete of an unknown file is dropped, a reparse of
/// an unknown file becomes an add and vice versa, and a file that no longer
/// exists is deleted.
pub fn classify(
    graph: &CodebaseGraph,
    io: &FileIo,
    languages: &[Language],
    diffs: &[Diff],
) -> BTreeMap<String, SyncAction> {
    let mut intents: Vec<(&str, SyncAction)> = Vec::new();
    for diff in diffs {
        match diff.change_type {
            ChangeType::Added => intents.push((diff.path.as_str(), SyncAction::Add)),
            ChangeType::Modified => intents.push((diff.path.as_str(), SyncAction::Reparse)),
            ChangeType::Removed => intents.push((diff.path.as_str(), SyncAction::Delete)),
            ChangeType::Renamed => {
                if let Some(from) = &diff.rename_from {
                    intents.push((from.as_str(), SyncAction::Delete));
                }
                intents.push((diff.path.as_str(), SyncAction::Add));
            }
        }
    }

    let mut actions = BTreeMap::new();
    for (path, intent) in intents {
        let known = graph.file_id(path).is_some();
        let present = io.file_exists(path) && is_indexed(path, languages);
        let action = match (intent, known, present) {
            (_, true, false) => Some(SyncAction::Delete),
            (_, false, false) => None,
            (SyncAction::Delete, _, true) if !known => None,
            (_, true, true) => Some(SyncAction::Reparse),
            (_, false, true) => Some(SyncAction::Add),
        };
        match action {
            Some(action) => {
                actions.insert(path.to_string(), action);
            }
            None => {
                debug!(file = %path, intent = intent.as_str(), "Skipping diff");
                actions.remove(path);
            }
        }
    }
    actions
}

// ============================================================================
// Sync
// ============================================================================

/// Inputs a sync needs besides the graph and the I/O layer.
#[derive(Debug, Clone, Copy)]
pub struct SyncSettings<'a> {
    pub resolver: &'a ResolverOptions,
    pub languages: &'a [Language],
    /// Skip files that fail to read or parse instead of failing the sync
    pub ignore_process_errors: bool,
}

/// Result of one sync.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncResult {
    /// Generation stamped on every node created by this sync
    pub generation: u64,
    pub added: Vec<String>,
    pub reparsed: Vec<String>,
    pub deleted: Vec<String>,
    /// Files that failed to read or parse and were left out
    pub skipped: Vec<String>,
    pub nodes_removed: usize,
    pub nodes_added: usize,
    /// Files parsed with syntax errors
    pub parse_warnings: usize,
    pub resolve: ResolveReport,
    pub externals_pruned: usize,
}

impl SyncResult {
    pub fn has_changes(&self) -> bool {
        self.total_changes() > 0
    }

    pub fn total_changes(&self) -> usize {
        self.added.len() + self.reparsed.len() + self.deleted.len()
    }
}

/// Report of the initial build.
pub type BuildReport = SyncResult;

/// Build the graph from scratch out of `paths`.
pub fn build(
    graph: &mut CodebaseGraph,
    io: &FileIo,
    paths: Vec<String>,
    settings: &SyncSettings<'_>,
) -> Result<BuildReport> {
    info!("Building graph from {} files...", paths.len());
    let actions = paths
        .into_iter()
        .filter(|p| is_indexed(p, settings.languages))
        .map(|p| (p, SyncAction::Add))
        .collect();
    run(graph, io, actions, settings)
}

/// Reconcile the graph with `diffs`.
pub fn sync(
    graph: &mut CodebaseGraph,
    io: &FileIo,
    diffs: &[Diff],
    settings: &SyncSettings<'_>,
) -> Result<SyncResult> {
    let actions = classify(graph, io, settings.languages, diffs);
    run(graph, io, actions, settings)
}

fn run(
    graph: &mut CodebaseGraph,
    io: &FileIo,
    mut actions: BTreeMap<String, SyncAction>,
    settings: &SyncSettings<'_>,
) -> Result<SyncResult> {
    let start = Instant::now();
    let generation = graph.generation() + 1;
    let mut result = SyncResult {
        generation,
        ..Default::default()
    };

    // Parse first: nothing below can fail, so a failed parse leaves the
    // graph as it was.
    let parsed = parse_changed(graph, io, &actions, generation, settings, &mut result)?;
    for path in &result.skipped {
        match graph.file_id(path) {
            Some(_) => {
                actions.insert(path.clone(), SyncAction::Delete);
            }
            None => {
                actions.remove(path);
            }
        }
    }

    graph.begin_sync();
    let applied = apply(graph, &actions, parsed, settings, &mut result);
    graph.end_sync();
    applied?;

    graph.set_generation(generation);
    info!(
        generation,
        added = result.added.len(),
        reparsed = result.reparsed.len(),
        deleted = result.deleted.len(),
        "Sync completed in {:.2}s",
        start.elapsed().as_secs_f64()
    );
    Ok(result)
}

/// Parse every ADD/REPARSE file in parallel, in path order.
fn parse_changed(
    graph: &CodebaseGraph,
    io: &FileIo,
    actions: &BTreeMap<String, SyncAction>,
    generation: u64,
    settings: &SyncSettings<'_>,
    result: &mut SyncResult,
) -> Result<Vec<ParsedFile>> {
    let jobs: Vec<(&str, Option<NodeId>)> = actions
        .iter()
        .filter(|(_, action)| **action != SyncAction::Delete)
        .map(|(path, _)| (path.as_str(), graph.file_id(path)))
        .collect();
    if jobs.is_empty() {
        return Ok(Vec::new());
    }
    debug!("Parsing {} files...", jobs.len());

    let outcomes: Vec<Result<ParsedFile>> = jobs
        .par_iter()
        .map(|(path, file_id)| {
            let content = io.read_to_string(path).map_err(|source| SyncError::Read {
                path: path.to_string(),
                source,
            })?;
            parse_file(path, content, *file_id, generation).map_err(|source| SyncError::Parse {
                path: path.to_string(),
                source,
            })
        })
        .collect();

    let mut parsed = Vec::with_capacity(outcomes.len());
    for ((path, _), outcome) in jobs.iter().zip(outcomes) {
        match outcome {
            Ok(file) => {
                if file.has_errors() {
                    result.parse_warnings += 1;
                }
                parsed.push(file);
            }
            Err(e) if settings.ignore_process_errors => {
                warn!(file = %path, "Skipping file: {}", e);
                result.skipped.push(path.to_string());
            }
            Err(e) => return Err(e),
        }
    }
    Ok(parsed)
}

/// Mutating phases; runs with the graph marked as computing.
fn apply(
    graph: &mut CodebaseGraph,
    actions: &BTreeMap<String, SyncAction>,
    parsed: Vec<ParsedFile>,
    settings: &SyncSettings<'_>,
    result: &mut SyncResult,
) -> Result<()> {
    // Phase 1: snapshot consumers of everything about to die, then unparse
    let mut dead: HashSet<NodeId> = HashSet::new();
    let mut doomed_files = Vec::new();
    for (path, action) in actions {
        if *action == SyncAction::Add {
            continue;
        }
        if let Some(file) = graph.file(path) {
            dead.insert(file.id);
            if let Some(data) = file.as_file() {
                dead.extend(data.nodes.iter().copied());
            }
            doomed_files.push(file.id);
        }
    }

    let mut work: BTreeSet<NodeId> = BTreeSet::new();
    for id in &dead {
        work.extend(graph.predecessors(*id, None));
    }
    for path in actions.keys() {
        work.extend(graph.watchers_of(path));
    }
    work.retain(|id| !dead.contains(id));
    debug!(consumers = work.len(), "Snapshot external consumers");

    for file_id in doomed_files {
        let removed = graph.node(file_id).and_then(|n| n.as_file()).map_or(0, |f| f.nodes.len());
        graph.delete_node(file_id)?;
        result.nodes_removed += removed + 1;
    }

    // Phases 2-3: merge the new subtrees; edges of dead nodes went with them
    for file in parsed {
        let path = file.path().to_string();
        work.insert(file.file.id);
        work.extend(file.nodes.iter().map(|n| n.id));
        result.nodes_added += file.nodes.len() + 1;
        graph.insert_file(file)?;
        match actions.get(&path) {
            Some(SyncAction::Reparse) => result.reparsed.push(path),
            _ => result.added.push(path),
        }
    }
    for (path, action) in actions {
        if *action == SyncAction::Delete {
            result.deleted.push(path.clone());
        }
    }

    // Phase 4
    graph.rebuild_directories();

    // Phase 5
    let mut ids: Vec<NodeId> = work
        .into_iter()
        .filter(|id| graph.node(*id).is_some_and(|n| !n.is_external()))
        .collect();
    graph.sort_by_location(&mut ids);
    debug!("Resolving {} nodes...", ids.len());
    result.resolve = resolve_nodes(graph, &ids, settings.resolver);
    if result.resolve.unresolved_imports > 0 {
        debug!(
            unresolved = result.resolve.unresolved_imports,
            "Imports resolved to external modules"
        );
    }

    // Phase 6
    for orphan in graph.orphan_externals() {
        graph.delete_node(orphan)?;
        result.externals_pruned += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeType;
    use crate::node::NodeType;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn settings(options: &ResolverOptions) -> SyncSettings<'_> {
        SyncSettings {
            resolver: options,
            languages: &Language::ALL,
            ignore_process_errors: true,
        }
    }

    struct Repo {
        dir: TempDir,
        io: FileIo,
        graph: CodebaseGraph,
        options: ResolverOptions,
    }

    impl Repo {
        fn new(files: &[(&str, &str)]) -> Self {
            let dir = TempDir::new().unwrap();
            for (path, content) in files {
                std::fs::write(dir.path().join(path), content).unwrap();
            }
            let io = FileIo::new(dir.path());
            let mut repo = Repo {
                dir,
                io,
                graph: CodebaseGraph::new(true, false),
                options: ResolverOptions {
                    method_usages: true,
                    generics: true,
                    overrides: Default::default(),
                },
            };
            let paths = files.iter().map(|(p, _)| p.to_string()).collect();
            build(&mut repo.graph, &repo.io, paths, &settings(&repo.options)).unwrap();
            repo
        }

        fn write(&mut self, path: &str, content: &str) {
            std::fs::write(self.dir.path().join(path), content).unwrap();
            self.io.clear_cache();
        }

        fn sync(&mut self, diffs: &[Diff]) -> SyncResult {
            sync(&mut self.graph, &self.io, diffs, &settings(&self.options)).unwrap()
        }

        fn symbol(&self, path: &str, name: &str) -> Option<NodeId> {
            self.graph
                .nodes_of_type(NodeType::Symbol)
                .find(|n| n.name() == Some(name) && self.graph.file_path_of(n.id) == Some(path))
                .map(|n| n.id)
        }
    }

    #[test]
    fn test_classify_normalizes_intent() {
        let repo = Repo::new(&[("a.py", "x = 1\n"), ("b.py", "y = 2\n")]);
        std::fs::write(repo.dir.path().join("c.py"), "z = 3\n").unwrap();
        std::fs::remove_file(repo.dir.path().join("b.py")).unwrap();

        let diffs = vec![
            Diff::added("a.py", "x = 1\n"),
            Diff::modified("b.py", "y = 2\n", ""),
            Diff::modified("c.py", "", "z = 3\n"),
            Diff::removed("ghost.py", ""),
            Diff::added("notes.txt", "hi"),
        ];
        let actions = classify(&repo.graph, &repo.io, &Language::ALL, &diffs);
        let expected: BTreeMap<String, SyncAction> = [
            ("a.py".to_string(), SyncAction::Reparse),
            ("b.py".to_string(), SyncAction::Delete),
            ("c.py".to_string(), SyncAction::Add),
        ]
        .into_iter()
        .collect();
        assert_eq!(actions, expected);
    }

    #[test]
    fn test_rename_diff_deletes_and_adds() {
        let repo = Repo::new(&[("a.py", "x = 1\n")]);
        std::fs::rename(repo.dir.path().join("a.py"), repo.dir.path().join("b.py")).unwrap();
        let diffs = vec![Diff::renamed("a.py", "b.py", "x = 1\n", "x = 1\n")];
        let actions = classify(&repo.graph, &repo.io, &Language::ALL, &diffs);
        assert_eq!(actions.get("a.py"), Some(&SyncAction::Delete));
        assert_eq!(actions.get("b.py"), Some(&SyncAction::Add));
    }

    #[test]
    fn test_reparse_keeps_unrelated_generations() {
        let mut repo = Repo::new(&[
            ("a.py", "def foo(): pass\n"),
            ("b.py", "from a import foo\nfoo()\n"),
            ("c.py", "def other(): pass\n"),
        ]);
        let before = repo.graph.generation();
        let other = repo.symbol("c.py", "other").unwrap();

        repo.write("a.py", "def foo(): return 1\n");
        let result = repo.sync(&[Diff::modified("a.py", "def foo(): pass\n", "def foo(): return 1\n")]);

        assert_eq!(result.reparsed, vec!["a.py"]);
        assert_eq!(result.generation, before + 1);
        assert_eq!(repo.graph.node(other).unwrap().generation, before);

        let foo = repo.symbol("a.py", "foo").unwrap();
        assert_eq!(repo.graph.node(foo).unwrap().generation, before + 1);
        let import_users = repo.graph.predecessors(foo, Some(EdgeType::ImportSymbolResolution));
        assert_eq!(import_users.len(), 1);
        assert_eq!(repo.graph.file_path_of(import_users[0]), Some("b.py"));
    }

    #[test]
    fn test_reparse_keeps_file_identity() {
        let mut repo = Repo::new(&[("a.py", "x = 1\n")]);
        let file = repo.graph.file_id("a.py").unwrap();
        repo.write("a.py", "x = 2\n");
        repo.sync(&[Diff::modified("a.py", "x = 1\n", "x = 2\n")]);
        assert_eq!(repo.graph.file_id("a.py"), Some(file));
    }

    #[test]
    fn test_added_file_resolves_waiting_imports() {
        let mut repo = Repo::new(&[("b.py", "from a import foo\nfoo()\n")]);
        assert_eq!(repo.graph.externals().count(), 1);

        repo.write("a.py", "def foo(): pass\n");
        let result = repo.sync(&[Diff::added("a.py", "def foo(): pass\n")]);

        assert_eq!(result.added, vec!["a.py"]);
        assert_eq!(result.externals_pruned, 1);
        assert_eq!(repo.graph.externals().count(), 0);
        let foo = repo.symbol("a.py", "foo").unwrap();
        assert_eq!(repo.graph.predecessors(foo, Some(EdgeType::ImportSymbolResolution)).len(), 1);
    }

    #[test]
    fn test_deleted_file_turns_imports_external() {
        let mut repo = Repo::new(&[
            ("a.py", "def foo(): pass\n"),
            ("b.py", "from a import foo\nfoo()\n"),
        ]);
        std::fs::remove_file(repo.dir.path().join("a.py")).unwrap();
        repo.io.clear_cache();
        let result = repo.sync(&[Diff::removed("a.py", "def foo(): pass\n")]);

        assert_eq!(result.deleted, vec!["a.py"]);
        assert!(repo.graph.file_id("a.py").is_none());
        assert!(repo.graph.external("a", "foo").is_some());
        assert!(repo.graph.directories().get("").unwrap().files.contains_key("b.py"));
        assert!(!repo.graph.directories().get("").unwrap().files.contains_key("a.py"));
    }

    #[test]
    fn test_empty_sync_still_bumps_generation() {
        let mut repo = Repo::new(&[("a.py", "x = 1\n")]);
        let before = repo.graph.generation();
        let result = repo.sync(&[]);
        assert!(!result.has_changes());
        assert_eq!(repo.graph.generation(), before + 1);
    }
}
