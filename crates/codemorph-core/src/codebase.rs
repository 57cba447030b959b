//! The `Codebase` façade.
//!
//! Owns the graph, the file layer and the diff history of one repository and
//! runs sessions against them: a session's edits are queued, committed to
//! disk as one batch, and folded back into the graph by an incremental sync.
//!
//! ## Usage
//!
//! ```ignore
//! use codemorph_config::{CodebaseConfig, SessionOptions};
//! use codemorph_core::{Codebase, Editable};
//!
//! let mut codebase = Codebase::open("/path/to/repo", CodebaseConfig::default())?;
//! let outcome = codebase.session(SessionOptions::default(), |session| {
//!     session.get_function("foo")?.rename("bar")
//! })?;
//! for diff in &outcome.diffs {
//!     println!("{} {}", diff.change_type.as_str(), diff.path);
//! }
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use codemorph_config::{CodebaseConfig, ConfigError, SessionOptions};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::diff::{ChangeType, Diff};
use crate::editable::Session;
use crate::graph::{CodebaseGraph, GraphError, GraphStats};
use crate::io::{collect_source_files, content_hash, FileIo, IoError};
use crate::language::{Language, LanguageSelection};
use crate::node::NodeId;
use crate::parser::ParserError;
use crate::resolver::ResolverOptions;
use crate::sync::{self, BuildReport, SyncError, SyncResult, SyncSettings};
use crate::transaction::{TransactionError, TransactionManager};
use crate::verify::{self, VerifyReport};

// ============================================================================
// Errors
// ============================================================================

/// Errors surfaced by the façade and the editable surface.
#[derive(Debug, Error)]
pub enum CodebaseError {
    /// Two edits overlap at equal priority; nothing was written
    #[error("conflicting edits in {file}: {first} vs {second}")]
    TransactionConflict {
        file: String,
        first: String,
        second: String,
    },

    #[error("session exceeded its time budget ({elapsed:?} > {budget:?})")]
    TimeBudgetExceeded { elapsed: Duration, budget: Duration },

    #[error("session exceeded the limit of {limit} transactions")]
    MaxTransactionsExceeded { limit: usize },

    /// The graph drifted from a rebuild or broke a structural invariant
    #[error("graph invariant violated: {0}")]
    GraphInvariantViolation(String),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("ambiguous symbol '{name}': {}", .candidates.join(", "))]
    AmbiguousSymbol {
        name: String,
        candidates: Vec<String>,
    },

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error(transparent)]
    Transaction(TransactionError),

    #[error(transparent)]
    Parser(#[from] ParserError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<TransactionError> for CodebaseError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::Conflict {
                file,
                first,
                second,
            } => CodebaseError::TransactionConflict {
                file,
                first,
                second,
            },
            TransactionError::TimeBudgetExceeded { elapsed, budget } => {
                CodebaseError::TimeBudgetExceeded { elapsed, budget }
            }
            TransactionError::MaxTransactionsExceeded { limit } => {
                CodebaseError::MaxTransactionsExceeded { limit }
            }
            TransactionError::FileNotFound(path) => CodebaseError::FileNotFound(path),
            TransactionError::FileExists(path) => {
                CodebaseError::InvalidOperation(format!("file already exists: {}", path))
            }
            TransactionError::Io(e) => CodebaseError::Io(e),
            other => CodebaseError::Transaction(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CodebaseError>;

// ============================================================================
// Cancellation
// ============================================================================

/// Cloneable flag checked between commit and sync phases.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Consume a pending cancellation, if any.
    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

// ============================================================================
// Codebase
// ============================================================================

/// Outcome of a committed session.
#[derive(Debug)]
pub struct SessionOutcome<T> {
    /// Value returned by the session closure
    pub value: T,
    /// Per-file changes written by the commit
    pub diffs: Vec<Diff>,
    /// Sync that folded the changes into the graph, if one ran
    pub sync: Option<SyncResult>,
}

/// One repository: its graph, its files and its edit history.
pub struct Codebase {
    config: CodebaseConfig,
    io: FileIo,
    graph: CodebaseGraph,
    resolver: ResolverOptions,
    languages: Vec<Language>,
    /// Diffs written and synced into the graph
    applied_diffs: Vec<Diff>,
    /// Diffs written but not yet synced
    pending_diffs: Vec<Diff>,
    cancel: CancelHandle,
}

impl Codebase {
    /// Open the repository at `root`, parsing its dominant language.
    pub fn open(root: impl AsRef<Path>, config: CodebaseConfig) -> Result<Self> {
        Self::open_with_language(root, LanguageSelection::Auto, config)
    }

    /// Open the repository at `root`, parsing the selected languages.
    pub fn open_with_language(
        root: impl AsRef<Path>,
        selection: LanguageSelection,
        config: CodebaseConfig,
    ) -> Result<Self> {
        config.validate()?;
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(IoError::NotFound(root.display().to_string()).into());
        }
        let analysis = &config.analysis;
        let candidates = collect_source_files(
            root,
            &Language::ALL,
            &analysis.exclude_patterns,
            analysis.max_file_size_kb,
        )?;

        let mut counts: HashMap<Language, usize> = HashMap::new();
        for path in &candidates {
            if let Some(language) = Language::from_path(Path::new(path)) {
                *counts.entry(language).or_default() += 1;
            }
        }
        let languages = selection.resolve(&counts);
        let paths: Vec<String> = candidates
            .into_iter()
            .filter(|p| Language::from_path(Path::new(p)).is_some_and(|l| languages.contains(&l)))
            .collect();

        let flags = &config.feature_flags;
        let mut codebase = Codebase {
            io: FileIo::new(root),
            graph: CodebaseGraph::new(flags.debug, flags.full_range_index),
            resolver: ResolverOptions::from_flags(flags),
            languages,
            applied_diffs: Vec::new(),
            pending_diffs: Vec::new(),
            cancel: CancelHandle::default(),
            config,
        };
        let report = codebase.build(paths)?;
        info!(
            root = %root.display(),
            files = codebase.graph.file_count(),
            nodes = codebase.graph.node_count(),
            edges = codebase.graph.edge_count(),
            skipped = report.skipped.len(),
            "Opened codebase"
        );
        Ok(codebase)
    }

    /// Write `files` under `root` and open the result with every language.
    pub fn from_files(
        root: impl AsRef<Path>,
        files: &[(&str, &str)],
        config: CodebaseConfig,
    ) -> Result<Self> {
        let root = root.as_ref();
        let mut io = FileIo::new(root);
        for (path, content) in files {
            let rel = io.normalize(path)?;
            io.write(rel, *content);
        }
        io.save_files().map_err(|(err, _)| err)?;
        Self::open_with_language(root, LanguageSelection::All, config)
    }

    fn build(&mut self, paths: Vec<String>) -> Result<BuildReport> {
        let settings = SyncSettings {
            resolver: &self.resolver,
            languages: &self.languages,
            ignore_process_errors: self.config.feature_flags.ignore_process_errors,
        };
        let report = sync::build(&mut self.graph, &self.io, paths, &settings)?;
        if self.config.feature_flags.verify_graph {
            self.check_graph()?;
        }
        Ok(report)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn root(&self) -> &Path {
        self.io.root()
    }

    pub fn config(&self) -> &CodebaseConfig {
        &self.config
    }

    pub fn graph(&self) -> &CodebaseGraph {
        &self.graph
    }

    pub fn languages(&self) -> &[Language] {
        &self.languages
    }

    pub fn stats(&self) -> GraphStats {
        self.graph.stats()
    }

    /// Diffs committed and synced so far.
    pub fn applied_diffs(&self) -> &[Diff] {
        &self.applied_diffs
    }

    /// Diffs committed but not yet synced into the graph.
    pub fn pending_diffs(&self) -> &[Diff] {
        &self.pending_diffs
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.take() {
            warn!("Cancellation requested");
            return Err(CodebaseError::Cancelled);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------------

    /// Run read-only queries against the current graph.
    pub fn read<T>(&self, query: impl FnOnce(&Session<'_>) -> T) -> T {
        let session = Session::new(&self.graph, &self.io, &self.config.session);
        query(&session)
    }

    /// Run `edit` in a session with the configured default limits.
    pub fn with_session<T>(
        &mut self,
        edit: impl FnOnce(&Session<'_>) -> Result<T>,
    ) -> Result<SessionOutcome<T>> {
        let options = self.config.session.clone();
        self.session(options, edit)
    }

    /// Run `edit` in a session, then commit and sync what it queued.
    ///
    /// If `edit` fails nothing is written. If the commit fails the files are
    /// left as they were. If the sync fails (or the cancel handle fires
    /// around it) the written files are restored and the graph resynced.
    pub fn session<T>(
        &mut self,
        options: SessionOptions,
        edit: impl FnOnce(&Session<'_>) -> Result<T>,
    ) -> Result<SessionOutcome<T>> {
        options.validate()?;
        self.check_cancelled()?;

        let (value, mut transactions) = {
            let session = Session::new(&self.graph, &self.io, &options);
            let value = edit(&session);
            (value, session.into_transactions())
        };
        let value = match value {
            Ok(value) => value,
            Err(e) => {
                transactions.clear();
                return Err(e);
            }
        };

        if let Err(e) = self.check_cancelled() {
            transactions.clear();
            return Err(e);
        }
        let diffs = transactions.commit(&mut self.io, true)?;
        let sync = self.finish_commit(&diffs, &transactions)?;
        Ok(SessionOutcome { value, diffs, sync })
    }

    /// Record freshly written `diffs` and sync them when tracking is on.
    ///
    /// The session's time budget is checked again once the files are written
    /// and once the sync is done; a spent budget reverts `diffs`.
    fn finish_commit(
        &mut self,
        diffs: &[Diff],
        transactions: &TransactionManager,
    ) -> Result<Option<SyncResult>> {
        let flags = &self.config.feature_flags;
        if !(flags.track_graph && flags.sync_enabled) {
            if let Err(e) = transactions.check_time_budget() {
                error!("Time budget spent after commit, reverting {} diff(s)", diffs.len());
                if let Err(revert) = self.revert(diffs) {
                    error!("Failed to restore files: {}", revert);
                }
                return Err(e.into());
            }
            self.pending_diffs.extend(diffs.iter().cloned());
            return Ok(None);
        }
        self.pending_diffs.extend(diffs.iter().cloned());
        if self.pending_diffs.is_empty() {
            return Ok(None);
        }

        let within_budget = || transactions.check_time_budget().map_err(CodebaseError::from);
        let pending = std::mem::take(&mut self.pending_diffs);
        let synced = self
            .check_cancelled()
            .and_then(|_| within_budget())
            .and_then(|_| self.sync_checked(&pending))
            .and_then(|result| self.check_cancelled().map(|_| result))
            .and_then(|result| within_budget().map(|_| result));
        match synced {
            Ok(result) => {
                self.applied_diffs.extend(pending);
                Ok(Some(result))
            }
            Err(e) => {
                error!("Sync after commit failed, reverting {} diff(s): {}", diffs.len(), e);
                let earlier = pending.len() - diffs.len();
                self.pending_diffs = pending[..earlier].to_vec();
                self.rollback(diffs, &pending);
                Err(e)
            }
        }
    }

    /// Put `diffs` back on disk and resync every path `touched` names.
    fn rollback(&mut self, diffs: &[Diff], touched: &[Diff]) {
        let reversed = match self.revert(diffs) {
            Ok(reversed) => reversed,
            Err(e) => {
                error!("Failed to restore files: {}", e);
                return;
            }
        };
        let mut resync: Vec<Diff> = touched.to_vec();
        resync.extend(reversed);
        if let Err(e) = self.sync_graph(&resync) {
            error!("Resync after rollback failed: {}", e);
        }
    }

    /// Write the reverse of `diffs` to disk, newest first. Returns the
    /// reversed diffs in the order they were applied.
    fn revert(&mut self, diffs: &[Diff]) -> Result<Vec<Diff>> {
        let mut reversed = Vec::with_capacity(diffs.len());
        for diff in diffs.iter().rev() {
            match diff.change_type {
                ChangeType::Added => self.io.delete(diff.path.clone()),
                ChangeType::Removed | ChangeType::Modified => self.io.write(
                    diff.path.clone(),
                    diff.old_content.clone().unwrap_or_default(),
                ),
                ChangeType::Renamed => {
                    self.io.delete(diff.path.clone());
                    if let Some(from) = &diff.rename_from {
                        self.io
                            .write(from.clone(), diff.old_content.clone().unwrap_or_default());
                    }
                }
            }
            reversed.push(diff.reversed());
        }
        self.io.save_files().map_err(|(err, _)| err)?;
        self.io.clear_cache();
        Ok(reversed)
    }

    // ------------------------------------------------------------------------
    // Sync
    // ------------------------------------------------------------------------

    fn sync_graph(&mut self, diffs: &[Diff]) -> Result<SyncResult> {
        let settings = SyncSettings {
            resolver: &self.resolver,
            languages: &self.languages,
            ignore_process_errors: self.config.feature_flags.ignore_process_errors,
        };
        Ok(sync::sync(&mut self.graph, &self.io, diffs, &settings)?)
    }

    /// Sync, then verify when `verify_graph` is set.
    fn sync_checked(&mut self, diffs: &[Diff]) -> Result<SyncResult> {
        let result = self.sync_graph(diffs)?;
        if self.config.feature_flags.verify_graph {
            self.check_graph()?;
        }
        Ok(result)
    }

    fn check_graph(&self) -> Result<()> {
        let report = verify::verify_graph(&self.graph, &self.resolver);
        if report.is_ok() {
            return Ok(());
        }
        Err(CodebaseError::GraphInvariantViolation(
            report.violations.join("; "),
        ))
    }

    /// Sync changes made to the files outside any session.
    pub fn apply_diffs(&mut self, diffs: Vec<Diff>) -> Result<SyncResult> {
        self.io.clear_cache();
        let result = self.sync_checked(&diffs)?;
        self.applied_diffs.extend(diffs);
        Ok(result)
    }

    /// Diffs between the graph and the files currently on disk.
    pub fn detect_changes(&self) -> Result<Vec<Diff>> {
        self.io.clear_cache();
        let analysis = &self.config.analysis;
        let on_disk: BTreeSet<String> = collect_source_files(
            self.io.root(),
            &self.languages,
            &analysis.exclude_patterns,
            analysis.max_file_size_kb,
        )?
        .into_iter()
        .collect();

        let mut diffs = Vec::new();
        for path in &on_disk {
            let content = self.io.read_to_string(path)?;
            match self.graph.file(path).and_then(|n| n.as_file()) {
                Some(file) if file.hash == content_hash(&content) => {}
                Some(file) => diffs.push(Diff::modified(
                    path.clone(),
                    file.content.to_string(),
                    content.to_string(),
                )),
                None => diffs.push(Diff::added(path.clone(), content.to_string())),
            }
        }
        for file in self.graph.files().filter_map(|n| n.as_file()) {
            if !on_disk.contains(&file.path) {
                diffs.push(Diff::removed(file.path.clone(), file.content.to_string()));
            }
        }
        diffs.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(diffs)
    }

    /// Detect out-of-band changes and sync them.
    pub fn refresh(&mut self) -> Result<SyncResult> {
        let diffs = self.detect_changes()?;
        self.apply_diffs(diffs)
    }

    /// Sync diffs that were committed while tracking was off.
    pub fn sync_pending(&mut self) -> Result<Option<SyncResult>> {
        if self.pending_diffs.is_empty() {
            return Ok(None);
        }
        let pending = std::mem::take(&mut self.pending_diffs);
        match self.sync_checked(&pending) {
            Ok(result) => {
                self.applied_diffs.extend(pending);
                Ok(Some(result))
            }
            Err(e) => {
                self.pending_diffs = pending;
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Undo
    // ------------------------------------------------------------------------

    /// Restore every file touched by applied or pending diffs and rebuild
    /// the affected part of the graph in one sync.
    pub fn reset(&mut self) -> Result<Option<SyncResult>> {
        let mut diffs = std::mem::take(&mut self.applied_diffs);
        diffs.append(&mut self.pending_diffs);
        self.undo(diffs)
    }

    /// Like [`reset`](Self::reset), restricted to diffs already synced.
    pub fn undo_applied_diffs(&mut self) -> Result<Option<SyncResult>> {
        let diffs = std::mem::take(&mut self.applied_diffs);
        self.undo(diffs)
    }

    fn undo(&mut self, diffs: Vec<Diff>) -> Result<Option<SyncResult>> {
        if diffs.is_empty() {
            return Ok(None);
        }
        info!(diffs = diffs.len(), "Resetting codebase");
        let reversed = self.revert(&diffs)?;
        self.sync_checked(&reversed).map(Some)
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Check graph invariants and compare against a rebuild.
    pub fn verify(&self) -> VerifyReport {
        verify::verify_graph(&self.graph, &self.resolver)
    }

    /// Serialize `ids` and the edges among them.
    pub fn subgraph(&self, ids: &[NodeId]) -> Value {
        let selected: BTreeSet<NodeId> = ids
            .iter()
            .copied()
            .filter(|id| self.graph.contains(*id))
            .collect();
        let nodes: Vec<Value> = selected
            .iter()
            .filter_map(|id| self.graph.node(*id))
            .map(|node| {
                json!({
                    "id": node.id.as_u64(),
                    "type": node.node_type(),
                    "kind": node.ts_kind,
                    "name": node.name(),
                    "file": self.graph.file_path_of(node.id),
                    "range": [node.range.start, node.range.end],
                    "generation": node.generation,
                })
            })
            .collect();
        let edges: Vec<Value> = selected
            .iter()
            .flat_map(|id| self.graph.out_edges(*id, None))
            .filter(|edge| selected.contains(&edge.target))
            .map(|edge| {
                let usage = edge.data.usage.as_ref();
                json!({
                    "source": edge.source.as_u64(),
                    "target": edge.target.as_u64(),
                    "type": edge.data.edge_type,
                    "kinds": usage.map(|u| u.kinds.iter().collect::<Vec<_>>()),
                    "match": usage.map(|u| [u.match_range.start, u.match_range.end]),
                })
            })
            .collect();
        json!({ "nodes": nodes, "edges": edges })
    }

    /// Serialize one file, everything it owns and the edges among them.
    pub fn file_subgraph(&self, path: &str) -> Result<Value> {
        let rel = self.io.normalize(path)?;
        let file = self
            .graph
            .file(&rel)
            .ok_or_else(|| CodebaseError::FileNotFound(rel.clone()))?;
        let mut ids = vec![file.id];
        if let Some(data) = file.as_file() {
            ids.extend(data.nodes.iter().copied());
        }
        Ok(self.subgraph(&ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editable::Editable;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn open(files: &[(&str, &str)]) -> (TempDir, Codebase) {
        let dir = TempDir::new().unwrap();
        let codebase = Codebase::from_files(dir.path(), files, CodebaseConfig::for_tests()).unwrap();
        (dir, codebase)
    }

    fn read(dir: &TempDir, path: &str) -> String {
        std::fs::read_to_string(dir.path().join(path)).unwrap()
    }

    #[test]
    fn test_failed_closure_writes_nothing() {
        let (dir, mut codebase) = open(&[("a.py", "def f():\n    pass\n")]);
        let err = codebase
            .with_session(|s| {
                s.get_function("f")?.rename("g")?;
                s.get_function("missing").map(|_| ())
            })
            .unwrap_err();
        assert!(matches!(err, CodebaseError::SymbolNotFound(_)));
        assert_eq!(read(&dir, "a.py"), "def f():\n    pass\n");
        assert!(codebase.applied_diffs().is_empty());
    }

    #[test]
    fn test_cancelled_session_is_reverted() {
        let (dir, mut codebase) = open(&[("a.py", "def f():\n    pass\n")]);
        let handle = codebase.cancel_handle();
        let err = codebase
            .with_session(|s| {
                s.get_function("f")?.rename("g")?;
                handle.cancel();
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, CodebaseError::Cancelled));
        assert_eq!(read(&dir, "a.py"), "def f():\n    pass\n");
        assert!(!handle.is_cancelled());
    }

    /// Commit a rename of `f` to `g` outside `session`.
    fn commit_rename(codebase: &mut Codebase) -> Vec<Diff> {
        let options = SessionOptions::default();
        let mut transactions = {
            let session = Session::new(&codebase.graph, &codebase.io, &options);
            session.get_function("f").unwrap().rename("g").unwrap();
            session.into_transactions()
        };
        transactions.commit(&mut codebase.io, true).unwrap()
    }

    fn spent_budget() -> TransactionManager {
        let mut transactions = TransactionManager::new();
        transactions.begin(&SessionOptions::default().with_max_seconds(0));
        transactions
    }

    #[test]
    fn test_budget_spent_during_sync_reverts_commit() {
        let (dir, mut codebase) = open(&[("a.py", "def f():\n    pass\n")]);
        let canonical = verify::canonical_form(codebase.graph());
        let diffs = commit_rename(&mut codebase);
        assert_eq!(read(&dir, "a.py"), "def g():\n    pass\n");

        let err = codebase.finish_commit(&diffs, &spent_budget()).unwrap_err();
        assert!(matches!(err, CodebaseError::TimeBudgetExceeded { .. }), "{:?}", err);
        assert_eq!(read(&dir, "a.py"), "def f():\n    pass\n");
        assert!(codebase.pending_diffs().is_empty());
        assert_eq!(verify::canonical_form(codebase.graph()), canonical);
    }

    #[test]
    fn test_budget_spent_after_untracked_commit_reverts_files() {
        let dir = TempDir::new().unwrap();
        let mut config = CodebaseConfig::for_tests();
        config.feature_flags.sync_enabled = false;
        let mut codebase =
            Codebase::from_files(dir.path(), &[("a.py", "def f():\n    pass\n")], config).unwrap();
        let diffs = commit_rename(&mut codebase);

        let err = codebase.finish_commit(&diffs, &spent_budget()).unwrap_err();
        assert!(matches!(err, CodebaseError::TimeBudgetExceeded { .. }), "{:?}", err);
        assert_eq!(read(&dir, "a.py"), "def f():\n    pass\n");
        assert!(codebase.pending_diffs().is_empty());
    }

    #[test]
    fn test_untracked_commits_stay_pending() {
        let dir = TempDir::new().unwrap();
        let mut config = CodebaseConfig::for_tests();
        config.feature_flags.track_graph = false;
        let mut codebase = Codebase::from_files(dir.path(), &[("a.py", "x = 1\n")], config).unwrap();

        let outcome = codebase
            .with_session(|s| s.get_file("a.py")?.edit("x = 2\n"))
            .unwrap();
        assert!(outcome.sync.is_none());
        assert_eq!(codebase.pending_diffs().len(), 1);
        assert_eq!(
            codebase.graph().file("a.py").and_then(|n| n.as_file()).map(|f| &*f.content),
            Some("x = 1\n")
        );

        codebase.sync_pending().unwrap();
        assert!(codebase.pending_diffs().is_empty());
        assert_eq!(
            codebase.graph().file("a.py").and_then(|n| n.as_file()).map(|f| &*f.content),
            Some("x = 2\n")
        );
    }

    #[test]
    fn test_detect_changes_sees_out_of_band_edits() {
        let (dir, mut codebase) = open(&[("a.py", "x = 1\n"), ("b.py", "y = 1\n")]);
        std::fs::write(dir.path().join("a.py"), "x = 2\n").unwrap();
        std::fs::remove_file(dir.path().join("b.py")).unwrap();
        std::fs::write(dir.path().join("c.py"), "z = 1\n").unwrap();

        let diffs = codebase.detect_changes().unwrap();
        let kinds: Vec<(&str, ChangeType)> =
            diffs.iter().map(|d| (d.path.as_str(), d.change_type)).collect();
        assert_eq!(
            kinds,
            vec![
                ("a.py", ChangeType::Modified),
                ("b.py", ChangeType::Removed),
                ("c.py", ChangeType::Added),
            ]
        );

        codebase.refresh().unwrap();
        assert!(codebase.detect_changes().unwrap().is_empty());
        assert!(codebase.verify().is_ok());
    }

    #[test]
    fn test_subgraph_lists_edges_between_selected_nodes() {
        let (_dir, codebase) = open(&[
            ("a.py", "def f():\n    pass\n"),
            ("b.py", "from a import f\n\nf()\n"),
        ]);
        let value = codebase.file_subgraph("b.py").unwrap();
        let nodes = value["nodes"].as_array().unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0]["type"], "FILE");
        assert_eq!(nodes[1]["type"], "IMPORT");
        // b.py -> import (direct usage); the symbol in a.py is outside the selection
        let edges = value["edges"].as_array().unwrap();
        assert!(edges.iter().all(|e| e["type"] == "SYMBOL_USAGE"));
    }
}
