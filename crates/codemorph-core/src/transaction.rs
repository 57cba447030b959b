//! Transaction manager.
//!
//! Edits are never applied to the graph directly. Every editable operation
//! enqueues byte-range [`Transaction`]s (or whole-file [`FileOperation`]s)
//! against the session snapshot; [`TransactionManager::commit`] orders them,
//! resolves conflicts, computes the new content of every touched file, stages
//! it in the I/O layer and flushes it.
//!
//! Per file, the effect of a commit equals applying the surviving
//! transactions back to front, so earlier offsets stay valid. A commit that
//! hits an unresolvable conflict touches nothing.
//!
//! ## Usage
//!
//! ```ignore
//! let mut tx = TransactionManager::new();
//! tx.begin(&SessionOptions::default());
//! tx.replace("a.py", ByteRange::new(4, 7), "bar", 0)?;
//! let diffs = tx.commit(&mut io, true)?;
//! ```

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use codemorph_config::SessionOptions;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::diff::Diff;
use crate::io::{FileIo, IoError, PendingWrite};
use crate::syntax::ByteRange;

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while queueing or committing transactions.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Two edits overlap at equal priority
    #[error("conflicting edits in {file}: {first} vs {second}")]
    Conflict {
        file: String,
        first: String,
        second: String,
    },

    #[error("session exceeded the limit of {limit} transactions")]
    MaxTransactionsExceeded { limit: usize },

    #[error("session exceeded its time budget ({elapsed:?} > {budget:?})")]
    TimeBudgetExceeded { elapsed: Duration, budget: Duration },

    /// Edit range does not fit the file content
    #[error("edit {start}..{end} is out of bounds for {file} ({len} bytes)")]
    OutOfBounds {
        file: String,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("file already exists: {0}")]
    FileExists(String),

    #[error(transparent)]
    Io(#[from] IoError),
}

pub type Result<T> = std::result::Result<T, TransactionError>;

// ============================================================================
// Transactions
// ============================================================================

/// Kind of a byte-range edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionKind {
    Replace,
    Remove,
    InsertBefore,
    InsertAfter,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Replace => "replace",
            TransactionKind::Remove => "remove",
            TransactionKind::InsertBefore => "insert_before",
            TransactionKind::InsertAfter => "insert_after",
        }
    }

    /// Tie-break among edits starting at the same offset.
    fn order(&self) -> u8 {
        match self {
            TransactionKind::Replace | TransactionKind::Remove => 0,
            TransactionKind::InsertAfter => 1,
            TransactionKind::InsertBefore => 2,
        }
    }

    fn is_insert(&self) -> bool {
        matches!(self, TransactionKind::InsertBefore | TransactionKind::InsertAfter)
    }
}

/// A single byte-range edit queued against a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub file: String,
    /// Replaced range; zero-width at the insertion point for inserts
    pub range: ByteRange,
    pub new_content: String,
    pub priority: i32,
    pub kind: TransactionKind,
    seq: u64,
}

impl Transaction {
    /// Same edit, ignoring queue order.
    fn same_edit(&self, other: &Transaction) -> bool {
        self.range == other.range
            && self.kind == other.kind
            && self.new_content == other.new_content
            && self.priority == other.priority
    }

    /// Whether the two edits touch overlapping bytes.
    ///
    /// Inserts only conflict with a replacement that strictly surrounds
    /// their insertion point; two inserts never conflict. Overlapping
    /// removals merge into their union.
    fn conflicts_with(&self, other: &Transaction) -> bool {
        match (self.kind.is_insert(), other.kind.is_insert()) {
            (true, true) => false,
            (true, false) => other.range.strictly_contains_offset(self.range.start),
            (false, true) => self.range.strictly_contains_offset(other.range.start),
            (false, false) => {
                self.range.overlaps(&other.range)
                    && !(self.kind == TransactionKind::Remove && other.kind == TransactionKind::Remove)
            }
        }
    }

    /// A removal that swallows `other` entirely.
    fn subsumes(&self, other: &Transaction) -> bool {
        self.kind == TransactionKind::Remove && self.range.contains(&other.range)
    }
}

impl std::fmt::Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}..{} {:?} (priority {})",
            self.kind.as_str(),
            self.range.start,
            self.range.end,
            self.new_content,
            self.priority
        )
    }
}

/// A whole-file operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOperation {
    Create { path: String, content: String },
    Delete { path: String },
    Rename { from: String, to: String },
}

/// Result of planning a commit, before anything is staged.
#[derive(Debug, Clone, Default)]
pub struct CommitPlan {
    /// Final state of every file that changes
    pub writes: BTreeMap<String, PendingWrite>,
    /// Content each touched file had before the commit (`None`: absent)
    pub originals: BTreeMap<String, Option<String>>,
    pub diffs: Vec<Diff>,
}

// ============================================================================
// Transaction manager
// ============================================================================

/// Collects transactions for one session and commits them.
#[derive(Debug, Default)]
pub struct TransactionManager {
    queued: BTreeMap<String, Vec<Transaction>>,
    file_ops: Vec<FileOperation>,
    next_seq: u64,
    count: usize,
    max_transactions: Option<usize>,
    started: Option<Instant>,
    budget: Option<Duration>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session with the given limits, discarding anything queued.
    pub fn begin(&mut self, options: &SessionOptions) {
        self.clear();
        self.max_transactions = options.max_transactions;
        self.budget = options.max_seconds.map(Duration::from_secs);
        self.started = Some(Instant::now());
    }

    /// Drop every queued transaction.
    pub fn clear(&mut self) {
        self.queued.clear();
        self.file_ops.clear();
        self.count = 0;
    }

    /// Number of queued transactions and file operations.
    pub fn pending_count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Files with queued byte edits.
    pub fn pending_files(&self) -> impl Iterator<Item = &str> {
        self.queued.keys().map(String::as_str)
    }

    /// Queued byte edits for one file, in queue order.
    pub fn transactions(&self, file: &str) -> &[Transaction] {
        self.queued.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Fail if the session's wall-clock budget is spent.
    pub fn check_time_budget(&self) -> Result<()> {
        if let (Some(started), Some(budget)) = (self.started, self.budget) {
            let elapsed = started.elapsed();
            if elapsed >= budget {
                return Err(TransactionError::TimeBudgetExceeded { elapsed, budget });
            }
        }
        Ok(())
    }

    fn admit(&mut self) -> Result<u64> {
        self.check_time_budget()?;
        if let Some(limit) = self.max_transactions {
            if self.count >= limit {
                return Err(TransactionError::MaxTransactionsExceeded { limit });
            }
        }
        self.count += 1;
        self.next_seq += 1;
        Ok(self.next_seq)
    }

    // ------------------------------------------------------------------------
    // Enqueue
    // ------------------------------------------------------------------------

    /// Queue a byte-range edit.
    pub fn enqueue(
        &mut self,
        file: impl Into<String>,
        range: ByteRange,
        new_content: impl Into<String>,
        priority: i32,
        kind: TransactionKind,
    ) -> Result<()> {
        let seq = self.admit()?;
        let file = file.into();
        let range = if kind.is_insert() {
            ByteRange::empty(range.start)
        } else {
            range
        };
        let new_content = match kind {
            TransactionKind::Remove => String::new(),
            _ => new_content.into(),
        };
        self.queued.entry(file.clone()).or_default().push(Transaction {
            file,
            range,
            new_content,
            priority,
            kind,
            seq,
        });
        Ok(())
    }

    pub fn replace(
        &mut self,
        file: impl Into<String>,
        range: ByteRange,
        new_content: impl Into<String>,
        priority: i32,
    ) -> Result<()> {
        self.enqueue(file, range, new_content, priority, TransactionKind::Replace)
    }

    pub fn remove(&mut self, file: impl Into<String>, range: ByteRange, priority: i32) -> Result<()> {
        self.enqueue(file, range, "", priority, TransactionKind::Remove)
    }

    pub fn insert_before(
        &mut self,
        file: impl Into<String>,
        offset: usize,
        text: impl Into<String>,
        priority: i32,
    ) -> Result<()> {
        self.enqueue(file, ByteRange::empty(offset), text, priority, TransactionKind::InsertBefore)
    }

    pub fn insert_after(
        &mut self,
        file: impl Into<String>,
        offset: usize,
        text: impl Into<String>,
        priority: i32,
    ) -> Result<()> {
        self.enqueue(file, ByteRange::empty(offset), text, priority, TransactionKind::InsertAfter)
    }

    /// Queue a whole-file operation.
    pub fn file_operation(&mut self, op: FileOperation) -> Result<()> {
        self.admit()?;
        self.file_ops.push(op);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Planning
    // ------------------------------------------------------------------------

    /// Transactions of one file in application order: start descending,
    /// then priority descending, then kind, then newest first.
    fn ordered(transactions: &[Transaction]) -> Vec<&Transaction> {
        let mut ordered: Vec<&Transaction> = transactions.iter().collect();
        ordered.sort_by_key(|t| {
            (
                Reverse(t.range.start),
                Reverse(t.priority),
                t.kind.order(),
                Reverse(t.seq),
            )
        });
        ordered
    }

    /// Drop duplicates and conflict losers; fail on an unresolvable tie.
    fn resolve_conflicts<'t>(file: &str, transactions: &'t [Transaction]) -> Result<Vec<&'t Transaction>> {
        let mut accepted: Vec<&Transaction> = Vec::new();

        'candidates: for candidate in Self::ordered(transactions) {
            let mut beaten = BTreeSet::new();
            for (i, existing) in accepted.iter().enumerate() {
                if existing.same_edit(candidate) {
                    continue 'candidates;
                }
                if !existing.conflicts_with(candidate) {
                    continue;
                }
                if existing.priority > candidate.priority || existing.subsumes(candidate) {
                    continue 'candidates;
                }
                if candidate.priority > existing.priority || candidate.subsumes(existing) {
                    beaten.insert(i);
                    continue;
                }
                return Err(TransactionError::Conflict {
                    file: file.to_string(),
                    first: existing.to_string(),
                    second: candidate.to_string(),
                });
            }
            let mut index = 0;
            accepted.retain(|_| {
                let keep = !beaten.contains(&index);
                index += 1;
                keep
            });
            accepted.push(candidate);
        }
        Ok(accepted)
    }

    /// Apply non-conflicting edits to `content`.
    ///
    /// Equivalent to applying them back to front; built front to back so
    /// each byte is copied once. At a shared offset the text reads: inserts
    /// before, inserts after, then the replacement.
    fn apply(file: &str, content: &str, mut edits: Vec<&Transaction>) -> Result<String> {
        for edit in &edits {
            let ByteRange { start, end } = edit.range;
            if end > content.len()
                || start > end
                || !content.is_char_boundary(start)
                || !content.is_char_boundary(end)
            {
                return Err(TransactionError::OutOfBounds {
                    file: file.to_string(),
                    start,
                    end,
                    len: content.len(),
                });
            }
        }

        edits.sort_by_key(|t| (t.range.start, Reverse(t.kind.order()), t.seq));
        let mut out = String::with_capacity(content.len());
        let mut cursor = 0;
        for edit in edits {
            if edit.range.start < cursor {
                if edit.kind == TransactionKind::Remove {
                    cursor = cursor.max(edit.range.end);
                } else {
                    debug!(file, edit = %edit, "Edit swallowed by an earlier replacement");
                }
                continue;
            }
            out.push_str(&content[cursor..edit.range.start]);
            out.push_str(&edit.new_content);
            cursor = if edit.kind.is_insert() {
                edit.range.start
            } else {
                edit.range.end
            };
        }
        out.push_str(&content[cursor..]);
        Ok(out)
    }

    /// Compute the result of committing, without staging anything.
    pub fn plan(&self, io: &FileIo) -> Result<CommitPlan> {
        let mut originals: BTreeMap<String, Option<String>> = BTreeMap::new();
        let mut current: BTreeMap<String, Option<String>> = BTreeMap::new();

        let load = |path: &str,
                        originals: &mut BTreeMap<String, Option<String>>,
                        current: &mut BTreeMap<String, Option<String>>| {
            if !current.contains_key(path) {
                let content = io.read_to_string(path).ok().map(|c| c.to_string());
                originals.insert(path.to_string(), content.clone());
                current.insert(path.to_string(), content);
            }
        };

        for (file, transactions) in &self.queued {
            load(file, &mut originals, &mut current);
            let Some(Some(content)) = current.get(file) else {
                return Err(TransactionError::FileNotFound(file.clone()));
            };
            let edits = Self::resolve_conflicts(file, transactions)?;
            let updated = Self::apply(file, content, edits)?;
            current.insert(file.clone(), Some(updated));
        }

        let mut renames: Vec<(String, String)> = Vec::new();
        for op in &self.file_ops {
            match op {
                FileOperation::Create { path, content } => {
                    load(path, &mut originals, &mut current);
                    if matches!(current.get(path), Some(Some(_))) {
                        return Err(TransactionError::FileExists(path.clone()));
                    }
                    current.insert(path.clone(), Some(content.clone()));
                }
                FileOperation::Delete { path } => {
                    load(path, &mut originals, &mut current);
                    if !matches!(current.get(path), Some(Some(_))) {
                        return Err(TransactionError::FileNotFound(path.clone()));
                    }
                    current.insert(path.clone(), None);
                }
                FileOperation::Rename { from, to } => {
                    load(from, &mut originals, &mut current);
                    load(to, &mut originals, &mut current);
                    let Some(Some(content)) = current.get(from).cloned() else {
                        return Err(TransactionError::FileNotFound(from.clone()));
                    };
                    if matches!(current.get(to), Some(Some(_))) {
                        return Err(TransactionError::FileExists(to.clone()));
                    }
                    current.insert(from.clone(), None);
                    current.insert(to.clone(), Some(content));
                    renames.push((from.clone(), to.clone()));
                }
            }
        }

        let mut plan = CommitPlan::default();
        let mut folded: BTreeSet<String> = BTreeSet::new();
        for (from, to) in &renames {
            let old = originals.get(from).cloned().flatten();
            let new = current.get(to).cloned().flatten();
            if let (Some(old), Some(new), Some(None)) = (old, new, originals.get(to)) {
                if matches!(current.get(from), Some(None)) {
                    plan.diffs.push(Diff::renamed(from.clone(), to.clone(), old, new));
                    folded.insert(from.clone());
                    folded.insert(to.clone());
                }
            }
        }

        for (path, new) in &current {
            let old = originals.get(path).cloned().flatten();
            if old.as_ref() == new.as_ref() {
                continue;
            }
            plan.writes.insert(
                path.clone(),
                match new {
                    Some(content) => PendingWrite::Write(content.clone()),
                    None => PendingWrite::Delete,
                },
            );
            if folded.contains(path) {
                continue;
            }
            match (old, new) {
                (None, Some(new)) => plan.diffs.push(Diff::added(path.clone(), new.clone())),
                (Some(old), None) => plan.diffs.push(Diff::removed(path.clone(), old)),
                (Some(old), Some(new)) => {
                    plan.diffs.push(Diff::modified(path.clone(), old, new.clone()))
                }
                (None, None) => {}
            }
        }
        plan.diffs.sort_by(|a, b| a.path.cmp(&b.path));
        plan.originals = originals;
        Ok(plan)
    }

    // ------------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------------

    /// Commit every queued transaction.
    ///
    /// Writes are staged in `io` and, with `flush`, saved to disk; a failed
    /// save restores the files already written. The queue is empty afterwards
    /// whether or not the commit succeeded.
    pub fn commit(&mut self, io: &mut FileIo, flush: bool) -> Result<Vec<Diff>> {
        let planned = self.check_time_budget().and_then(|_| self.plan(io));
        let pending = self.count;
        self.clear();
        let plan = planned?;

        if plan.diffs.is_empty() {
            debug!(transactions = pending, "Commit produced no changes");
            return Ok(Vec::new());
        }

        for (path, write) in &plan.writes {
            match write {
                PendingWrite::Write(content) => io.write(path.clone(), content.clone()),
                PendingWrite::Delete => io.delete(path.clone()),
            }
        }
        if !flush {
            return Ok(plan.diffs);
        }

        match io.save_files() {
            Ok(written) => {
                info!(
                    transactions = pending,
                    files = written.len(),
                    "Committed transactions"
                );
                Ok(plan.diffs)
            }
            Err((err, written)) => {
                error!("Commit failed, rolling back {} file(s)", written.len());
                restore(io, &plan.originals, &written);
                Err(err.into())
            }
        }
    }
}

/// Put `paths` back to their `originals` on disk.
pub(crate) fn restore(io: &mut FileIo, originals: &BTreeMap<String, Option<String>>, paths: &[String]) {
    io.discard_pending();
    for path in paths {
        match originals.get(path) {
            Some(Some(content)) => io.write(path.clone(), content.clone()),
            Some(None) => io.delete(path.clone()),
            None => {}
        }
    }
    if let Err((err, _)) = io.save_files() {
        error!("Rollback failed: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn repo(files: &[(&str, &str)]) -> (TempDir, FileIo) {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let abs = dir.path().join(path);
            std::fs::create_dir_all(abs.parent().unwrap()).unwrap();
            std::fs::write(abs, content).unwrap();
        }
        let io = FileIo::new(dir.path());
        (dir, io)
    }

    fn read(dir: &TempDir, path: &str) -> String {
        std::fs::read_to_string(dir.path().join(path)).unwrap()
    }

    fn manager() -> TransactionManager {
        let mut tx = TransactionManager::new();
        tx.begin(&SessionOptions::default());
        tx
    }

    #[test]
    fn test_edits_apply_back_to_front() {
        let (dir, mut io) = repo(&[("a.py", "def foo(): pass\nfoo()\n")]);
        let mut tx = manager();
        tx.replace("a.py", ByteRange::new(16, 19), "bar", 0).unwrap();
        tx.replace("a.py", ByteRange::new(4, 7), "bar", 0).unwrap();
        let diffs = tx.commit(&mut io, true).unwrap();
        assert_eq!(read(&dir, "a.py"), "def bar(): pass\nbar()\n");
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].change_type, crate::diff::ChangeType::Modified);
        assert!(tx.is_empty());
    }

    #[test]
    fn test_equal_priority_conflict_touches_nothing() {
        let (dir, mut io) = repo(&[("f.py", "aaaa\n"), ("g.py", "x\n")]);
        let mut tx = manager();
        tx.replace("g.py", ByteRange::new(0, 1), "y", 0).unwrap();
        tx.replace("f.py", ByteRange::new(0, 4), "bbbb", 0).unwrap();
        tx.replace("f.py", ByteRange::new(0, 4), "cccc", 0).unwrap();
        let err = tx.commit(&mut io, true).unwrap_err();
        assert!(matches!(err, TransactionError::Conflict { .. }));
        assert_eq!(read(&dir, "f.py"), "aaaa\n");
        assert_eq!(read(&dir, "g.py"), "x\n");
    }

    #[test]
    fn test_higher_priority_wins() {
        let (dir, mut io) = repo(&[("f.py", "aaaa\n")]);
        let mut tx = manager();
        tx.replace("f.py", ByteRange::new(0, 4), "low", 0).unwrap();
        tx.replace("f.py", ByteRange::new(1, 3), "high", 5).unwrap();
        tx.commit(&mut io, true).unwrap();
        assert_eq!(read(&dir, "f.py"), "ahigha\n");
    }

    #[test]
    fn test_removal_subsumes_and_duplicates_collapse() {
        let (dir, mut io) = repo(&[("f.py", "one\ntwo\nthree\n")]);
        let mut tx = manager();
        tx.replace("f.py", ByteRange::new(4, 7), "TWO", 0).unwrap();
        tx.remove("f.py", ByteRange::new(4, 8), 0).unwrap();
        tx.replace("f.py", ByteRange::new(0, 3), "ONE", 0).unwrap();
        tx.replace("f.py", ByteRange::new(0, 3), "ONE", 0).unwrap();
        tx.commit(&mut io, true).unwrap();
        assert_eq!(read(&dir, "f.py"), "ONE\nthree\n");
    }

    #[test]
    fn test_inserts_at_same_offset_keep_queue_order() {
        let (dir, mut io) = repo(&[("f.py", "x = 1\n")]);
        let mut tx = manager();
        tx.insert_after("f.py", 0, "B\n", 0).unwrap();
        tx.insert_before("f.py", 0, "A1\n", 0).unwrap();
        tx.insert_before("f.py", 0, "A2\n", 0).unwrap();
        tx.replace("f.py", ByteRange::new(0, 1), "y", 0).unwrap();
        tx.insert_after("f.py", 6, "z = 2\n", 0).unwrap();
        tx.commit(&mut io, true).unwrap();
        assert_eq!(read(&dir, "f.py"), "A1\nA2\nB\ny = 1\nz = 2\n");
    }

    #[test]
    fn test_overlapping_removals_merge() {
        let (dir, mut io) = repo(&[("f.py", "abcdef\n")]);
        let mut tx = manager();
        tx.remove("f.py", ByteRange::new(1, 3), 0).unwrap();
        tx.remove("f.py", ByteRange::new(2, 5), 0).unwrap();
        tx.commit(&mut io, true).unwrap();
        assert_eq!(read(&dir, "f.py"), "af\n");
    }

    #[test]
    fn test_insert_inside_replacement_conflicts() {
        let (_dir, mut io) = repo(&[("f.py", "abcdef\n")]);
        let mut tx = manager();
        tx.replace("f.py", ByteRange::new(0, 6), "x", 0).unwrap();
        tx.insert_before("f.py", 3, "y", 0).unwrap();
        assert!(matches!(
            tx.commit(&mut io, true),
            Err(TransactionError::Conflict { .. })
        ));
    }

    #[test]
    fn test_noop_edit_produces_no_diff() {
        let (dir, mut io) = repo(&[("f.py", "keep = 1\n")]);
        let mut tx = manager();
        tx.replace("f.py", ByteRange::new(0, 4), "keep", 0).unwrap();
        assert!(tx.commit(&mut io, true).unwrap().is_empty());
        assert_eq!(read(&dir, "f.py"), "keep = 1\n");
    }

    #[test]
    fn test_file_operations() {
        let (dir, mut io) = repo(&[("old.py", "a = 1\n"), ("gone.py", "b = 2\n")]);
        let mut tx = manager();
        tx.file_operation(FileOperation::Create {
            path: "new.py".to_string(),
            content: "c = 3\n".to_string(),
        })
        .unwrap();
        tx.file_operation(FileOperation::Delete {
            path: "gone.py".to_string(),
        })
        .unwrap();
        tx.replace("old.py", ByteRange::new(0, 1), "z", 0).unwrap();
        tx.file_operation(FileOperation::Rename {
            from: "old.py".to_string(),
            to: "pkg/moved.py".to_string(),
        })
        .unwrap();

        let diffs = tx.commit(&mut io, true).unwrap();
        let kinds: Vec<(&str, &str)> = diffs
            .iter()
            .map(|d| (d.path.as_str(), d.change_type.as_str()))
            .collect();
        assert_eq!(
            kinds,
            vec![("gone.py", "Removed"), ("new.py", "Added"), ("pkg/moved.py", "Renamed")]
        );
        assert_eq!(diffs[2].rename_from.as_deref(), Some("old.py"));
        assert_eq!(read(&dir, "pkg/moved.py"), "z = 1\n");
        assert!(!dir.path().join("old.py").exists());
        assert!(!dir.path().join("gone.py").exists());
    }

    #[test]
    fn test_max_transactions() {
        let mut tx = TransactionManager::new();
        tx.begin(&SessionOptions::default().with_max_transactions(1));
        tx.replace("a.py", ByteRange::new(0, 1), "x", 0).unwrap();
        let err = tx.replace("a.py", ByteRange::new(1, 2), "y", 0).unwrap_err();
        assert!(matches!(err, TransactionError::MaxTransactionsExceeded { limit: 1 }));
    }

    #[test]
    fn test_time_budget() {
        let mut tx = TransactionManager::new();
        tx.begin(&SessionOptions::default().with_max_seconds(0));
        let err = tx.replace("a.py", ByteRange::new(0, 1), "x", 0).unwrap_err();
        assert!(matches!(err, TransactionError::TimeBudgetExceeded { .. }));
    }

    #[test]
    fn test_out_of_bounds_edit() {
        let (_dir, mut io) = repo(&[("f.py", "abc")]);
        let mut tx = manager();
        tx.replace("f.py", ByteRange::new(2, 10), "x", 0).unwrap();
        assert!(matches!(
            tx.commit(&mut io, true),
            Err(TransactionError::OutOfBounds { .. })
        ));
    }
}
