//! File I/O layer.
//!
//! All reads and writes the engine performs go through [`FileIo`]. Writes are
//! staged in a pending map and only hit disk on [`FileIo::save_files`], which
//! writes one file per rayon task. Reads are permissive (BOM stripped,
//! invalid UTF-8 decoded as latin-1); writes are always UTF-8.
//!
//! Paths handed to the engine are normalized to repository-relative form with
//! forward slashes before they are stored anywhere.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use ignore::WalkBuilder;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::language::Language;

/// Custom ignore file honored next to `.gitignore`.
pub const IGNORE_FILE_NAME: &str = ".codemorphignore";

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by the I/O layer.
#[derive(Debug, Error)]
pub enum IoError {
    /// Underlying filesystem failure
    #[error("I/O error on '{path}': {source}")]
    Fs {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Path escapes the repository root
    #[error("path '{0}' is outside the repository root")]
    OutsideRoot(String),

    /// File does not exist on disk or in the pending map
    #[error("file not found: {0}")]
    NotFound(String),

    /// Invalid exclude pattern
    #[error("invalid exclude pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

impl IoError {
    fn fs(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Fs {
            path: path.into(),
            source,
        }
    }
}

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, IoError>;

// ============================================================================
// Decoding & hashing
// ============================================================================

/// Decode raw file bytes into text.
///
/// Strips a UTF-8 byte order mark. Bytes that are not valid UTF-8 are decoded
/// as latin-1 so that every byte maps to exactly one character. Returns the
/// text and whether the fallback was taken.
pub fn decode_source(bytes: &[u8]) -> (String, bool) {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), false),
        Err(_) => (bytes.iter().map(|&b| b as char).collect(), true),
    }
}

/// Compute the SHA-256 hex digest of file content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

// ============================================================================
// Path normalization
// ============================================================================

/// Normalize a path to repository-relative form with forward slashes.
///
/// Absolute paths must live under `root`. `.` components are dropped and `..`
/// components are folded; a path that climbs above the root is rejected.
pub fn normalize_path(root: &Path, path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let relative = if path.is_absolute() {
        path.strip_prefix(root)
            .map_err(|_| IoError::OutsideRoot(path.display().to_string()))?
    } else {
        path
    };

    let mut parts: Vec<String> = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().replace('\\', "/")),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(IoError::OutsideRoot(path.display().to_string()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {}
        }
    }
    Ok(parts.join("/"))
}

/// Parent directory of a normalized path ("" for the root).
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Join a directory and a relative path, folding `.` and `..` segments.
///
/// Returns `None` if the result climbs above the root.
pub fn join_relative(dir: &str, rel: &str) -> Option<String> {
    let mut parts: Vec<&str> = dir.split('/').filter(|p| !p.is_empty()).collect();
    for segment in rel.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

// ============================================================================
// File discovery
// ============================================================================

/// Collect source files under `root` for the given languages.
///
/// Honors `.gitignore`, `.git/info/exclude`, the global gitignore and
/// [`IGNORE_FILE_NAME`]. Hidden entries are skipped. Results are relative,
/// normalized and sorted.
pub fn collect_source_files(
    root: &Path,
    languages: &[Language],
    exclude_patterns: &[String],
    max_file_size_kb: u64,
) -> Result<Vec<String>> {
    let glob_set = build_exclude_glob_set(exclude_patterns)?;
    let max_bytes = max_file_size_kb.saturating_mul(1024);
    let mut files = Vec::new();

    let walker = WalkBuilder::new(root)
        .follow_links(false)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .require_git(false)
        .add_custom_ignore_filename(IGNORE_FILE_NAME)
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!("Error walking directory: {}", e);
                continue;
            }
        };

        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }

        let path = entry.path();
        let Some(language) = Language::from_path(path) else {
            continue;
        };
        if !languages.contains(&language) {
            continue;
        }

        let rel = normalize_path(root, path)?;
        if glob_set.is_match(&rel) {
            continue;
        }

        if max_bytes > 0 {
            if let Ok(meta) = entry.metadata() {
                if meta.len() > max_bytes {
                    debug!("Skipping {} ({} bytes over limit)", rel, meta.len());
                    continue;
                }
            }
        }

        files.push(rel);
    }

    files.sort();
    Ok(files)
}

/// Build a glob set from exclude patterns.
fn build_exclude_glob_set(patterns: &[String]) -> Result<globset::GlobSet> {
    let mut builder = globset::GlobSetBuilder::new();
    for pattern in patterns {
        let glob = globset::Glob::new(pattern).map_err(|e| IoError::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| IoError::InvalidPattern {
        pattern: patterns.join(","),
        message: e.to_string(),
    })
}

// ============================================================================
// FileIo
// ============================================================================

/// A staged change to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingWrite {
    /// Replace (or create) the file with this content
    Write(String),
    /// Delete the file
    Delete,
}

/// Repository file access with a pending-write buffer.
///
/// The pending map is the single source of truth for what is about to hit
/// disk: reads observe it before falling back to the filesystem.
#[derive(Debug)]
pub struct FileIo {
    root: PathBuf,
    pending: HashMap<String, PendingWrite>,
    cache: DashMap<String, Arc<str>>,
}

impl FileIo {
    /// Create an I/O layer rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pending: HashMap::new(),
            cache: DashMap::new(),
        }
    }

    /// Repository root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a repository-relative path.
    pub fn absolute(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Normalize a caller-supplied path against this root.
    pub fn normalize(&self, path: impl AsRef<Path>) -> Result<String> {
        normalize_path(&self.root, path)
    }

    /// Read a file as text, observing pending writes first.
    ///
    /// Disk reads are cached until the file is written or untracked. Safe to
    /// call from multiple threads.
    pub fn read_to_string(&self, rel: &str) -> Result<Arc<str>> {
        match self.pending.get(rel) {
            Some(PendingWrite::Write(content)) => return Ok(Arc::from(content.as_str())),
            Some(PendingWrite::Delete) => return Err(IoError::NotFound(rel.to_string())),
            None => {}
        }

        if let Some(cached) = self.cache.get(rel) {
            return Ok(Arc::clone(cached.value()));
        }

        let bytes = std::fs::read(self.absolute(rel)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IoError::NotFound(rel.to_string())
            } else {
                IoError::fs(rel, e)
            }
        })?;
        let (text, lossy) = decode_source(&bytes);
        if lossy {
            warn!("{} is not valid UTF-8; decoded as latin-1", rel);
        }
        let text: Arc<str> = Arc::from(text);
        self.cache.insert(rel.to_string(), Arc::clone(&text));
        Ok(text)
    }

    /// Whether the file exists, taking pending writes into account.
    pub fn file_exists(&self, rel: &str) -> bool {
        match self.pending.get(rel) {
            Some(PendingWrite::Write(_)) => true,
            Some(PendingWrite::Delete) => false,
            None => self.absolute(rel).is_file(),
        }
    }

    /// Stage new content for a file.
    pub fn write(&mut self, rel: impl Into<String>, content: impl Into<String>) {
        let rel = rel.into();
        self.cache.remove(&rel);
        self.pending.insert(rel, PendingWrite::Write(content.into()));
    }

    /// Stage deletion of a file.
    pub fn delete(&mut self, rel: impl Into<String>) {
        let rel = rel.into();
        self.cache.remove(&rel);
        self.pending.insert(rel, PendingWrite::Delete);
    }

    /// Drop any pending write and cached read for a file.
    pub fn untrack(&mut self, rel: &str) {
        self.pending.remove(rel);
        self.cache.remove(rel);
    }

    /// Paths with staged changes.
    pub fn pending_paths(&self) -> impl Iterator<Item = &str> {
        self.pending.keys().map(String::as_str)
    }

    /// Whether any writes are staged.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Discard all staged writes without touching disk.
    pub fn discard_pending(&mut self) {
        for path in self.pending.keys() {
            self.cache.remove(path);
        }
        self.pending.clear();
    }

    /// Flush all staged writes to disk, one task per file.
    ///
    /// On failure the error for the first failing path (in path order) is
    /// returned together with the paths that were written successfully, so
    /// the caller can roll them back.
    pub fn save_files(&mut self) -> std::result::Result<Vec<String>, (IoError, Vec<String>)> {
        let pending: Vec<(String, PendingWrite)> = self.pending.drain().collect();
        for (path, _) in &pending {
            self.cache.remove(path);
        }

        let root = &self.root;
        let mut results: Vec<(String, std::result::Result<(), IoError>)> = pending
            .par_iter()
            .map(|(path, write)| (path.clone(), apply_write(root, path, write)))
            .collect();
        results.sort_by(|a, b| a.0.cmp(&b.0));

        let mut written = Vec::new();
        let mut first_error = None;
        for (path, result) in results {
            match result {
                Ok(()) => written.push(path),
                Err(e) => {
                    error!("Failed to write {}: {}", path, e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err((e, written)),
            None => {
                debug!("Flushed {} file(s)", written.len());
                Ok(written)
            }
        }
    }

    /// Log and drop writes that were staged but never committed.
    pub fn check_changes(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let mut paths: Vec<&String> = self.pending.keys().collect();
        paths.sort();
        error!(
            "Discarding {} uncommitted file write(s): {:?}",
            paths.len(),
            paths
        );
        self.discard_pending();
    }

    /// Drop the whole read cache.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

fn apply_write(root: &Path, rel: &str, write: &PendingWrite) -> Result<()> {
    let path = root.join(rel);
    match write {
        PendingWrite::Write(content) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| IoError::fs(rel, e))?;
            }
            std::fs::write(&path, content.as_bytes()).map_err(|e| IoError::fs(rel, e))
        }
        PendingWrite::Delete => match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IoError::fs(rel, e)),
        },
    }
}
