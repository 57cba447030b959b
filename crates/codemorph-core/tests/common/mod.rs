//! Common test utilities for integration tests.
//!
//! Throwaway repositories backed by a `TempDir`, opened with the test
//! configuration (strict store checks, verification after every sync).

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

use codemorph_config::CodebaseConfig;
use codemorph_core::verify::{canonical_form, CanonicalGraph};
use codemorph_core::{Codebase, LanguageSelection};
use tempfile::TempDir;

/// A repository on disk plus the codebase opened over it.
pub struct TestRepo {
    pub dir: TempDir,
    pub codebase: Codebase,
}

impl TestRepo {
    pub fn new(files: &[(&str, &str)]) -> Self {
        Self::with_config(files, CodebaseConfig::for_tests())
    }

    pub fn with_config(files: &[(&str, &str)], config: CodebaseConfig) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let codebase =
            Codebase::from_files(dir.path(), files, config).expect("Failed to open codebase");
        TestRepo { dir, codebase }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn read(&self, path: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(path))
            .unwrap_or_else(|e| panic!("Failed to read {}: {}", path, e))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.dir.path().join(path).exists()
    }

    /// Write a file behind the codebase's back.
    pub fn write(&self, path: &str, content: &str) {
        let full = self.dir.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(full, content).expect("Failed to write file");
    }

    /// Every file under the repository root, by relative path.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        snapshot(self.dir.path())
    }

    /// Canonical form of the live graph.
    pub fn canonical(&self) -> CanonicalGraph {
        canonical_form(self.codebase.graph())
    }

    /// Canonical form of a graph built from scratch over the same files.
    pub fn fresh_canonical(&self) -> CanonicalGraph {
        let fresh = Codebase::open_with_language(
            self.dir.path(),
            LanguageSelection::All,
            CodebaseConfig::for_tests(),
        )
        .expect("Failed to rebuild codebase");
        canonical_form(fresh.graph())
    }
}

pub fn snapshot(root: &Path) -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).expect("Failed to list dir") {
            let path = entry.expect("Failed to read entry").path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let rel = path
                    .strip_prefix(root)
                    .expect("Entry outside root")
                    .to_string_lossy()
                    .replace('\\', "/");
                files.insert(rel, std::fs::read_to_string(&path).unwrap_or_default());
            }
        }
    }
    files
}
