//! Directory tree mirroring the indexed files.
//!
//! The tree is derived data: it is rebuilt from the live FILE nodes at the
//! end of every sync and never edited in place.

use std::collections::{BTreeMap, BTreeSet};

use crate::io::parent_dir;
use crate::node::NodeId;

/// One directory; the repository root has the empty path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directory {
    pub path: String,
    /// Files directly inside this directory, by path
    pub files: BTreeMap<String, NodeId>,
    /// Direct subdirectory paths
    pub subdirectories: BTreeSet<String>,
}

impl Directory {
    /// Last path component (empty for the root).
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn parent_path(&self) -> Option<&str> {
        if self.path.is_empty() {
            None
        } else {
            Some(parent_dir(&self.path))
        }
    }
}

/// All directories that contain at least one indexed file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryTree {
    dirs: BTreeMap<String, Directory>,
}

impl DirectoryTree {
    /// Build the tree from `(path, file id)` pairs.
    pub fn build<'a>(files: impl IntoIterator<Item = (&'a str, NodeId)>) -> Self {
        let mut dirs: BTreeMap<String, Directory> = BTreeMap::new();
        dirs.insert(String::new(), Directory::default());

        for (path, id) in files {
            let dir = parent_dir(path);
            dirs.entry(dir.to_string())
                .or_insert_with(|| Directory {
                    path: dir.to_string(),
                    ..Default::default()
                })
                .files
                .insert(path.to_string(), id);

            // link every ancestor up to the root
            let mut child = dir;
            while !child.is_empty() {
                let parent = parent_dir(child);
                let entry = dirs.entry(parent.to_string()).or_insert_with(|| Directory {
                    path: parent.to_string(),
                    ..Default::default()
                });
                if !entry.subdirectories.insert(child.to_string()) {
                    break;
                }
                dirs.entry(child.to_string()).or_insert_with(|| Directory {
                    path: child.to_string(),
                    ..Default::default()
                });
                child = parent;
            }
        }

        Self { dirs }
    }

    pub fn root(&self) -> Option<&Directory> {
        self.dirs.get("")
    }

    pub fn get(&self, path: &str) -> Option<&Directory> {
        self.dirs.get(path.trim_end_matches('/'))
    }

    /// Directories in path order.
    pub fn iter(&self) -> impl Iterator<Item = &Directory> {
        self.dirs.values()
    }

    /// Every file below `path`, recursively, in path order.
    pub fn files_under(&self, path: &str) -> Vec<(String, NodeId)> {
        let mut out = Vec::new();
        let mut stack = vec![path.trim_end_matches('/').to_string()];
        while let Some(dir) = stack.pop() {
            if let Some(entry) = self.dirs.get(&dir) {
                out.extend(entry.files.iter().map(|(p, id)| (p.clone(), *id)));
                stack.extend(entry.subdirectories.iter().cloned());
            }
        }
        out.sort();
        out
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<NodeId> {
        (0..n).map(|_| NodeId::next()).collect()
    }

    #[test]
    fn test_build_links_ancestors() {
        let id = ids(3);
        let tree = DirectoryTree::build(vec![
            ("a/b/c.py", id[0]),
            ("a/d.py", id[1]),
            ("top.py", id[2]),
        ]);

        let root = tree.root().unwrap();
        assert_eq!(root.files.len(), 1);
        assert!(root.subdirectories.contains("a"));

        let a = tree.get("a").unwrap();
        assert!(a.subdirectories.contains("a/b"));
        assert_eq!(a.files.get("a/d.py"), Some(&id[1]));
        assert_eq!(tree.get("a/b").unwrap().name(), "b");
        assert_eq!(tree.get("a/b").unwrap().parent_path(), Some("a"));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_files_under() {
        let id = ids(3);
        let tree = DirectoryTree::build(vec![
            ("a/b/c.py", id[0]),
            ("a/d.py", id[1]),
            ("top.py", id[2]),
        ]);
        let under: Vec<String> = tree.files_under("a").into_iter().map(|(p, _)| p).collect();
        assert_eq!(under, vec!["a/b/c.py", "a/d.py"]);
        assert_eq!(tree.files_under("").len(), 3);
    }

    #[test]
    fn test_empty_tree_has_root() {
        let tree = DirectoryTree::build(Vec::new());
        assert!(tree.root().is_some());
        assert_eq!(tree.len(), 1);
    }
}
