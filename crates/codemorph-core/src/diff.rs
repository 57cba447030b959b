//! Per-file change records produced by commits and consumed by sync.

use serde::{Deserialize, Serialize};

/// Kind of change a [`Diff`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
    Renamed,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Added => "Added",
            ChangeType::Modified => "Modified",
            ChangeType::Removed => "Removed",
            ChangeType::Renamed => "Renamed",
        }
    }
}

/// A change to one file.
///
/// For renames `path` is the new location and `rename_from` the old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub path: String,
    pub change_type: ChangeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename_from: Option<String>,
}

impl Diff {
    pub fn added(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            change_type: ChangeType::Added,
            old_content: None,
            new_content: Some(content.into()),
            rename_from: None,
        }
    }

    pub fn modified(
        path: impl Into<String>,
        old_content: impl Into<String>,
        new_content: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            change_type: ChangeType::Modified,
            old_content: Some(old_content.into()),
            new_content: Some(new_content.into()),
            rename_from: None,
        }
    }

    pub fn removed(path: impl Into<String>, old_content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            change_type: ChangeType::Removed,
            old_content: Some(old_content.into()),
            new_content: None,
            rename_from: None,
        }
    }

    pub fn renamed(
        from: impl Into<String>,
        to: impl Into<String>,
        old_content: impl Into<String>,
        new_content: impl Into<String>,
    ) -> Self {
        Self {
            path: to.into(),
            change_type: ChangeType::Renamed,
            old_content: Some(old_content.into()),
            new_content: Some(new_content.into()),
            rename_from: Some(from.into()),
        }
    }

    /// The diff that undoes this one.
    pub fn reversed(&self) -> Diff {
        match self.change_type {
            ChangeType::Added => Diff::removed(
                self.path.clone(),
                self.new_content.clone().unwrap_or_default(),
            ),
            ChangeType::Removed => Diff::added(
                self.path.clone(),
                self.old_content.clone().unwrap_or_default(),
            ),
            ChangeType::Modified => Diff::modified(
                self.path.clone(),
                self.new_content.clone().unwrap_or_default(),
                self.old_content.clone().unwrap_or_default(),
            ),
            ChangeType::Renamed => Diff::renamed(
                self.path.clone(),
                self.rename_from.clone().unwrap_or_default(),
                self.new_content.clone().unwrap_or_default(),
                self.old_content.clone().unwrap_or_default(),
            ),
        }
    }

    /// Paths this diff touches (both ends of a rename).
    pub fn paths(&self) -> Vec<&str> {
        let mut paths = vec![self.path.as_str()];
        if let Some(from) = &self.rename_from {
            paths.push(from);
        }
        paths
    }

    /// Number of lines that differ between old and new content, counted
    /// after trimming the common prefix and suffix.
    pub fn changed_lines(&self) -> usize {
        let old: Vec<&str> = self.old_content.as_deref().unwrap_or("").lines().collect();
        let new: Vec<&str> = self.new_content.as_deref().unwrap_or("").lines().collect();
        let prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
        let suffix = old[prefix..]
            .iter()
            .rev()
            .zip(new[prefix..].iter().rev())
            .take_while(|(a, b)| a == b)
            .count();
        (old.len() - prefix - suffix).max(new.len() - prefix - suffix)
    }
}
