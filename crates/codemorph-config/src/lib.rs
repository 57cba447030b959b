//! Codemorph Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.codemorph/config.toml`
//! - Local config: `.codemorph/config.toml` (in the repository)
//! - Caller overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → overrides.
//!
//! The engine itself never reads configuration from the environment; a
//! fully merged [`CodebaseConfig`] is handed to it by value.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Upper bound accepted for [`SessionOptions::max_ai_requests`].
pub const HARD_MAX_AI_LIMIT: usize = 500;

/// Default for [`SessionOptions::max_ai_requests`].
pub const DEFAULT_MAX_AI_REQUESTS: usize = 150;

/// Root configuration for a codebase.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct CodebaseConfig {
    /// Engine feature flags
    pub feature_flags: FeatureFlags,

    /// File discovery settings
    pub analysis: AnalysisConfig,

    /// Default limits applied to sessions
    pub session: SessionOptions,

    /// Opaque secrets, passed through untouched
    pub secrets: Secrets,
}

/// Enumerated feature flags controlling graph construction and sync.
///
/// # Example TOML
///
/// ```toml
/// [feature_flags]
/// verify_graph = true
/// method_usages = false
///
/// [feature_flags.import_resolution_overrides]
/// "vendored.requests" = "requests"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeatureFlags {
    /// Enable duplicate node/edge assertions in the graph store
    pub debug: bool,

    /// Compare the graph against a from-scratch rebuild after every sync
    pub verify_graph: bool,

    /// Sync the graph after each commit
    pub track_graph: bool,

    /// Resolve `self.x`, `this.x` and `Class.x` member accesses
    pub method_usages: bool,

    /// Allow commits to trigger an incremental sync at all
    pub sync_enabled: bool,

    /// Maintain a `(file, start, end) → node` lookup index
    pub full_range_index: bool,

    /// Log per-file processing failures instead of failing the build
    pub ignore_process_errors: bool,

    /// Produce usage edges for generic type arguments
    pub generics: bool,

    /// Module prefix rewrites applied before import resolution
    pub import_resolution_overrides: BTreeMap<String, String>,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            debug: false,
            verify_graph: false,
            track_graph: true,
            method_usages: true,
            sync_enabled: true,
            full_range_index: false,
            ignore_process_errors: true,
            generics: true,
            import_resolution_overrides: BTreeMap::new(),
        }
    }
}

impl FeatureFlags {
    /// Flags used by test suites: strict store checks and post-sync verification.
    pub fn test_defaults() -> Self {
        Self {
            debug: true,
            verify_graph: true,
            full_range_index: true,
            ..Self::default()
        }
    }

    /// Validate the override table.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (from, to) in &self.import_resolution_overrides {
            if from.trim().is_empty() {
                return Err(ConfigError::EmptyOverrideKey);
            }
            if to.trim().is_empty() {
                return Err(ConfigError::invalid_value(
                    format!("feature_flags.import_resolution_overrides.{}", from),
                    "replacement module must not be empty",
                ));
            }
        }
        Ok(())
    }
}

/// File discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Glob patterns (relative to the repository root) excluded from parsing
    pub exclude_patterns: Vec<String>,

    /// Files larger than this are skipped
    pub max_file_size_kb: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: vec![
                "**/node_modules/**".to_string(),
                "**/__pycache__/**".to_string(),
                "**/.venv/**".to_string(),
                "**/dist/**".to_string(),
            ],
            max_file_size_kb: 1024,
        }
    }
}

/// Limits bounding a single session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionOptions {
    /// Wall-clock budget for the session, in seconds
    pub max_seconds: Option<u64>,

    /// Maximum number of queued transactions before the session aborts
    pub max_transactions: Option<usize>,

    /// Forwarded hint for AI-assisted codemods; not enforced by the engine
    pub max_ai_requests: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_seconds: None,
            max_transactions: None,
            max_ai_requests: DEFAULT_MAX_AI_REQUESTS,
        }
    }
}

impl SessionOptions {
    /// Set the wall-clock budget.
    pub fn with_max_seconds(mut self, seconds: u64) -> Self {
        self.max_seconds = Some(seconds);
        self
    }

    /// Set the transaction cap.
    pub fn with_max_transactions(mut self, count: usize) -> Self {
        self.max_transactions = Some(count);
        self
    }

    /// Validate limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_ai_requests > HARD_MAX_AI_LIMIT {
            return Err(ConfigError::invalid_value(
                "session.max_ai_requests",
                format!(
                    "{} exceeds the hard limit of {}",
                    self.max_ai_requests, HARD_MAX_AI_LIMIT
                ),
            ));
        }
        Ok(())
    }
}

/// Opaque secrets block.
///
/// The engine never inspects these values; they exist so that a single
/// config document can be handed to collaborators. `Debug` output is redacted.
#[derive(Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(transparent)]
pub struct Secrets(BTreeMap<String, String>);

impl Secrets {
    /// Look up a secret by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Insert or replace a secret.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Iterate over the secret keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Whether no secrets are configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn extend(&mut self, other: Secrets) {
        self.0.extend(other.0);
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|k| (k, "<redacted>")))
            .finish()
    }
}

/// Caller-supplied overrides applied after file-based configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override `feature_flags.debug`
    pub debug: Option<bool>,

    /// Override `feature_flags.verify_graph`
    pub verify_graph: Option<bool>,

    /// Override `feature_flags.sync_enabled`
    pub sync_enabled: Option<bool>,

    /// Override `feature_flags.method_usages`
    pub method_usages: Option<bool>,

    /// Additional import resolution overrides
    pub import_resolution_overrides: BTreeMap<String, String>,

    /// Additional exclude patterns
    pub exclude_patterns: Vec<String>,
}

impl CodebaseConfig {
    /// Configuration preset for tests.
    pub fn for_tests() -> Self {
        Self {
            feature_flags: FeatureFlags::test_defaults(),
            ..Self::default()
        }
    }

    /// Apply caller overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        let flags = &mut self.feature_flags;
        if let Some(debug) = overrides.debug {
            flags.debug = debug;
        }
        if let Some(verify) = overrides.verify_graph {
            flags.verify_graph = verify;
        }
        if let Some(sync) = overrides.sync_enabled {
            flags.sync_enabled = sync;
        }
        if let Some(method_usages) = overrides.method_usages {
            flags.method_usages = method_usages;
        }
        for (from, to) in &overrides.import_resolution_overrides {
            flags
                .import_resolution_overrides
                .insert(from.clone(), to.clone());
        }
        for pattern in &overrides.exclude_patterns {
            if !self.analysis.exclude_patterns.contains(pattern) {
                self.analysis.exclude_patterns.push(pattern.clone());
            }
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.feature_flags.validate()?;
        self.session.validate()?;
        Ok(())
    }

    pub(crate) fn merge_secrets(&mut self, overlay: Secrets) {
        self.secrets.extend(overlay);
    }
}
