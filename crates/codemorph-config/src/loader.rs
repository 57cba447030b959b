//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.codemorph/config.toml`
//! 2. Local config: `.codemorph/config.toml` (in the repository)
//! 3. Caller overrides
//!
//! Later sources override earlier ones.

use crate::error::ConfigError;
use crate::{AnalysisConfig, CodebaseConfig, ConfigOverrides, FeatureFlags, SessionOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Global configuration directory name.
const GLOBAL_CONFIG_DIR: &str = ".codemorph";

/// Local configuration directory name.
const LOCAL_CONFIG_DIR: &str = ".codemorph";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.codemorph`)
    global_config_dir: Option<PathBuf>,

    /// Cached global config
    global_config: Option<CodebaseConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.codemorph`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(GLOBAL_CONFIG_DIR));

        Self {
            global_config_dir,
            global_config: None,
        }
    }

    /// Create a loader with a custom global config directory.
    ///
    /// Useful for testing.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_config: None,
        }
    }

    /// Create a loader that ignores global configuration entirely.
    pub fn local_only() -> Self {
        Self {
            global_config_dir: None,
            global_config: None,
        }
    }

    /// Get the global config file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Get the local config file path for a repository.
    pub fn local_config_path(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration for a repository with optional overrides.
    ///
    /// Merges config in order: global → local → overrides, then validates.
    pub fn load(
        &mut self,
        repo_root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<CodebaseConfig, ConfigError> {
        let mut config = CodebaseConfig::default();

        if let Some(global_config) = self.load_global()? {
            config = merge_configs(config, global_config);
        }

        if let Some(local_config) = self.load_local(repo_root)? {
            config = merge_configs(config, local_config);
        }

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<CodebaseConfig>, ConfigError> {
        if let Some(ref config) = self.global_config {
            return Ok(Some(config.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No global config directory, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let config = load_config_file(&global_path)?;
        self.global_config = Some(config.clone());

        Ok(Some(config))
    }

    /// Load only the local configuration for a repository.
    pub fn load_local(&self, repo_root: &Path) -> Result<Option<CodebaseConfig>, ConfigError> {
        let local_path = self.local_config_path(repo_root);

        if !local_path.exists() {
            trace!("Local config not found at {:?}", local_path);
            return Ok(None);
        }

        debug!("Loading local config from {:?}", local_path);
        load_config_file(&local_path).map(Some)
    }

    /// Save configuration to the global config file.
    pub fn save_global(&self, config: &CodebaseConfig) -> Result<(), ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };

        save_config_file(&global_dir.join(CONFIG_FILE_NAME), config)
    }

    /// Save configuration to the local config file for a repository.
    pub fn save_local(&self, repo_root: &Path, config: &CodebaseConfig) -> Result<(), ConfigError> {
        save_config_file(&self.local_config_path(repo_root), config)
    }

    /// Clear cached global configuration.
    ///
    /// Forces reload on next `load_global()` call.
    pub fn clear_cache(&mut self) {
        self.global_config = None;
    }
}

/// Load a configuration file from disk.
fn load_config_file(path: &Path) -> Result<CodebaseConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

    toml::from_str(&content).map_err(|e| ConfigError::parse_toml(path, e))
}

/// Save a configuration file to disk.
fn save_config_file(path: &Path, config: &CodebaseConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}

/// Merge two configurations, with `overlay` taking precedence.
///
/// Scalar fields are taken from the overlay when they differ from the
/// default; maps and pattern lists are unioned.
fn merge_configs(base: CodebaseConfig, overlay: CodebaseConfig) -> CodebaseConfig {
    let mut merged = CodebaseConfig {
        feature_flags: merge_flags(base.feature_flags, overlay.feature_flags),
        analysis: merge_analysis(base.analysis, overlay.analysis),
        session: merge_session(base.session, overlay.session),
        secrets: base.secrets,
    };
    merged.merge_secrets(overlay.secrets);
    merged
}

fn merge_flags(base: FeatureFlags, overlay: FeatureFlags) -> FeatureFlags {
    let defaults = FeatureFlags::default();
    let pick = |b: bool, o: bool, d: bool| if o != d { o } else { b };

    let mut overrides = base.import_resolution_overrides;
    overrides.extend(overlay.import_resolution_overrides);

    FeatureFlags {
        debug: pick(base.debug, overlay.debug, defaults.debug),
        verify_graph: pick(base.verify_graph, overlay.verify_graph, defaults.verify_graph),
        track_graph: pick(base.track_graph, overlay.track_graph, defaults.track_graph),
        method_usages: pick(
            base.method_usages,
            overlay.method_usages,
            defaults.method_usages,
        ),
        sync_enabled: pick(base.sync_enabled, overlay.sync_enabled, defaults.sync_enabled),
        full_range_index: pick(
            base.full_range_index,
            overlay.full_range_index,
            defaults.full_range_index,
        ),
        ignore_process_errors: pick(
            base.ignore_process_errors,
            overlay.ignore_process_errors,
            defaults.ignore_process_errors,
        ),
        generics: pick(base.generics, overlay.generics, defaults.generics),
        import_resolution_overrides: overrides,
    }
}

fn merge_analysis(base: AnalysisConfig, overlay: AnalysisConfig) -> AnalysisConfig {
    let defaults = AnalysisConfig::default();
    let mut patterns = base.exclude_patterns;
    for pattern in overlay.exclude_patterns {
        if !patterns.contains(&pattern) {
            patterns.push(pattern);
        }
    }

    AnalysisConfig {
        exclude_patterns: patterns,
        max_file_size_kb: if overlay.max_file_size_kb != defaults.max_file_size_kb {
            overlay.max_file_size_kb
        } else {
            base.max_file_size_kb
        },
    }
}

fn merge_session(base: SessionOptions, overlay: SessionOptions) -> SessionOptions {
    let defaults = SessionOptions::default();
    SessionOptions {
        max_seconds: overlay.max_seconds.or(base.max_seconds),
        max_transactions: overlay.max_transactions.or(base.max_transactions),
        max_ai_requests: if overlay.max_ai_requests != defaults.max_ai_requests {
            overlay.max_ai_requests
        } else {
            base.max_ai_requests
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_defaults_when_no_files() {
        let global = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        let mut loader = ConfigLoader::with_global_dir(global.path());

        let config = loader.load(repo.path(), None).unwrap();
        assert_eq!(config, CodebaseConfig::default());
    }

    #[test]
    fn test_local_overrides_global() {
        let global = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        write(
            &global.path().join(CONFIG_FILE_NAME),
            "[feature_flags]\nverify_graph = true\n\n[feature_flags.import_resolution_overrides]\na = \"b\"\n",
        );
        write(
            &repo.path().join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME),
            "[feature_flags]\nmethod_usages = false\n\n[feature_flags.import_resolution_overrides]\nc = \"d\"\n",
        );

        let mut loader = ConfigLoader::with_global_dir(global.path());
        let config = loader.load(repo.path(), None).unwrap();

        assert!(config.feature_flags.verify_graph);
        assert!(!config.feature_flags.method_usages);
        assert_eq!(config.feature_flags.import_resolution_overrides.len(), 2);
    }

    #[test]
    fn test_overrides_applied_last() {
        let repo = TempDir::new().unwrap();
        write(
            &repo.path().join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME),
            "[feature_flags]\nsync_enabled = false\n",
        );

        let mut loader = ConfigLoader::local_only();
        let overrides = ConfigOverrides {
            sync_enabled: Some(true),
            ..Default::default()
        };
        let config = loader.load(repo.path(), Some(&overrides)).unwrap();
        assert!(config.feature_flags.sync_enabled);
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let repo = TempDir::new().unwrap();
        let path = repo.path().join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME);
        write(&path, "[feature_flags\nverify_graph = ");

        let mut loader = ConfigLoader::local_only();
        let err = loader.load(repo.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_validation_runs_after_merge() {
        let repo = TempDir::new().unwrap();
        write(
            &repo.path().join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME),
            "[session]\nmax_ai_requests = 900\n",
        );

        let mut loader = ConfigLoader::local_only();
        let err = loader.load(repo.path(), None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_save_and_reload_local() {
        let repo = TempDir::new().unwrap();
        let loader = ConfigLoader::local_only();
        let mut config = CodebaseConfig::default();
        config.feature_flags.generics = false;
        config.secrets.insert("token", "abc");

        loader.save_local(repo.path(), &config).unwrap();
        let reloaded = loader.load_local(repo.path()).unwrap().unwrap();
        assert_eq!(reloaded, config);
    }
}
