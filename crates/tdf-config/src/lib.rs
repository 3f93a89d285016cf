//! Configuration for the TDF converter.
//!
//! Parses `tdf.toml` with serde and discovers the file in the current
//! directory or its parents. Programmatic overrides are applied during load
//! via [`Settings`].
//!
//! ```toml
//! [cache]
//! capacity = 256
//!
//! [deployment]
//! ttl_secs = 3600
//! capacity = 1024
//! cloud_domains = ["atlassian.net", "jira.com", "jira-dev.com"]
//!
//! [rollout]
//! force_format = "tree"
//! server_tree_percent = 25
//!
//! [rollout.hosts]
//! "wiki.example.com" = "flat"
//!
//! [render]
//! validation = "error"
//! max_table_rows = 50
//! max_list_depth = 10
//! ```
//!
//! ## Environment Variable Expansion
//!
//! `${VAR}` and `${VAR:-default}` are expanded in `deployment.cloud_domains`
//! entries and `rollout.hosts` keys. An unset variable without a default is
//! an error. Hosts are then trimmed and lowercased, and a trailing dot is
//! dropped.

mod expand;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "tdf.toml";

/// Programmatic settings that override configuration file values.
///
/// Only `Some` fields override the loaded config.
#[derive(Debug, Default)]
pub struct Settings {
    pub cache_capacity: Option<usize>,
    pub deployment_ttl_secs: Option<u64>,
    pub force_format: Option<Format>,
    pub validation: Option<Validation>,
}

/// Output format named in configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Tree,
    Flat,
}

/// Validation strictness named in configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Validation {
    #[default]
    Error,
    Warn,
    Skip,
}

/// Converter configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub deployment: DeploymentConfig,
    pub rollout: RolloutConfig,
    pub render: RenderConfig,

    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

/// Conversion cache configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached conversions.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

/// Deployment classification configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Seconds a classification stays cached.
    pub ttl_secs: u64,
    /// Most classifications kept at once.
    pub capacity: usize,
    /// Host suffixes that identify cloud deployments.
    pub cloud_domains: Vec<String>,
}

impl DeploymentConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            capacity: 1024,
            cloud_domains: vec![
                "atlassian.net".to_owned(),
                "jira.com".to_owned(),
                "jira-dev.com".to_owned(),
            ],
        }
    }
}

/// Staged rollout flags.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RolloutConfig {
    /// Format used for every conversion, regardless of deployment.
    pub force_format: Option<Format>,
    /// Per-host forced format, keyed by host name.
    pub hosts: BTreeMap<String, Format>,
    /// Percentage of server hosts that get the tree format.
    pub server_tree_percent: u8,
}

/// Renderer configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub validation: Validation,
    /// Table rows rendered before truncation, header row included.
    pub max_table_rows: usize,
    /// List nesting levels rendered before flattening.
    pub max_list_depth: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            validation: Validation::Error,
            max_table_rows: 50,
            max_list_depth: 10,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`deployment.cloud_domains`").
        field: String,
        message: String,
    },
}

fn require_positive(value: u64, field: &str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

/// Require a bare host name or suffix, without scheme or path.
fn require_host(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    if value.contains("://") || value.contains('/') {
        return Err(ConfigError::Validation(format!(
            "{field} must be a host name, got {value:?}"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional overrides.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise searches
    /// for `tdf.toml` in the current directory and its parents, falling back
    /// to defaults when none is found.
    ///
    /// Overrides are applied last and the result is validated again.
    pub fn load(
        config_path: Option<&Path>,
        settings: Option<&Settings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default()
        };

        if let Some(settings) = settings {
            config.apply_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Parse, expand and validate configuration text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.expand_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_settings(&mut self, settings: &Settings) {
        if let Some(capacity) = settings.cache_capacity {
            self.cache.capacity = capacity;
        }
        if let Some(ttl_secs) = settings.deployment_ttl_secs {
            self.deployment.ttl_secs = ttl_secs;
        }
        if let Some(format) = settings.force_format {
            self.rollout.force_format = Some(format);
        }
        if let Some(validation) = settings.validation {
            self.render.validation = validation;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive(self.cache.capacity as u64, "cache.capacity")?;
        require_positive(self.deployment.ttl_secs, "deployment.ttl_secs")?;
        require_positive(self.deployment.capacity as u64, "deployment.capacity")?;
        for domain in &self.deployment.cloud_domains {
            require_host(domain, "deployment.cloud_domains")?;
        }
        for host in self.rollout.hosts.keys() {
            require_host(host, "rollout.hosts")?;
        }
        if self.rollout.server_tree_percent > 100 {
            return Err(ConfigError::Validation(
                "rollout.server_tree_percent cannot exceed 100".to_owned(),
            ));
        }
        require_positive(self.render.max_table_rows as u64, "render.max_table_rows")?;
        require_positive(self.render.max_list_depth as u64, "render.max_list_depth")?;
        Ok(())
    }

    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        expand::expand_hosts(&mut self.deployment.cloud_domains, "deployment.cloud_domains")?;
        let hosts = std::mem::take(&mut self.rollout.hosts);
        self.rollout.hosts = expand::expand_host_keys(hosts, "rollout.hosts")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Assert that validation fails with expected substrings in the error message.
    fn assert_validation_error(config: &Config, expected_substrings: &[&str]) {
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation(_)),
            "Expected ConfigError::Validation, got {err:?}"
        );
        let msg = err.to_string();
        for s in expected_substrings {
            assert!(msg.contains(s), "Expected error to contain '{s}', got: {msg}");
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.cache.capacity, 256);
        assert_eq!(config.deployment.ttl(), Duration::from_secs(3600));
        assert_eq!(
            config.deployment.cloud_domains,
            vec!["atlassian.net", "jira.com", "jira-dev.com"]
        );
        assert_eq!(config.rollout.force_format, None);
        assert_eq!(config.rollout.server_tree_percent, 0);
        assert_eq!(config.render.validation, Validation::Error);
        assert_eq!(config.render.max_table_rows, 50);
        assert_eq!(config.render.max_list_depth, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_empty() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.cache.capacity, 256);
    }

    #[test]
    fn test_parse_all_sections() {
        let toml = r#"
[cache]
capacity = 32

[deployment]
ttl_secs = 60
capacity = 8
cloud_domains = ["example-cloud.net"]

[rollout]
force_format = "flat"
server_tree_percent = 25

[rollout.hosts]
"wiki.example.com" = "tree"

[render]
validation = "warn"
max_table_rows = 10
max_list_depth = 4
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.cache.capacity, 32);
        assert_eq!(config.deployment.ttl_secs, 60);
        assert_eq!(config.deployment.capacity, 8);
        assert_eq!(config.deployment.cloud_domains, vec!["example-cloud.net"]);
        assert_eq!(config.rollout.force_format, Some(Format::Flat));
        assert_eq!(config.rollout.server_tree_percent, 25);
        assert_eq!(
            config.rollout.hosts.get("wiki.example.com"),
            Some(&Format::Tree)
        );
        assert_eq!(config.render.validation, Validation::Warn);
        assert_eq!(config.render.max_table_rows, 10);
        assert_eq!(config.render.max_list_depth, 4);
    }

    #[test]
    fn test_unknown_format_is_parse_error() {
        let err = Config::parse("[rollout]\nforce_format = \"html\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validate_zero_capacity() {
        let mut config = Config::default();
        config.cache.capacity = 0;
        assert_validation_error(&config, &["cache.capacity"]);
    }

    #[test]
    fn test_validate_zero_ttl() {
        let mut config = Config::default();
        config.deployment.ttl_secs = 0;
        assert_validation_error(&config, &["deployment.ttl_secs"]);
    }

    #[test]
    fn test_validate_zero_deployment_capacity() {
        let mut config = Config::default();
        config.deployment.capacity = 0;
        assert_validation_error(&config, &["deployment.capacity"]);
    }

    #[test]
    fn test_validate_domain_with_scheme() {
        let mut config = Config::default();
        config.deployment.cloud_domains = vec!["https://atlassian.net".to_owned()];
        assert_validation_error(&config, &["deployment.cloud_domains", "host name"]);
    }

    #[test]
    fn test_validate_percent() {
        let mut config = Config::default();
        config.rollout.server_tree_percent = 101;
        assert_validation_error(&config, &["server_tree_percent"]);
    }

    #[test]
    fn test_validate_render_limits() {
        let mut config = Config::default();
        config.render.max_list_depth = 0;
        assert_validation_error(&config, &["render.max_list_depth"]);
    }

    #[test]
    fn test_expand_env_in_hosts() {
        // SAFETY: variable name is unique to this test
        unsafe {
            std::env::set_var("TDF_TEST_WIKI_HOST", "wiki.corp.test");
        }
        let toml = r#"
[rollout.hosts]
"${TDF_TEST_WIKI_HOST}" = "tree"
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(
            config.rollout.hosts.get("wiki.corp.test"),
            Some(&Format::Tree)
        );
        unsafe {
            std::env::remove_var("TDF_TEST_WIKI_HOST");
        }
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tdf.toml");
        std::fs::write(&path, "[cache]\ncapacity = 8\n").unwrap();

        let config = Config::load(Some(&path), None).unwrap();
        assert_eq!(config.cache.capacity, 8);
        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let err = Config::load(Some(&path), None).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_settings_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tdf.toml");
        std::fs::write(&path, "[render]\nvalidation = \"skip\"\n").unwrap();

        let settings = Settings {
            cache_capacity: Some(4),
            force_format: Some(Format::Tree),
            validation: Some(Validation::Warn),
            ..Settings::default()
        };
        let config = Config::load(Some(&path), Some(&settings)).unwrap();
        assert_eq!(config.cache.capacity, 4);
        assert_eq!(config.rollout.force_format, Some(Format::Tree));
        assert_eq!(config.render.validation, Validation::Warn);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tdf.toml");
        std::fs::write(&path, "").unwrap();

        let settings = Settings {
            deployment_ttl_secs: Some(0),
            ..Settings::default()
        };
        let err = Config::load(Some(&path), Some(&settings)).unwrap_err();
        assert!(err.to_string().contains("deployment.ttl_secs"));
    }
}
