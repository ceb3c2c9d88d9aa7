//! Configuration loading and root folder resolution
//!
//! Configuration is resolved in three tiers, highest priority first:
//! 1. [`ConfigOverrides`] (command-line flags or their `TERRAMINER_*` variables,
//!    parsed by the binary)
//! 2. TOML config file (`~/.config/terraminer/scraper.toml`, then `/etc/terraminer/scraper.toml`)
//! 3. Compiled defaults

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name used under the platform config/data directories
pub const APP_DIR_NAME: &str = "terraminer";

/// Config file name inside the config directory
pub const CONFIG_FILE_NAME: &str = "scraper.toml";

/// Settings given on the command line; `None` keeps the file value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub bind: Option<String>,
    pub portal_url: Option<String>,
    pub log_level: Option<String>,
}

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Root folder for the database and default export directory
    pub root_folder: Option<String>,
    pub portal: PortalConfig,
    pub retry: RetryConfig,
    pub export: ExportConfig,
    pub jobs: JobsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Third-party portal connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Portal origin, e.g. `https://www.narrpr.com`
    pub base_url: String,
    /// Timeout applied to every network operation
    pub request_timeout_secs: u64,
    /// How long an established session is trusted before re-login
    pub session_ttl_secs: u64,
    pub user_agent: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.narrpr.com".to_string(),
            request_timeout_secs: 30,
            session_ttl_secs: 30 * 60,
            user_agent: concat!("TerraMiner/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl PortalConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

/// Retry/backoff settings for transient failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            multiplier: 2.0,
            max_backoff_ms: 4000,
        }
    }
}

/// Export targets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// CSV output directory; defaults to `<root>/exports`
    pub directory: Option<String>,
    pub csv: bool,
    pub database: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: None,
            csv: true,
            database: true,
        }
    }
}

/// How long finished jobs stay in the in-memory status table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub retention_secs: u64,
    pub max_finished: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention_secs: 60 * 60,
            max_finished: 200,
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5740".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Load configuration from an explicit path, or the first platform config
    /// file found, then apply `overrides` and validate.
    ///
    /// A missing config file is not an error; defaults are used.
    pub fn load(explicit_path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let path = match explicit_path {
            Some(p) => Some(p.to_path_buf()),
            None => find_config_file(),
        };

        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("Read {} failed: {}", path.display(), e))
                })?;
                let parsed = Self::from_toml_str(&content)?;
                tracing::info!(path = %path.display(), "Loaded TOML config");
                parsed
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text (no overrides, not validated)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(bind) = &overrides.bind {
            self.server.bind = bind.clone();
        }
        if let Some(url) = &overrides.portal_url {
            self.portal.base_url = url.clone();
        }
        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Reject settings the scraper cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(Error::Config(
                "retry.multiplier must be a finite number >= 1.0".to_string(),
            ));
        }
        if self.portal.request_timeout_secs == 0 {
            return Err(Error::Config(
                "portal.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.portal.base_url.trim().is_empty() {
            return Err(Error::Config("portal.base_url is empty".to_string()));
        }
        Ok(())
    }

    /// Export directory, falling back to `<root>/exports`
    pub fn export_directory(&self, root_folder: &Path) -> PathBuf {
        self.export
            .directory
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| root_folder.join("exports"))
    }
}

/// Root folder resolution, in priority order:
/// 1. Command-line argument (or `TERRAMINER_ROOT`)
/// 2. TOML config file
/// 3. OS-dependent default
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Some(path) = &config.root_folder {
        return PathBuf::from(path);
    }

    default_root_folder()
}

/// Database file inside the root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join("terraminer.db")
}

/// First existing config file among the platform locations
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc").join(APP_DIR_NAME).join(CONFIG_FILE_NAME);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/terraminer (or /var/lib/terraminer for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from("/var/lib/terraminer"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/terraminer"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\terraminer"))
    } else {
        PathBuf::from("./terraminer_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_backoff_ms, 1000);
        assert_eq!(config.portal.request_timeout(), Duration::from_secs(30));
        assert!(config.export.csv);
        assert!(config.export.database);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            [portal]
            base_url = "http://localhost:9000"

            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.portal.base_url, "http://localhost:9000");
        assert_eq!(config.portal.request_timeout_secs, 30);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.max_backoff_ms, 4000);
        assert_eq!(config.server.bind, "127.0.0.1:5740");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = TomlConfig::from_toml_str("[retry\nmax_attempts = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = TomlConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_finite_multiplier_rejected() {
        for text in ["[retry]\nmultiplier = inf\n", "[retry]\nmultiplier = nan\n"] {
            let config = TomlConfig::from_toml_str(text).unwrap();
            assert!(matches!(config.validate(), Err(Error::Config(_))), "{}", text);
        }
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scraper.toml");
        std::fs::write(&path, "[export]\ncsv = false\n").unwrap();

        let config = TomlConfig::load(Some(&path), &ConfigOverrides::default()).unwrap();
        assert!(!config.export.csv);
        assert!(config.export.database);
    }

    #[test]
    fn test_export_directory_fallback() {
        let config = TomlConfig::default();
        let root = PathBuf::from("/data/terraminer");
        assert_eq!(config.export_directory(&root), root.join("exports"));
    }

    #[test]
    fn test_root_folder_priority() {
        let config = TomlConfig {
            root_folder: Some("/from/toml".to_string()),
            ..Default::default()
        };

        assert_eq!(
            resolve_root_folder(Some(Path::new("/from/cli")), &config),
            PathBuf::from("/from/cli")
        );
        assert_eq!(resolve_root_folder(None, &config), PathBuf::from("/from/toml"));
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let mut config = TomlConfig::from_toml_str("[server]\nbind = \"127.0.0.1:1\"\n").unwrap();
        config.apply_overrides(&ConfigOverrides {
            bind: Some("0.0.0.0:8080".to_string()),
            portal_url: Some("http://portal.test".to_string()),
            log_level: None,
        });

        assert_eq!(config.portal.base_url, "http://portal.test");
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.logging.level, "info");
    }
}
