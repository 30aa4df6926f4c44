//! Configuration file support for prsync.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `PRSYNC_`, e.g., `PRSYNC_DATABASE__URL`)
//! 3. Local config file (./prsync.toml)
//! 4. XDG config file (~/.config/prsync/config.toml)
//! 5. Built-in defaults
//!
//! Nested keys use a double underscore in environment variables, so
//! `PRSYNC_SYNC__POOL_SIZE=8` sets `sync.pool_size`. The GitHub token also
//! falls back to the conventional `GITHUB_TOKEN` variable.
//!
//! Example config file:
//! ```toml
//! [database]
//! url = "sqlite://~/.local/state/prsync/prsync.db?mode=rwc"  # optional, this is the default
//!
//! [github]
//! token = "ghp_..."
//!
//! [sync]
//! organizations = ["rust-lang", "tokio-rs"]
//! concurrent = true
//! pool_size = 8
//! review_fanout_threshold = 3
//! cache_ttl_secs = 600
//! requests_per_second = 10
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config as ConfigBuilder, ConfigError, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

use prsync::concurrency::DEFAULT_POOL_SIZE;
use prsync::sync::DEFAULT_REVIEW_FANOUT_THRESHOLD;

/// Environment variable prefix for layered settings.
pub(crate) const ENV_PREFIX: &str = "PRSYNC";

/// Name of the per-directory config file.
pub(crate) const LOCAL_CONFIG_FILE: &str = "prsync.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct Config {
    pub database: DatabaseConfig,
    pub github: GitHubConfig,
    pub sync: SyncConfig,
}

/// Database configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct DatabaseConfig {
    /// SQLite connection URL.
    /// Defaults to `sqlite://~/.local/state/prsync/prsync.db?mode=rwc` if not specified.
    pub url: Option<String>,
}

/// GitHub configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct GitHubConfig {
    /// Personal access token. `GITHUB_TOKEN` is used when unset.
    pub token: Option<String>,
}

/// Default sync options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub(crate) struct SyncConfig {
    /// Organizations synced when none are given on the command line.
    pub organizations: Vec<String>,
    /// Process repositories and review authors on a worker pool.
    pub concurrent: bool,
    /// Worker pool size in concurrent mode.
    pub pool_size: usize,
    /// Review count above which review authors are resolved on the pool.
    pub review_fanout_threshold: usize,
    /// Lifetime of cached API responses, in seconds.
    pub cache_ttl_secs: u64,
    /// Steady request cap. Unset means quota-driven pacing only.
    pub requests_per_second: Option<u32>,
    /// Log every skipped entity at info level.
    pub verbose: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            organizations: Vec::new(),
            concurrent: false,
            pool_size: DEFAULT_POOL_SIZE,
            review_fanout_threshold: DEFAULT_REVIEW_FANOUT_THRESHOLD,
            cache_ttl_secs: 600,
            requests_per_second: None,
            verbose: false,
        }
    }
}

impl SyncConfig {
    pub(crate) fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Failures to read or parse a source are logged and the defaults are used.
    pub(crate) fn load() -> Self {
        let mut files = Vec::new();
        if let Some(xdg_config) = Self::default_config_path() {
            files.push(xdg_config);
        }
        files.push(PathBuf::from(LOCAL_CONFIG_FILE));

        match Self::load_from(&files, Some(ENV_PREFIX)) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}", e);
                Config::default()
            }
        }
    }

    /// Layer `files` (later wins) and optionally prefixed environment variables.
    ///
    /// Missing files are skipped.
    pub(crate) fn load_from(
        files: &[PathBuf],
        env_prefix: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        for path in files.iter().filter(|p| p.exists()) {
            tracing::debug!("Loading config from {:?}", path);
            builder = builder.add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        if let Some(prefix) = env_prefix {
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("sync.organizations")
                    .try_parsing(true),
            );
        }

        builder.build()?.try_deserialize()
    }

    /// Get the database URL, falling back to the default state directory path.
    ///
    /// The `mode=rwc` parameter creates the file if it doesn't exist.
    pub(crate) fn database_url(&self) -> Option<String> {
        self.database.url.clone().or_else(|| {
            Self::default_state_dir().map(|state_dir| default_database_url(&state_dir))
        })
    }

    /// Get the GitHub token, falling back to `GITHUB_TOKEN`.
    pub(crate) fn github_token(&self) -> Option<String> {
        let usable = |token: &String| !token.trim().is_empty();
        self.github
            .token
            .clone()
            .filter(usable)
            .or_else(|| std::env::var("GITHUB_TOKEN").ok().filter(usable))
    }

    pub(crate) fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "prsync").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the default state directory path.
    ///
    /// On Linux, this is `$XDG_STATE_HOME/prsync` or `~/.local/state/prsync`.
    /// On macOS/Windows, falls back to the data directory.
    pub(crate) fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "prsync").map(|dirs| {
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}

fn default_database_url(state_dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", state_dir.join("prsync.db").display())
}

/// Filesystem path of a file-backed SQLite URL, if it has one.
pub(crate) fn sqlite_file_path(url: &str) -> Option<PathBuf> {
    let rest = url.strip_prefix("sqlite://")?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(PathBuf::from(path))
}
