//! Application configuration for aulabot.
//!
//! User config lives at `~/.aulabot/aulabot.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AulabotError, Result};
use crate::types::Backend;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "aulabot.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".aulabot";

// ---------------------------------------------------------------------------
// Config structs (matching aulabot.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Which backend questions are answered from.
    #[serde(default)]
    pub backend: BackendConfig,

    /// School administration REST endpoint.
    #[serde(default)]
    pub api: ApiConfig,

    /// Local SQL database.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Retry and timeout policy for every fetch.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Result cache.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Row bounds applied to generated queries.
    #[serde(default)]
    pub limits: RowLimits,
}

/// `[backend]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: Backend,
}

/// `[api]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL; requests go to `{base_url}/api_ia.php`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost/SistemaAdmin".into()
}
fn default_api_key_env() -> String {
    "AULABOT_API_KEY".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path. A leading `~/` expands to the home directory.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.aulabot/escuela.db".into()
}

impl DatabaseConfig {
    /// The database path with `~/` expanded.
    pub fn resolved_path(&self) -> Result<PathBuf> {
        expand_home(&self.path)
    }
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Total attempts per fetch, including the first.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Base backoff; attempt `n` waits `n * retry_delay_ms`.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Deadline applied to each individual attempt.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl FetchConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1000
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Entry lifetime in seconds.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Capacity before older entries are evicted.
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,

    /// How often the background sweeper purges expired entries.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

fn default_true() -> bool {
    true
}
fn default_ttl_secs() -> u64 {
    300
}
fn default_max_entries() -> u64 {
    100
}
fn default_sweep_interval_secs() -> u64 {
    60
}

/// `[limits]` section: upper bounds on rows per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowLimits {
    /// Bound applied when no narrower one fits.
    #[serde(default = "default_limit")]
    pub default: u32,

    /// Bound for listing queries.
    #[serde(default = "default_list_limit")]
    pub list: u32,

    /// Bound for name searches.
    #[serde(default = "default_search_limit")]
    pub search: u32,
}

impl Default for RowLimits {
    fn default() -> Self {
        Self {
            default: default_limit(),
            list: default_list_limit(),
            search: default_search_limit(),
        }
    }
}

fn default_limit() -> u32 {
    50
}
fn default_list_limit() -> u32 {
    100
}
fn default_search_limit() -> u32 {
    20
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.aulabot/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| AulabotError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.aulabot/aulabot.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| AulabotError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AulabotError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| AulabotError::config(format!("failed to parse {}: {e}", path.display())))?;
    validate_config(&config)?;
    Ok(config)
}

/// Reject values that would make the pipeline misbehave.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.fetch.retry_attempts == 0 {
        return Err(AulabotError::config("fetch.retry_attempts must be at least 1"));
    }
    let limits = &config.limits;
    if limits.default == 0 || limits.list == 0 || limits.search == 0 {
        return Err(AulabotError::config("limits must be positive"));
    }
    url::Url::parse(&config.api.base_url)
        .map_err(|e| AulabotError::config(format!("invalid api.base_url: {e}")))?;
    Ok(())
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    init_config_at(&config_file_path()?)
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<PathBuf> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| AulabotError::io(dir, e))?;
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| AulabotError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| AulabotError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path.to_path_buf())
}

/// Read the REST API key from the env var named in the config.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.api.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(AulabotError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let toml_str = toml::to_string_pretty(&AppConfig::default()).expect("serialize");
        assert!(toml_str.contains("base_url"));
        assert!(toml_str.contains("AULABOT_API_KEY"));
        assert!(toml_str.contains("kind = \"rest\""));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[backend]
kind = "sql"

[cache]
ttl_secs = 60
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.backend.kind, Backend::Sql);
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.cache.max_entries, 100);
        assert_eq!(config.fetch.retry_attempts, 3);
        assert_eq!(config.limits, RowLimits::default());
        assert_eq!(config.limits.default, 50);
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut config = AppConfig::default();
        config.fetch.retry_attempts = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("retry_attempts"));
    }

    #[test]
    fn bad_base_url_rejected() {
        let mut config = AppConfig::default();
        config.api.base_url = "not a url".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = std::env::temp_dir().join(format!("aulabot-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("mkdir");
        let path = dir.join("aulabot.toml");
        std::fs::write(&path, "[limits]\nsearch = 5\n").expect("write");

        let config = load_config_from(&path).expect("load");
        assert_eq!(config.limits.search, 5);
        assert_eq!(config.limits.list, 100);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn init_writes_loadable_defaults() {
        let dir = std::env::temp_dir().join(format!("aulabot-init-{}", std::process::id()));
        let path = dir.join("nested").join("aulabot.toml");

        let written = init_config_at(&path).expect("init");
        assert_eq!(written, path);
        let config = load_config_from(&path).expect("load");
        assert_eq!(config.cache.sweep_interval_secs, 60);
        assert_eq!(config.backend.kind, Backend::Rest);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn home_expansion() {
        assert_eq!(
            expand_home("/var/db/escuela.db").expect("abs"),
            PathBuf::from("/var/db/escuela.db")
        );
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/x.db").expect("home"), home.join("x.db"));
        }
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        config.api.api_key_env = "AULABOT_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
