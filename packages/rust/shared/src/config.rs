//! Application configuration for sourcebank.
//!
//! User config lives at `~/.sourcebank/sourcebank.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SourcebankError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "sourcebank.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".sourcebank";

// ---------------------------------------------------------------------------
// Config structs (matching sourcebank.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Fetch policies.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Extraction settings.
    #[serde(default)]
    pub extract: ExtractConfig,

    /// Markdown conversion settings.
    #[serde(default)]
    pub markdown: MarkdownConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Database file path.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Address the HTTP server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Bounded concurrency for batch `process` runs.
    #[serde(default = "default_process_concurrency")]
    pub process_concurrency: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            listen_addr: default_listen_addr(),
            process_concurrency: default_process_concurrency(),
        }
    }
}

fn default_db_path() -> String {
    "~/.sourcebank/sourcebank.db".into()
}
fn default_listen_addr() -> String {
    "127.0.0.1:8420".into()
}
fn default_process_concurrency() -> usize {
    4
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum fetch attempts for transient failures.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds (doubles per attempt).
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Maximum response body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,

    /// Concurrent fetches allowed per domain.
    #[serde(default = "default_per_domain_concurrency")]
    pub per_domain_concurrency: usize,

    /// Concurrent fetches allowed across all domains.
    #[serde(default = "default_global_concurrency")]
    pub global_concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            max_body_bytes: default_max_body_bytes(),
            per_domain_concurrency: default_per_domain_concurrency(),
            global_concurrency: default_global_concurrency(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_max_body_bytes() -> u64 {
    8 * 1024 * 1024
}
fn default_per_domain_concurrency() -> usize {
    2
}
fn default_global_concurrency() -> usize {
    8
}

/// `[extract]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Minimum total block text (chars) below which extraction fails.
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            min_content_chars: default_min_content_chars(),
        }
    }
}

fn default_min_content_chars() -> usize {
    200
}

/// `[markdown]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkdownConfig {
    /// Maximum chunk size in characters.
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
        }
    }
}

fn default_max_chunk_chars() -> usize {
    2000
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.sourcebank/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SourcebankError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.sourcebank/sourcebank.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
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
    let content = std::fs::read_to_string(path).map_err(|e| SourcebankError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        SourcebankError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SourcebankError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SourcebankError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SourcebankError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` in a configured path against the user's home.
pub fn expand_path(path: &str) -> Result<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| SourcebankError::config("could not determine home directory"))?;
        Ok(home.join(rest))
    } else {
        Ok(PathBuf::from(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("db_path"));
        assert!(toml_str.contains("max_body_bytes"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.fetch.max_attempts, 3);
        assert_eq!(parsed.extract.min_content_chars, 200);
        assert_eq!(parsed.markdown.max_chunk_chars, 2000);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[fetch]
timeout_secs = 10

[markdown]
max_chunk_chars = 1200
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.fetch.timeout_secs, 10);
        assert_eq!(config.fetch.max_attempts, 3);
        assert_eq!(config.markdown.max_chunk_chars, 1200);
        assert_eq!(config.defaults.process_concurrency, 4);
    }

    #[test]
    fn expand_path_handles_tilde() {
        let expanded = expand_path("~/x/y.db").expect("expand");
        assert!(expanded.is_absolute());
        assert!(expanded.ends_with("x/y.db"));

        let plain = expand_path("/tmp/z.db").expect("expand");
        assert_eq!(plain, PathBuf::from("/tmp/z.db"));
    }
}
