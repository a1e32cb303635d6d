//! Application configuration for RanoPress.
//!
//! User config lives at `~/.ranopress/ranopress.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RanopressError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "ranopress.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".ranopress";

// ---------------------------------------------------------------------------
// Config structs (matching ranopress.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Remote endpoints and retry policy.
    #[serde(default)]
    pub network: NetworkConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default output directory for downloads and assembled books.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// JPEG quality for re-encoded images (1-100).
    #[serde(default = "default_image_quality")]
    pub image_quality: u8,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            image_quality: default_image_quality(),
        }
    }
}

fn default_output_dir() -> String {
    "output".into()
}
fn default_image_quality() -> u8 {
    85
}

/// `[network]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Base URL of the chapter/metadata API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Base origin used to resolve site-relative image URLs.
    #[serde(default = "default_site_base")]
    pub site_base: String,

    /// Attempts per chapter/image fetch before giving up.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Fixed pause between attempts, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            site_base: default_site_base(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_api_base() -> String {
    "https://api2.mangalib.me/api/manga".into()
}
fn default_site_base() -> String {
    "https://ranobelib.me".into()
}
fn default_retry_attempts() -> u32 {
    5
}
fn default_retry_backoff_ms() -> u64 {
    1000
}

// ---------------------------------------------------------------------------
// Fetch policy (runtime, injected into retrying fetches)
// ---------------------------------------------------------------------------

/// Bounded retry policy for best-effort fetches: fixed attempt count, fixed
/// (non-exponential) backoff. Injected so tests can substitute a zero-delay
/// policy.
#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl FetchPolicy {
    /// Policy with no sleep between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Duration::ZERO,
        }
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            backoff: Duration::from_millis(default_retry_backoff_ms()),
        }
    }
}

impl From<&AppConfig> for FetchPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_attempts: config.network.retry_attempts.max(1),
            backoff: Duration::from_millis(config.network.retry_backoff_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.ranopress/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RanopressError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.ranopress/ranopress.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| RanopressError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        RanopressError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| RanopressError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RanopressError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RanopressError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("retry_attempts"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.image_quality, 85);
        assert_eq!(parsed.network.retry_attempts, 5);
        assert_eq!(parsed.network.site_base, "https://ranobelib.me");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[network]
retry_attempts = 2
retry_backoff_ms = 0
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.network.retry_attempts, 2);
        assert_eq!(config.defaults.image_quality, 85);

        let policy = FetchPolicy::from(&config);
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.backoff, Duration::ZERO);
    }

    #[test]
    fn fetch_policy_never_zero_attempts() {
        let mut config = AppConfig::default();
        config.network.retry_attempts = 0;
        let policy = FetchPolicy::from(&config);
        assert_eq!(policy.max_attempts, 1);
    }
}
