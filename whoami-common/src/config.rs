//! Configuration loading and value resolution
//!
//! Settings resolve highest priority first, but not every setting has
//! every tier:
//!
//! | Setting | Tiers |
//! |---|---|
//! | access token | CLI, `SPOTIFY_ACCESS_TOKEN`, TOML, interactive prompt |
//! | regional playlist | CLI, `WHOAMI_REGIONAL_PLAYLIST`, TOML, default |
//! | recent limit | CLI, TOML, default |
//! | config file path | CLI, `WHOAMI_CONFIG`, platform default |
//! | API base URL, logging, `[[features]]` | TOML, default |
//!
//! A missing TOML file is not an error: defaults apply and the returned
//! [`ConfigSource`] reports it so the caller can warn once logging is up.
//! A TOML file that exists but does not parse is an error.

use crate::features::{FeatureRange, FeatureSpec};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Bearer token for the Spotify Web API
pub const ENV_ACCESS_TOKEN: &str = "SPOTIFY_ACCESS_TOKEN";
/// Playlist used as the regional baseline
pub const ENV_REGIONAL_PLAYLIST: &str = "WHOAMI_REGIONAL_PLAYLIST";
/// Explicit TOML config path
pub const ENV_CONFIG_PATH: &str = "WHOAMI_CONFIG";

/// Spotify "Top 50 - Global"
pub const DEFAULT_REGIONAL_PLAYLIST: &str = "37i9dQZEVXbMDoHDwVN2tF";
pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";
/// Recently-played endpoint caps a page at 50 items
pub const MAX_RECENT_LIMIT: u32 = 50;

/// Contents of `config.toml`
///
/// All fields are optional so a partial file still loads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Spotify access token (scope `user-read-recently-played`)
    #[serde(default)]
    pub access_token: Option<String>,

    /// Number of recently played tracks to fetch (1-50)
    #[serde(default)]
    pub recent_limit: Option<u32>,

    /// Playlist whose tracks form the regional average
    #[serde(default)]
    pub regional_playlist_id: Option<String>,

    /// Override for the Web API base URL
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Replacement feature bound table
    #[serde(default)]
    pub features: Option<Vec<FeatureSpec>>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Read and parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    ///
    /// Nothing is logged here; the returned [`ConfigSource`] says where the
    /// settings came from and [`ConfigSource::log`] reports it.
    pub fn load_or_default(path: Option<&Path>) -> Result<(Self, ConfigSource)> {
        match path {
            Some(path) if path.exists() => {
                let config = Self::load(path)?;
                Ok((config, ConfigSource::Loaded(path.to_path_buf())))
            }
            Some(path) => Ok((Self::default(), ConfigSource::Missing(path.to_path_buf()))),
            None => Ok((Self::default(), ConfigSource::NoConfigDir)),
        }
    }

    /// Feature bound table: the `[[features]]` override or the Spotify default
    pub fn feature_range(&self) -> Result<FeatureRange> {
        match &self.features {
            Some(specs) if specs.is_empty() => Err(Error::Config(
                "[[features]] is present but empty".to_string(),
            )),
            Some(specs) => {
                // Records only ever carry the Spotify audio features
                let known = FeatureRange::spotify();
                if let Some(unknown) = specs.iter().find(|spec| known.get(&spec.name).is_none()) {
                    return Err(Error::Config(format!(
                        "Unknown feature '{}' in [[features]]; expected one of: {}",
                        unknown.name,
                        known.names().join(", ")
                    )));
                }
                FeatureRange::new(specs.iter().cloned())
                    .map_err(|e| Error::Config(format!("Invalid [[features]] table: {}", e)))
            }
            None => Ok(FeatureRange::spotify()),
        }
    }
}

/// Where [`TomlConfig::load_or_default`] found its settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from this file
    Loaded(PathBuf),
    /// File does not exist; defaults apply
    Missing(PathBuf),
    /// No config path could be determined; defaults apply
    NoConfigDir,
}

impl ConfigSource {
    /// Report the load outcome. Call after the tracing subscriber is installed.
    pub fn log(&self) {
        match self {
            ConfigSource::Loaded(path) => {
                info!("Loaded configuration from {}", path.display())
            }
            ConfigSource::Missing(path) => {
                warn!("Config file {} not found, using defaults", path.display())
            }
            ConfigSource::NoConfigDir => {
                warn!("Could not determine config directory, using defaults")
            }
        }
    }
}

/// Platform config file location (`<config_dir>/whoami/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("whoami").join("config.toml"))
}

/// Pick the config file path: CLI → `WHOAMI_CONFIG` → platform default
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Some(path) = env_value(ENV_CONFIG_PATH) {
        return Some(PathBuf::from(path));
    }

    default_config_path()
}

/// Resolve the API access token
///
/// Tiers: CLI → `SPOTIFY_ACCESS_TOKEN` → TOML → `prompt`. The prompt is only
/// invoked when every other tier is empty.
pub fn resolve_access_token<F>(
    cli_arg: Option<&str>,
    toml_config: &TomlConfig,
    prompt: F,
) -> Result<String>
where
    F: FnOnce() -> std::io::Result<String>,
{
    let cli_token = cli_arg.filter(|t| is_valid_value(t)).map(str::to_string);
    let env_token = env_value(ENV_ACCESS_TOKEN);
    let toml_token = toml_config
        .access_token
        .as_deref()
        .filter(|t| is_valid_value(t))
        .map(str::to_string);

    let sources: Vec<&str> = [
        ("command line", cli_token.is_some()),
        ("environment", env_token.is_some()),
        ("TOML", toml_token.is_some()),
    ]
    .iter()
    .filter(|(_, present)| *present)
    .map(|(name, _)| *name)
    .collect();

    if sources.len() > 1 {
        warn!(
            "Access token found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    if let Some(token) = cli_token {
        info!("Access token taken from command line");
        return Ok(token);
    }
    if let Some(token) = env_token {
        info!("Access token loaded from environment variable");
        return Ok(token);
    }
    if let Some(token) = toml_token {
        info!("Access token loaded from TOML config");
        return Ok(token);
    }

    let entered = prompt()?;
    let entered = entered.trim();
    if is_valid_value(entered) {
        info!("Access token entered interactively");
        return Ok(entered.to_string());
    }

    Err(Error::Config(format!(
        "Spotify access token not configured. Provide one of:\n\
         1. Command line: --access-token <token>\n\
         2. Environment: {}=<token>\n\
         3. TOML config: access_token = \"<token>\"\n\
         \n\
         The token needs the 'user-read-recently-played' scope.",
        ENV_ACCESS_TOKEN
    )))
}

/// Resolve the regional playlist: CLI → env → TOML → Top 50 Global
pub fn resolve_regional_playlist(cli_arg: Option<&str>, toml_config: &TomlConfig) -> String {
    cli_arg
        .filter(|v| is_valid_value(v))
        .map(str::to_string)
        .or_else(|| env_value(ENV_REGIONAL_PLAYLIST))
        .or_else(|| {
            toml_config
                .regional_playlist_id
                .clone()
                .filter(|v| is_valid_value(v))
        })
        .unwrap_or_else(|| DEFAULT_REGIONAL_PLAYLIST.to_string())
}

/// Resolve the recently-played page size: CLI → TOML → 50
pub fn resolve_recent_limit(cli_arg: Option<u32>, toml_config: &TomlConfig) -> Result<u32> {
    let limit = cli_arg
        .or(toml_config.recent_limit)
        .unwrap_or(MAX_RECENT_LIMIT);

    if limit == 0 || limit > MAX_RECENT_LIMIT {
        return Err(Error::InvalidInput(format!(
            "Recent track limit must be between 1 and {} (got {})",
            MAX_RECENT_LIMIT, limit
        )));
    }

    Ok(limit)
}

/// Non-empty, non-whitespace
pub fn is_valid_value(value: &str) -> bool {
    !value.trim().is_empty()
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| is_valid_value(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_value() {
        assert!(is_valid_value("abc"));
        assert!(!is_valid_value(""));
        assert!(!is_valid_value("   \t"));
    }

    #[test]
    fn test_logging_defaults() {
        let logging = LoggingConfig::default();
        assert_eq!(logging.level, "info");
        assert!(logging.file.is_none());
    }

    #[test]
    fn test_partial_toml_parses() {
        let config: TomlConfig = toml::from_str("recent_limit = 20\n").unwrap();
        assert_eq!(config.recent_limit, Some(20));
        assert_eq!(config.logging.level, "info");
        assert!(config.access_token.is_none());
        assert!(config.features.is_none());
    }

    #[test]
    fn test_feature_range_default_when_absent() {
        let range = TomlConfig::default().feature_range().unwrap();
        assert_eq!(range, FeatureRange::spotify());
    }

    #[test]
    fn test_feature_range_override() {
        let config: TomlConfig = toml::from_str(
            r#"
            [[features]]
            name = "energy"
            low = 0.0
            high = 1.0

            [[features]]
            name = "tempo"
            low = 40.0
            high = 240.0
            "#,
        )
        .unwrap();

        let range = config.feature_range().unwrap();
        assert_eq!(range.names(), vec!["energy", "tempo"]);
        assert_eq!(range.get("tempo").map(|b| b.low), Some(40.0));
    }

    #[test]
    fn test_feature_range_rejects_field_records_never_carry() {
        let config: TomlConfig = toml::from_str(
            r#"
            [[features]]
            name = "key"
            low = 0.0
            high = 11.0
            "#,
        )
        .unwrap();

        match config.feature_range() {
            Err(Error::Config(msg)) => {
                assert!(msg.contains("'key'"));
                assert!(msg.contains("danceability"));
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_load_or_default_reports_source() {
        let (_, source) = TomlConfig::load_or_default(None).unwrap();
        assert_eq!(source, ConfigSource::NoConfigDir);

        let missing = Path::new("/nonexistent/whoami/config.toml");
        let (_, source) = TomlConfig::load_or_default(Some(missing)).unwrap();
        assert_eq!(source, ConfigSource::Missing(missing.to_path_buf()));
    }

    #[test]
    fn test_feature_range_rejects_empty_override() {
        let config = TomlConfig {
            features: Some(Vec::new()),
            ..TomlConfig::default()
        };
        assert!(matches!(config.feature_range(), Err(Error::Config(_))));
    }

    #[test]
    fn test_recent_limit_bounds() {
        let config = TomlConfig::default();
        assert_eq!(resolve_recent_limit(None, &config).unwrap(), 50);
        assert_eq!(resolve_recent_limit(Some(10), &config).unwrap(), 10);
        assert!(resolve_recent_limit(Some(0), &config).is_err());
        assert!(resolve_recent_limit(Some(51), &config).is_err());

        let config = TomlConfig {
            recent_limit: Some(25),
            ..TomlConfig::default()
        };
        assert_eq!(resolve_recent_limit(None, &config).unwrap(), 25);
        assert_eq!(resolve_recent_limit(Some(5), &config).unwrap(), 5);
    }
}
