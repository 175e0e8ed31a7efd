//! # Configuration
//!
//! Server, storage, security and logging settings.
//!
//! Resolution order (highest priority first):
//! 1. CLI flags (applied by the command layer)
//! 2. Environment variables (`PIPETWIN_*`)
//! 3. The config file (`--config`, else `pipetwin.toml` in the working directory)
//! 4. Compiled defaults
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//!
//! [storage]
//! database = "pipetwin.redb"
//!
//! [security]
//! api_key = "change-me"
//! rate_limit = 100
//! cors_origins = ["http://localhost:3000"]
//!
//! [logging]
//! format = "json"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "pipetwin.toml";

/// Default requests per second of the global rate limiter.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("invalid TOML in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid value for {field}: {message}")]
    Invalid { field: String, message: String },
}

// =============================================================================
// SECTIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("pipetwin.redb"),
        }
    }
}

/// HTTP hardening. An absent `api_key` disables authentication; a
/// `rate_limit` of 0 disables rate limiting; absent `cors_origins` means
/// localhost only, and `["*"]` allows every origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub api_key: Option<String>,
    pub rate_limit: u32,
    pub cors_origins: Option<Vec<String>>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            rate_limit: DEFAULT_RATE_LIMIT,
            cors_origins: None,
        }
    }
}

/// Log output. `format` is `"text"` or `"json"`; `filter` is an
/// `EnvFilter` directive used when `RUST_LOG` is unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: String,
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            filter: None,
        }
    }
}

// =============================================================================
// TWIN CONFIG
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwinConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

impl TwinConfig {
    /// Load the config file (when present) and apply environment overrides.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: "<string>".to_string(),
            message: e.to_string(),
        })
    }

    /// Apply `PIPETWIN_*` overrides read through `lookup`. Blank values are
    /// ignored.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `PIPETWIN_HOST` | `server.host` |
    /// | `PIPETWIN_PORT` | `server.port` |
    /// | `PIPETWIN_DATABASE` | `storage.database` |
    /// | `PIPETWIN_API_KEY` | `security.api_key` |
    /// | `PIPETWIN_RATE_LIMIT` | `security.rate_limit` |
    /// | `PIPETWIN_CORS_ORIGINS` | `security.cors_origins` (comma-separated) |
    /// | `PIPETWIN_LOG_FORMAT` | `logging.format` |
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = var("PIPETWIN_HOST") {
            self.server.host = host.trim().to_string();
        }
        if let Some(port) = var("PIPETWIN_PORT") {
            self.server.port = parse_field("PIPETWIN_PORT", &port)?;
        }
        if let Some(database) = var("PIPETWIN_DATABASE") {
            self.storage.database = PathBuf::from(database.trim());
        }
        if let Some(key) = var("PIPETWIN_API_KEY") {
            self.security.api_key = Some(key);
        }
        if let Some(limit) = var("PIPETWIN_RATE_LIMIT") {
            self.security.rate_limit = parse_field("PIPETWIN_RATE_LIMIT", &limit)?;
        }
        if let Some(origins) = var("PIPETWIN_CORS_ORIGINS") {
            self.security.cors_origins = Some(
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect(),
            );
        }
        if let Some(format) = var("PIPETWIN_LOG_FORMAT") {
            self.logging.format = format.trim().to_ascii_lowercase();
        }
        Ok(())
    }

    /// The configured API key, treating a blank key as none.
    pub fn api_key(&self) -> Option<&str> {
        self.security
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_field<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        field: field.to_string(),
        message: e.to_string(),
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_apply_to_missing_sections() {
        let config = TwinConfig::from_toml("[server]\nport = 9000\n").expect("parse");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.security.rate_limit, DEFAULT_RATE_LIMIT);
        assert_eq!(config.logging.format, "text");
        assert!(config.api_key().is_none());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = TwinConfig::from_toml(
            "[security]\napi_key = \"from-file\"\n[logging]\nformat = \"text\"\n",
        )
        .expect("parse");
        let env: HashMap<&str, &str> = HashMap::from([
            ("PIPETWIN_API_KEY", "from-env"),
            ("PIPETWIN_PORT", "7070"),
            ("PIPETWIN_CORS_ORIGINS", "http://a.test, ,http://b.test"),
            ("PIPETWIN_LOG_FORMAT", "JSON"),
            ("PIPETWIN_HOST", "  "),
        ]);
        config
            .apply_env_overrides(|k| env.get(k).map(|v| (*v).to_string()))
            .expect("overrides");

        assert_eq!(config.api_key(), Some("from-env"));
        assert_eq!(config.server.port, 7070);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(
            config.security.cors_origins,
            Some(vec!["http://a.test".to_string(), "http://b.test".to_string()])
        );
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.bind_addr(), "127.0.0.1:7070");
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut config = TwinConfig::default();
        let result = config.apply_env_overrides(|k| (k == "PIPETWIN_PORT").then(|| "eighty".to_string()));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn reads_file_and_reports_missing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("pipetwin.toml");
        std::fs::write(&path, "[storage]\ndatabase = \"/tmp/twin.redb\"\n").expect("write");
        let config = TwinConfig::from_file(&path).expect("load");
        assert_eq!(config.storage.database, PathBuf::from("/tmp/twin.redb"));

        let missing = TwinConfig::from_file(&dir.path().join("absent.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));

        std::fs::write(&path, "[server\n").expect("write");
        assert!(matches!(TwinConfig::from_file(&path), Err(ConfigError::Parse { .. })));
    }
}
