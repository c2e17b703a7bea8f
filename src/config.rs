//! Optional TOML configuration for the resolver and logging.
//!
//! ```toml
//! [resolver]
//! timeout_secs = 5
//! attempts = 2
//! nameservers = ["9.9.9.9", "1.1.1.1"]
//!
//! [log]
//! level = "debug"
//! ```

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub resolver: ResolverSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverSettings {
    /// Per-query timeout in seconds.
    pub timeout_secs: u64,
    pub attempts: usize,
    /// Empty means use the system configuration.
    pub nameservers: Vec<IpAddr>,
    pub port: u16,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            attempts: 2,
            nameservers: Vec::new(),
            port: 53,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSettings {
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::from_toml("", Path::new("spf.toml")).unwrap();
        assert_eq!(config.resolver.timeout_secs, 5);
        assert_eq!(config.resolver.port, 53);
        assert!(config.resolver.nameservers.is_empty());
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn partial_sections() {
        let config = Config::from_toml(
            "[resolver]\nnameservers = [\"192.0.2.53\", \"2001:db8::53\"]\n",
            Path::new("spf.toml"),
        )
        .unwrap();
        assert_eq!(config.resolver.nameservers.len(), 2);
        assert_eq!(config.resolver.attempts, 2);
    }

    #[test]
    fn unknown_keys_rejected() {
        let err =
            Config::from_toml("[resolver]\ncache = true\n", Path::new("spf.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file() {
        let err = Config::load(Path::new("/nonexistent/spf-trail.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
