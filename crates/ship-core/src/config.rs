//! Configuration for the planning service and its clients.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level `shipd.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    pub quotes: QuotesConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub carriers: Vec<CarrierConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Upper bound for a single planning stage.
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
    /// How long a sealed task stays queryable.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl PlannerConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: default_stage_timeout_secs(),
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotesConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Silence on the event stream longer than this is a transport failure.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl ClientConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

/// One row of the carrier rate table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrierConfig {
    pub carrier: String,
    pub service: String,
    pub base_usd: f64,
    #[serde(default)]
    pub per_kg_usd: f64,
    #[serde(default)]
    pub per_m3_usd: f64,
    pub eta_days: u32,
    #[serde(default)]
    pub co2_kg_per_kg: Option<f64>,
    /// Intermediate stops between origin and destination.
    #[serde(default)]
    pub via: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub fn parse_service_config(contents: &str) -> Result<ServiceConfig, toml::de::Error> {
    toml::from_str(contents)
}

pub fn load_service_config(path: impl AsRef<Path>) -> Result<ServiceConfig, ConfigError> {
    let path_ref = path.as_ref();
    let body = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
        path: path_ref.to_path_buf(),
        source,
    })?;
    parse_service_config(&body).map_err(|source| ConfigError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })
}

impl ServiceConfig {
    /// The quotes file, with a relative path taken from the directory of the
    /// config file at `config_path`.
    pub fn quotes_path(&self, config_path: &Path) -> PathBuf {
        resolve_relative(config_path, &self.quotes.path)
    }
}

/// Relative paths in the config are taken from the config file's directory.
pub fn resolve_relative(config_path: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match config_path.parent() {
        Some(dir) => dir.join(path),
        None => path.to_path_buf(),
    }
}

fn default_stage_timeout_secs() -> u64 {
    30
}

fn default_retention_secs() -> u64 {
    900
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_idle_timeout_secs() -> u64 {
    45
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample_config() -> &'static str {
        r#"
[server]
bind = "127.0.0.1:9860"

[planner]
stage_timeout_secs = 10

[quotes]
path = "config/quotes.toml"

[[carriers]]
carrier = "MaerskX"
service = "Ocean FCL"
base_usd = 250.0
per_kg_usd = 0.05
per_m3_usd = 40.0
eta_days = 18
co2_kg_per_kg = 0.015
via = ["Singapore"]
"#
    }

    #[test]
    fn parse_service_config_applies_defaults() {
        let config = parse_service_config(sample_config()).expect("parse config");
        assert_eq!(config.server.bind, "127.0.0.1:9860");
        assert_eq!(config.planner.stage_timeout(), Duration::from_secs(10));
        assert_eq!(config.planner.retention_secs, 900);
        assert_eq!(config.planner.sweep_interval_secs, 60);
        assert_eq!(config.client.idle_timeout(), Duration::from_secs(45));
        assert_eq!(config.carriers.len(), 1);
        assert_eq!(config.carriers[0].via, vec!["Singapore".to_string()]);
        assert_eq!(config.carriers[0].notes, None);
    }

    #[test]
    fn relative_paths_follow_the_config_directory() {
        assert_eq!(
            resolve_relative(Path::new("/etc/shipd/shipd.toml"), Path::new("quotes.toml")),
            PathBuf::from("/etc/shipd/quotes.toml")
        );
        assert_eq!(
            resolve_relative(Path::new("shipd.toml"), Path::new("quotes.toml")),
            PathBuf::from("quotes.toml")
        );
        assert_eq!(
            resolve_relative(Path::new("config/shipd.toml"), Path::new("/srv/quotes.toml")),
            PathBuf::from("/srv/quotes.toml")
        );

        let config = parse_service_config(sample_config()).expect("parse config");
        assert_eq!(
            config.quotes_path(Path::new("/etc/shipd/shipd.toml")),
            PathBuf::from("/etc/shipd/config/quotes.toml")
        );
    }

    #[test]
    fn load_service_config_reads_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("shipd.toml");
        fs::write(&path, sample_config()).expect("write config fixture");

        let config = load_service_config(&path).expect("load config");
        assert_eq!(config.quotes.path, PathBuf::from("config/quotes.toml"));
    }

    #[test]
    fn load_service_config_classifies_read_and_parse_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing_path = dir.path().join("missing.toml");
        let err = load_service_config(&missing_path).expect_err("missing file should fail");
        assert!(matches!(err, ConfigError::Read { path, .. } if path == missing_path));

        let invalid_path = dir.path().join("invalid.toml");
        fs::write(&invalid_path, "[server").expect("write invalid config fixture");
        let err = load_service_config(&invalid_path).expect_err("invalid config should fail");
        assert!(matches!(err, ConfigError::Parse { path, .. } if path == invalid_path));
    }
}
