//! Layered configuration, following the teacher's `config`-crate pattern:
//! `default.yaml` → `local.yaml` → `<env>.yaml` → `local-<env>.yaml` →
//! environment variables, each layer overriding the previous.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

/// Config-store (etcd) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigStoreConfig {
    #[serde(default = "default_etcd_peers")]
    pub etcd_peers: String,
}

impl Default for ConfigStoreConfig {
    fn default() -> Self {
        Self {
            etcd_peers: default_etcd_peers(),
        }
    }
}

fn default_etcd_peers() -> String {
    "http://localhost:2379".to_string()
}

/// Probe client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_vulcand")]
    pub vulcand: String,
    #[serde(default)]
    pub socks_proxy: Option<String>,
    #[serde(default = "default_probe_timeout_secs")]
    pub timeout_seconds: u64,
    #[serde(default = "default_sev1_apps")]
    pub sev_1_apps: Vec<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            vulcand: default_vulcand(),
            socks_proxy: None,
            timeout_seconds: default_probe_timeout_secs(),
            sev_1_apps: default_sev1_apps(),
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_vulcand() -> String {
    "localhost:8080".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_sev1_apps() -> Vec<String> {
    Vec::new()
}

/// Graphite metric sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphiteConfig {
    #[serde(default = "default_graphite_host")]
    pub host: String,
    #[serde(default = "default_graphite_port")]
    pub port: u16,
}

impl Default for GraphiteConfig {
    fn default() -> Self {
        Self {
            host: default_graphite_host(),
            port: default_graphite_port(),
        }
    }
}

fn default_graphite_host() -> String {
    "graphite.internal".to_string()
}

fn default_graphite_port() -> u16 {
    2003
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub config_store: ConfigStoreConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub graphite: GraphiteConfig,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_environment() -> String {
    "local".to_string()
}

impl AppConfig {
    pub fn etcd_peers(&self) -> Vec<String> {
        self.config_store
            .etcd_peers
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Load configuration the way `navius`'s `load_config` does: layered YAML
/// files plus environment variable overrides (highest priority).
pub fn load_config(config_dir: &str) -> std::result::Result<AppConfig, ConfigError> {
    let environment = env::var("RUN_ENV").unwrap_or_else(|_| "development".to_string());
    info!("loading configuration for environment: {}", environment);

    let config = Config::builder()
        .add_source(File::from(Path::new(config_dir).join("default.yaml")).required(false))
        .add_source(File::from(Path::new(config_dir).join("local.yaml")).required(false))
        .add_source(
            File::from(Path::new(config_dir).join(format!("{environment}.yaml"))).required(false),
        )
        .add_source(
            File::from(Path::new(config_dir).join(format!("local-{environment}.yaml")))
                .required(false),
        )
        .add_source(Environment::with_prefix("SERVER").separator("_"))
        .add_source(Environment::with_prefix("CONFIG_STORE").separator("_"))
        .add_source(Environment::with_prefix("PROBE").separator("_"))
        .add_source(Environment::with_prefix("GRAPHITE").separator("_"))
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_recommendations() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(cfg.probe.timeout_seconds, 10);
        assert_eq!(cfg.graphite.port, 2003);
        assert_eq!(cfg.environment, "local");
    }

    #[test]
    fn etcd_peers_splits_and_trims_comma_list() {
        let mut cfg = AppConfig::default();
        cfg.config_store.etcd_peers = "http://a:2379, http://b:2379".to_string();
        assert_eq!(
            cfg.etcd_peers(),
            vec!["http://a:2379".to_string(), "http://b:2379".to_string()]
        );
    }
}
