use crate::auth::RouteGroup;
use crate::search::SearchConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Index backend configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Bearer-token verification
    #[serde(default)]
    pub auth: AuthConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/local.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: CHAT_SEARCH_)
            .add_source(
                config::Environment::with_prefix("CHAT_SEARCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for the dedup route (seconds)
    #[serde(default = "default_dedup_timeout")]
    pub dedup_timeout_secs: u64,

    /// Largest accepted search page size
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,

    /// Largest accepted batch upsert
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_http_port(),
            request_timeout_secs: default_request_timeout(),
            dedup_timeout_secs: default_dedup_timeout(),
            max_page_size: default_max_page_size(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Ed25519 public key (PEM), takes precedence over `public_key_path`
    #[serde(default)]
    pub public_key_pem: Option<String>,

    /// File holding the Ed25519 public key (PEM)
    #[serde(default)]
    pub public_key_path: Option<PathBuf>,

    /// Expected `aud` claim
    #[serde(default = "default_audience")]
    pub audience: String,

    /// Clock skew tolerated on `exp` (seconds)
    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,

    /// Issuers admitted per route group
    #[serde(default)]
    pub issuers: HashMap<RouteGroup, Vec<String>>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            public_key_pem: None,
            public_key_path: None,
            audience: default_audience(),
            leeway_secs: default_leeway(),
            issuers: HashMap::new(),
        }
    }
}

impl AuthConfig {
    /// Resolve the verification key from inline PEM or file
    pub fn public_key(&self) -> Result<Vec<u8>, crate::error::AppError> {
        if let Some(pem) = self.public_key_pem.as_deref().filter(|p| !p.trim().is_empty()) {
            return Ok(pem.as_bytes().to_vec());
        }
        match &self.public_key_path {
            Some(path) => std::fs::read(path).map_err(|e| {
                crate::error::AppError::Configuration(format!(
                    "cannot read public key {}: {}",
                    path.display(),
                    e
                ))
            }),
            None => Err(crate::error::AppError::Configuration(
                "auth.public_key_pem or auth.public_key_path must be set".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            service_name: default_service_name(),
            prometheus_enabled: true,
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_dedup_timeout() -> u64 {
    600
}

fn default_max_page_size() -> u32 {
    100
}

fn default_max_batch_size() -> usize {
    1000
}

fn default_audience() -> String {
    "chat-archive-search".to_string()
}

fn default_leeway() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "chat-archive-search".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{BackendKind, SchemaGeneration};
    use std::io::Write;

    #[test]
    fn test_default_config_values() {
        assert_eq!(default_http_port(), 8080);
        assert_eq!(default_request_timeout(), 30);
        assert_eq!(default_dedup_timeout(), 600);
        assert_eq!(default_max_batch_size(), 1000);
        assert_eq!(default_log_level(), "info");
        assert!(default_true());
    }

    #[test]
    fn test_embedded_defaults_parse() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.search.backend, BackendKind::Elasticsearch);
        assert_eq!(config.search.schema_generation, SchemaGeneration::Transitional);
        assert!(config.auth.issuers.contains_key(&RouteGroup::Ingest));
        assert_eq!(config.server.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_public_key_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "-----BEGIN PUBLIC KEY-----").unwrap();

        let auth = AuthConfig {
            public_key_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let key = auth.public_key().unwrap();
        assert!(String::from_utf8(key).unwrap().starts_with("-----BEGIN"));
    }

    #[test]
    fn test_missing_public_key_is_configuration_error() {
        let err = AuthConfig::default().public_key().unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }
}
