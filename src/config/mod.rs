/// Configuration management for the Redis MCP server
pub mod uri;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use crate::error::ConfigError;
pub use uri::{parse_redis_uri, UriConfig, DEFAULT_HOST, DEFAULT_PORT};

/// Connection attributes for one Redis deployment.
///
/// Stored by value in the registry, so later changes to the caller's copy
/// never leak into a registered connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db: Option<i64>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Use TLS for the connection
    pub ssl: bool,
    /// CA certificate file
    pub ssl_ca_path: Option<String>,
    /// Client private key (PEM)
    pub ssl_keyfile: Option<String>,
    /// Client certificate (PEM)
    pub ssl_certfile: Option<String>,
    /// Certificate requirements: required, optional or none
    pub ssl_cert_reqs: Option<String>,
    /// CA bundle file
    pub ssl_ca_certs: Option<String>,
    pub cluster_mode: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: Some(DEFAULT_HOST.to_string()),
            port: Some(DEFAULT_PORT),
            db: Some(0),
            username: None,
            password: None,
            ssl: false,
            ssl_ca_path: None,
            ssl_keyfile: None,
            ssl_certfile: None,
            ssl_cert_reqs: Some("required".to_string()),
            ssl_ca_certs: None,
            cluster_mode: false,
        }
    }
}

impl StoreConfig {
    /// Build the default configuration from `REDIS_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|value| !value.is_empty());
        let cluster_mode = lookup("REDIS_CLUSTER_MODE")
            .map_or(false, |v| crate::utils::parse_bool_flag(&v));

        let mut config = Self {
            host: non_empty("REDIS_HOST").or(defaults.host),
            port: non_empty("REDIS_PORT")
                .and_then(|port| port.parse().ok())
                .or(defaults.port),
            db: non_empty("REDIS_DB")
                .and_then(|db| db.parse().ok())
                .or(defaults.db),
            username: non_empty("REDIS_USERNAME"),
            password: non_empty("REDIS_PWD"),
            ssl: lookup("REDIS_SSL").map_or(false, |v| crate::utils::parse_bool_flag(&v)),
            ssl_ca_path: non_empty("REDIS_SSL_CA_PATH"),
            ssl_keyfile: non_empty("REDIS_SSL_KEYFILE"),
            ssl_certfile: non_empty("REDIS_SSL_CERTFILE"),
            ssl_cert_reqs: non_empty("REDIS_SSL_CERT_REQS").or(defaults.ssl_cert_reqs),
            ssl_ca_certs: non_empty("REDIS_SSL_CA_CERTS"),
            cluster_mode,
        };
        // Clusters only have database 0 and do not select one
        if cluster_mode {
            config.db = None;
        }
        config
    }

    /// Identifier used when this configuration is registered implicitly
    pub fn host_id(&self) -> String {
        crate::utils::format_host_id(
            self.host.as_deref().unwrap_or(DEFAULT_HOST),
            self.port.unwrap_or(DEFAULT_PORT),
        )
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(host) = &self.host {
            if host.trim().is_empty() {
                return Err(ConfigError::ValidationError("host cannot be empty".to_string()));
            }
        }

        if self.port == Some(0) {
            return Err(ConfigError::ValidationError(
                "port must be greater than 0".to_string(),
            ));
        }

        if let Some(db) = self.db {
            if db < 0 {
                return Err(ConfigError::ValidationError(format!("Invalid db index: {}", db)));
            }
        }

        if let Some(reqs) = &self.ssl_cert_reqs {
            match reqs.as_str() {
                "required" | "optional" | "none" => {}
                _ => {
                    return Err(ConfigError::ValidationError(format!(
                        "Invalid ssl_cert_reqs: {}",
                        reqs
                    )))
                }
            }
        }

        if self.ssl_certfile.is_some() != self.ssl_keyfile.is_some() {
            return Err(ConfigError::ValidationError(
                "ssl_certfile and ssl_keyfile must be provided together".to_string(),
            ));
        }

        Ok(())
    }
}

/// Explicit connection settings, as given to the `connect` tool or the CLI.
///
/// Every field is optional; `resolve` layers them over a base configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db: Option<i64>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl: Option<bool>,
    pub ssl_ca_path: Option<String>,
    pub ssl_keyfile: Option<String>,
    pub ssl_certfile: Option<String>,
    pub ssl_cert_reqs: Option<String>,
    pub ssl_ca_certs: Option<String>,
    pub cluster_mode: Option<bool>,
    pub host_id: Option<String>,
}

impl ConnectOptions {
    /// Produce the configuration and host identifier these options describe.
    ///
    /// The URL (if any) is applied first, explicit fields override it, and
    /// cluster mode drops the database index.
    pub fn resolve(&self, base: StoreConfig) -> Result<(StoreConfig, String), ConfigError> {
        let mut config = base;
        let mut host_id = self.host_id.clone();

        if let Some(url) = &self.url {
            let parsed = parse_redis_uri(url)?;
            parsed.apply_to(&mut config);
            if host_id.is_none() {
                host_id = Some(parsed.host_id());
            }
        }

        if let Some(host) = &self.host {
            config.host = Some(host.clone());
        }
        if let Some(port) = self.port {
            config.port = Some(port);
        }
        if let Some(db) = self.db {
            config.db = Some(db);
        }
        if let Some(username) = &self.username {
            config.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            config.password = Some(password.clone());
        }
        if let Some(ssl) = self.ssl {
            config.ssl = ssl;
        }
        if let Some(path) = &self.ssl_ca_path {
            config.ssl_ca_path = Some(path.clone());
        }
        if let Some(path) = &self.ssl_keyfile {
            config.ssl_keyfile = Some(path.clone());
        }
        if let Some(path) = &self.ssl_certfile {
            config.ssl_certfile = Some(path.clone());
        }
        if let Some(reqs) = &self.ssl_cert_reqs {
            config.ssl_cert_reqs = Some(reqs.clone());
        }
        if let Some(path) = &self.ssl_ca_certs {
            config.ssl_ca_certs = Some(path.clone());
        }
        if let Some(cluster_mode) = self.cluster_mode {
            config.cluster_mode = cluster_mode;
        }

        if config.cluster_mode {
            config.db = None;
        }

        config.validate()?;
        let host_id = host_id.unwrap_or_else(|| config.host_id());
        Ok((config, host_id))
    }
}

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Default Redis connection
    #[serde(default)]
    pub redis: StoreConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Transport used to talk to the MCP client
    pub transport: String,
    /// Deadline for connecting to and probing a Redis server, in seconds
    pub connect_timeout_sec: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".to_string(),
            connect_timeout_sec: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            redis: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Configuration with the Redis section taken from the environment
    pub fn from_env() -> Self {
        Self {
            redis: StoreConfig::from_env(),
            ..Default::default()
        }
    }

    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;

        let mut config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        // Absent keys fall back to standalone defaults; a db index means nothing to a cluster
        if config.redis.cluster_mode {
            config.redis.db = None;
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path, content)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.server.transport.as_str() {
            "stdio" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Unsupported transport: {}",
                    other
                )))
            }
        }

        if self.server.connect_timeout_sec == 0 {
            return Err(ConfigError::ValidationError(
                "connect_timeout_sec must be greater than 0".to_string(),
            ));
        }

        self.redis.validate()?;

        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}",
                    self.logging.level
                )))
            }
        }

        Ok(())
    }

    /// Create example configuration file
    pub fn create_example_config<P: AsRef<Path>>(path: P, mode: &str) -> Result<(), ConfigError> {
        let config = match mode {
            "standalone" => Config::default(),
            "cluster" => Config {
                redis: StoreConfig {
                    host: Some("10.0.1.20".to_string()),
                    port: Some(7000),
                    db: None,
                    cluster_mode: true,
                    ..Default::default()
                },
                ..Default::default()
            },
            _ => {
                return Err(ConfigError::ValidationError(
                    "Mode must be 'standalone' or 'cluster'".to_string(),
                ))
            }
        };

        config.save_to_file(path)
    }
}
