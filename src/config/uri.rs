/// Redis connection URI parsing
///
/// Accepts `redis://` and `rediss://` URIs of the form
/// `redis[s]://[user[:password]@]host[:port][/db][?options]`.
use super::StoreConfig;
use crate::error::ConfigError;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6379;

/// Fields recovered from a connection URI.
///
/// Only what the URI actually states is filled in; `None` leaves the
/// corresponding field of the base configuration untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UriConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub ssl: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_cert_reqs: Option<String>,
    pub ssl_ca_certs: Option<String>,
    pub ssl_ca_path: Option<String>,
    pub ssl_keyfile: Option<String>,
    pub ssl_certfile: Option<String>,
}

impl UriConfig {
    /// Overlay the URI fields onto an existing configuration
    pub fn apply_to(&self, config: &mut StoreConfig) {
        config.host = Some(self.host.clone());
        config.port = Some(self.port);
        config.db = Some(self.db);
        config.ssl = self.ssl;
        if let Some(username) = &self.username {
            config.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            config.password = Some(password.clone());
        }
        if let Some(reqs) = &self.ssl_cert_reqs {
            config.ssl_cert_reqs = Some(reqs.clone());
        }
        if let Some(path) = &self.ssl_ca_certs {
            config.ssl_ca_certs = Some(path.clone());
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
    }

    pub fn host_id(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse a Redis URI into connection fields
pub fn parse_redis_uri(uri: &str) -> Result<UriConfig, ConfigError> {
    let scheme = uri.split_once("://").map(|(scheme, _)| scheme).unwrap_or("");
    let ssl = match scheme {
        "rediss" => true,
        "redis" => false,
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
    };

    let url = redis::parse_redis_url(uri).ok_or_else(|| ConfigError::InvalidUri(uri.to_string()))?;

    let mut config = UriConfig {
        host: url
            .host_str()
            .filter(|host| !host.is_empty())
            .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_string())
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        port: url.port().unwrap_or(DEFAULT_PORT),
        ssl,
        ..Default::default()
    };

    // Non-numeric path segments fall back to db 0
    let path = url.path().trim_start_matches('/');
    config.db = if path.is_empty() { 0 } else { path.parse().unwrap_or(0) };

    if !url.username().is_empty() {
        config.username = Some(url.username().to_string());
    }
    if let Some(password) = url.password().filter(|p| !p.is_empty()) {
        config.password = Some(password.to_string());
    }

    for (key, value) in url.query_pairs() {
        let value = value.into_owned();
        match key.as_ref() {
            "ssl_cert_reqs" => config.ssl_cert_reqs = Some(value),
            "ssl_ca_certs" => config.ssl_ca_certs = Some(value),
            "ssl_ca_path" => config.ssl_ca_path = Some(value),
            "ssl_keyfile" => config.ssl_keyfile = Some(value),
            "ssl_certfile" => config.ssl_certfile = Some(value),
            // A numeric `db` query parameter wins over the path segment
            "db" => {
                if let Ok(db) = value.parse() {
                    config.db = db;
                }
            }
            _ => {}
        }
    }

    Ok(config)
}
