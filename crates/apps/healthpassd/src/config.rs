use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the listen port.
pub const PORT_ENV: &str = "PORT";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid port {value:?}")]
    InvalidPort { value: String },

    #[error("invalid bind address {value:?}")]
    InvalidBind { value: String },
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// Listen address, without port.
    pub bind: String,
    pub port: u16,
    /// Value of `Access-Control-Allow-Origin`.
    pub allowed_origin: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    /// Extra PEM roots trusted for TLS targets.
    pub ca_cert_path: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origin: "*".to_string(),
            connect_timeout_ms: 5_000,
            request_timeout_ms: 10_000,
            ca_cert_path: None,
        }
    }
}

impl DaemonConfig {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml(&contents)
    }

    /// Applies `PORT` from `lookup` (normally `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(PORT_ENV) {
            let raw = raw.trim();
            if !raw.is_empty() {
                self.port = parse_port(raw)?;
            }
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidBind { value: self.bind.clone() })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

pub fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    raw.parse::<u16>().map_err(|_| ConfigError::InvalidPort { value: raw.to_string() })
}
