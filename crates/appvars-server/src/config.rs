//! Server configuration for `AppVars`.
//!
//! Loads configuration from environment variables with sensible defaults.
//! All settings can be overridden via `APPVARS_*` environment variables.

use std::net::SocketAddr;

use appvars_core::crypto::EncryptionKey;
use appvars_core::error::CryptoError;

/// Default listen port when neither `APPVARS_BIND_ADDR` nor `PORT` is set.
const DEFAULT_PORT: u16 = 8300;

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `APPVARS_ROOT_KEY` is set but is not 64 hex characters.
    #[error("APPVARS_ROOT_KEY is invalid: {0}")]
    InvalidRootKey(#[from] CryptoError),

    /// An `APPVARS_APPLICATIONS` entry is not of the form `PROJECT/app`.
    #[error("APPVARS_APPLICATIONS entry '{entry}' must look like PROJECT/app")]
    InvalidApplication { entry: String },
}

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Storage backend type.
    pub storage_backend: StorageBackendType,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// Root key the variable key is derived from. `None` if unset.
    pub root_key: Option<EncryptionKey>,
    /// Bearer token that marks a caller as privileged.
    pub admin_token: Option<String>,
    /// Applications registered at startup on the memory backend.
    pub applications: Vec<(String, String)>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("storage_backend", &self.storage_backend)
            .field("log_level", &self.log_level)
            .field("root_key", &self.root_key)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[redacted]"))
            .field("applications", &self.applications)
            .finish()
    }
}

/// Supported storage backend types.
#[derive(Clone, PartialEq, Eq)]
pub enum StorageBackendType {
    /// In-memory (development only, data lost on restart).
    Memory,
    /// PostgreSQL persistent storage.
    Postgres { url: String },
}

impl std::fmt::Debug for StorageBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => f.write_str("Memory"),
            Self::Postgres { .. } => f
                .debug_struct("Postgres")
                .field("url", &"[redacted]")
                .finish(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PORT`: port to bind on, listening on `0.0.0.0`
    /// - `APPVARS_BIND_ADDR`: full bind address (overrides `PORT`, default: `127.0.0.1:8300`)
    /// - `APPVARS_STORAGE`: `memory` or `postgres` (default: `memory`)
    /// - `DATABASE_URL`: PostgreSQL connection string (used when `APPVARS_STORAGE=postgres`)
    /// - `APPVARS_LOG_LEVEL`: log filter (default: `info`)
    /// - `APPVARS_ROOT_KEY`: 64 hex characters; the variable key is derived from it
    /// - `APPVARS_ADMIN_TOKEN`: bearer token for privileged callers (optional)
    /// - `APPVARS_APPLICATIONS`: comma-separated `PROJECT/app` pairs to register
    ///   on the memory backend
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the root key or an application entry is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the root key or an application entry is malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Priority: APPVARS_BIND_ADDR > PORT > default 127.0.0.1:8300
        let bind_addr = if let Some(addr) = lookup("APPVARS_BIND_ADDR") {
            addr.parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))
        } else if let Some(port_str) = lookup("PORT") {
            let port: u16 = port_str.parse().unwrap_or(DEFAULT_PORT);
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT))
        };

        let storage_backend = match lookup("APPVARS_STORAGE")
            .unwrap_or_else(|| "memory".to_owned())
            .to_lowercase()
            .as_str()
        {
            "postgres" | "postgresql" => {
                let url = lookup("DATABASE_URL")
                    .unwrap_or_else(|| "postgres://localhost/appvars".to_owned());
                StorageBackendType::Postgres { url }
            }
            _ => StorageBackendType::Memory,
        };

        let log_level = lookup("APPVARS_LOG_LEVEL").unwrap_or_else(|| "info".to_owned());

        let root_key = lookup("APPVARS_ROOT_KEY")
            .filter(|v| !v.trim().is_empty())
            .map(|v| EncryptionKey::from_hex(&v))
            .transpose()?;

        let admin_token = lookup("APPVARS_ADMIN_TOKEN").filter(|v| !v.is_empty());

        let applications = lookup("APPVARS_APPLICATIONS")
            .map(|v| parse_applications(&v))
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            bind_addr,
            storage_backend,
            log_level,
            root_key,
            admin_token,
            applications,
        })
    }
}

fn parse_applications(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('/') {
            Some((project, app)) if !project.is_empty() && !app.is_empty() => {
                Ok((project.to_owned(), app.to_owned()))
            }
            _ => Err(ConfigError::InvalidApplication {
                entry: entry.to_owned(),
            }),
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        ServerConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 8300)));
        assert_eq!(config.storage_backend, StorageBackendType::Memory);
        assert_eq!(config.log_level, "info");
        assert!(config.root_key.is_none());
        assert!(config.admin_token.is_none());
        assert!(config.applications.is_empty());
    }

    #[test]
    fn bind_addr_overrides_port() {
        let config = load(&[("APPVARS_BIND_ADDR", "0.0.0.0:9000"), ("PORT", "7000")]).unwrap();
        assert_eq!(config.bind_addr, SocketAddr::from(([0, 0, 0, 0], 9000)));

        let config = load(&[("PORT", "7000")]).unwrap();
        assert_eq!(config.bind_addr, SocketAddr::from(([0, 0, 0, 0], 7000)));
    }

    #[test]
    fn postgres_storage_reads_database_url() {
        let config = load(&[
            ("APPVARS_STORAGE", "Postgres"),
            ("DATABASE_URL", "postgres://db/appvars"),
        ])
        .unwrap();
        assert_eq!(
            config.storage_backend,
            StorageBackendType::Postgres {
                url: "postgres://db/appvars".to_owned()
            }
        );
        assert!(!format!("{:?}", config.storage_backend).contains("db/appvars"));
    }

    #[test]
    fn root_key_must_be_valid_hex() {
        let key = "ab".repeat(32);
        let config = load(&[("APPVARS_ROOT_KEY", key.as_str())]).unwrap();
        let blob = config.root_key.unwrap().seal(b"x").unwrap();
        assert_eq!(EncryptionKey::from_hex(&key).unwrap().open(&blob).unwrap(), b"x");

        let err = load(&[("APPVARS_ROOT_KEY", "nope")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRootKey(_)));
    }

    #[test]
    fn applications_are_parsed() {
        let config = load(&[("APPVARS_APPLICATIONS", "PROJ/api, PROJ/worker,")]).unwrap();
        assert_eq!(
            config.applications,
            vec![
                ("PROJ".to_owned(), "api".to_owned()),
                ("PROJ".to_owned(), "worker".to_owned()),
            ]
        );

        let err = load(&[("APPVARS_APPLICATIONS", "PROJ")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidApplication { ref entry } if entry == "PROJ"));
    }
}
