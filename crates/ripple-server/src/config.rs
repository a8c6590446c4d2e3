//! Environment-driven configuration. All variables use the `RIPPLE_`
//! prefix; every one has a development-friendly default.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::AuthConfig;
use crate::db::DatabaseConfig;
use crate::storage::StorageConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    /// Attachment URL signing; disabled unless a base URL is configured.
    pub storage: Option<StorageConfig>,
}

impl Config {
    /// Read configuration from the environment.
    ///
    /// Defaults: listen on 0.0.0.0:3000, in-memory database, attachment
    /// signing off.
    pub fn from_env() -> anyhow::Result<Self> {
        let addr = env_or("RIPPLE_ADDR", "0.0.0.0:3000").parse()?;

        let database = DatabaseConfig {
            path: std::env::var("RIPPLE_DB_PATH").ok().map(PathBuf::from),
            max_connections: parsed_env("RIPPLE_DB_MAX_CONNECTIONS").unwrap_or(5),
        };

        let auth = AuthConfig {
            jwt_secret: env_or("RIPPLE_JWT_SECRET", "dev-secret-change-me"),
        };

        let storage = std::env::var("RIPPLE_FILES_BASE_URL")
            .ok()
            .map(|base_url| StorageConfig {
                base_url,
                signing_key: env_or("RIPPLE_FILES_SIGNING_KEY", &auth.jwt_secret),
                url_ttl: Duration::from_secs(parsed_env("RIPPLE_FILES_URL_TTL_SECS").unwrap_or(3600)),
            });

        Ok(Self {
            addr,
            database,
            auth,
            storage,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_owned())
}

fn parsed_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}
