//! Server configuration
//!
//! Values come from built-in defaults, then an optional TOML file
//! (`PORTAL_CONFIG`, default `portal.toml`), then `PORTAL__*` environment
//! variables, e.g. `PORTAL__STORAGE__BACKEND=memory`.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File, Map};
use portal_storage::StorageConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "portal.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Lifetime of a login session
    pub session_ttl_secs: u64,
    pub storage: StorageConfig,
}

impl ServerConfig {
    /// Load from the file named by `PORTAL_CONFIG` and the process environment
    pub fn load() -> Result<Self> {
        let path = std::env::var_os("PORTAL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&path, None)
    }

    /// `env` replaces the process environment when given
    pub fn load_from(path: &Path, env: Option<Map<String, String>>) -> Result<Self> {
        let config: ServerConfig = Config::builder()
            .set_default("bind_address", "0.0.0.0:8080")?
            .set_default("session_ttl_secs", 86_400)?
            .set_default("storage.backend", "redb")?
            .set_default("storage.path", "data/portal.redb")?
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("PORTAL")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_address
            .parse()
            .with_context(|| format!("Invalid bind address {:?}", self.bind_address))
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.session_ttl_secs).unwrap_or(i64::MAX))
    }

    fn validate(&self) -> Result<()> {
        if self.session_ttl_secs == 0 {
            bail!("session_ttl_secs must be greater than zero");
        }
        // A TTL this large overflows timestamp arithmetic
        if self.session_ttl_secs > 100 * 365 * 86_400 {
            bail!("session_ttl_secs is too large");
        }
        self.socket_addr()?;
        Ok(())
    }
}
