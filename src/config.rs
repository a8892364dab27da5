use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::crypto::keystore::KeyStoreType;

/// Runtime configuration.
///
/// Layered as: compiled defaults, then `config.toml` (optional), then
/// `CONSOLE_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub database_url: String,
    pub loglevel: String,
    /// Shared secret required on every SCIM call.
    pub admin_key: String,
    pub keystore_type: KeyStoreType,
    pub keystore_password: String,
    pub truststore_type: KeyStoreType,
    pub truststore_password: String,
    pub http_timeout_secs: u64,
    pub outbound_rate_per_minute: u32,
    /// Maximum number of recorded exchanges kept per OpenID client.
    pub history_limit: i64,
    pub max_body_bytes: usize,
    pub default_page_size: i64,
    pub max_page_size: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            database_url: "sqlite:oidc-console.sqlite".to_string(),
            loglevel: "info".to_string(),
            admin_key: "change-me".to_string(),
            keystore_type: KeyStoreType::Pkcs12,
            keystore_password: "123456".to_string(),
            truststore_type: KeyStoreType::Pkcs12,
            truststore_password: "123456".to_string(),
            http_timeout_secs: 15,
            outbound_rate_per_minute: 60,
            history_limit: 100,
            max_body_bytes: 2 * 1024 * 1024,
            default_page_size: 25,
            max_page_size: 100,
        }
    }
}

impl Config {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("CONSOLE_"))
    }

    pub fn load() -> Result<Self, figment::Error> {
        let cfg: Config = Self::figment().extract()?;
        if cfg.admin_key.trim().is_empty() {
            return Err(figment::Error::from(
                "admin_key must not be empty".to_string(),
            ));
        }
        Ok(cfg)
    }
}

pub static CONFIG: LazyLock<Config> =
    LazyLock::new(|| Config::load().expect("FATAL: invalid oidc-console configuration"));
