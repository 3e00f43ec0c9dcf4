//! Sample application configuration.
//!
//! Loaded via the `config` crate from environment variables, e.g.
//! `MIRACL__CLIENT_ID`, `MIRACL__CLIENT_SECRET`, `MIRACL__REDIRECT_URI`.
//!
//! See [`ClientConfig`](miracl_api::ClientConfig) for the client settings.

use miracl_api::ClientConfig;
use serde::Deserialize;

/// Sample configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct SampleConfig {
    /// Address to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Whether to set the Secure flag on the session cookie (requires HTTPS).
    /// Set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,

    /// Idle time after which a session is forgotten.
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u64,

    /// Interval between expired session sweeps.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,

    /// MIRACL client registration.
    pub miracl: ClientConfig,
}

fn default_listen_addr() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_secure_cookies() -> bool {
    true
}

fn default_session_ttl_seconds() -> u64 {
    3600
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

impl SampleConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
