//! Client registration settings.
//!
//! These are the values the relying party was registered with at MIRACL.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration for a `MiraclClient`.
///
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// The OAuth2 client ID registered with the provider.
    client_id: String,
    /// The OAuth2 client secret.
    client_secret: String,
    /// The redirect URI for the OAuth2 callback (e.g., "https://app.example.com/c2id").
    redirect_uri: String,
    /// Accept callbacks that carry no `state` parameter.
    /// Default: true
    #[serde(default = "default_allow_empty_state")]
    allow_empty_state: bool,
}

fn default_allow_empty_state() -> bool {
    true
}

impl ClientConfig {
    /// Creates a new configuration with defaults for optional fields.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            allow_empty_state: default_allow_empty_state(),
        }
    }

    /// Creates a configuration builder for more customization.
    #[must_use]
    pub fn builder(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::new(client_id, client_secret, redirect_uri),
        }
    }

    /// Returns the OAuth2 client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the OAuth2 client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Returns the OAuth2 redirect URI.
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Returns whether callbacks without `state` are accepted.
    ///
    /// This is a workaround for providers that drop `state` on some flows and
    /// is not standard OIDC behaviour.
    #[must_use]
    pub fn allow_empty_state(&self) -> bool {
        self.allow_empty_state
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("redirect_uri", &self.redirect_uri)
            .field("allow_empty_state", &self.allow_empty_state)
            .finish()
    }
}

/// Builder for `ClientConfig`.
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Sets whether callbacks without `state` are accepted.
    #[must_use]
    pub fn allow_empty_state(mut self, allow: bool) -> Self {
        self.config.allow_empty_state = allow;
        self
    }

    /// Builds the `ClientConfig`.
    #[must_use]
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
