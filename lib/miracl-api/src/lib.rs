//! OpenID Connect relying-party client for MIRACL authentication.
//!
//! This crate provides:
//! - `MiraclClient`: the Authorization Code flow driven against a host-owned
//!   session (authorization URL, callback validation, token exchange,
//!   userinfo lookup)
//! - `SessionStore`: the key-value contract a host session must satisfy
//! - `ClientConfig`: client registration settings
//! - `MiraclError`: the single error kind returned by failing operations
//!
//! # Flow
//!
//! 1. `get_authorization_request_url` stores `state` and `nonce` in the
//!    session and returns the provider URL to redirect to.
//! 2. The provider redirects back with `code` and `state`;
//!    `validate_authorization` checks `state` against the session, exchanges
//!    the code and caches the token.
//! 3. `get_email` / `get_user_id` fetch userinfo once and cache the claims.
//! 4. `clear_user_info` drops the cached claims, or everything on logout.
//!
//! Declined logins, rejected tokens and missing claims come back as `None`;
//! only protocol violations and transport failures are errors.
//!
//! # Example
//!
//! ```no_run
//! use miracl_api::{ClientConfig, MiraclClient};
//! use serde_json::Value;
//! use std::collections::HashMap;
//!
//! # async fn run() -> miracl_api::Result<()> {
//! let client = MiraclClient::new(ClientConfig::new(
//!     "CLIENT_ID",
//!     "CLIENT_SECRET",
//!     "https://app.example.com/c2id",
//! ))
//! .await?;
//!
//! let mut session: HashMap<String, Value> = HashMap::new();
//! let redirect_to = client.get_authorization_request_url(&mut session);
//!
//! // ... the provider calls back with "code=...&state=..."
//! # let query_string = "";
//! if client
//!     .validate_authorization(&mut session, query_string)
//!     .await?
//!     .is_some()
//! {
//!     let email = client.get_email(&mut session).await?;
//! #   let _ = (redirect_to, email);
//! }
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod claims;
pub mod client;
pub mod config;
pub mod error;
mod handle;
pub mod session;

pub use callback::AuthorizationResponse;
pub use claims::Claims;
pub use client::{MIRACL_ISSUER, MiraclClient};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{ErrorKind, MiraclError, QueryStringError, Result};
pub use handle::SCOPES;
pub use session::{
    SESSION_MIRACL_NONCE_KEY, SESSION_MIRACL_STATE_KEY, SESSION_MIRACL_TOKEN_KEY,
    SESSION_MIRACL_USERINFO_KEY, SessionStore,
};
