//! Session state owned by the host application.
//!
//! The host supplies a per-user key-value store on every call. The client
//! reads the keys it manages into a [`MiraclSession`] when an operation
//! starts and writes them back when it ends. Keys it does not manage are
//! never touched.

use openidconnect::{CsrfToken, Nonce};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::claims::Claims;

/// Session key holding the anti-CSRF `state` of the current flow.
pub const SESSION_MIRACL_STATE_KEY: &str = "miracl_state";

/// Session key holding the `nonce` of the current flow.
pub const SESSION_MIRACL_NONCE_KEY: &str = "miracl_nonce";

/// Session key holding the token endpoint response.
pub const SESSION_MIRACL_TOKEN_KEY: &str = "miracl_token";

/// Session key holding cached userinfo claims.
pub const SESSION_MIRACL_USERINFO_KEY: &str = "miracl_userinfo";

/// A mutable, per-user key-value store persisted by the host across requests.
///
/// Implementations backed by cookies or a server-side store only need to
/// support get, insert and remove by string key.
pub trait SessionStore {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Option<Value>;

    /// Stores `value` under `key`, replacing any previous value.
    fn insert(&mut self, key: &str, value: Value);

    /// Removes `key`. Removing an absent key is a no-op.
    fn remove(&mut self, key: &str);
}

impl SessionStore for HashMap<String, Value> {
    fn get(&self, key: &str) -> Option<Value> {
        HashMap::get(self, key).cloned()
    }

    fn insert(&mut self, key: &str, value: Value) {
        HashMap::insert(self, key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        HashMap::remove(self, key);
    }
}

impl SessionStore for Map<String, Value> {
    fn get(&self, key: &str) -> Option<Value> {
        Map::get(self, key).cloned()
    }

    fn insert(&mut self, key: &str, value: Value) {
        Map::insert(self, key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        Map::remove(self, key);
    }
}

/// Typed view of the keys the client manages.
///
/// A stored value of the wrong JSON type reads as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct MiraclSession {
    pub(crate) state: Option<String>,
    pub(crate) nonce: Option<String>,
    pub(crate) token: Option<Map<String, Value>>,
    pub(crate) userinfo: Option<Claims>,
}

impl MiraclSession {
    pub(crate) fn load<S>(store: &S) -> Self
    where
        S: SessionStore + ?Sized,
    {
        Self {
            state: load_string(store, SESSION_MIRACL_STATE_KEY),
            nonce: load_string(store, SESSION_MIRACL_NONCE_KEY),
            token: load_object(store, SESSION_MIRACL_TOKEN_KEY),
            userinfo: load_object(store, SESSION_MIRACL_USERINFO_KEY).map(Claims::from),
        }
    }

    pub(crate) fn save<S>(&self, store: &mut S)
    where
        S: SessionStore + ?Sized,
    {
        save_value(
            store,
            SESSION_MIRACL_STATE_KEY,
            self.state.clone().map(Value::String),
        );
        save_value(
            store,
            SESSION_MIRACL_NONCE_KEY,
            self.nonce.clone().map(Value::String),
        );
        save_value(
            store,
            SESSION_MIRACL_TOKEN_KEY,
            self.token.clone().map(Value::Object),
        );
        save_value(
            store,
            SESSION_MIRACL_USERINFO_KEY,
            self.userinfo.clone().map(Value::from),
        );
    }

    /// Generates `state` and `nonce` if missing. Returns true if either was
    /// created.
    pub(crate) fn ensure_flow_values(&mut self) -> bool {
        let mut generated = false;
        if self.state.is_none() {
            self.state = Some(CsrfToken::new_random().secret().clone());
            generated = true;
        }
        if self.nonce.is_none() {
            self.nonce = Some(Nonce::new_random().secret().clone());
            generated = true;
        }
        generated
    }

    /// Returns the cached access token, if the token response carried one.
    pub(crate) fn access_token(&self) -> Option<&str> {
        self.token
            .as_ref()
            .and_then(|token| token.get("access_token"))
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
    }

    /// Stores a fresh token response. Cached claims belong to the previous
    /// token and are dropped.
    pub(crate) fn set_token(&mut self, token: Map<String, Value>) {
        self.token = Some(token);
        self.userinfo = None;
    }

    pub(crate) fn clear(&mut self, including_auth: bool) {
        self.userinfo = None;
        if including_auth {
            self.state = None;
            self.nonce = None;
            self.token = None;
        }
    }
}

fn load_string<S>(store: &S, key: &str) -> Option<String>
where
    S: SessionStore + ?Sized,
{
    match store.get(key)? {
        Value::String(value) => Some(value),
        other => {
            tracing::warn!(key, kind = json_kind(&other), "ignoring malformed session value");
            None
        }
    }
}

fn load_object<S>(store: &S, key: &str) -> Option<Map<String, Value>>
where
    S: SessionStore + ?Sized,
{
    match store.get(key)? {
        Value::Object(value) => Some(value),
        other => {
            tracing::warn!(key, kind = json_kind(&other), "ignoring malformed session value");
            None
        }
    }
}

fn save_value<S>(store: &mut S, key: &str, value: Option<Value>)
where
    S: SessionStore + ?Sized,
{
    match value {
        Some(value) => store.insert(key, value),
        None => store.remove(key),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token(access_token: &str) -> Map<String, Value> {
        match json!({"access_token": access_token, "token_type": "bearer"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn empty_store_loads_empty_session() {
        let store: HashMap<String, Value> = HashMap::new();
        assert_eq!(MiraclSession::load(&store), MiraclSession::default());
    }

    #[test]
    fn save_then_load_preserves_fields() {
        let mut session = MiraclSession::default();
        session.ensure_flow_values();
        session.set_token(token("T"));
        session.userinfo = Some(Claims::from(match json!({"sub": "a@b.com"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }));

        let mut store = Map::new();
        session.save(&mut store);

        assert_eq!(MiraclSession::load(&store), session);
        assert_eq!(store[SESSION_MIRACL_TOKEN_KEY]["access_token"], "T");
    }

    #[test]
    fn unrelated_keys_are_untouched() {
        let mut store: HashMap<String, Value> = HashMap::new();
        HashMap::insert(&mut store, "csrf".to_string(), json!("keep"));

        let mut session = MiraclSession::load(&store);
        session.ensure_flow_values();
        session.save(&mut store);
        session.clear(true);
        session.save(&mut store);

        assert_eq!(store.len(), 1);
        assert_eq!(store["csrf"], "keep");
    }

    #[test]
    fn malformed_values_read_as_absent() {
        let mut store: HashMap<String, Value> = HashMap::new();
        HashMap::insert(&mut store, SESSION_MIRACL_STATE_KEY.to_string(), json!(7));
        HashMap::insert(&mut store, SESSION_MIRACL_TOKEN_KEY.to_string(), json!("T"));

        let session = MiraclSession::load(&store);
        assert_eq!(session.state, None);
        assert_eq!(session.token, None);
        assert_eq!(session.access_token(), None);
    }

    #[test]
    fn flow_values_are_generated_once() {
        let mut session = MiraclSession::default();
        assert!(session.ensure_flow_values());
        let state = session.state.clone();
        let nonce = session.nonce.clone();

        assert!(!session.ensure_flow_values());
        assert_eq!(session.state, state);
        assert_eq!(session.nonce, nonce);
        assert_ne!(state, nonce);
    }

    #[test]
    fn empty_access_token_is_not_a_token() {
        let mut session = MiraclSession::default();
        session.set_token(token(""));
        assert_eq!(session.access_token(), None);

        session.set_token(token("T"));
        assert_eq!(session.access_token(), Some("T"));
    }

    #[test]
    fn new_token_drops_cached_claims() {
        let mut session = MiraclSession {
            userinfo: Some(Claims::new()),
            ..MiraclSession::default()
        };
        session.set_token(token("T"));
        assert!(session.userinfo.is_none());
    }

    #[test]
    fn clear_without_auth_keeps_token() {
        let mut session = MiraclSession::default();
        session.ensure_flow_values();
        session.set_token(token("T"));
        session.userinfo = Some(Claims::new());

        session.clear(false);
        assert!(session.userinfo.is_none());
        assert_eq!(session.access_token(), Some("T"));
        assert!(session.state.is_some());

        session.clear(true);
        assert_eq!(session, MiraclSession::default());
    }
}
