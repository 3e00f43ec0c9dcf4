//! In-memory server-side session storage keyed by a cookie.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "session";

/// Per-user session data handed to the MIRACL client.
pub type SessionData = HashMap<String, Value>;

/// Session data for every visitor, keyed by session id.
///
/// Handlers take a copy of the visitor's data, work on it and put it back.
/// A session idle for longer than the TTL reads as empty and is removed by
/// [`SessionRegistry::delete_expired`].
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<String, SessionEntry>>>,
    ttl: Duration,
}

struct SessionEntry {
    data: SessionData,
    touched: Instant,
}

impl SessionEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.touched.elapsed() >= ttl
    }
}

impl SessionRegistry {
    /// Creates an empty registry whose sessions expire after `ttl` idle.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Returns a copy of the session data, or an empty session.
    pub async fn load(&self, session_id: &str) -> SessionData {
        self.inner
            .lock()
            .await
            .get(session_id)
            .filter(|entry| !entry.is_expired(self.ttl))
            .map(|entry| entry.data.clone())
            .unwrap_or_default()
    }

    /// Replaces the session data. An empty session is dropped.
    pub async fn store(&self, session_id: &str, data: SessionData) {
        let mut sessions = self.inner.lock().await;
        if data.is_empty() {
            sessions.remove(session_id);
            return;
        }

        sessions.insert(
            session_id.to_string(),
            SessionEntry {
                data,
                touched: Instant::now(),
            },
        );
    }

    /// Removes expired sessions. Returns how many were removed.
    pub async fn delete_expired(&self) -> usize {
        let mut sessions = self.inner.lock().await;
        let before = sessions.len();
        sessions.retain(|_, entry| !entry.is_expired(self.ttl));
        before - sessions.len()
    }

    /// Number of live and not yet swept sessions.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

/// Returns the visitor's session id, issuing a new cookie if there is none.
pub fn session_id(jar: CookieJar, secure: bool) -> (CookieJar, String) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let id = cookie.value().to_string();
        return (jar, id);
    }

    let id = ulid::Ulid::new().to_string();
    let cookie = Cookie::build((SESSION_COOKIE, id.clone()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax);

    tracing::debug!(session_id = %id, "issued session cookie");
    (jar.add(cookie), id)
}
