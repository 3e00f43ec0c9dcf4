//! Sample routes: login, callback, greeting, refresh and logout.

use axum::{
    extract::{RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use miracl_api::{MiraclClient, MiraclError};
use rootcause::Report;
use std::sync::Arc;

use crate::store::{SessionRegistry, session_id};

/// Shared application state.
pub struct AppState {
    pub miracl: MiraclClient,
    pub sessions: SessionRegistry,
    pub secure_cookies: bool,
}

impl AppState {
    pub fn new(miracl: MiraclClient, sessions: SessionRegistry, secure_cookies: bool) -> Self {
        Self {
            miracl,
            sessions,
            secure_cookies,
        }
    }
}

/// Greets an authorized user, or sends them to log in.
pub async fn index(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let (jar, id) = session_id(jar, state.secure_cookies);
    let mut session = state.sessions.load(&id).await;

    if !state.miracl.is_authorized(&session) {
        return Ok((jar, Redirect::to("/auth")).into_response());
    }

    let email = state.miracl.get_email(&mut session).await;
    let response = match email {
        Ok(Some(email)) => (jar, format!("Welcome, {email}")).into_response(),
        Ok(None) => {
            tracing::info!("access token no longer accepted, restarting login");
            state.miracl.clear_user_info(&mut session, true);
            (jar, Redirect::to("/auth")).into_response()
        }
        Err(e) => {
            state.sessions.store(&id, session).await;
            return Err(AppError(e));
        }
    };

    state.sessions.store(&id, session).await;
    Ok(response)
}

/// Redirects to the MIRACL authorization page.
pub async fn auth(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let (jar, id) = session_id(jar, state.secure_cookies);
    let mut session = state.sessions.load(&id).await;

    let auth_url = state.miracl.get_authorization_request_url(&mut session);
    state.sessions.store(&id, session).await;

    (jar, Redirect::to(&auth_url))
}

/// Handles the redirect back from MIRACL.
pub async fn c2id(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let (jar, id) = session_id(jar, state.secure_cookies);
    let mut session = state.sessions.load(&id).await;

    let outcome = state
        .miracl
        .validate_authorization(&mut session, query.as_deref().unwrap_or_default())
        .await;
    state.sessions.store(&id, session).await;

    match outcome.map_err(AppError)? {
        Some(_) => {
            tracing::info!(session_id = %id, "user authorized");
            Ok((jar, Redirect::to("/")).into_response())
        }
        None => Ok((jar, "Error").into_response()),
    }
}

/// Drops the cached claims so the next visit fetches them again.
pub async fn refresh(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    clear_and_redirect(&state, jar, false).await
}

/// Forgets the user entirely.
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    clear_and_redirect(&state, jar, true).await
}

async fn clear_and_redirect(state: &AppState, jar: CookieJar, including_auth: bool) -> Response {
    let (jar, id) = session_id(jar, state.secure_cookies);
    let mut session = state.sessions.load(&id).await;

    state.miracl.clear_user_info(&mut session, including_auth);
    state.sessions.store(&id, session).await;

    (jar, Redirect::to("/")).into_response()
}

/// A MIRACL failure surfaced as a server error.
#[derive(Debug)]
pub struct AppError(pub Report<MiraclError>);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!("MIRACL request failed: {}", self.0);
        (StatusCode::INTERNAL_SERVER_ERROR, "Authentication failed").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{SESSION_COOKIE, SessionData};
    use axum::http::header::LOCATION;
    use axum_extra::extract::cookie::Cookie;
    use miracl_api::{ClientConfig, ErrorKind, SESSION_MIRACL_TOKEN_KEY};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// A provider whose userinfo endpoint rejects every token.
    async fn provider() -> MockServer {
        let server = MockServer::start().await;
        let issuer = format!("{}/c2id", server.uri());

        Mock::given(method("GET"))
            .and(path("/c2id/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": issuer,
                "authorization_endpoint": format!("{issuer}/login"),
                "token_endpoint": format!("{issuer}/token"),
                "userinfo_endpoint": format!("{issuer}/userinfo"),
                "jwks_uri": format!("{issuer}/jwks.json"),
                "response_types_supported": ["code"],
                "subject_types_supported": ["public"],
                "id_token_signing_alg_values_supported": ["RS256"]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/c2id/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"keys": []})))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/c2id/userinfo"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        server
    }

    async fn app_state(server: &MockServer) -> Arc<AppState> {
        let miracl = MiraclClient::with_issuer(
            ClientConfig::new("MOCK_CLIENT", "MOCK_SECRET", "http://localhost:5000/c2id"),
            &format!("{}/c2id", server.uri()),
        )
        .await
        .expect("client construction against mock provider");

        Arc::new(AppState::new(
            miracl,
            SessionRegistry::new(Duration::from_secs(3600)),
            false,
        ))
    }

    fn jar_for(session_id: &str) -> CookieJar {
        CookieJar::new().add(Cookie::new(SESSION_COOKIE, session_id.to_string()))
    }

    #[test]
    fn miracl_failure_is_internal_server_error() {
        let report: Report<MiraclError> = MiraclError::new(ErrorKind::StateMismatch).into();
        let response = AppError(report).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn stale_token_logs_out_and_restarts_login() {
        let server = provider().await;
        let state = app_state(&server).await;
        let mut session = SessionData::new();
        session.insert("miracl_state".to_string(), json!("s"));
        session.insert("miracl_nonce".to_string(), json!("n"));
        session.insert(
            SESSION_MIRACL_TOKEN_KEY.to_string(),
            json!({"access_token": "T", "token_type": "bearer"}),
        );
        state.sessions.store("sess_1", session).await;

        let response = index(State(state.clone()), jar_for("sess_1"))
            .await
            .expect("index")
            .into_response();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[LOCATION], "/auth");
        assert!(state.sessions.load("sess_1").await.is_empty());
    }

    #[tokio::test]
    async fn anonymous_visits_store_no_session() {
        let server = provider().await;
        let state = app_state(&server).await;

        let response = index(State(state.clone()), CookieJar::new())
            .await
            .expect("index")
            .into_response();
        assert_eq!(response.headers()[LOCATION], "/auth");

        let _ = refresh(State(state.clone()), CookieJar::new()).await;
        let _ = logout(State(state.clone()), CookieJar::new()).await;

        assert_eq!(state.sessions.len().await, 0);
    }

    #[tokio::test]
    async fn login_redirect_keeps_flow_state() {
        let server = provider().await;
        let state = app_state(&server).await;

        let response = auth(State(state.clone()), jar_for("sess_1"))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[LOCATION].to_str().expect("ascii");
        assert!(location.starts_with(&format!("{}/c2id/login?", server.uri())));
        assert!(state.sessions.load("sess_1").await.contains_key("miracl_state"));
    }
}
