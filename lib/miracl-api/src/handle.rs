//! Per-request protocol driver.
//!
//! A `ClientHandle` binds the cached provider metadata, the client
//! registration and the session's access token for the duration of one
//! operation. It is rebuilt on every call and never stored.

use openidconnect::core::{
    CoreAuthenticationFlow, CoreClient, CoreIdToken, CoreProviderMetadata, CoreTokenResponse,
};
use openidconnect::{
    AccessToken, AuthorizationCode, CsrfToken, EndpointMaybeSet, EndpointNotSet, EndpointSet,
    Nonce, OAuth2TokenResponse, RequestTokenError, Scope, TokenResponse,
};
use reqwest::header::ACCEPT;
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::claims::Claims;
use crate::error::{ErrorKind, MiraclError, Result};

/// Scopes requested on every authorization and token request.
pub const SCOPES: [&str; 4] = ["openid", "email", "user_id", "name"];

/// `CoreClient` as produced from discovered provider metadata.
pub(crate) type ProviderClient = CoreClient<
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointMaybeSet,
    EndpointMaybeSet,
>;

/// A token endpoint response accepted by the client.
#[derive(Debug)]
pub(crate) struct TokenGrant {
    /// Access token, possibly empty.
    pub(crate) access_token: String,
    /// ID token still to be verified.
    pub(crate) id_token: Option<CoreIdToken>,
    /// The response as stored in the session.
    pub(crate) response: Map<String, Value>,
}

impl TokenGrant {
    fn from_response(token: &CoreTokenResponse) -> Result<Self> {
        let response = match serde_json::to_value(token) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(MiraclError::with_cause(
                    ErrorKind::AccessTokenRequest,
                    "token response is not a JSON object",
                )
                .into_report());
            }
            Err(e) => {
                return Err(
                    MiraclError::with_cause(ErrorKind::AccessTokenRequest, e).into_report()
                );
            }
        };

        Ok(Self {
            access_token: token.access_token().secret().clone(),
            id_token: token.id_token().cloned(),
            response,
        })
    }

    /// Reads a token response the strict parser rejected.
    ///
    /// Returns `None` if the body is neither a grant nor an OAuth2 error,
    /// `Some(Ok(None))` for an error body without an access token.
    fn from_body(body: &[u8]) -> Option<Result<Option<Self>>> {
        let Ok(Value::Object(response)) = serde_json::from_slice::<Value>(body) else {
            return None;
        };

        let access_token = response
            .get("access_token")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if access_token.is_empty() {
            let error = response.get("error")?;
            warn!(%error, "token endpoint answered with an error body");
            return Some(Ok(None));
        }

        let id_token = match response.get("id_token") {
            None | Some(Value::Null) => None,
            Some(Value::String(raw)) => match CoreIdToken::from_str(raw) {
                Ok(id_token) => Some(id_token),
                Err(e) => {
                    return Some(Err(MiraclError::with_cause(
                        ErrorKind::IdTokenValidation,
                        e,
                    )
                    .into_report()));
                }
            },
            Some(_) => {
                return Some(Err(MiraclError::with_cause(
                    ErrorKind::IdTokenValidation,
                    "id_token is not a string",
                )
                .into_report()));
            }
        };

        debug!("accepted token response outside the OAuth2 grammar");
        Some(Ok(Some(Self {
            access_token,
            id_token,
            response,
        })))
    }
}

pub(crate) struct ClientHandle<'a> {
    oidc: ProviderClient,
    http: &'a reqwest::Client,
    metadata: &'a CoreProviderMetadata,
    access_token: Option<AccessToken>,
}

impl<'a> ClientHandle<'a> {
    pub(crate) fn new(
        oidc: ProviderClient,
        http: &'a reqwest::Client,
        metadata: &'a CoreProviderMetadata,
        access_token: Option<&str>,
    ) -> Self {
        Self {
            oidc,
            http,
            metadata,
            access_token: access_token.map(|token| AccessToken::new(token.to_string())),
        }
    }

    /// Builds the redirect URL for an authorization code request.
    pub(crate) fn authorization_url(&self, state: &str, nonce: &str) -> String {
        let state = CsrfToken::new(state.to_string());
        let nonce = Nonce::new(nonce.to_string());

        // The driver always adds `openid` itself.
        let request = SCOPES
            .iter()
            .filter(|scope| **scope != "openid")
            .fold(
                self.oidc.authorize_url(
                    CoreAuthenticationFlow::AuthorizationCode,
                    move || state,
                    move || nonce,
                ),
                |request, scope| request.add_scope(Scope::new((*scope).to_string())),
            );

        let (url, _, _) = request.url();
        url.to_string()
    }

    /// Exchanges an authorization code using `client_secret_basic`.
    ///
    /// Returns `None` when the token endpoint refuses the code, either with
    /// an OAuth2 error status or with an `error` body and no access token.
    pub(crate) async fn exchange_code(&self, code: &str) -> Result<Option<TokenGrant>> {
        let request = self
            .oidc
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .map_err(|e| MiraclError::with_cause(ErrorKind::AccessTokenRequest, e).into_report())?;

        let response = request
            .add_extra_param("scope", SCOPES.join(" "))
            .request_async(self.http)
            .await;

        match response {
            Ok(token) => TokenGrant::from_response(&token).map(Some),
            Err(RequestTokenError::ServerResponse(denial)) => {
                warn!(response = ?denial, "token endpoint refused the authorization code");
                Ok(None)
            }
            // Bodies outside the strict OAuth2 grammar, such as a missing
            // `token_type` or an `error` object sent with 200.
            Err(RequestTokenError::Parse(e, body)) => TokenGrant::from_body(&body)
                .ok_or_else(|| {
                    MiraclError::with_cause(ErrorKind::AccessTokenRequest, e).into_report()
                })?,
            Err(e) => Err(MiraclError::with_cause(ErrorKind::AccessTokenRequest, e).into_report()),
        }
    }

    /// Verifies the ID token against the flow's nonce.
    pub(crate) fn verify_id_token(&self, id_token: &CoreIdToken, nonce: &str) -> Result<()> {
        let verifier = self.oidc.id_token_verifier();
        id_token
            .claims(&verifier, &Nonce::new(nonce.to_string()))
            .map_err(|e| MiraclError::with_cause(ErrorKind::IdTokenValidation, e).into_report())?;

        debug!("ID token verified");
        Ok(())
    }

    /// Fetches claims from the userinfo endpoint with the bound access token.
    ///
    /// Returns `None` without a token, or when the provider rejects it.
    pub(crate) async fn user_info(&self) -> Result<Option<Claims>> {
        let Some(access_token) = &self.access_token else {
            return Ok(None);
        };

        let endpoint = self.metadata.userinfo_endpoint().ok_or_else(|| {
            MiraclError::with_cause(
                ErrorKind::UserInfoRequest,
                "provider does not advertise a userinfo endpoint",
            )
            .into_report()
        })?;

        let response = self
            .http
            .get(endpoint.url().as_str())
            .bearer_auth(access_token.secret())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| MiraclError::with_cause(ErrorKind::UserInfoRequest, e).into_report())?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "userinfo endpoint rejected the access token");
            return Ok(None);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| MiraclError::with_cause(ErrorKind::UserInfoRequest, e).into_report())?;

        let claims: Claims = serde_json::from_slice(&body)
            .map_err(|e| MiraclError::with_cause(ErrorKind::CorruptedResponse, e).into_report())?;

        debug!(claims = claims.as_map().len(), "userinfo fetched");
        Ok(Some(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(body: &str) -> Option<Result<Option<TokenGrant>>> {
        TokenGrant::from_body(body.as_bytes())
    }

    #[test]
    fn body_without_token_type_is_a_grant() {
        let grant = grant(r#"{"access_token":"T"}"#)
            .expect("recognised")
            .expect("no error")
            .expect("grant");

        assert_eq!(grant.access_token, "T");
        assert!(grant.id_token.is_none());
        assert_eq!(grant.response["access_token"], "T");
    }

    #[test]
    fn error_body_without_token_is_a_denial() {
        let outcome = grant(r#"{"error":"invalid_grant"}"#)
            .expect("recognised")
            .expect("no error");

        assert!(outcome.is_none());
    }

    #[test]
    fn empty_token_with_error_is_a_denial() {
        let outcome = grant(r#"{"access_token":"","error":"invalid_grant"}"#)
            .expect("recognised")
            .expect("no error");

        assert!(outcome.is_none());
    }

    #[test]
    fn unrelated_bodies_are_not_recognised() {
        assert!(grant("<html>oops</html>").is_none());
        assert!(grant("[]").is_none());
        assert!(grant(r#"{"token":"T"}"#).is_none());
    }

    #[test]
    fn malformed_id_token_fails_validation() {
        let err = grant(r#"{"access_token":"T","id_token":"not-a-jwt"}"#)
            .expect("recognised")
            .expect_err("id_token must parse");

        assert!(err.to_string().contains("ID token validation failed"));
    }
}
