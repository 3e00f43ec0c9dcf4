//! MIRACL relying-party client.
//!
//! `MiraclClient` drives the Authorization Code flow against a host-owned
//! session: it hands out authorization URLs, validates the provider's
//! callback, exchanges the code for a token and serves identity claims from
//! the userinfo endpoint, caching both token and claims in the session.

use openidconnect::core::{CoreClient, CoreProviderMetadata};
use openidconnect::{ClientId, ClientSecret, IssuerUrl, RedirectUrl};
use tracing::{debug, instrument, warn};

use crate::callback::AuthorizationResponse;
use crate::claims::{Claims, EMAIL_CLAIM, USER_ID_CLAIM};
use crate::config::ClientConfig;
use crate::error::{ErrorKind, MiraclError, Result};
use crate::handle::{ClientHandle, ProviderClient};
use crate::session::{MiraclSession, SessionStore};

/// The MIRACL identity provider.
pub const MIRACL_ISSUER: &str = "https://m-pin.my.id/c2id";

/// OIDC client for authenticating users with MIRACL.
///
/// Provider metadata is discovered once at construction and shared read-only
/// by every operation, so a single client can serve concurrent requests.
pub struct MiraclClient {
    provider_metadata: CoreProviderMetadata,
    client_id: ClientId,
    client_secret: ClientSecret,
    redirect_url: RedirectUrl,
    config: ClientConfig,
    http: reqwest::Client,
}

impl MiraclClient {
    /// Creates a client by discovering the MIRACL provider metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or discovery fails.
    /// There is no retry; construct the client again to re-attempt.
    pub async fn new(config: ClientConfig) -> Result<Self> {
        Self::with_issuer(config, MIRACL_ISSUER).await
    }

    /// Creates a client against a different issuer.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or discovery fails.
    pub async fn with_issuer(config: ClientConfig, issuer: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| MiraclError::with_cause(ErrorKind::Configuration, e).into_report())?;

        Self::with_http_client(config, issuer, http).await
    }

    /// Creates a client that uses the given HTTP client for every request.
    ///
    /// Timeouts and proxies are configured on `http`. It must not follow
    /// redirects.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or discovery fails.
    #[instrument(skip(config, http), fields(client_id = config.client_id()))]
    pub async fn with_http_client(
        config: ClientConfig,
        issuer: &str,
        http: reqwest::Client,
    ) -> Result<Self> {
        let issuer_url = IssuerUrl::new(issuer.to_string())
            .map_err(|e| MiraclError::with_cause(ErrorKind::Configuration, e).into_report())?;

        let redirect_url = RedirectUrl::new(config.redirect_uri().to_string())
            .map_err(|e| MiraclError::with_cause(ErrorKind::Configuration, e).into_report())?;

        let provider_metadata = CoreProviderMetadata::discover_async(issuer_url, &http)
            .await
            .map_err(|e| MiraclError::with_cause(ErrorKind::Discovery, e).into_report())?;

        debug!(
            authorization_endpoint = %provider_metadata.authorization_endpoint().url(),
            "provider metadata discovered"
        );

        Ok(Self {
            provider_metadata,
            client_id: ClientId::new(config.client_id().to_string()),
            client_secret: ClientSecret::new(config.client_secret().to_string()),
            redirect_url,
            config,
            http,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the provider metadata discovered at construction.
    #[must_use]
    pub fn provider_metadata(&self) -> &CoreProviderMetadata {
        &self.provider_metadata
    }

    fn oidc_client(&self) -> ProviderClient {
        CoreClient::from_provider_metadata(
            self.provider_metadata.clone(),
            self.client_id.clone(),
            Some(self.client_secret.clone()),
        )
        .set_redirect_uri(self.redirect_url.clone())
    }

    fn handle(&self, session: &MiraclSession) -> ClientHandle<'_> {
        ClientHandle::new(
            self.oidc_client(),
            &self.http,
            &self.provider_metadata,
            session.access_token(),
        )
    }

    /// Returns the URL to redirect the user to for authorization.
    ///
    /// `state` and `nonce` are generated on first use and reused afterwards,
    /// so reloading the login page does not break an in-flight flow.
    pub fn get_authorization_request_url<S>(&self, session: &mut S) -> String
    where
        S: SessionStore + ?Sized,
    {
        let mut current = MiraclSession::load(session);
        if current.ensure_flow_values() {
            debug!("generated state and nonce for a new authorization flow");
            current.save(session);
        }

        self.handle(&current).authorization_url(
            current.state.as_deref().unwrap_or_default(),
            current.nonce.as_deref().unwrap_or_default(),
        )
    }

    /// Validates the provider's callback and exchanges the code for a token.
    ///
    /// Returns the access token, or `None` if the user declined or the
    /// provider refused to issue a token. An empty query string is a decline
    /// and leaves the session untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the query string is malformed, `state` does not
    /// match the session, or the token request fails.
    #[instrument(skip_all)]
    pub async fn validate_authorization<S>(
        &self,
        session: &mut S,
        query_string: &str,
    ) -> Result<Option<String>>
    where
        S: SessionStore + ?Sized,
    {
        let query_string = query_string.strip_prefix('?').unwrap_or(query_string);
        if query_string.is_empty() {
            debug!("callback without parameters, authorization declined");
            return Ok(None);
        }

        let response = AuthorizationResponse::parse(query_string)
            .map_err(|e| MiraclError::with_cause(ErrorKind::QueryStringParse, e).into_report())?;

        let mut current = MiraclSession::load(session);
        let outcome = self.complete_authorization(&mut current, response).await;
        current.save(session);
        outcome
    }

    async fn complete_authorization(
        &self,
        session: &mut MiraclSession,
        response: AuthorizationResponse,
    ) -> Result<Option<String>> {
        match response.state() {
            Some(returned) => {
                if session.state.as_deref() != Some(returned) {
                    return Err(MiraclError::new(ErrorKind::StateMismatch).into_report());
                }
            }
            None if !self.config.allow_empty_state() => {
                return Err(MiraclError::new(ErrorKind::MissingState).into_report());
            }
            None => {
                warn!("callback without state accepted, resetting session state");
                session.state = Some(String::new());
            }
        }

        let code = match response {
            AuthorizationResponse::Code { code, .. } => code,
            AuthorizationResponse::Error {
                error, description, ..
            } => {
                warn!(%error, ?description, "provider returned an authorization error");
                return Ok(None);
            }
        };

        let handle = self.handle(session);
        let Some(grant) = handle.exchange_code(&code).await? else {
            return Ok(None);
        };

        if grant.access_token.is_empty() {
            warn!("token response carries no access token");
            return Ok(None);
        }

        if let Some(id_token) = &grant.id_token {
            handle.verify_id_token(id_token, session.nonce.as_deref().unwrap_or_default())?;
        }

        session.set_token(grant.response);
        debug!("access token stored in session");
        Ok(Some(grant.access_token))
    }

    /// Returns true if the session holds an access token.
    ///
    /// No request is made; an expired token only shows up when claims are
    /// fetched.
    #[must_use]
    pub fn is_authorized<S>(&self, session: &S) -> bool
    where
        S: SessionStore + ?Sized,
    {
        MiraclSession::load(session).access_token().is_some()
    }

    /// Asks the provider whether the session's access token is still valid.
    ///
    /// This always makes a userinfo request and neither reads nor updates
    /// the claims cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the userinfo endpoint cannot be reached.
    #[instrument(skip_all)]
    pub async fn check_token<S>(&self, session: &S) -> Result<bool>
    where
        S: SessionStore + ?Sized,
    {
        let current = MiraclSession::load(session);
        if current.access_token().is_none() {
            return Ok(false);
        }
        Ok(self.handle(&current).user_info().await?.is_some())
    }

    /// Returns the user's claims, fetching them once per token.
    ///
    /// Returns `None` without a token or when the provider rejects it, in
    /// which case the user has to authorize again.
    ///
    /// # Errors
    ///
    /// Returns an error if the userinfo endpoint cannot be reached or its
    /// response is not a claims object.
    #[instrument(skip_all)]
    pub async fn user_info<S>(&self, session: &mut S) -> Result<Option<Claims>>
    where
        S: SessionStore + ?Sized,
    {
        let mut current = MiraclSession::load(session);
        if current.token.is_none() {
            return Ok(None);
        }
        if let Some(claims) = &current.userinfo {
            debug!("userinfo served from session");
            return Ok(Some(claims.clone()));
        }

        let Some(claims) = self.handle(&current).user_info().await? else {
            return Ok(None);
        };

        current.userinfo = Some(claims.clone());
        current.save(session);
        Ok(Some(claims))
    }

    /// Drops cached claims; with `including_auth`, also the token, state
    /// and nonce, so the next authorization starts from scratch.
    pub fn clear_user_info<S>(&self, session: &mut S, including_auth: bool)
    where
        S: SessionStore + ?Sized,
    {
        let mut current = MiraclSession::load(session);
        current.clear(including_auth);
        current.save(session);
    }

    /// Returns a string claim of the authorized user.
    ///
    /// # Errors
    ///
    /// Fails as [`MiraclClient::user_info`] does.
    pub async fn get_claim<S>(&self, session: &mut S, name: &str) -> Result<Option<String>>
    where
        S: SessionStore + ?Sized,
    {
        Ok(self
            .user_info(session)
            .await?
            .and_then(|claims| claims.get_str(name).map(str::to_string)))
    }

    /// Returns the email of the authorized user.
    ///
    /// # Errors
    ///
    /// Fails as [`MiraclClient::user_info`] does.
    pub async fn get_email<S>(&self, session: &mut S) -> Result<Option<String>>
    where
        S: SessionStore + ?Sized,
    {
        self.get_claim(session, EMAIL_CLAIM).await
    }

    /// Returns the MIRACL user id of the authorized user.
    ///
    /// # Errors
    ///
    /// Fails as [`MiraclClient::user_info`] does.
    pub async fn get_user_id<S>(&self, session: &mut S) -> Result<Option<String>>
    where
        S: SessionStore + ?Sized,
    {
        self.get_claim(session, USER_ID_CLAIM).await
    }
}

impl std::fmt::Debug for MiraclClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiraclClient")
            .field("issuer", &self.provider_metadata.issuer().url().as_str())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
