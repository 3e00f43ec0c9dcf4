//! Parsing of the identity provider's redirect back to the relying party.

use url::form_urlencoded;

use crate::error::QueryStringError;

/// Authorization response carried by the callback query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationResponse {
    /// The user granted access and the provider issued a code.
    Code { code: String, state: Option<String> },
    /// The provider refused or the user declined.
    Error {
        error: String,
        description: Option<String>,
        state: Option<String>,
    },
}

impl AuthorizationResponse {
    /// Parses a URL-encoded callback query string.
    ///
    /// A single leading `?` is ignored. Unknown parameters are skipped, but a
    /// known parameter that appears twice is rejected.
    pub fn parse(query: &str) -> Result<Self, QueryStringError> {
        let query = query.strip_prefix('?').unwrap_or(query);

        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut description = None;

        for (name, value) in form_urlencoded::parse(query.as_bytes()) {
            let slot = match name.as_ref() {
                "code" => &mut code,
                "state" => &mut state,
                "error" => &mut error,
                "error_description" => &mut description,
                _ => continue,
            };
            if slot.is_some() {
                return Err(QueryStringError::DuplicateParameter {
                    name: name.into_owned(),
                });
            }
            *slot = Some(value.into_owned());
        }

        match (code, error) {
            (_, Some(error)) => Ok(Self::Error {
                error,
                description,
                state,
            }),
            (Some(code), None) => Ok(Self::Code { code, state }),
            (None, None) => Err(QueryStringError::MissingCode),
        }
    }

    /// Returns the `state` echoed back by the provider, if any.
    #[must_use]
    pub fn state(&self) -> Option<&str> {
        match self {
            Self::Code { state, .. } | Self::Error { state, .. } => state.as_deref(),
        }
    }
}
