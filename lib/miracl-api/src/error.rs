//! Error types for the miracl-api crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `MiraclError`: the single error kind surfaced to callers, with a stable
//!   message and an optional underlying cause
//! - `QueryStringError`: callback query-string parse failures, carried as the
//!   cause of a `MiraclError`

use rootcause::Report;
use std::fmt;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T> = std::result::Result<T, Report<MiraclError>>;

/// Boxed underlying failure attached to a `MiraclError`.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Stable taxonomy of hard failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Client credentials, redirect URI or issuer URL are unusable.
    Configuration,
    /// Provider metadata could not be fetched at construction.
    Discovery,
    /// Callback query string is not an authorization response.
    QueryStringParse,
    /// Callback `state` does not match the session.
    StateMismatch,
    /// Callback carries no `state` and the client requires one.
    MissingState,
    /// Authorization code could not be exchanged for a token.
    AccessTokenRequest,
    /// ID token signature, audience or nonce check failed.
    IdTokenValidation,
    /// Userinfo endpoint could not be reached.
    UserInfoRequest,
    /// Userinfo endpoint answered with a body that is not a claims object.
    CorruptedResponse,
}

impl ErrorKind {
    /// Returns the caller-facing message for this kind.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Configuration => "Invalid client configuration",
            Self::Discovery => "Provider discovery failed",
            Self::QueryStringParse => "Query string parse failed",
            Self::StateMismatch => "Session state differs from response state",
            Self::MissingState => "Query string does not have state",
            Self::AccessTokenRequest => "Access token request failed",
            Self::IdTokenValidation => "ID token validation failed",
            Self::UserInfoRequest => "User info request failed",
            Self::CorruptedResponse => "Corrupted response",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Error raised by every failing `MiraclClient` operation.
///
/// The display form is always the stable message of its [`ErrorKind`]; the
/// underlying cause, if any, is reachable through
/// [`std::error::Error::source`].
#[derive(Debug)]
pub struct MiraclError {
    kind: ErrorKind,
    cause: Option<Cause>,
}

impl MiraclError {
    /// Creates an error without an underlying cause.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, cause: None }
    }

    /// Creates an error wrapping the failure that triggered it.
    #[must_use]
    pub fn with_cause(kind: ErrorKind, cause: impl Into<Cause>) -> Self {
        Self {
            kind,
            cause: Some(cause.into()),
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the stable caller-facing message.
    #[must_use]
    pub fn message(&self) -> &'static str {
        self.kind.message()
    }

    /// Returns the underlying cause, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Logs the error at error severity and wraps it in a report.
    pub(crate) fn into_report(self) -> Report<MiraclError> {
        match &self.cause {
            Some(cause) => tracing::error!(kind = ?self.kind, cause = %cause, "{}", self.message()),
            None => tracing::error!(kind = ?self.kind, "{}", self.message()),
        }
        self.into()
    }
}

impl fmt::Display for MiraclError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for MiraclError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl From<ErrorKind> for MiraclError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Errors from parsing an authorization callback query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStringError {
    /// Neither an authorization code nor a provider error was returned.
    MissingCode,
    /// A response parameter appeared more than once.
    DuplicateParameter { name: String },
}

impl fmt::Display for QueryStringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCode => {
                write!(f, "response carries neither 'code' nor 'error'")
            }
            Self::DuplicateParameter { name } => {
                write!(f, "parameter '{name}' appears more than once")
            }
        }
    }
}

impl std::error::Error for QueryStringError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn display_is_the_stable_message() {
        let err = MiraclError::with_cause(
            ErrorKind::QueryStringParse,
            QueryStringError::MissingCode,
        );
        assert_eq!(err.to_string(), "Query string parse failed");
        assert_eq!(err.kind(), ErrorKind::QueryStringParse);
    }

    #[test]
    fn cause_is_exposed_as_source() {
        let err = MiraclError::with_cause(
            ErrorKind::QueryStringParse,
            QueryStringError::DuplicateParameter {
                name: "state".to_string(),
            },
        );
        let source = err.source().expect("source");
        assert!(source.to_string().contains("'state'"));
        assert!(err.cause().is_some());
    }

    #[test]
    fn error_without_cause_has_no_source() {
        let err = MiraclError::from(ErrorKind::StateMismatch);
        assert!(err.source().is_none());
        assert_eq!(
            err.message(),
            "Session state differs from response state"
        );
    }

    #[test]
    fn string_causes_are_accepted() {
        let err = MiraclError::with_cause(
            ErrorKind::UserInfoRequest,
            "provider does not advertise a userinfo endpoint",
        );
        assert!(
            err.source()
                .expect("source")
                .to_string()
                .contains("userinfo endpoint")
        );
    }

    #[test]
    fn report_keeps_the_message() {
        let report = MiraclError::new(ErrorKind::MissingState).into_report();
        assert!(report.to_string().contains("Query string does not have state"));
    }
}
