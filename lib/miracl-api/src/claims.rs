//! Identity claims returned by the userinfo endpoint.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claim holding the user's email address at MIRACL.
pub const EMAIL_CLAIM: &str = "sub";

/// Claim holding the MIRACL user identifier.
pub const USER_ID_CLAIM: &str = "user_id";

/// Flat claims map as returned by the userinfo endpoint.
///
/// Lookups never fail; a missing claim or a claim of a different JSON type
/// reads as `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    /// Creates an empty claims map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the raw value of a claim.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns a claim if it is a string.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Returns a claim if it is a boolean.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    /// Returns the email claim.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.get_str(EMAIL_CLAIM)
    }

    /// Returns the user id claim.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.get_str(USER_ID_CLAIM)
    }

    /// Returns true if no claims are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the underlying JSON object.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the claims, returning the underlying JSON object.
    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Claims> for Value {
    fn from(claims: Claims) -> Self {
        Value::Object(claims.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> Claims {
        serde_json::from_value(value).expect("claims object")
    }

    #[test]
    fn named_claims_are_extracted() {
        let claims = claims(json!({"sub": "a@b.com", "user_id": "u1", "name": "Alice"}));
        assert_eq!(claims.email(), Some("a@b.com"));
        assert_eq!(claims.user_id(), Some("u1"));
        assert_eq!(claims.get_str("name"), Some("Alice"));
    }

    #[test]
    fn missing_or_mistyped_claims_read_as_none() {
        let claims = claims(json!({"user_id": 42, "email_verified": true}));
        assert_eq!(claims.email(), None);
        assert_eq!(claims.user_id(), None);
        assert_eq!(claims.get_bool("email_verified"), Some(true));
        assert_eq!(claims.get("user_id"), Some(&json!(42)));
    }

    #[test]
    fn non_object_json_is_not_claims() {
        assert!(serde_json::from_value::<Claims>(json!(["sub"])).is_err());
        assert!(serde_json::from_str::<Claims>("\"a@b.com\"").is_err());
    }

    #[test]
    fn empty_claims() {
        assert!(Claims::new().is_empty());
        assert_eq!(Value::from(Claims::new()), json!({}));
    }
}
