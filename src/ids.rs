//! ULID-backed identifiers for requests and sessions.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Identifier attached to every request context and its tracing span.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct RequestId(pub ulid::Ulid);

impl RequestId {
    #[must_use]
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Reuse an incoming `X-Request-Id` when it is a valid ULID, otherwise mint one.
    #[must_use]
    pub fn from_header_or_new(header_value: Option<&str>) -> Self {
        header_value
            .and_then(|s| s.parse::<RequestId>().ok())
            .unwrap_or_default()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for RequestId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RequestId(ulid::Ulid::from_string(s)?))
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<RequestId>()
            .map_err(|_| serde::de::Error::custom("invalid request id"))
    }
}

/// Session identifiers are opaque ULID strings carried in the session cookie.
///
/// Anything that does not parse as a ULID is treated as absent so a forged
/// cookie cannot pick an arbitrary store key.
#[must_use]
pub fn session_id_from_cookie(value: Option<&str>) -> Option<String> {
    value
        .and_then(|v| ulid::Ulid::from_string(v).ok())
        .map(|id| id.to_string())
}

/// Mint a fresh session identifier.
#[must_use]
pub fn new_session_id() -> String {
    ulid::Ulid::new().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_reuses_valid_header() {
        let original = RequestId::new();
        let parsed = RequestId::from_header_or_new(Some(&original.to_string()));
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_request_id_replaces_garbage_header() {
        let id = RequestId::from_header_or_new(Some("not-a-ulid"));
        assert_eq!(id.to_string().len(), 26);
    }

    #[test]
    fn test_session_id_rejects_forged_values() {
        assert_eq!(session_id_from_cookie(Some("../../etc/passwd")), None);
        assert_eq!(session_id_from_cookie(None), None);
        let fresh = new_session_id();
        assert_eq!(session_id_from_cookie(Some(&fresh)), Some(fresh));
    }
}
