use serde::{Deserialize, Serialize};

/// Bearer credential pair issued by the identity backend.
///
/// The access token is short-lived and opaque; the refresh token is
/// longer-lived and stable across refresh cycles unless the backend rotates
/// it. A pair is only ever written to a store atomically, except for
/// access-only rotation during refresh which preserves the stored refresh
/// token.
///
/// # Example
/// ```
/// use authflow::token::TokenPair;
///
/// let pair = TokenPair::new("access-abc", "refresh-xyz");
/// assert_eq!(pair.access_token, "access-abc");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}
