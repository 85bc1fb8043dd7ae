//! The immutable token value object and its payload.

use serde::{Deserialize, Serialize};

use crate::token::error::TokenError;
use crate::token::time_utils::{current_timestamp, remaining_seconds};

/// Caller data carried inside a token.
///
/// A payload is either a single string or an ordered list of strings. On
/// the wire every payload becomes a sequence of fields; decoding collapses a
/// single field back into [`Payload::Scalar`].
///
/// # Example
///
/// ```rust
/// use token_auth::Payload;
///
/// let email = Payload::from("user@example.com");
/// assert_eq!(email.as_scalar(), Some("user@example.com"));
///
/// let pair = Payload::from(vec!["42", "admin"]);
/// assert_eq!(pair.fields(), vec!["42", "admin"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// A single string value.
    Scalar(String),
    /// An ordered list of string values.
    Sequence(Vec<String>),
}

impl Payload {
    /// Returns the payload as record fields, in order.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Self::Scalar(value) => vec![value.as_str()],
            Self::Sequence(values) => values.iter().map(String::as_str).collect(),
        }
    }

    /// Rebuilds a payload from decoded record fields.
    ///
    /// Exactly one field collapses to a scalar, anything else stays a sequence.
    pub fn from_fields(mut fields: Vec<String>) -> Self {
        if fields.len() == 1 {
            if let Some(value) = fields.pop() {
                return Self::Scalar(value);
            }
        }
        Self::Sequence(fields)
    }

    /// Returns the scalar value, if this payload is a scalar.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(value) => Some(value),
            Self::Sequence(_) => None,
        }
    }

    /// Rejects payloads containing the record delimiter.
    pub(crate) fn ensure_encodable(&self, delimiter: char) -> Result<(), TokenError> {
        match self.fields().into_iter().find(|f| f.contains(delimiter)) {
            Some(field) => Err(TokenError::InvalidPayload(format!(
                "field {field:?} contains the '{delimiter}' delimiter"
            ))),
            None => Ok(()),
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::Scalar(String::new())
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<String>> for Payload {
    fn from(values: Vec<String>) -> Self {
        Self::Sequence(values)
    }
}

impl From<Vec<&str>> for Payload {
    fn from(values: Vec<&str>) -> Self {
        Self::Sequence(values.into_iter().map(str::to_string).collect())
    }
}

/// An issued or validated token.
///
/// Every issuance and validation call returns a fresh `Token`; it is never
/// mutated afterwards. The absolute expiry is fixed at issuance and the
/// remaining lifetime is always derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    id: u64,
    #[serde(rename = "type")]
    token_type: String,
    owner: u64,
    ttl: u64,
    expire_at: u64,
    token: String,
    payload: Payload,
}

impl Token {
    pub(crate) fn new(
        id: u64,
        token_type: impl Into<String>,
        owner: u64,
        ttl: u64,
        expire_at: u64,
        token: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            id,
            token_type: token_type.into(),
            owner,
            ttl,
            expire_at,
            token: token.into(),
            payload,
        }
    }

    /// Unique allocation id, or the issuance timestamp for hash tokens.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Caller-defined category.
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Caller-defined subject reference.
    ///
    /// Always `0` on validated tokens: the owner is not embedded in the
    /// encrypted record.
    pub fn owner(&self) -> u64 {
        self.owner
    }

    /// Lifetime in seconds. Nominal TTL at issuance, remaining TTL at validation.
    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    /// Absolute expiry in seconds since the Unix epoch.
    pub fn expire_at(&self) -> u64 {
        self.expire_at
    }

    /// The opaque, transportable encoding.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Consumes the token and returns its payload.
    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Seconds left at `now`, never negative.
    pub fn remaining_ttl_at(&self, now: u64) -> u64 {
        remaining_seconds(self.expire_at, now)
    }

    /// Seconds left according to the system clock, never negative.
    pub fn remaining_ttl(&self) -> u64 {
        current_timestamp()
            .map(|now| self.remaining_ttl_at(now))
            .unwrap_or(0)
    }

    /// Builds the response body handed to clients.
    pub fn to_response(&self) -> TokenResponse {
        self.to_response_at(current_timestamp().unwrap_or(u64::MAX))
    }

    /// Like [`Token::to_response`], with `expire_in` computed at `now`.
    pub fn to_response_at(&self, now: u64) -> TokenResponse {
        TokenResponse {
            ttl: self.ttl,
            token: self.token.clone(),
            expire_in: self.remaining_ttl_at(now),
        }
    }
}

/// Client-facing view of a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Lifetime in seconds the token was issued with.
    pub ttl: u64,
    /// The opaque token string.
    pub token: String,
    /// Seconds left until expiry.
    pub expire_in: u64,
}
