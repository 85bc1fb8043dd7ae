//! URL-safe encoding and the plaintext record format.
//!
//! A record is the `|`-joined list
//! `payload_1|...|payload_n|id|type|expire_at`. It is encrypted as a whole;
//! the trailing three fields are always read back from the end so the
//! payload may have any arity.

use crate::TokenError;
use crate::token::value::Payload;

/// Separator between record fields. Never escaped.
pub const DELIMITER: char = '|';

/// Converts standard base64 text to the URL-safe alphabet without padding.
pub fn encode_url_safe(base64: &str) -> String {
    base64
        .chars()
        .filter(|c| *c != '=')
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect()
}

/// Converts URL-safe text back to standard base64, restoring padding.
pub fn decode_url_safe(encoded: &str) -> String {
    let padding = (4 - encoded.len() % 4) % 4;
    let mut out = String::with_capacity(encoded.len() + padding);
    out.extend(encoded.chars().map(|c| match c {
        '-' => '+',
        '_' => '/',
        other => other,
    }));
    out.extend(std::iter::repeat_n('=', padding));
    out
}

/// A decoded plaintext record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Record {
    pub fields: Vec<String>,
    pub id: u64,
    pub token_type: String,
    pub expire_at: u64,
}

impl Record {
    /// Joins payload, id, type and expiry into the plaintext record.
    pub fn format(payload: &Payload, id: u64, token_type: &str, expire_at: u64) -> String {
        let id = id.to_string();
        let expire_at = expire_at.to_string();
        let mut fields = payload.fields();
        fields.extend([id.as_str(), token_type, expire_at.as_str()]);
        fields.join(&DELIMITER.to_string())
    }

    /// Splits a decrypted record, popping `expire_at`, `type` and `id` from the end.
    pub fn parse(plaintext: &str) -> Result<Self, TokenError> {
        let mut fields: Vec<String> = plaintext.split(DELIMITER).map(str::to_string).collect();

        let expire_at = fields
            .pop()
            .and_then(|f| f.parse::<u64>().ok())
            .ok_or_else(|| TokenError::malformed("invalid expiry"))?;
        let token_type = fields
            .pop()
            .ok_or_else(|| TokenError::malformed("missing type"))?;
        let id = fields
            .pop()
            .and_then(|f| f.parse::<u64>().ok())
            .ok_or_else(|| TokenError::malformed("invalid id"))?;

        Ok(Self {
            fields,
            id,
            token_type,
            expire_at,
        })
    }

    pub fn into_payload(self) -> Payload {
        Payload::from_fields(self.fields)
    }
}
