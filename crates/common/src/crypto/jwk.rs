//! Portable key representation
//!
//! Every key that crosses a process boundary (relay payloads, persisted
//! pairing sessions, the transported account key) travels as a JSON Web Key.
//! The field names and encodings match what browser clients export, so a key
//! written by one client imports cleanly into the other.

use std::collections::BTreeMap;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors raised while importing a key from its portable form
#[derive(Debug, thiserror::Error)]
pub enum KeyCodecError {
    #[error("malformed key: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported key type, expected {expected}, got {actual}")]
    KeyType {
        expected: &'static str,
        actual: String,
    },
    #[error("unsupported curve: {0}")]
    Curve(String),
    #[error("missing key parameter: {0}")]
    MissingParameter(&'static str),
    #[error("invalid key parameter: {0}")]
    InvalidParameter(&'static str),
}

/// Operations a key can be granted through the JWK `key_ops` member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyOp {
    Encrypt,
    Decrypt,
    DeriveKey,
}

impl KeyOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyOp::Encrypt => "encrypt",
            KeyOp::Decrypt => "decrypt",
            KeyOp::DeriveKey => "deriveKey",
        }
    }
}

/// A JSON Web Key
///
/// Only the members this crate reads are typed. Anything else (`oth`, vendor
/// extensions) is kept in `extra` so that a key survives a parse/serialize
/// cycle unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_ops: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl FromStr for Jwk {
    type Err = KeyCodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(s)?)
    }
}

impl Jwk {
    /// Accept either a JSON object or a string holding the serialized object
    pub fn from_value(value: Value) -> Result<Self, KeyCodecError> {
        match value {
            Value::String(s) => s.parse(),
            other => Ok(serde_json::from_value(other)?),
        }
    }

    pub fn to_json_string(&self) -> Result<String, KeyCodecError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Look up a string-valued member by its JWK name
    pub fn string_member(&self, name: &str) -> Option<&str> {
        let member = match name {
            "kty" => return Some(self.kty.as_str()),
            "alg" => &self.alg,
            "crv" => &self.crv,
            "d" => &self.d,
            "dp" => &self.dp,
            "dq" => &self.dq,
            "e" => &self.e,
            "k" => &self.k,
            "n" => &self.n,
            "p" => &self.p,
            "q" => &self.q,
            "qi" => &self.qi,
            "use" => &self.key_use,
            "x" => &self.x,
            "y" => &self.y,
            _ => return None,
        };
        member.as_deref()
    }

    /// Whether this key grants `op`. A key without `key_ops` grants everything.
    pub fn permits(&self, op: KeyOp) -> bool {
        match &self.key_ops {
            Some(ops) => ops.iter().any(|o| o == op.as_str()),
            None => true,
        }
    }

    /// Of `wanted`, the operations this key grants
    pub(crate) fn granted(&self, wanted: &[KeyOp]) -> Vec<KeyOp> {
        wanted.iter().copied().filter(|op| self.permits(*op)).collect()
    }

    pub(crate) fn expect_kty(&self, expected: &'static str) -> Result<(), KeyCodecError> {
        if self.kty != expected {
            return Err(KeyCodecError::KeyType {
                expected,
                actual: self.kty.clone(),
            });
        }
        Ok(())
    }

    /// Decode a base64url member into exactly `len` bytes
    pub(crate) fn decode_member(
        value: Option<&str>,
        name: &'static str,
        len: usize,
    ) -> Result<Vec<u8>, KeyCodecError> {
        let value = value.ok_or(KeyCodecError::MissingParameter(name))?;
        let bytes = URL_SAFE_NO_PAD
            .decode(value.trim_end_matches('='))
            .map_err(|_| KeyCodecError::InvalidParameter(name))?;
        if bytes.len() != len {
            return Err(KeyCodecError::InvalidParameter(name));
        }
        Ok(bytes)
    }

    pub(crate) fn encode_member(bytes: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(bytes)
    }

    pub(crate) fn ops_to_strings(ops: &[KeyOp]) -> Vec<String> {
        ops.iter().map(|op| op.as_str().to_string()).collect()
    }
}
