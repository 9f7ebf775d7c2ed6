//! Pairing fingerprints and human-comparable link codes
//!
//! Both devices hash the two published key payloads and show the user a link
//! code built from the two hashes. The code is only equal on both screens when
//! both devices saw the same two payloads.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::jwk::Jwk;

/// Length of a payload salt in characters
pub const SALT_LENGTH: usize = 22;
/// Default length of a short code in characters
pub const SHORT_CODE_LENGTH: usize = 8;

/// The JWK members that feed the hash, in hashing order
///
/// Members outside this list (`ext`, `key_ops`, `oth`, extensions) never
/// affect the hash.
pub const HASHED_JWK_FIELDS: [&str; 15] = [
    "alg", "crv", "d", "dp", "dq", "e", "k", "kty", "n", "p", "q", "qi", "use", "x", "y",
];

/// A key plus the metadata published alongside it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPayload {
    pub key: Jwk,
    pub ts: i64,
    pub salt: String,
}

impl KeyPayload {
    pub fn new(key: Jwk, ts: i64, salt: impl Into<String>) -> Self {
        Self {
            key,
            ts,
            salt: salt.into(),
        }
    }

    pub fn hash(&self) -> String {
        compute_hash(self)
    }
}

/// Fresh random salt for a key payload
pub fn create_salt() -> String {
    create_salt_with(&mut OsRng)
}

pub fn create_salt_with(rng: &mut impl CryptoRngCore) -> String {
    let mut bytes = [0u8; SALT_LENGTH];
    rng.fill_bytes(&mut bytes);
    let mut salt = STANDARD.encode(bytes);
    salt.truncate(SALT_LENGTH);
    salt
}

/// Fingerprint a payload as `<HEX>_<ts>`
///
/// Digest bytes are rendered as uppercase hex *without* zero padding, so
/// `0x0A` contributes a single `A`. Existing clients render it this way and
/// the link codes must agree with theirs.
pub fn compute_hash(payload: &KeyPayload) -> String {
    let mut material = String::new();
    for field in HASHED_JWK_FIELDS {
        material.push_str(payload.key.string_member(field).unwrap_or_default());
    }
    material.push_str(&payload.ts.to_string());
    material.push_str(&payload.salt);

    let digest = Sha256::digest(material.as_bytes());
    format!("{}_{}", render_hex(&digest), payload.ts)
}

fn render_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:X}", b)).collect()
}

/// Pick a window of `length` characters out of a hash's hex part
///
/// The window starts at `ts mod (hex_len - length)`. A length of zero means
/// the default. When the hex part is no longer than the window, or the hash
/// is not shaped `<HEX>_<ts>`, the whole hash comes back unchanged.
pub fn derive_short_code(hash: &str, length: usize) -> String {
    let length = if length == 0 { SHORT_CODE_LENGTH } else { length };

    let parts: Vec<&str> = hash.split('_').collect();
    let [hex, ts] = parts.as_slice() else {
        return hash.to_string();
    };
    let Ok(ts) = ts.parse::<i64>() else {
        return hash.to_string();
    };
    if hex.len() <= length {
        return hash.to_string();
    }

    let modulo = (hex.len() - length) as i64;
    let start = ts.rem_euclid(modulo) as usize;
    hex.get(start..start + length)
        .map(str::to_string)
        .unwrap_or_else(|| hash.to_string())
}

/// Short code with the default length
pub fn short_code(hash: &str) -> String {
    derive_short_code(hash, SHORT_CODE_LENGTH)
}

/// The full verification code: short code of the first hash, then the second
pub fn link_code(first_hash: &str, second_hash: &str) -> String {
    format!("{}{}", short_code(first_hash), short_code(second_hash))
}
