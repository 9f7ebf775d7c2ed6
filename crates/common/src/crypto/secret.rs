//! Payload encryption using AES-256-GCM
//!
//! A `SymmetricKey` is either the account master key (generated once per
//! account) or a pairing channel key (derived through ECDH). Both encrypt
//! JSON values into an `EncryptedPayload`, the wire form the relay stores.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand_core::CryptoRngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::jwk::{Jwk, KeyCodecError, KeyOp};

/// Size of AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;
/// Size of AES-256 key in bytes
pub const SECRET_SIZE: usize = 32;
/// JWK `alg` value for AES-256-GCM keys
pub const JWK_ALG: &str = "A256GCM";

const SYMMETRIC_OPS: [KeyOp; 2] = [KeyOp::Encrypt, KeyOp::Decrypt];

/// Errors that can occur during encryption/decryption
///
/// `Decrypt` carries no detail: a wrong key, a flipped bit and a
/// truncated blob all look the same to the caller.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed")]
    Decrypt,
    #[error("payload serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("decrypted payload has unexpected shape: {0}")]
    Deserialize(#[source] serde_json::Error),
    #[error("key is not permitted to {0}")]
    KeyUsage(&'static str),
}

/// One authenticated-encryption result, as carried over the wire
///
/// Both fields are standard base64 with padding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub ciphertext: String,
    pub nonce: String,
}

/// A 256-bit AES-GCM key
///
/// Key bytes are wiped on drop. The set of permitted operations comes from
/// the key's `key_ops` when it was imported, and is checked at use time.
#[derive(Clone)]
pub struct SymmetricKey {
    bytes: Zeroizing<[u8; SECRET_SIZE]>,
    ops: Vec<KeyOp>,
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("ops", &self.ops)
            .finish_non_exhaustive()
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        *self.bytes == *other.bytes
    }
}

impl Eq for SymmetricKey {}

impl From<[u8; SECRET_SIZE]> for SymmetricKey {
    fn from(bytes: [u8; SECRET_SIZE]) -> Self {
        Self {
            bytes: Zeroizing::new(bytes),
            ops: SYMMETRIC_OPS.to_vec(),
        }
    }
}

impl SymmetricKey {
    /// Generate a new random key using the operating system RNG
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    pub fn generate_with(rng: &mut impl CryptoRngCore) -> Self {
        let mut bytes = Zeroizing::new([0u8; SECRET_SIZE]);
        rng.fill_bytes(&mut bytes[..]);
        Self::from(*bytes)
    }

    /// Create a key from a byte slice
    ///
    /// # Errors
    ///
    /// Returns an error if the slice length is not exactly `SECRET_SIZE` bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, KeyCodecError> {
        let bytes: [u8; SECRET_SIZE] = data
            .try_into()
            .map_err(|_| KeyCodecError::InvalidParameter("k"))?;
        Ok(Self::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_SIZE] {
        &self.bytes
    }

    pub fn permits(&self, op: KeyOp) -> bool {
        self.ops.contains(&op)
    }

    /// Export to `{kty:"oct", k, alg:"A256GCM", ext:true, key_ops}`
    pub fn to_jwk(&self) -> Jwk {
        Jwk {
            kty: "oct".to_string(),
            k: Some(Jwk::encode_member(self.as_bytes())),
            alg: Some(JWK_ALG.to_string()),
            ext: Some(true),
            key_ops: Some(Jwk::ops_to_strings(&self.ops)),
            ..Default::default()
        }
    }

    /// Import from a JWK
    ///
    /// Structural problems fail here. An `alg` naming some other algorithm
    /// does not: the key imports with no permitted operations and fails when
    /// it is first used.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, KeyCodecError> {
        jwk.expect_kty("oct")?;
        let k = Jwk::decode_member(jwk.k.as_deref(), "k", SECRET_SIZE)?;
        let mut key = Self::from_slice(&k)?;
        key.ops = match jwk.alg.as_deref() {
            Some(alg) if alg != JWK_ALG => Vec::new(),
            _ => jwk.granted(&SYMMETRIC_OPS),
        };
        Ok(key)
    }

    /// Serialize `value` to JSON and seal it under a fresh random nonce
    pub fn encrypt_json<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<EncryptedPayload, CipherError> {
        self.encrypt_json_with(&mut OsRng, value)
    }

    pub fn encrypt_json_with<T: Serialize + ?Sized>(
        &self,
        rng: &mut impl CryptoRngCore,
        value: &T,
    ) -> Result<EncryptedPayload, CipherError> {
        let plaintext = Zeroizing::new(serde_json::to_vec(value).map_err(CipherError::Serialize)?);
        self.seal_with(rng, &plaintext)
    }

    /// Open `payload` and parse the plaintext as JSON
    pub fn decrypt_json<T: DeserializeOwned>(
        &self,
        payload: &EncryptedPayload,
    ) -> Result<T, CipherError> {
        let plaintext = Zeroizing::new(self.open(payload)?);
        serde_json::from_slice(&plaintext).map_err(CipherError::Deserialize)
    }

    /// Encrypt raw bytes
    ///
    /// The output carries the nonce separately from `ciphertext || tag`.
    pub fn seal_with(
        &self,
        rng: &mut impl CryptoRngCore,
        plaintext: &[u8],
    ) -> Result<EncryptedPayload, CipherError> {
        if !self.permits(KeyOp::Encrypt) {
            return Err(CipherError::KeyUsage(KeyOp::Encrypt.as_str()));
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher()
            .encrypt(nonce, plaintext)
            .map_err(|_| CipherError::Encrypt)?;

        Ok(EncryptedPayload {
            ciphertext: STANDARD.encode(ciphertext),
            nonce: STANDARD.encode(nonce_bytes),
        })
    }

    /// Decrypt raw bytes, verifying the authentication tag
    pub fn open(&self, payload: &EncryptedPayload) -> Result<Vec<u8>, CipherError> {
        if !self.permits(KeyOp::Decrypt) {
            return Err(CipherError::KeyUsage(KeyOp::Decrypt.as_str()));
        }

        let nonce_bytes = STANDARD
            .decode(&payload.nonce)
            .map_err(|_| CipherError::Decrypt)?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(CipherError::Decrypt);
        }
        let ciphertext = STANDARD
            .decode(&payload.ciphertext)
            .map_err(|_| CipherError::Decrypt)?;

        self.cipher()
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| CipherError::Decrypt)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.as_bytes()))
    }
}
