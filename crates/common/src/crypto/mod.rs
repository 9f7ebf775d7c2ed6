//! Cryptographic primitives for CacheNut pairing
//!
//! This module provides everything the pairing protocol needs:
//!
//! - **Key Codec**: every key exports to and imports from a JSON Web Key ([`Jwk`])
//! - **Payload Cipher**: AES-256-GCM encryption of JSON values ([`SymmetricKey`])
//! - **Key Agreement**: ephemeral P-256 ECDH ([`KeyPair`], [`derive_shared_key`])
//! - **Pairing Hash**: payload fingerprints and link codes ([`compute_hash`], [`link_code`])
//!
//! # Security Model
//!
//! ## Account Key
//! Each account owns one randomly generated `SymmetricKey`. Every clipboard
//! item is encrypted under it before it reaches the relay.
//!
//! ## Pairing
//! To bring a new device into the account:
//! 1. Both devices generate an ephemeral P-256 key pair
//! 2. Public keys are exchanged through the relay as salted, timestamped `KeyPayload`s
//! 3. Each side derives the channel key with ECDH
//! 4. The user compares the link code computed from both payload hashes
//! 5. The account key travels to the new device encrypted under the channel key
//!
//! The relay never sees a private key or the channel key. A relay that swaps
//! public keys produces different link codes on the two screens.

mod agreement;
mod jwk;
mod pairing_hash;
mod secret;

pub use agreement::{
    derive_shared_key, AgreementError, AgreementPrivateKey, AgreementPublicKey, KeyPair,
};
pub use jwk::{Jwk, KeyCodecError, KeyOp};
pub use pairing_hash::{
    compute_hash, create_salt, create_salt_with, derive_short_code, link_code, short_code,
    KeyPayload, HASHED_JWK_FIELDS, SALT_LENGTH, SHORT_CODE_LENGTH,
};
pub use secret::{CipherError, EncryptedPayload, SymmetricKey, NONCE_SIZE, SECRET_SIZE};

/// Any failure raised by the primitives in this module
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key codec error: {0}")]
    Codec(#[from] KeyCodecError),
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),
    #[error("key agreement error: {0}")]
    Agreement(#[from] AgreementError),
}
