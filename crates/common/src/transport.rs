//! Account key transport
//!
//! Once two devices share a channel key, the primary posts the account id
//! and master key encrypted under it, addressed by the pairing access code.
//! The secondary fetches and decrypts it. The relay only ever sees ciphertext.

use serde::{Deserialize, Serialize};

use crate::crypto::{CipherError, Jwk, KeyCodecError, SymmetricKey};
use crate::relay::{Relay, RelayError};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The primary has not published the account key yet
    #[error("account key not yet available")]
    NotYetAvailable,
    #[error("relay error: {0}")]
    Relay(RelayError),
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),
    #[error("transported key is invalid: {0}")]
    Key(#[from] KeyCodecError),
}

impl From<RelayError> for TransportError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::NotFound => TransportError::NotYetAvailable,
            other => TransportError::Relay(other),
        }
    }
}

/// What travels from the primary to the secondary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountAuth {
    pub account_id: String,
    pub key: Jwk,
}

impl AccountAuth {
    pub fn new(account_id: impl Into<String>, master_key: &SymmetricKey) -> Self {
        Self {
            account_id: account_id.into(),
            key: master_key.to_jwk(),
        }
    }

    pub fn master_key(&self) -> Result<SymmetricKey, KeyCodecError> {
        SymmetricKey::from_jwk(&self.key)
    }
}

/// Encrypt `auth` under `channel_key` and post it under `code`
pub async fn publish(
    relay: &dyn Relay,
    code: &str,
    auth: &AccountAuth,
    channel_key: &SymmetricKey,
) -> Result<(), TransportError> {
    let payload = channel_key.encrypt_json(auth)?;
    relay.post_account_auth(code, &payload).await?;
    tracing::debug!(code, "published account auth");
    Ok(())
}

/// Fetch and decrypt the account auth posted under `code`
///
/// # Errors
///
/// `TransportError::NotYetAvailable` while the primary has not published.
pub async fn fetch(
    relay: &dyn Relay,
    code: &str,
    channel_key: &SymmetricKey,
) -> Result<AccountAuth, TransportError> {
    let payload = relay.get_account_auth(code).await?;
    let auth: AccountAuth = channel_key.decrypt_json(&payload)?;
    // make sure the key imports before anyone stores it
    auth.master_key()?;
    Ok(auth)
}
