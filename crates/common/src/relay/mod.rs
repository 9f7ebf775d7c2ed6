use async_trait::async_trait;

use crate::account::Account;
use crate::crypto::{EncryptedPayload, KeyPayload};

mod memory;

pub use memory::MemoryRelay;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Nothing is stored under the requested access code yet, or the code
    ///  expired. Pairing treats this as "try again later".
    #[error("not found")]
    NotFound,
    #[error("relay error: {0}")]
    Default(#[from] anyhow::Error),
}

impl RelayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RelayError::NotFound)
    }
}

/// The untrusted server both devices talk through during pairing
///
/// The relay only ever stores opaque blobs addressed by access code, and is
/// responsible for expiring codes nobody claims.
#[async_trait]
pub trait Relay: Send + Sync + std::fmt::Debug {
    /// Publish the primary's payload and get a short access code bound to it
    async fn request_access_code(&self, payload: &KeyPayload) -> Result<String, RelayError>;

    /// Publish the secondary's payload under `code`, receiving the primary's
    ///  payload in the same call
    async fn exchange_link_key(
        &self,
        code: &str,
        payload: &KeyPayload,
    ) -> Result<KeyPayload, RelayError>;

    /// Fetch the secondary's payload. `NotFound` until the secondary exchanged.
    async fn fetch_link_key(&self, code: &str) -> Result<KeyPayload, RelayError>;

    async fn post_account_auth(
        &self,
        code: &str,
        auth: &EncryptedPayload,
    ) -> Result<(), RelayError>;

    /// `NotFound` until the primary posted
    async fn get_account_auth(&self, code: &str) -> Result<EncryptedPayload, RelayError>;

    /// Register this device. Without `account_id` a new account is created.
    async fn register_device(
        &self,
        device_name: &str,
        account_id: Option<&str>,
    ) -> Result<Account, RelayError>;
}
