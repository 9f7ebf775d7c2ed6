//! Account identity and the account master key on this device

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crypto::{Jwk, KeyCodecError, SymmetricKey};
use crate::relay::{Relay, RelayError};
use crate::settings::{SettingsError, SettingsStore};

pub const ACCOUNT_PREFIX: &str = "account";
pub const ACCOUNT_ID: &str = "accountId";
pub const ACCOUNT_DEVICE_ID: &str = "accountDeviceId";
pub const ACCOUNT_TOKEN: &str = "accountToken";
pub const ACCOUNT_CRYPTO_KEY: &str = "accountCryptoKey";

const ACCOUNT_KEYS: [&str; 4] = [
    ACCOUNT_ID,
    ACCOUNT_DEVICE_ID,
    ACCOUNT_TOKEN,
    ACCOUNT_CRYPTO_KEY,
];

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("this device already belongs to account {0}")]
    AlreadyRegistered(String),
    #[error("stored account is incomplete, missing {0}")]
    Incomplete(&'static str),
    #[error("stored account key is invalid: {0}")]
    Key(#[from] KeyCodecError),
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
}

/// A device registration as returned by the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub device_id: String,
    pub token: String,
}

/// Read the account this device belongs to, if any
pub async fn load_account(
    store: &dyn SettingsStore,
) -> Result<Option<(Account, SymmetricKey)>, AccountError> {
    let mut values = store.get(&ACCOUNT_KEYS).await?;
    if values.is_empty() {
        return Ok(None);
    }

    let mut take = |key: &'static str| values.remove(key).ok_or(AccountError::Incomplete(key));
    let account = Account {
        id: take(ACCOUNT_ID)?,
        device_id: take(ACCOUNT_DEVICE_ID)?,
        token: take(ACCOUNT_TOKEN)?,
    };
    let jwk: Jwk = take(ACCOUNT_CRYPTO_KEY)?.parse()?;
    let key = SymmetricKey::from_jwk(&jwk)?;

    Ok(Some((account, key)))
}

/// Persist an account and its master key in one write
pub async fn save_account(
    store: &dyn SettingsStore,
    account: &Account,
    key: &SymmetricKey,
) -> Result<(), AccountError> {
    let values = BTreeMap::from([
        (ACCOUNT_ID.to_string(), account.id.clone()),
        (ACCOUNT_DEVICE_ID.to_string(), account.device_id.clone()),
        (ACCOUNT_TOKEN.to_string(), account.token.clone()),
        (ACCOUNT_CRYPTO_KEY.to_string(), key.to_jwk().to_json_string()?),
    ]);
    store.set(values).await?;
    Ok(())
}

pub async fn reset_account(store: &dyn SettingsStore) -> Result<(), AccountError> {
    store.remove_prefix(ACCOUNT_PREFIX).await?;
    Ok(())
}

/// Start a brand new account with this device as its first member
///
/// The master key is generated here, once, and only ever copied to other
/// devices afterwards.
pub async fn create_account(
    relay: &dyn Relay,
    store: &dyn SettingsStore,
    device_name: &str,
) -> Result<(Account, SymmetricKey), AccountError> {
    if let Some((existing, _)) = load_account(store).await? {
        return Err(AccountError::AlreadyRegistered(existing.id));
    }

    let key = SymmetricKey::generate();
    let account = relay.register_device(device_name, None).await?;
    save_account(store, &account, &key).await?;

    tracing::info!(account_id = %account.id, "created account");
    Ok((account, key))
}
