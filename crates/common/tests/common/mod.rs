//! Shared test utilities for pairing integration tests
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::account::{self, Account};
use common::activation::{Activator, ACTIVATION_PREFIX};
use common::clock::FixedClock;
use common::crypto::{EncryptedPayload, KeyPayload, SymmetricKey};
use common::relay::{MemoryRelay, Relay, RelayError};
use common::settings::{MemorySettings, SettingsStore};

/// One simulated device: its activator plus a handle on its local storage
pub struct Device {
    pub activator: Activator,
    pub store: MemorySettings,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A device with empty storage talking to `relay`
pub fn device(relay: Arc<dyn Relay>, now_millis: i64) -> Device {
    init_tracing();
    let store = MemorySettings::new();
    let activator = Activator::new(relay, Arc::new(store.clone()))
        .with_clock(Arc::new(FixedClock::new(now_millis)));
    Device { activator, store }
}

/// A device that already owns an account
pub async fn registered_device(
    relay: &MemoryRelay,
    name: &str,
) -> (Device, Account, SymmetricKey) {
    let device = device(Arc::new(relay.clone()), 1000);
    let (account, key) = account::create_account(relay, &device.store, name)
        .await
        .unwrap();
    (device, account, key)
}

/// Keys of `store` that belong to a pairing session
pub fn activation_keys(store: &MemorySettings) -> Vec<String> {
    store
        .snapshot()
        .unwrap()
        .into_keys()
        .filter(|key| key.starts_with(ACTIVATION_PREFIX))
        .collect()
}

/// A relay that wipes the primary's session while its fetch is in flight,
/// as a user pressing cancel during polling would
///
/// `replacement` entries are written right after the wipe, standing in for
/// a new session started by another process.
#[derive(Debug, Clone)]
pub struct CancellingRelay {
    pub inner: MemoryRelay,
    pub store: MemorySettings,
    pub replacement: BTreeMap<String, String>,
}

#[async_trait]
impl Relay for CancellingRelay {
    async fn request_access_code(&self, payload: &KeyPayload) -> Result<String, RelayError> {
        self.inner.request_access_code(payload).await
    }

    async fn exchange_link_key(
        &self,
        code: &str,
        payload: &KeyPayload,
    ) -> Result<KeyPayload, RelayError> {
        self.inner.exchange_link_key(code, payload).await
    }

    async fn fetch_link_key(&self, code: &str) -> Result<KeyPayload, RelayError> {
        let result = self.inner.fetch_link_key(code).await;
        self.store.remove_prefix(ACTIVATION_PREFIX).await.unwrap();
        if !self.replacement.is_empty() {
            self.store.set(self.replacement.clone()).await.unwrap();
        }
        result
    }

    async fn post_account_auth(
        &self,
        code: &str,
        auth: &EncryptedPayload,
    ) -> Result<(), RelayError> {
        self.inner.post_account_auth(code, auth).await
    }

    async fn get_account_auth(&self, code: &str) -> Result<EncryptedPayload, RelayError> {
        self.inner.get_account_auth(code).await
    }

    async fn register_device(
        &self,
        device_name: &str,
        account_id: Option<&str>,
    ) -> Result<Account, RelayError> {
        self.inner.register_device(device_name, account_id).await
    }
}
