use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::crypto::{create_salt, AgreementPublicKey, KeyPayload};
use crate::relay::Relay;
use crate::settings::SettingsStore;

use super::data::{self, ActivationData};
use super::{ActivationError, PairingState, ACTIVATION_PREFIX};

/// Drives pairing sessions against a relay, persisting into a settings store
///
/// Only one session exists per device at a time. Every step that applies a
/// network result first checks that the session it started from still
/// exists, so a `cancel` that lands while a request is in flight wins.
#[derive(Debug)]
pub struct Activator {
    pub(crate) relay: Arc<dyn Relay>,
    pub(crate) store: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    /// Bumped by every cancel or completion on this activator
    generation: AtomicU64,
}

impl Activator {
    pub fn new(relay: Arc<dyn Relay>, store: Arc<dyn SettingsStore>) -> Self {
        Self {
            relay,
            store,
            clock: Arc::new(SystemClock),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Reload the persisted session, if any
    pub async fn resume(&self) -> Result<Option<ActivationData>, ActivationError> {
        ActivationData::load(self.store.as_ref()).await
    }

    pub async fn state(&self) -> Result<PairingState, ActivationError> {
        Ok(self
            .resume()
            .await?
            .map(|data| data.state())
            .unwrap_or(PairingState::Idle))
    }

    /// Abandon the current session
    ///
    /// The in-memory keys are dropped (and wiped) here, and every persisted
    /// `activation*` entry is removed. Cancelling with no session is fine.
    pub async fn cancel(
        &self,
        data: Option<ActivationData>,
    ) -> Result<PairingState, ActivationError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        drop(data);
        self.store.remove_prefix(ACTIVATION_PREFIX).await?;
        tracing::debug!("pairing session cancelled");
        Ok(PairingState::Cancelled)
    }

    /// Close a session that reached its goal
    pub async fn complete(&self, data: ActivationData) -> Result<PairingState, ActivationError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let code = data.access_code().to_string();
        drop(data);
        self.store.remove_prefix(ACTIVATION_PREFIX).await?;
        tracing::debug!(code = %code, "pairing session completed");
        Ok(PairingState::Completed)
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Fail with `Cancelled` if this activator cancelled since `generation`
    pub(crate) fn check_generation(&self, generation: u64) -> Result<(), ActivationError> {
        if self.generation() != generation {
            tracing::warn!("discarding result for a cancelled pairing session");
            return Err(ActivationError::Cancelled);
        }
        Ok(())
    }

    /// Fail with `Cancelled` unless `data`'s session is still the stored one
    ///
    /// Catches cancels issued by another process sharing the same store.
    pub(crate) async fn ensure_current(
        &self,
        data: &ActivationData,
        generation: u64,
    ) -> Result<(), ActivationError> {
        self.check_generation(generation)?;
        let stored = self
            .store
            .get(&[data::ACCESS_CODE])
            .await?
            .remove(data::ACCESS_CODE);
        if stored.as_deref() != Some(data.access_code()) {
            tracing::warn!(code = %data.access_code(), "discarding result for a cancelled pairing session");
            return Err(ActivationError::Cancelled);
        }
        Ok(())
    }

    /// Write the whole session in one `set` call
    pub(crate) async fn persist(&self, data: &ActivationData) -> Result<(), ActivationError> {
        let values = data.to_settings()?;
        self.store.set(values).await?;
        Ok(())
    }

    /// Write `data` over the stored session it continues
    ///
    /// The access-code check and the write are one `set_if`, so a session
    /// removed by another process stays removed.
    pub(crate) async fn persist_current(
        &self,
        data: &ActivationData,
        generation: u64,
    ) -> Result<(), ActivationError> {
        self.check_generation(generation)?;
        let values = data.to_settings()?;
        let written = self
            .store
            .set_if(data::ACCESS_CODE, data.access_code(), values)
            .await?;
        if !written {
            tracing::warn!(code = %data.access_code(), "discarding result for a cancelled pairing session");
            return Err(ActivationError::Cancelled);
        }
        Ok(())
    }

    /// A fresh payload announcing `key`
    pub(crate) fn key_payload(&self, key: &AgreementPublicKey) -> KeyPayload {
        KeyPayload::new(key.to_jwk(), self.clock.now_millis(), create_salt())
    }
}
