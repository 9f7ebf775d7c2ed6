use std::collections::BTreeMap;

use async_trait::async_trait;

mod memory;

pub use memory::MemorySettings;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings store error: {0}")]
    Internal(String),
    #[error("settings store error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Flat string key-value storage local to this device
///
/// Values are plain strings; keys are stored as JWK JSON strings. A single
/// `set` call is all-or-nothing, which is what keeps a pairing step from
/// leaving half of its fields behind.
#[async_trait]
pub trait SettingsStore: Send + Sync + std::fmt::Debug {
    /// Read the requested keys. Missing keys are absent from the result.
    async fn get(&self, keys: &[&str]) -> Result<BTreeMap<String, String>, SettingsError>;

    /// Write every entry of `values` as one unit
    async fn set(&self, values: BTreeMap<String, String>) -> Result<(), SettingsError>;

    /// Write `values` only while `key` still holds `expected`
    ///
    /// The comparison and the write happen under one lock. Returns `false`,
    /// writing nothing, when the stored value differs or is missing.
    async fn set_if(
        &self,
        key: &str,
        expected: &str,
        values: BTreeMap<String, String>,
    ) -> Result<bool, SettingsError>;

    async fn remove(&self, keys: &[String]) -> Result<(), SettingsError>;

    async fn keys(&self) -> Result<Vec<String>, SettingsError>;

    /// Remove every key starting with `prefix`
    async fn remove_prefix(&self, prefix: &str) -> Result<(), SettingsError> {
        let doomed: Vec<String> = self
            .keys()
            .await?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect();
        if doomed.is_empty() {
            return Ok(());
        }
        self.remove(&doomed).await
    }
}
