use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{SettingsError, SettingsStore};

/// In-memory settings store
///
/// Clones share the same map, so a test can hand one clone to an `Activator`
/// and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    inner: Arc<RwLock<BTreeMap<String, String>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `set`/`remove` fail without touching the map
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Copy of the whole map
    pub fn snapshot(&self) -> Result<BTreeMap<String, String>, SettingsError> {
        let inner = self.inner.read().map_err(|e| {
            SettingsError::Internal(format!("failed to acquire read lock: {}", e))
        })?;
        Ok(inner.clone())
    }

    fn check_writable(&self) -> Result<(), SettingsError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SettingsError::Internal("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn get(&self, keys: &[&str]) -> Result<BTreeMap<String, String>, SettingsError> {
        let inner = self.inner.read().map_err(|e| {
            SettingsError::Internal(format!("failed to acquire read lock: {}", e))
        })?;

        Ok(keys
            .iter()
            .filter_map(|key| {
                inner
                    .get(*key)
                    .map(|value| (key.to_string(), value.clone()))
            })
            .collect())
    }

    async fn set(&self, values: BTreeMap<String, String>) -> Result<(), SettingsError> {
        self.check_writable()?;
        let mut inner = self.inner.write().map_err(|e| {
            SettingsError::Internal(format!("failed to acquire write lock: {}", e))
        })?;

        inner.extend(values);
        Ok(())
    }

    async fn set_if(
        &self,
        key: &str,
        expected: &str,
        values: BTreeMap<String, String>,
    ) -> Result<bool, SettingsError> {
        self.check_writable()?;
        let mut inner = self.inner.write().map_err(|e| {
            SettingsError::Internal(format!("failed to acquire write lock: {}", e))
        })?;

        if inner.get(key).map(String::as_str) != Some(expected) {
            return Ok(false);
        }
        inner.extend(values);
        Ok(true)
    }

    async fn remove(&self, keys: &[String]) -> Result<(), SettingsError> {
        self.check_writable()?;
        let mut inner = self.inner.write().map_err(|e| {
            SettingsError::Internal(format!("failed to acquire write lock: {}", e))
        })?;

        for key in keys {
            inner.remove(key);
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, SettingsError> {
        let inner = self.inner.read().map_err(|e| {
            SettingsError::Internal(format!("failed to acquire read lock: {}", e))
        })?;
        Ok(inner.keys().cloned().collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn entries(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = MemorySettings::new();
        store
            .set(entries(&[("accountId", "a"), ("accountToken", "t")]))
            .await
            .unwrap();

        let got = store.get(&["accountId", "missing"]).await.unwrap();
        assert_eq!(got, entries(&[("accountId", "a")]));

        store.remove(&["accountId".to_string()]).await.unwrap();
        assert_eq!(store.keys().await.unwrap(), vec!["accountToken".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_prefix() {
        let store = MemorySettings::new();
        store
            .set(entries(&[
                ("activationStep", "accessCode"),
                ("activationAccessCode", "ABCDEF"),
                ("accountId", "a"),
            ]))
            .await
            .unwrap();

        store.remove_prefix("activation").await.unwrap();
        assert_eq!(store.keys().await.unwrap(), vec!["accountId".to_string()]);

        // nothing left to remove is fine
        store.remove_prefix("activation").await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_writes_leave_store_untouched() {
        let store = MemorySettings::new();
        store.set(entries(&[("a", "1")])).await.unwrap();

        store.fail_writes(true);
        assert!(store.set(entries(&[("a", "2"), ("b", "3")])).await.is_err());
        assert!(store.remove(&["a".to_string()]).await.is_err());
        assert_eq!(store.snapshot().unwrap(), entries(&[("a", "1")]));

        store.fail_writes(false);
        store.set(entries(&[("b", "3")])).await.unwrap();
        assert_eq!(store.snapshot().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_set_if_compares_before_writing() {
        let store = MemorySettings::new();
        store.set(entries(&[("code", "ABCDEF")])).await.unwrap();

        let written = store
            .set_if("code", "ABCDEF", entries(&[("step", "LinkCode")]))
            .await
            .unwrap();
        assert!(written);

        let written = store
            .set_if("code", "ZZZZZZ", entries(&[("step", "AccessCode")]))
            .await
            .unwrap();
        assert!(!written);
        assert!(!store
            .set_if("missing", "x", entries(&[("other", "1")]))
            .await
            .unwrap());

        assert_eq!(
            store.snapshot().unwrap(),
            entries(&[("code", "ABCDEF"), ("step", "LinkCode")])
        );
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemorySettings::new();
        let other = store.clone();
        store.set(entries(&[("k", "v")])).await.unwrap();
        assert_eq!(other.get(&["k"]).await.unwrap().len(), 1);
    }
}
