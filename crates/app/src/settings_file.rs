use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use common::settings::{SettingsError, SettingsStore};

/// Settings persisted as a single JSON object on disk
///
/// Every write rewrites the whole file through a temp file in the same
/// directory, so a crash leaves either the old or the new map. The lock
/// serializes callers within this process only. Another process can still
/// write between the read and the rename inside [`FileSettings::update`].
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, SettingsError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(&self.path).map_err(anyhow::Error::from)?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        let map = serde_json::from_str(&raw).map_err(|e| {
            SettingsError::Internal(format!("{} is not valid: {}", self.path.display(), e))
        })?;
        Ok(map)
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), SettingsError> {
        let dir = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(anyhow::Error::from)?;

        let json = serde_json::to_vec_pretty(map).map_err(anyhow::Error::from)?;
        let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(anyhow::Error::from)?;
        temp.write_all(&json).map_err(anyhow::Error::from)?;
        temp.as_file().sync_all().map_err(anyhow::Error::from)?;
        temp.persist(&self.path)
            .map_err(|e| anyhow::Error::from(e.error))?;
        Ok(())
    }

    /// Read, apply `f` and write back while holding the lock
    ///
    /// Nothing is written when `f` returns `false`.
    fn update<F>(&self, f: F) -> Result<bool, SettingsError>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool,
    {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| SettingsError::Internal(format!("failed to acquire lock: {}", e)))?;
        let mut map = self.read_map()?;
        if !f(&mut map) {
            return Ok(false);
        }
        self.write_map(&map)?;
        Ok(true)
    }
}

#[async_trait]
impl SettingsStore for FileSettings {
    async fn get(&self, keys: &[&str]) -> Result<BTreeMap<String, String>, SettingsError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| SettingsError::Internal(format!("failed to acquire lock: {}", e)))?;
        let mut map = self.read_map()?;
        Ok(keys
            .iter()
            .filter_map(|key| map.remove(*key).map(|value| (key.to_string(), value)))
            .collect())
    }

    async fn set(&self, values: BTreeMap<String, String>) -> Result<(), SettingsError> {
        self.update(|map| {
            map.extend(values);
            true
        })?;
        Ok(())
    }

    async fn set_if(
        &self,
        key: &str,
        expected: &str,
        values: BTreeMap<String, String>,
    ) -> Result<bool, SettingsError> {
        self.update(|map| {
            if map.get(key).map(String::as_str) != Some(expected) {
                return false;
            }
            map.extend(values);
            true
        })
    }

    async fn remove(&self, keys: &[String]) -> Result<(), SettingsError> {
        self.update(|map| {
            for key in keys {
                map.remove(key);
            }
            true
        })?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, SettingsError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| SettingsError::Internal(format!("failed to acquire lock: {}", e)))?;
        Ok(self.read_map()?.into_keys().collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    fn entries(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let temp = TempDir::new().unwrap();
        let settings = FileSettings::new(temp.path().join("settings.json"));

        assert!(settings.get(&["accountId"]).await.unwrap().is_empty());
        assert!(settings.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("settings.json");

        let settings = FileSettings::new(&path);
        settings
            .set(entries(&[("accountId", "acc-1"), ("accountToken", "tok")]))
            .await
            .unwrap();

        let reopened = FileSettings::new(&path);
        let values = reopened.get(&["accountId", "missing"]).await.unwrap();
        assert_eq!(values, entries(&[("accountId", "acc-1")]));
    }

    #[tokio::test]
    async fn test_remove_prefix() {
        let temp = TempDir::new().unwrap();
        let settings = FileSettings::new(temp.path().join("settings.json"));
        settings
            .set(entries(&[
                ("activationRole", "Primary"),
                ("activationAccessCode", "ABCDEF"),
                ("accountId", "acc-1"),
            ]))
            .await
            .unwrap();

        settings.remove_prefix("activation").await.unwrap();
        assert_eq!(settings.keys().await.unwrap(), vec!["accountId".to_string()]);
    }

    #[tokio::test]
    async fn test_set_if_sees_writes_from_another_handle() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        let ours = FileSettings::new(&path);
        let theirs = FileSettings::new(&path);

        ours.set(entries(&[("activationAccessCode", "ABCDEF")]))
            .await
            .unwrap();
        assert!(ours
            .set_if(
                "activationAccessCode",
                "ABCDEF",
                entries(&[("activationStep", "LinkCode")])
            )
            .await
            .unwrap());

        // another process cancels the session
        theirs.remove_prefix("activation").await.unwrap();

        assert!(!ours
            .set_if(
                "activationAccessCode",
                "ABCDEF",
                entries(&[("activationStep", "AccessCode")])
            )
            .await
            .unwrap());
        assert!(theirs.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let settings = FileSettings::new(&path);
        assert!(matches!(
            settings.get(&["accountId"]).await,
            Err(SettingsError::Internal(_))
        ));
    }
}
