use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

use super::{Relay, RelayError};
use crate::account::Account;
use crate::crypto::{EncryptedPayload, KeyPayload};

const ACCESS_CODE_LENGTH: usize = 6;

/// In-memory relay that both sides of a test pairing can share
#[derive(Debug, Clone, Default)]
pub struct MemoryRelay {
    inner: Arc<RwLock<MemoryRelayInner>>,
}

#[derive(Debug, Default)]
struct MemoryRelayInner {
    /// Codes handed out before falling back to random ones
    preset_codes: VecDeque<String>,
    /// access code -> pairing session
    sessions: HashMap<String, RelaySession>,
    /// account id -> registered devices
    accounts: HashMap<String, Vec<DeviceRecord>>,
}

#[derive(Debug)]
struct RelaySession {
    primary: KeyPayload,
    secondary: Option<KeyPayload>,
    account_auth: Option<EncryptedPayload>,
}

#[derive(Debug, Clone)]
struct DeviceRecord {
    id: String,
    name: String,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// A relay that issues `codes` in order before generating random ones
    pub fn with_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let relay = Self::new();
        if let Ok(mut inner) = relay.inner.write() {
            inner.preset_codes = codes.into_iter().map(Into::into).collect();
        }
        relay
    }

    /// Drop everything stored under `code`, as the server does on expiry
    pub fn expire(&self, code: &str) -> Result<(), RelayError> {
        self.write()?.sessions.remove(code);
        Ok(())
    }

    /// Names of the devices registered to `account_id`
    pub fn device_names(&self, account_id: &str) -> Result<Vec<String>, RelayError> {
        let inner = self.read()?;
        Ok(inner
            .accounts
            .get(account_id)
            .map(|devices| devices.iter().map(|d| d.name.clone()).collect())
            .unwrap_or_default())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryRelayInner>, RelayError> {
        self.inner
            .read()
            .map_err(|e| anyhow::anyhow!("failed to acquire read lock: {}", e).into())
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryRelayInner>, RelayError> {
        self.inner
            .write()
            .map_err(|e| anyhow::anyhow!("failed to acquire write lock: {}", e).into())
    }
}

fn random_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ACCESS_CODE_LENGTH)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect()
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn request_access_code(&self, payload: &KeyPayload) -> Result<String, RelayError> {
        let mut inner = self.write()?;

        let code = loop {
            let candidate = match inner.preset_codes.pop_front() {
                Some(code) => code,
                None => random_code(),
            };
            if !inner.sessions.contains_key(&candidate) {
                break candidate;
            }
        };

        inner.sessions.insert(
            code.clone(),
            RelaySession {
                primary: payload.clone(),
                secondary: None,
                account_auth: None,
            },
        );
        Ok(code)
    }

    async fn exchange_link_key(
        &self,
        code: &str,
        payload: &KeyPayload,
    ) -> Result<KeyPayload, RelayError> {
        let mut inner = self.write()?;
        let session = inner.sessions.get_mut(code).ok_or(RelayError::NotFound)?;

        // first exchange wins; later ones still learn the primary's payload
        if session.secondary.is_none() {
            session.secondary = Some(payload.clone());
        }
        Ok(session.primary.clone())
    }

    async fn fetch_link_key(&self, code: &str) -> Result<KeyPayload, RelayError> {
        let inner = self.read()?;
        inner
            .sessions
            .get(code)
            .and_then(|session| session.secondary.clone())
            .ok_or(RelayError::NotFound)
    }

    async fn post_account_auth(
        &self,
        code: &str,
        auth: &EncryptedPayload,
    ) -> Result<(), RelayError> {
        let mut inner = self.write()?;
        let session = inner.sessions.get_mut(code).ok_or(RelayError::NotFound)?;
        session.account_auth = Some(auth.clone());
        Ok(())
    }

    async fn get_account_auth(&self, code: &str) -> Result<EncryptedPayload, RelayError> {
        let inner = self.read()?;
        inner
            .sessions
            .get(code)
            .and_then(|session| session.account_auth.clone())
            .ok_or(RelayError::NotFound)
    }

    async fn register_device(
        &self,
        device_name: &str,
        account_id: Option<&str>,
    ) -> Result<Account, RelayError> {
        let mut inner = self.write()?;

        let account_id = match account_id {
            Some(id) if inner.accounts.contains_key(id) => id.to_string(),
            Some(_) => return Err(RelayError::NotFound),
            None => Uuid::new_v4().to_string(),
        };

        let device = DeviceRecord {
            id: Uuid::new_v4().to_string(),
            name: device_name.to_string(),
        };
        let device_id = device.id.clone();
        inner
            .accounts
            .entry(account_id.clone())
            .or_default()
            .push(device);

        Ok(Account {
            id: account_id,
            device_id,
            token: Uuid::new_v4().simple().to_string(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::{Jwk, KeyPayload};

    fn payload(salt: &str) -> KeyPayload {
        KeyPayload::new(
            Jwk {
                kty: "EC".to_string(),
                ..Default::default()
            },
            1000,
            salt,
        )
    }

    #[tokio::test]
    async fn test_preset_then_random_codes() {
        let relay = MemoryRelay::with_codes(["ABCDEF"]);
        let first = relay.request_access_code(&payload("a")).await.unwrap();
        let second = relay.request_access_code(&payload("b")).await.unwrap();

        assert_eq!(first, "ABCDEF");
        assert_eq!(second.len(), ACCESS_CODE_LENGTH);
        assert!(second.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(second, second.to_uppercase());
    }

    #[tokio::test]
    async fn test_exchange_and_fetch() {
        let relay = MemoryRelay::with_codes(["ABCDEF"]);
        let code = relay.request_access_code(&payload("p")).await.unwrap();

        assert!(relay.fetch_link_key(&code).await.unwrap_err().is_not_found());

        let received = relay.exchange_link_key(&code, &payload("s")).await.unwrap();
        assert_eq!(received.salt, "p");
        assert_eq!(relay.fetch_link_key(&code).await.unwrap().salt, "s");

        // a racing second exchange does not replace the first
        relay.exchange_link_key(&code, &payload("late")).await.unwrap();
        assert_eq!(relay.fetch_link_key(&code).await.unwrap().salt, "s");
    }

    #[tokio::test]
    async fn test_unknown_and_expired_codes() {
        let relay = MemoryRelay::with_codes(["ABCDEF"]);
        assert!(relay
            .exchange_link_key("NOPE", &payload("s"))
            .await
            .unwrap_err()
            .is_not_found());

        let code = relay.request_access_code(&payload("p")).await.unwrap();
        relay.expire(&code).unwrap();
        assert!(relay
            .exchange_link_key(&code, &payload("s"))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_account_auth_slot() {
        let relay = MemoryRelay::with_codes(["ABCDEF"]);
        let code = relay.request_access_code(&payload("p")).await.unwrap();
        assert!(relay.get_account_auth(&code).await.unwrap_err().is_not_found());

        let auth = EncryptedPayload {
            ciphertext: "Y2lwaGVy".to_string(),
            nonce: "bm9uY2U=".to_string(),
        };
        relay.post_account_auth(&code, &auth).await.unwrap();
        assert_eq!(relay.get_account_auth(&code).await.unwrap(), auth);
    }

    #[tokio::test]
    async fn test_register_device() {
        let relay = MemoryRelay::new();
        let first = relay.register_device("laptop", None).await.unwrap();
        let second = relay
            .register_device("phone", Some(&first.id))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_ne!(first.device_id, second.device_id);
        assert_ne!(first.token, second.token);
        assert_eq!(
            relay.device_names(&first.id).unwrap(),
            vec!["laptop".to_string(), "phone".to_string()]
        );

        assert!(relay
            .register_device("tablet", Some("unknown"))
            .await
            .unwrap_err()
            .is_not_found());
    }
}
