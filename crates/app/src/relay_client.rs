use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, LAST_MODIFIED};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use common::account::Account;
use common::clipboard::EncryptedClipboardItem;
use common::crypto::{EncryptedPayload, KeyPayload};
use common::relay::{Relay, RelayError};

pub const ACCOUNT_HEADER: &str = "X-CacheNut-Account";
pub const TOKEN_HEADER: &str = "X-CacheNut-Token";

#[derive(Debug, thiserror::Error)]
pub enum RelayClientError {
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
}

impl From<RelayClientError> for RelayError {
    fn from(err: RelayClientError) -> Self {
        match err {
            RelayClientError::HttpStatus(StatusCode::NOT_FOUND, _) => RelayError::NotFound,
            other => RelayError::Default(anyhow::Error::from(other)),
        }
    }
}

/// A device as listed by the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manage_device: Option<bool>,
}

/// Registration response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountItem {
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_date: Option<DateTime<Utc>>,
    pub devices: Vec<Device>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

/// Fields of a device record that can be changed; absent fields stay as
/// they are
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manage_device: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessCodeResponse {
    pub code: String,
}

/// `Relay` over the CacheNut HTTP API
#[derive(Debug, Clone)]
pub struct HttpRelay {
    remote: Url,
    client: Client,
}

impl HttpRelay {
    pub fn new(remote: &Url) -> Result<Self, RelayClientError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder().default_headers(default_headers).build()?;

        // join() drops the last path segment unless the base ends with '/'
        let mut remote = remote.clone();
        if !remote.path().ends_with('/') {
            let path = format!("{}/", remote.path());
            remote.set_path(&path);
        }

        Ok(Self { remote, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.remote
    }

    fn url(&self, path: &str) -> Result<Url, RelayClientError> {
        Ok(self.remote.join(path.trim_start_matches('/'))?)
    }

    /// `accounts/manage/devices/<device_id>`, with the id as one escaped segment
    fn device_url(&self, device_id: &str) -> Result<Url, RelayClientError> {
        let mut url = self.url("accounts/manage/devices")?;
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .push(device_id);
        Ok(url)
    }

    fn with_auth(builder: RequestBuilder, account: &Account) -> RequestBuilder {
        builder
            .header(ACCOUNT_HEADER, &account.id)
            .header(TOKEN_HEADER, &account.token)
    }

    async fn send(builder: RequestBuilder) -> Result<reqwest::Response, RelayClientError> {
        let response = builder.send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(RelayClientError::HttpStatus(
                response.status(),
                response.text().await?,
            ))
        }
    }

    async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, RelayClientError> {
        Ok(Self::send(builder).await?.json::<T>().await?)
    }

    /// Clipboard items of the account, newest first as the relay orders them
    pub async fn list_clipboard(
        &self,
        account: &Account,
    ) -> Result<Vec<EncryptedClipboardItem>, RelayClientError> {
        let builder = Self::with_auth(self.client.get(self.url("clipboard")?), account);
        Self::send_json(builder).await
    }

    pub async fn post_clipboard(
        &self,
        account: &Account,
        content: &EncryptedPayload,
    ) -> Result<(), RelayClientError> {
        let builder = Self::with_auth(self.client.post(self.url("clipboard")?), account);
        Self::send(builder.json(content)).await?;
        Ok(())
    }

    pub async fn list_devices(&self, account: &Account) -> Result<Vec<Device>, RelayClientError> {
        let builder = Self::with_auth(
            self.client.get(self.url("accounts/manage/devices")?),
            account,
        );
        Self::send_json(builder).await
    }

    /// The record the relay keeps for the device `account` authenticates as
    pub async fn current_device(&self, account: &Account) -> Result<Device, RelayClientError> {
        let builder = Self::with_auth(
            self.client.get(self.url("accounts/manage/devices/current")?),
            account,
        );
        Self::send_json(builder).await
    }

    pub async fn update_device(
        &self,
        account: &Account,
        device_id: &str,
        update: &DeviceUpdate,
    ) -> Result<(), RelayClientError> {
        let builder = Self::with_auth(self.client.put(self.device_url(device_id)?), account);
        Self::send(builder.json(update)).await?;
        Ok(())
    }

    /// Unlink a device from the account; its token stops working
    pub async fn remove_device(
        &self,
        account: &Account,
        device_id: &str,
    ) -> Result<(), RelayClientError> {
        let builder = Self::with_auth(self.client.delete(self.device_url(device_id)?), account);
        Self::send(builder).await?;
        Ok(())
    }

    /// `Last-Modified` of the account's clipboard, if the relay sent one
    pub async fn last_updated(&self, account: &Account) -> Result<Option<String>, RelayClientError> {
        let builder = Self::with_auth(self.client.head(self.url("clipboard")?), account);
        let response = Self::send(builder).await?;
        Ok(response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string))
    }
}

#[async_trait]
impl Relay for HttpRelay {
    async fn request_access_code(&self, payload: &KeyPayload) -> Result<String, RelayError> {
        let builder = self.client.post(self.url("accounts/code")?).json(payload);
        let response: AccessCodeResponse = Self::send_json(builder).await?;
        Ok(response.code)
    }

    async fn exchange_link_key(
        &self,
        code: &str,
        payload: &KeyPayload,
    ) -> Result<KeyPayload, RelayError> {
        let url = self.url(&format!("accounts/code/{}", code))?;
        Ok(Self::send_json(self.client.post(url).json(payload)).await?)
    }

    async fn fetch_link_key(&self, code: &str) -> Result<KeyPayload, RelayError> {
        let url = self.url(&format!("accounts/code/{}", code))?;
        Ok(Self::send_json(self.client.get(url)).await?)
    }

    async fn post_account_auth(
        &self,
        code: &str,
        auth: &EncryptedPayload,
    ) -> Result<(), RelayError> {
        let url = self.url(&format!("accounts/code/{}/aux", code))?;
        Self::send(self.client.post(url).json(auth)).await?;
        Ok(())
    }

    async fn get_account_auth(&self, code: &str) -> Result<EncryptedPayload, RelayError> {
        let url = self.url(&format!("accounts/code/{}/aux", code))?;
        Ok(Self::send_json(self.client.get(url)).await?)
    }

    async fn register_device(
        &self,
        device_name: &str,
        account_id: Option<&str>,
    ) -> Result<Account, RelayError> {
        let device_name = device_name.trim();
        let body = RegisterRequest {
            device_name: (!device_name.is_empty()).then(|| device_name.to_string()),
            account_id: account_id.map(str::to_string),
        };
        let builder = self.client.post(self.url("accounts/register")?).json(&body);
        let item: AccountItem = Self::send_json(builder).await?;

        let device = item
            .devices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("registration returned no device"))?;
        let token = device
            .token
            .ok_or_else(|| anyhow::anyhow!("registration returned no device token"))?;

        Ok(Account {
            id: item.account_id,
            device_id: device.device_id,
            token,
        })
    }
}
