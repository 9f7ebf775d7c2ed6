//! Clipboard items as stored on the relay
//!
//! Item metadata travels in the clear; the content is always encrypted under
//! the account master key.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::crypto::{CipherError, EncryptedPayload, SymmetricKey};

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^https?://[a-zA-Z0-9]").expect("valid url pattern"))
}

/// What was copied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClipboardContent {
    Url { url: String },
    Text { text: String },
    Image { url: String },
}

impl ClipboardContent {
    /// Classify copied text as a url or plain text
    pub fn from_value(value: impl Into<String>) -> Self {
        let value = value.into();
        if url_pattern().is_match(&value) {
            ClipboardContent::Url { url: value }
        } else {
            ClipboardContent::Text { text: value }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClipboardContent::Url { .. } => "url",
            ClipboardContent::Text { .. } => "text",
            ClipboardContent::Image { .. } => "image",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            ClipboardContent::Url { url } => url,
            ClipboardContent::Text { text } => text,
            ClipboardContent::Image { url } => url,
        }
    }

    pub fn encrypt(&self, key: &SymmetricKey) -> Result<EncryptedPayload, CipherError> {
        key.encrypt_json(self)
    }
}

impl fmt::Display for ClipboardContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind(), self.value())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardItemMeta {
    pub device_id: String,
    pub create_ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
}

/// An item as the relay returns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedClipboardItem {
    #[serde(flatten)]
    pub meta: ClipboardItemMeta,
    pub account_id: String,
    pub content: EncryptedPayload,
}

/// An item after decryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardItem {
    pub meta: ClipboardItemMeta,
    pub content: ClipboardContent,
}

impl ClipboardItem {
    pub fn decrypt(item: EncryptedClipboardItem, key: &SymmetricKey) -> Result<Self, CipherError> {
        let content = key.decrypt_json(&item.content)?;
        Ok(Self {
            meta: item.meta,
            content,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_detection() {
        assert!(matches!(
            ClipboardContent::from_value("https://example.com"),
            ClipboardContent::Url { .. }
        ));
        assert!(matches!(
            ClipboardContent::from_value("http://a"),
            ClipboardContent::Url { .. }
        ));
        for text in ["https://", "http:// spaced", "ftp://example.com", " https://x.y", "hello"] {
            assert!(
                matches!(ClipboardContent::from_value(text), ClipboardContent::Text { .. }),
                "{text} should be text"
            );
        }
    }

    #[test]
    fn test_tagged_wire_format() {
        let url = ClipboardContent::from_value("https://example.com");
        assert_eq!(
            serde_json::to_value(&url).unwrap(),
            json!({"type": "url", "url": "https://example.com"})
        );

        let image: ClipboardContent =
            serde_json::from_value(json!({"type": "image", "url": "https://img"})).unwrap();
        assert_eq!(
            image,
            ClipboardContent::Image {
                url: "https://img".to_string()
            }
        );

        assert!(serde_json::from_value::<ClipboardContent>(json!({"type": "video"})).is_err());
    }

    #[test]
    fn test_decrypt_item() {
        let key = SymmetricKey::generate();
        let content = ClipboardContent::from_value("some text");

        let wire = json!({
            "deviceId": "dev-1",
            "createTs": 1700000000000i64,
            "deviceName": "laptop",
            "accountId": "acct",
            "content": content.encrypt(&key).unwrap(),
        });
        let encrypted: EncryptedClipboardItem = serde_json::from_value(wire).unwrap();
        assert_eq!(encrypted.meta.device_name.as_deref(), Some("laptop"));
        assert!(encrypted.meta.expires_at.is_none());

        let item = ClipboardItem::decrypt(encrypted.clone(), &key).unwrap();
        assert_eq!(item.content, content);
        assert_eq!(item.meta.create_ts, 1_700_000_000_000);

        assert!(ClipboardItem::decrypt(encrypted, &SymmetricKey::generate()).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ClipboardContent::from_value("hi").to_string(),
            "[text] hi".to_string()
        );
    }
}
