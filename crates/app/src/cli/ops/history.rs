use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use clap::Args;

use common::account::{Account, AccountError};
use common::activation::ActivationError;
use common::clipboard::{ClipboardItem, EncryptedClipboardItem};
use common::crypto::SymmetricKey;
use common::settings::{SettingsError, SettingsStore};

use crate::cli::op::SessionError;
use crate::relay_client::{HttpRelay, RelayClientError};

/// Every key of the local clipboard cache starts with this
pub const CLIPBOARD_CACHE_PREFIX: &str = "clipboardCache";
const CACHE_LAST_MODIFIED: &str = "clipboardCacheLastModified";
const CACHE_ITEMS: &str = "clipboardCacheItems";

#[derive(Args, Debug, Clone)]
pub struct History {
    /// Show at most this many items
    #[arg(long, short = 'n', default_value_t = 20)]
    pub limit: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to load account: {0}")]
    Account(#[from] AccountError),
    #[error(transparent)]
    Activation(#[from] ActivationError),
    #[error("failed to fetch clipboard history: {0}")]
    Relay(#[from] RelayClientError),
    #[error("clipboard cache error: {0}")]
    Settings(#[from] SettingsError),
}

/// Encrypted items of the account, downloaded only when the relay's
/// `Last-Modified` differs from the cached one
///
/// The second value is true when the items came from the cache.
async fn fetch_items(
    relay: &HttpRelay,
    store: &dyn SettingsStore,
    account: &Account,
) -> Result<(Vec<EncryptedClipboardItem>, bool), HistoryError> {
    let last_modified = relay.last_updated(account).await?;

    if let Some(last_modified) = &last_modified {
        let mut cached = store.get(&[CACHE_LAST_MODIFIED, CACHE_ITEMS]).await?;
        if cached.get(CACHE_LAST_MODIFIED) == Some(last_modified) {
            let raw = cached.remove(CACHE_ITEMS).unwrap_or_default();
            match serde_json::from_str(&raw) {
                Ok(items) => {
                    tracing::debug!(last_modified = %last_modified, "clipboard unchanged, using cache");
                    return Ok((items, true));
                }
                Err(e) => tracing::warn!("ignoring unreadable clipboard cache: {}", e),
            }
        }
    }

    let items = relay.list_clipboard(account).await?;
    match (last_modified, serde_json::to_string(&items)) {
        (Some(last_modified), Ok(raw)) => {
            store
                .set(BTreeMap::from([
                    (CACHE_LAST_MODIFIED.to_string(), last_modified),
                    (CACHE_ITEMS.to_string(), raw),
                ]))
                .await?;
        }
        (None, _) => store.remove_prefix(CLIPBOARD_CACHE_PREFIX).await?,
        (_, Err(e)) => tracing::warn!("not caching clipboard items: {}", e),
    }
    Ok((items, false))
}

/// Decrypt what we can; items under another key are skipped
fn decrypt_all(items: Vec<EncryptedClipboardItem>, key: &SymmetricKey) -> (Vec<ClipboardItem>, usize) {
    let mut skipped = 0;
    let decrypted = items
        .into_iter()
        .filter_map(|item| match ClipboardItem::decrypt(item, key) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("skipping clipboard item: {}", e);
                skipped += 1;
                None
            }
        })
        .collect();
    (decrypted, skipped)
}

fn format_item(item: &ClipboardItem) -> String {
    let when = DateTime::<Utc>::from_timestamp_millis(item.meta.create_ts)
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| item.meta.create_ts.to_string());
    let from = item
        .meta
        .device_name
        .as_deref()
        .unwrap_or(&item.meta.device_id);
    format!("{}  {:<20}  {}", when, from, item.content)
}

#[async_trait::async_trait]
impl crate::cli::op::Op for History {
    type Error = HistoryError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session()?;
        let (account, key) = session
            .account()
            .await?
            .ok_or(ActivationError::NoAccount)?;

        let (items, _) = fetch_items(&session.relay, session.store.as_ref(), &account).await?;
        let (items, skipped) = decrypt_all(items, &key);

        if items.is_empty() && skipped == 0 {
            return Ok("Clipboard history is empty".to_string());
        }

        let mut lines: Vec<String> = items.iter().take(self.limit).map(format_item).collect();
        if skipped > 0 {
            lines.push(format!("({} item(s) could not be decrypted)", skipped));
        }
        Ok(lines.join("\n"))
    }
}
