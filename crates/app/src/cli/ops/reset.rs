use clap::Args;

use common::account::{self, AccountError};
use common::activation::ActivationError;
use common::settings::{SettingsError, SettingsStore};

use crate::cli::op::SessionError;
use crate::cli::ops::history::CLIPBOARD_CACHE_PREFIX;

/// Forget the account on this device
///
/// The relay keeps the device record; remove it from another device with
/// `cachenut devices --remove <id>`.
#[derive(Args, Debug, Clone)]
pub struct Reset {
    /// Confirm; without another paired device the account key is lost
    #[arg(long)]
    pub yes: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to reset account: {0}")]
    Account(#[from] AccountError),
    #[error(transparent)]
    Activation(#[from] ActivationError),
    #[error("failed to clear clipboard cache: {0}")]
    Settings(#[from] SettingsError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Reset {
    type Error = ResetError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session()?;
        let Some((account, _)) = session.account().await? else {
            return Ok("This device has no account".to_string());
        };

        if !self.yes {
            return Ok(format!(
                "This removes account {} and its key from this device.\n\
                 Run 'cachenut reset --yes' to continue",
                account.id
            ));
        }

        session.activator.cancel(None).await?;
        account::reset_account(session.store.as_ref()).await?;
        session.store.remove_prefix(CLIPBOARD_CACHE_PREFIX).await?;

        tracing::info!(account_id = %account.id, "account removed from this device");
        Ok(format!(
            "Removed account {} from this device\n  device {} is still listed on the relay",
            account.id, account.device_id
        ))
    }
}
