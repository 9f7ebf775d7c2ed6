use clap::Args;

use common::account::{self, Account, AccountError};
use common::activation::ActivationError;
use common::crypto::SymmetricKey;

use crate::cli::op::{Session, SessionError};
use crate::relay_client::{Device, DeviceUpdate, RelayClientError};

/// List the account's devices, or change one of them
#[derive(Args, Debug, Clone)]
#[group(multiple = false)]
pub struct Devices {
    /// Give a device a new name
    #[arg(long, num_args = 2, value_names = ["ID", "NAME"])]
    pub rename: Option<Vec<String>>,

    /// Unlink a device from the account
    #[arg(long, value_name = "ID")]
    pub remove: Option<String>,

    /// Refresh this device's id from the relay
    #[arg(long)]
    pub sync: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum DevicesError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to load account: {0}")]
    Account(#[from] AccountError),
    #[error(transparent)]
    Activation(#[from] ActivationError),
    #[error("relay request failed: {0}")]
    Relay(#[from] RelayClientError),
    #[error("this device cannot remove itself; run 'cachenut reset' here and remove it from another device")]
    RemoveSelf,
    #[error("device name cannot be empty")]
    EmptyName,
}

fn format_device(device: &Device, current_id: &str) -> String {
    let marker = if device.device_id == current_id { "*" } else { " " };
    let name = if device.name.is_empty() {
        "(unnamed)"
    } else {
        device.name.as_str()
    };
    let mut line = format!("{} {:<24} {}", marker, name, device.device_id);
    if let Some(created) = device.create_date {
        line.push_str(&format!("  added {}", created.format("%Y-%m-%d")));
    }
    if device.manage_device == Some(true) {
        line.push_str("  (manager)");
    }
    line
}

impl Devices {
    async fn rename_device(
        &self,
        session: &Session,
        account: &Account,
        device_id: &str,
        name: &str,
    ) -> Result<String, DevicesError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DevicesError::EmptyName);
        }
        let update = DeviceUpdate {
            name: Some(name.to_string()),
            ..Default::default()
        };
        session
            .relay
            .update_device(account, device_id, &update)
            .await?;
        Ok(format!("Renamed device {} to {}", device_id, name))
    }

    async fn remove_device(
        &self,
        session: &Session,
        account: &Account,
        device_id: &str,
    ) -> Result<String, DevicesError> {
        if device_id == account.device_id {
            return Err(DevicesError::RemoveSelf);
        }
        session.relay.remove_device(account, device_id).await?;
        tracing::info!(device_id = %device_id, "device removed from account");
        Ok(format!("Removed device {} from account {}", device_id, account.id))
    }

    /// Store the device id the relay knows this token by
    async fn sync_device_id(
        &self,
        session: &Session,
        account: Account,
        key: &SymmetricKey,
    ) -> Result<String, DevicesError> {
        let current = session.relay.current_device(&account).await?;
        if current.device_id == account.device_id {
            return Ok(format!("Device id {} is up to date", account.device_id));
        }

        let synced = Account {
            device_id: current.device_id.clone(),
            ..account
        };
        account::save_account(session.store.as_ref(), &synced, key).await?;
        Ok(format!("Device id updated to {}", current.device_id))
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Devices {
    type Error = DevicesError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session()?;
        let (account, key) = session
            .account()
            .await?
            .ok_or(ActivationError::NoAccount)?;

        if let Some([device_id, name]) = self.rename.as_deref() {
            return self.rename_device(&session, &account, device_id, name).await;
        }
        if let Some(device_id) = &self.remove {
            return self.remove_device(&session, &account, device_id).await;
        }
        if self.sync {
            return self.sync_device_id(&session, account, &key).await;
        }

        let devices = session.relay.list_devices(&account).await?;
        let mut lines = vec![format!("Devices of account {}:", account.id)];
        lines.extend(
            devices
                .iter()
                .map(|device| format_device(device, &account.device_id)),
        );

        Ok(lines.join("\n"))
    }
}
