use clap::Args;

use common::account::{self, AccountError};

use crate::cli::op::SessionError;
use crate::cli::ops::connect::default_device_name;

#[derive(Args, Debug, Clone)]
pub struct Register {
    /// Name this device is listed under (default: "<hostname> on <os>")
    pub name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("registration failed: {0}")]
    Account(#[from] AccountError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Register {
    type Error = RegisterError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session()?;
        let name = self.name.clone().unwrap_or_else(default_device_name);
        let (account, _key) =
            account::create_account(session.relay.as_ref(), session.store.as_ref(), &name)
                .await?;

        Ok(format!(
            "Registered new account {}\n  device: {} ({})\n\
             Use 'cachenut add-device' to pair your other devices",
            account.id,
            name.trim(),
            account.device_id
        ))
    }
}
