use clap::Args;

use common::account::AccountError;
use common::activation::{format_code, ActivationError};

use crate::cli::op::SessionError;

#[derive(Args, Debug, Clone)]
pub struct Connect {
    /// Access code shown on a device that already has an account
    pub code: String,

    /// Name this device is listed under (default: "<hostname> on <os>")
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to load account: {0}")]
    Account(#[from] AccountError),
    #[error("this device already belongs to account {0}")]
    AlreadyRegistered(String),
    #[error(transparent)]
    Activation(#[from] ActivationError),
}

/// "<hostname> on <os>", so devices sharing an OS stay apart in listings
pub fn default_device_name() -> String {
    let host = whoami::devicename();
    let host = match host.trim() {
        "" => "cachenut",
        trimmed => trimmed,
    };
    format!("{} on {}", host, whoami::platform())
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Connect {
    type Error = ConnectError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session()?;
        if let Some((account, _)) = session.account().await? {
            return Err(ConnectError::AlreadyRegistered(account.id));
        }

        let mut data = session.activator.connect(&self.code).await?;

        if let Some(link_code) = data.link_code() {
            println!("Link code: {}", format_code(&link_code, " "));
            println!("Enter it on the other device with: cachenut add-device --confirm <link code>");
            println!("Waiting for authorization...");
        }

        let name = self.name.clone().unwrap_or_else(default_device_name);
        let attempts = session.poll_attempts().max(1);
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(session.poll_interval()).await;
            }
            match session.activator.finish(&mut data, &name).await {
                Ok(account) => {
                    return Ok(format!(
                        "Joined account {}\n  device: {} ({})",
                        account.id,
                        name.trim(),
                        account.device_id
                    ));
                }
                Err(e) if e.is_transient() => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(format!(
            "Not authorized yet.\n\
             Run 'cachenut connect {}' again to keep waiting, or 'cachenut cancel'",
            data.access_code()
        ))
    }
}
