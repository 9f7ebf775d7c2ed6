use clap::Args;

use common::account::AccountError;
use common::activation::{format_code, ActivationError, LinkStatus};
use common::transport::AccountAuth;

use crate::cli::op::SessionError;

#[derive(Args, Debug, Clone)]
pub struct AddDevice {
    /// Link code shown on the new device; authorizes it to join this account
    #[arg(long)]
    pub confirm: Option<String>,

    /// Only issue (or re-show) the access code, without waiting for the new device
    #[arg(long)]
    pub no_wait: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum AddDeviceError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to load account: {0}")]
    Account(#[from] AccountError),
    #[error(transparent)]
    Activation(#[from] ActivationError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for AddDevice {
    type Error = AddDeviceError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session()?;
        let (account, master_key) = session
            .account()
            .await?
            .ok_or(ActivationError::NoAccount)?;

        if let Some(entered) = &self.confirm {
            let mut data = session
                .activator
                .resume()
                .await?
                .ok_or(ActivationError::NoSession)?;

            let auth = AccountAuth::new(account.id.clone(), &master_key);
            session
                .activator
                .authorize_peer(&mut data, entered, &auth)
                .await?;
            session.activator.complete(data).await?;

            return Ok(format!(
                "Authorized the new device for account {}\n\
                 It finishes joining on its own; check with 'cachenut devices'",
                account.id
            ));
        }

        let mut data = session.activator.issue_access_code().await?;

        let mut lines = Vec::new();
        lines.push(format!(
            "Access code: {}",
            format_code(data.access_code(), "-")
        ));
        if let Some(partial) = data.partial_link_code() {
            lines.push(format!("Link code starts with: {}", partial));
        }

        if self.no_wait {
            lines.push(String::new());
            lines.push("On the new device run: cachenut connect <access code>".to_string());
            return Ok(lines.join("\n"));
        }

        // the user needs the code now, not when polling is done
        println!("{}", lines.join("\n"));
        println!("On the new device run: cachenut connect <access code>");
        println!("Waiting for the new device...");
        lines.clear();

        let status = session
            .activator
            .wait_for_peer(&mut data, session.poll_interval(), session.poll_attempts())
            .await?;

        match status {
            LinkStatus::Linked => {
                lines.push("The new device joined.".to_string());
                lines.push(
                    "Check that it shows a link code starting with the one above, then run:"
                        .to_string(),
                );
                lines.push("  cachenut add-device --confirm <link code>".to_string());
            }
            LinkStatus::Pending => {
                lines.push("No device joined yet.".to_string());
                lines.push(
                    "Run 'cachenut add-device' again to keep waiting, or 'cachenut cancel'"
                        .to_string(),
                );
            }
        }

        Ok(lines.join("\n"))
    }
}
