use clap::Args;

use common::account::AccountError;
use common::activation::ActivationError;
use common::clipboard::ClipboardContent;
use common::crypto::CipherError;

use crate::cli::op::SessionError;
use crate::relay_client::RelayClientError;

#[derive(Args, Debug, Clone)]
pub struct CopyText {
    /// Text or URL to share with your other devices
    pub value: String,

    /// Share as plain text even if it looks like a URL
    #[arg(long)]
    pub text: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to load account: {0}")]
    Account(#[from] AccountError),
    #[error(transparent)]
    Activation(#[from] ActivationError),
    #[error("failed to encrypt clipboard content: {0}")]
    Cipher(#[from] CipherError),
    #[error("failed to upload clipboard content: {0}")]
    Relay(#[from] RelayClientError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for CopyText {
    type Error = CopyError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session()?;
        let (account, key) = session
            .account()
            .await?
            .ok_or(ActivationError::NoAccount)?;

        let content = if self.text {
            ClipboardContent::Text {
                text: self.value.clone(),
            }
        } else {
            ClipboardContent::from_value(self.value.clone())
        };

        let encrypted = content.encrypt(&key)?;
        session.relay.post_clipboard(&account, &encrypted).await?;

        tracing::debug!(kind = content.kind(), "clipboard content uploaded");
        Ok(format!("Copied {} to your devices", content.kind()))
    }
}
