use clap::Args;

use common::activation::ActivationError;

use crate::cli::op::SessionError;

#[derive(Args, Debug, Clone)]
pub struct Cancel;

#[derive(Debug, thiserror::Error)]
pub enum CancelError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("cancel failed: {0}")]
    Activation(#[from] ActivationError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Cancel {
    type Error = CancelError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = ctx.session()?;
        let data = match session.activator.resume().await {
            Ok(Some(data)) => data,
            Ok(None) => return Ok("No pairing in progress".to_string()),
            Err(ActivationError::Corrupt(field)) => {
                tracing::warn!(field = %field, "discarding unreadable pairing session");
                session.activator.cancel(None).await?;
                return Ok("Discarded an unreadable pairing session".to_string());
            }
            Err(e) => return Err(e.into()),
        };

        let role = data.role();
        let code = data.access_code().to_string();
        session.activator.cancel(Some(data)).await?;

        Ok(format!("Cancelled {} pairing session {}", role, code))
    }
}
