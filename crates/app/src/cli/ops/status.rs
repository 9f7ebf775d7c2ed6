use clap::Args;

use common::activation::{format_code, ActivationError, PairingState};

use crate::cli::op::{resolve_remote, SessionError};
use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Status;

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Status {
    type Error = StatusError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let session = match ctx.session() {
            Ok(session) => session,
            Err(SessionError::State(StateError::NotInitialized)) => {
                let relay = resolve_remote(ctx.remote.clone(), ctx.config_path.clone());
                return Ok(format!(
                    "Not initialized. Run 'cachenut init' first\n  relay: {}",
                    relay
                ));
            }
            Err(e) => return Err(e.into()),
        };

        let mut lines = Vec::new();
        lines.push("Config:".to_string());
        lines.push(format!("  directory: {}", session.state.cachenut_dir.display()));
        lines.push(format!("  settings:  {}", session.store.path().display()));
        lines.push(format!("  relay:     {}", session.relay.base_url()));

        lines.push(String::new());
        lines.push("Account:".to_string());
        match session.account().await {
            Ok(Some((account, _))) => {
                lines.push(format!("  id:     {}", account.id));
                lines.push(format!("  device: {}", account.device_id));
            }
            Ok(None) => lines.push("  none (run 'cachenut register' or 'cachenut connect')".to_string()),
            Err(e) => lines.push(format!("  error: {}", e)),
        }

        lines.push(String::new());
        lines.push("Pairing:".to_string());
        match session.activator.resume().await {
            Ok(Some(data)) => {
                lines.push(format!("  state:       {} ({})", data.state(), data.role()));
                lines.push(format!(
                    "  access code: {}",
                    format_code(data.access_code(), "-")
                ));
                match (data.link_code(), data.partial_link_code()) {
                    (Some(full), _) => {
                        lines.push(format!("  link code:   {}", format_code(&full, " ")))
                    }
                    (None, Some(partial)) => {
                        lines.push(format!("  link code:   {}...", partial))
                    }
                    (None, None) => {}
                }
            }
            Ok(None) => lines.push(format!("  state: {}", PairingState::Idle)),
            Err(ActivationError::Corrupt(field)) => lines.push(format!(
                "  unreadable session ({}); run 'cachenut cancel' to discard it",
                field
            )),
            Err(e) => lines.push(format!("  error: {}", e)),
        }

        Ok(lines.join("\n"))
    }
}
