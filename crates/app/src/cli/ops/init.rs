use clap::Args;
use url::Url;

use crate::state::{AppConfig, AppState};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Relay server URL (default: http://localhost:8080)
    #[arg(long)]
    pub relay_url: Option<Url>,

    /// Milliseconds between polls while waiting on the other device
    #[arg(long, default_value_t = 2000)]
    pub poll_interval_ms: u64,

    /// Polls before a waiting command gives up (it can be re-run to resume)
    #[arg(long, default_value_t = 90)]
    pub poll_attempts: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] crate::state::StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let defaults = AppConfig::default();
        let config = AppConfig {
            relay_url: self
                .relay_url
                .clone()
                .or_else(|| ctx.remote.clone())
                .unwrap_or(defaults.relay_url),
            log_level: defaults.log_level,
            poll_interval_ms: self.poll_interval_ms,
            poll_attempts: self.poll_attempts,
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        let output = format!(
            "Initialized cachenut directory at: {}\n\
             - Config: {}\n\
             - Settings: {}\n\
             - Relay: {}\n\
             Next: 'cachenut register <device name>' to start a new account,\n\
             or 'cachenut connect <access code>' to join one from another device",
            state.cachenut_dir.display(),
            state.config_path.display(),
            state.settings_path.display(),
            state.config.relay_url,
        );

        Ok(output)
    }
}
