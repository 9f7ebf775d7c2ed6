use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use common::account::{self, Account, AccountError};
use common::activation::Activator;
use common::crypto::SymmetricKey;

use crate::relay_client::{HttpRelay, RelayClientError};
use crate::settings_file::FileSettings;
use crate::state::{AppConfig, AppState, StateError};

/// Resolve the relay URL.
///
/// Priority: explicit `--remote` flag > config file `relay_url` > built-in default.
pub fn resolve_remote(explicit: Option<Url>, config_path: Option<PathBuf>) -> Url {
    if let Some(url) = explicit {
        return url;
    }
    match AppState::load(config_path) {
        Ok(state) => state.config.relay_url,
        Err(_) => AppConfig::default().relay_url,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("failed to create relay client: {0}")]
    Client(#[from] RelayClientError),
}

/// Everything an op needs to talk to the relay and local storage
#[derive(Debug)]
pub struct Session {
    pub state: AppState,
    pub relay: Arc<HttpRelay>,
    pub store: Arc<FileSettings>,
    pub activator: Activator,
}

impl Session {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.state.config.poll_interval_ms)
    }

    pub fn poll_attempts(&self) -> u32 {
        self.state.config.poll_attempts
    }

    pub async fn account(&self) -> Result<Option<(Account, SymmetricKey)>, AccountError> {
        account::load_account(self.store.as_ref()).await
    }
}

#[derive(Debug, Clone)]
pub struct OpContext {
    /// Relay URL given on the command line, if any
    pub remote: Option<Url>,
    /// Optional custom config path (defaults to ~/.cachenut)
    pub config_path: Option<PathBuf>,
}

impl OpContext {
    pub fn new(remote: Option<Url>, config_path: Option<PathBuf>) -> Self {
        Self {
            remote,
            config_path,
        }
    }

    /// Load state and wire up the relay client, settings file and activator
    pub fn session(&self) -> Result<Session, SessionError> {
        let state = AppState::load(self.config_path.clone())?;
        let remote = self
            .remote
            .clone()
            .unwrap_or_else(|| state.config.relay_url.clone());

        let relay = Arc::new(HttpRelay::new(&remote)?);
        let store = Arc::new(FileSettings::new(&state.settings_path));
        let activator = Activator::new(relay.clone(), store.clone());

        Ok(Session {
            state,
            relay,
            store,
            activator,
        })
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
