use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

pub const APP_NAME: &str = "cachenut";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the relay server
    #[serde(default = "default_relay_url")]
    pub relay_url: Url,
    /// Default log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Delay between polls while waiting on the other device
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How many times to poll before giving up for now
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
}

fn default_relay_url() -> Url {
    Url::parse("http://localhost:8080").expect("hardcoded URL must parse")
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_poll_attempts() -> u32 {
    90
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            log_level: default_log_level(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_attempts: default_poll_attempts(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the cachenut directory (~/.cachenut)
    pub cachenut_dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Path to the settings file holding account and pairing state
    pub settings_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the cachenut directory path (custom or default ~/.cachenut)
    pub fn cachenut_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new cachenut state directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let cachenut_dir = Self::cachenut_dir(custom_path)?;

        if cachenut_dir.join(CONFIG_FILE_NAME).exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&cachenut_dir)?;

        let config = config.unwrap_or_default();
        let config_path = cachenut_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        // settings.json is created on first write
        let settings_path = cachenut_dir.join(SETTINGS_FILE_NAME);

        Ok(Self {
            cachenut_dir,
            config_path,
            settings_path,
            config,
        })
    }

    /// Load existing state from the cachenut directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let cachenut_dir = Self::cachenut_dir(custom_path)?;
        let config_path = cachenut_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Err(StateError::NotInitialized);
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            settings_path: cachenut_dir.join(SETTINGS_FILE_NAME),
            cachenut_dir,
            config_path,
            config,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("cachenut directory not initialized. Run 'cachenut init' first")]
    NotInitialized,

    #[error("cachenut directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
