pub use clap::Parser;

use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "cachenut")]
#[command(about = "End-to-end encrypted clipboard sync between your devices")]
pub struct Args {
    /// Relay server URL (defaults to relay_url from config.toml)
    #[arg(long, global = true)]
    pub remote: Option<Url>,

    /// Path to the cachenut config directory (defaults to ~/.cachenut)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: crate::Command,
}
