// CLI modules
mod cli;

// Adapters for the pairing core
#[cfg(test)]
mod fake_server;
mod relay_client;
mod settings_file;
mod state;

use clap::{Parser, Subcommand};
use cli::{
    args::Args, op::Op, AddDevice, Cancel, Connect, CopyText, Devices, History, Init, Register,
    Reset, Status,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

command_enum! {
    (AddDevice, AddDevice),
    (Cancel, Cancel),
    (Connect, Connect),
    (Copy, CopyText),
    (Devices, Devices),
    (History, History),
    (Init, Init),
    (Register, Register),
    (Reset, Reset),
    (Status, Status),
}

/// Log to stderr so command output on stdout stays clean
fn init_logging(args: &Args) -> tracing_appender::non_blocking::WorkerGuard {
    let (stderr_writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    // --log-level > config log_level > warn
    let log_level: tracing::Level = args
        .log_level
        .clone()
        .or_else(|| {
            state::AppState::load(args.config_path.clone())
                .ok()
                .map(|state| state.config.log_level)
        })
        .and_then(|level| level.parse().ok())
        .unwrap_or(tracing::Level::WARN);

    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stderr_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_layer).init();
    guard
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let guard = init_logging(&args);

    let ctx = cli::op::OpContext::new(args.remote.clone(), args.config_path.clone());

    let code = match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };

    // flush buffered log lines before exiting
    drop(guard);
    std::process::exit(code);
}
