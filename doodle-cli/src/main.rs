//! # Doodle Moji CLI
//!
//! Operator binary for the doodle classifier.

use clap::Parser;
use doodle_cli::{commands, CliArgs, CliConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("doodle_cli=info,doodle_learn=info,doodle_core=info"));

    // Logs go to stderr so command output stays pipeable
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    // Use JSON format when RUST_LOG_FORMAT=json
    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = CliArgs::parse();
    let config = CliConfig::from(&args);
    tracing::debug!(data_dir = %config.data_dir.display(), "Starting doodle");

    let mut stdout = std::io::stdout().lock();
    commands::run(&config, args.command, &mut stdout).await
}
