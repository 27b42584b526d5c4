//! Ripple event-delivery server.
//!
//! Entry point wiring the outbox dispatchers, broker gateway, webhook
//! notifier and HTTP surface into one process.

mod api;
mod config;
mod startup;

use clap::Parser;
use config::RippleConfig;

#[derive(clap::Parser, Debug)]
#[command(name = "ripple-server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ripple event-delivery pipeline server", long_about = None)]
struct Args {
    /// HTTP port; overrides configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = RippleConfig::load()?;
    if let Some(port) = args.port {
        config.http_port = port;
    }

    setup_logging(if args.debug {
        "debug"
    } else {
        config.log_level.as_str()
    });

    startup::run(config).await
}

fn setup_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}
