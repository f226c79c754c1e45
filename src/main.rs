//! diamond-price - Main Entry Point

use clap::Parser;
use diamond_price::cli::{run, Cli};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "diamond_price=info".into()),
        )
        .init();

    run(Cli::parse())
}
