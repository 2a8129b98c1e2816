//! barrage - runs one full match against the battery service.
//!
//! No arguments. The battery endpoint comes from `BARRAGE_BASE_URL` when
//! set; log verbosity from `RUST_LOG`. Exits 0 once the match finishes and
//! the score is collected, non-zero on any uncaught fault.

use std::io;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use barrage_engine::{MatchConfig, run_match};
use barrage_transport::{BatteryClient, TransportConfig};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let transport = TransportConfig::from_env();
    tracing::info!(base_url = %transport.base_url, "connecting to battery service");
    let client = BatteryClient::new(&transport)?;

    let score = run_match(&client, &MatchConfig::default()).await?;
    println!("final score: {score}");
    Ok(())
}
