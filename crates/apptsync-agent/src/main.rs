//! # apptsync Agent
//!
//! Polls the athenahealth appointment change feed for each configured
//! practice and forwards normalized batches to a downstream sink.
//!
//! ## Architecture
//!
//! Each practice gets its own poll scheduler driving one cycle per interval:
//! 1. **Credential**: reuse or renew the bearer token
//! 2. **Fetch**: read changes after the feed's cursor
//! 3. **Normalize**: drop malformed records, resolve start times
//! 4. **Forward**: deliver the batch to the sink
//! 5. **Advance**: move and persist the cursor once the sink accepted the batch

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod config;
mod persistence;
mod runtime;

pub use config::AgentConfig;
pub use runtime::Agent;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting apptsync agent"
    );

    let config = AgentConfig::from_env().context("Invalid configuration")?;
    tracing::debug!(?config, "Loaded configuration");

    let agent = Agent::new(config)?;
    agent.run().await?;

    Ok(())
}
