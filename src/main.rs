//! Pool worker: hosts one environment and serves the pool protocol on stdio.
//!
//! Stdout carries the protocol, so logs go to stderr. `RUST_LOG` sets the
//! filter (default `warn`).

use anyhow::Result;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()))
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(pid = std::process::id(), "worker starting");
    dodger_gym::pool::serve_stdio()
}
