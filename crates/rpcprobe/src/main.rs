//! `rpcprobe`: send one JSON-RPC request to a stdio tool server
//!
//! ```text
//! rpcprobe roll-dice --count 3 --sides 6 -- node build/src/index.js --stdio
//! rpcprobe call tools/list -- python3 server.py
//! ```
//!
//! Logs go to stderr (`RUST_LOG`, default `warn`); stdout carries the request
//! and the pretty-printed response.

mod cli;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::Cli;
use rpcprobe_protocol::response_error;
use rpcprobe_transport::{Harness, HarnessConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let harness = Harness::new(cli.harness_config(HarnessConfig::from_env()));
    let command = cli.command();
    let request = cli.request()?;

    println!("Sending request: {}", request.to_json()?);

    let report = harness.exchange(&command, &request).await;
    if report.outcome.is_err() {
        for line in &report.stderr {
            tracing::warn!(pid = report.pid, "child stderr: {}", line);
        }
    }

    let response = report
        .into_result()
        .with_context(|| format!("exchange with `{}` failed", command.display()))?;

    let rendered = if cli.compact {
        serde_json::to_string(&response)?
    } else {
        serde_json::to_string_pretty(&response)?
    };
    println!("{}", rendered);

    if let Some(error) = response_error(&response) {
        bail!("server returned an error: {}", error);
    }

    Ok(())
}
