//! Command-line parsing
//!
//! Flags layer over [`HarnessConfig::from_env`]; the server command follows `--`.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rpcprobe_protocol::{Request, RollDiceArguments};
use rpcprobe_transport::{CommandSpec, HarnessConfig};
use serde_json::{Map, Value};
use std::time::Duration;

/// Server started when no command follows `--`
pub const DEFAULT_SERVER: [&str; 3] = ["node", "build/src/index.js", "--stdio"];

/// Send one JSON-RPC request to a stdio tool server and print the reply
#[derive(Debug, Parser)]
#[command(name = "rpcprobe", version)]
pub struct Cli {
    /// How long to wait for the response, in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// How long to wait for the readiness marker, in milliseconds
    #[arg(long, global = true)]
    pub startup_timeout_ms: Option<u64>,

    /// Wait for a stderr line containing this text before sending
    #[arg(long, global = true)]
    pub ready_marker: Option<String>,

    /// Request id
    #[arg(long, global = true)]
    pub id: Option<u64>,

    /// Print the response on one line
    #[arg(long, global = true)]
    pub compact: bool,

    #[command(subcommand)]
    pub action: Action,
}

/// What to send
#[derive(Debug, Subcommand)]
pub enum Action {
    /// Call an arbitrary method
    Call {
        /// Method name, e.g. `tools/list`
        method: String,

        /// Parameters as a JSON object
        #[arg(long)]
        params: Option<String>,

        /// Server command line
        #[arg(last = true)]
        server: Vec<String>,
    },

    /// Call the `roll_dice` tool
    RollDice {
        /// Number of dice
        #[arg(long, default_value_t = 3)]
        count: u32,

        /// Sides per die
        #[arg(long, default_value_t = 6)]
        sides: u32,

        /// Server command line
        #[arg(last = true)]
        server: Vec<String>,
    },
}

impl Cli {
    /// Environment configuration with command-line overrides applied
    pub fn harness_config(&self, base: HarnessConfig) -> HarnessConfig {
        let mut config = base;
        if let Some(ms) = self.timeout_ms {
            config = config.with_response_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.startup_timeout_ms {
            config = config.with_startup_timeout(Duration::from_millis(ms));
        }
        if let Some(marker) = &self.ready_marker {
            config = config.with_ready_marker(marker.clone());
        }
        config
    }

    /// Request described by the subcommand
    pub fn request(&self) -> Result<Request> {
        let request = match &self.action {
            Action::Call { method, params, .. } => {
                Request::new(method, parse_params(params.as_deref())?)
            }
            Action::RollDice { count, sides, .. } => RollDiceArguments {
                dice_count: *count,
                dice_sides: *sides,
            }
            .into_request()?,
        };

        Ok(match self.id {
            Some(id) => request.with_id(id),
            None => request,
        })
    }

    /// Server command line
    pub fn command(&self) -> CommandSpec {
        let server = match &self.action {
            Action::Call { server, .. } | Action::RollDice { server, .. } => server,
        };

        CommandSpec::from_argv(server.iter().cloned()).unwrap_or_else(|| {
            CommandSpec::new(DEFAULT_SERVER[0]).with_args(DEFAULT_SERVER[1..].iter().copied())
        })
    }
}

fn parse_params(params: Option<&str>) -> Result<Map<String, Value>> {
    let Some(text) = params else {
        return Ok(Map::new());
    };

    match serde_json::from_str(text).context("--params is not valid JSON")? {
        Value::Object(map) => Ok(map),
        other => bail!("--params must be a JSON object, got {}", other),
    }
}
