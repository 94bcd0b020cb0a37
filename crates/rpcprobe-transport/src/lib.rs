//! Child-process harness for one-shot JSON-RPC exchanges over stdio
//!
//! Spawns a tool server, sends it a single newline-delimited JSON-RPC
//! request, waits (bounded) for the matching response line, and terminates
//! the process on every exit path.
//!
//! # Architecture
//!
//! - **Harness**: [`Harness`] runs the exchange and tracks its [`ExchangeState`]
//! - **Process**: [`ChildProcess`] owns the child and its pipes, killing it on drop
//! - **Configuration**: [`HarnessConfig`] bounds every wait
//! - **Errors**: [`HarnessError`] tags each failure with an [`ErrorKind`]

#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! # Usage
//!
//! ```no_run
//! use rpcprobe_protocol::RollDiceArguments;
//! use rpcprobe_transport::{CommandSpec, run_one_shot};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let command = CommandSpec::from_argv(["node", "build/src/index.js", "--stdio"])
//!     .expect("argv is not empty");
//! let request = RollDiceArguments { dice_count: 3, dice_sides: 6 }.into_request()?;
//! let response = run_one_shot(&command, &request).await?;
//! println!("{}", serde_json::to_string_pretty(&response)?);
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod harness;
pub mod process;

// Re-export commonly used types
pub use command::CommandSpec;
pub use config::{HarnessConfig, Readiness};
pub use error::{ErrorKind, HarnessError, Result, WaitPhase};
pub use harness::{ExchangeReport, ExchangeState, Harness, Termination, run_one_shot};
pub use process::ChildProcess;
