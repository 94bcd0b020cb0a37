//! JSON-RPC 2.0 wire types for the rpcprobe stdio harness
//!
//! Pure data structures, no I/O:
//!
//! - **Envelope**: [`jsonrpc`] - requests, ids, response validation
//! - **Tools**: [`tools`] - MCP `tools/call` builders
//! - **Errors**: [`error`] - encoding and envelope errors

#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! # Usage
//!
//! ```
//! use rpcprobe_protocol::RollDiceArguments;
//!
//! let request = RollDiceArguments { dice_count: 3, dice_sides: 6 }.into_request()?;
//! assert_eq!(request.method(), "tools/call");
//! # Ok::<(), rpcprobe_protocol::ProtocolError>(())
//! ```

pub mod error;
pub mod jsonrpc;
pub mod tools;

pub use error::{ProtocolError, Result};
pub use jsonrpc::{
    JSONRPC_VERSION, MessageKind, Request, RequestId, classify, response_error, response_id,
    validate_response,
};
pub use tools::{ROLL_DICE, RollDiceArguments, TOOLS_CALL};
