//! MCP tool-call helpers
//!
//! Tool servers speaking the Model Context Protocol expose tools through the
//! `tools/call` method with `{"name": ..., "arguments": {...}}` params.

use crate::error::Result;
use crate::jsonrpc::Request;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Method name for invoking a tool
pub const TOOLS_CALL: &str = "tools/call";

/// Name of the dice server's rolling tool
pub const ROLL_DICE: &str = "roll_dice";

impl Request {
    /// Build a `tools/call` request for `name` with the given arguments
    pub fn tool_call<A: Serialize>(name: impl Into<String>, arguments: &A) -> Result<Self> {
        let mut params = Map::new();
        params.insert("name".to_string(), Value::String(name.into()));
        params.insert("arguments".to_string(), serde_json::to_value(arguments)?);
        Ok(Self::new(TOOLS_CALL, params))
    }
}

/// Arguments of the `roll_dice` tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollDiceArguments {
    /// How many dice to roll
    pub dice_count: u32,
    /// Faces per die
    pub dice_sides: u32,
}

impl Default for RollDiceArguments {
    fn default() -> Self {
        Self {
            dice_count: 3,
            dice_sides: 6,
        }
    }
}

impl RollDiceArguments {
    /// Wrap these arguments in a `tools/call` request for `roll_dice`
    pub fn into_request(self) -> Result<Request> {
        Request::tool_call(ROLL_DICE, &self)
    }
}
