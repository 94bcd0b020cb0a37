//! JSON-RPC 2.0 request and response envelope
//!
//! Every message travels as newline-delimited JSON: one document per line.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Protocol version carried in every envelope
pub const JSONRPC_VERSION: &str = "2.0";

/// Identifier correlating a request with its response
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id
    Number(u64),
    /// String id
    String(String),
}

impl RequestId {
    /// Read an id out of a decoded message's `id` member.
    ///
    /// Returns `None` for `null` and for values JSON-RPC does not allow as ids.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(Self::Number),
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::Number(1)
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self::Number(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::String(id.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// A JSON-RPC request
///
/// Immutable once built: the builder methods consume `self` and the fields
/// are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    jsonrpc: String,
    method: String,
    params: Map<String, Value>,
    id: RequestId,
}

impl Request {
    /// Create a request with the default id (`1`)
    pub fn new(method: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: RequestId::default(),
        }
    }

    /// Replace the request id
    pub fn with_id(mut self, id: impl Into<RequestId>) -> Self {
        self.id = id.into();
        self
    }

    /// Method name
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Parameter mapping
    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Request id
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Serialize to compact JSON text (no trailing newline)
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize to a single newline-terminated line, ready for the wire
    ///
    /// Compact serialization escapes every newline inside strings, so the
    /// only `\n` in the output is the terminator.
    pub fn to_line(&self) -> Result<String> {
        let mut line = self.to_json()?;
        line.push('\n');
        Ok(line)
    }
}

/// What a decoded line turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Carries `result` or `error`
    Response,
    /// Has a `method` and no `id`
    Notification,
    /// Has a `method` and an `id` (a call from the peer)
    Request,
    /// None of the above
    Invalid,
}

/// Classify a decoded JSON document by its envelope members
pub fn classify(message: &Value) -> MessageKind {
    let Some(obj) = message.as_object() else {
        return MessageKind::Invalid;
    };

    let has_method = obj.get("method").is_some_and(Value::is_string);
    let has_id = obj.contains_key("id");

    match (has_method, has_id) {
        (true, false) => MessageKind::Notification,
        (true, true) => MessageKind::Request,
        (false, _) if obj.contains_key("result") || obj.contains_key("error") => {
            MessageKind::Response
        }
        _ => MessageKind::Invalid,
    }
}

/// Check that `message` is a well-formed JSON-RPC 2.0 response
///
/// Only the envelope is checked; the `result` payload belongs to the server.
pub fn validate_response(message: &Value) -> Result<()> {
    let obj = message
        .as_object()
        .ok_or_else(|| ProtocolError::InvalidResponse("not a JSON object".to_string()))?;

    match obj.get("jsonrpc") {
        Some(Value::String(v)) if v == JSONRPC_VERSION => {}
        Some(other) => {
            return Err(ProtocolError::VersionMismatch {
                got: Some(other.to_string()),
            });
        }
        None => return Err(ProtocolError::VersionMismatch { got: None }),
    }

    if !obj.contains_key("id") {
        return Err(ProtocolError::MissingField("id"));
    }

    match (obj.get("result"), obj.get("error")) {
        (Some(_), None) => Ok(()),
        (None, Some(Value::Object(err))) => {
            if err.get("code").is_some_and(Value::is_i64) {
                Ok(())
            } else {
                Err(ProtocolError::InvalidResponse(
                    "error object without integer code".to_string(),
                ))
            }
        }
        (None, Some(_)) => Err(ProtocolError::InvalidResponse(
            "error member is not an object".to_string(),
        )),
        (Some(_), Some(_)) => Err(ProtocolError::InvalidResponse(
            "both result and error present".to_string(),
        )),
        (None, None) => Err(ProtocolError::InvalidResponse(
            "neither result nor error present".to_string(),
        )),
    }
}

/// The `id` of a decoded response, `None` when absent or `null`
pub fn response_id(message: &Value) -> Option<RequestId> {
    message.get("id").and_then(RequestId::from_value)
}

/// The `error` member of a decoded response, if the server reported one
pub fn response_error(message: &Value) -> Option<&Value> {
    message.get("error")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("params must be an object"),
        }
    }

    #[test]
    fn test_request_wire_format() {
        let req = Request::new("tools/list", Map::new());
        let wire: Value = serde_json::from_str(&req.to_json().unwrap()).unwrap();

        assert_eq!(
            wire,
            json!({"jsonrpc": "2.0", "method": "tools/list", "params": {}, "id": 1})
        );
    }

    #[test]
    fn test_request_line_has_single_trailing_newline() {
        let req = Request::new(
            "echo",
            params(json!({"text": "line one\nline two", "nested": {"k": "a\nb"}})),
        );
        let line = req.to_line().unwrap();

        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_request_with_string_id() {
        let req = Request::new("ping", Map::new()).with_id("abc");
        assert_eq!(req.id(), &RequestId::String("abc".to_string()));
        assert!(req.to_json().unwrap().contains("\"id\":\"abc\""));
    }

    #[test]
    fn test_request_accessors() {
        let req = Request::new("tools/call", params(json!({"name": "roll_dice"}))).with_id(7);
        assert_eq!(req.method(), "tools/call");
        assert_eq!(req.params().get("name"), Some(&json!("roll_dice")));
        assert_eq!(req.id(), &RequestId::Number(7));
    }

    #[rstest]
    #[case(Request::new("ping", Map::new()))]
    #[case(Request::new("ping", Map::new()).with_id("abc"))]
    #[case(Request::tool_call("roll_dice", &json!({"dice_count": 2})).unwrap())]
    fn test_every_request_carries_version(#[case] req: Request) {
        let wire: Value = serde_json::from_str(&req.to_json().unwrap()).unwrap();
        assert_eq!(wire["jsonrpc"], json!(JSONRPC_VERSION));
    }

    #[rstest]
    #[case(json!({"jsonrpc": "2.0", "result": {"total": 11}, "id": 1}), MessageKind::Response)]
    #[case(json!({"jsonrpc": "2.0", "error": {"code": -32601, "message": "nope"}, "id": null}), MessageKind::Response)]
    #[case(json!({"jsonrpc": "2.0", "method": "notifications/message", "params": {}}), MessageKind::Notification)]
    #[case(json!({"jsonrpc": "2.0", "method": "ping", "id": 9}), MessageKind::Request)]
    #[case(json!({"jsonrpc": "2.0", "id": 1}), MessageKind::Invalid)]
    #[case(json!([1, 2, 3]), MessageKind::Invalid)]
    #[case(json!("text"), MessageKind::Invalid)]
    fn test_classify(#[case] message: Value, #[case] expected: MessageKind) {
        assert_eq!(classify(&message), expected);
    }

    #[test]
    fn test_validate_accepts_result_and_error() {
        assert!(validate_response(&json!({"jsonrpc": "2.0", "result": null, "id": 1})).is_ok());
        assert!(
            validate_response(&json!({
                "jsonrpc": "2.0",
                "error": {"code": -32602, "message": "invalid params"},
                "id": 1
            }))
            .is_ok()
        );
    }

    #[rstest]
    #[case(json!({"result": 1, "id": 1}), ProtocolError::VersionMismatch { got: None })]
    #[case(json!({"jsonrpc": "1.0", "result": 1, "id": 1}), ProtocolError::VersionMismatch { got: Some("\"1.0\"".to_string()) })]
    #[case(json!({"jsonrpc": "2.0", "result": 1}), ProtocolError::MissingField("id"))]
    fn test_validate_rejects_envelope(#[case] message: Value, #[case] expected: ProtocolError) {
        assert_eq!(validate_response(&message), Err(expected));
    }

    #[test]
    fn test_validate_rejects_ambiguous_bodies() {
        let both = json!({"jsonrpc": "2.0", "result": 1, "error": {"code": 1}, "id": 1});
        let neither = json!({"jsonrpc": "2.0", "id": 1});
        let bad_error = json!({"jsonrpc": "2.0", "error": "boom", "id": 1});

        for message in [both, neither, bad_error] {
            assert!(matches!(
                validate_response(&message),
                Err(ProtocolError::InvalidResponse(_))
            ));
        }
    }

    #[test]
    fn test_response_id_and_error() {
        let ok = json!({"jsonrpc": "2.0", "result": {}, "id": 3});
        let err = json!({"jsonrpc": "2.0", "error": {"code": -1, "message": "x"}, "id": null});

        assert_eq!(response_id(&ok), Some(RequestId::Number(3)));
        assert_eq!(response_id(&err), None);
        assert!(response_error(&ok).is_none());
        assert_eq!(response_error(&err).and_then(|e| e.get("code")), Some(&json!(-1)));
    }
}
