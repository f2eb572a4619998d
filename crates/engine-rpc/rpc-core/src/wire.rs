use serde::{
    Deserialize,
    Deserializer,
    Serialize,
};
use serde_json::Value;
use std::fmt;

/// The only protocol version spoken on the wire.
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
    /// Implementation-defined server error.
    ServerError = -32000,
}

impl JsonRpcErrorCode {
    pub fn code(self) -> i64 {
        self as i64
    }
}

impl fmt::Display for JsonRpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as i32)
    }
}

/// JSON-RPC request frame.
///
/// Parameters are always positional. The client fills `id` from its
/// correlation counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest<P = Vec<Value>> {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: P,
}

impl<P> JsonRpcRequest<P> {
    pub fn new(id: u64, method: impl Into<String>, params: P) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC error structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorObject {
    pub fn new(code: JsonRpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }
}

impl fmt::Display for JsonRpcErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// JSON-RPC reply frame.
///
/// `result` distinguishes a member that is absent (`None`) from one that is
/// present with a `null` value (`Some(Value::Null)`). Only the former counts
/// as a missing result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Value,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorObject>,
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// What a reply carries once the error/result precedence is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyPayload {
    Result(Value),
    Error(JsonRpcErrorObject),
    /// Neither member was present.
    Empty,
}

impl JsonRpcReply {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: JsonRpcErrorObject) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Correlation id of the reply, if it is a number.
    pub fn correlation_id(&self) -> Option<u64> {
        self.id.as_u64()
    }

    /// Splits the reply into its payload. An error always wins over a result.
    pub fn into_payload(self) -> ReplyPayload {
        match (self.error, self.result) {
            (Some(error), _) => ReplyPayload::Error(error),
            (None, Some(result)) => ReplyPayload::Result(result),
            (None, None) => ReplyPayload::Empty,
        }
    }
}

/// Truthiness of a command result.
///
/// `null`, `false`, `0`, `""`, `[]` and `{}` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_result_is_present() {
        let reply: JsonRpcReply =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 3, "result": null})).unwrap();

        assert_eq!(reply.correlation_id(), Some(3));
        assert_eq!(reply.into_payload(), ReplyPayload::Result(Value::Null));
    }

    #[test]
    fn missing_result_and_error_is_empty() {
        let reply: JsonRpcReply =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 3})).unwrap();

        assert_eq!(reply.into_payload(), ReplyPayload::Empty);
    }

    #[test]
    fn error_wins_over_result() {
        let reply: JsonRpcReply = serde_json::from_value(json!({
            "id": 1,
            "result": true,
            "error": {"code": -32000, "message": "boom"}
        }))
        .unwrap();

        match reply.into_payload() {
            ReplyPayload::Error(err) => {
                assert_eq!(err.code, -32000);
                assert_eq!(err.message, "boom");
            }
            other => panic!("expected error payload, got {other:?}"),
        }
    }

    #[test]
    fn success_reply_serializes_without_error_member() {
        let reply = JsonRpcReply::success(json!(7), Value::Null);
        let encoded = serde_json::to_value(&reply).unwrap();

        assert_eq!(encoded, json!({"jsonrpc": "2.0", "id": 7, "result": null}));
    }

    #[test]
    fn request_frame_layout() {
        let request = JsonRpcRequest::new(9, "engine_createBlock", vec![json!(true)]);
        let encoded = serde_json::to_value(&request).unwrap();

        assert_eq!(
            encoded,
            json!({"jsonrpc": "2.0", "id": 9, "method": "engine_createBlock", "params": [true]})
        );
    }

    #[test]
    fn truthiness() {
        for falsy in [
            json!(null),
            json!(false),
            json!(0),
            json!(0.0),
            json!(""),
            json!([]),
            json!({}),
        ] {
            assert!(!is_truthy(&falsy), "{falsy} should be falsy");
        }
        for truthy in [json!(true), json!(1), json!("0x1"), json!([0]), json!({"hash": "0x"})] {
            assert!(is_truthy(&truthy), "{truthy} should be truthy");
        }
    }
}
