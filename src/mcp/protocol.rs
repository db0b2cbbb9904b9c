//! JSON-RPC 2.0 types for the MCP protocol.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 request. A request without `id` is a notification; an
/// explicit `"id": null` still gets a response.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default, deserialize_with = "present_id")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Only runs when `id` is present, so `null` becomes `Some(Value::Null)`.
fn present_id<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl JsonRpcRequest {
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 success response.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    pub result: Value,
}

/// JSON-RPC 2.0 error response.
#[derive(Debug, Serialize)]
pub struct JsonRpcErrorResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    pub error: JsonRpcError,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

// Standard JSON-RPC error codes
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Error carried through dispatch: a code plus a message.
pub type RpcError = (i32, String);

impl JsonRpcResponse {
    #[must_use]
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: id.unwrap_or(Value::Null),
            result,
        }
    }
}

impl JsonRpcErrorResponse {
    #[must_use]
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: id.unwrap_or(Value::Null),
            error: JsonRpcError {
                code,
                message: message.into(),
            },
        }
    }
}

const SERIALIZATION_FAILED: &str =
    r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"serialization failed"}}"#;

/// Serialize either a success or error response as one line of JSON.
#[must_use]
pub fn serialize_response(id: Option<Value>, result: Result<Value, RpcError>) -> String {
    let serialized = match result {
        Ok(data) => serde_json::to_string(&JsonRpcResponse::success(id, data)),
        Err((code, message)) => {
            serde_json::to_string(&JsonRpcErrorResponse::error(id, code, message))
        }
    };
    serialized.unwrap_or_else(|_| SERIALIZATION_FAILED.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_without_id_is_notification() {
        let input = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        let req: JsonRpcRequest = serde_json::from_str(input).unwrap();
        assert!(req.is_notification());
        assert_eq!(req.params, Value::Null);

        let input = r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#;
        let req: JsonRpcRequest = serde_json::from_str(input).unwrap();
        assert!(!req.is_notification());
        assert_eq!(req.id, Some(Value::Null));
    }

    #[test]
    fn test_serialize_error_keeps_null_id() {
        let line = serialize_response(None, Err((PARSE_ERROR, "parse error".to_string())));
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], PARSE_ERROR);
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_serialize_success() {
        let line = serialize_response(Some(json!("abc")), Ok(json!({"ok": true})));
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["id"], "abc");
        assert_eq!(value["result"]["ok"], true);
        assert!(value.get("error").is_none());
    }
}
