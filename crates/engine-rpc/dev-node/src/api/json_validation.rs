use engine_rpc_core::{
    JSONRPC_VERSION,
    JsonRpcErrorCode,
};
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;

/// Maximum allowed JSON payload size (10MB)
pub const MAX_JSON_SIZE: usize = 10 * 1024 * 1024;

/// Validated JSON-RPC request structure
#[derive(Debug, Deserialize, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Option<Vec<Value>>,
    pub id: Value,
}

/// Safe parameter access result
pub enum ParamAccess<'a> {
    Value(&'a Value),
    Missing,
}

impl JsonRpcRequest {
    /// Validates and parses a JSON-RPC request from raw JSON value
    pub fn validate(json: Value) -> Result<Self, (JsonRpcErrorCode, &'static str)> {
        let obj = json.as_object().ok_or((
            JsonRpcErrorCode::InvalidRequest,
            "Request must be a JSON object",
        ))?;

        let jsonrpc = obj.get("jsonrpc").and_then(|v| v.as_str()).ok_or((
            JsonRpcErrorCode::InvalidRequest,
            "Missing or invalid 'jsonrpc' field",
        ))?;

        if jsonrpc != JSONRPC_VERSION {
            return Err((
                JsonRpcErrorCode::InvalidRequest,
                "JSON-RPC version must be 2.0",
            ));
        }

        let method = obj.get("method").and_then(|v| v.as_str()).ok_or((
            JsonRpcErrorCode::InvalidRequest,
            "Missing or invalid 'method' field",
        ))?;

        if method.is_empty() {
            return Err((JsonRpcErrorCode::InvalidRequest, "Method must not be empty"));
        }

        // Validate id (can be number, string, or null)
        let id = obj.get("id").cloned().unwrap_or(Value::Null);
        if !(id.is_number() || id.is_string() || id.is_null()) {
            return Err((
                JsonRpcErrorCode::InvalidRequest,
                "Id must be a number, a string or null",
            ));
        }

        let params = match obj.get("params") {
            Some(Value::Array(arr)) => Some(arr.clone()),
            Some(Value::Null) | None => None,
            Some(_) => {
                return Err((
                    JsonRpcErrorCode::InvalidParams,
                    "Params must be an array or null",
                ));
            }
        };

        Ok(JsonRpcRequest {
            jsonrpc: jsonrpc.to_string(),
            method: method.to_string(),
            params,
            id,
        })
    }

    /// Positional parameters, empty when none were sent.
    pub fn params(&self) -> &[Value] {
        self.params.as_deref().unwrap_or_default()
    }

    /// Safely access a parameter by index
    pub fn get_param(&self, index: usize) -> ParamAccess<'_> {
        self.params()
            .get(index)
            .map_or(ParamAccess::Missing, ParamAccess::Value)
    }

    /// Safely deserialize a parameter into a specific type
    pub fn deserialize_param<T: for<'de> Deserialize<'de>>(
        &self,
        index: usize,
    ) -> Result<T, &'static str> {
        match self.get_param(index) {
            ParamAccess::Value(v) => {
                serde_json::from_value(v.clone()).map_err(|_| "Failed to deserialize parameter")
            }
            ParamAccess::Missing => Err("Missing parameter"),
        }
    }

    /// Like [`Self::deserialize_param`], but a missing or `null` parameter is `None`.
    pub fn optional_param<T: for<'de> Deserialize<'de>>(
        &self,
        index: usize,
    ) -> Result<Option<T>, &'static str> {
        match self.get_param(index) {
            ParamAccess::Value(Value::Null) | ParamAccess::Missing => Ok(None),
            ParamAccess::Value(v) => {
                serde_json::from_value(v.clone())
                    .map(Some)
                    .map_err(|_| "Failed to deserialize parameter")
            }
        }
    }

    /// Rejects calls with more than `max` parameters.
    pub fn expect_at_most(&self, max: usize) -> Result<(), &'static str> {
        if self.params().len() > max {
            return Err("Too many parameters");
        }
        Ok(())
    }
}

/// Sanitize error messages to prevent information leakage
/// Id of a request that failed validation, if it carried a usable one.
///
/// Structured or missing ids come back as `null`.
pub fn detect_id(json: &Value) -> Value {
    match json.get("id") {
        Some(id) if id.is_number() || id.is_string() => id.clone(),
        _ => Value::Null,
    }
}

pub fn sanitize_error_message(code: JsonRpcErrorCode, detailed_msg: &str) -> &str {
    match code {
        JsonRpcErrorCode::ParseError => "Parse error",
        JsonRpcErrorCode::InvalidRequest => "Invalid request",
        JsonRpcErrorCode::MethodNotFound => "Method not found",
        JsonRpcErrorCode::InvalidParams | JsonRpcErrorCode::ServerError => detailed_msg,
        JsonRpcErrorCode::InternalError => "Internal error",
    }
}
