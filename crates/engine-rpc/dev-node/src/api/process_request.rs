use std::{
    net::SocketAddr,
    time::Instant,
};

use crate::{
    api::json_validation::{
        JsonRpcRequest,
        MAX_JSON_SIZE,
        detect_id,
        sanitize_error_message,
    },
    chain::{
        ChainError,
        DevChain,
    },
};

use alloy_primitives::{
    B256,
    Bytes,
    U64,
};
use anyhow::Result;
use engine_rpc_core::{
    BlockCommand,
    BlockTag,
    CallRequest,
    HISTORY_CONTRACT,
    JsonRpcErrorCode,
    SENTINEL_HASH,
    decode_history_calldata,
    methods,
};
use http_body_util::BodyExt;
use hyper::{
    Error,
    Request,
};
use metrics::{
    counter,
    gauge,
    histogram,
};
use serde::Serialize;
use serde_json::{
    Value,
    json,
};
use tracing::{
    debug,
    info,
    warn,
};

/// Matches the incoming method sent by a client to a corresponding function.
#[tracing::instrument(
    level = "debug",
    skip_all,
    target = "api::match_method",
    fields(client_addr)
)]
pub async fn match_method<B>(
    req: Request<B>,
    chain: &DevChain,
    client_addr: SocketAddr,
) -> Result<String>
where
    B: hyper::body::Body<Error = Error>,
{
    tracing::Span::current().record("client_addr", tracing::field::display(&client_addr));

    let body = req.into_body().collect().await?.to_bytes();

    if body.len() > MAX_JSON_SIZE {
        warn!(target: "json_rpc", %client_addr, size = body.len(), "Request payload too large");
        return Ok(rpc_error_id(
            &Value::Null,
            JsonRpcErrorCode::InvalidRequest,
            "Request too large",
        ));
    }

    let json_value: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!(target: "json_rpc", %client_addr, error = %e, "Failed to parse JSON");
            return Ok(rpc_error_id(
                &Value::Null,
                JsonRpcErrorCode::ParseError,
                "Parse error",
            ));
        }
    };

    let request_id = detect_id(&json_value);
    let json_rpc = match JsonRpcRequest::validate(json_value) {
        Ok(req) => req,
        Err((code, msg)) => {
            warn!(target: "json_rpc", %client_addr, error = msg, "Invalid JSON-RPC structure");
            return Ok(rpc_error_id(
                &request_id,
                code,
                sanitize_error_message(code, msg),
            ));
        }
    };

    let method = json_rpc.method.as_str();
    let labels = [("rpc_method", method.to_string())];

    gauge!("api_requests_active", &labels).increment(1);
    counter!("api_requests_count", &labels).increment(1);
    info!(target: "json_rpc", %method, %client_addr, json_rpc_id = %json_rpc.id, "Received request");

    let req_start = Instant::now();
    let result = match method {
        methods::ENGINE_CREATE_BLOCK => create_block(&json_rpc, chain),
        methods::ENGINE_FINALIZE_BLOCK => finalize_block(&json_rpc, chain).await,
        methods::ETH_SEND_RAW_TRANSACTION => send_raw_transaction(&json_rpc, chain),
        methods::ETH_BLOCK_NUMBER => {
            json_rpc
                .expect_at_most(0)
                .map_err(invalid_params)
                .map(|()| json!(U64::from(chain.block_number())))
        }
        methods::ETH_CHAIN_ID => {
            json_rpc
                .expect_at_most(0)
                .map_err(invalid_params)
                .map(|()| json!(U64::from(chain.chain_id())))
        }
        methods::NET_VERSION => {
            json_rpc
                .expect_at_most(0)
                .map_err(invalid_params)
                .map(|()| json!(chain.chain_id().to_string()))
        }
        methods::ETH_GET_BLOCK_BY_NUMBER => block_by_number(&json_rpc, chain),
        methods::ETH_GET_BLOCK_BY_HASH => block_by_hash(&json_rpc, chain),
        methods::ETH_CALL => call(&json_rpc, chain),
        _ => {
            warn!(target: "json_rpc", %method, %client_addr, "Method not found");
            Err(MethodError::new(
                JsonRpcErrorCode::MethodNotFound,
                "Method not found",
            ))
        }
    };

    let elapsed = req_start.elapsed();
    gauge!("api_requests_active", &labels).decrement(1);
    histogram!("api_request_duration_seconds", &labels).record(elapsed.as_secs_f64());

    Ok(match result {
        Ok(result) => {
            debug!(target: "json_rpc", %method, ?elapsed, "Request served");
            rpc_response(&json_rpc, result)
        }
        Err(err) => {
            counter!("api_request_errors_count", &labels).increment(1);
            debug!(target: "json_rpc", %method, code = %err.code, message = %err.message, "Request failed");
            rpc_error_id(&json_rpc.id, err.code, &err.message)
        }
    })
}

/// Error returned by a method handler, reported as the reply's error object.
#[derive(Debug)]
struct MethodError {
    code: JsonRpcErrorCode,
    message: String,
}

impl MethodError {
    fn new(code: JsonRpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<ChainError> for MethodError {
    fn from(err: ChainError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

fn invalid_params(msg: &str) -> MethodError {
    MethodError::new(JsonRpcErrorCode::InvalidParams, msg)
}

type MethodResult = std::result::Result<Value, MethodError>;

fn create_block(json_rpc: &JsonRpcRequest, chain: &DevChain) -> MethodResult {
    let command = BlockCommand::from_params(json_rpc.params()).map_err(invalid_params)?;
    let created = chain.create_block(command)?;
    Ok(json!(created))
}

async fn finalize_block(json_rpc: &JsonRpcRequest, chain: &DevChain) -> MethodResult {
    json_rpc.expect_at_most(2).map_err(invalid_params)?;
    let hash: B256 = json_rpc.deserialize_param(0).map_err(invalid_params)?;
    // Justifications are not used by this node; any value is accepted.
    chain.finalize_block(hash).await?;
    Ok(json!(true))
}

fn send_raw_transaction(json_rpc: &JsonRpcRequest, chain: &DevChain) -> MethodResult {
    json_rpc.expect_at_most(1).map_err(invalid_params)?;
    let raw: Bytes = json_rpc.deserialize_param(0).map_err(invalid_params)?;
    let hash = chain.submit_transaction(&raw)?;
    Ok(json!(hash))
}

fn block_by_number(json_rpc: &JsonRpcRequest, chain: &DevChain) -> MethodResult {
    json_rpc.expect_at_most(2).map_err(invalid_params)?;
    let tag: BlockTag = json_rpc.deserialize_param(0).map_err(invalid_params)?;
    let _full: Option<bool> = json_rpc.optional_param(1).map_err(invalid_params)?;
    Ok(json!(chain.block_by_number(tag)))
}

fn block_by_hash(json_rpc: &JsonRpcRequest, chain: &DevChain) -> MethodResult {
    json_rpc.expect_at_most(2).map_err(invalid_params)?;
    let hash: B256 = json_rpc.deserialize_param(0).map_err(invalid_params)?;
    let _full: Option<bool> = json_rpc.optional_param(1).map_err(invalid_params)?;
    Ok(json!(chain.block_by_hash(&hash)))
}

/// Serves the block-hash history query. The block tag is accepted and ignored.
fn call(json_rpc: &JsonRpcRequest, chain: &DevChain) -> MethodResult {
    json_rpc.expect_at_most(2).map_err(invalid_params)?;
    let call: CallRequest = json_rpc.deserialize_param(0).map_err(invalid_params)?;
    let _tag: Option<BlockTag> = json_rpc.optional_param(1).map_err(invalid_params)?;

    if call.to != Some(HISTORY_CONTRACT) {
        return Err(MethodError::new(
            JsonRpcErrorCode::ServerError,
            "execution is not supported",
        ));
    }

    let height = call
        .calldata()
        .and_then(|calldata| decode_history_calldata(calldata))
        .ok_or_else(|| invalid_params("Calldata must be a single 32-byte block number"))?;

    // Heights beyond u64 can never be in the window.
    let hash = u64::try_from(height).map_or(SENTINEL_HASH, |height| chain.block_hash(height));
    Ok(json!(Bytes::copy_from_slice(hash.as_slice())))
}

fn rpc_response<T: Serialize>(request: &JsonRpcRequest, result: T) -> String {
    json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": request.id
    })
    .to_string()
}

fn rpc_error_id(id: &Value, code: JsonRpcErrorCode, message: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code.code(),
            "message": message
        },
        "id": id
    })
    .to_string()
}
