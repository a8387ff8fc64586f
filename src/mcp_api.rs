use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{Response, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{
    error::{Result, ServerError},
    repair::{excerpt, parse_with_repair},
    AppState,
};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = env!("CARGO_PKG_NAME");
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const PARSE_ERROR: i64 = -32700;
/// Used for every failure after the method is known, unknown methods
/// included.
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcSuccess {
    jsonrpc: &'static str,
    id: Value,
    result: Value,
}

#[derive(Debug, Serialize)]
struct JsonRpcFailure {
    jsonrpc: &'static str,
    id: Value,
    error: JsonRpcError,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default = "empty_arguments")]
    arguments: Value,
}

fn empty_arguments() -> Value {
    json!({})
}

pub async fn mcp(State(state): State<AppState>, body: Bytes) -> Response<Body> {
    let raw = String::from_utf8_lossy(&body);
    if state.settings.enable_debug_log {
        debug!(body = %raw, "MCP request body");
    }

    let request = match parse_request(&raw) {
        Ok(request) => request,
        Err(err) => {
            warn!("Rejecting unparseable MCP request: {err}");
            return jsonrpc_error(
                Value::Null,
                PARSE_ERROR,
                err.to_string(),
                StatusCode::BAD_REQUEST,
            );
        }
    };

    let request_id = request.id.clone().unwrap_or(Value::Null);
    let method = request.method.clone();

    let response = match handle_message(&state, request).await {
        Ok(result) => jsonrpc_ok(request_id, result),
        Err(err) => {
            warn!(method = %method, "MCP request failed: {err}");
            jsonrpc_error(request_id, INTERNAL_ERROR, err.to_string(), StatusCode::OK)
        }
    };

    if state.settings.enable_debug_log {
        debug!(method = %method, "MCP request handled");
    }

    response
}

fn parse_request(raw: &str) -> Result<JsonRpcRequest> {
    let value = parse_with_repair(raw)?;
    serde_json::from_value(value).map_err(|err| ServerError::TransportParse {
        message: format!("Invalid JSON-RPC request: {err}"),
        excerpt: excerpt(raw),
    })
}

pub async fn handle_message(state: &AppState, request: JsonRpcRequest) -> Result<Value> {
    match request.method.as_str() {
        "initialize" => Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION
            }
        })),
        "ping" => Ok(json!({})),
        "tools/list" => {
            let tools = state.catalog_snapshot().await;
            Ok(json!({ "tools": tools }))
        }
        "tools/call" => {
            let params: ToolCallParams =
                serde_json::from_value(request.params.unwrap_or(Value::Null))
                    .map_err(|err| ServerError::InvalidParams(format!("tools/call: {err}")))?;

            let result = state
                .dispatcher
                .execute_tool_call(&params.name, params.arguments)
                .await?;

            Ok(json!({
                "content": [
                    { "type": "text", "text": result.to_string() }
                ]
            }))
        }
        other => Err(ServerError::UnknownMethod(other.to_string())),
    }
}

fn jsonrpc_ok(id: Value, result: Value) -> Response<Body> {
    let payload = JsonRpcSuccess {
        jsonrpc: "2.0",
        id,
        result,
    };
    json_response(StatusCode::OK, &payload)
}

fn jsonrpc_error(
    id: Value,
    code: i64,
    message: impl Into<String>,
    status: StatusCode,
) -> Response<Body> {
    let payload = JsonRpcFailure {
        jsonrpc: "2.0",
        id,
        error: JsonRpcError {
            code,
            message: message.into(),
        },
    };
    json_response(status, &payload)
}

fn json_response<T: Serialize>(status: StatusCode, payload: &T) -> Response<Body> {
    let body = serde_json::to_vec(payload).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed building MCP response"})),
            )
                .into_response()
        })
}
