use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::{
    models::{SimplifiedTool, ToolDefinition},
    registry::{flat_tool_name, split_tool_name},
    repair::parse_with_repair,
    AppState,
};

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let tools = state.catalog.read().await.len();
    Json(json!({ "status": "ok", "tools": tools }))
}

pub async fn list_tools(State(state): State<AppState>) -> impl IntoResponse {
    let catalog = state.catalog_snapshot().await;
    Json(json!({ "tools": simplified_tools_list(&catalog, state.settings.port) }))
}

pub async fn invoke_tool(
    State(state): State<AppState>,
    Path((category, tool)): Path<(String, String)>,
    body: Bytes,
) -> impl IntoResponse {
    let name = flat_tool_name(&category, &tool);
    let raw = String::from_utf8_lossy(&body);

    let args = if raw.trim().is_empty() {
        json!({})
    } else {
        match parse_with_repair(&raw) {
            Ok(args) => args,
            Err(err) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": err.to_string(), "tool": name })),
                )
                    .into_response();
            }
        }
    };

    if state.settings.enable_debug_log {
        debug!(tool = %name, args = %args, "REST tool call");
    }

    let payload = match state.dispatcher.execute_tool_call(&name, args).await {
        Ok(result) => json!({ "success": true, "tool": name, "result": result }),
        Err(err) => json!({ "success": false, "error": err.to_string(), "tool": name }),
    };

    (StatusCode::OK, Json(payload)).into_response()
}

/// Fallback for unrouted paths and unsupported methods. A `POST` under `/api`
/// with fewer than three non-empty segments is a malformed invocation path;
/// everything else, longer `/api` paths included, is not found.
pub async fn unmatched(method: Method, uri: Uri) -> Response {
    if method == Method::POST && is_short_api_path(uri.path()) {
        return invalid_api_path();
    }
    not_found()
}

fn is_short_api_path(path: &str) -> bool {
    let mut segments = path.split('/').filter(|segment| !segment.is_empty());
    segments.next() == Some("api") && segments.count() < 2
}

fn invalid_api_path() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "Invalid API path. Expected /api/{category}/{tool}" })),
    )
        .into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}

pub fn simplified_tools_list(catalog: &[ToolDefinition], port: u16) -> Vec<SimplifiedTool> {
    catalog
        .iter()
        .map(|tool| {
            let (category, tool_name) = split_tool_name(&tool.name);
            let api_path = format!("/api/{category}/{tool_name}");
            let example = generate_example(&tool.input_schema);
            let curl_example = format!(
                "curl -X POST http://127.0.0.1:{port}{api_path} -H \"Content-Type: application/json\" -d '{example}'"
            );

            SimplifiedTool {
                name: tool.name.clone(),
                category: category.to_string(),
                tool_name: tool_name.to_string(),
                description: tool.description.clone(),
                api_path,
                curl_example,
            }
        })
        .collect()
}

/// Builds a sample arguments object from a JSON schema's `properties`.
pub fn generate_example(schema: &Value) -> Value {
    let is_object = schema
        .get("type")
        .and_then(Value::as_str)
        .map_or(true, |kind| kind == "object");
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return json!({});
    };
    if !is_object {
        return json!({});
    }

    let example: Map<String, Value> = properties
        .iter()
        .map(|(name, property)| (name.clone(), sample_value(property)))
        .collect();
    Value::Object(example)
}

fn sample_value(property: &Value) -> Value {
    if let Some(default) = property.get("default") {
        return default.clone();
    }

    match property.get("type").and_then(Value::as_str) {
        Some("string") => json!("example"),
        Some("number" | "integer") => json!(0),
        Some("boolean") => json!(false),
        Some("object") => json!({}),
        _ => json!("value"),
    }
}
