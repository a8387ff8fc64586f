use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{HeaderMap, Request, StatusCode},
};
use serde_json::{json, Value};
use tokio::sync::Notify;
use tower::ServiceExt;

use crate::{
    build_router,
    config::ServerSettings,
    models::ToolDefinition,
    registry::{ToolProvider, ToolRegistry},
    AppState,
};

#[derive(Debug, Default)]
pub struct MathProvider {
    calls: AtomicUsize,
    last_call: Mutex<Option<(String, Value)>>,
}

impl MathProvider {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_call(&self) -> Option<(String, Value)> {
        self.last_call.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl ToolProvider for MathProvider {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                "add",
                "Add two numbers",
                json!({
                    "type": "object",
                    "required": ["a", "b"],
                    "properties": {"a": {"type": "number"}, "b": {"type": "number", "default": 1}}
                }),
            ),
            ToolDefinition::new(
                "sum_all",
                "Sum a list of numbers",
                json!({
                    "type": "object",
                    "properties": {"values": {"type": "array"}}
                }),
            ),
        ]
    }

    async fn invoke(&self, method: &str, args: Value) -> anyhow::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_call.lock() {
            *guard = Some((method.to_string(), args.clone()));
        }

        match method {
            "add" => {
                let a = args.get("a").and_then(Value::as_i64);
                let b = args.get("b").and_then(Value::as_i64);
                match (a, b) {
                    (Some(a), Some(b)) => Ok(json!(a + b)),
                    _ => bail!("a and b must be integers"),
                }
            }
            "sum_all" => {
                let values = args
                    .get("values")
                    .and_then(Value::as_array)
                    .ok_or_else(|| anyhow!("values must be an array"))?;
                Ok(json!(values.iter().filter_map(Value::as_i64).sum::<i64>()))
            }
            other => bail!("Unknown math method: {other}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct TextProvider;

#[async_trait]
impl ToolProvider for TextProvider {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        let schema = json!({
            "type": "object",
            "required": ["text"],
            "properties": {"text": {"type": "string"}}
        });
        vec![
            ToolDefinition::new("upper", "Uppercase text", schema.clone()),
            ToolDefinition::new("reverse", "Reverse text", schema.clone()),
            ToolDefinition::new("word_count", "Count words", schema),
        ]
    }

    async fn invoke(&self, method: &str, args: Value) -> anyhow::Result<Value> {
        let text = args
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("text is required"))?;
        match method {
            "upper" => Ok(json!(text.to_uppercase())),
            "reverse" => Ok(json!(text.chars().rev().collect::<String>())),
            "word_count" => Ok(json!({"words": text.split_whitespace().count()})),
            other => bail!("Unknown text method: {other}"),
        }
    }
}

/// Holds every call until the test releases it.
#[derive(Debug, Default)]
pub struct GateProvider {
    pub entered: Notify,
    pub release: Notify,
}

#[async_trait]
impl ToolProvider for GateProvider {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::without_arguments("wait", "Block until released")]
    }

    async fn invoke(&self, _method: &str, _args: Value) -> anyhow::Result<Value> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(json!("released"))
    }
}

/// Registry with `math` (2 tools) and `text` (3 tools).
pub fn sample_registry() -> (ToolRegistry, Arc<MathProvider>) {
    let math = Arc::new(MathProvider::default());
    let mut registry = ToolRegistry::new();
    registry.register("math", math.clone());
    registry.register("text", Arc::new(TextProvider));
    (registry, math)
}

pub async fn sample_state() -> (AppState, Arc<MathProvider>) {
    let (registry, math) = sample_registry();
    let state = AppState::new(ServerSettings::default(), Arc::new(registry));
    state.rebuild_catalog().await;
    (state, math)
}

pub async fn send(state: AppState, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = build_router(state)
        .oneshot(request)
        .await
        .expect("router is infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, headers, value)
}
