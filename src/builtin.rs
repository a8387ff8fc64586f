use std::time::Instant;

use anyhow::bail;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    mcp_api::{PROTOCOL_VERSION, SERVER_NAME, SERVER_VERSION},
    models::ToolDefinition,
    registry::ToolProvider,
};

pub const SYSTEM_CATEGORY: &str = "system";

/// Tools about the server process itself, registered by the binary so a
/// standalone server has something to call.
#[derive(Debug)]
pub struct SystemProvider {
    started_at: Instant,
}

impl SystemProvider {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }
}

impl Default for SystemProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolProvider for SystemProvider {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::without_arguments("info", "Report server name, version and uptime"),
            ToolDefinition::new(
                "echo",
                "Return the given arguments unchanged",
                json!({
                    "type": "object",
                    "properties": {
                        "message": {"type": "string", "description": "Text to echo back"}
                    }
                }),
            ),
        ]
    }

    async fn invoke(&self, method: &str, args: Value) -> anyhow::Result<Value> {
        match method {
            "info" => Ok(json!({
                "name": SERVER_NAME,
                "version": SERVER_VERSION,
                "protocolVersion": PROTOCOL_VERSION,
                "uptimeSecs": self.started_at.elapsed().as_secs(),
                "pid": std::process::id(),
            })),
            "echo" => Ok(args),
            other => bail!("Unknown system tool: {other}"),
        }
    }
}
