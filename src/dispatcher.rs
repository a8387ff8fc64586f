use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::{Result, ServerError},
    registry::{split_tool_name, ToolRegistry},
};

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Resolves `<category>_<method>` and forwards the call once. The
    /// provider's result and errors are returned untouched.
    pub async fn execute_tool_call(&self, full_name: &str, args: Value) -> Result<Value> {
        let (category, method) = split_tool_name(full_name);
        let Some(provider) = self.registry.get(category) else {
            warn!(tool = %full_name, "Tool call for unregistered category");
            return Err(ServerError::ToolNotFound(full_name.to_string()));
        };

        let trace_id = Uuid::new_v4();
        let start = Instant::now();
        info!(trace_id = %trace_id, tool = %full_name, "Dispatching tool call");

        let outcome = provider.invoke(method, args).await;
        let elapsed_ms = elapsed_millis(start.elapsed());
        match &outcome {
            Ok(_) => debug!(trace_id = %trace_id, tool = %full_name, elapsed_ms, "Tool call completed"),
            Err(err) => {
                warn!(trace_id = %trace_id, tool = %full_name, elapsed_ms, "Tool call failed: {err:#}")
            }
        }

        outcome.map_err(ServerError::ToolExecution)
    }
}

fn elapsed_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
