//! Tool dispatch with validation, timeouts, and panic isolation.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use toolwright_core::error::ToolError;
use toolwright_core::tool::{ToolCall, ToolRegistry, ToolResult};
use tracing::{debug, warn};

/// Runs tool calls against the registry.
///
/// [`ToolExecutor::execute`] never fails: every outcome, including unknown
/// tools, bad arguments, timeouts and panics, becomes a [`ToolResult`] the
/// model can read.
pub struct ToolExecutor {
    tools: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(tools: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { tools, timeout }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        match self.try_execute(call).await {
            Ok(output) => {
                debug!(tool = %call.name, call_id = %call.id, bytes = output.len(), "Tool succeeded");
                ToolResult::success(call, output)
            }
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool failed");
                ToolResult::failure(call, &e)
            }
        }
    }

    async fn try_execute(&self, call: &ToolCall) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;

        tool.input_schema()
            .validate(&call.arguments)
            .map_err(|reason| ToolError::SchemaViolation {
                tool_name: call.name.clone(),
                reason,
            })?;

        let body = AssertUnwindSafe(tool.call(call.arguments.clone())).catch_unwind();
        match tokio::time::timeout(self.timeout, body).await {
            Err(_) => Err(ToolError::Timeout {
                tool_name: call.name.clone(),
                timeout_secs: self.timeout.as_secs(),
            }),
            Ok(Err(panic)) => Err(ToolError::failed(
                &call.name,
                format!("tool panicked: {}", panic_message(&*panic)),
            )),
            Ok(Ok(result)) => result,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
