use super::{Next, ToolInvocation, ToolMiddleware, ToolOutcome};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::json;
use std::time::Instant;
use tracing::info;

/// Measures the inner chain and records the duration on the invocation
pub struct TimingMiddleware;

#[async_trait]
impl ToolMiddleware for TimingMiddleware {
    fn name(&self) -> &'static str {
        "timing"
    }

    async fn handle(&self, invocation: &mut ToolInvocation, next: Next<'_>) -> Result<ToolOutcome> {
        let start = Instant::now();
        let result = next.run(invocation).await;
        let elapsed = start.elapsed();

        invocation.elapsed = Some(elapsed);
        invocation.add_metadata("duration_ms", json!(elapsed.as_millis() as u64));
        info!(
            execution_id = %invocation.execution_id,
            tool_name = %invocation.tool_name(),
            duration_ms = elapsed.as_millis() as u64,
            success = matches!(result, Ok(ToolOutcome::Success(_))),
            "Tool call timed"
        );
        result
    }
}
