//! Request and caller logging stages

use super::{Next, ToolInvocation, ToolMiddleware, ToolOutcome};
use crate::error::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Logs the call and its outcome kind. Argument values are never logged.
pub struct RequestLoggingMiddleware;

#[async_trait]
impl ToolMiddleware for RequestLoggingMiddleware {
    fn name(&self) -> &'static str {
        "request_logging"
    }

    async fn handle(&self, invocation: &mut ToolInvocation, next: Next<'_>) -> Result<ToolOutcome> {
        info!(
            execution_id = %invocation.execution_id,
            tool_name = %invocation.tool_name(),
            mutating = invocation.is_mutating(),
            argument_keys = ?invocation.argument_keys(),
            "Starting tool call"
        );

        let result = next.run(invocation).await;

        match &result {
            Ok(outcome) => info!(
                execution_id = %invocation.execution_id,
                tool_name = %invocation.tool_name(),
                outcome = outcome.kind(),
                "Tool call finished"
            ),
            Err(e) => warn!(
                execution_id = %invocation.execution_id,
                tool_name = %invocation.tool_name(),
                outcome = e.category(),
                "Tool call finished with an error"
            ),
        }
        result
    }
}

/// Logs who is calling. The raw token is never logged.
pub struct ClaimsLoggingMiddleware;

#[async_trait]
impl ToolMiddleware for ClaimsLoggingMiddleware {
    fn name(&self) -> &'static str {
        "claims_logging"
    }

    async fn handle(&self, invocation: &mut ToolInvocation, next: Next<'_>) -> Result<ToolOutcome> {
        match &invocation.caller {
            Some(caller) => info!(
                execution_id = %invocation.execution_id,
                subject = %caller.subject,
                scopes = ?caller.scopes,
                issuer = caller.issuer.as_deref().unwrap_or("-"),
                client_id = caller.client_id.as_deref().unwrap_or("-"),
                "Verified caller"
            ),
            None => debug!(execution_id = %invocation.execution_id, "Anonymous caller"),
        }
        next.run(invocation).await
    }
}
