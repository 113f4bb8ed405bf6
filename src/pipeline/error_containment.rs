//! Outermost stage: turns every failure into a tool outcome

use super::{Next, ToolInvocation, ToolMiddleware, ToolOutcome};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{error, warn};

pub struct ErrorContainmentMiddleware {
    include_detail: bool,
}

impl ErrorContainmentMiddleware {
    pub fn new(include_detail: bool) -> Self {
        Self { include_detail }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[async_trait]
impl ToolMiddleware for ErrorContainmentMiddleware {
    fn name(&self) -> &'static str {
        "error_containment"
    }

    async fn handle(&self, invocation: &mut ToolInvocation, next: Next<'_>) -> Result<ToolOutcome> {
        let execution_id = invocation.execution_id;
        let tool_name = invocation.tool_name().to_string();

        let error = match AssertUnwindSafe(next.run(invocation)).catch_unwind().await {
            Ok(Ok(outcome)) => return Ok(outcome),
            Ok(Err(e)) => e,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    execution_id = %execution_id,
                    tool_name = %tool_name,
                    panic = %message,
                    "Tool call panicked"
                );
                GatewayError::Internal(anyhow::anyhow!("tool call panicked: {}", message))
            }
        };

        warn!(
            execution_id = %execution_id,
            tool_name = %tool_name,
            kind = error.category(),
            retryable = error.is_retryable(),
            "Tool call failed: {}",
            error
        );
        Ok(ToolOutcome::from_error(&error, self.include_detail))
    }
}
