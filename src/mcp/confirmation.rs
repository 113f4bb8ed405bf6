//! Caller confirmation for state-changing tool calls

use crate::config::ConfirmationConfig;
use crate::downstream::ApiRequest;
use crate::error::{GatewayError, Result};
use crate::mcp::elicitation::Elicitor;
use crate::mcp::types::{ElicitationAction, ElicitationRequest};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

/// How a confirmation request was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Accepted,
    DeclinedOrCancelled,
}

/// Asks the caller to confirm mutating requests before they are sent
#[derive(Debug, Clone)]
pub struct ConfirmationGate {
    require_confirmation: bool,
    timeout: Duration,
}

impl ConfirmationGate {
    pub fn new(config: &ConfirmationConfig) -> Self {
        Self {
            require_confirmation: config.require_confirmation,
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    fn requested_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "confirm": {
                    "type": "boolean",
                    "description": "Set to true to perform the operation",
                }
            },
            "required": ["confirm"],
        })
    }

    /// Confirm `request` with the caller.
    ///
    /// Read-only requests are accepted without asking. Without a channel the
    /// gate is skipped unless confirmation is required, in which case the
    /// call fails.
    pub async fn confirm(
        &self,
        request: &ApiRequest,
        elicitor: Option<&dyn Elicitor>,
    ) -> Result<ConfirmationOutcome> {
        if !request.method.is_mutating() {
            return Ok(ConfirmationOutcome::Accepted);
        }

        let Some(elicitor) = elicitor else {
            if self.require_confirmation {
                return Err(GatewayError::confirmation_unavailable(format!(
                    "{} needs confirmation but the client does not support elicitation",
                    request.describe()
                )));
            }
            warn!(operation = %request.describe(), "No elicitation channel, skipping confirmation");
            return Ok(ConfirmationOutcome::Accepted);
        };

        let prompt = ElicitationRequest {
            message: format!("Confirm {}", request.describe()),
            requested_schema: Self::requested_schema(),
        };

        let outcome = match tokio::time::timeout(self.timeout, elicitor.elicit(prompt)).await {
            Err(_) => {
                warn!(operation = %request.describe(), "Confirmation timed out");
                ConfirmationOutcome::DeclinedOrCancelled
            }
            Ok(Err(e)) => {
                warn!(operation = %request.describe(), "Confirmation failed: {}", e);
                ConfirmationOutcome::DeclinedOrCancelled
            }
            Ok(Ok(response)) => {
                let confirmed = response.action == ElicitationAction::Accept
                    && response
                        .content
                        .as_ref()
                        .and_then(|c| c.get("confirm"))
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                if confirmed {
                    ConfirmationOutcome::Accepted
                } else {
                    ConfirmationOutcome::DeclinedOrCancelled
                }
            }
        };

        info!(operation = %request.describe(), outcome = ?outcome, "Confirmation resolved");
        Ok(outcome)
    }
}
