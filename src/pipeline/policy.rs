//! External policy enforcement
//!
//! Each call is described to a policy decision point (an OPA-style
//! `POST {"input": ...}` endpoint). Anything other than an explicit allow,
//! including an unreachable endpoint, denies the call.

use super::{Next, ToolInvocation, ToolMiddleware, ToolOutcome};
use crate::config::PolicyConfig;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Answer from a policy decision point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub allow: bool,
    pub reason: Option<String>,
}

#[async_trait]
pub trait PolicyDecisionPoint: Send + Sync {
    async fn decide(&self, input: &Value) -> Result<PolicyDecision>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DecisionResult {
    Bool(bool),
    Detailed { allow: bool, reason: Option<String> },
}

#[derive(Debug, Deserialize)]
struct DecisionResponse {
    result: DecisionResult,
}

/// Policy decision point reached over HTTP
pub struct HttpPolicyDecisionPoint {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpPolicyDecisionPoint {
    pub fn new(config: &PolicyConfig) -> Result<Option<Self>> {
        let Some(endpoint) = config.endpoint.clone().filter(|e| !e.trim().is_empty()) else {
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to build policy client: {}", e)))?;
        Ok(Some(Self { endpoint, client }))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PolicyDecisionPoint for HttpPolicyDecisionPoint {
    async fn decide(&self, input: &Value) -> Result<PolicyDecision> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "input": input }))
            .send()
            .await
            .map_err(|e| GatewayError::connection(format!("Policy decision point unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::connection(format!(
                "Policy decision point returned HTTP {}",
                status.as_u16()
            )));
        }

        let parsed: DecisionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::validation(format!("Malformed policy decision: {}", e)))?;

        Ok(match parsed.result {
            DecisionResult::Bool(allow) => PolicyDecision { allow, reason: None },
            DecisionResult::Detailed { allow, reason } => PolicyDecision { allow, reason },
        })
    }
}

pub struct PolicyEnforcementMiddleware {
    decision_point: Arc<dyn PolicyDecisionPoint>,
}

impl PolicyEnforcementMiddleware {
    pub fn new(decision_point: Arc<dyn PolicyDecisionPoint>) -> Self {
        Self { decision_point }
    }

    fn policy_input(invocation: &ToolInvocation) -> Value {
        json!({
            "tool": invocation.tool_name(),
            "arguments": invocation.arguments,
            "mutating": invocation.is_mutating(),
            "caller": invocation.caller.as_ref().map(|c| c.to_public_json()),
        })
    }
}

#[async_trait]
impl ToolMiddleware for PolicyEnforcementMiddleware {
    fn name(&self) -> &'static str {
        "policy_enforcement"
    }

    async fn handle(&self, invocation: &mut ToolInvocation, next: Next<'_>) -> Result<ToolOutcome> {
        let input = Self::policy_input(invocation);
        let decision = match self.decision_point.decide(&input).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    execution_id = %invocation.execution_id,
                    tool_name = %invocation.tool_name(),
                    "Policy check failed, denying: {}",
                    e
                );
                return Err(GatewayError::policy_denied(format!("policy check failed: {}", e)));
            }
        };

        if !decision.allow {
            let reason = decision.reason.unwrap_or_else(|| "no reason given".to_string());
            warn!(
                execution_id = %invocation.execution_id,
                tool_name = %invocation.tool_name(),
                reason = %reason,
                "Policy denied tool call"
            );
            return Err(GatewayError::policy_denied(reason));
        }

        debug!(execution_id = %invocation.execution_id, "Policy allowed tool call");
        next.run(invocation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_shapes() {
        let plain: DecisionResponse = serde_json::from_value(json!({ "result": true })).unwrap();
        assert!(matches!(plain.result, DecisionResult::Bool(true)));

        let detailed: DecisionResponse =
            serde_json::from_value(json!({ "result": { "allow": false, "reason": "weekend" } })).unwrap();
        match detailed.result {
            DecisionResult::Detailed { allow, reason } => {
                assert!(!allow);
                assert_eq!(reason.as_deref(), Some("weekend"));
            }
            other => panic!("unexpected decision {:?}", other),
        }

        assert!(serde_json::from_value::<DecisionResponse>(json!({ "result": "yes" })).is_err());
        assert!(serde_json::from_value::<DecisionResponse>(json!({})).is_err());
    }

    #[test]
    fn test_no_endpoint_means_no_decision_point() {
        assert!(HttpPolicyDecisionPoint::new(&PolicyConfig::default()).unwrap().is_none());
    }
}
