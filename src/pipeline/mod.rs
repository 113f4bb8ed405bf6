//! Tool call middleware pipeline
//!
//! Every tool call passes through an ordered [`MiddlewareChain`] built once at
//! startup. Each middleware wraps the rest of the chain through [`Next`], so
//! the first entry sees both what goes in and what comes out of every inner
//! stage.

pub mod assembly;
pub mod credentials;
pub mod error_containment;
pub mod logging;
pub mod policy;
pub mod rate_limit;
pub mod timing;

pub use assembly::assemble;
pub use credentials::CredentialInjectionMiddleware;
pub use error_containment::ErrorContainmentMiddleware;
pub use logging::{ClaimsLoggingMiddleware, RequestLoggingMiddleware};
pub use policy::{HttpPolicyDecisionPoint, PolicyDecision, PolicyDecisionPoint, PolicyEnforcementMiddleware};
pub use rate_limit::{RateLimitingMiddleware, TokenBucket};
pub use timing::TimingMiddleware;

use crate::auth::VerifiedClaims;
use crate::downstream::InjectedCredential;
use crate::error::{GatewayError, Result};
use crate::mcp::confirmation::ConfirmationOutcome;
use crate::mcp::elicitation::Elicitor;
use crate::tools::ToolDefinition;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// One tool call on its way through the pipeline
pub struct ToolInvocation {
    /// Unique execution ID for this call
    pub execution_id: Uuid,
    pub tool: Arc<ToolDefinition>,
    pub arguments: Map<String, Value>,
    /// Verified caller, absent for anonymous calls
    pub caller: Option<VerifiedClaims>,
    /// Downstream credential attached by credential injection
    pub credential: Option<InjectedCredential>,
    pub confirmation: Option<ConfirmationOutcome>,
    /// Channel for asking the caller questions, when the transport has one
    pub elicitor: Option<Arc<dyn Elicitor>>,
    pub started_at: Instant,
    /// Duration of the inner chain, recorded by timing
    pub elapsed: Option<Duration>,
    pub metadata: HashMap<String, Value>,
}

impl ToolInvocation {
    pub fn new(tool: Arc<ToolDefinition>, arguments: Map<String, Value>) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            tool,
            arguments,
            caller: None,
            credential: None,
            confirmation: None,
            elicitor: None,
            started_at: Instant::now(),
            elapsed: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_caller(mut self, caller: Option<VerifiedClaims>) -> Self {
        self.caller = caller;
        self
    }

    pub fn with_elicitor(mut self, elicitor: Option<Arc<dyn Elicitor>>) -> Self {
        self.elicitor = elicitor;
        self
    }

    pub fn tool_name(&self) -> &str {
        &self.tool.name
    }

    pub fn is_mutating(&self) -> bool {
        self.tool.is_mutating()
    }

    /// Argument names, sorted, never values
    pub fn argument_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.arguments.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn add_metadata(&mut self, key: &str, value: Value) {
        self.metadata.insert(key.to_string(), value);
    }
}

/// Result of a tool call as seen by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Success(Value),
    Cancelled { message: String },
    Error {
        kind: String,
        message: String,
        detail: Option<String>,
    },
}

impl ToolOutcome {
    /// Normalize an error. Without detail the message is fixed per kind.
    pub fn from_error(error: &GatewayError, include_detail: bool) -> Self {
        if include_detail {
            ToolOutcome::Error {
                kind: error.category().to_string(),
                message: error.to_string(),
                detail: Some(format!("{:?}", error)),
            }
        } else {
            ToolOutcome::Error {
                kind: error.category().to_string(),
                message: error.public_message().to_string(),
                detail: None,
            }
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            ToolOutcome::Success(_) => "success",
            ToolOutcome::Cancelled { .. } => "cancelled",
            ToolOutcome::Error { kind, .. } => kind,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutcome::Error { .. })
    }

    /// Structured form used in `tools/call` results
    pub fn to_structured(&self) -> Value {
        match self {
            ToolOutcome::Success(value) => value.clone(),
            ToolOutcome::Cancelled { message } => json!({ "status": "cancelled", "message": message }),
            ToolOutcome::Error { kind, message, detail } => {
                let mut error = json!({ "kind": kind, "message": message });
                if let Some(detail) = detail {
                    error["detail"] = Value::String(detail.clone());
                }
                error
            }
        }
    }
}

/// A stage of the pipeline
#[async_trait]
pub trait ToolMiddleware: Send + Sync {
    fn name(&self) -> &'static str;

    /// Handle the call, usually by running `next` and inspecting its result
    async fn handle(&self, invocation: &mut ToolInvocation, next: Next<'_>) -> Result<ToolOutcome>;
}

/// The innermost stage that actually performs the call
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, invocation: &mut ToolInvocation) -> Result<ToolOutcome>;
}

/// The remainder of the chain after the current middleware
pub struct Next<'a> {
    remaining: &'a [Arc<dyn ToolMiddleware>],
    handler: &'a dyn ToolHandler,
}

impl<'a> Next<'a> {
    pub async fn run(self, invocation: &mut ToolInvocation) -> Result<ToolOutcome> {
        match self.remaining.split_first() {
            Some((middleware, rest)) => {
                let next = Next {
                    remaining: rest,
                    handler: self.handler,
                };
                middleware.handle(invocation, next).await
            }
            None => self.handler.call(invocation).await,
        }
    }
}

/// Ordered middleware around a handler, outermost first
pub struct MiddlewareChain {
    middleware: Vec<Arc<dyn ToolMiddleware>>,
    handler: Arc<dyn ToolHandler>,
}

impl MiddlewareChain {
    pub fn new(handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            middleware: Vec::new(),
            handler,
        }
    }

    /// Append a middleware inside the ones already added
    pub fn add_middleware(mut self, middleware: Arc<dyn ToolMiddleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Run an invocation through the chain.
    ///
    /// An error escaping the chain is normalized without detail, so callers
    /// always receive a [`ToolOutcome`].
    pub async fn execute(&self, invocation: &mut ToolInvocation) -> ToolOutcome {
        let next = Next {
            remaining: &self.middleware,
            handler: self.handler.as_ref(),
        };
        match next.run(invocation).await {
            Ok(outcome) => outcome,
            Err(e) => ToolOutcome::from_error(&e, false),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.middleware.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downstream::HttpMethod;
    use std::sync::Mutex;

    struct Recording {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ToolMiddleware for Recording {
        fn name(&self) -> &'static str {
            self.label
        }

        async fn handle(&self, invocation: &mut ToolInvocation, next: Next<'_>) -> Result<ToolOutcome> {
            self.log.lock().unwrap().push(format!("enter {}", self.label));
            let result = next.run(invocation).await;
            self.log.lock().unwrap().push(format!("exit {}", self.label));
            result
        }
    }

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, invocation: &mut ToolInvocation) -> Result<ToolOutcome> {
            Ok(ToolOutcome::Success(Value::Object(invocation.arguments.clone())))
        }
    }

    struct Failing;

    #[async_trait]
    impl ToolHandler for Failing {
        async fn call(&self, _invocation: &mut ToolInvocation) -> Result<ToolOutcome> {
            Err(GatewayError::validation("bad slug"))
        }
    }

    fn invocation() -> ToolInvocation {
        let tool = Arc::new(ToolDefinition::new("get_recipes", HttpMethod::Get, "/api/recipes", "List"));
        let mut arguments = Map::new();
        arguments.insert("search".to_string(), json!("soup"));
        ToolInvocation::new(tool, arguments)
    }

    #[tokio::test]
    async fn test_onion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::new(Arc::new(Echo))
            .add_middleware(Arc::new(Recording { label: "outer", log: log.clone() }))
            .add_middleware(Arc::new(Recording { label: "inner", log: log.clone() }));

        let outcome = chain.execute(&mut invocation()).await;
        assert_eq!(outcome, ToolOutcome::Success(json!({ "search": "soup" })));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["enter outer", "enter inner", "exit inner", "exit outer"]
        );
        assert_eq!(chain.names(), vec!["outer", "inner"]);
    }

    #[tokio::test]
    async fn test_escaping_error_is_normalized() {
        let chain = MiddlewareChain::new(Arc::new(Failing));
        match chain.execute(&mut invocation()).await {
            ToolOutcome::Error { kind, detail, .. } => {
                assert_eq!(kind, "invalid_request");
                assert!(detail.is_none());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_structured_outcomes() {
        let cancelled = ToolOutcome::Cancelled { message: "declined".to_string() };
        assert_eq!(cancelled.to_structured()["status"], "cancelled");

        let error = ToolOutcome::from_error(&GatewayError::downstream(404, "missing"), true);
        let structured = error.to_structured();
        assert_eq!(structured["kind"], "downstream");
        assert_eq!(structured["message"], "API error: 404 - missing");
        assert!(structured.get("detail").is_some());
    }

    #[test]
    fn test_argument_keys_sorted() {
        let mut inv = invocation();
        inv.arguments.insert("a".to_string(), json!(1));
        assert_eq!(inv.argument_keys(), vec!["a", "search"]);
    }
}
