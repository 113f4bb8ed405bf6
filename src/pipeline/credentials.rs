//! Attaches the downstream credential derived from the verified caller

use super::{Next, ToolInvocation, ToolMiddleware, ToolOutcome};
use crate::auth::TokenDelegationExchange;
use crate::downstream::{CredentialSource, InjectedCredential};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

enum Strategy {
    /// Exchange the caller's token for a delegated one
    Delegate(Arc<TokenDelegationExchange>),
    /// Forward the caller's own verified token
    PassThrough,
}

pub struct CredentialInjectionMiddleware {
    strategy: Strategy,
}

impl CredentialInjectionMiddleware {
    pub fn delegating(exchange: Arc<TokenDelegationExchange>) -> Self {
        Self {
            strategy: Strategy::Delegate(exchange),
        }
    }

    pub fn pass_through() -> Self {
        Self {
            strategy: Strategy::PassThrough,
        }
    }
}

#[async_trait]
impl ToolMiddleware for CredentialInjectionMiddleware {
    fn name(&self) -> &'static str {
        "credential_injection"
    }

    async fn handle(&self, invocation: &mut ToolInvocation, next: Next<'_>) -> Result<ToolOutcome> {
        let caller = invocation.caller.as_ref().ok_or_else(|| {
            GatewayError::auth("A verified caller is required to obtain a downstream credential")
        })?;

        let credential = match &self.strategy {
            Strategy::Delegate(exchange) => {
                let delegated = exchange.exchange(caller).await?;
                InjectedCredential::new(delegated.value().clone(), CredentialSource::Delegated)
            }
            Strategy::PassThrough => InjectedCredential::new(caller.token().clone(), CredentialSource::PassThrough),
        };

        debug!(
            execution_id = %invocation.execution_id,
            subject = %caller.subject,
            source = %credential.source,
            "Attached downstream credential"
        );
        invocation.credential = Some(credential);
        next.run(invocation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::VerifiedClaims;
    use crate::downstream::HttpMethod;
    use crate::pipeline::{MiddlewareChain, ToolHandler};
    use crate::tools::ToolDefinition;
    use secrecy::{ExposeSecret, Secret};
    use serde_json::{json, Map};

    struct ReportCredential;

    #[async_trait]
    impl ToolHandler for ReportCredential {
        async fn call(&self, invocation: &mut ToolInvocation) -> Result<ToolOutcome> {
            let credential = invocation.credential.as_ref().map(|c| {
                json!({ "token": c.token().expose_secret(), "source": c.source.to_string() })
            });
            Ok(ToolOutcome::Success(credential.unwrap_or_default()))
        }
    }

    fn invocation() -> ToolInvocation {
        let tool = Arc::new(ToolDefinition::new("get_recipes", HttpMethod::Get, "/api/recipes", "List"));
        ToolInvocation::new(tool, Map::new())
    }

    #[tokio::test]
    async fn test_pass_through_forwards_caller_token() {
        let chain = MiddlewareChain::new(Arc::new(ReportCredential))
            .add_middleware(Arc::new(CredentialInjectionMiddleware::pass_through()));
        let mut inv = invocation()
            .with_caller(Some(VerifiedClaims::new("alice", Secret::new("caller-token".to_string()))));
        assert_eq!(
            chain.execute(&mut inv).await,
            ToolOutcome::Success(json!({ "token": "caller-token", "source": "pass-through" }))
        );
    }

    #[tokio::test]
    async fn test_missing_caller_is_authentication_error() {
        let chain = MiddlewareChain::new(Arc::new(ReportCredential))
            .add_middleware(Arc::new(CredentialInjectionMiddleware::pass_through()));
        assert_eq!(chain.execute(&mut invocation()).await.kind(), "authentication");
    }
}
