//! Builds the middleware chain once at startup

use super::{
    ClaimsLoggingMiddleware, CredentialInjectionMiddleware, ErrorContainmentMiddleware, HttpPolicyDecisionPoint,
    MiddlewareChain, PolicyEnforcementMiddleware, RateLimitingMiddleware, RequestLoggingMiddleware,
    TimingMiddleware,
};
use crate::auth::{AuthMode, TokenDelegationExchange};
use crate::config::Config;
use crate::downstream::{CredentialResolver, DownstreamFactory};
use crate::error::{GatewayError, Result};
use crate::mcp::confirmation::ConfirmationGate;
use crate::tools::ToolExecutor;
use std::sync::Arc;
use tracing::debug;

/// Assemble the chain for `config` and the selected auth mode.
///
/// Order, outermost first: error containment, credential injection (when
/// delegating or passing JWTs through), rate limiting, timing, request
/// logging, claims logging, policy enforcement (when an endpoint is set),
/// then the tool executor.
pub fn assemble(
    config: &Config,
    auth: &AuthMode,
    exchange: Option<Arc<TokenDelegationExchange>>,
    factory: Arc<dyn DownstreamFactory>,
) -> Result<MiddlewareChain> {
    let executor = ToolExecutor::new(
        ConfirmationGate::new(&config.confirmation),
        CredentialResolver::new(&config.downstream),
        factory,
    );

    let mut chain = MiddlewareChain::new(Arc::new(executor)).add_middleware(Arc::new(
        ErrorContainmentMiddleware::new(config.error_handling.include_detail),
    ));

    if config.delegation.enabled {
        let exchange = exchange.ok_or_else(|| {
            GatewayError::config("Token delegation is enabled but no token exchange was configured")
        })?;
        chain = chain.add_middleware(Arc::new(CredentialInjectionMiddleware::delegating(exchange)));
    } else if auth.passes_through_tokens() {
        chain = chain.add_middleware(Arc::new(CredentialInjectionMiddleware::pass_through()));
    }

    chain = chain
        .add_middleware(Arc::new(RateLimitingMiddleware::new(&config.rate_limit)))
        .add_middleware(Arc::new(TimingMiddleware))
        .add_middleware(Arc::new(RequestLoggingMiddleware))
        .add_middleware(Arc::new(ClaimsLoggingMiddleware));

    if let Some(decision_point) = HttpPolicyDecisionPoint::new(&config.policy)? {
        debug!(endpoint = %decision_point.endpoint(), "Policy enforcement enabled");
        chain = chain.add_middleware(Arc::new(PolicyEnforcementMiddleware::new(Arc::new(decision_point))));
    }

    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DownstreamConfig;
    use crate::downstream::HttpClientFactory;

    fn factory() -> Arc<dyn DownstreamFactory> {
        Arc::new(HttpClientFactory::new(&DownstreamConfig::default()))
    }

    #[test]
    fn test_default_order() {
        let chain = assemble(&Config::default(), &AuthMode::None, None, factory()).unwrap();
        assert_eq!(
            chain.names(),
            vec!["error_containment", "rate_limiting", "timing", "request_logging", "claims_logging"]
        );
    }

    #[test]
    fn test_policy_stage_is_innermost() {
        let mut config = Config::default();
        config.policy.endpoint = Some("http://opa.local:8181/v1/data/mealie/allow".to_string());
        let chain = assemble(&config, &AuthMode::None, None, factory()).unwrap();
        assert_eq!(chain.names().last(), Some(&"policy_enforcement"));
    }

    #[test]
    fn test_delegation_without_exchange_rejected() {
        let mut config = Config::default();
        config.delegation.enabled = true;
        assert!(assemble(&config, &AuthMode::None, None, factory()).is_err());
    }
}
