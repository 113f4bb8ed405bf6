//! Innermost pipeline stage: performs the recipe API call

use crate::downstream::{CredentialOverrides, CredentialResolver, DownstreamFactory};
use crate::error::Result;
use crate::mcp::confirmation::{ConfirmationGate, ConfirmationOutcome};
use crate::pipeline::{ToolHandler, ToolInvocation, ToolOutcome};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Binds arguments, confirms mutating calls, then invokes the recipe API
pub struct ToolExecutor {
    gate: ConfirmationGate,
    resolver: CredentialResolver,
    factory: Arc<dyn DownstreamFactory>,
}

impl ToolExecutor {
    pub fn new(gate: ConfirmationGate, resolver: CredentialResolver, factory: Arc<dyn DownstreamFactory>) -> Self {
        Self {
            gate,
            resolver,
            factory,
        }
    }
}

#[async_trait]
impl ToolHandler for ToolExecutor {
    async fn call(&self, invocation: &mut ToolInvocation) -> Result<ToolOutcome> {
        let request = invocation.tool.bind(&invocation.arguments)?;
        let overrides = CredentialOverrides::from_arguments(&invocation.tool, &invocation.arguments)?;

        let confirmation = self.gate.confirm(&request, invocation.elicitor.as_deref()).await?;
        invocation.confirmation = Some(confirmation);
        if confirmation == ConfirmationOutcome::DeclinedOrCancelled {
            info!(
                execution_id = %invocation.execution_id,
                operation = %request.describe(),
                "Caller did not confirm, skipping recipe API call"
            );
            return Ok(ToolOutcome::Cancelled {
                message: format!("{} was not confirmed", request.describe()),
            });
        }

        let credential = self.resolver.resolve(&overrides, invocation.credential.as_ref());
        debug!(
            execution_id = %invocation.execution_id,
            base_url = %credential.base_url,
            verify_tls = credential.verify_tls,
            authenticated = credential.token.is_some(),
            "Resolved downstream credential"
        );

        let client = self.factory.create(&credential)?;
        let value = client
            .invoke(request.method, &request.path, &request.query, request.body.as_ref())
            .await?;
        Ok(ToolOutcome::Success(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfirmationConfig, DownstreamConfig};
    use crate::downstream::{DownstreamApi, HttpMethod, ResolvedCredential};
    use crate::tools::ToolDefinition;
    use secrecy::ExposeSecret;
    use serde_json::{json, Map, Value};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, String, Option<String>)>>,
    }

    struct RecordingClient {
        recorder: Arc<Recorder>,
        token: Option<String>,
    }

    #[async_trait]
    impl DownstreamApi for RecordingClient {
        async fn invoke(
            &self,
            method: HttpMethod,
            path: &str,
            _query: &[(String, String)],
            _body: Option<&Value>,
        ) -> Result<Value> {
            self.recorder
                .calls
                .lock()
                .unwrap()
                .push((method.to_string(), path.to_string(), self.token.clone()));
            Ok(json!({ "ok": true }))
        }
    }

    impl DownstreamFactory for Arc<Recorder> {
        fn create(&self, credential: &ResolvedCredential) -> Result<Arc<dyn DownstreamApi>> {
            Ok(Arc::new(RecordingClient {
                recorder: self.clone(),
                token: credential.token.as_ref().map(|t| t.expose_secret().clone()),
            }))
        }
    }

    fn executor(recorder: Arc<Recorder>) -> ToolExecutor {
        ToolExecutor::new(
            ConfirmationGate::new(&ConfirmationConfig::default()),
            CredentialResolver::new(&DownstreamConfig {
                base_url: "https://mealie.example.com".to_string(),
                ..DownstreamConfig::default()
            }),
            Arc::new(recorder),
        )
    }

    #[tokio::test]
    async fn test_binds_and_invokes() {
        let recorder = Arc::new(Recorder::default());
        let tool = Arc::new(ToolDefinition::new("get_recipe", HttpMethod::Get, "/api/recipes/{slug}", "Get"));
        let mut arguments = Map::new();
        arguments.insert("slug".to_string(), json!("soup"));
        let mut invocation = ToolInvocation::new(tool, arguments);

        let outcome = executor(recorder.clone()).call(&mut invocation).await.unwrap();
        assert_eq!(outcome, ToolOutcome::Success(json!({ "ok": true })));
        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec![("GET".to_string(), "/api/recipes/soup".to_string(), None)]
        );
    }

    #[tokio::test]
    async fn test_binding_error_makes_no_call() {
        let recorder = Arc::new(Recorder::default());
        let tool = Arc::new(ToolDefinition::new("get_recipe", HttpMethod::Get, "/api/recipes/{slug}", "Get"));
        let mut invocation = ToolInvocation::new(tool, Map::new());

        assert!(executor(recorder.clone()).call(&mut invocation).await.is_err());
        assert!(recorder.calls.lock().unwrap().is_empty());
    }
}
