//! Per-call downstream credential resolution

use crate::config::DownstreamConfig;
use crate::error::{GatewayError, Result};
use crate::tools::definition::{ToolDefinition, OVERRIDE_BASE_URL, OVERRIDE_TOKEN, OVERRIDE_VERIFY_TLS};
use secrecy::{ExposeSecret, Secret};
use serde_json::{Map, Value};
use std::fmt;

/// Where an injected credential came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Obtained by token exchange
    Delegated,
    /// The caller's own verified token
    PassThrough,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Delegated => f.write_str("delegated"),
            CredentialSource::PassThrough => f.write_str("pass-through"),
        }
    }
}

/// Token attached to an invocation by the credential injection stage
#[derive(Debug, Clone)]
pub struct InjectedCredential {
    token: Secret<String>,
    pub source: CredentialSource,
}

impl InjectedCredential {
    pub fn new(token: Secret<String>, source: CredentialSource) -> Self {
        Self { token, source }
    }

    pub fn token(&self) -> &Secret<String> {
        &self.token
    }
}

/// Credential arguments supplied with a single call
#[derive(Debug, Clone, Default)]
pub struct CredentialOverrides {
    pub base_url: Option<String>,
    pub token: Option<Secret<String>>,
    pub verify_tls: Option<bool>,
}

impl CredentialOverrides {
    /// Read override arguments. Tools that do not declare overrides get none.
    pub fn from_arguments(tool: &ToolDefinition, arguments: &Map<String, Value>) -> Result<Self> {
        if !tool.credential_overrides {
            return Ok(Self::default());
        }

        let string_arg = |name: &str| -> Result<Option<String>> {
            match arguments.get(name) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.clone())),
                Some(_) => Err(GatewayError::validation(format!("Argument '{}' must be a string", name))),
            }
        };

        let verify_tls = match arguments.get(OVERRIDE_VERIFY_TLS) {
            None | Some(Value::Null) => None,
            Some(Value::Bool(b)) => Some(*b),
            Some(_) => {
                return Err(GatewayError::validation(format!(
                    "Argument '{}' must be a boolean",
                    OVERRIDE_VERIFY_TLS
                )))
            }
        };

        Ok(Self {
            base_url: string_arg(OVERRIDE_BASE_URL)?,
            token: string_arg(OVERRIDE_TOKEN)?.map(Secret::new),
            verify_tls,
        })
    }
}

/// Base URL, token and TLS flag used to build one call's client
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub base_url: String,
    pub token: Option<Secret<String>>,
    pub verify_tls: bool,
}

impl PartialEq for ResolvedCredential {
    fn eq(&self, other: &Self) -> bool {
        self.base_url == other.base_url
            && self.verify_tls == other.verify_tls
            && self.token.as_ref().map(|t| t.expose_secret()) == other.token.as_ref().map(|t| t.expose_secret())
    }
}

/// Resolves per-call credentials.
///
/// Precedence: per-call overrides, then the injected credential (token only),
/// then the configured defaults. A call that overrides the base URL carries
/// only its own override token, so neither the injected nor the configured
/// token leaves for a caller-chosen host. Holds no mutable state.
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    base_url: String,
    token: Option<Secret<String>>,
    verify_tls: bool,
}

impl CredentialResolver {
    pub fn new(config: &DownstreamConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            token: config.token.clone(),
            verify_tls: config.verify_tls,
        }
    }

    pub fn resolve(
        &self,
        overrides: &CredentialOverrides,
        injected: Option<&InjectedCredential>,
    ) -> ResolvedCredential {
        let token = if overrides.base_url.is_some() {
            overrides.token.clone()
        } else {
            overrides
                .token
                .clone()
                .or_else(|| injected.map(|c| c.token().clone()))
                .or_else(|| self.token.clone())
        };

        ResolvedCredential {
            base_url: overrides.base_url.clone().unwrap_or_else(|| self.base_url.clone()),
            token,
            verify_tls: overrides.verify_tls.unwrap_or(self.verify_tls),
        }
    }
}
