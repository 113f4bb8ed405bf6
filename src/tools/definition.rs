//! Declarative wrapper definitions over recipe API endpoints

use crate::downstream::{ApiRequest, HttpMethod};
use crate::error::{GatewayError, Result};
use serde_json::{json, Map, Value};

/// Argument names reserved for per-call credential overrides
pub const OVERRIDE_BASE_URL: &str = "base_url";
pub const OVERRIDE_TOKEN: &str = "token";
pub const OVERRIDE_VERIFY_TLS: &str = "verify_tls";

/// Argument carrying the request body
pub const BODY_ARGUMENT: &str = "data";

/// JSON type of a tool argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
    StringArray,
}

impl ParamKind {
    fn schema(&self) -> Value {
        match self {
            ParamKind::String => json!({ "type": "string" }),
            ParamKind::Integer => json!({ "type": "integer" }),
            ParamKind::Boolean => json!({ "type": "boolean" }),
            ParamKind::StringArray => json!({ "type": "array", "items": { "type": "string" } }),
        }
    }
}

/// A path or query argument
#[derive(Debug, Clone)]
pub struct ParamSpec {
    /// Argument name seen by callers
    pub name: String,
    /// Query key sent to the recipe API
    pub wire_name: String,
    pub kind: ParamKind,
    pub required: bool,
    pub description: String,
}

impl ParamSpec {
    pub fn new(name: &str, wire_name: &str, kind: ParamKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            wire_name: wire_name.to_string(),
            kind,
            required: false,
            description: description.to_string(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Request body handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodySpec {
    None,
    /// The `data` argument is sent as the JSON body
    Data { required: bool, description: String },
}

/// One tool: a thin wrapper over a single recipe API endpoint
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub method: HttpMethod,
    /// Path with `{name}` placeholders, e.g. `/api/recipes/{slug}`
    pub path_template: String,
    pub path_params: Vec<ParamSpec>,
    pub query_params: Vec<ParamSpec>,
    pub body: BodySpec,
    /// Accept `base_url`, `token` and `verify_tls` arguments for this call
    pub credential_overrides: bool,
}

impl ToolDefinition {
    /// Create a definition; path parameters are taken from the template's placeholders
    pub fn new(name: &str, method: HttpMethod, path_template: &str, description: &str) -> Self {
        let path_params = placeholders(path_template)
            .into_iter()
            .map(|p| {
                ParamSpec::new(&p, &p, ParamKind::String, &format!("Value of the `{}` path segment", p))
                    .required()
            })
            .collect();

        Self {
            name: name.to_string(),
            description: description.to_string(),
            method,
            path_template: path_template.to_string(),
            path_params,
            query_params: Vec::new(),
            body: BodySpec::None,
            credential_overrides: false,
        }
    }

    pub fn query(mut self, param: ParamSpec) -> Self {
        self.query_params.push(param);
        self
    }

    pub fn queries<I: IntoIterator<Item = ParamSpec>>(mut self, params: I) -> Self {
        self.query_params.extend(params);
        self
    }

    pub fn body(mut self, required: bool, description: &str) -> Self {
        self.body = BodySpec::Data {
            required,
            description: description.to_string(),
        };
        self
    }

    pub fn with_credential_overrides(mut self) -> Self {
        self.credential_overrides = true;
        self
    }

    /// POST, PUT, PATCH and DELETE change server state
    pub fn is_mutating(&self) -> bool {
        self.method.is_mutating()
    }

    /// JSON schema of the tool's arguments
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in self.path_params.iter().chain(self.query_params.iter()) {
            let mut schema = param.kind.schema();
            schema["description"] = Value::String(param.description.clone());
            properties.insert(param.name.clone(), schema);
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        if let BodySpec::Data {
            required: body_required,
            description,
        } = &self.body
        {
            properties.insert(
                BODY_ARGUMENT.to_string(),
                json!({ "type": "object", "description": description }),
            );
            if *body_required {
                required.push(Value::String(BODY_ARGUMENT.to_string()));
            }
        }

        if self.credential_overrides {
            properties.insert(
                OVERRIDE_BASE_URL.to_string(),
                json!({ "type": "string", "description": "Recipe API base URL for this call only" }),
            );
            properties.insert(
                OVERRIDE_TOKEN.to_string(),
                json!({ "type": "string", "description": "Recipe API token for this call only" }),
            );
            properties.insert(
                OVERRIDE_VERIFY_TLS.to_string(),
                json!({ "type": "boolean", "description": "Verify TLS certificates for this call only" }),
            );
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Turn call arguments into a concrete API request
    pub fn bind(&self, arguments: &Map<String, Value>) -> Result<ApiRequest> {
        let mut path = self.path_template.clone();
        for param in &self.path_params {
            let value = match arguments.get(&param.name) {
                Some(Value::Null) | None => {
                    return Err(GatewayError::validation(format!(
                        "Missing required argument '{}'",
                        param.name
                    )))
                }
                Some(value) => scalar(&param.name, value)?,
            };
            if value.is_empty() {
                return Err(GatewayError::validation(format!(
                    "Argument '{}' cannot be empty",
                    param.name
                )));
            }
            // Dot segments would be resolved away when joined onto the base URL
            if value == "." || value == ".." {
                return Err(GatewayError::validation(format!(
                    "Argument '{}' cannot be a relative path segment",
                    param.name
                )));
            }
            path = path.replace(
                &format!("{{{}}}", param.name),
                &urlencoding::encode(&value),
            );
        }

        let mut query = Vec::new();
        for param in &self.query_params {
            match arguments.get(&param.name) {
                Some(Value::Null) | None if param.required => {
                    return Err(GatewayError::validation(format!(
                        "Missing required argument '{}'",
                        param.name
                    )))
                }
                Some(Value::Null) | None => {}
                Some(Value::Array(items)) => {
                    for item in items {
                        query.push((param.wire_name.clone(), scalar(&param.name, item)?));
                    }
                }
                Some(value) => query.push((param.wire_name.clone(), scalar(&param.name, value)?)),
            }
        }

        let body = match &self.body {
            BodySpec::None => None,
            BodySpec::Data { required, .. } => match arguments.get(BODY_ARGUMENT) {
                Some(Value::Null) | None if *required => {
                    return Err(GatewayError::validation(format!(
                        "Missing required argument '{}'",
                        BODY_ARGUMENT
                    )))
                }
                Some(Value::Null) | None => None,
                Some(value @ Value::Object(_)) | Some(value @ Value::Array(_)) => Some(value.clone()),
                Some(_) => {
                    return Err(GatewayError::validation(format!(
                        "Argument '{}' must be an object or array",
                        BODY_ARGUMENT
                    )))
                }
            },
        };

        Ok(ApiRequest {
            method: self.method,
            path,
            query,
            body,
        })
    }
}

fn scalar(name: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(GatewayError::validation(format!(
            "Argument '{}' must be a string, number or boolean",
            name
        ))),
    }
}

fn placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        names.push(rest[start + 1..start + len].to_string());
        rest = &rest[start + len + 1..];
    }
    names
}
