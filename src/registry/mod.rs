//! Capability registry: which server owns which tool/prompt/resource, and
//! how a bare or qualified name resolves to exactly one owner.

use crate::error::{Error, Result};
use crate::process::ServerCapabilities;
use crate::types::{Prompt, QualifiedName, Resource, Tool};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

/// Validates call arguments against a tool's JSON Schema. Pluggable so a
/// stricter validator can be swapped in without touching the registry.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, schema: Option<&Value>, arguments: &Value) -> Result<()>;
}

/// Checks that every key `schema.required` lists is present, that
/// `arguments` is an object whenever the schema's top-level `type` is
/// `"object"`, and that every provided key also declared in
/// `schema.properties` matches its declared top-level `type`. Does not
/// recurse into nested property schemas.
pub struct DefaultSchemaValidator;

impl SchemaValidator for DefaultSchemaValidator {
    fn validate(&self, schema: Option<&Value>, arguments: &Value) -> Result<()> {
        let Some(schema) = schema else {
            return Ok(());
        };

        if let Some(expected_type) = schema.get("type").and_then(Value::as_str) {
            if expected_type == "object" && !arguments.is_object() {
                return Err(Error::Validation(format!(
                    "expected an object argument, got {}",
                    describe_json_type(arguments)
                )));
            }
        }

        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            let object = arguments.as_object();
            for key in required {
                let Some(key) = key.as_str() else { continue };
                let present = object.map(|o| o.contains_key(key)).unwrap_or(false);
                if !present {
                    return Err(Error::Validation(format!("missing required argument '{key}'")));
                }
            }
        }

        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            if let Some(object) = arguments.as_object() {
                for (key, value) in object {
                    let Some(expected_type) =
                        properties.get(key).and_then(|p| p.get("type")).and_then(Value::as_str)
                    else {
                        continue;
                    };
                    if !json_type_matches(expected_type, value) {
                        return Err(Error::Validation(format!(
                            "argument '{key}' expected type '{expected_type}', got {}",
                            describe_json_type(value)
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Whether `value`'s concrete JSON type matches a JSON Schema `type` name.
/// `"integer"` additionally requires the number have no fractional part.
fn json_type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "number" => value.is_number(),
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn describe_json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// What a capability name resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub server: String,
    pub name: String,
}

/// Owns the set of tools, prompts, and resources currently advertised by
/// every `Ready` server, keyed by the server that registered them.
pub struct CapabilityRegistry {
    tools: DashMap<QualifiedName, Tool>,
    prompts: DashMap<QualifiedName, Prompt>,
    resources: DashMap<QualifiedName, Resource>,
    tool_owners: DashMap<String, Vec<String>>,
    prompt_owners: DashMap<String, Vec<String>>,
    resource_owners: DashMap<String, Vec<String>>,
    validator: Arc<dyn SchemaValidator>,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new(Arc::new(DefaultSchemaValidator))
    }
}

impl CapabilityRegistry {
    pub fn new(validator: Arc<dyn SchemaValidator>) -> Self {
        Self {
            tools: DashMap::new(),
            prompts: DashMap::new(),
            resources: DashMap::new(),
            tool_owners: DashMap::new(),
            prompt_owners: DashMap::new(),
            resource_owners: DashMap::new(),
            validator,
        }
    }

    /// Registers everything a server advertised during its `initialize`
    /// handshake. Call [`Self::unregister_server`] first if re-registering.
    pub fn register_server(&self, server: &str, capabilities: &ServerCapabilities) {
        for tool in &capabilities.tools {
            self.tools
                .insert(QualifiedName::new(server, &tool.name), tool.clone());
            self.tool_owners
                .entry(tool.name.clone())
                .or_default()
                .push(server.to_string());
        }
        for prompt in &capabilities.prompts {
            self.prompts
                .insert(QualifiedName::new(server, &prompt.name), prompt.clone());
            self.prompt_owners
                .entry(prompt.name.clone())
                .or_default()
                .push(server.to_string());
        }
        for resource in &capabilities.resources {
            self.resources
                .insert(QualifiedName::new(server, &resource.uri), resource.clone());
            self.resource_owners
                .entry(resource.uri.clone())
                .or_default()
                .push(server.to_string());
        }
    }

    /// Removes every capability owned by `server`, e.g. when it is promoted
    /// to `Unavailable`.
    pub fn unregister_server(&self, server: &str) {
        self.tools.retain(|key, _| key.server != server);
        self.prompts.retain(|key, _| key.server != server);
        self.resources.retain(|key, _| key.server != server);
        for mut owners in self.tool_owners.iter_mut() {
            owners.retain(|s| s != server);
        }
        for mut owners in self.prompt_owners.iter_mut() {
            owners.retain(|s| s != server);
        }
        for mut owners in self.resource_owners.iter_mut() {
            owners.retain(|s| s != server);
        }
    }

    pub fn resolve_tool(&self, name: &str) -> Result<Resolved> {
        resolve(name, &self.tool_owners, "tool")
    }

    pub fn resolve_prompt(&self, name: &str) -> Result<Resolved> {
        resolve(name, &self.prompt_owners, "prompt")
    }

    pub fn resolve_resource(&self, uri: &str) -> Result<Resolved> {
        resolve_resource_uri(uri, &self.resource_owners)
    }

    pub fn tool(&self, resolved: &Resolved) -> Option<Tool> {
        self.tools
            .get(&QualifiedName::new(&resolved.server, &resolved.name))
            .map(|r| r.clone())
    }

    pub fn validate_tool_arguments(&self, resolved: &Resolved, arguments: &Value) -> Result<()> {
        let tool = self.tool(resolved);
        let schema = tool.as_ref().and_then(|t| t.input_schema.as_ref());
        self.validator.validate(schema, arguments)
    }

    pub fn all_tools(&self) -> Vec<(QualifiedName, Tool)> {
        self.tools.iter().map(|r| (r.key().clone(), r.value().clone())).collect()
    }

    pub fn all_prompts(&self) -> Vec<(QualifiedName, Prompt)> {
        self.prompts.iter().map(|r| (r.key().clone(), r.value().clone())).collect()
    }

    pub fn all_resources(&self) -> Vec<(QualifiedName, Resource)> {
        self.resources.iter().map(|r| (r.key().clone(), r.value().clone())).collect()
    }

    pub fn tool_count(&self, server: &str) -> usize {
        self.tools.iter().filter(|r| r.key().server == server).count()
    }

    pub fn prompt_count(&self, server: &str) -> usize {
        self.prompts.iter().filter(|r| r.key().server == server).count()
    }

    pub fn resource_count(&self, server: &str) -> usize {
        self.resources.iter().filter(|r| r.key().server == server).count()
    }
}

/// Resolves a bare or `server.name`-qualified capability name against an
/// owners map, returning an ambiguity error if a bare name is registered by
/// more than one server and an unknown-capability error if it's registered
/// by none.
fn resolve(query: &str, owners: &DashMap<String, Vec<String>>, kind: &str) -> Result<Resolved> {
    if let Some((server, name)) = query.split_once('.') {
        if let Some(candidates) = owners.get(name) {
            if candidates.contains(&server.to_string()) {
                return Ok(Resolved {
                    server: server.to_string(),
                    name: name.to_string(),
                });
            }
        }
        return Err(Error::Routing(format!(
            "no {kind} '{name}' registered by server '{server}'"
        )));
    }

    match owners.get(query) {
        None => Err(Error::Routing(format!("unknown {kind} '{query}'"))),
        Some(candidates) if candidates.is_empty() => Err(Error::Routing(format!("unknown {kind} '{query}'"))),
        Some(candidates) if candidates.len() == 1 => Ok(Resolved {
            server: candidates[0].clone(),
            name: query.to_string(),
        }),
        Some(candidates) => Err(Error::Routing(format!(
            "'{query}' is ambiguous: provided by servers [{}]; qualify as 'server.{query}'",
            candidates.join(", ")
        ))),
    }
}

/// Resolves a resource by its full URI. Resources have no qualified
/// `server.name` form -- the URI is globally unique across servers, and the
/// first server to have registered it wins.
fn resolve_resource_uri(uri: &str, owners: &DashMap<String, Vec<String>>) -> Result<Resolved> {
    match owners.get(uri) {
        None => Err(Error::Routing(format!("unknown resource '{uri}'"))),
        Some(candidates) if candidates.is_empty() => Err(Error::Routing(format!("unknown resource '{uri}'"))),
        Some(candidates) => Ok(Resolved {
            server: candidates[0].clone(),
            name: uri.to_string(),
        }),
    }
}
