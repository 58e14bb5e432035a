//! Terraform Resources for vSphere
//!
//! Shared state handling and the [`Resource`] trait implemented by each
//! managed resource type.

mod license;
mod namespace;

pub use license::LicenseResource;
pub use namespace::{
    expand_access_list, expand_storage_specifications, ExpandError, NamespaceResource,
};

use crate::client::ApiSession;
use crate::schema::{Diagnostic, ResourceSchema, SchemaBlock};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Result type for resource operations
pub type ResourceResult<T> = Result<T, Vec<Diagnostic>>;

/// Resource state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub values: HashMap<String, Value>,
}

impl ResourceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from a JSON object; anything else yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_object().map(|obj| Self {
            values: obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str()).map(String::from)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    /// Repeated nested block; missing and null both read as empty.
    pub fn get_list(&self, key: &str) -> &[Value] {
        self.get(key)
            .and_then(|v| v.as_array())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn id(&self) -> Option<String> {
        self.get_string("id").filter(|id| !id.is_empty())
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    /// Copy `keys` over from `other` where present.
    pub fn carry_over(&mut self, other: &ResourceState, keys: &[&str]) {
        for key in keys {
            if let Some(value) = other.get(key) {
                self.set(key, value.clone());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Outcome of planning a change
#[derive(Debug, Clone)]
pub struct PlannedChange {
    pub planned_state: ResourceState,
    /// Attributes whose change forces replacement.
    pub requires_replace: Vec<String>,
}

/// Resource trait
#[async_trait]
pub trait Resource: Send + Sync {
    /// Resource type name
    fn type_name(&self) -> &str;

    /// Get the schema for this resource
    fn schema(&self) -> ResourceSchema;

    /// Validate configuration without contacting the server
    fn validate(&self, config: &ResourceState) -> Vec<Diagnostic> {
        validate_block(&self.schema().block, &config.values, &[])
    }

    /// Create a new resource
    async fn create(
        &self,
        session: &ApiSession,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState>;

    /// Read an existing resource; an empty state means it is gone
    async fn read(
        &self,
        session: &ApiSession,
        current: &ResourceState,
    ) -> ResourceResult<ResourceState>;

    /// Update an existing resource
    async fn update(
        &self,
        session: &ApiSession,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState>;

    /// Delete a resource
    async fn delete(&self, session: &ApiSession, current: &ResourceState) -> ResourceResult<()>;

    /// Plan changes
    fn plan_change(
        &self,
        current: Option<&ResourceState>,
        proposed: &ResourceState,
    ) -> ResourceResult<PlannedChange> {
        let requires_replace = match current {
            Some(prior) if !prior.is_empty() => self
                .schema()
                .block
                .force_new_attributes()
                .into_iter()
                .filter(|name| prior.get(name) != proposed.get(name))
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        };

        Ok(PlannedChange {
            planned_state: proposed.clone(),
            requires_replace,
        })
    }
}

fn attribute_path(prefix: &[String], name: &str) -> Vec<String> {
    let mut path = prefix.to_vec();
    path.push(name.to_string());
    path
}

/// Check required attributes, allowed values and nested block shapes.
pub fn validate_block(
    block: &SchemaBlock,
    values: &HashMap<String, Value>,
    prefix: &[String],
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let mut names: Vec<&String> = block.attributes.keys().collect();
    names.sort();
    for name in names {
        let attr = &block.attributes[name];
        let value = values.get(name.as_str()).filter(|v| !v.is_null());

        match value {
            None if attr.required => diagnostics.push(
                Diagnostic::error(&format!("{} is required", name))
                    .with_attribute(attribute_path(prefix, name)),
            ),
            Some(value) => {
                if let Some(allowed) = &attr.allowed_values {
                    let text = value.as_str().unwrap_or_default();
                    if !allowed.iter().any(|a| a == text) {
                        diagnostics.push(
                            Diagnostic::error(&format!(
                                "expected {} to be one of {:?}, got {}",
                                name, allowed, value
                            ))
                            .with_attribute(attribute_path(prefix, name)),
                        );
                    }
                }
            }
            None => {}
        }
    }

    let mut blocks: Vec<&String> = block.blocks.keys().collect();
    blocks.sort();
    for name in blocks {
        let nested = &block.blocks[name];
        let entries = match values.get(name.as_str()) {
            None | Some(Value::Null) => continue,
            Some(Value::Array(entries)) => entries,
            Some(_) => {
                diagnostics.push(
                    Diagnostic::error(&format!("{} must be a list of blocks", name))
                        .with_attribute(attribute_path(prefix, name)),
                );
                continue;
            }
        };

        for (index, entry) in entries.iter().enumerate() {
            let mut path = attribute_path(prefix, name);
            path.push(index.to_string());
            match entry.as_object() {
                Some(obj) => {
                    let fields: HashMap<String, Value> =
                        obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                    diagnostics.extend(validate_block(&nested.block, &fields, &path));
                }
                None => diagnostics.push(
                    Diagnostic::error(&format!("{} entries must be blocks", name))
                        .with_attribute(path),
                ),
            }
        }
    }

    diagnostics
}

/// Get all available resources
pub fn get_all_resources() -> Vec<Box<dyn Resource>> {
    vec![
        Box::new(LicenseResource::new()),
        Box::new(NamespaceResource::new()),
    ]
}
