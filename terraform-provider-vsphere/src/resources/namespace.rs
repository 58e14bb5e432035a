//! `vsphere_namespace` resource

use super::{Resource, ResourceResult, ResourceState};
use crate::client::ApiSession;
use crate::namespaces::{
    Access, AccessRole, CreateSpec, NamespaceInfo, NamespacesApi, StorageSpec, SubjectType,
    UpdateSpec,
};
use crate::schema::{
    AttributeType, Diagnostic, NestedBlock, ResourceSchema, SchemaAttribute, SchemaBlock,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::fmt::Display;
use thiserror::Error;

const COMPUTED: &[&str] = &["id", "configuration_status", "instance_stats"];

/// Errors turning nested blocks into typed records
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExpandError {
    #[error("{block}.{index} is not a block")]
    NotABlock { block: &'static str, index: usize },
    #[error("{block}.{index}.{field} is required")]
    MissingField {
        block: &'static str,
        index: usize,
        field: &'static str,
    },
    #[error("{block}.{index}.{field}: expected one of {allowed:?}, got {value:?}")]
    NotAllowed {
        block: &'static str,
        index: usize,
        field: &'static str,
        value: String,
        allowed: &'static [&'static str],
    },
    #[error("{block}.{index}.{field} must be an integer")]
    NotAnInteger {
        block: &'static str,
        index: usize,
        field: &'static str,
    },
}

impl ExpandError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        let (block, index, field) = match self {
            ExpandError::NotABlock { block, index } => (*block, *index, None),
            ExpandError::MissingField { block, index, field }
            | ExpandError::NotAllowed { block, index, field, .. }
            | ExpandError::NotAnInteger { block, index, field } => (*block, *index, Some(*field)),
        };

        let mut path = vec![block.to_string(), index.to_string()];
        path.extend(field.map(String::from));
        Diagnostic::error(&self.to_string()).with_attribute(path)
    }
}

struct Entry<'a> {
    block: &'static str,
    index: usize,
    fields: &'a Map<String, Value>,
}

impl<'a> Entry<'a> {
    fn new(block: &'static str, index: usize, value: &'a Value) -> Result<Self, ExpandError> {
        let fields = value
            .as_object()
            .ok_or(ExpandError::NotABlock { block, index })?;
        Ok(Self {
            block,
            index,
            fields,
        })
    }

    fn string(&self, field: &'static str) -> Result<String, ExpandError> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or(ExpandError::MissingField {
                block: self.block,
                index: self.index,
                field,
            })
    }

    fn one_of<T: std::str::FromStr>(
        &self,
        field: &'static str,
        allowed: &'static [&'static str],
    ) -> Result<T, ExpandError> {
        let raw = self.string(field)?;
        raw.parse().map_err(|_| ExpandError::NotAllowed {
            block: self.block,
            index: self.index,
            field,
            value: raw.clone(),
            allowed,
        })
    }

    fn optional_i64(&self, field: &'static str) -> Result<Option<i64>, ExpandError> {
        match self.fields.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_i64().map(Some).ok_or(ExpandError::NotAnInteger {
                block: self.block,
                index: self.index,
                field,
            }),
        }
    }
}

/// Expand `access_list` blocks into typed entries.
pub fn expand_access_list(entries: &[Value]) -> Result<Vec<Access>, ExpandError> {
    entries
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let entry = Entry::new("access_list", index, value)?;
            Ok(Access {
                subject: entry.string("subject")?,
                subject_type: entry.one_of::<SubjectType>("subject_type", SubjectType::ALLOWED)?,
                domain: entry.string("domain")?,
                role: entry.one_of::<AccessRole>("role", AccessRole::ALLOWED)?,
            })
        })
        .collect()
}

/// Expand `storage_specifications` blocks. A zero limit means no limit.
pub fn expand_storage_specifications(entries: &[Value]) -> Result<Vec<StorageSpec>, ExpandError> {
    entries
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let entry = Entry::new("storage_specifications", index, value)?;
            Ok(StorageSpec {
                policy: entry.string("policy")?,
                limit: entry.optional_i64("limit")?.filter(|limit| *limit != 0),
            })
        })
        .collect()
}

fn remote_error(action: &str, err: impl Display) -> Vec<Diagnostic> {
    vec![Diagnostic::error(&format!("error while {} namespace: {}", action, err))]
}

fn namespace_id(state: &ResourceState) -> ResourceResult<String> {
    state
        .id()
        .or_else(|| state.get_string("namespace"))
        .ok_or_else(|| vec![Diagnostic::error("namespace ID is required")])
}

/// Declared description, access list and storage specifications.
fn mutable_fields(
    planned: &ResourceState,
) -> ResourceResult<(String, Vec<Access>, Vec<StorageSpec>)> {
    let description = planned.get_string("description").unwrap_or_default();
    let access_list =
        expand_access_list(planned.get_list("access_list")).map_err(|e| vec![e.to_diagnostic()])?;
    let storage_specs = expand_storage_specifications(planned.get_list("storage_specifications"))
        .map_err(|e| vec![e.to_diagnostic()])?;
    Ok((description, access_list, storage_specs))
}

fn apply_info(state: &mut ResourceState, namespace: &str, info: &NamespaceInfo) {
    state.set("id", json!(namespace));
    state.set("namespace", json!(namespace));
    state.set("cluster", json!(info.cluster));
    state.set("configuration_status", json!(info.config_status.as_str()));
    if !info.description.is_empty() || state.get("description").is_some() {
        state.set("description", json!(info.description));
    }
    state.set(
        "instance_stats",
        json!({
            "cpu_used": info.stats.cpu_used,
            "memory_used": info.stats.memory_used,
            "storage_used": info.stats.storage_used,
        }),
    );
}

pub struct NamespaceResource;

impl NamespaceResource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NamespaceResource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resource for NamespaceResource {
    fn type_name(&self) -> &str {
        "vsphere_namespace"
    }

    fn schema(&self) -> ResourceSchema {
        let access_block = SchemaBlock::new()
            .with_attribute(
                "subject",
                SchemaAttribute::string()
                    .with_description("Name of the subject.")
                    .required(),
            )
            .with_attribute(
                "subject_type",
                SchemaAttribute::string()
                    .with_description("Type of the subject.")
                    .required()
                    .one_of(SubjectType::ALLOWED),
            )
            .with_attribute(
                "domain",
                SchemaAttribute::string()
                    .with_description("Domain of the subject.")
                    .required(),
            )
            .with_attribute(
                "role",
                SchemaAttribute::string()
                    .with_description("Role of the subject on the namespace instance.")
                    .required()
                    .one_of(AccessRole::ALLOWED),
            );

        let storage_block = SchemaBlock::new()
            .with_attribute(
                "policy",
                SchemaAttribute::string()
                    .with_description("ID of the storage policy backing the namespace storage class.")
                    .required(),
            )
            .with_attribute(
                "limit",
                SchemaAttribute::number()
                    .with_description("Maximum storage in mebibytes for this specification. If unset, no limit is placed.")
                    .optional(),
            );

        let block = SchemaBlock::new()
            .with_attribute(
                "id",
                SchemaAttribute::string()
                    .with_description("Same as namespace")
                    .computed(),
            )
            .with_attribute(
                "namespace",
                SchemaAttribute::string()
                    .with_description("Identifier of the namespace, unique per vCenter server. DNS label rules apply.")
                    .required()
                    .force_new(),
            )
            .with_attribute(
                "cluster",
                SchemaAttribute::string()
                    .with_description("Identifier of the cluster on which the namespace is created.")
                    .required()
                    .force_new(),
            )
            .with_attribute(
                "description",
                SchemaAttribute::string()
                    .with_description("Description for the namespace.")
                    .optional(),
            )
            .with_block("access_list", NestedBlock::list(access_block))
            .with_block("storage_specifications", NestedBlock::list(storage_block))
            .with_attribute(
                "configuration_status",
                SchemaAttribute::string()
                    .with_description("CONFIGURING, REMOVING, RUNNING or ERROR.")
                    .computed(),
            )
            .with_attribute(
                "instance_stats",
                SchemaAttribute::map(AttributeType::Number)
                    .with_description("Basic runtime statistics: cpu_used, memory_used, storage_used.")
                    .computed(),
            )
            .with_description("Manages a vSphere with Tanzu namespace");

        ResourceSchema::new(1, block)
    }

    async fn create(
        &self,
        session: &ApiSession,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let namespace = planned
            .get_string("namespace")
            .ok_or_else(|| vec![Diagnostic::error("namespace is required")])?;
        let cluster = planned
            .get_string("cluster")
            .ok_or_else(|| vec![Diagnostic::error("cluster is required")])?;
        let (description, access_list, storage_specs) = mutable_fields(planned)?;

        let spec = CreateSpec {
            cluster,
            namespace: namespace.clone(),
            description,
            access_list,
            storage_specs,
        };

        let api = NamespacesApi::new(session).map_err(|e| remote_error("creating", e))?;
        api.create(&spec)
            .await
            .map_err(|e| remote_error("creating", e))?;

        let mut state = planned.clone();
        state.set("id", json!(namespace));
        self.read(session, &state).await
    }

    async fn read(
        &self,
        session: &ApiSession,
        current: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let namespace = namespace_id(current)?;

        let api = NamespacesApi::new(session).map_err(|e| remote_error("reading", e))?;
        let info = api
            .get(&namespace)
            .await
            .map_err(|e| remote_error("reading", e))?;

        tracing::debug!(
            namespace = %namespace,
            status = %info.config_status,
            cpu_used = info.stats.cpu_used,
            memory_used = info.stats.memory_used,
            storage_used = info.stats.storage_used,
            "read namespace"
        );

        let mut state = current.clone();
        apply_info(&mut state, &namespace, &info);
        Ok(state)
    }

    async fn update(
        &self,
        session: &ApiSession,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let namespace = namespace_id(current)?;
        let (description, access_list, storage_specs) = mutable_fields(planned)?;

        let api = NamespacesApi::new(session).map_err(|e| remote_error("updating", e))?;
        api.update(
            &namespace,
            &UpdateSpec {
                description,
                access_list,
                storage_specs,
            },
        )
        .await
        .map_err(|e| remote_error("updating", e))?;

        let mut state = planned.clone();
        state.carry_over(current, COMPUTED);
        state.carry_over(current, &["namespace", "cluster"]);
        Ok(state)
    }

    async fn delete(&self, session: &ApiSession, current: &ResourceState) -> ResourceResult<()> {
        let namespace = namespace_id(current)?;

        let api = NamespacesApi::new(session).map_err(|e| remote_error("deleting", e))?;
        api.delete(&namespace)
            .await
            .map_err(|e| remote_error("deleting", e))
    }
}
