//! Namespace instances API
//!
//! Typed wire records for `/api/vcenter/namespaces/instances` and a thin
//! client issuing one call per method.

use crate::client::{ApiSession, ClientError, RequestContext, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const INSTANCES_PATH: &str = "/api/vcenter/namespaces/instances";

/// Role granted to an access-list subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessRole {
    Edit,
    View,
}

impl AccessRole {
    pub const ALLOWED: &'static [&'static str] = &["EDIT", "VIEW"];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessRole::Edit => "EDIT",
            AccessRole::View => "VIEW",
        }
    }
}

impl FromStr for AccessRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "EDIT" => Ok(AccessRole::Edit),
            "VIEW" => Ok(AccessRole::View),
            other => Err(other.to_string()),
        }
    }
}

/// Kind of access-list subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubjectType {
    User,
    Group,
}

impl SubjectType {
    pub const ALLOWED: &'static [&'static str] = &["USER", "GROUP"];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::User => "USER",
            SubjectType::Group => "GROUP",
        }
    }
}

impl FromStr for SubjectType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "USER" => Ok(SubjectType::User),
            "GROUP" => Ok(SubjectType::Group),
            other => Err(other.to_string()),
        }
    }
}

/// Convergence state reported for a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigStatus {
    Configuring,
    Removing,
    Running,
    Error,
}

impl ConfigStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigStatus::Configuring => "CONFIGURING",
            ConfigStatus::Removing => "REMOVING",
            ConfigStatus::Running => "RUNNING",
            ConfigStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for ConfigStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access-control entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    pub subject: String,
    pub subject_type: SubjectType,
    pub domain: String,
    pub role: AccessRole,
}

/// Storage policy binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSpec {
    pub policy: String,
    /// Capacity limit in MiB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateSpec {
    pub cluster: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub access_list: Vec<Access>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub storage_specs: Vec<StorageSpec>,
}

/// Fields accepted on update; cluster and name are fixed at creation.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateSpec {
    /// Always sent: an empty string clears the description.
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub access_list: Vec<Access>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub storage_specs: Vec<StorageSpec>,
}

/// Runtime usage of a namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(default)]
    pub cpu_used: i64,
    #[serde(default)]
    pub memory_used: i64,
    #[serde(default)]
    pub storage_used: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceInfo {
    pub cluster: String,
    pub config_status: ConfigStatus,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub stats: Stats,
    #[serde(default)]
    pub access_list: Vec<Access>,
    #[serde(default)]
    pub storage_specs: Vec<StorageSpec>,
}

fn instance_path(namespace: &str) -> String {
    format!("{}/{}", INSTANCES_PATH, urlencoding::encode(namespace))
}

/// Namespace instances client bound to one request context
pub struct NamespacesApi {
    ctx: RequestContext,
}

impl NamespacesApi {
    pub fn new(session: &ApiSession) -> std::result::Result<Self, ClientError> {
        Ok(Self {
            ctx: session.context()?,
        })
    }

    /// Create a namespace. The server answers 204 and converges asynchronously.
    pub async fn create(&self, spec: &CreateSpec) -> Result<()> {
        tracing::info!(namespace = %spec.namespace, cluster = %spec.cluster, "creating namespace");
        self.ctx.post_no_content(INSTANCES_PATH, spec).await
    }

    pub async fn get(&self, namespace: &str) -> Result<NamespaceInfo> {
        self.ctx.get(&instance_path(namespace)).await
    }

    pub async fn update(&self, namespace: &str, spec: &UpdateSpec) -> Result<()> {
        tracing::info!(namespace, "updating namespace");
        self.ctx.patch(&instance_path(namespace), spec).await
    }

    pub async fn delete(&self, namespace: &str) -> Result<()> {
        tracing::info!(namespace, "deleting namespace");
        self.ctx.delete(&instance_path(namespace)).await
    }
}
