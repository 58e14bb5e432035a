//! `vsphere_license` resource

use super::{Resource, ResourceResult, ResourceState};
use crate::client::ApiSession;
use crate::labels::{compare_labels, labels_to_map, map_to_labels, LabelError};
use crate::license::{redact_key, LicenseInfo, LicenseManager};
use crate::schema::{Diagnostic, NestedBlock, ResourceSchema, SchemaAttribute, SchemaBlock};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::fmt::Display;

const COMPUTED: &[&str] = &["id", "edition_key", "name", "total", "used"];

fn remote_error(action: &str, err: impl Display) -> Vec<Diagnostic> {
    vec![Diagnostic::error(&format!("error while {} license key: {}", action, err))]
}

fn label_error(err: LabelError) -> Vec<Diagnostic> {
    vec![Diagnostic::error(&format!("invalid label: {}", err)).with_attribute(vec!["label".to_string()])]
}

async fn is_present(manager: &LicenseManager, key: &str) -> ResourceResult<bool> {
    manager
        .is_key_present(key)
        .await
        .map_err(|e| remote_error("deleting", e))
}

fn license_key(state: &ResourceState) -> ResourceResult<String> {
    state
        .id()
        .or_else(|| state.get_string("license_key"))
        .ok_or_else(|| vec![Diagnostic::error("license_key is required")])
}

pub struct LicenseResource;

impl LicenseResource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LicenseResource {
    fn default() -> Self {
        Self::new()
    }
}

/// Project a license record onto state, keeping the configured label order
/// when it already matches the server.
fn state_from_info(current: &ResourceState, info: &LicenseInfo) -> ResourceResult<ResourceState> {
    let mut state = current.clone();
    state.set("id", json!(info.license_key));
    state.set("license_key", json!(info.license_key));
    state.set("edition_key", json!(info.edition_key));
    state.set("name", json!(info.name));
    state.set("total", json!(info.total));
    state.set("used", json!(info.used));

    let configured = labels_to_map(current.get_list("label")).map_err(label_error)?;
    if compare_labels(&configured, &info.labels).is_err() {
        let remote: HashMap<String, String> = info
            .labels
            .iter()
            .map(|kv| (kv.key.clone(), kv.value.clone()))
            .collect();
        state.set("label", json!(map_to_labels(&remote)));
    }
    Ok(state)
}

#[async_trait]
impl Resource for LicenseResource {
    fn type_name(&self) -> &str {
        "vsphere_license"
    }

    fn schema(&self) -> ResourceSchema {
        let label_block = SchemaBlock::new()
            .with_attribute("key", SchemaAttribute::string().with_description("Label key").required())
            .with_attribute(
                "value",
                SchemaAttribute::string().with_description("Label value").required(),
            );

        let block = SchemaBlock::new()
            .with_attribute(
                "id",
                SchemaAttribute::string()
                    .with_description("Same as license_key")
                    .computed(),
            )
            .with_attribute(
                "license_key",
                SchemaAttribute::string()
                    .with_description("The license key to add")
                    .required()
                    .force_new(),
            )
            .with_block("label", NestedBlock::list(label_block))
            .with_attribute(
                "edition_key",
                SchemaAttribute::string()
                    .with_description("The product edition of the license key")
                    .computed(),
            )
            .with_attribute(
                "name",
                SchemaAttribute::string()
                    .with_description("The display name for the license")
                    .computed(),
            )
            .with_attribute(
                "total",
                SchemaAttribute::number()
                    .with_description("Total units (CPUs, VMs, ...) the key provides")
                    .computed(),
            )
            .with_attribute(
                "used",
                SchemaAttribute::number()
                    .with_description("Units currently consumed by this key")
                    .computed(),
            )
            .with_description("Provides a VMware vSphere license resource");

        ResourceSchema::new(1, block)
    }

    async fn create(
        &self,
        session: &ApiSession,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let key = planned
            .get_string("license_key")
            .ok_or_else(|| vec![Diagnostic::error("license_key is required")])?;
        let labels = labels_to_map(planned.get_list("label")).map_err(label_error)?;

        let manager = LicenseManager::new(session).map_err(|e| remote_error("adding", e))?;
        manager.add(&key).await.map_err(|e| remote_error("adding", e))?;

        if !labels.is_empty() {
            manager
                .attach_labels(&key, &labels)
                .await
                .map_err(|e| remote_error("labelling", e))?;
        }

        let mut state = planned.clone();
        state.set("id", json!(key));
        let state = self.read(session, &state).await?;
        if state.is_empty() {
            return Err(vec![Diagnostic::error(&format!(
                "license key {} was not found after it was added",
                redact_key(&key)
            ))]);
        }
        Ok(state)
    }

    async fn read(
        &self,
        session: &ApiSession,
        current: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let key = license_key(current)?;
        let manager = LicenseManager::new(session).map_err(|e| remote_error("reading", e))?;

        match manager.find(&key).await {
            Ok(Some(info)) => state_from_info(current, &info),
            Ok(None) => {
                tracing::warn!(license_key = %redact_key(&key), "license key no longer present");
                Ok(ResourceState::new())
            }
            Err(e) => Err(remote_error("reading", e)),
        }
    }

    async fn update(
        &self,
        session: &ApiSession,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let key = license_key(current)?;
        let old = labels_to_map(current.get_list("label")).map_err(label_error)?;
        let new = labels_to_map(planned.get_list("label")).map_err(label_error)?;

        let manager = LicenseManager::new(session).map_err(|e| remote_error("updating", e))?;

        let mut removed: Vec<&String> = old.keys().filter(|k| !new.contains_key(*k)).collect();
        removed.sort();
        for label in removed {
            manager
                .remove_label(&key, label)
                .await
                .map_err(|e| remote_error("updating", e))?;
        }

        let changed: HashMap<String, String> = new
            .iter()
            .filter(|(k, v)| old.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        manager
            .attach_labels(&key, &changed)
            .await
            .map_err(|e| remote_error("updating", e))?;

        let mut state = planned.clone();
        state.carry_over(current, COMPUTED);
        Ok(state)
    }

    async fn delete(&self, session: &ApiSession, current: &ResourceState) -> ResourceResult<()> {
        let key = license_key(current)?;
        let manager = LicenseManager::new(session).map_err(|e| remote_error("deleting", e))?;

        if !is_present(&manager, &key).await? {
            return Ok(());
        }

        manager
            .remove(&key)
            .await
            .map_err(|e| remote_error("deleting", e))?;

        if is_present(&manager, &key).await? {
            return Err(vec![Diagnostic::error(&format!(
                "error deleting license key {}: the key is still present on the server",
                redact_key(&key)
            ))]);
        }
        Ok(())
    }
}
