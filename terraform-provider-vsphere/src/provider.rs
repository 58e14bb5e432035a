//! Terraform Provider Implementation
//!
//! Implements the Terraform Plugin Protocol for vSphere.

use crate::client::ApiSession;
use crate::config::ProviderConfig;
use crate::resources::{get_all_resources, Resource, ResourceState};
use crate::schema::{
    Diagnostic, ProviderSchema, RpcRequest, RpcResponse, SchemaAttribute, SchemaBlock,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tokio::runtime::Runtime;

/// vSphere Terraform Provider
pub struct VsphereProvider {
    session: RwLock<Option<ApiSession>>,
    resources: HashMap<String, Box<dyn Resource>>,
    runtime: Runtime,
}

fn state_param(params: &Value, key: &str) -> Option<ResourceState> {
    params.get(key).and_then(ResourceState::from_value)
}

impl VsphereProvider {
    /// Create a new provider
    pub fn new() -> std::io::Result<Self> {
        let resources: HashMap<String, Box<dyn Resource>> = get_all_resources()
            .into_iter()
            .map(|r| (r.type_name().to_string(), r))
            .collect();

        Ok(Self {
            session: RwLock::new(None),
            resources,
            runtime: Runtime::new()?,
        })
    }

    /// Get provider schema
    fn get_schema(&self) -> ProviderSchema {
        let provider_block = SchemaBlock::new()
            .with_attribute(
                "vsphere_server",
                SchemaAttribute::string()
                    .with_description("The vCenter server name or URL. Can also be set with VSPHERE_SERVER.")
                    .optional(),
            )
            .with_attribute(
                "user",
                SchemaAttribute::string()
                    .with_description("The user name for vSphere API operations. Can also be set with VSPHERE_USER.")
                    .optional(),
            )
            .with_attribute(
                "password",
                SchemaAttribute::string()
                    .with_description("The user password for vSphere API operations. Can also be set with VSPHERE_PASSWORD.")
                    .optional()
                    .sensitive(),
            )
            .with_attribute(
                "allow_unverified_ssl",
                SchemaAttribute::bool()
                    .with_description("Skip TLS certificate verification. Can also be set with VSPHERE_ALLOW_UNVERIFIED_SSL.")
                    .optional()
                    .with_default(serde_json::json!(false)),
            )
            .with_attribute(
                "api_timeout",
                SchemaAttribute::number()
                    .with_description("Timeout in seconds for each API call. Can also be set with VSPHERE_API_TIMEOUT.")
                    .optional(),
            )
            .with_description("VMware vSphere provider");

        let mut schema = ProviderSchema::new(provider_block);

        for (name, resource) in &self.resources {
            schema = schema.with_resource(name, resource.schema());
        }

        schema
    }

    /// Configure the provider
    fn configure(&self, config: ProviderConfig) -> Vec<Diagnostic> {
        let connection = match config.resolve() {
            Ok(c) => c,
            Err(e) => return vec![Diagnostic::error(&e.to_string())],
        };

        tracing::info!(
            server = %connection.base_url,
            insecure = connection.insecure,
            "configuring vSphere provider"
        );

        match self.runtime.block_on(ApiSession::login(&connection)) {
            Ok(session) => {
                *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
                Vec::new()
            }
            Err(e) => vec![Diagnostic::error(&format!(
                "error setting up REST client: {}",
                e
            ))],
        }
    }

    /// Get the configured session
    fn get_session(&self) -> Result<ApiSession, Diagnostic> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Diagnostic::error("Provider not configured"))
    }

    fn resource(&self, params: &Value) -> Result<&dyn Resource, Diagnostic> {
        let type_name = params
            .get("type_name")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        self.resources
            .get(type_name)
            .map(|r| r.as_ref())
            .ok_or_else(|| Diagnostic::error(&format!("Unknown resource type: {}", type_name)))
    }

    /// Handle an RPC request
    pub fn handle_request(&self, input: &str) -> String {
        let request: RpcRequest = match serde_json::from_str(input) {
            Ok(r) => r,
            Err(e) => {
                return serde_json::to_string(&RpcResponse::error(
                    0,
                    -32700,
                    &format!("Parse error: {}", e),
                ))
                .unwrap_or_default();
            }
        };

        tracing::debug!(method = %request.method, id = request.id, "handling request");

        let response = match request.method.as_str() {
            "GetProviderSchema" => self.handle_get_schema(request.id),
            "ConfigureProvider" => self.handle_configure(request.id, &request.params),
            "ValidateResourceConfig" => {
                self.handle_validate_resource(request.id, &request.params)
            }
            "PlanResourceChange" => self.handle_plan_resource(request.id, &request.params),
            "ApplyResourceChange" => self.handle_apply_resource(request.id, &request.params),
            "ReadResource" => self.handle_read_resource(request.id, &request.params),
            "ImportResourceState" => self.handle_import_resource(request.id, &request.params),
            "StopProvider" => self.handle_stop(request.id),
            _ => RpcResponse::error(
                request.id,
                -32601,
                &format!("Method not found: {}", request.method),
            ),
        };

        serde_json::to_string(&response).unwrap_or_else(|e| {
            serde_json::to_string(&RpcResponse::error(
                request.id,
                -32603,
                &format!("Serialization error: {}", e),
            ))
            .unwrap_or_default()
        })
    }

    /// Handle GetProviderSchema
    fn handle_get_schema(&self, id: i64) -> RpcResponse {
        let schema = self.get_schema();
        RpcResponse::success(id, serde_json::to_value(schema).unwrap_or_default())
    }

    /// Handle ConfigureProvider
    fn handle_configure(&self, id: i64, params: &Value) -> RpcResponse {
        let config: ProviderConfig = match params.get("config") {
            None | Some(Value::Null) => ProviderConfig::default(),
            Some(raw) => match serde_json::from_value(raw.clone()) {
                Ok(config) => config,
                Err(e) => {
                    return RpcResponse::diagnostics(
                        id,
                        &[Diagnostic::error(&format!("invalid provider configuration: {}", e))],
                    )
                }
            },
        };

        RpcResponse::diagnostics(id, &self.configure(config))
    }

    /// Handle ValidateResourceConfig
    fn handle_validate_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.resource(params) {
            Ok(r) => r,
            Err(diag) => return RpcResponse::diagnostics(id, &[diag]),
        };

        let config = state_param(params, "config").unwrap_or_default();
        RpcResponse::diagnostics(id, &resource.validate(&config))
    }

    /// Handle PlanResourceChange
    fn handle_plan_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.resource(params) {
            Ok(r) => r,
            Err(diag) => return RpcResponse::diagnostics(id, &[diag]),
        };

        let proposed_state = state_param(params, "proposed_new_state").unwrap_or_default();
        let prior_state = state_param(params, "prior_state");

        match resource.plan_change(prior_state.as_ref(), &proposed_state) {
            Ok(plan) => RpcResponse::success(
                id,
                serde_json::json!({
                    "planned_state": plan.planned_state.values,
                    "requires_replace": plan.requires_replace,
                    "diagnostics": []
                }),
            ),
            Err(diagnostics) => RpcResponse::diagnostics(id, &diagnostics),
        }
    }

    /// Handle ApplyResourceChange
    fn handle_apply_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.resource(params) {
            Ok(r) => r,
            Err(diag) => return RpcResponse::diagnostics(id, &[diag]),
        };

        let session = match self.get_session() {
            Ok(s) => s,
            Err(diag) => return RpcResponse::diagnostics(id, &[diag]),
        };

        let planned_state = state_param(params, "planned_state");
        let prior_state = state_param(params, "prior_state");

        let result = self.runtime.block_on(async {
            match (prior_state, planned_state) {
                (Some(prior), None) => resource.delete(&session, &prior).await.map(|_| None),
                (None, None) => Ok(None),
                (None, Some(planned)) => resource.create(&session, &planned).await.map(Some),
                (Some(prior), Some(planned)) => resource
                    .update(&session, &prior, &planned)
                    .await
                    .map(Some),
            }
        });

        match result {
            Ok(new_state) => RpcResponse::success(
                id,
                serde_json::json!({
                    "new_state": new_state.map(|s| s.values),
                    "diagnostics": []
                }),
            ),
            Err(diagnostics) => RpcResponse::diagnostics(id, &diagnostics),
        }
    }

    /// Handle ReadResource
    fn handle_read_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.resource(params) {
            Ok(r) => r,
            Err(diag) => return RpcResponse::diagnostics(id, &[diag]),
        };

        let session = match self.get_session() {
            Ok(s) => s,
            Err(diag) => return RpcResponse::diagnostics(id, &[diag]),
        };

        let current_state = state_param(params, "current_state").unwrap_or_default();

        let result = self
            .runtime
            .block_on(resource.read(&session, &current_state));

        match result {
            // An empty state means the object is gone
            Ok(state) if state.is_empty() => {
                let warning = Diagnostic::warning(&format!(
                    "{} no longer exists",
                    resource.type_name()
                ))
                .with_detail(&format!(
                    "{} was not found on the server and will be removed from state.",
                    current_state.id().unwrap_or_default()
                ));
                RpcResponse::success(
                    id,
                    serde_json::json!({
                        "new_state": null,
                        "diagnostics": [warning]
                    }),
                )
            }
            Ok(state) => RpcResponse::success(
                id,
                serde_json::json!({
                    "new_state": state.values,
                    "diagnostics": []
                }),
            ),
            Err(diagnostics) => RpcResponse::diagnostics(id, &diagnostics),
        }
    }

    /// Handle ImportResourceState
    fn handle_import_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let resource = match self.resource(params) {
            Ok(r) => r,
            Err(diag) => return RpcResponse::diagnostics(id, &[diag]),
        };

        let session = match self.get_session() {
            Ok(s) => s,
            Err(diag) => return RpcResponse::diagnostics(id, &[diag]),
        };

        let resource_id = params.get("id").and_then(|v| v.as_str()).unwrap_or("");

        let mut import_state = ResourceState::new();
        import_state.set("id", serde_json::json!(resource_id));

        let result = self
            .runtime
            .block_on(resource.read(&session, &import_state));

        match result {
            Ok(state) if state.is_empty() => RpcResponse::diagnostics(
                id,
                &[Diagnostic::error(&format!("Resource {} not found", resource_id))],
            ),
            Ok(state) => RpcResponse::success(
                id,
                serde_json::json!({
                    "imported_resources": [{
                        "type_name": resource.type_name(),
                        "state": state.values
                    }],
                    "diagnostics": []
                }),
            ),
            Err(diagnostics) => RpcResponse::diagnostics(id, &diagnostics),
        }
    }

    /// Handle StopProvider by releasing the API session
    fn handle_stop(&self, id: i64) -> RpcResponse {
        let session = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(session) = session {
            if let Err(e) = self.runtime.block_on(session.logout()) {
                tracing::warn!(error = %e, "failed to log out of vSphere API session");
            }
        }

        RpcResponse::success(id, serde_json::json!({}))
    }
}
