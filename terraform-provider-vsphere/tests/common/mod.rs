//! In-process vCenter stand-in for integration tests
//!
//! Serves just enough of the session, licensing and namespace REST surface
//! to drive the resources end to end.

#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use terraform_provider_vsphere::client::ApiSession;
use terraform_provider_vsphere::config::ConnectionConfig;
use terraform_provider_vsphere::ResourceState;

pub const USER: &str = "administrator@vsphere.local";
pub const PASSWORD: &str = "VMware1!";
/// base64 of `administrator@vsphere.local:VMware1!`
const BASIC_AUTH: &str = "Basic YWRtaW5pc3RyYXRvckB2c3BoZXJlLmxvY2FsOlZNd2FyZTEh";
pub const SESSION_ID: &str = "b00f0e2c8f5d4e1b9a7c3d2e1f0a9b8c";

/// Keys the mock activation service refuses.
pub const INVALID_KEY: &str = "HN422-47193-58V7M-03086-0JAN2";
pub const VALID_KEY: &str = "4J2TK-K82DJ-28XK8-0J2R6-2Z7M4";

#[derive(Default)]
pub struct MockState {
    pub licenses: Vec<Value>,
    pub namespaces: BTreeMap<String, Value>,
    pub logged_out: bool,
}

type Shared = Arc<Mutex<MockState>>;

pub struct MockVcenter {
    pub base_url: String,
    pub state: Shared,
}

fn vapi_error(status: StatusCode, error_type: &str, message: &str) -> Response {
    (
        status,
        Json(json!({
            "error_type": error_type,
            "messages": [{"id": "mock.error", "default_message": message, "args": []}]
        })),
    )
        .into_response()
}

fn authorize(headers: &HeaderMap) -> Result<(), Response> {
    match headers.get("vmware-api-session-id").and_then(|v| v.to_str().ok()) {
        Some(SESSION_ID) => Ok(()),
        _ => Err(vapi_error(
            StatusCode::UNAUTHORIZED,
            "UNAUTHENTICATED",
            "This method requires authentication.",
        )),
    }
}

async fn create_session(headers: HeaderMap) -> Response {
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(BASIC_AUTH) => (StatusCode::CREATED, Json(json!(SESSION_ID))).into_response(),
        _ => vapi_error(
            StatusCode::UNAUTHORIZED,
            "UNAUTHENTICATED",
            "Authentication required.",
        ),
    }
}

async fn delete_session(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&headers) {
        return resp;
    }
    state.lock().unwrap().logged_out = true;
    StatusCode::NO_CONTENT.into_response()
}

async fn list_licenses(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&headers) {
        return resp;
    }
    Json(Value::Array(state.lock().unwrap().licenses.clone())).into_response()
}

async fn add_license(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(resp) = authorize(&headers) {
        return resp;
    }
    let key = body["license_key"].as_str().unwrap_or_default().to_string();

    if key == INVALID_KEY {
        return Json(json!({
            "license_key": key,
            "edition_key": "",
            "name": "",
            "total": 0,
            "used": 0,
            "labels": [],
            "properties": [{"key": "diagnostic", "value": "License file not found"}]
        }))
        .into_response();
    }

    let record = json!({
        "license_key": key,
        "edition_key": "esx.enterprisePlus.cpuPackage",
        "name": "vSphere 7 Enterprise Plus",
        "total": 16,
        "used": 0,
        "labels": [],
        "properties": []
    });

    let mut state = state.lock().unwrap();
    if !state.licenses.iter().any(|l| l["license_key"] == key.as_str()) {
        state.licenses.push(record.clone());
    }
    Json(record).into_response()
}

fn find_license<'a>(state: &'a mut MockState, key: &str) -> Option<&'a mut Value> {
    state
        .licenses
        .iter_mut()
        .find(|l| l["license_key"].as_str() == Some(key))
}

async fn get_license(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response {
    if let Err(resp) = authorize(&headers) {
        return resp;
    }
    let mut state = state.lock().unwrap();
    match find_license(&mut state, &key) {
        Some(record) => Json(record.clone()).into_response(),
        None => vapi_error(StatusCode::NOT_FOUND, "NOT_FOUND", "License not found."),
    }
}

async fn remove_license(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Response {
    if let Err(resp) = authorize(&headers) {
        return resp;
    }
    let mut state = state.lock().unwrap();
    state
        .licenses
        .retain(|l| l["license_key"].as_str() != Some(key.as_str()));
    StatusCode::NO_CONTENT.into_response()
}

async fn set_label(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((key, label)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    if let Err(resp) = authorize(&headers) {
        return resp;
    }
    let mut state = state.lock().unwrap();
    let Some(record) = find_license(&mut state, &key) else {
        return vapi_error(StatusCode::NOT_FOUND, "NOT_FOUND", "License not found.");
    };

    let value = body["value"].clone();
    let labels = record["labels"].as_array_mut().expect("labels array");
    match labels.iter_mut().find(|l| l["key"].as_str() == Some(label.as_str())) {
        Some(existing) => existing["value"] = value,
        None => labels.push(json!({"key": label, "value": value})),
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn remove_label(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((key, label)): Path<(String, String)>,
) -> Response {
    if let Err(resp) = authorize(&headers) {
        return resp;
    }
    let mut state = state.lock().unwrap();
    let Some(record) = find_license(&mut state, &key) else {
        return vapi_error(StatusCode::NOT_FOUND, "NOT_FOUND", "License not found.");
    };
    record["labels"]
        .as_array_mut()
        .expect("labels array")
        .retain(|l| l["key"].as_str() != Some(label.as_str()));
    StatusCode::NO_CONTENT.into_response()
}

async fn create_namespace(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(resp) = authorize(&headers) {
        return resp;
    }
    let name = body["namespace"].as_str().unwrap_or_default().to_string();
    let mut state = state.lock().unwrap();
    if state.namespaces.contains_key(&name) {
        return vapi_error(
            StatusCode::BAD_REQUEST,
            "ALREADY_EXISTS",
            &format!("Namespace {} already exists.", name),
        );
    }

    let mut record = json!({
        "cluster": body["cluster"],
        "config_status": "CONFIGURING",
        "description": body.get("description").cloned().unwrap_or(json!("")),
        "stats": {"cpu_used": 0, "memory_used": 0, "storage_used": 0}
    });
    for field in ["access_list", "storage_specs"] {
        if let Some(value) = body.get(field) {
            record[field] = value.clone();
        }
    }
    state.namespaces.insert(name, record);
    StatusCode::NO_CONTENT.into_response()
}

async fn get_namespace(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(resp) = authorize(&headers) {
        return resp;
    }
    match state.lock().unwrap().namespaces.get(&name) {
        Some(record) => Json(record.clone()).into_response(),
        None => vapi_error(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("Namespace {} not found.", name),
        ),
    }
}

async fn update_namespace(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if let Err(resp) = authorize(&headers) {
        return resp;
    }
    if body.get("cluster").is_some() || body.get("namespace").is_some() {
        return vapi_error(
            StatusCode::BAD_REQUEST,
            "INVALID_ARGUMENT",
            "cluster and namespace cannot be changed.",
        );
    }

    let mut state = state.lock().unwrap();
    let Some(record) = state.namespaces.get_mut(&name) else {
        return vapi_error(StatusCode::NOT_FOUND, "NOT_FOUND", "Namespace not found.");
    };
    for field in ["description", "access_list", "storage_specs"] {
        if let Some(value) = body.get(field) {
            record[field] = value.clone();
        }
    }
    record["config_status"] = json!("RUNNING");
    StatusCode::NO_CONTENT.into_response()
}

async fn delete_namespace(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Response {
    if let Err(resp) = authorize(&headers) {
        return resp;
    }
    match state.lock().unwrap().namespaces.remove(&name) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => vapi_error(StatusCode::NOT_FOUND, "NOT_FOUND", "Namespace not found."),
    }
}

impl MockVcenter {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState::default()));

        let app = Router::new()
            .route("/api/session", post(create_session).delete(delete_session))
            .route(
                "/api/vcenter/licensing/licenses",
                get(list_licenses).post(add_license),
            )
            .route(
                "/api/vcenter/licensing/licenses/:key",
                get(get_license).delete(remove_license),
            )
            .route(
                "/api/vcenter/licensing/licenses/:key/labels/:label",
                put(set_label).delete(remove_label),
            )
            .route("/api/vcenter/namespaces/instances", post(create_namespace))
            .route(
                "/api/vcenter/namespaces/instances/:name",
                get(get_namespace)
                    .patch(update_namespace)
                    .delete(delete_namespace),
            )
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock vCenter");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock vCenter server");
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn connection(&self, password: &str) -> ConnectionConfig {
        ConnectionConfig {
            base_url: self.base_url.clone(),
            user: USER.to_string(),
            password: password.to_string(),
            insecure: false,
            timeout: Duration::from_secs(5),
        }
    }

    pub async fn session(&self) -> ApiSession {
        ApiSession::login(&self.connection(PASSWORD))
            .await
            .expect("login to mock vCenter")
    }

    pub fn namespace(&self, name: &str) -> Option<Value> {
        self.state.lock().unwrap().namespaces.get(name).cloned()
    }

    pub fn license(&self, key: &str) -> Option<Value> {
        find_license(&mut self.state.lock().unwrap(), key).map(|v| v.clone())
    }
}

/// Build a state from a JSON object literal.
pub fn state(value: Value) -> ResourceState {
    ResourceState::from_value(&value).expect("state must be an object")
}

/// Join diagnostic summaries for assertions.
pub fn summaries(diagnostics: &[terraform_provider_vsphere::schema::Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.summary.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
