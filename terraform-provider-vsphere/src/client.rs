//! vSphere Automation API client
//!
//! [`ApiSession`] is the long-lived handle produced by provider
//! configuration. Every resource operation turns it into a fresh
//! [`RequestContext`] that carries the endpoint, the session token and the
//! TLS policy for the duration of that one operation.

use crate::config::ConnectionConfig;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Header carrying the vAPI session token.
pub const SESSION_HEADER: &str = "vmware-api-session-id";

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Authentication failed: {0}")]
    AuthFailed(String),
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid session token: {0}")]
    InvalidToken(#[from] reqwest::header::InvalidHeaderValue),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Error body returned by the vAPI REST endpoints
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    messages: Vec<LocalizableMessage>,
}

#[derive(Debug, Deserialize)]
struct LocalizableMessage {
    #[serde(default)]
    default_message: String,
}

/// Turn an error response body into a readable message.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) if !parsed.messages.is_empty() => parsed
            .messages
            .iter()
            .map(|m| m.default_message.as_str())
            .collect::<Vec<_>>()
            .join("; "),
        Ok(ApiErrorBody {
            error_type: Some(kind),
            ..
        }) => kind,
        _ => body.trim().to_string(),
    }
}

fn http_client(insecure: bool, timeout: Duration, headers: HeaderMap) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .danger_accept_invalid_certs(insecure)
        .default_headers(headers)
        .build()?)
}

/// Authenticated vCenter session
#[derive(Debug, Clone)]
pub struct ApiSession {
    base_url: String,
    session_id: String,
    insecure: bool,
    timeout: Duration,
}

impl ApiSession {
    /// Wrap an existing session token.
    pub fn new(base_url: &str, session_id: &str, insecure: bool, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: session_id.to_string(),
            insecure,
            timeout,
        }
    }

    /// Create a session with basic credentials.
    pub async fn login(config: &ConnectionConfig) -> Result<Self> {
        let client = http_client(config.insecure, config.timeout, HeaderMap::new())?;
        let url = format!("{}/api/session", config.base_url);

        tracing::debug!(url = %url, user = %config.user, "creating vSphere API session");

        let response = client
            .post(&url)
            .basic_auth(&config.user, Some(&config.password))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ClientError::AuthFailed(error_message(&body)));
        }
        if !status.is_success() {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let session_id: String = serde_json::from_str(&body)?;
        Ok(Self::new(
            &config.base_url,
            &session_id,
            config.insecure,
            config.timeout,
        ))
    }

    /// Terminate the session on the server.
    pub async fn logout(&self) -> Result<()> {
        self.context()?.delete("/api/session").await
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn insecure(&self) -> bool {
        self.insecure
    }

    /// Build the per-operation request context.
    pub fn context(&self) -> Result<RequestContext> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut token = HeaderValue::from_str(&self.session_id)?;
        token.set_sensitive(true);
        headers.insert(SESSION_HEADER, token);

        Ok(RequestContext {
            client: http_client(self.insecure, self.timeout, headers)?,
            base_url: self.base_url.clone(),
        })
    }
}

/// Request-scoped client bound to one session
pub struct RequestContext {
    client: reqwest::Client,
    base_url: String,
}

impl RequestContext {
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(method = %method, url = %url, "vSphere API request");

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);
        tracing::debug!(status = status.as_u16(), message = %message, "vSphere API error");

        Err(match status {
            StatusCode::UNAUTHORIZED => ClientError::AuthFailed(message),
            StatusCode::NOT_FOUND => ClientError::NotFound(message),
            _ => ClientError::Api {
                status: status.as_u16(),
                message,
            },
        })
    }

    /// GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send::<()>(Method::GET, path, None).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// POST request with a JSON response
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self.send(Method::POST, path, Some(body)).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// POST request whose success carries no body (204)
    pub async fn post_no_content<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.send(Method::POST, path, Some(body)).await.map(|_| ())
    }

    /// PUT request
    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.send(Method::PUT, path, Some(body)).await.map(|_| ())
    }

    /// PATCH request
    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.send(Method::PATCH, path, Some(body)).await.map(|_| ())
    }

    /// DELETE request
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send::<()>(Method::DELETE, path, None).await.map(|_| ())
    }
}
