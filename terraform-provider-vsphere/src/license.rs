//! License manager client

use crate::client::{ApiSession, ClientError, RequestContext};
use crate::labels::{compare_labels, KeyValue, LabelMismatch};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

const LICENSES_PATH: &str = "/api/vcenter/licensing/licenses";

/// Property name under which the activation service reports rejected keys.
const DIAGNOSTIC_PROPERTY: &str = "diagnostic";

#[derive(Error, Debug)]
pub enum LicenseError {
    #[error(transparent)]
    Client(#[from] ClientError),
    /// The server accepted the call but rejected the key.
    #[error("{0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum VerificationError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("{0} key not found on the server")]
    NotPresent(String),
    #[error("labels on key {key} do not match: {source}")]
    Labels {
        key: String,
        #[source]
        source: LabelMismatch,
    },
}

/// Free-form property attached to a license record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseProperty {
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

/// License record as returned by the license manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseInfo {
    pub license_key: String,
    #[serde(default)]
    pub edition_key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub used: i64,
    #[serde(default)]
    pub labels: Vec<KeyValue>,
    #[serde(default)]
    pub properties: Vec<LicenseProperty>,
}

impl LicenseInfo {
    /// Diagnostic text left by the activation service, if any.
    pub fn diagnostic(&self) -> Option<String> {
        self.properties
            .iter()
            .find(|p| p.key == DIAGNOSTIC_PROPERTY)
            .map(|p| match &p.value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    }
}

#[derive(Serialize)]
struct AddLicenseSpec<'a> {
    license_key: &'a str,
}

#[derive(Serialize)]
struct LabelValue<'a> {
    value: &'a str,
}

/// Show only the last group of a key in logs.
pub fn redact_key(key: &str) -> String {
    match key.rsplit_once('-') {
        Some((_, tail)) => format!("*****-{}", tail),
        None => "*****".to_string(),
    }
}

fn license_path(key: &str) -> String {
    format!("{}/{}", LICENSES_PATH, urlencoding::encode(key))
}

fn label_path(key: &str, label: &str) -> String {
    format!("{}/labels/{}", license_path(key), urlencoding::encode(label))
}

/// Operations against the vCenter license manager
pub struct LicenseManager {
    ctx: RequestContext,
}

impl LicenseManager {
    pub fn new(session: &ApiSession) -> Result<Self, ClientError> {
        Ok(Self {
            ctx: session.context()?,
        })
    }

    /// Add a key to the license manager.
    pub async fn add(&self, key: &str) -> Result<LicenseInfo, LicenseError> {
        tracing::info!(license_key = %redact_key(key), "adding license key");
        let info: LicenseInfo = self
            .ctx
            .post(LICENSES_PATH, &AddLicenseSpec { license_key: key })
            .await?;

        if let Some(diagnostic) = info.diagnostic() {
            return Err(LicenseError::Rejected(diagnostic));
        }
        Ok(info)
    }

    pub async fn list(&self) -> Result<Vec<LicenseInfo>, ClientError> {
        self.ctx.get(LICENSES_PATH).await
    }

    pub async fn get(&self, key: &str) -> Result<LicenseInfo, ClientError> {
        self.ctx.get(&license_path(key)).await
    }

    pub async fn update_label(&self, key: &str, label: &str, value: &str) -> Result<(), ClientError> {
        tracing::debug!(license_key = %redact_key(key), label, "setting license label");
        self.ctx.put(&label_path(key, label), &LabelValue { value }).await
    }

    pub async fn remove_label(&self, key: &str, label: &str) -> Result<(), ClientError> {
        tracing::debug!(license_key = %redact_key(key), label, "removing license label");
        self.ctx.delete(&label_path(key, label)).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), ClientError> {
        tracing::info!(license_key = %redact_key(key), "removing license key");
        self.ctx.delete(&license_path(key)).await
    }

    /// Set every label in `labels`, one call per label.
    pub async fn attach_labels(
        &self,
        key: &str,
        labels: &HashMap<String, String>,
    ) -> Result<(), ClientError> {
        let mut names: Vec<&String> = labels.keys().collect();
        names.sort();
        for name in names {
            self.update_label(key, name, &labels[name]).await?;
        }
        Ok(())
    }

    /// Look the key up in the list of installed licenses.
    pub async fn find(&self, key: &str) -> Result<Option<LicenseInfo>, ClientError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|info| info.license_key == key))
    }

    pub async fn is_key_present(&self, key: &str) -> Result<bool, ClientError> {
        Ok(self.find(key).await?.is_some())
    }

    /// Check that the key is installed and carries exactly `expected`.
    pub async fn verify_labels(
        &self,
        key: &str,
        expected: &HashMap<String, String>,
    ) -> Result<(), VerificationError> {
        if !self.is_key_present(key).await? {
            return Err(VerificationError::NotPresent(key.to_string()));
        }
        let info = self.get(key).await?;
        compare_labels(expected, &info.labels).map_err(|source| VerificationError::Labels {
            key: key.to_string(),
            source,
        })
    }
}
