//! Provider configuration
//!
//! Values come from the `provider "vsphere"` block, falling back to the
//! `VSPHERE_*` environment variables when an attribute is left unset.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// Configuration errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{attribute} is required (or set {env})")]
    Missing {
        attribute: &'static str,
        env: &'static str,
    },
    #[error("invalid value for {attribute}: {value}")]
    Invalid { attribute: &'static str, value: String },
}

/// Raw provider block as sent by Terraform
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub vsphere_server: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub allow_unverified_ssl: Option<bool>,
    pub api_timeout: Option<u64>,
}

/// Fully resolved connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub base_url: String,
    pub user: String,
    pub password: String,
    pub insecure: bool,
    pub timeout: Duration,
}

impl ProviderConfig {
    /// Resolve against the process environment.
    pub fn resolve(&self) -> Result<ConnectionConfig, ConfigError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve using `lookup` for environment fallbacks.
    pub fn resolve_with<F>(&self, lookup: F) -> Result<ConnectionConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |value: &Option<String>, attribute: &'static str, env: &'static str| {
            value
                .clone()
                .or_else(|| lookup(env))
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing { attribute, env })
        };

        let server = pick(&self.vsphere_server, "vsphere_server", "VSPHERE_SERVER")?;
        let user = pick(&self.user, "user", "VSPHERE_USER")?;
        let password = pick(&self.password, "password", "VSPHERE_PASSWORD")?;

        let insecure = match self.allow_unverified_ssl {
            Some(flag) => flag,
            None => match lookup("VSPHERE_ALLOW_UNVERIFIED_SSL") {
                Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid {
                    attribute: "allow_unverified_ssl",
                    value: raw,
                })?,
                None => false,
            },
        };

        let timeout_secs = match self.api_timeout {
            Some(secs) => secs,
            None => match lookup("VSPHERE_API_TIMEOUT") {
                Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    attribute: "api_timeout",
                    value: raw,
                })?,
                None => DEFAULT_API_TIMEOUT_SECS,
            },
        };
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                attribute: "api_timeout",
                value: "0".to_string(),
            });
        }

        Ok(ConnectionConfig {
            base_url: normalize_server(&server),
            user,
            password,
            insecure,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Bare host names are served over https.
fn normalize_server(server: &str) -> String {
    let trimmed = server.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" | "" => Some(false),
        _ => None,
    }
}
