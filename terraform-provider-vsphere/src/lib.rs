//! Terraform Provider for vSphere
//!
//! Manages vCenter license keys and vSphere with Tanzu namespaces through
//! the vSphere Automation REST API.

pub mod client;
pub mod config;
pub mod labels;
pub mod license;
pub mod namespaces;
pub mod provider;
pub mod resources;
pub mod schema;

pub use client::{ApiSession, ClientError};
pub use provider::VsphereProvider;
pub use resources::{Resource, ResourceState};
