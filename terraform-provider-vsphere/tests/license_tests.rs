//! License resource tests against the mock vCenter
//!
//! Run with: cargo test --test license_tests

mod common;

use common::{state, summaries, MockVcenter, INVALID_KEY, VALID_KEY};
use serde_json::json;
use std::collections::HashMap;
use terraform_provider_vsphere::labels::LabelMismatch;
use terraform_provider_vsphere::license::{LicenseManager, VerificationError};
use terraform_provider_vsphere::resources::LicenseResource;
use terraform_provider_vsphere::Resource;

fn expected(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn test_invalid_key_is_rejected() {
    let vcenter = MockVcenter::start().await;
    let session = vcenter.session().await;

    let err = LicenseResource::new()
        .create(&session, &state(json!({"license_key": INVALID_KEY})))
        .await
        .unwrap_err();

    assert!(summaries(&err).contains("License file not found"));

    let manager = LicenseManager::new(&session).unwrap();
    assert!(!manager.is_key_present(INVALID_KEY).await.unwrap());
}

#[tokio::test]
async fn test_basic_key_is_present_after_create() {
    let vcenter = MockVcenter::start().await;
    let session = vcenter.session().await;

    let created = LicenseResource::new()
        .create(&session, &state(json!({"license_key": VALID_KEY})))
        .await
        .expect("add license");

    assert_eq!(created.id().as_deref(), Some(VALID_KEY));
    assert_eq!(
        created.get_string("edition_key").as_deref(),
        Some("esx.enterprisePlus.cpuPackage")
    );
    assert_eq!(created.get_i64("total"), Some(16));
    assert!(created.get("label").is_none());

    let manager = LicenseManager::new(&session).unwrap();
    assert!(manager.is_key_present(VALID_KEY).await.unwrap());
}

#[tokio::test]
async fn test_labels_are_attached() {
    let vcenter = MockVcenter::start().await;
    let session = vcenter.session().await;

    let created = LicenseResource::new()
        .create(
            &session,
            &state(json!({
                "license_key": VALID_KEY,
                "label": [
                    {"key": "VpxClientLicenseLabel", "value": "Hello World"},
                    {"key": "TestTitle", "value": "FooBar"}
                ]
            })),
        )
        .await
        .expect("add license with labels");

    assert_eq!(created.get_list("label").len(), 2);

    let manager = LicenseManager::new(&session).unwrap();
    manager
        .verify_labels(
            VALID_KEY,
            &expected(&[("VpxClientLicenseLabel", "Hello World"), ("TestTitle", "FooBar")]),
        )
        .await
        .expect("labels match");

    let stored = vcenter.license(VALID_KEY).unwrap();
    assert_eq!(stored["labels"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_duplicate_label_keys_collapse() {
    let vcenter = MockVcenter::start().await;
    let session = vcenter.session().await;

    LicenseResource::new()
        .create(
            &session,
            &state(json!({
                "license_key": VALID_KEY,
                "label": [
                    {"key": "env", "value": "dev"},
                    {"key": "env", "value": "prod"}
                ]
            })),
        )
        .await
        .unwrap();

    let manager = LicenseManager::new(&session).unwrap();
    manager
        .verify_labels(VALID_KEY, &expected(&[("env", "prod")]))
        .await
        .expect("last label wins");
}

#[tokio::test]
async fn test_label_count_mismatch_is_reported() {
    let vcenter = MockVcenter::start().await;
    let session = vcenter.session().await;

    LicenseResource::new()
        .create(
            &session,
            &state(json!({
                "license_key": VALID_KEY,
                "label": [{"key": "team", "value": "infra"}]
            })),
        )
        .await
        .unwrap();

    let manager = LicenseManager::new(&session).unwrap();
    let err = manager
        .verify_labels(VALID_KEY, &expected(&[("team", "infra"), ("site", "lab")]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        VerificationError::Labels {
            source: LabelMismatch::Count { expected: 2, actual: 1 },
            ..
        }
    ));
}

#[tokio::test]
async fn test_verify_absent_key() {
    let vcenter = MockVcenter::start().await;
    let session = vcenter.session().await;

    let manager = LicenseManager::new(&session).unwrap();
    let err = manager
        .verify_labels(VALID_KEY, &HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, VerificationError::NotPresent(_)));
}

#[tokio::test]
async fn test_update_replaces_labels() {
    let vcenter = MockVcenter::start().await;
    let session = vcenter.session().await;
    let resource = LicenseResource::new();

    let created = resource
        .create(
            &session,
            &state(json!({
                "license_key": VALID_KEY,
                "label": [
                    {"key": "keep", "value": "1"},
                    {"key": "change", "value": "old"},
                    {"key": "drop", "value": "x"}
                ]
            })),
        )
        .await
        .unwrap();

    let updated = resource
        .update(
            &session,
            &created,
            &state(json!({
                "license_key": VALID_KEY,
                "label": [
                    {"key": "keep", "value": "1"},
                    {"key": "change", "value": "new"},
                    {"key": "add", "value": "y"}
                ]
            })),
        )
        .await
        .expect("update labels");

    assert_eq!(updated.get_i64("total"), Some(16));

    let manager = LicenseManager::new(&session).unwrap();
    manager
        .verify_labels(
            VALID_KEY,
            &expected(&[("keep", "1"), ("change", "new"), ("add", "y")]),
        )
        .await
        .expect("labels updated");
}

#[tokio::test]
async fn test_read_reports_removed_key_as_gone() {
    let vcenter = MockVcenter::start().await;
    let session = vcenter.session().await;

    let current = state(json!({"id": VALID_KEY, "license_key": VALID_KEY}));
    let refreshed = LicenseResource::new().read(&session, &current).await.unwrap();
    assert!(refreshed.is_empty());
}

#[tokio::test]
async fn test_delete_removes_key() {
    let vcenter = MockVcenter::start().await;
    let session = vcenter.session().await;
    let resource = LicenseResource::new();

    let created = resource
        .create(&session, &state(json!({"license_key": VALID_KEY})))
        .await
        .unwrap();

    resource.delete(&session, &created).await.expect("remove license");
    assert!(vcenter.license(VALID_KEY).is_none());

    // Already gone: nothing to do
    resource.delete(&session, &created).await.expect("idempotent delete");
}
