//! License label handling
//!
//! Terraform hands `label` blocks over as a list of `{key, value}` records.
//! The license manager wants a mapping, so the list is flattened with the
//! last occurrence of a key winning.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// A single key/value label as stored on a license
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

/// Structural errors in a label list
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LabelError {
    #[error("label {index} is not an object")]
    NotAnObject { index: usize },
    #[error("label {index} is missing string field `{field}`")]
    MissingField { index: usize, field: &'static str },
}

/// Label comparison failures
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LabelMismatch {
    #[error("expected {expected} labels, found {actual}")]
    Count { expected: usize, actual: usize },
    #[error("label {key} is missing")]
    Missing { key: String },
    #[error("label {key} is {actual:?}, expected {expected:?}")]
    Value {
        key: String,
        expected: String,
        actual: String,
    },
}

fn string_field(
    record: &serde_json::Map<String, Value>,
    index: usize,
    field: &'static str,
) -> Result<String, LabelError> {
    record
        .get(field)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or(LabelError::MissingField { index, field })
}

/// Flatten a list of `{key, value}` records into a map.
pub fn labels_to_map(entries: &[Value]) -> Result<HashMap<String, String>, LabelError> {
    let mut labels = HashMap::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let record = entry.as_object().ok_or(LabelError::NotAnObject { index })?;
        let key = string_field(record, index, "key")?;
        let value = string_field(record, index, "value")?;
        labels.insert(key, value);
    }
    Ok(labels)
}

/// Render a label map back into block form, sorted by key.
pub fn map_to_labels(labels: &HashMap<String, String>) -> Vec<Value> {
    let mut pairs: Vec<(&String, &String)> = labels.iter().collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(key, value)| serde_json::json!({ "key": key, "value": value }))
        .collect()
}

/// Check that `actual` holds exactly the labels in `expected`.
pub fn compare_labels(
    expected: &HashMap<String, String>,
    actual: &[KeyValue],
) -> Result<(), LabelMismatch> {
    if expected.len() != actual.len() {
        return Err(LabelMismatch::Count {
            expected: expected.len(),
            actual: actual.len(),
        });
    }

    let mut keys: Vec<&String> = expected.keys().collect();
    keys.sort();
    for key in keys {
        let want = &expected[key];
        match actual.iter().find(|kv| &kv.key == key) {
            None => return Err(LabelMismatch::Missing { key: key.clone() }),
            Some(kv) if &kv.value != want => {
                return Err(LabelMismatch::Value {
                    key: key.clone(),
                    expected: want.clone(),
                    actual: kv.value.clone(),
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}
