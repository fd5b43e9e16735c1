//! Dataset file loading.
//!
//! Each dataset is a JSON Lines file (one record per line) or a single JSON
//! document (array, `{"events": [...]}` wrapper, or bare object). Files are
//! resolved from the data root by the canonical alias table, trying the
//! `.jsonl` suffix before `.json`.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

use crate::datasets::merge::DatasetId;
use crate::error::SentinelError;

/// Resolve the on-disk file for a dataset, trying `.jsonl` then `.json`.
pub fn resolve_dataset_path(data_root: &Path, dataset: DatasetId) -> Result<PathBuf, SentinelError> {
    let mut attempted = Vec::new();
    for suffix in ["jsonl", "json"] {
        let candidate = data_root.join(format!("{}.{}", dataset.file_stem(), suffix));
        if candidate.exists() {
            return Ok(candidate);
        }
        attempted.push(candidate.display().to_string());
    }
    Err(SentinelError::Configuration(format!(
        "dataset file not found for {}. Tried: {}",
        dataset.as_str(),
        attempted.join(", ")
    )))
}

/// Load one dataset file into raw records, in file order.
pub fn load_records(path: &Path, dataset: DatasetId) -> Result<Vec<Value>, SentinelError> {
    let content = fs::read_to_string(path).map_err(|e| {
        SentinelError::Configuration(format!("failed to read {}: {}", path.display(), e))
    })?;

    // Whole-document JSON first; fall back to JSON Lines.
    if let Ok(doc) = serde_json::from_str::<Value>(&content) {
        return unwrap_document(doc, dataset);
    }

    let mut records = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: Value = serde_json::from_str(line).map_err(|e| {
            SentinelError::UnsupportedPayloadShape {
                dataset: dataset.as_str().to_string(),
                detail: format!("line {}: {}", lineno + 1, e),
            }
        })?;
        records.push(record);
    }
    Ok(records)
}

fn unwrap_document(doc: Value, dataset: DatasetId) -> Result<Vec<Value>, SentinelError> {
    match doc {
        Value::Array(records) => Ok(records),
        Value::Object(mut map) => {
            if let Some(Value::Array(records)) = map.remove("events") {
                return Ok(records);
            }
            Ok(vec![Value::Object(map)])
        }
        other => Err(SentinelError::UnsupportedPayloadShape {
            dataset: dataset.as_str().to_string(),
            detail: format!("top-level {} is not a record container", json_type(&other)),
        }),
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Load all replay datasets from the data root, in export order.
pub fn load_all(data_root: &Path) -> Result<Vec<(DatasetId, Vec<Value>)>, SentinelError> {
    let mut inputs = Vec::with_capacity(DatasetId::ALL.len());
    for dataset in DatasetId::ALL {
        let path = resolve_dataset_path(data_root, dataset)?;
        let records = load_records(&path, dataset)?;
        info!(
            dataset = dataset.as_str(),
            records = records.len(),
            path = %path.display(),
            "Loaded dataset"
        );
        inputs.push((dataset, records));
    }
    Ok(inputs)
}
