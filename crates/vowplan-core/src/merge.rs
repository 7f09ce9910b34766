//! Document merge semantics shared by in-memory state and the stores.
//!
//! The root is merged shallowly: every top-level key in the update replaces
//! the key of the same name wholesale, keys missing from the update are kept.
//! Nested records are never merged recursively; callers carry unchanged
//! nested fields forward themselves.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteMode {
    /// Replace only the top-level keys present in the update.
    #[default]
    Merge,
    /// Replace the whole document.
    Replace,
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("document is not a JSON object")]
    NotAnObject,
    #[error("failed to convert document: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Apply `update` to `current` in place.
pub fn merge_fields(current: &mut Map<String, Value>, update: Map<String, Value>, mode: WriteMode) {
    match mode {
        WriteMode::Replace => *current = update,
        WriteMode::Merge => current.extend(update),
    }
}

/// Merge a typed partial update into a typed document, going through the same
/// JSON-level rules the stores apply.
pub fn merge<T, P>(current: &T, update: &P, mode: WriteMode) -> Result<T, MergeError>
where
    T: Serialize + DeserializeOwned,
    P: Serialize,
{
    let mut doc = into_object(serde_json::to_value(current)?)?;
    let update = into_object(serde_json::to_value(update)?)?;
    merge_fields(&mut doc, update, mode);
    Ok(serde_json::from_value(Value::Object(doc))?)
}

pub fn into_object(value: Value) -> Result<Map<String, Value>, MergeError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(MergeError::NotAnObject),
    }
}
