//! Assertions over nested JSON documents.
//!
//! Field paths are dot-separated (`"api.bearer_protection"`,
//! `"nodes.total"`). Arrays are not indexed here; assert on the array
//! value itself and recurse in the test.

use anyhow::{bail, Result};
use serde_json::Value;

pub fn get_nested_field<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for part in path.split('.') {
        match current {
            Value::Object(obj) => current = obj.get(part)?,
            _ => return None,
        }
    }
    Some(current)
}

pub fn assert_field_exists(value: &Value, path: &str) -> Result<()> {
    if get_nested_field(value, path).is_none() {
        bail!("field '{path}' not found in {value}");
    }
    log::debug!("field '{path}' present");
    Ok(())
}

pub fn assert_field_absent(value: &Value, path: &str) -> Result<()> {
    if let Some(found) = get_nested_field(value, path) {
        bail!("field '{path}' unexpectedly present: {found}");
    }
    Ok(())
}

pub fn assert_field_equals(value: &Value, path: &str, expected: &Value) -> Result<()> {
    match get_nested_field(value, path) {
        Some(actual) if actual == expected => {
            log::debug!("field '{path}' = {expected}");
            Ok(())
        }
        Some(actual) => bail!("field '{path}' mismatch: expected {expected}, got {actual}"),
        None => bail!("field '{path}' not found for comparison"),
    }
}
