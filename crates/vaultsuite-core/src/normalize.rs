//! Response normalization.
//!
//! Extracts the semantic payload from KV v1 / KV v2 envelopes. Absent fields
//! normalize to an empty mapping or sequence, never to an error.

use serde_json::Value;

use crate::config::KvVersion;
use crate::driver::{SealStatus, SecretPayload};
use crate::error::{Result, SecretsError};

/// Parse a response body. An empty body (e.g. `204 No Content`) is `null`.
pub fn parse_body(text: &str) -> Result<Value> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text)
        .map_err(|e| SecretsError::InvalidResponse(format!("response body is not JSON: {e}")))
}

fn object_at(body: &Value, pointer: &str) -> SecretPayload {
    match body.pointer(pointer) {
        Some(Value::Object(map)) => map.clone(),
        _ => SecretPayload::new(),
    }
}

/// KV read: `data.data` for v2, `data` for v1.
pub fn read_payload(body: &Value, version: KvVersion) -> SecretPayload {
    match version {
        KvVersion::V2 => object_at(body, "/data/data"),
        KvVersion::V1 => object_at(body, "/data"),
    }
}

/// KV write: `data` for either version (version metadata for v2).
pub fn write_payload(body: &Value) -> SecretPayload {
    object_at(body, "/data")
}

/// Listing: `data.keys`, keeping only string entries, in backend order.
pub fn list_keys(body: &Value) -> Vec<String> {
    match body.pointer("/data/keys") {
        Some(Value::Array(keys)) => keys
            .iter()
            .filter_map(|k| k.as_str().map(str::to_owned))
            .collect(),
        _ => Vec::new(),
    }
}

/// Seal status and unseal responses carry no envelope.
pub fn seal_status(body: Value) -> Result<SealStatus> {
    match body {
        Value::Object(_) => serde_json::from_value(body)
            .map_err(|e| SecretsError::InvalidResponse(format!("malformed seal status: {e}"))),
        other => Err(SecretsError::InvalidResponse(format!(
            "expected seal status object, got {other}"
        ))),
    }
}

/// Whole response body, with an empty body normalized to `{}`.
pub fn passthrough(body: Value) -> Value {
    match body {
        Value::Null => Value::Object(SecretPayload::new()),
        other => other,
    }
}
