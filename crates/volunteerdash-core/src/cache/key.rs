//! Deterministic cache keys for API requests.

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Query parameters for an API request, ordered by name.
pub type Params = BTreeMap<String, Value>;

/// Build a [`Params`] map from literal pairs.
pub fn params<const N: usize>(pairs: [(&str, Value); N]) -> Params {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Render a parameter value the way it is keyed and sent on the wire.
///
/// `null` becomes `"null"`, booleans `"true"`/`"false"`, strings are used
/// verbatim and everything else is compact JSON.
pub fn stringify_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Canonical JSON form of the parameters: sorted keys, stringified values.
pub fn normalize_params(params: &Params) -> String {
    let normalized: BTreeMap<&str, String> = params
        .iter()
        .map(|(k, v)| (k.as_str(), stringify_value(v)))
        .collect();
    // A map of strings always serializes
    serde_json::to_string(&normalized).unwrap_or_default()
}

/// Hash of `"{endpoint}:{normalized params}"` as lowercase hex.
pub fn cache_key(endpoint: &str, params: &Params) -> String {
    let normalized = normalize_params(params);
    let digest = Sha256::digest(format!("{}:{}", endpoint, normalized).as_bytes());
    let key = hex::encode(digest);
    debug!(endpoint, key = %key, params = %normalized, "Derived cache key");
    key
}
