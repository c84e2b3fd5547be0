//! Capability runtime adapters.
//!
//! Each integration implements [`RuntimeAdapter`] to execute one named
//! capability with parameters against its provider, given a resolved auth
//! context. Adapters normalize provider payloads before returning: an
//! envelope or paginated container is unwrapped to a bare array (list
//! semantics) or a bare object (get semantics), and a non-2xx response is
//! always a typed [`ProviderError`] — never silently partial data.

use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value};
use std::collections::HashMap;
use std::fmt;

/// Resolved auth material for one integration call.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub integration_id: String,
    /// Provider account the token resolves to (workspace, installation).
    pub account_id: Option<String>,
    /// Bearer material handed to the underlying client.
    pub access_token: String,
    /// Scopes the token proved to hold, when the provider reports them.
    pub scopes: Vec<String>,
}

/// Upstream provider failure.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub integration_id: String,
    pub capability_id: String,
    /// HTTP status when the failure came off the wire.
    pub status: Option<u16>,
    pub message: String,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider '{}' failed on '{}'", self.integration_id, self.capability_id)?;
        if let Some(status) = self.status {
            write!(f, " (HTTP {status})")?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Retryable per policy: 429 and 5xx. Anything else (auth failures,
    /// validation rejections, missing resources) is fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(self.status, Some(429)) || matches!(self.status, Some(status) if status >= 500)
    }
}

/// Uniform interface each integration implements.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    /// Integration this adapter serves; the engine dispatches on it.
    fn integration_id(&self) -> &str;

    /// Exchange a stored token reference for a resolved auth context.
    async fn resolve_context(&self, token: &str) -> Result<AuthContext, ProviderError>;

    /// Execute one named capability. Returns the normalized payload: a bare
    /// array for list semantics, a bare object for get semantics.
    async fn execute(&self, capability_id: &str, params: &Value, auth: &AuthContext) -> Result<Value, ProviderError>;
}

/// Merge provider-required defaults into caller params.
///
/// Providers often require fields callers habitually omit (a page size, a
/// sort order). Caller values win; defaults fill the gaps. Non-object params
/// are returned unchanged.
pub fn apply_param_defaults(params: &Value, defaults: &JsonMap<String, Value>) -> Value {
    let Value::Object(params) = params else {
        return params.clone();
    };
    let mut merged = defaults.clone();
    for (key, value) in params {
        merged.insert(key.clone(), value.clone());
    }
    Value::Object(merged)
}

/// Envelope keys providers commonly wrap list payloads in.
const ENVELOPE_KEYS: &[&str] = &["data", "items", "records", "results", "nodes", "edges"];

/// Unwrap a provider envelope or paginated container.
///
/// `{"data": [...], "nextCursor": ...}` becomes the bare array; a single
/// wrapped object becomes the bare object. Already-bare payloads pass
/// through untouched.
pub fn unwrap_envelope(payload: Value) -> Value {
    let Value::Object(object) = &payload else {
        return payload;
    };
    for key in ENVELOPE_KEYS {
        if let Some(inner) = object.get(*key) {
            return match inner {
                Value::Array(_) | Value::Object(_) => inner.clone(),
                _ => payload,
            };
        }
    }
    payload
}

/// Canned adapter for tests and previews: returns configured payloads (or
/// errors) per capability, without external side effects.
pub struct StaticAdapter {
    integration_id: String,
    outputs: HashMap<String, Result<Value, ProviderError>>,
}

impl StaticAdapter {
    pub fn new(integration_id: &str) -> Self {
        Self {
            integration_id: integration_id.to_string(),
            outputs: HashMap::new(),
        }
    }

    /// Configure a successful payload for a capability.
    pub fn with_output(mut self, capability_id: &str, output: Value) -> Self {
        self.outputs.insert(capability_id.to_string(), Ok(output));
        self
    }

    /// Configure a failure for a capability.
    pub fn with_failure(mut self, capability_id: &str, status: Option<u16>, message: &str) -> Self {
        self.outputs.insert(
            capability_id.to_string(),
            Err(ProviderError {
                integration_id: self.integration_id.clone(),
                capability_id: capability_id.to_string(),
                status,
                message: message.to_string(),
            }),
        );
        self
    }
}

#[async_trait]
impl RuntimeAdapter for StaticAdapter {
    fn integration_id(&self) -> &str {
        &self.integration_id
    }

    async fn resolve_context(&self, token: &str) -> Result<AuthContext, ProviderError> {
        Ok(AuthContext {
            integration_id: self.integration_id.clone(),
            account_id: None,
            access_token: token.to_string(),
            scopes: vec![],
        })
    }

    async fn execute(&self, capability_id: &str, _params: &Value, _auth: &AuthContext) -> Result<Value, ProviderError> {
        match self.outputs.get(capability_id) {
            Some(result) => result.clone().map(unwrap_envelope),
            None => Err(ProviderError {
                integration_id: self.integration_id.clone(),
                capability_id: capability_id.to_string(),
                status: Some(404),
                message: "capability not configured".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_fill_gaps_but_never_override() {
        let mut defaults = JsonMap::new();
        defaults.insert("per_page".into(), json!(50));
        defaults.insert("state".into(), json!("open"));

        let merged = apply_param_defaults(&json!({"state": "closed"}), &defaults);
        assert_eq!(merged, json!({"per_page": 50, "state": "closed"}));
    }

    #[test]
    fn envelopes_unwrap_to_bare_payloads() {
        assert_eq!(unwrap_envelope(json!({"data": [1, 2], "nextCursor": "abc"})), json!([1, 2]));
        assert_eq!(unwrap_envelope(json!({"items": {"id": 7}})), json!({"id": 7}));
        assert_eq!(unwrap_envelope(json!([3, 4])), json!([3, 4]));
        assert_eq!(unwrap_envelope(json!({"id": 7})), json!({"id": 7}));
    }

    #[test]
    fn retryable_classification_is_429_and_5xx() {
        let err = |status| ProviderError {
            integration_id: "github".into(),
            capability_id: "github.issues.list".into(),
            status,
            message: "boom".into(),
        };
        assert!(err(Some(429)).is_retryable());
        assert!(err(Some(500)).is_retryable());
        assert!(err(Some(503)).is_retryable());
        assert!(!err(Some(401)).is_retryable());
        assert!(!err(Some(404)).is_retryable());
        assert!(!err(None).is_retryable());
    }

    #[tokio::test]
    async fn static_adapter_unwraps_configured_envelopes() {
        let adapter = StaticAdapter::new("github").with_output("github.issues.list", json!({"data": [{"id": 1}]}));
        let auth = adapter.resolve_context("tok").await.unwrap();
        let payload = adapter.execute("github.issues.list", &json!({}), &auth).await.unwrap();
        assert_eq!(payload, json!([{"id": 1}]));
    }
}
