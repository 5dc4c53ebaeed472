//! Effect descriptors produced by the per-service HTTP clients.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::DEFAULT_HTTP_METHOD;

/// Everything the effect executor needs to perform one outbound call.
///
/// `json`, when present, takes precedence over `body` and is serialized into
/// the request body by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectDescriptor {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<EffectBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

impl EffectDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), method: None, headers: BTreeMap::new(), body: None, json: None }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: EffectBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_json(mut self, json: Value) -> Self {
        self.json = Some(json);
        self
    }

    /// Upper-cased method, defaulting to `GET`.
    pub fn method(&self) -> String {
        self.method.as_deref().unwrap_or(DEFAULT_HTTP_METHOD).to_ascii_uppercase()
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Request body as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EffectBody {
    /// Sent verbatim.
    Text(String),
    /// Serialized according to the declared content type.
    Structured(Value),
    /// Already a multipart body.
    Multipart(Vec<MultipartField>),
}

/// One text part of a multipart form body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartField {
    pub name: String,
    pub value: String,
}

impl MultipartField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn method_defaults_to_get_and_is_uppercased() {
        assert_eq!(EffectDescriptor::new("/a").method(), "GET");
        assert_eq!(EffectDescriptor::new("/a").with_method("post").method(), "POST");
    }

    #[test]
    fn header_lookup_ignores_case() {
        let effect = EffectDescriptor::new("/a").with_header("Content-Type", "text/plain");
        assert_eq!(effect.header("content-type"), Some("text/plain"));
        assert_eq!(effect.header("accept"), None);
    }

    #[test]
    fn minimal_descriptor_deserializes() {
        let effect: EffectDescriptor =
            serde_json::from_value(json!({"url": "/a", "method": "POST"})).unwrap();
        assert_eq!(effect.url, "/a");
        assert!(effect.headers.is_empty());
        assert!(effect.body.is_none());
        assert!(effect.json.is_none());
    }
}
