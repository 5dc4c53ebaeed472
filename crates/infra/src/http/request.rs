//! Turns an [`EffectDescriptor`] into a concrete outbound request.
//!
//! Preparation is pure so header merging, content-type inference and body
//! encoding can be tested without a server.

use std::collections::BTreeMap;

use outpost_domain::constants::{DEFAULT_CONTENT_TYPE, MULTIPART_CONTENT_TYPE};
use outpost_domain::{EffectBody, EffectDescriptor, EffectError, MultipartField};
use reqwest::Method;
use serde_json::Value;
use url::Url;

const CONTENT_TYPE: &str = "content-type";

/// Request body after encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparedBody {
    Empty,
    Text(String),
    Multipart(Vec<MultipartField>),
}

/// Fully resolved request, ready to hand to the HTTP client.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    /// Lower-cased header names. Multipart requests carry no `content-type`
    /// here; the client adds one with the boundary.
    pub headers: BTreeMap<String, String>,
    pub body: PreparedBody,
}

impl PreparedRequest {
    /// Prepare `effect`, layering its headers over `default_headers`.
    ///
    /// Anything that fails here can never succeed on retry, so every error is
    /// [`EffectError::Serialization`].
    pub fn prepare(
        effect: &EffectDescriptor,
        base_url: Option<&Url>,
        default_headers: &BTreeMap<String, String>,
    ) -> Result<Self, EffectError> {
        let method = Method::from_bytes(effect.method().as_bytes()).map_err(|e| {
            EffectError::serialization(format!("invalid method {:?}: {e}", effect.method()))
        })?;
        let url = resolve_url(&effect.url, base_url)?;

        let mut headers: BTreeMap<String, String> = default_headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
            .collect();
        for (name, value) in &effect.headers {
            headers.insert(name.to_ascii_lowercase(), value.clone());
        }
        let content_type =
            headers.entry(CONTENT_TYPE.to_string()).or_insert_with(|| DEFAULT_CONTENT_TYPE.into());
        let multipart = is_multipart(content_type);

        let body = match (&effect.json, &effect.body) {
            (Some(json), _) => encode_structured(json, multipart)?,
            (None, Some(EffectBody::Structured(value))) => encode_structured(value, multipart)?,
            (None, Some(EffectBody::Text(text))) => PreparedBody::Text(text.clone()),
            (None, Some(EffectBody::Multipart(fields))) => PreparedBody::Multipart(fields.clone()),
            (None, None) => PreparedBody::Empty,
        };

        if matches!(body, PreparedBody::Multipart(_)) {
            headers.remove(CONTENT_TYPE);
        }

        Ok(Self { method, url, headers, body })
    }
}

fn resolve_url(raw: &str, base_url: Option<&Url>) -> Result<Url, EffectError> {
    match Url::parse(raw) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = base_url.ok_or_else(|| {
                EffectError::serialization(format!("relative url {raw:?} without a base url"))
            })?;
            base.join(raw)
                .map_err(|e| EffectError::serialization(format!("invalid url {raw:?}: {e}")))
        }
        Err(e) => Err(EffectError::serialization(format!("invalid url {raw:?}: {e}"))),
    }
}

fn is_multipart(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().starts_with(MULTIPART_CONTENT_TYPE)
}

fn encode_structured(value: &Value, multipart: bool) -> Result<PreparedBody, EffectError> {
    if multipart {
        return Ok(PreparedBody::Multipart(multipart_fields(value)));
    }
    serde_json::to_string(value)
        .map(PreparedBody::Text)
        .map_err(|e| EffectError::serialization(format!("failed to encode request body: {e}")))
}

/// Flatten `{"profile": [["first", "Ann"]], "note": "hi"}` into
/// `profile[first]=Ann` and `note=hi`.
pub fn multipart_fields(value: &Value) -> Vec<MultipartField> {
    let Value::Object(map) = value else {
        return vec![MultipartField::new("value", scalar_text(value))];
    };

    let mut fields = Vec::new();
    for (key, entry) in map {
        match entry {
            Value::Array(pairs) => {
                for pair in pairs {
                    match pair.as_array().map(Vec::as_slice) {
                        Some([name, inner]) => fields.push(MultipartField::new(
                            format!("{key}[{}]", scalar_text(name)),
                            scalar_text(inner),
                        )),
                        _ => fields.push(MultipartField::new(key.clone(), scalar_text(pair))),
                    }
                }
            }
            other => fields.push(MultipartField::new(key.clone(), scalar_text(other))),
        }
    }
    fields
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
