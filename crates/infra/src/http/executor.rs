//! HTTP implementation of [`EffectExecutor`].
//!
//! One call per `execute`: retries belong to the outbox, never to the
//! client, so the executor only normalizes outcomes.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use outpost_core::EffectExecutor;
use outpost_domain::{EffectDescriptor, EffectError, ExecutorConfig, OutpostError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::multipart::Form;
use reqwest::{Client as ReqwestClient, Response};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::request::{PreparedBody, PreparedRequest};
use crate::errors::conversions::effect_error_from_http;
use crate::errors::InfraError;

/// Executes effect descriptors over HTTP.
#[derive(Clone)]
pub struct HttpEffectExecutor {
    client: ReqwestClient,
    base_url: Option<Url>,
    default_headers: BTreeMap<String, String>,
}

impl HttpEffectExecutor {
    /// Start building a new executor.
    pub fn builder() -> HttpEffectExecutorBuilder {
        HttpEffectExecutorBuilder::default()
    }

    /// Executor configured from the `executor` config section.
    pub fn from_config(config: &ExecutorConfig) -> Result<Self> {
        let mut builder = Self::builder().timeout(config.timeout()).default_headers(
            config.default_headers.iter().map(|(k, v)| (k.clone(), v.clone())),
        );
        if let Some(base) = &config.base_url {
            builder = builder.base_url(base);
        }
        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent);
        }
        builder.build()
    }

    async fn send(&self, request: PreparedRequest) -> std::result::Result<Response, EffectError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                EffectError::serialization(format!("invalid header name {name:?}: {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                EffectError::serialization(format!("invalid value for header {name}: {e}"))
            })?;
            headers.insert(name, value);
        }

        let mut builder =
            self.client.request(request.method.clone(), request.url.clone()).headers(headers);
        builder = match request.body {
            PreparedBody::Empty => builder,
            PreparedBody::Text(text) => builder.body(text),
            PreparedBody::Multipart(fields) => {
                let form = fields
                    .into_iter()
                    .fold(Form::new(), |form, field| form.text(field.name, field.value));
                builder.multipart(form)
            }
        };

        builder.send().await.map_err(|err| {
            debug!(method = %request.method, url = %request.url, error = %err, "HTTP request failed");
            effect_error_from_http(&err)
        })
    }
}

#[async_trait]
impl EffectExecutor for HttpEffectExecutor {
    async fn execute(&self, effect: &EffectDescriptor) -> std::result::Result<Value, EffectError> {
        let request =
            PreparedRequest::prepare(effect, self.base_url.as_ref(), &self.default_headers)?;
        let method = request.method.clone();
        let url = request.url.clone();
        debug!(%method, %url, "sending effect");

        let response = self.send(request).await?;
        let status = response.status();
        let is_json = declares_json(&response);
        let text = response
            .text()
            .await
            .map_err(|e| EffectError::transport(format!("failed to read response body: {e}")))?;
        debug!(%method, %url, %status, bytes = text.len(), "received response");

        if status.is_success() {
            return if is_json { parse_json(&text) } else { Ok(text_value(text)) };
        }

        let body = if is_json { parse_json(&text)? } else { text_value(text) };
        Err(EffectError::network(status.as_u16(), body))
    }
}

fn declares_json(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains("json"))
}

/// Empty bodies parse to `null`; anything else must be valid JSON.
fn parse_json(text: &str) -> std::result::Result<Value, EffectError> {
    if text.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text)
        .map_err(|e| EffectError::serialization(format!("malformed JSON response: {e}")))
}

fn text_value(text: String) -> Value {
    if text.is_empty() {
        Value::Null
    } else {
        Value::String(text)
    }
}

/// Builder for [`HttpEffectExecutor`].
#[derive(Debug)]
pub struct HttpEffectExecutorBuilder {
    timeout: Duration,
    base_url: Option<String>,
    user_agent: Option<String>,
    default_headers: BTreeMap<String, String>,
    accept_invalid_certs: bool,
}

impl Default for HttpEffectExecutorBuilder {
    fn default() -> Self {
        Self {
            timeout: ExecutorConfig::default().timeout(),
            base_url: None,
            user_agent: None,
            default_headers: BTreeMap::new(),
            accept_invalid_certs: false,
        }
    }
}

impl HttpEffectExecutorBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base for relative effect URLs.
    pub fn base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = Some(base.into());
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Headers sent with every effect unless the effect overrides them.
    pub fn default_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.default_headers.extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Test-only helper to allow insecure TLS (e.g., self-signed certs).
    #[cfg(test)]
    pub fn accept_invalid_certs(mut self, enabled: bool) -> Self {
        self.accept_invalid_certs = enabled;
        self
    }

    pub fn build(self) -> Result<HttpEffectExecutor> {
        let base_url = self
            .base_url
            .as_deref()
            .map(|raw| {
                // Without a trailing slash `join` would drop the last segment.
                let normalized =
                    if raw.ends_with('/') { raw.to_string() } else { format!("{raw}/") };
                Url::parse(&normalized)
                    .map_err(|e| OutpostError::Config(format!("invalid base url {raw:?}: {e}")))
            })
            .transpose()?;

        let mut builder = ReqwestClient::builder().timeout(self.timeout).no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if self.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(|err| OutpostError::from(InfraError::from(err)))?;

        Ok(HttpEffectExecutor { client, base_url, default_headers: self.default_headers })
    }
}
