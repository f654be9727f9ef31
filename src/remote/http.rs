use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{Method, RemoteGateway, RemoteRequest};
use crate::errors::RemoteError;

/// `reqwest`-backed gateway with optional bearer authentication.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpGateway {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, RemoteError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token,
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Patch => reqwest::Method::PATCH,
    }
}

/// Decodes a response body; non-JSON text is kept as a string value.
fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn send(&self, request: &RemoteRequest) -> Result<Value, RemoteError> {
        let url = self.url_for(&request.path);
        tracing::debug!(method = request.method.as_str(), %url, "backend request");

        let mut builder = self.client.request(to_reqwest(request.method), &url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| RemoteError::Decode(err.to_string()))?;
        let payload = decode_body(&text);

        if status.is_success() {
            Ok(payload)
        } else {
            tracing::debug!(status = status.as_u16(), %url, "backend rejected request");
            Err(RemoteError::from_status(status.as_u16(), &payload))
        }
    }
}
