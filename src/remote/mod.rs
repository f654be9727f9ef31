//! Boundary to the REST backend.

mod http;

pub use http::HttpGateway;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::RemoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
        }
    }
}

/// One call against the backend, with a path relative to the API base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl RemoteRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Patch,
            path: path.into(),
            body: Some(body),
        }
    }
}

/// Executes backend calls. A successful call yields the decoded JSON body
/// (`Value::Null` when the body is empty).
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn send(&self, request: &RemoteRequest) -> Result<Value, RemoteError>;
}

/// GET that maps "not found" and empty payloads to `None`.
pub async fn fetch_optional(
    gateway: &dyn RemoteGateway,
    path: &str,
) -> Result<Option<Value>, RemoteError> {
    match gateway.send(&RemoteRequest::get(path)).await {
        Ok(Value::Null) => Ok(None),
        Ok(Value::Object(map)) if map.is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}
