//! Readwise REST API access.
//!
//! Operations never talk HTTP directly. They build an [`ApiRequest`] and
//! hand it to a [`ReadwiseApi`] implementation; the production one is
//! [`HttpClient`], tests substitute an in-memory double.

mod client;

pub use client::HttpClient;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ApiError;

/// Which Readwise API family an endpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Highlights API (`/api/v2`): books, highlights, tags.
    Highlights,
    /// Reader API (`/api/v3`): documents, videos and reading progress.
    Reader,
}

/// HTTP verb for an [`ApiRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

/// A single call against the Readwise API.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// API family the path is relative to.
    pub service: Service,
    /// HTTP verb.
    pub method: Method,
    /// Path relative to the service base URL, e.g. `books/`.
    pub path: String,
    /// Query string pairs.
    pub query: Vec<(String, String)>,
    /// Optional JSON body.
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Creates a `GET` request.
    #[must_use]
    pub fn get(service: Service, path: impl Into<String>) -> Self {
        Self {
            service,
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Creates a `POST` request with a JSON body.
    #[must_use]
    pub fn post(service: Service, path: impl Into<String>, body: Value) -> Self {
        Self {
            service,
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// Creates a `PATCH` request with a JSON body.
    #[must_use]
    pub fn patch(service: Service, path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Patch,
            ..Self::post(service, path, body)
        }
    }

    /// Creates a `DELETE` request.
    #[must_use]
    pub fn delete(service: Service, path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            ..Self::get(service, path)
        }
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Appends a query parameter when `value` is present.
    #[must_use]
    pub fn query_opt<T: ToString>(self, key: &str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.query(key, v),
            None => self,
        }
    }
}

/// The external API collaborator consumed by operations.
#[async_trait]
pub trait ReadwiseApi: Send + Sync {
    /// Performs one API call and returns the decoded JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on authentication failure, exhausted rate-limit
    /// retries, network failure, unexpected status, or an undecodable body.
    async fn call(&self, request: ApiRequest) -> Result<Value, ApiError>;
}
