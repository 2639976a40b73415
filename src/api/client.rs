//! `reqwest`-backed implementation of [`ReadwiseApi`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;

use super::{ApiRequest, Method, ReadwiseApi, Service};
use crate::config::ApiConfig;
use crate::error::ApiError;

/// Initial backoff when a 429 carries no `Retry-After` header.
const BASE_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound for any single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// HTTP client for the Readwise highlights and Reader APIs.
pub struct HttpClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
    reader_base_url: String,
    max_retries: u32,
}

impl HttpClient {
    /// Creates a client from the API section of the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] if the TLS backend cannot be initialised.
    pub fn new(token: impl Into<String>, config: &ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("readwise-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Network {
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            token: token.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            reader_base_url: config.reader_base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        })
    }

    fn url_for(&self, request: &ApiRequest) -> String {
        let base = match request.service {
            Service::Highlights => &self.base_url,
            Service::Reader => &self.reader_base_url,
        };
        format!("{base}/{}", request.path.trim_start_matches('/'))
    }

    async fn send_once(&self, request: &ApiRequest) -> Result<reqwest::Response, ApiError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .http
            .request(method, self.url_for(request))
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .query(&request.query);

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        builder.send().await.map_err(|e| ApiError::Network {
            message: e.without_url().to_string(),
        })
    }
}

#[async_trait]
impl ReadwiseApi for HttpClient {
    async fn call(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            tracing::debug!(path = %request.path, attempt, "Calling Readwise API");

            let response = self.send_once(&request).await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt > self.max_retries {
                    tracing::warn!(path = %request.path, attempt, "Rate limit retries exhausted");
                    return Err(ApiError::RateLimited { attempts: attempt });
                }
                let delay = retry_delay(attempt, response.headers());
                tracing::info!(
                    path = %request.path,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let body = response.text().await.map_err(|e| ApiError::Network {
                message: e.without_url().to_string(),
            })?;

            check_status(status, &body)?;
            return decode_body(&body);
        }
    }
}

/// Computes how long to wait before retry number `attempt` (1-based).
///
/// A numeric `Retry-After` header wins; otherwise the delay doubles from
/// [`BASE_BACKOFF`]. Both are capped at [`MAX_BACKOFF`].
fn retry_delay(attempt: u32, headers: &HeaderMap) -> Duration {
    let hinted = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    let delay = hinted.unwrap_or_else(|| {
        let exponent = attempt.saturating_sub(1).min(6);
        BASE_BACKOFF * 2u32.pow(exponent)
    });

    delay.min(MAX_BACKOFF)
}

/// Maps a non-success status onto the client error taxonomy.
fn check_status(status: StatusCode, body: &str) -> Result<(), ApiError> {
    if status.is_success() {
        return Ok(());
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::Authentication);
    }

    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("unknown error").to_string()
    } else {
        body.chars().take(500).collect()
    };

    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

fn decode_body(body: &str) -> Result<Value, ApiError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| ApiError::Decode {
        message: e.to_string(),
    })
}
