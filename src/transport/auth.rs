//! Optional shared-token gate for the streaming endpoints.
//!
//! When a token is configured, requests must present it either as
//! `Authorization: Bearer <token>` or as a `?token=<token>` query parameter.
//! A missing token is answered with 401, a wrong one with 403.

use axum::extract::{Query, Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use serde::Deserialize;

use super::error_response;
use super::server::AppState;
use crate::mcp::ErrorKind;

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Middleware rejecting requests that do not carry the configured token.
pub async fn require_token(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = state.auth_token.as_deref() else {
        return next.run(req).await;
    };

    match presented_token(&req) {
        None => {
            tracing::debug!(path = %req.uri().path(), "Request without token");
            let mut response = error_response(
                StatusCode::UNAUTHORIZED,
                ErrorKind::Validation,
                "unauthorized",
                "Authentication token required",
            );
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            response
        }
        Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => {
            next.run(req).await
        }
        Some(_) => {
            tracing::warn!(path = %req.uri().path(), "Request with invalid token");
            error_response(
                StatusCode::FORBIDDEN,
                ErrorKind::Validation,
                "forbidden",
                "Invalid authentication token",
            )
        }
    }
}

/// Extracts the token from the bearer header, falling back to `?token=`.
fn presented_token(req: &Request) -> Option<String> {
    let bearer = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_owned());
    }

    Query::<TokenQuery>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|t| !t.is_empty())
}

/// Compares two byte strings without short-circuiting on the first mismatch.
///
/// The length check is not constant-time; token length is not secret.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0_u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
