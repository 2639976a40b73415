//! readwise-mcp: MCP server exposing a Readwise library to AI assistants
//!
//! The crate is split between a transport-agnostic core and thin transport
//! adapters:
//!
//! - A request envelope (`tool_call` / `prompt_call`) is routed by the
//!   [`Dispatcher`] to a named operation in the tool or prompt [`Registry`],
//!   validated, executed once, and answered with a success or error envelope
//!   carrying the same `request_id`.
//! - Adapters for line-delimited stdio, Server-Sent Events and
//!   session-correlated HTTP only transcode between their wire format and
//!   the dispatcher.
//!
//! # Modules
//!
//! - [`api`]: Readwise REST client behind the [`api::ReadwiseApi`] trait
//! - [`config`]: configuration loading and validation
//! - [`error`]: error types
//! - [`mcp`]: envelopes, registries, validation, dispatcher, JSON-RPC layer
//! - [`tools`] / [`prompts`]: the built-in operations
//! - [`transport`]: stdio, SSE and HTTP adapters
//!
//! [`Dispatcher`]: mcp::Dispatcher
//! [`Registry`]: mcp::Registry

pub mod api;
pub mod config;
pub mod error;
pub mod mcp;
pub mod prompts;
pub mod tools;
pub mod transport;

use std::sync::Arc;

use api::ReadwiseApi;
use mcp::{Dispatcher, RegistryError};

/// Builds a dispatcher holding every built-in tool and prompt.
///
/// # Errors
///
/// Returns [`RegistryError::Duplicate`] if two built-ins share a name.
pub fn builtin_dispatcher(api: &Arc<dyn ReadwiseApi>) -> Result<Dispatcher, RegistryError> {
    Ok(Dispatcher::new(tools::registry(api)?, prompts::registry(api)?))
}
