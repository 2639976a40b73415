//! Model Context Protocol (MCP) request handling.
//!
//! This module holds everything between a decoded message and an operation:
//! envelopes, the operation registries, parameter validation, the
//! dispatcher, the per-session JSON-RPC handler and the session store used
//! by the streaming transports.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            Transports                            │
//! │        stdio (lines)      SSE (/sse + /messages)     HTTP (/mcp) │
//! └───────────┬──────────────────────┬──────────────────────┬────────┘
//!             │ envelope             │ JSON-RPC             │ JSON-RPC
//!             │                      ▼                      ▼
//!             │              ┌──────────────────────────────────┐
//!             │              │  ProtocolHandler (per session)   │
//!             │              └────────────────┬─────────────────┘
//!             ▼                               ▼
//!      ┌─────────────────────────────────────────────────────────┐
//!      │ Dispatcher: envelope → registry → validation → execute  │
//!      └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod dispatcher;
pub mod envelope;
pub mod handler;
pub mod protocol;
pub mod registry;
pub mod store;
pub mod validation;

pub use dispatcher::Dispatcher;
pub use envelope::{
    CallKind, ContentEnvelope, ContentItem, ErrorKind, RequestEnvelope, ResponseEnvelope,
    UNKNOWN_REQUEST_ID,
};
pub use handler::{ProtocolHandler, Reply};
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use registry::{Operation, OperationError, OperationOutput, Registry, RegistryError};
pub use store::SessionStore;
pub use validation::{ParamChecker, ValidationResult};
