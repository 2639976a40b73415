//! Operation contract and the registries that hold operations.
//!
//! Tools and prompts live in two separate [`Registry`] instances, so a tool
//! and a prompt may share a name. Registries are filled once at startup and
//! only read afterwards.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::envelope::ContentEnvelope;
use super::validation::ValidationResult;
use crate::error::ApiError;

/// What an operation produced.
///
/// The dispatcher branches on this tag instead of inspecting the shape of
/// the result.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutput {
    /// Arbitrary JSON, wrapped into a single text item by the dispatcher.
    Raw(Value),
    /// Already content-shaped, passed through unchanged.
    Content(ContentEnvelope),
}

/// Why an operation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// Credentials were missing or rejected upstream.
    #[error("{message}")]
    Authentication {
        /// Error code reported to the client.
        code: String,
        /// Error message reported to the client.
        message: String,
    },

    /// A failure that carries its own structured code.
    #[error("{message}")]
    Structured {
        /// Error code reported to the client.
        code: String,
        /// Error message reported to the client.
        message: String,
    },

    /// Any other failure; only the message is known.
    #[error("{0}")]
    Failed(String),
}

impl OperationError {
    /// Creates a structured failure.
    #[must_use]
    pub fn structured(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Structured {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<ApiError> for OperationError {
    fn from(err: ApiError) -> Self {
        let message = err.to_string();
        match err {
            ApiError::Authentication => Self::Authentication {
                code: "authentication_error".to_string(),
                message,
            },
            ApiError::RateLimited { .. } => Self::structured("rate_limit_exceeded", message),
            ApiError::Network { .. } => Self::structured("network_error", message),
            ApiError::Status { .. } => Self::structured("api_error", message),
            ApiError::Decode { .. } => Self::Failed(message),
        }
    }
}

/// An invocable unit: a tool or a prompt.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Unique name within its registry.
    fn name(&self) -> &str;

    /// Human-readable description for capability discovery.
    fn description(&self) -> &str;

    /// JSON Schema describing the accepted parameters.
    fn parameters(&self) -> Value;

    /// Checks parameter shape before execution.
    ///
    /// The default accepts everything: operations without a validator
    /// surface bad input as execution errors instead.
    fn validate(&self, _parameters: &Map<String, Value>) -> ValidationResult {
        ValidationResult::ok()
    }

    /// Runs the operation.
    async fn execute(&self, parameters: Map<String, Value>)
        -> Result<OperationOutput, OperationError>;
}

/// Listing entry used for capability advertisement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationDefinition {
    /// Operation name.
    pub name: String,
    /// Operation description.
    pub description: String,
    /// Parameter schema.
    pub parameters: Value,
}

/// Errors raised while filling a registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// An operation with the same name is already registered.
    #[error("{kind} '{name}' is already registered")]
    Duplicate {
        /// `tool` or `prompt`.
        kind: &'static str,
        /// The clashing name.
        name: String,
    },
}

/// Ordered name → operation mapping.
pub struct Registry {
    kind: &'static str,
    operations: IndexMap<String, Arc<dyn Operation>>,
}

impl Registry {
    /// Creates an empty tool registry.
    #[must_use]
    pub fn tools() -> Self {
        Self::with_kind("tool")
    }

    /// Creates an empty prompt registry.
    #[must_use]
    pub fn prompts() -> Self {
        Self::with_kind("prompt")
    }

    fn with_kind(kind: &'static str) -> Self {
        Self {
            kind,
            operations: IndexMap::new(),
        }
    }

    /// Returns `tool` or `prompt`.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        self.kind
    }

    /// Adds an operation.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if the name is taken; the
    /// existing registration is kept.
    pub fn register(&mut self, operation: Arc<dyn Operation>) -> Result<(), RegistryError> {
        let name = operation.name().to_string();
        if self.operations.contains_key(&name) {
            tracing::warn!(kind = self.kind, name = %name, "Duplicate registration ignored");
            return Err(RegistryError::Duplicate {
                kind: self.kind,
                name,
            });
        }
        tracing::debug!(kind = self.kind, name = %name, "Registered operation");
        self.operations.insert(name, operation);
        Ok(())
    }

    /// Looks up an operation by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Operation>> {
        self.operations.get(name).cloned()
    }

    /// Returns all names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.operations.keys().map(String::as_str).collect()
    }

    /// Returns name/description/schema for every operation, in registration order.
    #[must_use]
    pub fn definitions(&self) -> Vec<OperationDefinition> {
        self.operations
            .values()
            .map(|op| OperationDefinition {
                name: op.name().to_string(),
                description: op.description().to_string(),
                parameters: op.parameters(),
            })
            .collect()
    }

    /// Number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
