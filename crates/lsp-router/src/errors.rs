//! Error types surfaced by the router.

use std::any::Any;
use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// JSON-RPC and LSP error codes used by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode;

impl ErrorCode {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i64 = -32_700;
    /// The request object is not valid for the current state.
    pub const INVALID_REQUEST: i64 = -32_600;
    /// The method does not exist.
    pub const METHOD_NOT_FOUND: i64 = -32_601;
    /// The parameters do not match what the handler expects.
    pub const INVALID_PARAMS: i64 = -32_602;
    /// Internal failure while handling the request.
    pub const INTERNAL_ERROR: i64 = -32_603;
    /// A request arrived before the `initialize` handshake completed.
    pub const SERVER_NOT_INITIALIZED: i64 = -32_002;
    /// Generic failure of an embedded sub-channel handler.
    pub const EMBEDDED_CALL_FAILED: i64 = -1;
}

/// Error object returned to the remote peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{message} (code: {code})")]
pub struct ResponseError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable description.
    pub message: String,
    /// Optional structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseError {
    /// Builds an error without a payload.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attaches a structured payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Builds an `InternalError` response.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INTERNAL_ERROR, message)
    }

    /// Builds an `InvalidParams` response describing a decoding failure.
    #[must_use]
    pub fn invalid_params(method: &str, source: &serde_json::Error) -> Self {
        Self::new(
            ErrorCode::INVALID_PARAMS,
            format!("invalid params for '{method}': {source}"),
        )
    }

    /// Builds a `MethodNotFound` response.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::METHOD_NOT_FOUND,
            format!("no handler registered for '{method}'"),
        )
    }
}

/// Misuse of a [`RegistrationHandle`](crate::RegistrationHandle).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The handle was used after the registration window closed.
    #[error("registration handle is disposed; cannot register '{method}'")]
    Disposed {
        /// Method the caller attempted to register.
        method: String,
    },
}

/// Failure raised by a provider's embedded sub-channel handler.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ProviderError {
    message: String,
    #[source]
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl ProviderError {
    /// Builds an error without an underlying source.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Builds an error that wraps an underlying source.
    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Human-friendly description without the optional source.
    #[must_use]
    pub const fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Description including the chain of sources, used as the opaque
    /// payload of an embedded error envelope.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut text = self.message.clone();
        let mut next = self.source();
        while let Some(cause) = next {
            text.push_str(": ");
            text.push_str(&cause.to_string());
            next = cause.source();
        }
        text
    }
}

/// Failures of an outbound embedded call made through an
/// [`EmbeddedStub`](crate::EmbeddedStub).
#[derive(Debug, Error)]
pub enum EmbeddedRpcError {
    /// Parameters or result could not be converted to or from JSON.
    #[error("embedded call '{method}' could not be encoded: {source}")]
    Codec {
        /// Sub-method being invoked.
        method: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// The peer answered with an error, including error envelopes produced
    /// by a failing sub-method handler.
    #[error("embedded call '{method}' failed: {source}")]
    Remote {
        /// Sub-method being invoked.
        method: String,
        /// Error returned by the peer.
        #[source]
        source: ResponseError,
    },
}

impl EmbeddedRpcError {
    /// Sub-method associated with the failure.
    #[must_use]
    pub const fn method(&self) -> &str {
        match self {
            Self::Codec { method, .. } | Self::Remote { method, .. } => method.as_str(),
        }
    }
}

/// Request phase in which a router failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterOperation {
    /// `initialize` handshake.
    Initialize,
    /// `workspace/executeCommand` dispatch.
    ExecuteCommand,
}

impl fmt::Display for RouterOperation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Initialize => "initialize",
            Self::ExecuteCommand => "executeCommand",
        };
        formatter.write_str(label)
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_owned();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    String::from("handler panicked")
}
