//! Embedded calls multiplexed over a single request type.
//!
//! Providers often need private calls between themselves and the client.
//! Rather than registering each one with the connection, the router
//! registers a single envelope request, [`EMBEDDED_CALL_METHOD`], whose
//! params name the sub-method and carry its params. The client only has to
//! support the envelope once to reach every provider's sub-methods.
//!
//! Sub-method names share one flat namespace across all providers. A second
//! registration under the same name silently replaces the first, so
//! providers must choose globally unique names.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::connection::{CancellationToken, Connection, typed_handler};
use crate::errors::{EmbeddedRpcError, ErrorCode, ProviderError, ResponseError, panic_message};

/// Request method that carries every embedded call.
pub const EMBEDDED_CALL_METHOD: &str = "router/embeddedCall";

/// Tracing target for sub-channel dispatch.
pub(crate) const EMBEDDED_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::embedded");

/// Params of the envelope request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedCallParams {
    /// Sub-method to invoke.
    pub method: String,
    /// Params forwarded to the sub-method.
    #[serde(default)]
    pub params: Value,
}

/// Result of the envelope request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedCallResult {
    /// Value returned by the sub-method.
    #[serde(default)]
    pub result: Value,
}

type EmbeddedHandler =
    Arc<dyn Fn(Value, &CancellationToken) -> Result<Value, ProviderError> + Send + Sync>;

type HandlerMap = Arc<RwLock<HashMap<String, EmbeddedHandler>>>;

/// Sub-channel shared by every provider for the life of the process.
///
/// Clones share the same sub-method registry and connection.
#[derive(Clone)]
pub struct EmbeddedRpc {
    connection: Arc<dyn Connection>,
    handlers: HandlerMap,
}

impl EmbeddedRpc {
    /// Registers the envelope request on `connection`.
    #[must_use]
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        let handlers = HandlerMap::default();
        let registry = Arc::clone(&handlers);
        connection.on_request(
            EMBEDDED_CALL_METHOD,
            typed_handler(
                EMBEDDED_CALL_METHOD,
                move |call: EmbeddedCallParams, token: &CancellationToken| {
                    dispatch(&registry, call, token)
                },
            ),
        );
        Self {
            connection,
            handlers,
        }
    }

    /// Registers `handler` for inbound embedded calls named `method`.
    ///
    /// The last registration for a name wins. Params that do not decode as
    /// `P` are reported to the caller like any other handler failure.
    pub fn on<P, R, F>(&self, method: &str, handler: F)
    where
        P: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: Fn(P, &CancellationToken) -> Result<R, ProviderError> + Send + Sync + 'static,
    {
        let name = method.to_owned();
        let wrapped: EmbeddedHandler = Arc::new(
            move |params: Value, token: &CancellationToken| -> Result<Value, ProviderError> {
                let decoded: P = serde_json::from_value(params).map_err(|error| {
                    ProviderError::with_source(format!("invalid params for '{name}'"), error)
                })?;
                let result = handler(decoded, token)?;
                serde_json::to_value(result).map_err(|error| {
                    ProviderError::with_source(format!("failed to encode '{name}' result"), error)
                })
            },
        );

        let previous = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(method.to_owned(), wrapped);
        if previous.is_some() {
            warn!(
                target: EMBEDDED_TARGET,
                method,
                "embedded handler replaced an earlier registration"
            );
        } else {
            debug!(target: EMBEDDED_TARGET, method, "embedded handler registered");
        }
    }

    /// Whether a handler is registered for `method`.
    #[must_use]
    pub fn has_handler(&self, method: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(method)
    }

    /// Returns a callable that invokes the peer's sub-method `method`.
    #[must_use]
    pub fn stub<P, R>(&self, method: &str) -> EmbeddedStub<P, R> {
        EmbeddedStub {
            method: method.to_owned(),
            connection: Arc::clone(&self.connection),
            _marker: PhantomData,
        }
    }
}

impl fmt::Debug for EmbeddedRpc {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        methods.sort();
        formatter
            .debug_struct("EmbeddedRpc")
            .field("methods", &methods)
            .finish_non_exhaustive()
    }
}

fn dispatch(
    handlers: &HandlerMap,
    call: EmbeddedCallParams,
    token: &CancellationToken,
) -> Result<EmbeddedCallResult, ResponseError> {
    let handler = handlers
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&call.method)
        .cloned();
    let Some(handler) = handler else {
        warn!(
            target: EMBEDDED_TARGET,
            method = %call.method,
            "embedded call for unknown method"
        );
        return Err(ResponseError::new(
            ErrorCode::METHOD_NOT_FOUND,
            format!("unknown embedded method '{}'", call.method),
        ));
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(call.params, token)));
    let failure = match outcome {
        Ok(Ok(result)) => return Ok(EmbeddedCallResult { result }),
        Ok(Err(error)) => error.describe(),
        Err(payload) => panic_message(payload.as_ref()),
    };

    warn!(
        target: EMBEDDED_TARGET,
        method = %call.method,
        error = %failure,
        "embedded handler failed"
    );
    Err(ResponseError::new(ErrorCode::EMBEDDED_CALL_FAILED, "embedded call failed")
        .with_data(json!({ "error": failure })))
}

/// Outbound call to a sub-method implemented by the peer.
pub struct EmbeddedStub<P, R> {
    method: String,
    connection: Arc<dyn Connection>,
    _marker: PhantomData<fn(P) -> R>,
}

impl<P, R> EmbeddedStub<P, R> {
    /// Sub-method this stub invokes.
    #[must_use]
    pub const fn method(&self) -> &str {
        self.method.as_str()
    }
}

impl<P, R> EmbeddedStub<P, R>
where
    P: Serialize,
    R: DeserializeOwned,
{
    /// Sends the envelope request and unwraps the sub-method's result.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddedRpcError::Codec`] when params or the result do not
    /// convert, and [`EmbeddedRpcError::Remote`] when the peer answers with
    /// an error.
    pub fn call(&self, params: P, token: &CancellationToken) -> Result<R, EmbeddedRpcError> {
        let envelope = EmbeddedCallParams {
            method: self.method.clone(),
            params: serde_json::to_value(params).map_err(|source| self.codec(source))?,
        };
        let request = serde_json::to_value(envelope).map_err(|source| self.codec(source))?;
        let response = self
            .connection
            .send_request(EMBEDDED_CALL_METHOD, request, token)
            .map_err(|source| EmbeddedRpcError::Remote {
                method: self.method.clone(),
                source,
            })?;
        let unwrapped: EmbeddedCallResult =
            serde_json::from_value(response).map_err(|source| self.codec(source))?;
        serde_json::from_value(unwrapped.result).map_err(|source| self.codec(source))
    }

    fn codec(&self, source: serde_json::Error) -> EmbeddedRpcError {
        EmbeddedRpcError::Codec {
            method: self.method.clone(),
            source,
        }
    }
}

impl<P, R> Clone for EmbeddedStub<P, R> {
    fn clone(&self) -> Self {
        Self {
            method: self.method.clone(),
            connection: Arc::clone(&self.connection),
            _marker: PhantomData,
        }
    }
}

impl<P, R> fmt::Debug for EmbeddedStub<P, R> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("EmbeddedStub")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}
