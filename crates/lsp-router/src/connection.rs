//! Boundary to the connection that carries the editor protocol.
//!
//! The router never frames or serialises messages itself. It registers
//! request handlers on a [`Connection`] and sends outbound requests through
//! it; the concrete transport lives outside this crate.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::ResponseError;

/// Cooperative cancellation signal handed to every handler invocation.
///
/// Clones share the same flag. Once cancelled, a token stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of the work observing this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Untyped request handler registered on a [`Connection`].
pub type RequestHandler =
    Arc<dyn Fn(Value, &CancellationToken) -> Result<Value, ResponseError> + Send + Sync>;

/// Request/response plumbing supplied by the transport.
///
/// Implementations must tolerate handlers being registered from any thread
/// and may invoke handlers for independent requests concurrently.
pub trait Connection: Send + Sync {
    /// Registers `handler` for inbound requests named `method`.
    ///
    /// Registering the same method twice replaces the earlier handler.
    fn on_request(&self, method: &str, handler: RequestHandler);

    /// Sends a request to the remote peer and blocks until it answers.
    ///
    /// # Errors
    ///
    /// Returns the peer's error response, or a transport failure expressed
    /// as a [`ResponseError`].
    fn send_request(
        &self,
        method: &str,
        params: Value,
        token: &CancellationToken,
    ) -> Result<Value, ResponseError>;
}

/// Adapts a typed handler to the untyped [`RequestHandler`] shape.
///
/// Parameters that fail to decode are answered with `InvalidParams`; a
/// result that cannot be encoded is answered with `InternalError`.
pub(crate) fn typed_handler<P, R, F>(method: &str, handler: F) -> RequestHandler
where
    P: DeserializeOwned + 'static,
    R: Serialize + 'static,
    F: Fn(P, &CancellationToken) -> Result<R, ResponseError> + Send + Sync + 'static,
{
    let method = method.to_owned();
    Arc::new(
        move |params: Value, token: &CancellationToken| -> Result<Value, ResponseError> {
            let decoded: P = serde_json::from_value(params)
                .map_err(|error| ResponseError::invalid_params(&method, &error))?;
            let result = handler(decoded, token)?;
            serde_json::to_value(result).map_err(|error| {
                ResponseError::internal(format!("failed to encode '{method}' result: {error}"))
            })
        },
    )
}

impl fmt::Debug for dyn Connection {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("Connection")
    }
}
