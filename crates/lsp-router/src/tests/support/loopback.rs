//! In-memory connection pair used in place of a real transport.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use serde_json::Value;

use crate::connection::{CancellationToken, Connection, RequestHandler};
use crate::errors::ResponseError;

/// Connection whose outbound requests are served by its peer's handlers.
#[derive(Default)]
pub struct LoopbackConnection {
    handlers: RwLock<HashMap<String, RequestHandler>>,
    peer: RwLock<Weak<LoopbackConnection>>,
    sent: Mutex<Vec<String>>,
}

impl LoopbackConnection {
    /// Builds two connected ends, conventionally `(server, client)`.
    pub fn pair() -> (Arc<Self>, Arc<Self>) {
        let server = Arc::new(Self::default());
        let client = Arc::new(Self::default());
        server.connect(&client);
        client.connect(&server);
        (server, client)
    }

    /// Builds an end with no peer; outbound requests fail.
    pub fn standalone() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn connect(&self, peer: &Arc<Self>) {
        *self.peer.write().unwrap_or_else(PoisonError::into_inner) = Arc::downgrade(peer);
    }

    /// Whether a handler is registered for `method` on this end.
    pub fn has_handler(&self, method: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(method)
    }

    /// Methods sent from this end, in order.
    pub fn sent_methods(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Delivers an inbound request to this end's handler.
    pub fn deliver(
        &self,
        method: &str,
        params: Value,
        token: &CancellationToken,
    ) -> Result<Value, ResponseError> {
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(method)
            .cloned();
        match handler {
            Some(handler) => handler(params, token),
            None => Err(ResponseError::method_not_found(method)),
        }
    }
}

impl Connection for LoopbackConnection {
    fn on_request(&self, method: &str, handler: RequestHandler) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(method.to_owned(), handler);
    }

    fn send_request(
        &self,
        method: &str,
        params: Value,
        token: &CancellationToken,
    ) -> Result<Value, ResponseError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(method.to_owned());
        let peer = self
            .peer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .upgrade()
            .ok_or_else(|| ResponseError::internal("loopback peer is closed"))?;
        peer.deliver(method, params, token)
    }
}
