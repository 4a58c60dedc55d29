//! One-time registration surface handed to providers during the handshake.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::connection::{CancellationToken, Connection, typed_handler};
use crate::errors::{RegistrationError, ResponseError};
use crate::router::ROUTER_TARGET;

/// Capability to register direct request handlers on the connection.
///
/// A handle is only usable while the registration window of the handshake
/// that issued it is open. Once the window closes the handle is disposed:
/// every later call fails with [`RegistrationError::Disposed`], including
/// calls through clones a provider kept. Disposal is permanent.
#[derive(Clone)]
pub struct RegistrationHandle {
    connection: Arc<dyn Connection>,
    disposed: Arc<AtomicBool>,
}

impl RegistrationHandle {
    fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            connection,
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Registers a handler for the inbound request `method`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Disposed`] once the registration window
    /// has closed.
    pub fn on_request<P, R, F>(&self, method: &str, handler: F) -> Result<(), RegistrationError>
    where
        P: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: Fn(P, &CancellationToken) -> Result<R, ResponseError> + Send + Sync + 'static,
    {
        self.ensure_open(method)?;
        debug!(target: ROUTER_TARGET, method, "registering direct request handler");
        self.connection
            .on_request(method, typed_handler(method, handler));
        Ok(())
    }

    /// Whether the registration window for this handle has closed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self, method: &str) -> Result<(), RegistrationError> {
        if self.is_disposed() {
            return Err(RegistrationError::Disposed {
                method: method.to_owned(),
            });
        }
        Ok(())
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }
}

impl fmt::Debug for RegistrationHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RegistrationHandle")
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

/// Scope of one registration window.
///
/// Dropping the window disposes its handle, so the handle is revoked even
/// when a provider callback unwinds.
pub(crate) struct RegistrationWindow {
    handle: RegistrationHandle,
}

impl RegistrationWindow {
    pub(crate) fn open(connection: Arc<dyn Connection>) -> Self {
        debug!(target: ROUTER_TARGET, "registration window opened");
        Self {
            handle: RegistrationHandle::new(connection),
        }
    }

    pub(crate) const fn handle(&self) -> &RegistrationHandle {
        &self.handle
    }
}

impl Drop for RegistrationWindow {
    fn drop(&mut self) {
        self.handle.dispose();
        debug!(target: ROUTER_TARGET, "registration window closed");
    }
}
