//! Feature providers multiplexed behind the router.
//!
//! A [`Provider`] pairs a [`HandlerRegistry`] with the capabilities the
//! provider declared during the handshake. Providers are uniform records of
//! optional handlers; the router treats them all alike.

mod handlers;

use std::panic::{self, AssertUnwindSafe};
use std::sync::{PoisonError, RwLock};

use lsp_types::{ExecuteCommandParams, InitializeParams, InitializeResult, ServerCapabilities};
use serde_json::Value;
use tracing::{debug, warn};

use crate::capability::declared_commands;
use crate::connection::CancellationToken;
use crate::embedded::EmbeddedRpc;
use crate::errors::{ResponseError, panic_message};
use crate::registration::RegistrationHandle;
use crate::router::ROUTER_TARGET;

pub use handlers::{
    ExecuteCommandHandler, HandlerRegistry, InitializeHandler, RegistrationCallback,
};

/// An independently authored feature module.
pub struct Provider {
    name: String,
    handlers: HandlerRegistry,
    capabilities: RwLock<Option<ServerCapabilities>>,
}

impl Provider {
    /// Wraps `handlers` under a name used in logs.
    #[must_use]
    pub fn new(name: impl Into<String>, handlers: HandlerRegistry) -> Self {
        Self {
            name: name.into(),
            handlers,
            capabilities: RwLock::new(None),
        }
    }

    /// Name used in log events.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Capabilities stored by the last successful [`negotiate`](Self::negotiate).
    #[must_use]
    pub fn declared_capabilities(&self) -> Option<ServerCapabilities> {
        self.capabilities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs the provider's handshake handler.
    ///
    /// Returns `None` when the provider registered no handler and so abstains
    /// from the handshake. A successful declaration is stored for command
    /// dispatch; an error is returned unchanged and nothing is stored.
    pub fn negotiate(
        &self,
        params: &InitializeParams,
        token: &CancellationToken,
    ) -> Option<Result<InitializeResult, ResponseError>> {
        let Some(handler) = self.handlers.initialize() else {
            debug!(
                target: ROUTER_TARGET,
                provider = %self.name,
                "provider has no initialize handler"
            );
            return None;
        };

        let result = handler(params, token);
        match &result {
            Ok(declaration) => {
                *self
                    .capabilities
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) =
                    Some(declaration.capabilities.clone());
            }
            Err(error) => {
                warn!(
                    target: ROUTER_TARGET,
                    provider = %self.name,
                    code = error.code,
                    message = %error.message,
                    "provider rejected initialize"
                );
            }
        }
        Some(result)
    }

    /// Executes the command when this provider owns it.
    ///
    /// The provider claims a command only if it declared the exact command
    /// name during the handshake and registered a command handler. Returns
    /// `None` without side effects otherwise.
    pub fn try_execute_command(
        &self,
        params: &ExecuteCommandParams,
        token: &CancellationToken,
    ) -> Option<Result<Option<Value>, ResponseError>> {
        let handler = self.handlers.execute_command()?;
        if !self.declares_command(&params.command) {
            return None;
        }
        Some(handler(params, token))
    }

    /// Runs the one-time registration callback, if any.
    ///
    /// A callback that fails or panics is logged and otherwise ignored, so
    /// one provider cannot abort the window for the others.
    ///
    /// Calling this more than once per handshake is a router bug; the
    /// provider does not guard against it.
    pub fn register_extras(&self, handle: &RegistrationHandle, embedded: &EmbeddedRpc) {
        let Some(callback) = self.handlers.registration() else {
            return;
        };
        let failure = match panic::catch_unwind(AssertUnwindSafe(|| callback(handle, embedded))) {
            Ok(Ok(())) => return,
            Ok(Err(error)) => error.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };
        warn!(
            target: ROUTER_TARGET,
            provider = %self.name,
            error = %failure,
            "provider registration callback failed"
        );
    }

    fn declares_command(&self, command: &str) -> bool {
        self.capabilities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|capabilities| {
                declared_commands(capabilities)
                    .iter()
                    .any(|declared| declared == command)
            })
    }
}
