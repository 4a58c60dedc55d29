//! Per-provider handler slots.

use lsp_types::{ExecuteCommandParams, InitializeParams, InitializeResult};
use serde_json::Value;

use crate::connection::CancellationToken;
use crate::embedded::EmbeddedRpc;
use crate::errors::{RegistrationError, ResponseError};
use crate::registration::RegistrationHandle;

/// Handles the provider's share of the `initialize` handshake.
pub type InitializeHandler = Box<
    dyn Fn(&InitializeParams, &CancellationToken) -> Result<InitializeResult, ResponseError>
        + Send
        + Sync,
>;

/// Executes a command the provider declared in `executeCommandProvider`.
pub type ExecuteCommandHandler = Box<
    dyn Fn(&ExecuteCommandParams, &CancellationToken) -> Result<Option<Value>, ResponseError>
        + Send
        + Sync,
>;

/// One-time callback invoked inside the registration window.
pub type RegistrationCallback =
    Box<dyn Fn(&RegistrationHandle, &EmbeddedRpc) -> Result<(), RegistrationError> + Send + Sync>;

/// Handlers a provider registers with the router.
///
/// Every slot is optional. Setting a slot twice replaces the earlier handler.
#[derive(Default)]
pub struct HandlerRegistry {
    initialize: Option<InitializeHandler>,
    execute_command: Option<ExecuteCommandHandler>,
    registration: Option<RegistrationCallback>,
}

impl HandlerRegistry {
    /// Creates a registry with every slot empty.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the handshake handler.
    ///
    /// The returned declaration is both advertised to the client and used to
    /// decide which commands this provider may execute.
    pub fn set_initialize_handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&InitializeParams, &CancellationToken) -> Result<InitializeResult, ResponseError>
            + Send
            + Sync
            + 'static,
    {
        self.initialize = Some(Box::new(handler));
        self
    }

    /// Sets the command execution handler.
    pub fn set_execute_command_handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&ExecuteCommandParams, &CancellationToken) -> Result<Option<Value>, ResponseError>
            + Send
            + Sync
            + 'static,
    {
        self.execute_command = Some(Box::new(handler));
        self
    }

    /// Sets the callback run once inside the registration window.
    pub fn set_registration_handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&RegistrationHandle, &EmbeddedRpc) -> Result<(), RegistrationError>
            + Send
            + Sync
            + 'static,
    {
        self.registration = Some(Box::new(handler));
        self
    }

    pub(crate) fn initialize(&self) -> Option<&InitializeHandler> {
        self.initialize.as_ref()
    }

    pub(crate) fn execute_command(&self) -> Option<&ExecuteCommandHandler> {
        self.execute_command.as_ref()
    }

    pub(crate) fn registration(&self) -> Option<&RegistrationCallback> {
        self.registration.as_ref()
    }
}
