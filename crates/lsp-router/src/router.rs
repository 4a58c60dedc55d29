//! Router that presents every provider as one language server.
//!
//! The router owns two requests on the connection. `initialize` fans out to
//! all providers concurrently, merges their declarations over the router
//! defaults, and opens a one-time registration window before answering.
//! `workspace/executeCommand` is offered to providers in registration order
//! until one of them claims the command.

use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock, Weak};
use std::thread;

use lsp_router_config::RouterConfig;
use lsp_types::request::{ExecuteCommand, Initialize, Request};
use lsp_types::{ExecuteCommandParams, InitializeParams, InitializeResult, ServerInfo};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::capability::{default_initialize_result, merge_initialize_results};
use crate::connection::{CancellationToken, Connection, typed_handler};
use crate::embedded::EmbeddedRpc;
use crate::errors::{ErrorCode, ResponseError, RouterOperation, panic_message};
use crate::provider::Provider;
use crate::registration::RegistrationWindow;

/// Tracing target for router operations.
pub(crate) const ROUTER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::router");

/// Multiplexes independently authored providers behind one connection.
///
/// Provider order is significant: it fixes capability merge precedence
/// (later providers win scalar conflicts) and command dispatch order
/// (earlier providers are asked first).
pub struct LspRouter {
    connection: Arc<dyn Connection>,
    server_info: ServerInfo,
    providers: Vec<Provider>,
    client_params: RwLock<Option<InitializeParams>>,
    handshake: Mutex<()>,
    capabilities: OnceLock<InitializeResult>,
    embedded: OnceLock<EmbeddedRpc>,
}

impl LspRouter {
    /// Creates a router that reports `server_info` in its handshake response.
    #[must_use]
    pub fn new(connection: Arc<dyn Connection>, server_info: ServerInfo) -> Self {
        Self {
            connection,
            server_info,
            providers: Vec::new(),
            client_params: RwLock::new(None),
            handshake: Mutex::new(()),
            capabilities: OnceLock::new(),
            embedded: OnceLock::new(),
        }
    }

    /// Creates a router whose identity comes from configuration.
    #[must_use]
    pub fn from_config(connection: Arc<dyn Connection>, config: &RouterConfig) -> Self {
        let server_info = ServerInfo {
            name: config.server_name().to_owned(),
            version: config.server_version().map(str::to_owned),
        };
        Self::new(connection, server_info)
    }

    /// Appends a provider. Registration order is dispatch order.
    pub fn add_provider(&mut self, provider: Provider) -> &mut Self {
        debug!(
            target: ROUTER_TARGET,
            provider = provider.name(),
            position = self.providers.len(),
            "provider added"
        );
        self.providers.push(provider);
        self
    }

    /// Providers in registration order.
    #[must_use]
    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    /// Registers the router's requests on the connection and shares it.
    ///
    /// The connection only keeps a weak reference to the router, so dropping
    /// the returned handle makes later requests fail with `InternalError`.
    #[must_use]
    pub fn listen(self) -> Arc<Self> {
        let router = Arc::new(self);

        let initialize = Arc::downgrade(&router);
        router.connection.on_request(
            Initialize::METHOD,
            typed_handler(
                Initialize::METHOD,
                move |params: InitializeParams, token: &CancellationToken| {
                    upgrade(&initialize)?.initialize(params, token)
                },
            ),
        );

        let execute = Arc::downgrade(&router);
        router.connection.on_request(
            ExecuteCommand::METHOD,
            typed_handler(
                ExecuteCommand::METHOD,
                move |params: ExecuteCommandParams, token: &CancellationToken| {
                    upgrade(&execute)?.execute_command(&params, token)
                },
            ),
        );

        router
    }

    /// Runs the `initialize` handshake.
    ///
    /// Every provider negotiates concurrently and the handshake waits for all
    /// of them. If any provider fails, the first failure in registration
    /// order is returned and no registration window is opened. Otherwise the
    /// declarations are merged, each provider gets one chance to register
    /// extra calls, and the router becomes ready.
    ///
    /// # Errors
    ///
    /// Returns the failing provider's error, `InvalidRequest` if the router
    /// is already initialised, or `InternalError` if the merged capabilities
    /// cannot be represented.
    pub fn initialize(
        &self,
        params: InitializeParams,
        token: &CancellationToken,
    ) -> Result<InitializeResult, ResponseError> {
        let _serialised = self
            .handshake
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_ready() {
            warn!(target: ROUTER_TARGET, "rejecting repeated initialize");
            return Err(ResponseError::new(
                ErrorCode::INVALID_REQUEST,
                "initialize may only be sent once",
            ));
        }

        info!(
            target: ROUTER_TARGET,
            providers = self.providers.len(),
            "starting handshake"
        );
        *self
            .client_params
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(params.clone());

        let declarations = self.negotiate_all(&params, token)?;
        let merged = merge_initialize_results(
            default_initialize_result(self.server_info.clone()),
            declarations,
        )
        .map_err(|error| {
            ResponseError::internal(format!("failed to merge provider capabilities: {error}"))
        })?;

        self.run_registration_window();

        // Only the holder of the handshake lock sets the capabilities.
        let ready = self.capabilities.get_or_init(|| merged);
        info!(target: ROUTER_TARGET, "handshake complete");
        Ok(ready.clone())
    }

    /// Dispatches `workspace/executeCommand` to the first provider that
    /// claims the command.
    ///
    /// An unclaimed command resolves to `Ok(None)`; it is not an error.
    ///
    /// # Errors
    ///
    /// Returns `ServerNotInitialized` before the handshake completes, or the
    /// claiming provider's error.
    pub fn execute_command(
        &self,
        params: &ExecuteCommandParams,
        token: &CancellationToken,
    ) -> Result<Option<Value>, ResponseError> {
        if !self.is_ready() {
            return Err(ResponseError::new(
                ErrorCode::SERVER_NOT_INITIALIZED,
                format!(
                    "{} received before initialize completed",
                    RouterOperation::ExecuteCommand
                ),
            ));
        }

        for provider in &self.providers {
            if let Some(result) = provider.try_execute_command(params, token) {
                debug!(
                    target: ROUTER_TARGET,
                    provider = provider.name(),
                    command = %params.command,
                    "command claimed"
                );
                return result;
            }
        }

        debug!(
            target: ROUTER_TARGET,
            command = %params.command,
            "no provider claimed command"
        );
        Ok(None)
    }

    /// Handshake request recorded by the last `initialize`.
    #[must_use]
    pub fn client_initialize_params(&self) -> Option<InitializeParams> {
        self.client_params
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Merged capabilities, once the handshake has completed.
    #[must_use]
    pub fn capabilities(&self) -> Option<&InitializeResult> {
        self.capabilities.get()
    }

    /// Whether the handshake has completed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.capabilities.get().is_some()
    }

    /// Sub-channel shared with providers, once the handshake has completed.
    #[must_use]
    pub fn embedded(&self) -> Option<&EmbeddedRpc> {
        self.embedded.get()
    }

    fn negotiate_all(
        &self,
        params: &InitializeParams,
        token: &CancellationToken,
    ) -> Result<Vec<InitializeResult>, ResponseError> {
        let outcomes: Vec<_> = thread::scope(|scope| {
            let pending: Vec<_> = self
                .providers
                .iter()
                .map(|provider| scope.spawn(move || provider.negotiate(params, token)))
                .collect();

            pending
                .into_iter()
                .zip(&self.providers)
                .map(|(task, provider)| {
                    task.join().unwrap_or_else(|payload| {
                        Some(Err(ResponseError::internal(format!(
                            "provider '{}' panicked during {}: {}",
                            provider.name(),
                            RouterOperation::Initialize,
                            panic_message(payload.as_ref())
                        ))))
                    })
                })
                .collect()
        });

        let mut declarations = Vec::with_capacity(outcomes.len());
        for (outcome, provider) in outcomes.into_iter().zip(&self.providers) {
            match outcome {
                Some(Ok(declaration)) => declarations.push(declaration),
                Some(Err(error)) => {
                    warn!(
                        target: ROUTER_TARGET,
                        provider = provider.name(),
                        code = error.code,
                        "handshake aborted by provider"
                    );
                    return Err(error);
                }
                None => debug!(
                    target: ROUTER_TARGET,
                    provider = provider.name(),
                    "provider abstained from handshake"
                ),
            }
        }
        Ok(declarations)
    }

    fn run_registration_window(&self) {
        let embedded = self
            .embedded
            .get_or_init(|| EmbeddedRpc::new(Arc::clone(&self.connection)));
        let window = RegistrationWindow::open(Arc::clone(&self.connection));
        for provider in &self.providers {
            provider.register_extras(window.handle(), embedded);
        }
    }
}

fn upgrade(router: &Weak<LspRouter>) -> Result<Arc<LspRouter>, ResponseError> {
    router
        .upgrade()
        .ok_or_else(|| ResponseError::internal("router is no longer available"))
}
