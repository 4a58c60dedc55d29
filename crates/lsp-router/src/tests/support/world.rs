//! BDD test world wiring a router to an in-memory client.

use std::sync::{Arc, Mutex, PoisonError};

use lsp_types::{InitializeParams, InitializeResult};
use serde_json::Value;

use crate::connection::{CancellationToken, Connection};
use crate::embedded::EmbeddedRpc;
use crate::errors::{EmbeddedRpcError, ProviderError, RegistrationError, ResponseError};
use crate::provider::{HandlerRegistry, Provider};
use crate::registration::RegistrationHandle;
use crate::router::LspRouter;

use super::{
    CallLog, LoopbackConnection, commanding_handlers, commanding_provider, failing_provider,
    server_info,
};

/// Shared state exercised by BDD step implementations.
pub struct RouterWorld {
    /// Calls made into providers, in order.
    pub log: CallLog,
    pending: Vec<Provider>,
    router: Option<LspRouter>,
    server: Arc<LoopbackConnection>,
    client: Arc<LoopbackConnection>,
    client_embedded: EmbeddedRpc,
    retained: Arc<Mutex<Option<RegistrationHandle>>>,
    /// Outcome of the last handshake.
    pub handshake: Option<Result<InitializeResult, ResponseError>>,
    /// Outcome of the last command dispatch.
    pub dispatch: Option<Result<Option<Value>, ResponseError>>,
    /// Outcome of registering through a retained handle.
    pub late_registration: Option<Result<(), RegistrationError>>,
    /// Outcome of the last client-side request.
    pub client_reply: Option<Result<Value, ResponseError>>,
    /// Outcome of the last embedded call made by the client.
    pub embedded_reply: Option<Result<Value, EmbeddedRpcError>>,
}

impl RouterWorld {
    /// Builds a world with no providers.
    #[must_use]
    pub fn new() -> Self {
        let (server, client) = LoopbackConnection::pair();
        let client_embedded = EmbeddedRpc::new(Arc::clone(&client) as Arc<dyn Connection>);
        Self {
            log: CallLog::default(),
            pending: Vec::new(),
            router: None,
            server,
            client,
            client_embedded,
            retained: Arc::new(Mutex::new(None)),
            handshake: None,
            dispatch: None,
            late_registration: None,
            client_reply: None,
            embedded_reply: None,
        }
    }

    /// Queues a provider that declares and executes `command`.
    pub fn add_commanding(&mut self, name: &str, command: &str) {
        self.pending
            .push(commanding_provider(name, &[command], &self.log));
    }

    /// Queues a provider whose handshake fails with `message`.
    pub fn add_failing(&mut self, name: &str, message: &str) {
        self.pending
            .push(failing_provider(name, message, &self.log));
    }

    /// Queues a provider that registers `method` directly and keeps its
    /// registration handle after the window closes.
    pub fn add_retaining(&mut self, name: &str, method: &str) {
        let mut handlers = commanding_handlers(name, &[], &self.log);
        let retained = Arc::clone(&self.retained);
        let direct = method.to_owned();
        handlers.set_registration_handler(move |handle, _| {
            handle.on_request(&direct, |params: Value, _: &CancellationToken| Ok(params))?;
            *retained.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle.clone());
            Ok(())
        });
        self.pending.push(Provider::new(name, handlers));
    }

    /// Queues a provider that serves the embedded sub-method `method` by
    /// answering with `reply`.
    pub fn add_embedded(&mut self, name: &str, method: &str, reply: Value) {
        let mut handlers = HandlerRegistry::new();
        let sub_method = method.to_owned();
        handlers.set_registration_handler(move |_, embedded| {
            let answer = reply.clone();
            embedded.on(&sub_method, move |_: Value, _: &CancellationToken| {
                Ok::<_, ProviderError>(answer.clone())
            });
            Ok(())
        });
        self.pending.push(Provider::new(name, handlers));
    }

    /// Queues a provider whose embedded sub-method `method` always fails.
    pub fn add_failing_embedded(&mut self, name: &str, method: &str, message: &str) {
        let mut handlers = HandlerRegistry::new();
        let sub_method = method.to_owned();
        let failure = message.to_owned();
        handlers.set_registration_handler(move |_, embedded| {
            let text = failure.clone();
            embedded.on(&sub_method, move |_: Value, _: &CancellationToken| {
                Err::<Value, _>(ProviderError::new(text.clone()))
            });
            Ok(())
        });
        self.pending.push(Provider::new(name, handlers));
    }

    /// Runs the handshake, building the router on first use.
    pub fn initialize(&mut self) {
        let token = CancellationToken::new();
        let result = self.router().initialize(InitializeParams::default(), &token);
        self.handshake = Some(result);
    }

    /// Dispatches `command` through the router.
    pub fn execute(&mut self, command: &str) {
        let token = CancellationToken::new();
        let result = self
            .router()
            .execute_command(&super::execute_params(command), &token);
        self.dispatch = Some(result);
    }

    /// Uses the retained registration handle to register `method`.
    pub fn register_late(&mut self, method: &str) {
        let handle = self
            .retained
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .expect("no registration handle was retained");
        self.late_registration = Some(
            handle.on_request(method, |params: Value, _: &CancellationToken| Ok(params)),
        );
    }

    /// Sends `method` directly from the client.
    pub fn client_request(&mut self, method: &str, params: Value) {
        let token = CancellationToken::new();
        self.client_reply = Some(self.client.send_request(method, params, &token));
    }

    /// Invokes the embedded sub-method `method` from the client.
    pub fn client_embedded_call(&mut self, method: &str, params: Value) {
        let token = CancellationToken::new();
        let stub = self.client_embedded.stub::<Value, Value>(method);
        self.embedded_reply = Some(stub.call(params, &token));
    }

    /// Whether the server end has a handler for `method`.
    #[must_use]
    pub fn server_handles(&self, method: &str) -> bool {
        self.server.has_handler(method)
    }

    /// Router under test, built from the queued providers on first use.
    pub fn router(&mut self) -> &LspRouter {
        let server = Arc::clone(&self.server) as Arc<dyn Connection>;
        let pending = &mut self.pending;
        self.router.get_or_insert_with(|| {
            let mut router = LspRouter::new(server, server_info());
            for provider in pending.drain(..) {
                router.add_provider(provider);
            }
            router
        })
    }
}

impl Default for RouterWorld {
    fn default() -> Self {
        Self::new()
    }
}
