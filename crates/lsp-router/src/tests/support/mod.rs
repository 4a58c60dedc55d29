//! Shared fixtures and helpers for router tests.

mod loopback;
mod world;

use std::sync::{Arc, Mutex, PoisonError};

use lsp_types::{
    ExecuteCommandOptions, ExecuteCommandParams, InitializeResult, ServerCapabilities,
    ServerInfo, WorkDoneProgressParams,
};
use serde_json::{Value, json};

use crate::errors::{ErrorCode, ResponseError};
use crate::provider::{HandlerRegistry, Provider};
use crate::router::LspRouter;

pub use loopback::LoopbackConnection;
pub use world::RouterWorld;

/// Ordered record of calls made into test providers.
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Records a call.
    pub fn record(&self, entry: impl Into<String>) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    /// Snapshot of recorded calls.
    pub fn entries(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded calls that start with `prefix`.
    pub fn matching(&self, prefix: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.starts_with(prefix))
            .collect()
    }
}

/// Server identity used by test routers.
pub fn server_info() -> ServerInfo {
    ServerInfo {
        name: String::from("test-router"),
        version: Some(String::from("1.2.3")),
    }
}

/// Router over a standalone loopback connection.
pub fn router_with(providers: Vec<Provider>) -> LspRouter {
    let mut router = LspRouter::new(LoopbackConnection::standalone(), server_info());
    for provider in providers {
        router.add_provider(provider);
    }
    router
}

/// Declaration advertising `commands`.
pub fn declaration(commands: &[&str]) -> InitializeResult {
    InitializeResult {
        capabilities: ServerCapabilities {
            execute_command_provider: Some(ExecuteCommandOptions {
                commands: commands.iter().map(|command| (*command).to_owned()).collect(),
                ..ExecuteCommandOptions::default()
            }),
            ..ServerCapabilities::default()
        },
        server_info: None,
    }
}

/// `workspace/executeCommand` params for `command`.
pub fn execute_params(command: &str) -> ExecuteCommandParams {
    ExecuteCommandParams {
        command: command.to_owned(),
        arguments: vec![json!(1)],
        work_done_progress_params: WorkDoneProgressParams::default(),
    }
}

/// Value returned by [`commanding_provider`] for a command.
pub fn command_result(provider: &str, command: &str) -> Value {
    json!({ "provider": provider, "command": command })
}

/// Handlers that declare `commands`, execute them, and record every call.
pub fn commanding_handlers(name: &str, commands: &[&str], log: &CallLog) -> HandlerRegistry {
    let mut handlers = HandlerRegistry::new();

    let declared = declaration(commands);
    let init_log = log.clone();
    let init_name = name.to_owned();
    handlers.set_initialize_handler(move |_, _| {
        init_log.record(format!("{init_name}:initialize"));
        Ok(declared.clone())
    });

    let exec_log = log.clone();
    let exec_name = name.to_owned();
    handlers.set_execute_command_handler(move |params, _| {
        exec_log.record(format!("{exec_name}:execute:{}", params.command));
        Ok(Some(command_result(&exec_name, &params.command)))
    });

    let reg_log = log.clone();
    let reg_name = name.to_owned();
    handlers.set_registration_handler(move |_, _| {
        reg_log.record(format!("{reg_name}:register"));
        Ok(())
    });

    handlers
}

/// Provider built from [`commanding_handlers`].
pub fn commanding_provider(name: &str, commands: &[&str], log: &CallLog) -> Provider {
    Provider::new(name, commanding_handlers(name, commands, log))
}

/// Provider whose handshake handler fails with `message`.
pub fn failing_provider(name: &str, message: &str, log: &CallLog) -> Provider {
    let mut handlers = commanding_handlers(name, &[], log);
    let init_log = log.clone();
    let init_name = name.to_owned();
    let error = negotiation_error(message);
    handlers.set_initialize_handler(move |_, _| {
        init_log.record(format!("{init_name}:initialize"));
        Err(error.clone())
    });
    Provider::new(name, handlers)
}

/// Provider with command and registration handlers but no handshake handler.
pub fn abstaining_provider(name: &str, log: &CallLog) -> Provider {
    let mut handlers = HandlerRegistry::new();
    let exec_log = log.clone();
    let exec_name = name.to_owned();
    handlers.set_execute_command_handler(move |params, _| {
        exec_log.record(format!("{exec_name}:execute:{}", params.command));
        Ok(None)
    });
    let reg_log = log.clone();
    let reg_name = name.to_owned();
    handlers.set_registration_handler(move |_, _| {
        reg_log.record(format!("{reg_name}:register"));
        Ok(())
    });
    Provider::new(name, handlers)
}

/// Handshake failure in the shape of an LSP `InitializeError`.
pub fn negotiation_error(message: &str) -> ResponseError {
    ResponseError::new(ErrorCode::INTERNAL_ERROR, message).with_data(json!({ "retry": false }))
}

/// Commands advertised in a merged result.
pub fn merged_commands(result: &InitializeResult) -> Vec<String> {
    result
        .capabilities
        .execute_command_provider
        .as_ref()
        .map(|options| options.commands.clone())
        .unwrap_or_default()
}
