//! Language Server Protocol router.
//!
//! The crate lets several independently written feature providers share one
//! editor connection. [`LspRouter`] answers the `initialize` handshake by
//! fanning out to every [`Provider`] and merging their declared capabilities,
//! and routes `workspace/executeCommand` to the provider that declared the
//! command. During the handshake each provider may register extra direct
//! requests through a short-lived [`RegistrationHandle`] and private
//! sub-methods through the shared [`EmbeddedRpc`] sub-channel.
//!
//! The transport is not part of this crate: anything implementing
//! [`Connection`] can host the router.

mod capability;
mod connection;
mod embedded;
mod errors;
mod provider;
mod registration;
mod router;
pub mod telemetry;

#[cfg(test)]
mod tests;

pub use capability::{default_initialize_result, merge_initialize_results, merge_values};
pub use connection::{CancellationToken, Connection, RequestHandler};
pub use embedded::{
    EMBEDDED_CALL_METHOD, EmbeddedCallParams, EmbeddedCallResult, EmbeddedRpc, EmbeddedStub,
};
pub use errors::{
    EmbeddedRpcError, ErrorCode, ProviderError, RegistrationError, ResponseError,
    RouterOperation,
};
pub use provider::{
    ExecuteCommandHandler, HandlerRegistry, InitializeHandler, Provider, RegistrationCallback,
};
pub use registration::RegistrationHandle;
pub use router::LspRouter;
