//! Capability declarations and their merge into one negotiated result.
//!
//! Merging happens on the JSON form of [`InitializeResult`] so that nested
//! and experimental capabilities merge without the router knowing their
//! shape. The fold starts from the router defaults and applies provider
//! declarations in registration order:
//!
//! - objects merge key by key;
//! - arrays merge as an order-preserving union;
//! - any other leaf, `null`, or a type mismatch is replaced by the later
//!   operand, so later-registered providers win over earlier ones and every
//!   provider wins over the router defaults.

use lsp_types::{
    InitializeResult, ServerCapabilities, ServerInfo, TextDocumentSyncCapability,
    TextDocumentSyncKind, TextDocumentSyncOptions,
};
use serde_json::Value;

/// Initialize result advertised by the router before any provider is merged.
#[must_use]
pub fn default_initialize_result(server_info: ServerInfo) -> InitializeResult {
    InitializeResult {
        capabilities: ServerCapabilities {
            text_document_sync: Some(TextDocumentSyncCapability::Options(
                TextDocumentSyncOptions {
                    open_close: Some(true),
                    change: Some(TextDocumentSyncKind::INCREMENTAL),
                    ..TextDocumentSyncOptions::default()
                },
            )),
            ..ServerCapabilities::default()
        },
        server_info: Some(server_info),
    }
}

/// Commands a provider declared through `executeCommandProvider`.
pub(crate) fn declared_commands(capabilities: &ServerCapabilities) -> &[String] {
    capabilities
        .execute_command_provider
        .as_ref()
        .map_or(&[], |options| options.commands.as_slice())
}

/// Folds provider declarations over `base` in the order given.
///
/// # Errors
///
/// Returns an error if a declaration cannot be represented as JSON or the
/// merged document no longer describes an [`InitializeResult`].
pub fn merge_initialize_results<I>(
    base: InitializeResult,
    declarations: I,
) -> Result<InitializeResult, serde_json::Error>
where
    I: IntoIterator<Item = InitializeResult>,
{
    let mut merged = serde_json::to_value(base)?;
    for declaration in declarations {
        merge_values(&mut merged, serde_json::to_value(declaration)?);
    }
    serde_json::from_value(merged)
}

/// Recursively merges `overlay` into `target`.
pub fn merge_values(target: &mut Value, overlay: Value) {
    match (target, overlay) {
        (Value::Object(target_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match target_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(target_items), Value::Array(overlay_items)) => {
            for item in overlay_items {
                if !target_items.contains(&item) {
                    target_items.push(item);
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
