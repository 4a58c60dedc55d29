use crate::logging::LogFormat;

/// Server name reported in `serverInfo` when none is configured.
pub const DEFAULT_SERVER_NAME: &str = "lsp-router";

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Server name reported in `serverInfo` when none is configured.
#[must_use]
pub fn default_server_name() -> String {
    DEFAULT_SERVER_NAME.to_owned()
}

/// Server version reported in `serverInfo` when none is configured.
///
/// Falls back to the version of this crate.
#[must_use]
pub fn default_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_owned()
}

/// Default log filter expression.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
