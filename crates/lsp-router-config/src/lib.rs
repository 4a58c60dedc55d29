//! Layered configuration for the LSP router.
//!
//! [`RouterConfig`] is resolved by `ortho_config` from built-in defaults, an
//! optional configuration file, `LSP_ROUTER_*` environment variables, and
//! command-line flags, in increasing order of precedence. It carries the
//! identity the router reports during the `initialize` handshake and the
//! logging settings used by the telemetry bootstrap.

mod defaults;
mod logging;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_SERVER_NAME, default_log_filter, default_log_filter_string,
    default_log_format, default_server_name, default_server_version,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Router configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, OrthoConfig)]
#[ortho_config(prefix = "LSP_ROUTER")]
pub struct RouterConfig {
    /// Name reported in the merged `serverInfo`.
    #[serde(default = "default_server_name")]
    pub server_name: String,
    /// Version reported in the merged `serverInfo`.
    #[serde(default = "default_server_version")]
    pub server_version: String,
    /// `tracing` filter directive, e.g. `info` or `lsp_router=debug`.
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            server_version: default_server_version(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl RouterConfig {
    /// Name reported in `serverInfo`.
    #[must_use]
    pub const fn server_name(&self) -> &str {
        self.server_name.as_str()
    }

    /// Version reported in `serverInfo`, omitted when blank.
    #[must_use]
    pub fn server_version(&self) -> Option<&str> {
        let version = self.server_version.trim();
        (!version.is_empty()).then_some(version)
    }

    /// Log filter expression.
    #[must_use]
    pub const fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
