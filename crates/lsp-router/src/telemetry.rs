//! Structured logging for processes that host the router.
//!
//! Router events are emitted under the `lsp_router::router` and
//! `lsp_router::embedded` targets. [`initialise`] installs one global
//! subscriber per process. The settings of the first successful call stick,
//! and every later call reports them instead of reconfiguring logging.

use std::io::{self, IsTerminal};

use lsp_router_config::{LogFormat, RouterConfig};
use once_cell::sync::OnceCell;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::{self, time::UtcTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

static INSTALLED: OnceCell<TelemetryHandle> = OnceCell::new();

/// Settings of the subscriber installed by [`initialise`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryHandle {
    filter: String,
    format: LogFormat,
}

impl TelemetryHandle {
    /// Filter expression the subscriber was built with.
    #[must_use]
    pub const fn filter(&self) -> &str {
        self.filter.as_str()
    }

    /// Output format of the subscriber.
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter expression does not parse.
    #[error("invalid log filter '{filter}': {source}")]
    Filter {
        /// Expression taken from the configuration.
        filter: String,
        /// Parser failure.
        #[source]
        source: ParseError,
    },
    /// Another global subscriber was installed outside [`initialise`].
    #[error("failed to install telemetry subscriber: {0}")]
    Install(#[source] TryInitError),
}

/// Installs the global subscriber on the first successful call.
///
/// Events go to stderr so that a stdio connection carries protocol traffic
/// only. Later calls return the handle of the installed subscriber whatever
/// configuration they pass.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an unparsable filter expression and
/// [`TelemetryError::Install`] when a foreign subscriber is already set.
pub fn initialise(config: &RouterConfig) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED.get_or_try_init(|| install(config)).cloned()
}

fn install(config: &RouterConfig) -> Result<TelemetryHandle, TelemetryError> {
    let handle = TelemetryHandle {
        filter: config.log_filter().to_owned(),
        format: config.log_format(),
    };
    let env_filter =
        EnvFilter::try_new(handle.filter()).map_err(|source| TelemetryError::Filter {
            filter: handle.filter.clone(),
            source,
        })?;

    let structured = handle.format().is_structured();
    let json = structured.then(|| {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_timer(UtcTime::rfc_3339())
            .with_writer(io::stderr)
    });
    let compact = (!structured).then(|| {
        fmt::layer()
            .compact()
            .with_timer(UtcTime::rfc_3339())
            .with_ansi(io::stderr().is_terminal())
            .with_writer(io::stderr)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json)
        .with(compact)
        .try_init()
        .map_err(TelemetryError::Install)?;
    Ok(handle)
}
