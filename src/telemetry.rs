use crate::config::{AppEnvironment, TelemetryConfig};
use std::fmt;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
pub enum TelemetryError {
    InvalidDirective { directive: String, source: ParseError },
    AlreadyInitialized(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::InvalidDirective { directive, .. } => {
                write!(f, "log filter directive '{}' does not parse", directive)
            }
            TelemetryError::AlreadyInitialized(err) => {
                write!(f, "subscriber installation failed: {err}")
            }
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::InvalidDirective { source, .. } => Some(source),
            TelemetryError::AlreadyInitialized(err) => Some(&**err),
        }
    }
}

/// Install the global subscriber for an import job. `RUST_LOG` wins over the
/// configured level so an operator can raise verbosity per run without
/// touching config; ANSI colors stay off outside development because job
/// output usually lands in captured log files.
pub fn init(
    environment: AppEnvironment,
    config: &TelemetryConfig,
) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(&config.log_level).map_err(|source| {
            TelemetryError::InvalidDirective {
                directive: config.log_level.clone(),
                source,
            }
        })
    })?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(environment == AppEnvironment::Development)
        .compact()
        .try_init()
        .map_err(TelemetryError::AlreadyInitialized)
}
