use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::kardex::{ImportError, PaymentError};
use std::fmt;

/// Everything an embedding application can fail with around an import job,
/// under one exhaustive enum. Row-level problems never reach this type;
/// they stay inside the import report.
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Import(ImportError),
    Payment(PaymentError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (stage, err): (&str, &dyn fmt::Display) = match self {
            AppError::Config(err) => ("configuration", err),
            AppError::Telemetry(err) => ("telemetry", err),
            AppError::Io(err) => ("io", err),
            AppError::Import(err) => ("import", err),
            AppError::Payment(err) => ("payment", err),
        };
        write!(f, "{stage} error: {err}")
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Import(err) => Some(err),
            AppError::Payment(err) => Some(err),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ImportError> for AppError {
    fn from(value: ImportError) -> Self {
        Self::Import(value)
    }
}

impl From<PaymentError> for AppError {
    fn from(value: PaymentError) -> Self {
        Self::Payment(value)
    }
}
