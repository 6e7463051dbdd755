use std::env;
use std::fmt;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub telemetry: TelemetryConfig,
    pub import: ImportLimits,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            telemetry: TelemetryConfig { log_level },
            import: ImportLimits::from_env()?,
        })
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Resource ceilings monitored by the import orchestrator.
///
/// The host environment imposes the real wall-clock and memory limits;
/// these values only decide when the import report carries a resource
/// warning.
#[derive(Debug, Clone)]
pub struct ImportLimits {
    /// Rows per storage transaction.
    pub chunk_size: usize,
    /// Wall-clock budget for a whole import job, in seconds.
    pub time_budget_secs: u64,
    /// Soft cap on total rows read from one source file.
    pub row_budget: usize,
}

impl ImportLimits {
    fn from_env() -> Result<Self, ConfigError> {
        let chunk_size = env::var("IMPORT_CHUNK_SIZE")
            .unwrap_or_else(|_| "500".to_string())
            .parse::<usize>()
            .ok()
            .filter(|size| *size > 0)
            .ok_or(ConfigError::InvalidChunkSize)?;

        let time_budget_secs = env::var("IMPORT_TIME_BUDGET_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidTimeBudget)?;

        let row_budget = env::var("IMPORT_ROW_BUDGET")
            .unwrap_or_else(|_| "50000".to_string())
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidRowBudget)?;

        Ok(Self {
            chunk_size,
            time_budget_secs,
            row_budget,
        })
    }
}

impl Default for ImportLimits {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            time_budget_secs: 300,
            row_budget: 50_000,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidChunkSize,
    InvalidTimeBudget,
    InvalidRowBudget,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidChunkSize => {
                write!(f, "IMPORT_CHUNK_SIZE must be a positive integer")
            }
            ConfigError::InvalidTimeBudget => {
                write!(f, "IMPORT_TIME_BUDGET_SECS must be a valid u64")
            }
            ConfigError::InvalidRowBudget => {
                write!(f, "IMPORT_ROW_BUDGET must be a valid usize")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("IMPORT_CHUNK_SIZE");
        env::remove_var("IMPORT_TIME_BUDGET_SECS");
        env::remove_var("IMPORT_ROW_BUDGET");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.import.chunk_size, 500);
        assert_eq!(config.import.time_budget_secs, 300);
        assert_eq!(config.import.row_budget, 50_000);
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("IMPORT_CHUNK_SIZE", "0");
        let error = AppConfig::load().expect_err("zero chunk size is invalid");
        assert!(matches!(error, ConfigError::InvalidChunkSize));
        reset_env();
    }

    #[test]
    fn rejects_non_numeric_time_budget() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("IMPORT_TIME_BUDGET_SECS", "five minutes");
        let error = AppConfig::load().expect_err("non-numeric budget is invalid");
        assert!(matches!(error, ConfigError::InvalidTimeBudget));
        reset_env();
    }
}
