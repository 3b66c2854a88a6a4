use expenseflow_core::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` wins over the configured
/// level so operators can raise verbosity without touching config files.
/// Safe to call once per process; later calls are ignored.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);
    let result = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if result.is_err() {
        tracing::debug!(
            event_name = "system.telemetry.already_initialized",
            "global subscriber already set; keeping the existing one"
        );
    }
}

#[cfg(test)]
mod tests {
    use expenseflow_core::config::{LogFormat, LoggingConfig};

    use super::init_tracing;

    #[test]
    fn repeated_initialization_is_harmless() {
        let config = LoggingConfig { level: "info".to_owned(), format: LogFormat::Compact };
        init_tracing(&config);
        init_tracing(&config);
    }
}
