use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub mod formatter;

pub use formatter::*;

use crate::configs::LoggingConfig;

/// Builds the filter directive from the `[logging]` section.
///
/// Chatty websocket internals are capped at `warn` unless the caller names
/// them explicitly in `filters`.
pub fn filter_directive(config: Option<&LoggingConfig>) -> String {
    let log_level = config
        .and_then(|l| l.level.as_deref())
        .unwrap_or("info");

    let filters = config.and_then(|l| l.filters.as_deref()).unwrap_or("");

    if filters.is_empty() {
        format!("{},tungstenite=warn,tokio_tungstenite=warn", log_level)
    } else {
        format!(
            "{},tungstenite=warn,tokio_tungstenite=warn,{}",
            log_level, filters
        )
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over the config file.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(config: Option<&LoggingConfig>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

    let stdout_layer = fmt::layer()
        .event_format(CustomFormatter::new(true))
        .with_ansi(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directive_is_info() {
        assert_eq!(
            filter_directive(None),
            "info,tungstenite=warn,tokio_tungstenite=warn"
        );
    }

    #[test]
    fn configured_filters_are_appended() {
        let cfg = LoggingConfig {
            level: Some("debug".into()),
            filters: Some("lavabridge::router=trace".into()),
        };
        assert_eq!(
            filter_directive(Some(&cfg)),
            "debug,tungstenite=warn,tokio_tungstenite=warn,lavabridge::router=trace"
        );
    }
}
