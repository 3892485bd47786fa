//! Observability infrastructure.
//!
//! Structured logging with consistent spans across components. Front-ends
//! call [`init_logging`] once at startup; the catalog wraps each operation
//! in a [`catalog_span`].

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops. `RUST_LOG` controls log levels
/// (e.g. `info`, `verso_catalog=debug`).
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for catalog operations with standard fields.
#[must_use]
pub fn catalog_span(operation: &str, repository: &str, reference: &str) -> Span {
    tracing::info_span!(
        "catalog",
        op = operation,
        repository = repository,
        reference = reference,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Pretty);
    }

    #[test]
    fn test_span_helper_creates_span() {
        let span = catalog_span("get_entry", "repo1", "master");
        let _guard = span.enter();
        tracing::info!("test message in span");
    }
}
