//! Logging setup
//!
//! `RUST_LOG` wins over the configured level. Initialising twice is a no-op.

use crate::config::LoggingConfig;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber
///
/// Falls back to `info` if neither `RUST_LOG` nor the configured level
/// parses.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    // try_init: a subscriber may already be installed (tests, embedding)
    let _ = if config.json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
}

/// Span wrapping one ingestion pass
#[must_use]
pub fn run_span(service: &str, pass: usize) -> Span {
    tracing::info_span!("ingestion", service, pass)
}
