//! Logging integration for ormkit.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`Settings`](crate::settings::Settings) and for creating per-query spans.

use crate::settings::Settings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The filter is read from `settings.log_level` and falls back to `info` when
/// the directive does not parse. In debug mode a pretty, human-readable format
/// is used; otherwise a structured JSON format is used. Installing a second
/// subscriber is a no-op.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for one terminal query operation.
///
/// # Examples
///
/// ```
/// use ormkit_core::logging::query_span;
///
/// let span = query_span("Item", "count");
/// let _guard = span.enter();
/// tracing::debug!("counting rows");
/// ```
pub fn query_span(entity: &str, operation: &'static str) -> tracing::Span {
    tracing::debug_span!("query", entity = entity, operation = operation)
}
