use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber.
///
/// `format` comes from the `log.format` configuration key; `RUST_LOG_FORMAT`
/// in the environment overrides it. Anything other than `plain` renders JSON.
pub fn init_tracing(level: &str, format: &str) {
    let format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| format.to_owned());
    let use_json = format != "plain";

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_owned()));

    if use_json {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true),
            )
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}
