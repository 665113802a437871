//! Structured logging setup (component C9).

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber. `log_format` selects a
/// human-readable (`"pretty"`) or newline-delimited JSON (`"json"`)
/// writer; anything else falls back to pretty. Filtering is controlled by
/// `RUST_LOG`, defaulting to `info` with `tower_http`/`axum` bumped to
/// `debug` so the `TraceLayer` request spans are visible out of the box.
pub fn init(log_format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,axum=debug"));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    if log_format.eq_ignore_ascii_case("json") {
        subscriber.json().init();
    } else {
        subscriber.pretty().init();
    }
}
