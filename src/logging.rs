//! Tracing subscriber setup for the `lifecycle` binary.
//!
//! `RUST_LOG` always wins. Otherwise the level is `warn`, or `debug` with
//! `--verbose`. Setting `LIFECYCLE_LOG_FORMAT=json` switches to JSON lines.
//! Output goes to stderr so stdout stays clean for `--json` outcomes.

use tracing_subscriber::EnvFilter;

/// Environment variable selecting the log format (`json` or anything else).
pub const LOG_FORMAT_ENV: &str = "LIFECYCLE_LOG_FORMAT";

/// Default filter directive for the given verbosity.
pub fn default_level(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "warn" }
}

/// Whether the JSON formatter was requested.
pub fn json_requested(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("json"))
}

/// Initialize the global tracing subscriber. Subsequent calls are no-ops.
pub fn init_subscriber(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbose)));

    let json = json_requested(std::env::var(LOG_FORMAT_ENV).ok().as_deref());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    // try_init fails only if a subscriber is already installed
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
}
