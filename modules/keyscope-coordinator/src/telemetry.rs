//! Tracing setup for host binaries and tests.

use tracing_subscriber::EnvFilter;

/// Initialize logging with the standard filter. Safe to call more than
/// once — later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(
                "keyscope=info"
                    .parse()
                    .expect("static directive always parses"),
            ),
        )
        .try_init();
}

/// JSON-formatted variant for structured log shipping.
pub fn init_tracing_json() {
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(
                "keyscope=info"
                    .parse()
                    .expect("static directive always parses"),
            ),
        )
        .try_init();
}
