//! Diagnostic logging setup.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding an `EnvFilter` directive
pub const LOG_ENV: &str = "AGENTIC_EVAL_LOG";

static INIT: Once = Once::new();

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "agentic_eval=debug"
    } else {
        "agentic_eval=info"
    }
}

/// Install the stderr subscriber. `AGENTIC_EVAL_LOG` wins over `verbose`
/// when set and valid. Later calls are no-ops, and an already installed
/// global subscriber is left alone.
pub fn init(verbose: bool) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

        let _ = tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .with(filter)
            .try_init();
    });
}
