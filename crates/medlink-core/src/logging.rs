//! Tracing subscriber setup.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "medlink_core=info,medlink_llm=info";

/// Install the global subscriber. Safe to call more than once.
pub fn init() {
    init_with_filter(DEFAULT_FILTER);
}

pub fn init_with_filter(default_filter: &str) {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_filter))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

        // Another subscriber may already be installed by the host application.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}
