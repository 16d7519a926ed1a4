//! Tracing setup. Mirrors the teacher's `init_tracing()` convenience
//! (r2e-core): env-filterable, defaults to `info` when `RUST_LOG` is unset.

use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
