//! Tracing initialisation for binaries and test harnesses embedding Coffer.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "coffer_storage=info,coffer_core=info";

/// Install an fmt subscriber with an `EnvFilter` taken from `RUST_LOG`,
/// falling back to info level for the Coffer crates.
///
/// Returns `false` if a global subscriber is already set, so it is safe to
/// call from every test.
pub fn try_init_tracing() -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init()
        .is_ok()
}
