//! Logging setup
//!
//! One global subscriber: an `EnvFilter` (honours `RUST_LOG`) and a fmt layer
//! writing to stderr so stdout stays free for the final answer.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

pub const DEFAULT_FILTER: &str = "meta_agency=info";
pub const VERBOSE_FILTER: &str = "meta_agency=debug";

/// Install the global subscriber. Calling it twice is harmless.
pub fn init_logging(verbose: bool) {
    let fallback = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}
