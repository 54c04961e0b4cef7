//! Logging setup
//!
//! Installs a `tracing-subscriber` fmt subscriber filtered by `RUST_LOG`,
//! falling back to the given level. Every crate logs under a `plexus::*`
//! target, so `RUST_LOG=plexus::assembler=debug` follows one negotiation.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber
///
/// Returns false if a subscriber was already installed (by an earlier call
/// or by the host application); the existing one is kept.
pub fn init_logging(default_level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}
