//! Diagnostic output setup.
//!
//! The client only emits `tracing` events; installing a subscriber is left to
//! the application. These helpers install the plain fmt subscriber used by the
//! demos, filtered through `RUST_LOG` and defaulting to `info`.

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber honouring `RUST_LOG`.
///
/// Fails if a global subscriber is already set.
pub fn try_init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init()
}

/// Like [`try_init`], but keeps any subscriber that is already installed.
pub fn init() {
    let _ = try_init();
}
