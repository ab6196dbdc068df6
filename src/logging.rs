//! Tracing setup for binaries and test harnesses embedding the pipeline
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the host. `init_tracing` is the stock one.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset: info for this crate, warn for others
pub const DEFAULT_FILTER: &str = "social_burden=info,warn";

/// Install a formatted subscriber filtered by `RUST_LOG`
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
