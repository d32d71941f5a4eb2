//! Boulder Skeleton - pose overlay and movement metrics for climbing footage.
//!
//! This is the main library crate. It provides the frame pipeline (pose
//! detection, skeleton overlay, metrics), dual stream recording and
//! session export.

pub mod config;
pub mod detection;
pub mod export;
pub mod metrics;
pub mod pose;
pub mod recorder;
pub mod render;
pub mod session;
pub mod utils;
pub mod video;

pub use config::SessionConfig;
pub use session::Session;
pub use utils::{AppError, AppResult, ErrorResponse};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter. Calling this more than once is
/// harmless; only the first call installs a subscriber.
pub fn init_tracing() {
    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boulder_skeleton=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if result.is_ok() {
        tracing::info!("Boulder Skeleton v{}", env!("CARGO_PKG_VERSION"));
    }
}
