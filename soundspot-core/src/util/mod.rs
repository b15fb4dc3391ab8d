mod id;

pub use id::*;

use std::future::Future;

use log::warn;
use tokio::runtime::{Builder, Handle};

/// Clamps a position in seconds to the playable range of a source.
/// Without a known duration, only the lower bound applies.
pub fn clamp_position(position: f32, duration: Option<f32>) -> f32 {
    let position = if position.is_nan() { 0. } else { position };

    match duration {
        Some(duration) if duration.is_finite() => position.clamp(0., duration.max(0.)),
        _ => position.max(0.),
    }
}

/// Runs a future to completion in the background.
/// Spawns on the current tokio runtime, or blocks on a throwaway one if there is none,
/// so release work is never skipped.
pub fn run_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(handle) = Handle::try_current() {
        handle.spawn(future);
        return;
    }

    match Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime.block_on(future),
        Err(e) => warn!("Could not build a runtime for detached work: {}", e),
    }
}
