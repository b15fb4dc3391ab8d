//! Playback lifecycle for soundspot clients.
//!
//! An [AudioSession] owns at most one handle from an [AudioBackend] at a time. Callers drive it
//! with play, pause, seek and stop, and it releases the handle whenever the source changes, the
//! session is unloaded, or the session is dropped.

mod config;
mod events;
mod playback;
mod util;

pub use config::*;
pub use events::*;
pub use playback::*;
pub use util::*;
