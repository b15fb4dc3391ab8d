use std::time::Duration;

/// The configuration of an audio session
#[derive(Debug, Clone)]
pub struct Config {
    /// How far skip forward and skip backward jump
    pub skip_interval_in_seconds: f32,
    /// How often a backend should report the status of a playing handle
    pub status_interval_in_seconds: f32,
    /// How many playback events can wait in the channel before new ones are dropped
    pub event_capacity: usize,
}

impl Config {
    /// The status interval as a [Duration]
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs_f32(self.status_interval_in_seconds.max(0.01))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            skip_interval_in_seconds: 10.,
            // Fast enough for a progress bar
            status_interval_in_seconds: 0.5,
            event_capacity: 256,
        }
    }
}
