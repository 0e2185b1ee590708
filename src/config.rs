//! Timing and sizing knobs for live sessions.

use std::num::NonZeroUsize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Delay between the initial snapshot being gathered and it being sent.
    pub initial_delay: Duration,
    /// Period of the vehicle-only refresh after the initial snapshot.
    pub refresh_interval: Duration,
    /// Pause between consecutive messages of one burst.
    pub pacing: Duration,
    /// Maximum number of stops per chunked `stops` message.
    pub chunk_size: NonZeroUsize,
    /// Upper bound on a single dataset fetch. `None` waits indefinitely.
    pub fetch_timeout: Option<Duration>,
}

pub const DEFAULT_CHUNK_SIZE: NonZeroUsize = NonZeroUsize::new(100).unwrap();

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1250),
            refresh_interval: Duration::from_millis(5000),
            pacing: Duration::from_millis(25),
            chunk_size: DEFAULT_CHUNK_SIZE,
            fetch_timeout: None,
        }
    }
}
