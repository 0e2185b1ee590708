//! Process-wide count of open live connections.
//!
//! Sessions only hold a [`ConnectionGuard`]; the observer that reports the
//! count is optional and never touches session state.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active: Arc<AtomicUsize>,
}

/// Decrements the count when the connection it stands for goes away.
#[derive(Debug)]
pub struct ConnectionGuard {
    active: Arc<AtomicUsize>,
}

impl ConnectionTracker {
    pub fn connect(&self) -> ConnectionGuard {
        self.active.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            active: self.active.clone(),
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Logs the connection count every `period` whenever it has changed.
    pub fn spawn_observer(&self, period: Duration) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut last = 0;
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let active = tracker.active();
                if active != last {
                    info!(active, previous = last, "Live connections changed");
                    last = active;
                }
            }
        })
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_tracks_lifetime() {
        let tracker = ConnectionTracker::default();
        let a = tracker.connect();
        let b = tracker.connect();
        assert_eq!(tracker.active(), 2);

        drop(a);
        assert_eq!(tracker.active(), 1);
        drop(b);
        assert_eq!(tracker.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_runs_independently() {
        let tracker = ConnectionTracker::default();
        let observer = tracker.spawn_observer(Duration::from_secs(2));

        let guard = tracker.connect();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(guard);
        assert_eq!(tracker.active(), 0);

        observer.abort();
        assert!(observer.await.unwrap_err().is_cancelled());
    }
}
