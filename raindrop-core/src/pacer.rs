use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Spaces outbound requests at least `min_interval` apart, process-wide.
/// The timestamp lock is held across the wait so two callers racing for the
/// same slot serialize instead of both observing a stale "last sent at".
#[derive(Debug)]
pub(crate) struct RequestPacer {
    min_interval: Duration,
    last_sent: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub(crate) fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_sent: Mutex::new(None),
        }
    }

    pub(crate) async fn pace(&self) {
        let mut last_sent = self.last_sent.lock().await;
        if let Some(previous) = *last_sent {
            let next_allowed = previous + self.min_interval;
            if next_allowed > Instant::now() {
                tokio::time::sleep_until(next_allowed).await;
            }
        }
        *last_sent = Some(Instant::now());
    }
}
