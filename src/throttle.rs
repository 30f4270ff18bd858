//! Fixed-rate request pacing.
//!
//! Every outbound request (token refreshes included) passes through one
//! `Throttler`. Slot starts are spaced `1s / requests_per_second` apart and the
//! tokio mutex hands slots out in FIFO order.
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

pub struct Throttler {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Throttler {
    /// A rate of 0 disables pacing.
    pub fn new(requests_per_second: u32) -> Self {
        let interval = if requests_per_second == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / requests_per_second
        };
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the next slot opens and claim it.
    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }
        let mut next = self.next_slot.lock().await;
        if let Some(at) = *next {
            if at > Instant::now() {
                sleep_until(at).await;
            }
        }
        *next = Some(Instant::now() + self.interval);
    }

    /// Run `fut` in the next free slot.
    pub async fn add<F, T>(&self, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        self.acquire().await;
        fut.await
    }
}
