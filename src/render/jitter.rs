use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// Randomized pause applied after each page load.
///
/// Delays are drawn uniformly from `[min, max]`. A zero range disables
/// pausing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    min: Duration,
    max: Duration,
}

impl Jitter {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(min_ms), Duration::from_millis(max_ms))
    }

    pub fn disabled() -> Self {
        Self { min: Duration::ZERO, max: Duration::ZERO }
    }

    pub fn is_disabled(&self) -> bool {
        self.max.is_zero()
    }

    /// Draw one delay from the configured range
    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        let mut rng = rand::thread_rng();
        Duration::from_millis(rng.gen_range(min_ms..=max_ms))
    }

    pub async fn pause(&self) {
        if self.is_disabled() {
            return;
        }
        let delay = self.sample();
        debug!("Jitter pause: {}ms", delay.as_millis());
        tokio::time::sleep(delay).await;
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Self::from_millis(1000, 2000)
    }
}
