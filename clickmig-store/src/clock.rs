use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use dyn_clone::DynClone;
use std::time::Duration;

/// Source of time for everything that reasons about expiry.
///
/// The drain loop and the in-memory engine never read the system clock
/// directly, so tests can move time forward without sleeping.
#[async_trait]
pub trait Clock: DynClone + Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

dyn_clone::clone_trait_object!(Clock);

/// Converts an instant to the fractional epoch seconds used as sorted set scores.
pub fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

pub(crate) fn delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// Adds `duration` to `at`, saturating instead of overflowing.
pub fn expires_at(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    at.checked_add_signed(delta(duration))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(feature = "memory")]
mod manual {
    use super::*;
    use parking_lot::RwLock;
    use std::sync::Arc;

    /// Simulated clock: `sleep` returns immediately after moving time forward.
    #[derive(Debug, Clone)]
    pub struct ManualClock(Arc<RwLock<DateTime<Utc>>>);

    impl ManualClock {
        pub fn new(start: DateTime<Utc>) -> Self {
            Self(Arc::new(RwLock::new(start)))
        }

        pub fn advance(&self, duration: Duration) {
            let mut now = self.0.write();
            *now = expires_at(*now, duration);
        }

        pub fn set(&self, at: DateTime<Utc>) {
            *self.0.write() = at;
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::new(Utc::now())
        }
    }

    #[async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.read()
        }

        async fn sleep(&self, duration: Duration) {
            self.advance(duration);
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(feature = "memory")]
pub use manual::ManualClock;
