//! Per-endpoint throttle.
//!
//! Remembers the last accepted call per endpoint key and rejects any call that
//! arrives before the window has elapsed. Rejected calls do not move the
//! window. Never blocks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::RateLimited;

/// Default minimum spacing between accepted calls to one endpoint.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(2_000);

/// Time source for the limiter.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests and simulations.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct RateLimiter {
    window: Duration,
    clock: Arc<dyn Clock>,
    last_accepted: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, Arc::new(SystemClock))
    }

    pub fn with_clock(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            window,
            clock,
            last_accepted: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// `true` if the call is accepted (and recorded).
    pub fn allow(&self, endpoint: &str) -> bool {
        self.check(endpoint).is_ok()
    }

    /// Accept the call or report how long until the window reopens.
    pub fn check(&self, endpoint: &str) -> Result<(), RateLimited> {
        let now = self.clock.now();
        let mut last = self
            .last_accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = last.get(endpoint) {
            let elapsed = now.saturating_duration_since(*previous);
            if elapsed < self.window {
                let retry_after = self.window - elapsed;
                debug!(endpoint, retry_ms = retry_after.as_millis() as u64, "rate limited");
                return Err(RateLimited {
                    endpoint: endpoint.to_string(),
                    retry_after,
                });
            }
        }

        last.insert(endpoint.to_string(), now);
        Ok(())
    }
}
