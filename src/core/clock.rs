/*!
 * Clock Abstraction
 * Lets time-dependent state (TTLs, rate windows, blocks) run under a
 * controllable clock in tests instead of sleeping
 */

use parking_lot::RwLock;
use std::time::{Duration, SystemTime};

/// Source of "now" for every time-based decision in the engine
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Manually advanced clock for deterministic tests
pub struct ManualClock {
    now: RwLock<SystemTime>,
}

impl ManualClock {
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Start at the current wall-clock time
    pub fn from_wall_clock() -> Self {
        Self::new(SystemTime::now())
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write();
        *now += by;
    }

    pub fn set(&self, to: SystemTime) {
        *self.now.write() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.read()
    }
}
