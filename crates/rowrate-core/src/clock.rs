//! Time sources for the engine
//!
//! The estimator stamps every sample on arrival and ages GPS fixes against
//! the same clock, so both must share one timebase.

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

/// Millisecond time source.
pub trait Clock {
    /// Current time in milliseconds. Must never go backwards.
    fn now_ms(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Milliseconds since boot from the embassy time driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u64 {
        embassy_time::Instant::now().as_millis()
    }
}

/// Clock that only moves when told to. Used for log replay and tests.
pub struct ManualClock {
    now: Mutex<CriticalSectionRawMutex, Cell<u64>>,
}

impl ManualClock {
    pub const fn new(start_ms: u64) -> Self {
        Self {
            now: Mutex::new(Cell::new(start_ms)),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.lock(|now| now.set(now_ms.max(now.get())));
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now.lock(|now| now.set(now.get().saturating_add(delta_ms)));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.lock(|now| now.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_never_goes_backwards() {
        let clock = ManualClock::new(1_000);
        clock.advance(250);
        assert_eq!(clock.now_ms(), 1_250);

        clock.set(900);
        assert_eq!(clock.now_ms(), 1_250);

        clock.set(2_000);
        assert_eq!((&clock).now_ms(), 2_000);
    }
}
