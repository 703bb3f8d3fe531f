use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Millisecond time source used by the waiter and the button debouncer.
pub trait Clock: Clone {
    fn now_ms(&self) -> u64;
    fn sleep_ms(&self, ms: u64);
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis().try_into().unwrap_or(u64::MAX)
    }

    fn sleep_ms(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

/// A clock that only moves when someone sleeps on it.
///
/// Clones share the same time, so a test can hand one copy to the device and
/// keep another to read the current time or advance it by hand.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get().saturating_add(ms));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn sleep_ms(&self, ms: u64) {
        self.advance(ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();

        other.sleep_ms(250);
        clock.advance(50);

        assert_eq!(clock.now_ms(), 300);
        assert_eq!(other.now_ms(), 300);
    }
}
