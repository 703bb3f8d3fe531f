//! The one place the device is allowed to pass time.
//!
//! Instead of sleeping through a delay, the waiter keeps servicing the
//! control channel and the button in small steps and returns early as soon
//! as an abort has been raised.

use crate::clock::Clock;

/// Granularity of a single yield inside a wait.
pub const YIELD_STEP_MS: u64 = 5;

/// Work that must keep running while the typist is waiting.
pub trait Service {
    /// Handle at most one inbound frame and sample the trigger once.
    fn service(&mut self);

    fn abort_requested(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct CooperativeWaiter<C: Clock> {
    clock: C,
    step_ms: u64,
}

impl<C: Clock> CooperativeWaiter<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            step_ms: YIELD_STEP_MS,
        }
    }

    pub fn with_step_ms(mut self, step_ms: u64) -> Self {
        self.step_ms = step_ms.max(1);
        self
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Wait `ms` milliseconds or until `svc` reports an abort.
    ///
    /// The caller checks the abort flag afterwards; nothing is returned.
    pub fn wait(&self, ms: u64, svc: &mut impl Service) {
        let start = self.clock.now_ms();
        loop {
            let elapsed = self.clock.now_ms().saturating_sub(start);
            if elapsed >= ms {
                return;
            }

            svc.service();
            if svc.abort_requested() {
                return;
            }

            self.clock.sleep_ms(self.step_ms.min(ms - elapsed));
        }
    }
}
