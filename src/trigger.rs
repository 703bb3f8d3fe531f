//! Debounced edge detection for the single start/abort button.

use crate::clock::Clock;

/// Time a raw level must hold before it is accepted as the new stable level.
pub const SETTLE_MS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Pressed,
    Released,
}

/// A digital input already normalized for polarity: `true` means "pressed".
pub trait InputPin {
    fn is_active(&mut self) -> bool;
}

/// Pure debounce state machine; feed it raw samples and timestamps.
#[derive(Debug, Clone)]
pub struct Debouncer {
    settle_ms: u64,
    stable: bool,
    last_raw: bool,
    last_change_ms: u64,
}

impl Debouncer {
    pub fn new(settle_ms: u64) -> Self {
        Self {
            settle_ms,
            stable: false,
            last_raw: false,
            last_change_ms: 0,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.stable
    }

    pub fn update(&mut self, raw: bool, now_ms: u64) -> Option<Edge> {
        if raw != self.last_raw {
            self.last_raw = raw;
            self.last_change_ms = now_ms;
        }

        if raw == self.stable || now_ms.saturating_sub(self.last_change_ms) < self.settle_ms {
            return None;
        }

        self.stable = raw;
        Some(if raw { Edge::Pressed } else { Edge::Released })
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(SETTLE_MS)
    }
}

pub struct InputTrigger<C: Clock> {
    pin: Box<dyn InputPin>,
    debouncer: Debouncer,
    clock: C,
}

impl<C: Clock> InputTrigger<C> {
    pub fn new(pin: Box<dyn InputPin>, clock: C) -> Self {
        Self {
            pin,
            debouncer: Debouncer::default(),
            clock,
        }
    }

    /// Sample the pin once; true exactly once per physical press.
    pub fn poll_pressed(&mut self) -> bool {
        let raw = self.pin.is_active();
        match self.debouncer.update(raw, self.clock.now_ms()) {
            Some(Edge::Pressed) => {
                log::debug!("button pressed");
                true
            }
            Some(Edge::Released) => {
                log::debug!("button released");
                false
            }
            None => false,
        }
    }
}
