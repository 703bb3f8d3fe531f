//! Top-level control loop.
//!
//! Idle: service the control channel and the button once per cycle, then
//! sleep briefly. When a start is requested the typist takes over the loop
//! until the session ends; during that time the waiter keeps servicing.

use rand::Rng;

use crate::channel::{ControlChannel, ControlLink};
use crate::clock::Clock;
use crate::controller::Controller;
use crate::gpio::BusyIndicator;
use crate::keyboard::KeyEmitter;
use crate::model::AbortSignal;
use crate::store::ConfigStore;
use crate::trigger::{InputPin, InputTrigger};
use crate::typist::{HumanTypist, SessionOutcome};
use crate::waiter::{CooperativeWaiter, Service};

pub const IDLE_POLL_MS: u64 = 10;

/// The collaborators a device is wired from.
pub struct DeviceParts {
    pub store: Box<dyn ConfigStore>,
    pub link: Box<dyn ControlLink>,
    pub button: Box<dyn InputPin>,
    pub keyboard: Box<dyn KeyEmitter>,
    pub indicator: Box<dyn BusyIndicator>,
}

pub struct Device<C: Clock, R: Rng> {
    controller: Controller<C>,
    typist: HumanTypist<C, R>,
    clock: C,
    shutdown: AbortSignal,
}

impl<C: Clock, R: Rng> Device<C, R> {
    pub fn new(parts: DeviceParts, clock: C, rng: R) -> Self {
        let trigger = InputTrigger::new(parts.button, clock.clone());
        let controller = Controller::new(parts.store, ControlChannel::new(parts.link), trigger);
        let typist = HumanTypist::new(
            parts.keyboard,
            parts.indicator,
            CooperativeWaiter::new(clock.clone()),
            rng,
        );

        Self {
            controller,
            typist,
            clock,
            shutdown: AbortSignal::new(),
        }
    }

    pub fn controller(&self) -> &Controller<C> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut Controller<C> {
        &mut self.controller
    }

    /// Raising this flag makes `run` return after the current cycle.
    pub fn shutdown_signal(&self) -> AbortSignal {
        self.shutdown.clone()
    }

    /// One idle cycle. Returns the outcome if a session ran.
    pub fn tick(&mut self) -> Option<SessionOutcome> {
        self.controller.service();
        if !self.controller.take_start_request() {
            return None;
        }
        Some(self.typist.run(&mut self.controller))
    }

    pub fn run(&mut self) {
        log::info!("device ready");
        while !self.shutdown.is_raised() {
            if self.tick().is_none() {
                self.clock.sleep_ms(IDLE_POLL_MS);
            }
        }
        log::info!("device shutting down");
    }

    /// Start a session immediately and return when it ends.
    pub fn run_once(&mut self) -> SessionOutcome {
        self.controller.request_start();
        self.controller.take_start_request();
        self.typist.run(&mut self.controller)
    }
}
