#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use keytypist::channel::ControlLink;
use keytypist::clock::{Clock, ManualClock};
use keytypist::device::{Device, DeviceParts, IDLE_POLL_MS};
use keytypist::gpio::BusyIndicator;
use keytypist::model::{Event, Settings, StatusState, TypingConfig};
use keytypist::sim::SimKeyboard;
use keytypist::store::{ConfigStore, MemoryStore};
use keytypist::trigger::InputPin;

/// Inbound frames released at fixed clock times; outbound frames recorded.
#[derive(Clone)]
pub struct ScriptedLink {
    clock: ManualClock,
    inbound: Rc<RefCell<VecDeque<(u64, String)>>>,
    outbound: Rc<RefCell<Vec<String>>>,
}

impl ScriptedLink {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            inbound: Rc::default(),
            outbound: Rc::default(),
        }
    }

    /// Make `line` readable once the clock reaches `at_ms`.
    pub fn push_at(&self, at_ms: u64, line: &str) {
        self.inbound.borrow_mut().push_back((at_ms, line.to_string()));
    }

    pub fn pending(&self) -> usize {
        self.inbound.borrow().len()
    }

    pub fn lines(&self) -> Vec<String> {
        self.outbound.borrow().clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.outbound
            .borrow()
            .iter()
            .map(|line| serde_json::from_str(line).expect("outbound frame must parse"))
            .collect()
    }

    pub fn states(&self) -> Vec<StatusState> {
        self.events().iter().filter_map(Event::state).collect()
    }
}

impl ControlLink for ScriptedLink {
    fn try_read_line(&mut self) -> Option<String> {
        let mut inbound = self.inbound.borrow_mut();
        match inbound.front() {
            Some((at, _)) if *at <= self.clock.now_ms() => inbound.pop_front().map(|(_, l)| l),
            _ => None,
        }
    }

    fn send_line(&mut self, line: &str) {
        self.outbound.borrow_mut().push(line.to_string());
    }
}

/// Button held down during each `[start, end)` interval of clock time.
pub struct ScriptedPin {
    clock: ManualClock,
    presses: Vec<(u64, u64)>,
}

impl InputPin for ScriptedPin {
    fn is_active(&mut self) -> bool {
        let now = self.clock.now_ms();
        self.presses.iter().any(|&(start, end)| (start..end).contains(&now))
    }
}

#[derive(Clone, Default)]
pub struct BusyLog(Rc<RefCell<Vec<bool>>>);

impl BusyLog {
    pub fn history(&self) -> Vec<bool> {
        self.0.borrow().clone()
    }
}

impl BusyIndicator for BusyLog {
    fn set_busy(&mut self, busy: bool) {
        self.0.borrow_mut().push(busy);
    }
}

pub fn config(base: i32, variance: i32, error_rate: i32, long_pause: i32, start_delay: i32) -> TypingConfig {
    TypingConfig {
        base_delay: base,
        delay_variance: variance,
        error_rate,
        long_pause_chance: long_pause,
        start_delay,
    }
}

pub fn settings(config: TypingConfig, payload: &str) -> Settings {
    Settings {
        config,
        payload: payload.to_string(),
    }
}

/// A device on a virtual clock with every collaborator observable.
pub struct Harness {
    pub clock: ManualClock,
    pub link: ScriptedLink,
    pub keyboard: SimKeyboard<ManualClock>,
    pub store: MemoryStore,
    pub busy: BusyLog,
    pub device: Device<ManualClock, StdRng>,
}

impl Harness {
    pub fn new(initial: &Settings) -> Self {
        Self::build(initial, Vec::new(), 7)
    }

    pub fn with_button(initial: &Settings, presses: Vec<(u64, u64)>) -> Self {
        Self::build(initial, presses, 7)
    }

    pub fn with_seed(initial: &Settings, seed: u64) -> Self {
        Self::build(initial, Vec::new(), seed)
    }

    fn build(initial: &Settings, presses: Vec<(u64, u64)>, seed: u64) -> Self {
        let clock = ManualClock::new();
        let link = ScriptedLink::new(clock.clone());
        let keyboard = SimKeyboard::new(clock.clone());
        let busy = BusyLog::default();

        let mut store = MemoryStore::new();
        initial.save_config(&mut store).unwrap();
        initial.save_payload(&mut store).unwrap();

        let parts = DeviceParts {
            store: Box::new(store.clone()),
            link: Box::new(link.clone()),
            button: Box::new(ScriptedPin {
                clock: clock.clone(),
                presses,
            }),
            keyboard: Box::new(keyboard.clone()),
            indicator: Box::new(busy.clone()),
        };
        let device = Device::new(parts, clock.clone(), StdRng::seed_from_u64(seed));

        Self {
            clock,
            link,
            keyboard,
            store,
            busy,
            device,
        }
    }

    /// Drive the idle loop like `Device::run` until `until_ms`.
    pub fn run_until(&mut self, until_ms: u64) {
        while self.clock.now_ms() < until_ms {
            if self.device.tick().is_none() {
                self.clock.sleep_ms(IDLE_POLL_MS);
            }
        }
    }

    pub fn stored_i32(&self, key: &str) -> Option<i32> {
        self.store.get_i32(key)
    }

    pub fn stored_str(&self, key: &str) -> Option<String> {
        self.store.get_str(key)
    }
}
