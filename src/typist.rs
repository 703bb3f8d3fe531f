//! The human-like typing state machine.
//!
//! `Idle -> Countdown -> Emitting -> {Finished | Aborted} -> Idle`
//!
//! A session types the payload one character at a time with jittered
//! inter-key delays, occasional "typo then backspace" pairs, a small extra
//! pause after word boundaries and a rare long "thinking" pause. Every
//! delay goes through the [`CooperativeWaiter`], so the control channel and
//! the button stay live and an abort cuts the current wait short.

use anyhow::Result;
use rand::Rng;

use crate::clock::Clock;
use crate::controller::Controller;
use crate::gpio::BusyIndicator;
use crate::keyboard::{self, KeyEmitter};
use crate::model::{Event, StatusState, TypingConfig};
use crate::waiter::{CooperativeWaiter, Service};

/// Floor for the jittered inter-key delay.
pub const MIN_KEY_DELAY_MS: i64 = 10;
/// How often (in characters) a progress frame is sent while typing.
pub const PROGRESS_EVERY: usize = 5;

const COUNTDOWN_TICK_MS: u64 = 1000;
const TYPO_NOTICE_MS: std::ops::Range<u64> = 100..300;
const TYPO_RECOVER_MS: std::ops::Range<u64> = 50..150;
const WORD_GAP_MS: std::ops::Range<i64> = 50..150;
const THINKING_PAUSE_MS: std::ops::Range<i64> = 500..2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Finished,
    Aborted,
    /// The keyboard backend failed mid-run.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDelay {
    pub ms: u64,
    pub thinking: bool,
}

pub fn is_word_boundary(c: char) -> bool {
    c == ' ' || c == '\n'
}

/// Delay after typing `c`, following the current configuration.
pub fn inter_key_delay(cfg: &TypingConfig, c: char, rng: &mut impl Rng) -> KeyDelay {
    let variance = i64::from(cfg.delay_variance);
    let jitter = if variance > 0 {
        rng.gen_range(-variance..variance)
    } else {
        0
    };
    let mut ms = (i64::from(cfg.base_delay) + jitter).max(MIN_KEY_DELAY_MS);
    let mut thinking = false;

    if is_word_boundary(c) {
        ms += rng.gen_range(WORD_GAP_MS);
        if cfg.long_pause_chance > 0 && rng.gen_range(0..cfg.long_pause_chance) == 0 {
            ms += rng.gen_range(THINKING_PAUSE_MS);
            thinking = true;
        }
    }

    KeyDelay {
        ms: ms.max(0) as u64,
        thinking,
    }
}

/// Whether to inject a typo before `c`. Always draws when the rate is enabled.
pub fn should_inject_typo(cfg: &TypingConfig, c: char, rng: &mut impl Rng) -> bool {
    if cfg.error_rate <= 0 {
        return false;
    }
    rng.gen_range(0..cfg.error_rate) == 0 && !is_word_boundary(c)
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (done.min(total) * 100 / total) as u8
}

pub struct HumanTypist<C: Clock, R: Rng> {
    keyboard: Box<dyn KeyEmitter>,
    indicator: Box<dyn BusyIndicator>,
    waiter: CooperativeWaiter<C>,
    rng: R,
}

impl<C: Clock, R: Rng> HumanTypist<C, R> {
    pub fn new(
        keyboard: Box<dyn KeyEmitter>,
        indicator: Box<dyn BusyIndicator>,
        waiter: CooperativeWaiter<C>,
        rng: R,
    ) -> Self {
        Self {
            keyboard,
            indicator,
            waiter,
            rng,
        }
    }

    /// Run one full session and return to idle.
    pub fn run(&mut self, ctl: &mut Controller<C>) -> SessionOutcome {
        if ctl.session().running {
            log::warn!("session already running; not starting another");
            return SessionOutcome::Aborted;
        }

        let start_delay = ctl.config().start_delay;
        ctl.session_mut().begin(start_delay);
        self.indicator.set_busy(true);
        log::info!("session started, countdown {start_delay}s");
        ctl.emit(Event::progress(
            StatusState::Countdown,
            format!("Starting in {}s", start_delay.max(0)),
            0,
        ));

        let outcome = if self.countdown(ctl) {
            match self.type_payload(ctl) {
                Ok(outcome) => outcome,
                Err(err) => {
                    log::error!("keyboard failed: {err:#}");
                    ctl.emit(Event::status(
                        StatusState::Aborted,
                        format!("Keyboard error: {err}"),
                    ));
                    SessionOutcome::Failed
                }
            }
        } else {
            log::info!("session aborted during countdown");
            SessionOutcome::Aborted
        };

        self.keyboard.release_all();
        self.indicator.set_busy(false);
        ctl.session_mut().reset();
        log::info!("session ended: {outcome:?}");
        outcome
    }

    /// Returns false if the countdown was aborted.
    fn countdown(&mut self, ctl: &mut Controller<C>) -> bool {
        let total = ctl.session().countdown_remaining;
        for tick in 1..=total {
            self.waiter.wait(COUNTDOWN_TICK_MS, ctl);
            if ctl.abort_requested() {
                return false;
            }

            let remaining = total - tick;
            ctl.session_mut().countdown_remaining = remaining;
            ctl.emit(Event::progress(
                StatusState::Countdown,
                format!("Starting in {remaining}s"),
                percent(tick as usize, total as usize),
            ));
        }
        true
    }

    fn type_payload(&mut self, ctl: &mut Controller<C>) -> Result<SessionOutcome> {
        let text: Vec<char> = ctl.settings().payload.chars().collect();
        let total = text.len();

        ctl.emit(Event::progress(StatusState::Typing, "Typing...", 0));

        for (i, &c) in text.iter().enumerate() {
            ctl.session_mut().index = i;
            if ctl.abort_requested() {
                return Ok(self.aborted(ctl, i, total));
            }

            if i % PROGRESS_EVERY == 0 {
                ctl.emit(Event::progress(
                    StatusState::Typing,
                    format!("Typing {i}/{total}"),
                    percent(i, total),
                ));
            }

            if !keyboard::is_typable(c) {
                log::warn!("skipping untypable character {c:?} at {i}");
                continue;
            }

            let cfg = ctl.config();

            if should_inject_typo(&cfg, c, &mut self.rng) {
                let wrong = keyboard::random_typo_letter(&mut self.rng);
                log::debug!("typo {wrong:?} before {c:?}");
                self.keyboard.type_char(wrong)?;
                self.waiter.wait(self.rng.gen_range(TYPO_NOTICE_MS), ctl);
                self.keyboard.backspace()?;
                self.waiter.wait(self.rng.gen_range(TYPO_RECOVER_MS), ctl);
            }

            self.keyboard.type_char(c)?;

            let delay = inter_key_delay(&cfg, c, &mut self.rng);
            if delay.thinking {
                ctl.emit(Event::progress(
                    StatusState::Typing,
                    format!("Thinking pause ({} ms)", delay.ms),
                    percent(i, total),
                ));
            }
            self.waiter.wait(delay.ms, ctl);
        }

        if ctl.abort_requested() {
            return Ok(self.aborted(ctl, total, total));
        }

        ctl.session_mut().index = total;
        ctl.emit(Event::progress(StatusState::Finished, "Done", 100));
        Ok(SessionOutcome::Finished)
    }

    fn aborted(&mut self, ctl: &mut Controller<C>, typed: usize, total: usize) -> SessionOutcome {
        log::info!("session aborted after {typed}/{total} characters");
        ctl.emit(Event::progress(
            StatusState::Aborted,
            format!("Aborted after {typed}/{total} characters"),
            percent(typed, total),
        ));
        SessionOutcome::Aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn cfg(base: i32, variance: i32) -> TypingConfig {
        TypingConfig {
            base_delay: base,
            delay_variance: variance,
            error_rate: 0,
            long_pause_chance: 0,
            start_delay: 0,
        }
    }

    #[test]
    fn delay_never_drops_below_floor() {
        let mut rng = StdRng::seed_from_u64(1);
        for (base, variance) in [(0, 0), (5, 500), (70, 70), (-40, 10), (10, 1000)] {
            for _ in 0..500 {
                let d = inter_key_delay(&cfg(base, variance), 'x', &mut rng);
                assert!(d.ms >= MIN_KEY_DELAY_MS as u64, "{base}/{variance} gave {}", d.ms);
            }
        }
    }

    #[test]
    fn jitter_stays_in_half_open_range() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..1000 {
            let d = inter_key_delay(&cfg(100, 30), 'x', &mut rng);
            assert!((70..130).contains(&d.ms), "got {}", d.ms);
            assert!(!d.thinking);
        }
    }

    #[test]
    fn word_boundary_adds_gap() {
        let mut rng = StdRng::seed_from_u64(3);
        for c in [' ', '\n'] {
            for _ in 0..200 {
                let d = inter_key_delay(&cfg(100, 0), c, &mut rng);
                assert!((150..250).contains(&d.ms), "got {}", d.ms);
            }
        }
    }

    #[test]
    fn certain_long_pause_is_flagged() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut c = cfg(100, 0);
        c.long_pause_chance = 1;

        let d = inter_key_delay(&c, ' ', &mut rng);
        assert!(d.thinking);
        assert!((650..2250).contains(&d.ms), "got {}", d.ms);
    }

    #[test]
    fn typos_never_land_on_boundaries_or_disabled_rate() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut c = cfg(100, 0);
        assert!(!(0..500).any(|_| should_inject_typo(&c, 'a', &mut rng)));

        c.error_rate = 1;
        assert!(should_inject_typo(&c, 'a', &mut rng));
        assert!(!should_inject_typo(&c, ' ', &mut rng));
        assert!(!should_inject_typo(&c, '\n', &mut rng));
    }

    #[test]
    fn percent_is_bounded() {
        assert_eq!(percent(0, 7), 0);
        assert_eq!(percent(7, 7), 100);
        assert_eq!(percent(9, 7), 100);
        assert_eq!(percent(0, 0), 100);
    }
}
