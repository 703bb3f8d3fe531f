use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_DELAY_MS: i32 = 70;
pub const DEFAULT_DELAY_VARIANCE_MS: i32 = 30;
pub const DEFAULT_ERROR_RATE: i32 = 50;
pub const DEFAULT_LONG_PAUSE_CHANCE: i32 = 15;
pub const DEFAULT_START_DELAY_SECS: i32 = 5;
pub const DEFAULT_PAYLOAD: &str = "Hello World";

/// Typing parameters. Rates are "1 in N"; zero or below disables the feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingConfig {
    pub base_delay: i32,
    pub delay_variance: i32,
    pub error_rate: i32,
    pub long_pause_chance: i32,
    pub start_delay: i32,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY_MS,
            delay_variance: DEFAULT_DELAY_VARIANCE_MS,
            error_rate: DEFAULT_ERROR_RATE,
            long_pause_chance: DEFAULT_LONG_PAUSE_CHANCE,
            start_delay: DEFAULT_START_DELAY_SECS,
        }
    }
}

impl TypingConfig {
    pub fn apply(&mut self, update: &ConfigUpdate) {
        if let Some(v) = update.base_delay {
            self.base_delay = v;
        }
        if let Some(v) = update.delay_variance {
            self.delay_variance = v;
        }
        if let Some(v) = update.error_rate {
            self.error_rate = v;
        }
        if let Some(v) = update.long_pause_chance {
            self.long_pause_chance = v;
        }
        if let Some(v) = update.start_delay {
            self.start_delay = v;
        }
    }
}

/// Everything the device persists: the typing parameters and the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub config: TypingConfig,
    pub payload: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config: TypingConfig::default(),
            payload: DEFAULT_PAYLOAD.to_string(),
        }
    }
}

impl Settings {
    pub fn snapshot(&self) -> Event {
        Event::Settings {
            config: self.config,
            payload: self.payload.clone(),
        }
    }
}

/// Abort flag shared between the control loop and the Ctrl+C handler thread.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Ephemeral state of the one typing run that may be active.
#[derive(Debug, Clone, Default)]
pub struct TypingSession {
    pub running: bool,
    pub abort: AbortSignal,
    pub index: usize,
    pub countdown_remaining: i32,
}

impl TypingSession {
    pub fn begin(&mut self, start_delay: i32) {
        self.running = true;
        self.abort.clear();
        self.index = 0;
        self.countdown_remaining = start_delay.max(0);
    }

    pub fn reset(&mut self) {
        self.running = false;
        self.abort.clear();
        self.index = 0;
        self.countdown_remaining = 0;
    }

    pub fn abort_requested(&self) -> bool {
        self.abort.is_raised()
    }
}

/// Partial `config` command. Absent fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_delay: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_variance: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_rate: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_pause_chance: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_delay: Option<i32>,
}

impl From<TypingConfig> for ConfigUpdate {
    fn from(cfg: TypingConfig) -> Self {
        Self {
            base_delay: Some(cfg.base_delay),
            delay_variance: Some(cfg.delay_variance),
            error_rate: Some(cfg.error_rate),
            long_pause_chance: Some(cfg.long_pause_chance),
            start_delay: Some(cfg.start_delay),
        }
    }
}

/// Inbound frame, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    Start,
    Stop,
    Config(ConfigUpdate),
    Text { data: String },
    Get,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusState {
    Countdown,
    Typing,
    Aborted,
    Abort,
    Finished,
    ConfigSaved,
    TextSaved,
}

/// Outbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Status {
        state: StatusState,
        msg: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<u8>,
    },
    Settings {
        #[serde(flatten)]
        config: TypingConfig,
        payload: String,
    },
}

impl Event {
    pub fn status(state: StatusState, msg: impl Into<String>) -> Self {
        Event::Status {
            state,
            msg: msg.into(),
            progress: None,
        }
    }

    pub fn progress(state: StatusState, msg: impl Into<String>, progress: u8) -> Self {
        Event::Status {
            state,
            msg: msg.into(),
            progress: Some(progress.min(100)),
        }
    }

    pub fn state(&self) -> Option<StatusState> {
        match self {
            Event::Status { state, .. } => Some(*state),
            Event::Settings { .. } => None,
        }
    }
}
