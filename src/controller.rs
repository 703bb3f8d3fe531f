//! Shared device state and the handlers that mutate it.
//!
//! Everything the control channel and the button can change lives here:
//! the committed settings, the active session flags, and a pending start
//! request. The typist only reads settings and session state through this
//! type, and the waiter drives it through [`Service`].

use crate::channel::ControlChannel;
use crate::clock::Clock;
use crate::model::{AbortSignal, Command, Event, Settings, StatusState, TypingConfig, TypingSession};
use crate::store::ConfigStore;
use crate::trigger::InputTrigger;
use crate::waiter::Service;

pub struct Controller<C: Clock> {
    settings: Settings,
    store: Box<dyn ConfigStore>,
    channel: ControlChannel,
    trigger: InputTrigger<C>,
    session: TypingSession,
    start_requested: bool,
}

impl<C: Clock> Controller<C> {
    pub fn new(store: Box<dyn ConfigStore>, channel: ControlChannel, trigger: InputTrigger<C>) -> Self {
        let settings = Settings::load(store.as_ref());
        log::info!(
            "loaded settings: {:?}, payload of {} chars",
            settings.config,
            settings.payload.chars().count()
        );

        Self {
            settings,
            store,
            channel,
            trigger,
            session: TypingSession::default(),
            start_requested: false,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config(&self) -> TypingConfig {
        self.settings.config
    }

    pub fn session(&self) -> &TypingSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut TypingSession {
        &mut self.session
    }

    /// Handle to the session abort flag, for raising it from another thread.
    pub fn abort_signal(&self) -> AbortSignal {
        self.session.abort.clone()
    }

    pub fn emit(&mut self, event: Event) {
        self.channel.emit(&event);
    }

    pub fn request_start(&mut self) {
        if self.session.running {
            log::debug!("start ignored: a session is already running");
            return;
        }
        self.start_requested = true;
    }

    pub fn take_start_request(&mut self) -> bool {
        std::mem::take(&mut self.start_requested)
    }

    pub fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start => self.request_start(),
            Command::Stop => {
                log::info!("stop requested over control channel");
                self.session.abort.raise();
                self.emit(Event::status(StatusState::Abort, "Stop requested"));
            }
            Command::Config(update) => {
                self.settings.config.apply(&update);
                if let Err(err) = self.settings.save_config(self.store.as_mut()) {
                    log::warn!("failed to persist config: {err}");
                }
                log::info!("config updated: {:?}", self.settings.config);
                self.emit(Event::status(StatusState::ConfigSaved, "Settings saved"));
            }
            Command::Text { data } => {
                let len = data.chars().count();
                self.settings.payload = data;
                if let Err(err) = self.settings.save_payload(self.store.as_mut()) {
                    log::warn!("failed to persist payload: {err}");
                }
                log::info!("payload updated ({len} chars)");
                self.emit(Event::status(
                    StatusState::TextSaved,
                    format!("Text saved ({len} chars)"),
                ));
            }
            Command::Get => {
                let snapshot = self.settings.snapshot();
                self.emit(snapshot);
            }
        }
    }

    fn on_button_pressed(&mut self) {
        if self.session.running {
            log::info!("button pressed during session; aborting");
            self.session.abort.raise();
        } else {
            self.request_start();
        }
    }
}

impl<C: Clock> Service for Controller<C> {
    fn service(&mut self) {
        if let Some(cmd) = self.channel.poll() {
            self.handle_command(cmd);
        }
        if self.trigger.poll_pressed() {
            self.on_button_pressed();
        }
    }

    fn abort_requested(&self) -> bool {
        self.session.abort_requested()
    }
}
