use std::io::{self, Write};

use anyhow::{Context, Result};

use crate::keyboard::KeyEmitter;

const RESET: &str = "\x1b[0m";
const CORRECTION: &str = "\x1b[33m";

/// Echoes keystrokes to stderr; stdout stays free for the control protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleKeyboard;

impl ConsoleKeyboard {
    pub fn new() -> Self {
        Self
    }

    fn echo(&self, s: &str) -> Result<()> {
        let mut err = io::stderr().lock();
        err.write_all(s.as_bytes())
            .and_then(|_| err.flush())
            .context("failed to write to stderr")
    }
}

impl KeyEmitter for ConsoleKeyboard {
    fn type_char(&mut self, c: char) -> Result<()> {
        self.echo(c.encode_utf8(&mut [0u8; 4]))
    }

    fn backspace(&mut self) -> Result<()> {
        // Mark the correction instead of erasing it.
        self.echo(&format!("{CORRECTION}\u{232b}{RESET}"))
    }

    fn release_all(&mut self) {
        eprintln!();
    }
}
