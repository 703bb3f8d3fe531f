//! USB HID gadget backend: writes boot-protocol keyboard reports to `/dev/hidgN`.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

use crate::keyboard::{keystroke_for_output_char, KeyEmitter, KeyStroke, MOD_LEFTSHIFT};

const RELEASED: [u8; 8] = [0; 8];

fn report_for(stroke: KeyStroke) -> [u8; 8] {
    let modifiers = if stroke.shift { MOD_LEFTSHIFT } else { 0 };
    [modifiers, 0, stroke.usage, 0, 0, 0, 0, 0]
}

pub struct HidgKeyboard<W: Write = File> {
    out: W,
}

impl HidgKeyboard<File> {
    pub fn open(path: &Path) -> Result<Self> {
        let out = OpenOptions::new()
            .write(true)
            .open(path)
            .with_context(|| format!("failed to open HID gadget {}", path.display()))?;
        Ok(Self::new(out))
    }
}

impl<W: Write> HidgKeyboard<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn tap(&mut self, stroke: KeyStroke) -> Result<()> {
        self.out
            .write_all(&report_for(stroke))
            .context("failed to write key-down report")?;
        self.out
            .write_all(&RELEASED)
            .context("failed to write key-up report")?;
        self.out.flush().context("failed to flush HID gadget")
    }
}

impl<W: Write> KeyEmitter for HidgKeyboard<W> {
    fn type_char(&mut self, c: char) -> Result<()> {
        let stroke =
            keystroke_for_output_char(c).ok_or_else(|| anyhow!("no key for {c:?} on US layout"))?;
        self.tap(stroke)
    }

    fn backspace(&mut self) -> Result<()> {
        self.tap(KeyStroke::BACKSPACE)
    }

    fn release_all(&mut self) {
        let _ = self.out.write_all(&RELEASED).and_then(|_| self.out.flush());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::{KEY_A, KEY_BACKSPACE};

    #[test]
    fn shifted_char_sets_modifier_then_releases() {
        let mut kb = HidgKeyboard::new(Vec::new());
        kb.type_char('A').unwrap();
        kb.backspace().unwrap();

        let bytes = kb.into_inner();
        assert_eq!(
            bytes,
            [
                [MOD_LEFTSHIFT, 0, KEY_A, 0, 0, 0, 0, 0],
                RELEASED,
                [0, 0, KEY_BACKSPACE, 0, 0, 0, 0, 0],
                RELEASED,
            ]
            .concat()
        );
    }

    #[test]
    fn untypable_char_is_an_error() {
        let mut kb = HidgKeyboard::new(Vec::new());
        assert!(kb.type_char('λ').is_err());
        assert!(kb.into_inner().is_empty());
    }
}
