use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{anyhow, Result};

use crate::clock::Clock;
use crate::keyboard::{is_typable, KeyEmitter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimKey {
    Char(char),
    Backspace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimStroke {
    pub at_ms: u64,
    pub key: SimKey,
}

/// Keyboard that records every keystroke with the clock time it happened at.
///
/// Clones share the same log, so one copy can be handed to the typist while
/// another is kept for inspection.
#[derive(Debug, Clone)]
pub struct SimKeyboard<C: Clock> {
    clock: C,
    strokes: Rc<RefCell<Vec<SimStroke>>>,
}

impl<C: Clock> SimKeyboard<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            strokes: Rc::default(),
        }
    }

    pub fn strokes(&self) -> Vec<SimStroke> {
        self.strokes.borrow().clone()
    }

    pub fn clear(&self) {
        self.strokes.borrow_mut().clear();
    }

    fn record(&self, key: SimKey) {
        self.strokes.borrow_mut().push(SimStroke {
            at_ms: self.clock.now_ms(),
            key,
        });
    }
}

impl<C: Clock> KeyEmitter for SimKeyboard<C> {
    fn type_char(&mut self, c: char) -> Result<()> {
        if !is_typable(c) {
            return Err(anyhow!("no key for {c:?} on US layout"));
        }
        self.record(SimKey::Char(c));
        Ok(())
    }

    fn backspace(&mut self) -> Result<()> {
        self.record(SimKey::Backspace);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub keystrokes: usize,
    pub backspaces: usize,
    /// Wrong characters that were typed and then erased.
    pub typos: usize,
    /// Time from the first to the last keystroke.
    pub span_ms: u64,
}

pub fn stats(strokes: &[SimStroke]) -> SessionStats {
    let mut out = SessionStats {
        keystrokes: strokes.len(),
        ..Default::default()
    };

    for pair in strokes.windows(2) {
        if let [SimStroke {
            key: SimKey::Char(_),
            ..
        }, SimStroke {
            key: SimKey::Backspace,
            ..
        }] = pair
        {
            out.typos += 1;
        }
    }
    out.backspaces = strokes
        .iter()
        .filter(|s| s.key == SimKey::Backspace)
        .count();

    if let (Some(first), Some(last)) = (strokes.first(), strokes.last()) {
        out.span_ms = last.at_ms - first.at_ms;
    }

    out
}

/// Text left in a plain editor after replaying the strokes.
pub fn simulate_typed_text(strokes: &[SimStroke]) -> String {
    let mut buf: Vec<char> = Vec::new();
    for stroke in strokes {
        match stroke.key {
            SimKey::Char(c) => buf.push(c),
            SimKey::Backspace => {
                buf.pop();
            }
        }
    }
    buf.into_iter().collect()
}

/// Gaps between consecutive keystrokes, in milliseconds.
pub fn gaps_ms(strokes: &[SimStroke]) -> Vec<u64> {
    strokes
        .windows(2)
        .map(|w| w[1].at_ms - w[0].at_ms)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn replay_applies_backspaces() {
        let clock = ManualClock::new();
        let mut kb = SimKeyboard::new(clock.clone());

        for c in "hx".chars() {
            kb.type_char(c).unwrap();
            clock.advance(100);
        }
        kb.backspace().unwrap();
        clock.advance(80);
        kb.type_char('i').unwrap();

        let strokes = kb.strokes();
        assert_eq!(simulate_typed_text(&strokes), "hi");
        assert_eq!(gaps_ms(&strokes), vec![100, 100, 80]);
        assert_eq!(
            stats(&strokes),
            SessionStats {
                keystrokes: 4,
                backspaces: 1,
                typos: 1,
                span_ms: 280,
            }
        );
    }
}
