use anyhow::{anyhow, Context, Result};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::ConnectionExt as _;
use x11rb::protocol::xtest::ConnectionExt as _;
use x11rb::protocol::{xproto, xtest};
use x11rb::rust_connection::RustConnection;

use crate::keyboard::{
    char_to_keystroke, keystroke_for_output_char, usage_to_evdev, KeyEmitter, KeyStroke,
    EVDEV_LEFTSHIFT,
};

fn evdev_to_x11_keycode(evdev_keycode: u32) -> Result<u8> {
    // On most Linux Xorg setups, X11 keycodes are evdev + 8.
    let x11 = evdev_keycode
        .checked_add(8)
        .ok_or_else(|| anyhow!("evdev keycode overflow"))?;
    u8::try_from(x11).map_err(|_| anyhow!("evdev keycode {evdev_keycode} out of range for X11"))
}

fn usage_to_x11_keycode(usage: u8) -> Result<u8> {
    let evdev = usage_to_evdev(usage).ok_or_else(|| anyhow!("no evdev code for usage {usage:#x}"))?;
    evdev_to_x11_keycode(evdev)
}

fn query_xtest(conn: &impl Connection) -> Result<()> {
    let ext = conn
        .extension_information(xtest::X11_EXTENSION_NAME)
        .context("failed to query X11 extension info")?;

    if ext.is_none() {
        return Err(anyhow!(
            "X11 backend requires the XTEST extension (not present on this X server)"
        ));
    }

    Ok(())
}

fn keysyms_for_keycode(conn: &impl Connection, keycode: u8) -> Result<(u32, u32)> {
    let reply = conn
        .get_keyboard_mapping(keycode, 1)
        .context("failed to request keyboard mapping")?
        .reply()
        .context("failed to read keyboard mapping")?;

    if reply.keysyms_per_keycode == 0 {
        return Err(anyhow!("X server returned 0 keysyms per keycode"));
    }

    let at = |i: usize| reply.keysyms.get(i).copied().unwrap_or(x11rb::NO_SYMBOL);
    Ok((at(0), at(1)))
}

fn validate_us_keymap(conn: &impl Connection) -> Result<()> {
    // Representative keys; for Latin-1 the keysym equals the character code.
    for (plain, shifted) in [('a', 'A'), ('q', 'Q'), ('1', '!'), ('-', '_'), ('\'', '"')] {
        let stroke = char_to_keystroke(plain).ok_or_else(|| anyhow!("{plain:?} unmapped"))?;
        let keycode = usage_to_x11_keycode(stroke.usage)?;
        let (got0, got1) = keysyms_for_keycode(conn, keycode)?;

        if got0 != plain as u32 || got1 != shifted as u32 {
            return Err(anyhow!(
                "X11 backend currently requires a US keyboard layout, but the X server keymap does not match (keycode {keycode}: got {got0:#x}/{got1:#x}). Try `setxkbmap us`."
            ));
        }
    }
    Ok(())
}

/// Types through XTEST fake input into whichever window has focus.
pub struct X11Keyboard {
    conn: RustConnection,
    root: xproto::Window,
    shift: u8,
}

impl X11Keyboard {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("failed to connect to X11")?;
        query_xtest(&conn)?;
        validate_us_keymap(&conn)?;

        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or_else(|| anyhow!("invalid X11 screen index"))?
            .root;
        let shift = evdev_to_x11_keycode(EVDEV_LEFTSHIFT)?;

        let mut keyboard = Self { conn, root, shift };
        keyboard.release_all();
        Ok(keyboard)
    }

    fn fake(&self, event_type: u8, keycode: u8) -> Result<()> {
        self.conn
            .xtest_fake_input(event_type, keycode, x11rb::CURRENT_TIME, self.root, 0, 0, 0)
            .context("failed to send XTEST fake input")?;
        Ok(())
    }

    fn tap(&mut self, stroke: KeyStroke) -> Result<()> {
        let keycode = usage_to_x11_keycode(stroke.usage)?;
        if stroke.shift {
            self.fake(xproto::KEY_PRESS_EVENT, self.shift)?;
        }
        self.fake(xproto::KEY_PRESS_EVENT, keycode)?;
        self.fake(xproto::KEY_RELEASE_EVENT, keycode)?;
        if stroke.shift {
            self.fake(xproto::KEY_RELEASE_EVENT, self.shift)?;
        }
        self.conn.flush().context("failed to flush X11 connection")?;
        Ok(())
    }
}

impl KeyEmitter for X11Keyboard {
    fn type_char(&mut self, c: char) -> Result<()> {
        let stroke =
            keystroke_for_output_char(c).ok_or_else(|| anyhow!("no key for {c:?} on US layout"))?;
        self.tap(stroke)
    }

    fn backspace(&mut self) -> Result<()> {
        self.tap(KeyStroke::BACKSPACE)
    }

    fn release_all(&mut self) {
        let _ = self.fake(xproto::KEY_RELEASE_EVENT, self.shift);
        let _ = self.conn.flush();
    }
}
