use anyhow::Result;
use rand::Rng;

/// A key on the US layout plus whether Shift must be held for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStroke {
    pub usage: u8,
    pub shift: bool,
}

impl KeyStroke {
    pub const BACKSPACE: KeyStroke = KeyStroke {
        usage: KEY_BACKSPACE,
        shift: false,
    };

    const fn plain(usage: u8) -> Self {
        Self {
            usage,
            shift: false,
        }
    }

    const fn shifted(usage: u8) -> Self {
        Self { usage, shift: true }
    }
}

// USB HID keyboard usage IDs (HID Usage Tables, page 0x07)
pub const KEY_A: u8 = 0x04;
pub const KEY_Z: u8 = 0x1d;
pub const KEY_1: u8 = 0x1e;
pub const KEY_0: u8 = 0x27;
pub const KEY_ENTER: u8 = 0x28;
pub const KEY_BACKSPACE: u8 = 0x2a;
pub const KEY_TAB: u8 = 0x2b;
pub const KEY_SPACE: u8 = 0x2c;
pub const KEY_MINUS: u8 = 0x2d;
pub const KEY_EQUAL: u8 = 0x2e;
pub const KEY_LEFTBRACE: u8 = 0x2f;
pub const KEY_RIGHTBRACE: u8 = 0x30;
pub const KEY_BACKSLASH: u8 = 0x31;
pub const KEY_SEMICOLON: u8 = 0x33;
pub const KEY_APOSTROPHE: u8 = 0x34;
pub const KEY_GRAVE: u8 = 0x35;
pub const KEY_COMMA: u8 = 0x36;
pub const KEY_DOT: u8 = 0x37;
pub const KEY_SLASH: u8 = 0x38;

/// Modifier byte bit for left Shift in a boot keyboard report.
pub const MOD_LEFTSHIFT: u8 = 0x02;

/// Linux evdev code for left Shift (see linux/input-event-codes.h).
pub const EVDEV_LEFTSHIFT: u32 = 42;

/// Fold characters that have a plain-ASCII typing equivalent.
pub fn typed_char_for_output_char(c: char) -> Option<char> {
    match c {
        '\n' => Some('\n'),
        '\t' => Some('\t'),
        '\r' => None,
        '’' | '‘' => Some('\''),
        '”' | '“' => Some('"'),
        c if c.is_ascii_graphic() || c == ' ' => Some(c),
        _ => None,
    }
}

pub fn is_typable(c: char) -> bool {
    keystroke_for_output_char(c).is_some()
}

pub fn keystroke_for_output_char(c: char) -> Option<KeyStroke> {
    typed_char_for_output_char(c).and_then(char_to_keystroke)
}

pub fn char_to_keystroke(c: char) -> Option<KeyStroke> {
    let stroke = match c {
        'a'..='z' => KeyStroke::plain(KEY_A + (c as u8 - b'a')),
        'A'..='Z' => KeyStroke::shifted(KEY_A + (c as u8 - b'A')),
        '1'..='9' => KeyStroke::plain(KEY_1 + (c as u8 - b'1')),
        '0' => KeyStroke::plain(KEY_0),
        '!' => KeyStroke::shifted(KEY_1),
        '@' => KeyStroke::shifted(KEY_1 + 1),
        '#' => KeyStroke::shifted(KEY_1 + 2),
        '$' => KeyStroke::shifted(KEY_1 + 3),
        '%' => KeyStroke::shifted(KEY_1 + 4),
        '^' => KeyStroke::shifted(KEY_1 + 5),
        '&' => KeyStroke::shifted(KEY_1 + 6),
        '*' => KeyStroke::shifted(KEY_1 + 7),
        '(' => KeyStroke::shifted(KEY_1 + 8),
        ')' => KeyStroke::shifted(KEY_0),
        '\n' => KeyStroke::plain(KEY_ENTER),
        '\t' => KeyStroke::plain(KEY_TAB),
        ' ' => KeyStroke::plain(KEY_SPACE),
        '-' => KeyStroke::plain(KEY_MINUS),
        '_' => KeyStroke::shifted(KEY_MINUS),
        '=' => KeyStroke::plain(KEY_EQUAL),
        '+' => KeyStroke::shifted(KEY_EQUAL),
        '[' => KeyStroke::plain(KEY_LEFTBRACE),
        '{' => KeyStroke::shifted(KEY_LEFTBRACE),
        ']' => KeyStroke::plain(KEY_RIGHTBRACE),
        '}' => KeyStroke::shifted(KEY_RIGHTBRACE),
        '\\' => KeyStroke::plain(KEY_BACKSLASH),
        '|' => KeyStroke::shifted(KEY_BACKSLASH),
        ';' => KeyStroke::plain(KEY_SEMICOLON),
        ':' => KeyStroke::shifted(KEY_SEMICOLON),
        '\'' => KeyStroke::plain(KEY_APOSTROPHE),
        '"' => KeyStroke::shifted(KEY_APOSTROPHE),
        '`' => KeyStroke::plain(KEY_GRAVE),
        '~' => KeyStroke::shifted(KEY_GRAVE),
        ',' => KeyStroke::plain(KEY_COMMA),
        '<' => KeyStroke::shifted(KEY_COMMA),
        '.' => KeyStroke::plain(KEY_DOT),
        '>' => KeyStroke::shifted(KEY_DOT),
        '/' => KeyStroke::plain(KEY_SLASH),
        '?' => KeyStroke::shifted(KEY_SLASH),
        _ => return None,
    };
    Some(stroke)
}

/// Reverse of `char_to_keystroke`.
pub fn keystroke_to_char(stroke: KeyStroke) -> Option<char> {
    (' '..='~')
        .chain(['\n', '\t'])
        .find(|&c| char_to_keystroke(c) == Some(stroke))
}

/// Linux evdev code for a HID usage, for backends that speak evdev (X11 is evdev + 8).
pub fn usage_to_evdev(usage: u8) -> Option<u32> {
    const LETTERS: [u32; 26] = [
        30, 48, 46, 32, 18, 33, 34, 35, 23, 36, 37, 38, 50, 49, 24, 25, 16, 19, 31, 20, 22, 47,
        17, 45, 21, 44,
    ];

    let code = match usage {
        KEY_A..=KEY_Z => LETTERS[(usage - KEY_A) as usize],
        // 1..9 then 0 are contiguous in both tables.
        KEY_1..=KEY_0 => 2 + (usage - KEY_1) as u32,
        KEY_ENTER => 28,
        KEY_BACKSPACE => 14,
        KEY_TAB => 15,
        KEY_SPACE => 57,
        KEY_MINUS => 12,
        KEY_EQUAL => 13,
        KEY_LEFTBRACE => 26,
        KEY_RIGHTBRACE => 27,
        KEY_BACKSLASH => 43,
        KEY_SEMICOLON => 39,
        KEY_APOSTROPHE => 40,
        KEY_GRAVE => 41,
        KEY_COMMA => 51,
        KEY_DOT => 52,
        KEY_SLASH => 53,
        _ => return None,
    };
    Some(code)
}

/// The wrong key for a simulated typo: any lowercase letter.
pub fn random_typo_letter(rng: &mut impl Rng) -> char {
    (b'a' + rng.gen_range(0..26u8)) as char
}

/// Something that can type into the target machine.
pub trait KeyEmitter {
    /// Press and release the key(s) for `c`. `c` must be typable.
    fn type_char(&mut self, c: char) -> Result<()>;

    fn backspace(&mut self) -> Result<()>;

    /// Release anything that might still be held. Best effort.
    fn release_all(&mut self) {}
}
