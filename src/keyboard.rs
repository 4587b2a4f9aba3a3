pub const NUM_KEYS: usize = 16;

/// Key's variants are the 16 keys from the CHIP-8's hexadecimal keyboard.
/// The recommended key mapping is:
///
/// Keypad                   Keyboard
/// +-+-+-+-+                +-+-+-+-+
/// |1|2|3|C|                |1|2|3|4|
/// +-+-+-+-+                +-+-+-+-+
/// |4|5|6|D|                |Q|W|E|R|
/// +-+-+-+-+       =>       +-+-+-+-+
/// |7|8|9|E|                |A|S|D|F|
/// +-+-+-+-+                +-+-+-+-+
/// |A|0|B|F|                |Z|X|C|V|
/// +-+-+-+-+                +-+-+-+-+
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub enum Key {
    Key0,
    Key1,
    Key2,
    Key3,
    Key4,
    Key5,
    Key6,
    Key7,
    Key8,
    Key9,
    A,
    B,
    C,
    D,
    E,
    F,
}

const KEYS: [Key; NUM_KEYS] = [
    Key::Key0,
    Key::Key1,
    Key::Key2,
    Key::Key3,
    Key::Key4,
    Key::Key5,
    Key::Key6,
    Key::Key7,
    Key::Key8,
    Key::Key9,
    Key::A,
    Key::B,
    Key::C,
    Key::D,
    Key::E,
    Key::F,
];

/// Host keys in keypad order, row by row, as laid out in the table above
pub const HOST_LAYOUT: [char; NUM_KEYS] = [
    '1', '2', '3', '4', 'Q', 'W', 'E', 'R', 'A', 'S', 'D', 'F', 'Z', 'X', 'C', 'V',
];

impl Key {
    /// The hex value the key reports to a program
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Key> {
        KEYS.get(code as usize).copied()
    }

    /// Map a host keyboard character onto the keypad. Case insensitive.
    pub fn from_host(c: char) -> Option<Key> {
        match c.to_ascii_uppercase() {
            '1' => Some(Key::Key1),
            '2' => Some(Key::Key2),
            '3' => Some(Key::Key3),
            '4' => Some(Key::C),
            'Q' => Some(Key::Key4),
            'W' => Some(Key::Key5),
            'E' => Some(Key::Key6),
            'R' => Some(Key::D),
            'A' => Some(Key::Key7),
            'S' => Some(Key::Key8),
            'D' => Some(Key::Key9),
            'F' => Some(Key::E),
            'Z' => Some(Key::A),
            'X' => Some(Key::Key0),
            'C' => Some(Key::B),
            'V' => Some(Key::F),
            _ => None,
        }
    }
}

/// Implemented by whatever polls the host for held keys. The machine diffs the
/// result against its own key state to produce press and release events.
pub trait AsKeyboard {
    fn keys_down(&self) -> Vec<Key>;
}

/// Whether the interpreter is running, or parked on an FX0A waiting for a key
/// that will land in register `x`
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum WaitState {
    Running,
    AwaitingKey(u8),
}

impl Default for WaitState {
    fn default() -> Self {
        WaitState::Running
    }
}

/// Contains the state (up or down) of the CHIP-8's 16 keys, as well as the
/// FX0A wait state
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Keyboard {
    key_input: [bool; NUM_KEYS],
    wait: WaitState,
}

impl Keyboard {
    pub fn new() -> Self {
        Keyboard::default()
    }

    /// Mark `code` as held. If an FX0A is waiting, resolves it and returns the
    /// register the code must be written to. Codes past 0xF are ignored.
    pub fn press(&mut self, code: u8) -> Option<u8> {
        let idx = code as usize;
        if idx >= NUM_KEYS {
            return None;
        }
        self.key_input[idx] = true;

        match self.wait {
            WaitState::AwaitingKey(reg) => {
                self.wait = WaitState::Running;
                Some(reg)
            }
            WaitState::Running => None,
        }
    }

    /// Mark `code` as released. Never resolves a wait.
    pub fn release(&mut self, code: u8) {
        if let Some(k) = self.key_input.get_mut(code as usize) {
            *k = false;
        }
    }

    /// Return whether the key is held. Anything past 0xF reads as up.
    pub fn get_key_state(&self, code: usize) -> bool {
        self.key_input.get(code).copied().unwrap_or(false)
    }

    /// Codes of every key currently held
    pub fn held(&self) -> Vec<u8> {
        (0..NUM_KEYS as u8)
            .filter(|c| self.key_input[*c as usize])
            .collect()
    }

    /// Called when the KeyOpGet Op is executed. The interpreter will transition out of
    /// the blocking state once a keypress gets detected
    pub fn block(&mut self, reg: u8) {
        self.wait = WaitState::AwaitingKey(reg);
    }

    /// Returns true if we're waiting on keyboard input because of a FX0A instruction,
    /// and false otherwise
    pub fn is_blocking(&self) -> bool {
        self.wait != WaitState::Running
    }

    pub fn wait_state(&self) -> WaitState {
        self.wait
    }
}
