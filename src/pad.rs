//! Joypad (P1) register and button state.

use crate::{interrupts::IntController, panic_gb};

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum PadSelection {
    Action,
    Direction,
    Both,
    None,
}

#[derive(Clone, Copy)]
pub enum PadKey {
    Up,
    Down,
    Left,
    Right,
    Start,
    Select,
    A,
    B,
}

pub struct Pad {
    down: bool,
    up: bool,
    left: bool,
    right: bool,
    start: bool,
    select: bool,
    b: bool,
    a: bool,
    selection: PadSelection,
}

impl Pad {
    pub fn new() -> Self {
        Self {
            down: false,
            up: false,
            left: false,
            right: false,
            start: false,
            select: false,
            b: false,
            a: false,
            selection: PadSelection::None,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr & 0x00ff {
            0x0000 => {
                let action_bits = if self.a { 0x00 } else { 0x01 }
                    | if self.b { 0x00 } else { 0x02 }
                    | if self.select { 0x00 } else { 0x04 }
                    | if self.start { 0x00 } else { 0x08 };
                let direction_bits = if self.right { 0x00 } else { 0x01 }
                    | if self.left { 0x00 } else { 0x02 }
                    | if self.up { 0x00 } else { 0x04 }
                    | if self.down { 0x00 } else { 0x08 };
                let bits = match self.selection {
                    PadSelection::Action => action_bits,
                    PadSelection::Direction => direction_bits,
                    PadSelection::Both => action_bits & direction_bits,
                    PadSelection::None => 0x0f,
                };
                let select_bits = match self.selection {
                    PadSelection::Action => 0x10,
                    PadSelection::Direction => 0x20,
                    PadSelection::Both => 0x00,
                    PadSelection::None => 0x30,
                };
                bits | select_bits | 0xc0
            }
            addr => panic_gb!("Reading from unknown Pad location 0x{:04x}", addr),
        }
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        match addr & 0x00ff {
            0x0000 => {
                self.selection = match value & 0x30 {
                    0x00 => PadSelection::Both,
                    0x10 => PadSelection::Action,
                    0x20 => PadSelection::Direction,
                    _ => PadSelection::None,
                }
            }
            addr => panic_gb!("Writing to unknown Pad location 0x{:04x}", addr),
        }
    }

    /// Presses `key`, raising the JOYPAD interrupt if that key's row is
    /// currently selected (the falling-edge condition hardware uses).
    pub fn key_press(&mut self, key: PadKey, ints: &mut IntController) {
        let selected = self.is_selected(key);
        match key {
            PadKey::Up => self.up = true,
            PadKey::Down => self.down = true,
            PadKey::Left => self.left = true,
            PadKey::Right => self.right = true,
            PadKey::Start => self.start = true,
            PadKey::Select => self.select = true,
            PadKey::A => self.a = true,
            PadKey::B => self.b = true,
        }
        if selected {
            ints.raise_joypad();
        }
    }

    pub fn key_lift(&mut self, key: PadKey) {
        match key {
            PadKey::Up => self.up = false,
            PadKey::Down => self.down = false,
            PadKey::Left => self.left = false,
            PadKey::Right => self.right = false,
            PadKey::Start => self.start = false,
            PadKey::Select => self.select = false,
            PadKey::A => self.a = false,
            PadKey::B => self.b = false,
        }
    }

    /// Sets the full 8-key state at once from an active-low bitmask in
    /// the order A/B/Select/Start/Right/Left/Up/Down, matching the
    /// `set_joypad` host surface.
    pub fn set_state(&mut self, bits_active_low: u8, ints: &mut IntController) {
        let keys = [
            (PadKey::A, 0x01),
            (PadKey::B, 0x02),
            (PadKey::Select, 0x04),
            (PadKey::Start, 0x08),
            (PadKey::Right, 0x10),
            (PadKey::Left, 0x20),
            (PadKey::Up, 0x40),
            (PadKey::Down, 0x80),
        ];
        for (key, mask) in keys {
            if bits_active_low & mask == 0 {
                self.key_press(key, ints);
            } else {
                self.key_lift(key);
            }
        }
    }

    /// Raw key states and row selection, in A/B/Select/Start/Right/Left/Up/Down
    /// order (active-high), for the state serializer.
    pub fn key_snapshot(&self) -> ([bool; 8], PadSelection) {
        (
            [
                self.a, self.b, self.select, self.start, self.right, self.left, self.up, self.down,
            ],
            self.selection,
        )
    }

    pub fn restore_keys(&mut self, keys: [bool; 8], selection: PadSelection) {
        self.a = keys[0];
        self.b = keys[1];
        self.select = keys[2];
        self.start = keys[3];
        self.right = keys[4];
        self.left = keys[5];
        self.up = keys[6];
        self.down = keys[7];
        self.selection = selection;
    }

    fn is_selected(&self, key: PadKey) -> bool {
        let is_action = matches!(key, PadKey::A | PadKey::B | PadKey::Select | PadKey::Start);
        matches!(
            (self.selection, is_action),
            (PadSelection::Both, _) | (PadSelection::Action, true) | (PadSelection::Direction, false)
        )
    }
}

impl Default for Pad {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_keys_pressed_reads_all_ones() {
        let pad = Pad::new();
        assert_eq!(pad.read(0xff00) & 0x0f, 0x0f);
    }

    #[test]
    fn test_key_press_clears_bit_when_row_selected() {
        let mut pad = Pad::new();
        let mut ints = IntController::new();
        pad.write(0xff00, 0x10);
        pad.key_press(PadKey::A, &mut ints);
        assert_eq!(pad.read(0xff00) & 0x01, 0x00);
    }

    #[test]
    fn test_key_press_raises_joypad_interrupt_when_row_selected() {
        let mut pad = Pad::new();
        let mut ints = IntController::new();
        pad.write(0xff00, 0x10);
        pad.key_press(PadKey::Start, &mut ints);
        assert_eq!(ints.pending() & crate::consts::INT_JOYPAD, 0);
        ints.write_ie(0xff);
        assert_eq!(ints.pending() & crate::consts::INT_JOYPAD, crate::consts::INT_JOYPAD);
    }

    #[test]
    fn test_key_press_does_not_raise_when_other_row_selected() {
        let mut pad = Pad::new();
        let mut ints = IntController::new();
        ints.write_ie(0xff);
        pad.write(0xff00, 0x20);
        pad.key_press(PadKey::A, &mut ints);
        assert_eq!(ints.pending(), 0);
    }
}
