//! Interrupt controller: the `IF`/`IE` registers and the fixed-priority
//! vector table used to dispatch pending interrupts from the CPU step.

use crate::consts::{
    INT_JOYPAD, INT_LCDC, INT_SERIAL, INT_TIMER, INT_VBLANK, VEC_JOYPAD, VEC_LCDC, VEC_SERIAL,
    VEC_TIMER, VEC_VBLANK,
};

/// A single interrupt source, in fixed service-priority order
/// (VBLANK > LCDC > TIMER > SERIAL > JOYPAD).
pub const SOURCES: [(u8, u16); 5] = [
    (INT_VBLANK, VEC_VBLANK),
    (INT_LCDC, VEC_LCDC),
    (INT_TIMER, VEC_TIMER),
    (INT_SERIAL, VEC_SERIAL),
    (INT_JOYPAD, VEC_JOYPAD),
];

/// Holds the `IF` (pending) and `IE` (enabled) interrupt masks.
///
/// Rather than each of PPU/timer/pad owning its own `int_*` pending bool
/// and ORing them together on IF read, IF is modeled as a single byte
/// mutated directly by whichever component raises the interrupt.
#[derive(Default)]
pub struct IntController {
    i_f: u8,
    i_e: u8,
}

impl IntController {
    pub fn new() -> Self {
        Self { i_f: 0, i_e: 0 }
    }

    pub fn reset(&mut self) {
        self.i_f = 0;
        self.i_e = 0;
    }

    #[inline(always)]
    pub fn raise(&mut self, mask: u8) {
        self.i_f |= mask;
    }

    #[inline(always)]
    pub fn raise_vblank(&mut self) {
        self.raise(INT_VBLANK);
    }

    #[inline(always)]
    pub fn raise_lcdc(&mut self) {
        self.raise(INT_LCDC);
    }

    #[inline(always)]
    pub fn raise_timer(&mut self) {
        self.raise(INT_TIMER);
    }

    #[inline(always)]
    pub fn raise_joypad(&mut self) {
        self.raise(INT_JOYPAD);
    }

    #[inline(always)]
    pub fn ack(&mut self, mask: u8) {
        self.i_f &= !mask;
    }

    /// Mask of interrupts that are both pending and enabled.
    #[inline(always)]
    pub fn pending(&self) -> u8 {
        self.i_f & self.i_e
    }

    /// The vector to service next, in priority order, along with its
    /// flag mask, or `None` if nothing is both pending and enabled.
    pub fn next_vector(&self) -> Option<(u8, u16)> {
        let pending = self.pending();
        SOURCES
            .iter()
            .find(|(mask, _)| pending & mask != 0)
            .copied()
    }

    /// `IF` reads with the documented upper-three-bits-read-as-one
    /// invariant.
    #[inline(always)]
    pub fn read_if(&self) -> u8 {
        self.i_f | 0xe0
    }

    #[inline(always)]
    pub fn write_if(&mut self, value: u8) {
        self.i_f = value & 0x1f;
    }

    #[inline(always)]
    pub fn read_ie(&self) -> u8 {
        self.i_e
    }

    #[inline(always)]
    pub fn write_ie(&mut self, value: u8) {
        self.i_e = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_if_upper_bits_read_as_one() {
        let ints = IntController::new();
        assert_eq!(ints.read_if() & 0xe0, 0xe0);
    }

    #[test]
    fn test_priority_order() {
        let mut ints = IntController::new();
        ints.write_ie(0xff);
        ints.raise_timer();
        ints.raise_vblank();
        let (mask, vector) = ints.next_vector().unwrap();
        assert_eq!(mask, INT_VBLANK);
        assert_eq!(vector, VEC_VBLANK);
    }

    #[test]
    fn test_disabled_interrupt_not_serviced() {
        let mut ints = IntController::new();
        ints.write_ie(INT_TIMER);
        ints.raise_vblank();
        assert!(ints.next_vector().is_none());
    }

    #[test]
    fn test_ack_clears_only_that_bit() {
        let mut ints = IntController::new();
        ints.write_ie(0xff);
        ints.raise_vblank();
        ints.raise_timer();
        ints.ack(INT_VBLANK);
        assert_eq!(ints.next_vector().unwrap().0, INT_TIMER);
    }
}
