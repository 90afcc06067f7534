//! Breakpoint table: opcode-substitution debugging hooks with no
//! counterpart in the component this core is modeled on.
//!
//! A breakpoint is set by overwriting the targeted ROM byte with the
//! reserved [`crate::consts::BREAKPOINT_OPCODE`] sentinel and recording
//! the opcode it replaced. The CPU never actually executes that
//! sentinel: [`crate::machine::Machine::step`] detects the substitution
//! immediately before fetch, restores the saved opcode for the
//! duration of exactly one instruction, and reinstates the sentinel
//! right after — so the breakpoint stays in place across bank
//! switches without ever corrupting execution.

use crate::{cartridge::Cartridge, consts::BREAKPOINT_OPCODE, error::Error};

const MAX_BREAKPOINTS: usize = 128;

#[derive(Clone, Copy)]
pub struct Breakpoint {
    pub rom_offset: usize,
    pub saved_opcode: u8,
}

#[derive(Default)]
pub struct Breakpoints {
    entries: Vec<Breakpoint>,
}

impl Breakpoints {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[Breakpoint] {
        &self.entries
    }

    /// Splices the breakpoint sentinel into the cartridge at `addr`'s
    /// currently-mapped ROM offset.
    pub fn set(&mut self, cartridge: &mut Cartridge, addr: u16) -> Result<(), Error> {
        let offset = cartridge
            .rom_offset(addr)
            .ok_or_else(|| Error::InvalidParameter(format!("address 0x{:04x} is not in ROM", addr)))?;

        if self.entries.iter().any(|bp| bp.rom_offset == offset) {
            return Ok(());
        }
        if self.entries.len() >= MAX_BREAKPOINTS {
            return Err(Error::InvalidParameter(String::from(
                "breakpoint table is full",
            )));
        }

        let saved_opcode = cartridge.patch_rom_byte(offset, BREAKPOINT_OPCODE);
        self.entries.push(Breakpoint { rom_offset: offset, saved_opcode });
        Ok(())
    }

    pub fn clear(&mut self, cartridge: &mut Cartridge, addr: u16) -> Result<(), Error> {
        let offset = cartridge
            .rom_offset(addr)
            .ok_or_else(|| Error::InvalidParameter(format!("address 0x{:04x} is not in ROM", addr)))?;

        if let Some(index) = self.entries.iter().position(|bp| bp.rom_offset == offset) {
            let entry = self.entries.remove(index);
            cartridge.patch_rom_byte(entry.rom_offset, entry.saved_opcode);
        }
        Ok(())
    }

    /// Re-inserts a breakpoint entry previously produced by
    /// [`Breakpoints::entries`], used by the state serializer to restore
    /// the table without re-deriving ROM offsets from addresses. The
    /// caller is responsible for having already spliced the sentinel
    /// opcode into the cartridge at `rom_offset`.
    pub fn restore_entry(&mut self, rom_offset: usize, saved_opcode: u8) {
        self.entries.push(Breakpoint { rom_offset, saved_opcode });
    }

    /// The breakpoint currently mapped at `addr`, if any, used to drive
    /// the restore-then-reinstate dance around a single instruction.
    pub fn hit(&self, cartridge: &Cartridge, addr: u16) -> Option<Breakpoint> {
        let offset = cartridge.rom_offset(addr)?;
        self.entries.iter().find(|bp| bp.rom_offset == offset).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_cart() -> Cartridge {
        let mut data = vec![0u8; 0x8000];
        data[0x148] = 0x00; // 2 banks (32 KiB)
        let mut sum: u8 = 0;
        for &byte in &data[0x134..=0x14c] {
            sum = sum.wrapping_sub(byte).wrapping_sub(1);
        }
        data[0x14d] = sum;
        Cartridge::from_data(&data).unwrap()
    }

    #[test]
    fn test_set_breakpoint_splices_sentinel_and_saves_opcode() {
        let mut cart = build_cart();
        cart.patch_rom_byte(0x0100, 0x3e); // LD A,d8 at reset vector
        let mut bps = Breakpoints::new();
        bps.set(&mut cart, 0x0100).unwrap();
        assert_eq!(cart.rom_byte_raw(0x0100), BREAKPOINT_OPCODE);

        let hit = bps.hit(&cart, 0x0100).unwrap();
        assert_eq!(hit.saved_opcode, 0x3e);
    }

    #[test]
    fn test_clear_breakpoint_restores_saved_opcode() {
        let mut cart = build_cart();
        cart.patch_rom_byte(0x0100, 0x3e);
        let mut bps = Breakpoints::new();
        bps.set(&mut cart, 0x0100).unwrap();
        bps.clear(&mut cart, 0x0100).unwrap();
        assert_eq!(cart.rom_byte_raw(0x0100), 0x3e);
        assert!(bps.hit(&cart, 0x0100).is_none());
    }

    #[test]
    fn test_table_full_rejects_further_breakpoints() {
        let mut cart = build_cart();
        let mut bps = Breakpoints::new();
        for addr in 0..MAX_BREAKPOINTS as u16 {
            bps.set(&mut cart, 0x0100 + addr).unwrap();
        }
        assert!(bps.set(&mut cart, 0x0100 + MAX_BREAKPOINTS as u16).is_err());
    }
}
