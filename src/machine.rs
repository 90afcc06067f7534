//! Top-level driver: owns the CPU (and, through it, every other
//! component), steps it a frame at a time, and exposes the host-facing
//! surface — joypad input, byte peeks/pokes, RTC wiring, save data, and
//! state snapshots.

use std::io::Cursor;

use crate::{
    breakpoint::{Breakpoint, Breakpoints},
    cartridge::Cartridge,
    consts::{BOOT_SIZE_DMG, BREAKPOINT_OPCODE, LCD_CYCLES},
    cpu::Cpu,
    data,
    error::Error,
    mmu::Mmu,
    pad::PadKey,
    ppu::{DISPLAY_HEIGHT, DISPLAY_WIDTH, FRAME_BUFFER_SIZE},
    state, util,
};

/// Wall-clock time fed to a fresh cartridge's RTC, in the 5-byte register
/// layout (seconds/minutes/hours/day-low/day-high), used by hosts that
/// want to seed a new save's clock from the real time of day rather than
/// leave it at zero.
#[derive(Clone, Copy, Default)]
pub struct RtcTime {
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub days: u16,
}

pub struct Machine {
    pub(crate) cpu: Cpu,
    pub(crate) breakpoints: Breakpoints,
    on_breakpoint: Option<fn(&mut Machine, usize)>,
    on_error: Option<fn(Error)>,
    had_boot_rom: bool,
}

impl Machine {
    /// Builds a machine from ROM bytes and an optional 256-byte DMG boot
    /// ROM. Without a boot ROM, registers are initialized to the values a
    /// real boot sequence leaves behind and execution starts at 0x0100.
    pub fn new(rom: &[u8], boot_rom: Option<[u8; BOOT_SIZE_DMG]>) -> Result<Self, Error> {
        let cartridge = Cartridge::from_data(rom)?;
        let mut mmu = Mmu::new(cartridge);
        let had_boot_rom = boot_rom.is_some();
        if let Some(boot) = boot_rom {
            mmu.set_boot_rom(boot);
        }

        let mut cpu = Cpu::new(mmu);
        if !had_boot_rom {
            cpu.boot();
        }

        Ok(Self {
            cpu,
            breakpoints: Breakpoints::new(),
            on_breakpoint: None,
            on_error: None,
            had_boot_rom,
        })
    }

    /// Restores DMG post-boot register values and clears WRAM/VRAM, as if
    /// the machine had just been constructed again with the same ROM and
    /// boot-ROM configuration. OAM and HRAM retain their contents, and
    /// breakpoints remain installed, matching real hardware reset
    /// behavior.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.cpu.mmu.reset();
        if !self.had_boot_rom {
            self.cpu.boot();
        }
    }

    pub fn set_error_cb(&mut self, cb: fn(Error)) {
        self.on_error = Some(cb);
        self.cpu.mmu.set_error_cb(cb);
    }

    pub fn set_breakpoint_hook(&mut self, cb: fn(&mut Machine, usize)) {
        self.on_breakpoint = Some(cb);
    }

    pub fn set_rumble_cb(&mut self, cb: fn(bool)) {
        self.cpu.mmu.cartridge.set_rumble_cb(cb);
    }

    /// Steps the CPU until the PPU reports a VBLANK edge (frame-done), or
    /// until a full frame's worth of cycles have elapsed with the LCD
    /// disabled, since in that case the PPU never produces the edge.
    pub fn run_frame(&mut self) -> Result<(), Error> {
        let mut budget: u32 = 0;
        loop {
            let cycles = self.step_one()?;
            budget = budget.saturating_add(cycles as u32);
            let frame_done = self.clock_peripherals(cycles);
            if frame_done || budget >= LCD_CYCLES {
                break;
            }
        }
        Ok(())
    }

    fn clock_peripherals(&mut self, cycles: u8) -> bool {
        let mmu = &mut self.cpu.mmu;
        mmu.timer.clock(cycles as u16, &mut mmu.ints);
        mmu.ppu.clock(cycles as u16, &mut mmu.ints)
    }

    fn step_one(&mut self) -> Result<u8, Error> {
        if !self.cpu.halted() {
            if let Some(index) = self.pending_breakpoint_index() {
                let bp = self.breakpoints.entries()[index];
                return self.service_breakpoint(index, bp);
            }
        }

        match self.cpu.step() {
            Ok(cycles) => Ok(cycles),
            Err(Error::InvalidOpcode(opcode)) => {
                if let Some(cb) = self.on_error {
                    cb(Error::InvalidOpcode(opcode));
                }
                Err(Error::InvalidOpcode(opcode))
            }
            Err(other) => Err(other),
        }
    }

    fn pending_breakpoint_index(&self) -> Option<usize> {
        let offset = self.cpu.mmu.cartridge.rom_offset(self.cpu.pc)?;
        self.breakpoints
            .entries()
            .iter()
            .position(|bp| bp.rom_offset == offset)
    }

    /// Restores the original opcode, invokes the scripted hook (if any),
    /// and — only if the hook left PC and the mapped ROM bank unchanged —
    /// executes exactly one real instruction before re-installing the
    /// breakpoint sentinel.
    fn service_breakpoint(&mut self, index: usize, bp: Breakpoint) -> Result<u8, Error> {
        let pc_before = self.cpu.pc;
        self.cpu.mmu.cartridge.patch_rom_byte(bp.rom_offset, bp.saved_opcode);

        if let Some(hook) = self.on_breakpoint {
            hook(self, index);
        }

        let unchanged = self.cpu.pc == pc_before
            && self.cpu.mmu.cartridge.rom_offset(self.cpu.pc) == Some(bp.rom_offset);

        let cycles = if unchanged { self.cpu.step()? } else { 0 };

        self.cpu.mmu.cartridge.patch_rom_byte(bp.rom_offset, BREAKPOINT_OPCODE);
        Ok(cycles)
    }

    pub fn set_breakpoint(&mut self, rom_offset_addr: u16) -> Result<(), Error> {
        self.breakpoints.set(&mut self.cpu.mmu.cartridge, rom_offset_addr)
    }

    pub fn clear_breakpoint(&mut self, rom_offset_addr: u16) -> Result<(), Error> {
        self.breakpoints.clear(&mut self.cpu.mmu.cartridge, rom_offset_addr)
    }

    pub fn get_frame_buffer(&self) -> &[u8; FRAME_BUFFER_SIZE] {
        self.cpu.mmu.ppu.frame_buffer()
    }

    pub fn frame_width(&self) -> usize {
        DISPLAY_WIDTH
    }

    pub fn frame_height(&self) -> usize {
        DISPLAY_HEIGHT
    }

    pub fn set_draw_allowed(&mut self, line: usize, allowed: bool) {
        self.cpu.mmu.ppu.set_draw_allowed(line, allowed);
    }

    pub fn read_byte(&self, addr: u16) -> u8 {
        self.cpu.mmu.read(addr)
    }

    pub fn write_byte(&mut self, addr: u16, value: u8) {
        self.cpu.mmu.write(addr, value);
    }

    /// Sets the full 8-key joypad state from an active-low bitmask in
    /// A/B/Select/Start/Right/Left/Up/Down order.
    pub fn set_joypad(&mut self, bits_active_low: u8) {
        let mmu = &mut self.cpu.mmu;
        mmu.pad.set_state(bits_active_low, &mut mmu.ints);
    }

    pub fn key_press(&mut self, key: PadKey) {
        let mmu = &mut self.cpu.mmu;
        mmu.pad.key_press(key, &mut mmu.ints);
    }

    pub fn key_lift(&mut self, key: PadKey) {
        self.cpu.mmu.pad.key_lift(key);
    }

    /// Seeds the cartridge's real-time clock (MBC3 only; a no-op
    /// otherwise), for example from the host's wall-clock time when a
    /// save has no prior RTC state to restore.
    pub fn set_rtc(&mut self, time: RtcTime) {
        if let Some(rtc) = self.cpu.mmu.cartridge.rtc_mut() {
            rtc.seconds = time.seconds;
            rtc.minutes = time.minutes;
            rtc.hours = time.hours;
            rtc.day_low = (time.days & 0xff) as u8;
            rtc.day_high = (rtc.day_high & 0xfe) | ((time.days >> 8) as u8 & 0x01);
        }
    }

    pub fn catch_up_rtc(&mut self, seconds: u64) {
        self.cpu.mmu.cartridge.catch_up_rtc(seconds);
    }

    /// Builds the `.sav` byte layout: raw SRAM, followed by the RTC
    /// registers and a last-saved timestamp if this cartridge has a
    /// battery-backed clock.
    pub fn save_sram_layout(&self) -> Vec<u8> {
        let cartridge = &self.cpu.mmu.cartridge;
        let mut buffer = Vec::with_capacity(cartridge.ram_size() + 9);
        buffer.extend_from_slice(cartridge.ram_data());

        if cartridge.has_battery() && cartridge.has_rtc() {
            if let Some(rtc) = cartridge.rtc() {
                buffer.extend_from_slice(&[
                    rtc.seconds,
                    rtc.minutes,
                    rtc.hours,
                    rtc.day_low,
                    rtc.day_high,
                ]);
                buffer.extend_from_slice(&(util::get_timestamp() as u32).to_le_bytes());
            }
        }

        buffer
    }

    /// Loads a `.sav` byte layout produced by [`Machine::save_sram_layout`].
    /// If a timestamp trails the RTC registers and it lies in the past,
    /// the RTC is advanced by the elapsed delta (itself per-frame budget
    /// bounded).
    pub fn load_sram_layout(&mut self, data: &[u8]) -> Result<(), Error> {
        let save_size = self.cpu.mmu.cartridge.ram_size();
        if data.len() < save_size {
            return Err(Error::StateSramSizeMismatch);
        }
        self.cpu.mmu.cartridge.set_ram_data(&data[..save_size]);

        let trailer = &data[save_size..];
        if self.cpu.mmu.cartridge.has_battery() && self.cpu.mmu.cartridge.has_rtc() && trailer.len() >= 9 {
            let mut cursor = Cursor::new(trailer);
            let regs = data::read_bytes(&mut cursor, 5)?;
            let last_saved = data::read_u32(&mut cursor)?;

            if let Some(rtc) = self.cpu.mmu.cartridge.rtc_mut() {
                rtc.seconds = regs[0];
                rtc.minutes = regs[1];
                rtc.hours = regs[2];
                rtc.day_low = regs[3];
                rtc.day_high = regs[4];
            }

            let now = util::get_timestamp() as u32;
            if now > last_saved {
                self.catch_up_rtc((now - last_saved) as u64);
            }
        }

        Ok(())
    }

    pub fn save_sram_to_file(&self, path: &str) -> Result<(), Error> {
        util::write_file_atomic(path, &self.save_sram_layout())
    }

    pub fn load_sram_from_file(&mut self, path: &str) -> Result<(), Error> {
        let data = util::read_file(path)?;
        self.load_sram_layout(&data)
    }

    pub fn save_state(&self) -> Vec<u8> {
        state::save_snapshot(self)
    }

    pub fn load_state(&mut self, data: &[u8]) -> Result<(), Error> {
        state::load_snapshot(self, data)
    }

    pub fn save_state_to_file(&self, path: &str) -> Result<(), Error> {
        util::write_file_atomic(path, &self.save_state())
    }

    pub fn load_state_from_file(&mut self, path: &str) -> Result<(), Error> {
        let data = util::read_file(path)?;
        self.load_state(&data)
    }

    pub fn sram_dirty(&self) -> bool {
        self.cpu.mmu.cartridge.sram_dirty()
    }

    pub fn clear_sram_dirty(&mut self) {
        self.cpu.mmu.cartridge.clear_sram_dirty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_rom_with_entry(entry: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; 0x8000];
        data[0x148] = 0x00;
        data[0x100..0x100 + entry.len()].copy_from_slice(entry);
        let mut sum: u8 = 0;
        for &byte in &data[0x134..=0x14c] {
            sum = sum.wrapping_sub(byte).wrapping_sub(1);
        }
        data[0x14d] = sum;
        data
    }

    #[test]
    fn test_new_without_boot_rom_starts_at_0x0100() {
        let rom = build_rom_with_entry(&[0x00]);
        let machine = Machine::new(&rom, None).unwrap();
        assert_eq!(machine.cpu.pc, 0x0100);
    }

    #[test]
    fn test_run_frame_terminates_on_tight_loop() {
        // 256 NOPs then JP 0x0100, matching the end-to-end NOP-loop scenario.
        let mut entry = vec![0x00u8; 256];
        entry.push(0xc3);
        entry.push(0x00);
        entry.push(0x01);
        let rom = build_rom_with_entry(&entry);
        let mut machine = Machine::new(&rom, None).unwrap();
        machine.run_frame().unwrap();
        assert!(machine.cpu.pc <= 0x0104);
    }

    #[test]
    fn test_invalid_opcode_terminates_frame_and_reports_error() {
        let rom = build_rom_with_entry(&[0xd3]); // illegal opcode, not installed as a breakpoint
        let mut machine = Machine::new(&rom, None).unwrap();
        let result = machine.run_frame();
        assert_eq!(result, Err(Error::InvalidOpcode(0xd3)));
    }

    #[test]
    fn test_breakpoint_restores_and_reinstates_sentinel_around_one_instruction() {
        // LD A,0x42 ; JR -2 (spin) at the breakpoint address.
        let rom = build_rom_with_entry(&[0x3e, 0x42, 0x18, 0xfc]);
        let mut machine = Machine::new(&rom, None).unwrap();
        machine.set_breakpoint(0x0100).unwrap();
        assert_eq!(machine.cpu.mmu.cartridge.read(0x0100), BREAKPOINT_OPCODE);

        machine.step_one().unwrap();

        assert_eq!(machine.cpu.a, 0x42);
        assert_eq!(machine.cpu.mmu.cartridge.read(0x0100), BREAKPOINT_OPCODE);
    }

    #[test]
    fn test_set_joypad_raises_interrupt_when_row_selected() {
        let rom = build_rom_with_entry(&[0x00]);
        let mut machine = Machine::new(&rom, None).unwrap();
        machine.write_byte(0xff00, 0x10); // select action row
        machine.write_byte(crate::consts::IE_ADDR, 0xff);
        machine.set_joypad(0xfe); // A pressed, active-low
        assert_ne!(machine.cpu.mmu.ints.pending() & crate::consts::INT_JOYPAD, 0);
    }

    #[test]
    fn test_sram_round_trip_through_layout_bytes() {
        let mut rom = vec![0u8; 0x10000];
        rom[0x147] = 0x03; // MBC1+RAM+BATTERY
        rom[0x148] = 0x01; // 4 banks (64 KiB)
        rom[0x149] = 0x02; // 8 KiB RAM
        let mut sum: u8 = 0;
        for &byte in &rom[0x134..=0x14c] {
            sum = sum.wrapping_sub(byte).wrapping_sub(1);
        }
        rom[0x14d] = sum;

        let mut machine = Machine::new(&rom, None).unwrap();
        machine.write_byte(0x0000, 0x0a); // enable RAM
        machine.write_byte(0xa000, 0x99);
        let layout = machine.save_sram_layout();

        let mut reloaded = Machine::new(&rom, None).unwrap();
        reloaded.write_byte(0x0000, 0x0a);
        reloaded.load_sram_layout(&layout).unwrap();
        assert_eq!(reloaded.read_byte(0xa000), 0x99);
    }
}
