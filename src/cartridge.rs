//! Cartridge header parsing and Memory Bank Controller (MBC) emulation.
//!
//! The MBC is modeled as a tagged variant rather than the static
//! function-pointer dispatch table this codebase otherwise favors for
//! hot per-byte dispatch (PPU/CPU instruction tables): each kind carries
//! its own banking registers, which keeps the RTC state (MBC3) and the
//! rumble flag (MBC5) out of the other variants entirely instead of
//! living as always-present fields on one shared struct.

use crate::{
    error::Error,
    util::get_timestamp,
    warnln,
};

pub const HEADER_FINGERPRINT_START: usize = 0x134;
pub const HEADER_FINGERPRINT_SIZE: usize = 28;
const TITLE_START: usize = 0x134;
const TITLE_END: usize = 0x143;
const CART_TYPE_ADDR: usize = 0x147;
const ROM_SIZE_ADDR: usize = 0x148;
const RAM_SIZE_ADDR: usize = 0x149;
const CHECKSUM_ADDR: usize = 0x14d;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcKind {
    None,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

struct CartType {
    kind: MbcKind,
    has_ram: bool,
    has_battery: bool,
    has_rtc: bool,
    has_rumble: bool,
}

fn cart_type(byte: u8) -> Result<CartType, Error> {
    use MbcKind::*;
    let t = |kind, has_ram, has_battery, has_rtc, has_rumble| CartType {
        kind,
        has_ram,
        has_battery,
        has_rtc,
        has_rumble,
    };
    Ok(match byte {
        0x00 => t(None, false, false, false, false),
        0x01 => t(Mbc1, false, false, false, false),
        0x02 => t(Mbc1, true, false, false, false),
        0x03 => t(Mbc1, true, true, false, false),
        0x05 => t(Mbc2, true, false, false, false),
        0x06 => t(Mbc2, true, true, false, false),
        0x08 => t(None, true, false, false, false),
        0x09 => t(None, true, true, false, false),
        0x0f => t(Mbc3, false, true, true, false),
        0x10 => t(Mbc3, true, true, true, false),
        0x11 => t(Mbc3, false, false, false, false),
        0x12 => t(Mbc3, true, false, false, false),
        0x13 => t(Mbc3, true, true, false, false),
        0x19 => t(Mbc5, false, false, false, false),
        0x1a => t(Mbc5, true, false, false, false),
        0x1b => t(Mbc5, true, true, false, false),
        0x1c => t(Mbc5, false, false, false, true),
        0x1d => t(Mbc5, true, false, false, true),
        0x1e => t(Mbc5, true, true, false, true),
        other => return Err(Error::InitCartridgeUnsupported(other)),
    })
}

fn rom_banks(byte: u8) -> Result<u16, Error> {
    match byte {
        0x00..=0x08 => Ok(2u16 << byte),
        _ => Err(Error::RomSize),
    }
}

fn ram_size_bytes(byte: u8) -> u32 {
    match byte {
        0x00 => 0,
        0x01 => 2 * 1024,
        0x02 => 8 * 1024,
        0x03 => 32 * 1024,
        0x04 => 128 * 1024,
        0x05 => 64 * 1024,
        _ => 0,
    }
}

/// Real-time clock registers for MBC3, plus the latch snapshot the
/// program actually reads back through the cart-RAM window.
#[derive(Clone, Default)]
pub struct Rtc {
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub day_low: u8,
    pub day_high: u8,
    latched: [u8; 5],
    latch_state: u8,
    ticks_owed: u64,
    last_tick_secs: u64,
}

/// Per-frame bound on RTC catch-up work, to keep a days-old save from
/// stalling the first frame after load.
const RTC_BUDGET_SECONDS_PER_FRAME: u32 = 4096;

impl Rtc {
    fn registers(&self) -> [u8; 5] {
        [
            self.seconds,
            self.minutes,
            self.hours,
            self.day_low,
            self.day_high,
        ]
    }

    fn set_registers(&mut self, regs: [u8; 5]) {
        self.seconds = regs[0];
        self.minutes = regs[1];
        self.hours = regs[2];
        self.day_low = regs[3];
        self.day_high = regs[4];
    }

    fn halted(&self) -> bool {
        self.day_high & 0x40 != 0
    }

    fn tick_one_second(&mut self) {
        if self.halted() {
            return;
        }
        self.seconds = self.seconds.wrapping_add(1);
        if self.seconds < 60 {
            return;
        }
        self.seconds = 0;
        self.minutes = self.minutes.wrapping_add(1);
        if self.minutes < 60 {
            return;
        }
        self.minutes = 0;
        self.hours = self.hours.wrapping_add(1);
        if self.hours < 24 {
            return;
        }
        self.hours = 0;
        let mut day = ((self.day_high as u16 & 0x01) << 8) | self.day_low as u16;
        day = day.wrapping_add(1);
        if day > 0x1ff {
            day = 0;
            self.day_high |= 0x80;
        }
        self.day_low = (day & 0xff) as u8;
        self.day_high = (self.day_high & 0xfe) | ((day >> 8) as u8 & 0x01);
    }

    pub fn latched(&self) -> [u8; 5] {
        self.latched
    }

    pub fn set_latched(&mut self, bytes: [u8; 5]) {
        self.latched = bytes;
    }

    pub fn latch_state(&self) -> u8 {
        self.latch_state
    }

    pub fn set_latch_state(&mut self, value: u8) {
        self.latch_state = value;
    }

    /// Advances the RTC by `seconds`, applying at most
    /// [`RTC_BUDGET_SECONDS_PER_FRAME`] of it now and carrying the rest
    /// forward as still-owed.
    pub fn catch_up(&mut self, seconds: u64) {
        self.ticks_owed = self.ticks_owed.saturating_add(seconds);
        let apply = self.ticks_owed.min(RTC_BUDGET_SECONDS_PER_FRAME as u64);
        for _ in 0..apply {
            self.tick_one_second();
        }
        self.ticks_owed -= apply;
    }

    fn latch_write(&mut self, value: u8) {
        match (self.latch_state, value) {
            (0x00, 0x00) => self.latch_state = 0x00,
            (_, 0x00) => self.latch_state = 0x00,
            (0x00, 0x01) => {
                self.latched = self.registers();
                self.latch_state = 0x01;
            }
            _ => self.latch_state = value,
        }
    }
}

#[derive(Default)]
struct Mbc1State {
    ram_enabled: bool,
    rom_bank_low5: u8,
    bank2: u8,
    mode: u8,
}

#[derive(Default)]
struct Mbc2State {
    ram_enabled: bool,
    rom_bank: u8,
}

#[derive(Default)]
struct Mbc3State {
    ram_enabled: bool,
    rom_bank: u8,
    ram_or_rtc_select: u8,
    rtc: Rtc,
}

#[derive(Default)]
struct Mbc5State {
    ram_enabled: bool,
    rom_bank: u16,
    ram_bank: u8,
    rumble_active: bool,
}

enum Mbc {
    None,
    Mbc1(Mbc1State),
    Mbc2(Mbc2State),
    Mbc3(Mbc3State),
    Mbc5(Mbc5State),
}

pub struct Cartridge {
    rom: Vec<u8>,
    ram: Vec<u8>,
    rom_bank_count: u16,
    has_battery: bool,
    has_rtc: bool,
    has_rumble: bool,
    rumble_cb: fn(bool),
    mbc: Mbc,
    sram_dirty: bool,
}

impl Cartridge {
    pub fn from_data(data: &[u8]) -> Result<Self, Error> {
        if data.len() < 0x150 {
            return Err(Error::RomSize);
        }

        let declared_banks = rom_banks(data[ROM_SIZE_ADDR])?;
        if data.len() != declared_banks as usize * 0x4000 {
            return Err(Error::RomSize);
        }

        let checksum = Self::compute_checksum(data);
        if checksum != data[CHECKSUM_ADDR] {
            return Err(Error::InitInvalidChecksum);
        }

        let cart_type = cart_type(data[CART_TYPE_ADDR])?;
        let ram_size = ram_size_bytes(data[RAM_SIZE_ADDR]).max(if cart_type.kind == MbcKind::Mbc2 {
            512
        } else {
            0
        });

        let mbc = match cart_type.kind {
            MbcKind::None => Mbc::None,
            MbcKind::Mbc1 => Mbc::Mbc1(Mbc1State::default()),
            MbcKind::Mbc2 => Mbc::Mbc2(Mbc2State::default()),
            MbcKind::Mbc3 => Mbc::Mbc3(Mbc3State::default()),
            MbcKind::Mbc5 => Mbc::Mbc5(Mbc5State::default()),
        };

        Ok(Self {
            rom: data.to_vec(),
            ram: vec![0u8; ram_size as usize],
            rom_bank_count: declared_banks,
            has_battery: cart_type.has_battery,
            has_rtc: cart_type.has_rtc,
            has_rumble: cart_type.has_rumble,
            rumble_cb: |_| {},
            mbc,
            sram_dirty: false,
        })
    }

    fn compute_checksum(data: &[u8]) -> u8 {
        let mut sum: u8 = 0;
        for &byte in &data[0x134..=0x14c] {
            sum = sum.wrapping_sub(byte).wrapping_sub(1);
        }
        sum
    }

    pub fn title(&self) -> String {
        let bytes: Vec<u8> = self.rom[TITLE_START..=TITLE_END]
            .iter()
            .copied()
            .take_while(|&b| b != 0)
            .collect();
        String::from_utf8_lossy(&bytes).trim().to_string()
    }

    pub fn valid_checksum(&self) -> bool {
        Self::compute_checksum(&self.rom) == self.rom[CHECKSUM_ADDR]
    }

    pub fn has_battery(&self) -> bool {
        self.has_battery
    }

    pub fn has_rtc(&self) -> bool {
        self.has_rtc
    }

    pub fn fingerprint(&self) -> [u8; HEADER_FINGERPRINT_SIZE] {
        let mut out = [0u8; HEADER_FINGERPRINT_SIZE];
        out.copy_from_slice(&self.rom[HEADER_FINGERPRINT_START..HEADER_FINGERPRINT_START + HEADER_FINGERPRINT_SIZE]);
        out
    }

    pub fn rom_size(&self) -> usize {
        self.rom.len()
    }

    pub fn ram_size(&self) -> usize {
        self.ram.len()
    }

    pub fn ram_data(&self) -> &[u8] {
        &self.ram
    }

    pub fn set_ram_data(&mut self, data: &[u8]) {
        let len = self.ram.len().min(data.len());
        self.ram[..len].copy_from_slice(&data[..len]);
    }

    pub fn sram_dirty(&self) -> bool {
        self.sram_dirty
    }

    pub fn clear_sram_dirty(&mut self) {
        self.sram_dirty = false;
    }

    pub fn set_rumble_cb(&mut self, cb: fn(bool)) {
        self.rumble_cb = cb;
    }

    /// Returns the RTC registers as currently latched, if this cartridge
    /// has one (only meaningful for MBC3).
    pub fn rtc(&self) -> Option<&Rtc> {
        match &self.mbc {
            Mbc::Mbc3(state) => Some(&state.rtc),
            _ => None,
        }
    }

    pub fn rtc_mut(&mut self) -> Option<&mut Rtc> {
        match &mut self.mbc {
            Mbc::Mbc3(state) => Some(&mut state.rtc),
            _ => None,
        }
    }

    pub fn catch_up_rtc(&mut self, seconds: u64) {
        if let Some(rtc) = self.rtc_mut() {
            rtc.catch_up(seconds);
        }
    }

    /// Bank-select registers for whichever MBC this cartridge uses, in a
    /// fixed-width encoding the state serializer can store without caring
    /// which variant is active.
    pub fn mbc_snapshot(&self) -> [u8; 6] {
        match &self.mbc {
            Mbc::None => [0u8; 6],
            Mbc::Mbc1(s) => [s.ram_enabled as u8, s.rom_bank_low5, s.bank2, s.mode, 0, 0],
            Mbc::Mbc2(s) => [s.ram_enabled as u8, s.rom_bank, 0, 0, 0, 0],
            Mbc::Mbc3(s) => [s.ram_enabled as u8, s.rom_bank, s.ram_or_rtc_select, 0, 0, 0],
            Mbc::Mbc5(s) => [
                s.ram_enabled as u8,
                (s.rom_bank & 0xff) as u8,
                (s.rom_bank >> 8) as u8,
                s.ram_bank,
                s.rumble_active as u8,
                0,
            ],
        }
    }

    pub fn restore_mbc_snapshot(&mut self, bytes: [u8; 6]) {
        match &mut self.mbc {
            Mbc::None => {}
            Mbc::Mbc1(s) => {
                s.ram_enabled = bytes[0] != 0;
                s.rom_bank_low5 = bytes[1];
                s.bank2 = bytes[2];
                s.mode = bytes[3];
            }
            Mbc::Mbc2(s) => {
                s.ram_enabled = bytes[0] != 0;
                s.rom_bank = bytes[1];
            }
            Mbc::Mbc3(s) => {
                s.ram_enabled = bytes[0] != 0;
                s.rom_bank = bytes[1];
                s.ram_or_rtc_select = bytes[2];
            }
            Mbc::Mbc5(s) => {
                s.ram_enabled = bytes[0] != 0;
                s.rom_bank = bytes[1] as u16 | ((bytes[2] as u16) << 8);
                s.ram_bank = bytes[3];
                s.rumble_active = bytes[4] != 0;
            }
        }
    }

    fn effective_rom_bank(&self, raw: u32) -> u32 {
        if self.rom_bank_count == 0 {
            return 0;
        }
        raw & (self.rom_bank_count as u32 - 1)
    }

    pub fn read(&self, addr: u16) -> u8 {
        match &self.mbc {
            Mbc::None => self.rom.get(addr as usize).copied().unwrap_or(0xff),
            Mbc::Mbc1(state) => match addr {
                0x0000..=0x3fff => {
                    let bank = if state.mode == 1 {
                        self.effective_rom_bank(((state.bank2 as u32) << 5) & 0x60)
                    } else {
                        0
                    };
                    self.rom_byte(bank, addr)
                }
                0x4000..=0x7fff => {
                    let bank = self.effective_rom_bank(
                        (state.rom_bank_low5 as u32) | ((state.bank2 as u32) << 5),
                    );
                    let bank = if bank & 0x1f == 0 { bank | 1 } else { bank };
                    self.rom_byte(bank, addr)
                }
                _ => 0xff,
            },
            Mbc::Mbc2(state) => match addr {
                0x0000..=0x3fff => self.rom_byte(0, addr),
                0x4000..=0x7fff => {
                    let bank = self.effective_rom_bank(state.rom_bank.max(1) as u32);
                    self.rom_byte(bank, addr)
                }
                _ => 0xff,
            },
            Mbc::Mbc3(state) => match addr {
                0x0000..=0x3fff => self.rom_byte(0, addr),
                0x4000..=0x7fff => {
                    let bank = self.effective_rom_bank(state.rom_bank.max(1) as u32);
                    self.rom_byte(bank, addr)
                }
                _ => 0xff,
            },
            Mbc::Mbc5(state) => match addr {
                0x0000..=0x3fff => self.rom_byte(0, addr),
                0x4000..=0x7fff => {
                    let bank = self.effective_rom_bank(state.rom_bank as u32);
                    self.rom_byte(bank, addr)
                }
                _ => 0xff,
            },
        }
    }

    fn rom_byte(&self, bank: u32, addr: u16) -> u8 {
        self.rom.get(Self::rom_offset_raw(bank, addr)).copied().unwrap_or(0xff)
    }

    fn rom_offset_raw(bank: u32, addr: u16) -> usize {
        let within = if addr < 0x4000 { addr as usize } else { (addr - 0x4000) as usize };
        bank as usize * 0x4000 + within
    }

    /// Absolute offset into the ROM image currently mapped at `addr`,
    /// used by the breakpoint table to stay valid across bank switches.
    pub fn rom_offset(&self, addr: u16) -> Option<usize> {
        if addr > 0x7fff {
            return None;
        }
        let bank = match &self.mbc {
            Mbc::None => 0,
            Mbc::Mbc1(state) => {
                if addr < 0x4000 {
                    if state.mode == 1 {
                        self.effective_rom_bank(((state.bank2 as u32) << 5) & 0x60)
                    } else {
                        0
                    }
                } else {
                    let bank = self.effective_rom_bank(
                        (state.rom_bank_low5 as u32) | ((state.bank2 as u32) << 5),
                    );
                    if bank & 0x1f == 0 {
                        bank | 1
                    } else {
                        bank
                    }
                }
            }
            Mbc::Mbc2(state) => {
                if addr < 0x4000 {
                    0
                } else {
                    self.effective_rom_bank(state.rom_bank.max(1) as u32)
                }
            }
            Mbc::Mbc3(state) => {
                if addr < 0x4000 {
                    0
                } else {
                    self.effective_rom_bank(state.rom_bank.max(1) as u32)
                }
            }
            Mbc::Mbc5(state) => {
                if addr < 0x4000 {
                    0
                } else {
                    self.effective_rom_bank(state.rom_bank as u32)
                }
            }
        };
        Some(Self::rom_offset_raw(bank, addr))
    }

    pub fn rom_byte_raw(&self, offset: usize) -> u8 {
        self.rom.get(offset).copied().unwrap_or(0xff)
    }

    /// Overwrites a single ROM byte in place, returning the previous
    /// value. Used by the breakpoint table to splice in and later
    /// restore its sentinel opcode.
    pub fn patch_rom_byte(&mut self, offset: usize, value: u8) -> u8 {
        match self.rom.get_mut(offset) {
            Some(slot) => std::mem::replace(slot, value),
            None => 0xff,
        }
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        match &mut self.mbc {
            Mbc::None => {
                if addr != 0x2000 {
                    warnln!("Writing to unknown Cartridge ROM location 0x{:04x}", addr);
                }
            }
            Mbc::Mbc1(state) => match addr {
                0x0000..=0x1fff => state.ram_enabled = value & 0x0f == 0x0a,
                0x2000..=0x3fff => {
                    let mut bank = value & 0x1f;
                    if bank == 0 {
                        bank = 1;
                    }
                    state.rom_bank_low5 = bank;
                }
                0x4000..=0x5fff => state.bank2 = value & 0x03,
                0x6000..=0x7fff => state.mode = value & 0x01,
                _ => warnln!("Writing to unknown Cartridge ROM location 0x{:04x}", addr),
            },
            Mbc::Mbc2(state) => match addr {
                0x0000..=0x3fff => {
                    if addr & 0x0100 == 0 {
                        state.ram_enabled = value & 0x0f == 0x0a;
                    } else {
                        let bank = value & 0x0f;
                        state.rom_bank = if bank == 0 { 1 } else { bank };
                    }
                }
                _ => warnln!("Writing to unknown Cartridge ROM location 0x{:04x}", addr),
            },
            Mbc::Mbc3(state) => match addr {
                0x0000..=0x1fff => state.ram_enabled = value & 0x0f == 0x0a,
                0x2000..=0x3fff => {
                    let mut bank = value & 0x7f;
                    if bank == 0 {
                        bank = 1;
                    }
                    state.rom_bank = bank;
                }
                0x4000..=0x5fff => state.ram_or_rtc_select = value,
                0x6000..=0x7fff => state.rtc.latch_write(value),
                _ => warnln!("Writing to unknown Cartridge ROM location 0x{:04x}", addr),
            },
            Mbc::Mbc5(state) => match addr {
                0x0000..=0x1fff => state.ram_enabled = value & 0x0f == 0x0a,
                0x2000..=0x2fff => state.rom_bank = (state.rom_bank & 0x100) | value as u16,
                0x3000..=0x3fff => {
                    state.rom_bank = (state.rom_bank & 0x00ff) | (((value & 0x01) as u16) << 8)
                }
                0x4000..=0x5fff => {
                    if self.has_rumble {
                        let rumble = value & 0x08 != 0;
                        if state.rumble_active != rumble {
                            state.rumble_active = rumble;
                            (self.rumble_cb)(rumble);
                        }
                        state.ram_bank = value & 0x07;
                    } else {
                        state.ram_bank = value & 0x0f;
                    }
                }
                _ => warnln!("Writing to unknown Cartridge ROM location 0x{:04x}", addr),
            },
        }
    }

    pub fn read_ram(&self, addr: u16) -> u8 {
        match &self.mbc {
            Mbc::None => self.ram.get((addr - 0xa000) as usize).copied().unwrap_or(0xff),
            Mbc::Mbc1(state) => {
                if !state.ram_enabled {
                    return 0xff;
                }
                let bank = if state.mode == 1 { state.bank2 } else { 0 };
                self.ram_byte(bank as usize, addr)
            }
            Mbc::Mbc2(state) => {
                if !state.ram_enabled {
                    return 0xff;
                }
                self.ram[((addr - 0xa000) % 512) as usize] | 0xf0
            }
            Mbc::Mbc3(state) => {
                if state.ram_or_rtc_select <= 0x07 {
                    if !state.ram_enabled {
                        return 0xff;
                    }
                    self.ram_byte(state.ram_or_rtc_select as usize, addr)
                } else if (0x08..=0x0c).contains(&state.ram_or_rtc_select) {
                    state.rtc.latched[(state.ram_or_rtc_select - 0x08) as usize]
                } else {
                    0xff
                }
            }
            Mbc::Mbc5(state) => {
                if !state.ram_enabled {
                    return 0xff;
                }
                self.ram_byte(state.ram_bank as usize, addr)
            }
        }
    }

    fn ram_byte(&self, bank: usize, addr: u16) -> u8 {
        let offset = bank * 0x2000 + (addr - 0xa000) as usize;
        self.ram.get(offset).copied().unwrap_or(0xff)
    }

    pub fn write_ram(&mut self, addr: u16, value: u8) {
        let written = match &mut self.mbc {
            Mbc::None => {
                let offset = (addr - 0xa000) as usize;
                self.ram.get_mut(offset).map(|slot| {
                    let changed = *slot != value;
                    *slot = value;
                    changed
                })
            }
            Mbc::Mbc1(state) => {
                if !state.ram_enabled {
                    return;
                }
                let bank = if state.mode == 1 { state.bank2 } else { 0 };
                self.ram_byte_mut(bank as usize, addr, value)
            }
            Mbc::Mbc2(state) => {
                if !state.ram_enabled {
                    return;
                }
                let offset = ((addr - 0xa000) % 512) as usize;
                self.ram.get_mut(offset).map(|slot| {
                    let changed = *slot != (value & 0x0f);
                    *slot = value & 0x0f;
                    changed
                })
            }
            Mbc::Mbc3(state) => {
                if state.ram_or_rtc_select <= 0x07 {
                    if !state.ram_enabled {
                        return;
                    }
                    self.ram_byte_mut(state.ram_or_rtc_select as usize, addr, value)
                } else if (0x08..=0x0c).contains(&state.ram_or_rtc_select) {
                    let mut regs = state.rtc.registers();
                    regs[(state.ram_or_rtc_select - 0x08) as usize] = value;
                    state.rtc.set_registers(regs);
                    None
                } else {
                    None
                }
            }
            Mbc::Mbc5(state) => {
                if !state.ram_enabled {
                    return;
                }
                self.ram_byte_mut(state.ram_bank as usize, addr, value)
            }
        };
        if written == Some(true) {
            self.sram_dirty = true;
        }
    }

    fn ram_byte_mut(&mut self, bank: usize, addr: u16, value: u8) -> Option<bool> {
        let offset = bank * 0x2000 + (addr - 0xa000) as usize;
        self.ram.get_mut(offset).map(|slot| {
            let changed = *slot != value;
            *slot = value;
            changed
        })
    }
}

/// Sets `rtc_last_tick`-style wall clock bookkeeping used by the state
/// serializer's `.sav` RTC-catch-up-on-load behavior.
pub fn seconds_since(last_save: u32) -> u64 {
    get_timestamp().saturating_sub(last_save as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_rom(cart_type: u8, rom_size_byte: u8, banks: u16) -> Vec<u8> {
        let mut data = vec![0u8; banks as usize * 0x4000];
        data[CART_TYPE_ADDR] = cart_type;
        data[ROM_SIZE_ADDR] = rom_size_byte;
        data[RAM_SIZE_ADDR] = 0x00;
        let checksum = Cartridge::compute_checksum(&data);
        data[CHECKSUM_ADDR] = checksum;
        data
    }

    #[test]
    fn test_checksum_validation() {
        let data = build_rom(0x00, 0x00, 2);
        let cart = Cartridge::from_data(&data).unwrap();
        assert!(cart.valid_checksum());

        let mut bad = data.clone();
        bad[CHECKSUM_ADDR] = bad[CHECKSUM_ADDR].wrapping_add(1);
        assert_eq!(
            Cartridge::from_data(&bad).unwrap_err(),
            Error::InitInvalidChecksum
        );
    }

    #[test]
    fn test_mbc1_bank_wrap() {
        let data = build_rom(0x01, 0x01, 4); // 64 KiB, 4 banks
        let mut cart = Cartridge::from_data(&data).unwrap();

        cart.write(0x2000, 0x00);
        assert_eq!(cart.rom_byte_for_test(), 1);

        cart.write(0x2000, 0x05);
        assert_eq!(cart.rom_byte_for_test(), 1);

        cart.write(0x2000, 0x02);
        assert_eq!(cart.rom_byte_for_test(), 2);
    }

    impl Cartridge {
        fn rom_byte_for_test(&self) -> u32 {
            match &self.mbc {
                Mbc::Mbc1(state) => {
                    self.effective_rom_bank((state.rom_bank_low5 as u32) | ((state.bank2 as u32) << 5))
                }
                _ => unreachable!(),
            }
        }
    }

    #[test]
    fn test_mbc3_rtc_latch_reads_snapshot_not_live() {
        let data = build_rom(0x10, 0x00, 2);
        let mut cart = Cartridge::from_data(&data).unwrap();
        cart.write(0x0000, 0x0a); // enable RAM/RTC
        cart.write(0x4000, 0x08); // select RTC seconds register

        if let Mbc::Mbc3(state) = &mut cart.mbc {
            state.rtc.seconds = 5;
        }
        cart.write(0x6000, 0x00);
        cart.write(0x6000, 0x01); // latch

        if let Mbc::Mbc3(state) = &mut cart.mbc {
            state.rtc.seconds = 9;
        }

        assert_eq!(cart.read_ram(0xa000), 5);
    }

    #[test]
    fn test_rtc_day_rollover_sets_overflow_bit() {
        let mut rtc = Rtc {
            day_low: 0xff,
            day_high: 0x01,
            ..Default::default()
        };
        rtc.hours = 23;
        rtc.minutes = 59;
        rtc.seconds = 59;
        rtc.tick_one_second();
        assert_eq!(rtc.day_low, 0);
        assert_eq!(rtc.day_high & 0x01, 0);
        assert_eq!(rtc.day_high & 0x80, 0x80);
    }

    #[test]
    fn test_unsupported_cartridge_type_rejected() {
        let data = build_rom(0x20, 0x00, 2);
        assert!(matches!(
            Cartridge::from_data(&data),
            Err(Error::InitCartridgeUnsupported(0x20))
        ));
    }
}
