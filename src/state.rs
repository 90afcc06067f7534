//! Save-state serializer: encodes/decodes the full machine snapshot
//! described by [`crate::machine::Machine::save_state`] /
//! [`crate::machine::Machine::load_state`].
//!
//! The wire format is a fixed header, then a flat machine-state struct
//! (CPU, timer, PPU, interrupts, APU, pad, serial, cartridge banking and
//! RTC), then the ROM-header fingerprint, then the bulk memory regions
//! (WRAM, VRAM, OAM, HRAM, optional debug-RAM, cart RAM) and finally the
//! breakpoint table. Validation (magic, version, endianness, pointer
//! width, cart-RAM size, fingerprint) happens entirely while decoding
//! into a local [`Snapshot`] value — nothing is written into the target
//! [`crate::machine::Machine`] until every check has passed, so a
//! rejected load leaves it untouched.

use std::io::Cursor;

use crate::{
    cartridge::HEADER_FINGERPRINT_SIZE,
    consts::{DEBUG_RAM_SIZE, HRAM_SIZE, OAM_SIZE, VRAM_SIZE, WRAM_SIZE},
    data::{read_bytes, read_u16, read_u32, read_u8, write_bytes, write_u16, write_u32, write_u8},
    error::Error,
    machine::Machine,
    pad::PadSelection,
    ppu::{PpuMode, PpuSnapshot},
    timer::TimerInternalState,
    util,
};

const MAGIC: [u8; 8] = [0xfa, 0x43, 0x42, b's', b'a', b'v', b'\n', 0x1a];
const VERSION: u8 = 0;
const ENDIAN_LITTLE: u8 = 0;

const MAX_BREAKPOINTS: usize = 128;
/// Sentinel marking an unused breakpoint-table slot. Unreachable for a
/// real ROM offset, since the largest supported ROM is 8 MiB (0x7FFFFF).
const BREAKPOINT_SLOT_EMPTY: u32 = 0x00ff_ffff;

struct CpuState {
    pc: u16,
    sp: u16,
    a: u8,
    b: u8,
    c: u8,
    d: u8,
    e: u8,
    h: u8,
    l: u8,
    f: u8,
    ime: bool,
    ime_scheduled: bool,
    halted: bool,
    stopped: bool,
    boot_active: bool,
}

struct CartridgeState {
    mbc: [u8; 6],
    rtc: [u8; 11],
}

/// Fully decoded snapshot, built up while validating a load and only
/// applied to the live machine once every check passes.
struct Snapshot {
    fingerprint: Vec<u8>,
    cpu: CpuState,
    timer: TimerInternalState,
    ppu: PpuSnapshot,
    i_f: u8,
    i_e: u8,
    apu_registers: Vec<u8>,
    pad_keys: [bool; 8],
    pad_selection: PadSelection,
    serial_sb: u8,
    serial_sc: u8,
    cartridge: CartridgeState,
    wram: Vec<u8>,
    vram: Vec<u8>,
    oam: Vec<u8>,
    hram: Vec<u8>,
    debug_ram: Vec<u8>,
    cart_ram: Vec<u8>,
    breakpoints: Vec<(usize, u8)>,
}

fn ppu_mode_from_u8(value: u8) -> PpuMode {
    match value {
        0 => PpuMode::HBlank,
        1 => PpuMode::VBlank,
        2 => PpuMode::OamSearch,
        _ => PpuMode::Transfer,
    }
}

fn pad_selection_from_u8(value: u8) -> PadSelection {
    match value {
        0 => PadSelection::Action,
        1 => PadSelection::Direction,
        2 => PadSelection::Both,
        _ => PadSelection::None,
    }
}

pub fn save_snapshot(machine: &Machine) -> Vec<u8> {
    let mut buffer = Vec::new();
    let mut cursor = Cursor::new(&mut buffer);

    write_bytes(&mut cursor, &MAGIC).unwrap();
    write_u8(&mut cursor, VERSION).unwrap();
    write_u8(&mut cursor, ENDIAN_LITTLE).unwrap();
    write_u8(&mut cursor, std::mem::size_of::<usize>() as u8).unwrap();
    write_u8(&mut cursor, 0).unwrap(); // reserved
    write_u32(&mut cursor, util::get_timestamp() as u32).unwrap();
    write_u8(&mut cursor, 0).unwrap(); // script-flag: no attached script

    let cpu = &machine.cpu;
    write_u16(&mut cursor, cpu.pc).unwrap();
    write_u16(&mut cursor, cpu.sp).unwrap();
    write_u8(&mut cursor, cpu.a).unwrap();
    write_u8(&mut cursor, cpu.b).unwrap();
    write_u8(&mut cursor, cpu.c).unwrap();
    write_u8(&mut cursor, cpu.d).unwrap();
    write_u8(&mut cursor, cpu.e).unwrap();
    write_u8(&mut cursor, cpu.h).unwrap();
    write_u8(&mut cursor, cpu.l).unwrap();
    write_u8(&mut cursor, cpu.f()).unwrap();
    write_u8(&mut cursor, cpu.ime() as u8).unwrap();
    write_u8(&mut cursor, cpu.ime_scheduled() as u8).unwrap();
    write_u8(&mut cursor, cpu.halted() as u8).unwrap();
    write_u8(&mut cursor, cpu.stopped() as u8).unwrap();
    write_u8(&mut cursor, cpu.mmu.boot_active() as u8).unwrap();

    let timer = cpu.mmu.timer.internal_snapshot();
    write_u8(&mut cursor, timer.div).unwrap();
    write_u8(&mut cursor, timer.tima).unwrap();
    write_u8(&mut cursor, timer.tma).unwrap();
    write_u8(&mut cursor, timer.tac).unwrap();
    write_u16(&mut cursor, timer.div_clock).unwrap();
    write_u16(&mut cursor, timer.tima_clock).unwrap();

    let ppu = cpu.mmu.ppu.snapshot();
    write_u8(&mut cursor, ppu.scy).unwrap();
    write_u8(&mut cursor, ppu.scx).unwrap();
    write_u8(&mut cursor, ppu.wy).unwrap();
    write_u8(&mut cursor, ppu.wx).unwrap();
    write_u8(&mut cursor, ppu.ly).unwrap();
    write_u8(&mut cursor, ppu.lyc).unwrap();
    write_u8(&mut cursor, ppu.bgp).unwrap();
    write_u8(&mut cursor, ppu.obp0).unwrap();
    write_u8(&mut cursor, ppu.obp1).unwrap();
    write_u8(&mut cursor, ppu.switch_bg as u8).unwrap();
    write_u8(&mut cursor, ppu.switch_obj as u8).unwrap();
    write_u8(&mut cursor, ppu.obj_size_16 as u8).unwrap();
    write_u8(&mut cursor, ppu.bg_map_hi as u8).unwrap();
    write_u8(&mut cursor, ppu.bg_tile_unsigned as u8).unwrap();
    write_u8(&mut cursor, ppu.switch_window as u8).unwrap();
    write_u8(&mut cursor, ppu.window_map_hi as u8).unwrap();
    write_u8(&mut cursor, ppu.switch_lcd as u8).unwrap();
    write_u8(&mut cursor, ppu.stat_hblank_int as u8).unwrap();
    write_u8(&mut cursor, ppu.stat_vblank_int as u8).unwrap();
    write_u8(&mut cursor, ppu.stat_oam_int as u8).unwrap();
    write_u8(&mut cursor, ppu.stat_lyc_int as u8).unwrap();
    write_u8(&mut cursor, ppu.coincidence as u8).unwrap();
    write_u8(&mut cursor, ppu.mode as u8).unwrap();
    write_u16(&mut cursor, ppu.mode_clock).unwrap();
    write_u8(&mut cursor, ppu.window_counter).unwrap();
    write_u8(&mut cursor, ppu.first_frame as u8).unwrap();

    write_u8(&mut cursor, cpu.mmu.ints.read_if()).unwrap();
    write_u8(&mut cursor, cpu.mmu.ints.read_ie()).unwrap();

    write_bytes(&mut cursor, cpu.mmu.apu.raw_registers()).unwrap();

    let (keys, selection) = cpu.mmu.pad.key_snapshot();
    for key in keys {
        write_u8(&mut cursor, key as u8).unwrap();
    }
    write_u8(&mut cursor, selection as u8).unwrap();

    write_u8(&mut cursor, cpu.mmu.serial.read(crate::consts::SB_ADDR)).unwrap();
    write_u8(&mut cursor, cpu.mmu.serial.read(crate::consts::SC_ADDR)).unwrap();

    write_bytes(&mut cursor, &cpu.mmu.cartridge.mbc_snapshot()).unwrap();
    let rtc_bytes = match cpu.mmu.cartridge.rtc() {
        Some(rtc) => {
            let mut out = [0u8; 11];
            out[0] = rtc.seconds;
            out[1] = rtc.minutes;
            out[2] = rtc.hours;
            out[3] = rtc.day_low;
            out[4] = rtc.day_high;
            out[5..10].copy_from_slice(&rtc.latched());
            out[10] = rtc.latch_state();
            out
        }
        None => [0u8; 11],
    };
    write_bytes(&mut cursor, &rtc_bytes).unwrap();

    write_bytes(&mut cursor, &cpu.mmu.cartridge.fingerprint()).unwrap();

    write_bytes(&mut cursor, cpu.mmu.wram()).unwrap();
    write_bytes(&mut cursor, cpu.mmu.ppu.vram()).unwrap();
    write_bytes(&mut cursor, cpu.mmu.ppu.oam()).unwrap();
    write_bytes(&mut cursor, cpu.mmu.hram()).unwrap();

    #[cfg(feature = "debug-ram")]
    write_bytes(&mut cursor, cpu.mmu.debug_ram()).unwrap();
    #[cfg(not(feature = "debug-ram"))]
    write_bytes(&mut cursor, &[0u8; DEBUG_RAM_SIZE]).unwrap();

    write_bytes(&mut cursor, cpu.mmu.cartridge.ram_data()).unwrap();

    let entries = machine.breakpoints.entries();
    for slot in 0..MAX_BREAKPOINTS {
        let packed = match entries.get(slot) {
            Some(bp) => (bp.rom_offset as u32 & 0x00ff_ffff) | ((bp.saved_opcode as u32) << 24),
            None => BREAKPOINT_SLOT_EMPTY | ((0u32) << 24),
        };
        write_u32(&mut cursor, packed).unwrap();
    }

    buffer
}

fn decode(data: &[u8], cart_ram_size: usize) -> Result<Snapshot, Error> {
    let mut cursor = Cursor::new(data);

    let magic = read_bytes(&mut cursor, MAGIC.len())?;
    if magic != MAGIC {
        return Err(Error::StateMagicMismatch);
    }
    if read_u8(&mut cursor)? != VERSION {
        return Err(Error::StateVersionMismatch);
    }
    if read_u8(&mut cursor)? != ENDIAN_LITTLE {
        return Err(Error::StateEndianMismatch);
    }
    if read_u8(&mut cursor)? != std::mem::size_of::<usize>() as u8 {
        return Err(Error::StatePointerWidthMismatch);
    }
    let _reserved = read_u8(&mut cursor)?;
    let _timestamp = read_u32(&mut cursor)?;
    let _script_flag = read_u8(&mut cursor)?;

    let cpu = CpuState {
        pc: read_u16(&mut cursor)?,
        sp: read_u16(&mut cursor)?,
        a: read_u8(&mut cursor)?,
        b: read_u8(&mut cursor)?,
        c: read_u8(&mut cursor)?,
        d: read_u8(&mut cursor)?,
        e: read_u8(&mut cursor)?,
        h: read_u8(&mut cursor)?,
        l: read_u8(&mut cursor)?,
        f: read_u8(&mut cursor)?,
        ime: read_u8(&mut cursor)? != 0,
        ime_scheduled: read_u8(&mut cursor)? != 0,
        halted: read_u8(&mut cursor)? != 0,
        stopped: read_u8(&mut cursor)? != 0,
        boot_active: read_u8(&mut cursor)? != 0,
    };

    let timer = TimerInternalState {
        div: read_u8(&mut cursor)?,
        tima: read_u8(&mut cursor)?,
        tma: read_u8(&mut cursor)?,
        tac: read_u8(&mut cursor)?,
        div_clock: read_u16(&mut cursor)?,
        tima_clock: read_u16(&mut cursor)?,
    };

    let ppu = PpuSnapshot {
        scy: read_u8(&mut cursor)?,
        scx: read_u8(&mut cursor)?,
        wy: read_u8(&mut cursor)?,
        wx: read_u8(&mut cursor)?,
        ly: read_u8(&mut cursor)?,
        lyc: read_u8(&mut cursor)?,
        bgp: read_u8(&mut cursor)?,
        obp0: read_u8(&mut cursor)?,
        obp1: read_u8(&mut cursor)?,
        switch_bg: read_u8(&mut cursor)? != 0,
        switch_obj: read_u8(&mut cursor)? != 0,
        obj_size_16: read_u8(&mut cursor)? != 0,
        bg_map_hi: read_u8(&mut cursor)? != 0,
        bg_tile_unsigned: read_u8(&mut cursor)? != 0,
        switch_window: read_u8(&mut cursor)? != 0,
        window_map_hi: read_u8(&mut cursor)? != 0,
        switch_lcd: read_u8(&mut cursor)? != 0,
        stat_hblank_int: read_u8(&mut cursor)? != 0,
        stat_vblank_int: read_u8(&mut cursor)? != 0,
        stat_oam_int: read_u8(&mut cursor)? != 0,
        stat_lyc_int: read_u8(&mut cursor)? != 0,
        coincidence: read_u8(&mut cursor)? != 0,
        mode: ppu_mode_from_u8(read_u8(&mut cursor)?),
        mode_clock: read_u16(&mut cursor)?,
        window_counter: read_u8(&mut cursor)?,
        first_frame: read_u8(&mut cursor)? != 0,
    };

    let i_f = read_u8(&mut cursor)?;
    let i_e = read_u8(&mut cursor)?;

    let apu_registers = read_bytes(&mut cursor, 48)?;

    let mut pad_keys = [false; 8];
    for slot in pad_keys.iter_mut() {
        *slot = read_u8(&mut cursor)? != 0;
    }
    let pad_selection = pad_selection_from_u8(read_u8(&mut cursor)?);

    let serial_sb = read_u8(&mut cursor)?;
    let serial_sc = read_u8(&mut cursor)?;

    let mbc_bytes = read_bytes(&mut cursor, 6)?;
    let mut mbc = [0u8; 6];
    mbc.copy_from_slice(&mbc_bytes);
    let rtc_bytes = read_bytes(&mut cursor, 11)?;
    let mut rtc = [0u8; 11];
    rtc.copy_from_slice(&rtc_bytes);
    let cartridge = CartridgeState { mbc, rtc };

    let fingerprint = read_bytes(&mut cursor, HEADER_FINGERPRINT_SIZE)?;

    let wram = read_bytes(&mut cursor, WRAM_SIZE)?;
    let vram = read_bytes(&mut cursor, VRAM_SIZE)?;
    let oam = read_bytes(&mut cursor, OAM_SIZE)?;
    let hram = read_bytes(&mut cursor, HRAM_SIZE)?;
    let debug_ram = read_bytes(&mut cursor, DEBUG_RAM_SIZE)?;
    let cart_ram = read_bytes(&mut cursor, cart_ram_size)?;

    let mut breakpoints = Vec::new();
    for _ in 0..MAX_BREAKPOINTS {
        let packed = read_u32(&mut cursor)?;
        let rom_offset = (packed & 0x00ff_ffff) as usize;
        let saved_opcode = (packed >> 24) as u8;
        if (packed & 0x00ff_ffff) != BREAKPOINT_SLOT_EMPTY {
            breakpoints.push((rom_offset, saved_opcode));
        }
    }

    Ok(Snapshot {
        fingerprint,
        cpu,
        timer,
        ppu,
        i_f,
        i_e,
        apu_registers,
        pad_keys,
        pad_selection,
        serial_sb,
        serial_sc,
        cartridge,
        wram,
        vram,
        oam,
        hram,
        debug_ram,
        cart_ram,
        breakpoints,
    })
}

pub fn load_snapshot(machine: &mut Machine, data: &[u8]) -> Result<(), Error> {
    let cart_ram_size = machine.cpu.mmu.cartridge.ram_size();
    let snapshot = decode(data, cart_ram_size)?;

    if snapshot.fingerprint != machine.cpu.mmu.cartridge.fingerprint() {
        return Err(Error::StateFingerprintMismatch);
    }
    if snapshot.cart_ram.len() != cart_ram_size {
        return Err(Error::StateSramSizeMismatch);
    }

    apply(machine, snapshot);
    Ok(())
}

fn apply(machine: &mut Machine, snapshot: Snapshot) {
    {
        let cpu = &mut machine.cpu;
        cpu.pc = snapshot.cpu.pc;
        cpu.sp = snapshot.cpu.sp;
        cpu.a = snapshot.cpu.a;
        cpu.b = snapshot.cpu.b;
        cpu.c = snapshot.cpu.c;
        cpu.d = snapshot.cpu.d;
        cpu.e = snapshot.cpu.e;
        cpu.h = snapshot.cpu.h;
        cpu.l = snapshot.cpu.l;
        cpu.set_f(snapshot.cpu.f);
        cpu.set_ime(snapshot.cpu.ime);
        cpu.set_ime_scheduled(snapshot.cpu.ime_scheduled);
        cpu.set_halted(snapshot.cpu.halted);
        cpu.set_stopped(snapshot.cpu.stopped);

        cpu.mmu.timer.restore_internal(snapshot.timer);
        cpu.mmu.ppu.restore(snapshot.ppu);

        cpu.mmu.ints.write_if(snapshot.i_f);
        cpu.mmu.ints.write_ie(snapshot.i_e);

        cpu.mmu.apu.set_raw_registers(&snapshot.apu_registers);
        cpu.mmu
            .pad
            .restore_keys(snapshot.pad_keys, snapshot.pad_selection);

        cpu.mmu.serial.write(crate::consts::SB_ADDR, snapshot.serial_sb);
        cpu.mmu.serial.write(crate::consts::SC_ADDR, snapshot.serial_sc);

        cpu.mmu.cartridge.restore_mbc_snapshot(snapshot.cartridge.mbc);
        if let Some(rtc) = cpu.mmu.cartridge.rtc_mut() {
            let regs = snapshot.cartridge.rtc;
            rtc.seconds = regs[0];
            rtc.minutes = regs[1];
            rtc.hours = regs[2];
            rtc.day_low = regs[3];
            rtc.day_high = regs[4];
            let mut latched = [0u8; 5];
            latched.copy_from_slice(&regs[5..10]);
            rtc.set_latched(latched);
            rtc.set_latch_state(regs[10]);
        }

        cpu.mmu.set_wram(&snapshot.wram);
        cpu.mmu.ppu.set_vram(&snapshot.vram);
        cpu.mmu.ppu.set_oam(&snapshot.oam);
        cpu.mmu.set_hram(&snapshot.hram);

        #[cfg(feature = "debug-ram")]
        cpu.mmu.set_debug_ram(&snapshot.debug_ram);
        #[cfg(not(feature = "debug-ram"))]
        let _ = &snapshot.debug_ram;

        cpu.mmu.cartridge.set_ram_data(&snapshot.cart_ram);

        cpu.mmu.set_boot_active(snapshot.cpu.boot_active);
    }

    machine.breakpoints.reset();
    for (rom_offset, saved_opcode) in snapshot.breakpoints {
        machine
            .cpu
            .mmu
            .cartridge
            .patch_rom_byte(rom_offset, crate::consts::BREAKPOINT_OPCODE);
        machine.breakpoints.restore_entry(rom_offset, saved_opcode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::BOOT_SIZE_DMG;

    fn build_rom() -> Vec<u8> {
        let mut data = vec![0u8; 0x8000];
        data[0x148] = 0x00; // 2 banks (32 KiB)
        let mut sum: u8 = 0;
        for &byte in &data[0x134..=0x14c] {
            sum = sum.wrapping_sub(byte).wrapping_sub(1);
        }
        data[0x14d] = sum;
        data
    }

    #[test]
    fn test_round_trip_preserves_cpu_and_ppu_state() {
        let rom = build_rom();
        let mut machine = Machine::new(&rom, None::<[u8; BOOT_SIZE_DMG]>).unwrap();
        machine.cpu.a = 0x42;
        machine.cpu.pc = 0x1234;
        machine.cpu.mmu.ppu.write(crate::consts::SCY_ADDR, 0x55, &mut machine.cpu.mmu.ints);

        let data = machine.save_state();

        let mut reloaded = Machine::new(&rom, None::<[u8; BOOT_SIZE_DMG]>).unwrap();
        reloaded.load_state(&data).unwrap();

        assert_eq!(reloaded.cpu.a, 0x42);
        assert_eq!(reloaded.cpu.pc, 0x1234);
        assert_eq!(reloaded.cpu.mmu.ppu.read(crate::consts::SCY_ADDR), 0x55);
    }

    #[test]
    fn test_load_rejects_bad_magic() {
        let rom = build_rom();
        let mut machine = Machine::new(&rom, None::<[u8; BOOT_SIZE_DMG]>).unwrap();
        let mut data = machine.save_state();
        data[0] ^= 0xff;
        assert_eq!(machine.load_state(&data), Err(Error::StateMagicMismatch));
    }

    #[test]
    fn test_load_rejects_fingerprint_mismatch_from_different_rom() {
        let rom_a = build_rom();
        let mut rom_b = build_rom();
        rom_b[0x134] ^= 0xff;
        let mut sum: u8 = 0;
        for &byte in &rom_b[0x134..=0x14c] {
            sum = sum.wrapping_sub(byte).wrapping_sub(1);
        }
        rom_b[0x14d] = sum;

        let machine_a = Machine::new(&rom_a, None::<[u8; BOOT_SIZE_DMG]>).unwrap();
        let data = machine_a.save_state();

        let mut machine_b = Machine::new(&rom_b, None::<[u8; BOOT_SIZE_DMG]>).unwrap();
        assert_eq!(
            machine_b.load_state(&data),
            Err(Error::StateFingerprintMismatch)
        );
    }

    #[test]
    fn test_failed_load_leaves_machine_unmodified() {
        let rom = build_rom();
        let mut machine = Machine::new(&rom, None::<[u8; BOOT_SIZE_DMG]>).unwrap();
        machine.cpu.a = 0x77;
        let mut data = machine.save_state();
        data[0] ^= 0xff;

        let before = machine.cpu.a;
        assert!(machine.load_state(&data).is_err());
        assert_eq!(machine.cpu.a, before);
    }
}
