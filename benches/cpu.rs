use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dmgcore::Machine;

fn build_bench_rom() -> Vec<u8> {
    // 32 KiB ROM whose reset vector is a tight `JR -2` spin loop, so the
    // benchmark measures raw CPU/MMU dispatch cost rather than any
    // particular game's instruction mix.
    let mut data = vec![0u8; 0x8000];
    data[0x148] = 0x01;
    data[0x0100] = 0x18; // JR
    data[0x0101] = 0xfe; // -2

    let mut sum: u8 = 0;
    for &byte in &data[0x134..=0x14c] {
        sum = sum.wrapping_sub(byte).wrapping_sub(1);
    }
    data[0x14d] = sum;
    data
}

fn benchmark_run_frame(c: &mut Criterion) {
    let rom = build_bench_rom();
    let mut machine = Machine::new(&rom, None).unwrap();

    c.bench_function("run_frame", |b| {
        b.iter(|| {
            black_box(machine.run_frame()).unwrap();
        })
    });
}

criterion_group!(benches, benchmark_run_frame);
criterion_main!(benches);
