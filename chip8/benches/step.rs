use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chip8::{prelude::*, NullDiagnostics};

/// Draws random glyphs across the screen forever.
#[rustfmt::skip]
const SCRIBBLE: &[u8] = &[
    0xC0, 0x0F, // 0x200: RND v0, 15
    0xF0, 0x29, // 0x202: LD F, v0
    0xC1, 0x3F, // 0x204: RND v1, 63
    0xC2, 0x1F, // 0x206: RND v2, 31
    0xD1, 0x25, // 0x208: DRW v1, v2, 5
    0x12, 0x00, // 0x20A: JP 0x200
];

fn criterion_benchmark(c: &mut Criterion) {
    let conf = Chip8Conf {
        rng_seed: Some(1),
        ..Chip8Conf::default()
    };
    let mut vm = Chip8Vm::with_diagnostics(conf, Box::new(NullDiagnostics));
    vm.load_bytecode(SCRIBBLE).unwrap();

    c.bench_function("scribble step", |b| {
        b.iter(|| {
            for _ in 0..black_box(1000_usize) {
                black_box(vm.step()).unwrap();
            }
        })
    });

    let mut now = 0;
    c.bench_function("scribble tick", |b| {
        b.iter(|| {
            now += 4;
            black_box(vm.tick(black_box(now))).unwrap();
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
