use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// Mirrors `DigitalInput::sample`'s rising-edge arithmetic without a
/// live `HardwareLink`, the same way the primitive module's own unit
/// tests stand in for a real panel. This is the per-tick cost paid
/// twice per [`operant_suite::panel::SAMPLE_PERIOD`] tick, on every
/// chamber, for the lifetime of a session.
fn rising_edge(last_level: &mut bool, pending: &mut bool, level: bool) {
    if level && !*last_level {
        *pending = true;
    }
    *last_level = level;
}

fn poll_tick_bench(c: &mut Criterion) {
    let levels: Vec<bool> = (0..10_000).map(|i| i % 7 == 0).collect();

    c.bench_function("digital_input_edge_detect_10k_samples", |b| {
        b.iter(|| {
            let mut last_level = false;
            let mut pending = false;
            for level in levels.iter().copied() {
                rising_edge(&mut last_level, &mut pending, black_box(level));
            }
            black_box(pending)
        })
    });
}

criterion_group!(benches, poll_tick_bench);
criterion_main!(benches);
