//! Window-pipeline benchmarks: the per-column calling path and the LD
//! statistics over a realistic segregating-site load.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use popwin::stats::compute_ld;
use popwin::{
    ErrorModel, LdKind, PileupColumn, ReadObservation, RunParams, SampleRegistry, WindowDriver,
};

fn registry(n: usize) -> SampleRegistry {
    SampleRegistry::from_assignments((0..n).map(|i| (format!("s{i}"), "pop".to_string())))
        .expect("valid registry")
}

fn column(pos: u64, num_samples: usize, pattern: u64, depth: usize) -> PileupColumn {
    let mut col = PileupColumn::new(pos);
    for sample in 0..num_samples {
        let base = if (pattern >> sample) & 1 == 1 { b'G' } else { b'A' };
        for _ in 0..depth {
            col.push(ReadObservation::from_ascii(sample, base, 40, 60, false).expect("ACGT base"));
        }
    }
    col
}

fn benchmark_process_column(c: &mut Criterion) {
    let registry = registry(32);
    let params = RunParams {
        seed: Some(42),
        ..RunParams::default()
    };
    let model = ErrorModel::new(params.depcorr).expect("valid depcorr");
    let col = column(500, 32, 0x0000_ffff, 20);

    c.bench_function("process_column_32x20", |b| {
        let mut driver = WindowDriver::new(&model, &registry, &params);
        b.iter(|| {
            driver.start_window(0, 1000);
            driver.process_column(black_box(&col), b'A');
        });
    });
}

fn benchmark_ld(c: &mut Criterion) {
    let registry = registry(32);
    let params = RunParams {
        seed: Some(42),
        ..RunParams::default()
    };
    let model = ErrorModel::new(params.depcorr).expect("valid depcorr");

    let mut driver = WindowDriver::new(&model, &registry, &params);
    driver.start_window(0, 10_000);
    for i in 0..100u64 {
        // Vary the bipartition so pairwise r2 stays non-trivial.
        let pattern = 0x0000_ffffu64.rotate_left((i % 16) as u32) & 0xffff_ffff;
        driver.process_column(&column(i * 100, 32, pattern, 20), b'A');
    }
    let window = driver.window().clone();

    c.bench_function("zns_100_sites", |b| {
        b.iter(|| black_box(compute_ld(LdKind::Zns, &window, &registry, &params)));
    });
    c.bench_function("omega_max_100_sites", |b| {
        b.iter(|| black_box(compute_ld(LdKind::OmegaMax, &window, &registry, &params)));
    });
}

criterion_group!(benches, benchmark_process_column, benchmark_ld);
criterion_main!(benches);
