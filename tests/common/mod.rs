//! Shared builders for the window-pipeline integration tests.

#![allow(dead_code)]

use popwin::{
    ErrorModel, PileupColumn, ReadObservation, RunParams, SampleRegistry, Window, WindowDriver,
};

/// A registry of `n` samples `s0..s{n-1}` in one population.
pub fn single_pop_registry(n: usize) -> SampleRegistry {
    SampleRegistry::from_assignments((0..n).map(|i| (format!("s{i}"), "pop".to_string())))
        .expect("valid registry")
}

/// A pileup column where samples whose bit is set in `pattern` carry
/// unanimous G reads and every other sample carries unanimous A reads.
///
/// Ten reads per sample at base quality 40 and mapping quality 60 keep every
/// call comfortably above the default confidence and RMS thresholds.
pub fn pattern_column(pos: u64, num_samples: usize, pattern: u64) -> PileupColumn {
    let mut col = PileupColumn::new(pos);
    for sample in 0..num_samples {
        let base = if (pattern >> sample) & 1 == 1 { b'G' } else { b'A' };
        for _ in 0..10 {
            col.push(ReadObservation::from_ascii(sample, base, 40, 60, false).expect("ACGT base"));
        }
    }
    col
}

/// Run the given columns through a fresh driver over `[beg, end)` against an
/// all-A reference and return the accumulated window.
pub fn fill_window(
    registry: &SampleRegistry,
    params: &RunParams,
    beg: u64,
    end: u64,
    columns: &[PileupColumn],
) -> Window {
    let model = ErrorModel::new(params.depcorr).expect("valid depcorr");
    let mut driver = WindowDriver::new(&model, registry, params);
    driver.start_window(beg, end);
    for col in columns {
        driver.process_column(col, b'A');
    }
    driver.window().clone()
}
