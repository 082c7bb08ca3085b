//! Per-window buffers and the per-position calling pipeline.
//!
//! The driver owns one reusable [`Window`] plus per-sample scratch space.
//! Each pileup column is fully processed (likelihoods, consensus call,
//! classification, bit-vector append) before the next is requested; windows
//! run strictly sequentially and `reset` keeps buffer capacity across them.

use bitvec::prelude::*;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tracing::{debug, trace};

use crate::consensus::{
    clean_heterozygotes, classify_site, encode_consensus, qual_filter, site_type, CallWord,
    Segregation,
};
use crate::errmod::ErrorModel;
use crate::pileup::{base_code, PileupColumn, ReadObservation};
use crate::sample::{SampleRegistry, MAX_POPULATIONS};
use crate::RunParams;

/// One bit per population: which populations met their coverage threshold at
/// a given aligned site.
pub type PopCoverageRow = BitArr!(for MAX_POPULATIONS, in u32);

/// Accumulated state for one genomic window `[beg, end)`.
///
/// Site types are appended in genomic order and never mutated afterwards;
/// all buffers are reset, not reallocated, at window boundaries.
#[derive(Debug, Clone)]
pub struct Window {
    beg: u64,
    end: u64,
    npops: usize,
    num_sites: usize,
    site_types: Vec<u64>,
    pop_cov: Vec<PopCoverageRow>,
    /// Per-segsite local coverage counts, `npops` entries per site.
    ncov: Vec<u16>,
}

impl Window {
    /// Create an empty window for a fixed number of populations.
    pub fn new(npops: usize) -> Self {
        Self {
            beg: 0,
            end: 0,
            npops,
            num_sites: 0,
            site_types: Vec::new(),
            pop_cov: Vec::new(),
            ncov: Vec::new(),
        }
    }

    /// Reset to a new interval, retaining allocated capacity.
    pub fn reset(&mut self, beg: u64, end: u64) {
        self.beg = beg;
        self.end = end;
        self.num_sites = 0;
        self.site_types.clear();
        self.pop_cov.clear();
        self.ncov.clear();
        let length = (end.saturating_sub(beg)) as usize;
        self.site_types.reserve(length);
        self.pop_cov.reserve(length);
    }

    /// Window start (inclusive).
    pub fn beg(&self) -> u64 {
        self.beg
    }

    /// Window end (exclusive).
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Window length in bases.
    pub fn len(&self) -> usize {
        (self.end - self.beg) as usize
    }

    /// Whether the interval is empty.
    pub fn is_empty(&self) -> bool {
        self.end == self.beg
    }

    /// Number of aligned sites (any population covered).
    pub fn num_sites(&self) -> usize {
        self.num_sites
    }

    /// Number of segregating sites recorded so far.
    pub fn segsites(&self) -> usize {
        self.site_types.len()
    }

    /// Site-type bit-vectors, one per segregating site, in genomic order.
    pub fn site_types(&self) -> &[u64] {
        &self.site_types
    }

    /// Per-aligned-site population coverage rows.
    pub fn pop_cov(&self) -> &[PopCoverageRow] {
        &self.pop_cov
    }

    /// Local coverage of a population at a segregating site.
    pub fn ncov(&self, segsite: usize, pop: usize) -> u16 {
        self.ncov[segsite * self.npops + pop]
    }

    pub(crate) fn push_aligned(&mut self, coverage: PopCoverageRow) {
        self.pop_cov.push(coverage);
        self.num_sites += 1;
    }

    pub(crate) fn push_segregating(&mut self, site_type: u64, ncov: &[u16]) {
        debug_assert_eq!(ncov.len(), self.npops);
        self.site_types.push(site_type);
        self.ncov.extend_from_slice(ncov);
    }
}

/// Streams pileup columns through the calling pipeline into a [`Window`].
#[derive(Debug)]
pub struct WindowDriver<'a> {
    model: &'a ErrorModel,
    registry: &'a SampleRegistry,
    params: &'a RunParams,
    window: Window,
    rng: SmallRng,
    calls: Vec<CallWord>,
    sample_obs: Vec<Vec<ReadObservation>>,
    ncov_scratch: Vec<u16>,
}

impl<'a> WindowDriver<'a> {
    /// Create a driver bound to shared, read-only run state.
    pub fn new(model: &'a ErrorModel, registry: &'a SampleRegistry, params: &'a RunParams) -> Self {
        let rng = match params.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        let n = registry.num_samples();
        let npops = registry.num_populations();
        Self {
            model,
            registry,
            params,
            window: Window::new(npops),
            rng,
            calls: Vec::with_capacity(n),
            sample_obs: vec![Vec::new(); n],
            ncov_scratch: vec![0; npops],
        }
    }

    /// Begin a new window, discarding state from the previous one.
    pub fn start_window(&mut self, beg: u64, end: u64) {
        self.window.reset(beg, end);
    }

    /// The window accumulated so far.
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Process one pileup column.
    ///
    /// `ref_base` is the reference nucleotide at the column position. Columns
    /// outside the active window, and positions with a non-ACGT reference,
    /// are ignored.
    pub fn process_column(&mut self, column: &PileupColumn, ref_base: u8) {
        if column.pos < self.window.beg || column.pos >= self.window.end {
            return;
        }
        let Some(ref_code) = base_code(ref_base) else {
            return;
        };

        // Bucket observations per sample and call each sample independently.
        for bucket in self.sample_obs.iter_mut() {
            bucket.clear();
        }
        for obs in &column.observations {
            if obs.sample < self.sample_obs.len() {
                self.sample_obs[obs.sample].push(*obs);
            }
        }

        self.calls.clear();
        for bucket in &self.sample_obs {
            let depth = bucket.len().min(u16::MAX as usize) as u16;
            let rms = rms_map_quality(bucket);
            let lik = self.model.genotype_likelihoods(bucket, &mut self.rng);
            self.calls.push(encode_consensus(&lik, depth, rms));
        }

        if !self.params.keep_heterozygotes {
            clean_heterozygotes(&mut self.calls, ref_code, self.params.min_snp_quality);
        }
        let segregation = classify_site(&mut self.calls, ref_code, self.params.min_snp_quality);
        if segregation == Segregation::MultiAllelic {
            debug!(pos = column.pos, "multi-allelic site excluded");
        }

        let covered = qual_filter(
            &mut self.calls,
            self.params.min_rms_quality,
            self.params.min_depth,
            self.params.max_depth,
        );

        let mut coverage = PopCoverageRow::ZERO;
        for (i, pop) in self.registry.populations().iter().enumerate() {
            let local = (covered & pop.mask).count_ones();
            self.ncov_scratch[i] = local as u16;
            let required = (self.params.min_pop * f64::from(pop.nsmpl) + 0.4999) as u32;
            if local >= required {
                coverage.set(i, true);
            }
        }

        if coverage.any() {
            self.window.push_aligned(coverage);
            if segregation.is_segregating() {
                let bits = site_type(&self.calls);
                trace!(pos = column.pos, bits, "segregating site recorded");
                self.window.push_segregating(bits, &self.ncov_scratch);
            }
        }
    }
}

/// Root-mean-square mapping quality of one sample's reads, rounded.
fn rms_map_quality(observations: &[ReadObservation]) -> u16 {
    if observations.is_empty() {
        return 0;
    }
    let sum_sq: f64 = observations
        .iter()
        .map(|o| f64::from(o.map_quality) * f64::from(o.map_quality))
        .sum();
    (sum_sq / observations.len() as f64).sqrt().round() as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SampleRegistry {
        SampleRegistry::from_assignments(vec![
            ("s0", "pop"),
            ("s1", "pop"),
            ("s2", "pop"),
            ("s3", "pop"),
        ])
        .unwrap()
    }

    fn column(pos: u64, sample_bases: &[(usize, u8)]) -> PileupColumn {
        let mut col = PileupColumn::new(pos);
        for &(sample, base) in sample_bases {
            for _ in 0..10 {
                col.push(ReadObservation::from_ascii(sample, base, 40, 60, false).unwrap());
            }
        }
        col
    }

    #[test]
    fn rms_is_zero_for_empty_bucket() {
        assert_eq!(rms_map_quality(&[]), 0);
        let obs = [ReadObservation::from_ascii(0, b'A', 30, 40, false).unwrap()];
        assert_eq!(rms_map_quality(&obs), 40);
    }

    #[test]
    fn segregating_column_is_recorded() {
        let registry = registry();
        let model = ErrorModel::new(0.17).unwrap();
        let params = RunParams {
            seed: Some(11),
            ..RunParams::default()
        };
        let mut driver = WindowDriver::new(&model, &registry, &params);
        driver.start_window(100, 200);

        // Samples 1 and 3 carry G over an A reference.
        let col = column(150, &[(0, b'A'), (1, b'G'), (2, b'A'), (3, b'G')]);
        driver.process_column(&col, b'A');

        let window = driver.window();
        assert_eq!(window.num_sites(), 1);
        assert_eq!(window.segsites(), 1);
        assert_eq!(window.site_types()[0], 0b1010);
        assert_eq!(window.ncov(0, 0), 4);
    }

    #[test]
    fn out_of_window_and_ambiguous_reference_columns_are_skipped() {
        let registry = registry();
        let model = ErrorModel::new(0.17).unwrap();
        let params = RunParams {
            seed: Some(11),
            ..RunParams::default()
        };
        let mut driver = WindowDriver::new(&model, &registry, &params);
        driver.start_window(100, 200);

        driver.process_column(&column(50, &[(0, b'A')]), b'A');
        driver.process_column(&column(150, &[(0, b'A')]), b'N');
        assert_eq!(driver.window().num_sites(), 0);
    }

    #[test]
    fn uncovered_column_is_not_counted() {
        let registry = registry();
        let model = ErrorModel::new(0.17).unwrap();
        let params = RunParams {
            seed: Some(11),
            ..RunParams::default()
        };
        let mut driver = WindowDriver::new(&model, &registry, &params);
        driver.start_window(0, 10);

        // Only one of four samples has reads; min_pop = 1.0 requires all.
        driver.process_column(&column(5, &[(0, b'A')]), b'A');
        assert_eq!(driver.window().num_sites(), 0);
        assert_eq!(driver.window().segsites(), 0);
    }

    #[test]
    fn reset_clears_state_but_keeps_interval_math() {
        let mut window = Window::new(2);
        window.reset(10, 30);
        assert_eq!(window.len(), 20);
        window.push_aligned(PopCoverageRow::ZERO);
        window.push_segregating(0b1, &[2, 0]);
        window.reset(30, 50);
        assert_eq!(window.num_sites(), 0);
        assert_eq!(window.segsites(), 0);
        assert_eq!(window.beg(), 30);
    }
}
