//! Site-frequency-spectrum neutrality tests: Tajima's D and Fay-Wu H.
//!
//! Because per-site coverage varies with missing data, the per-site weights
//! are tabulated for every possible local sample depth up to the total sample
//! count, alongside the harmonic-number and variance-coefficient tables the
//! normalisations need. All tables are built once per run.

use crate::sample::SampleRegistry;
use crate::window::Window;
use crate::RunParams;

/// Precomputed combinatorial constant tables for a total sample count `n`.
#[derive(Debug, Clone)]
pub struct SfsTables {
    n: usize,
    /// Harmonic numbers: `a1[i] = sum_{j<i} 1/j`.
    a1: Vec<f64>,
    /// Inverse-square sums: `a2[i] = sum_{j<i} 1/j^2` (one extra entry, the
    /// Fay-Wu variance needs `a2[n+1]`).
    a2: Vec<f64>,
    /// Tajima's D variance coefficients.
    e1: Vec<f64>,
    e2: Vec<f64>,
    /// Per-site Tajima weight, indexed `[local_depth][derived_count]`.
    dw: Vec<f64>,
    /// Per-site Fay-Wu weight, same indexing.
    hw: Vec<f64>,
}

impl SfsTables {
    /// Build every table for `total_samples` samples.
    pub fn new(total_samples: usize) -> Self {
        let n = total_samples;

        let mut a1 = vec![1.0; n + 1];
        for i in 2..=n {
            a1[i] = (1..i).map(|j| 1.0 / j as f64).sum();
        }

        let mut a2 = vec![1.0; n + 2];
        for i in 2..=n + 1 {
            a2[i] = (1..i).map(|j| 1.0 / (j * j) as f64).sum();
        }

        let mut e1 = vec![1.0; n + 1];
        let mut e2 = vec![1.0; n + 1];
        for i in 2..=n {
            let fi = i as f64;
            let b1 = (fi + 1.0) / (3.0 * (fi - 1.0));
            let b2 = 2.0 * (fi * fi + fi + 3.0) / (9.0 * fi * (fi - 1.0));
            e1[i] = (b1 - 1.0 / a1[i]) / a1[i];
            e2[i] = (b2 - (fi + 2.0) / (a1[i] * fi) + a2[i] / (a1[i] * a1[i]))
                / (a1[i] * a1[i] + a2[i]);
        }

        // Weights for every local depth d and derived count 0 < i < d.
        let stride = n + 1;
        let mut dw = vec![0.0; stride * stride];
        let mut hw = vec![0.0; stride * stride];
        for d in 2..=n {
            let fd = d as f64;
            for i in 1..d {
                let fi = i as f64;
                dw[d * stride + i] =
                    2.0 * fi * (fd - fi) / ((fd - 1.0) * (fd - 1.0)) - 1.0 / a1[d];
                hw[d * stride + i] = 1.0 / a1[d] - fi / (fd - 1.0);
            }
        }

        Self {
            n,
            a1,
            a2,
            e1,
            e2,
            dw,
            hw,
        }
    }

    /// Total sample count the tables were built for.
    pub fn total_samples(&self) -> usize {
        self.n
    }

    /// Harmonic number for a sample count.
    pub fn a1(&self, n: usize) -> f64 {
        self.a1[n]
    }

    /// Tajima per-site weight at a local depth and derived count.
    pub fn dw(&self, depth: usize, derived: usize) -> f64 {
        self.dw[depth * (self.n + 1) + derived]
    }

    /// Fay-Wu per-site weight at a local depth and derived count.
    pub fn hw(&self, depth: usize, derived: usize) -> f64 {
        self.hw[depth * (self.n + 1) + derived]
    }
}

/// Per-population SFS result for one window.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PopSfs {
    /// Population index.
    pub population: usize,
    /// Aligned sites at which the population met its coverage threshold.
    pub aligned_sites: usize,
    /// Segregating sites that contributed to the sums.
    pub num_snps: usize,
    /// Tajima's D, or `None` when undefined for this window.
    pub tajima_d: Option<f64>,
    /// Fay-Wu H, or `None` when undefined for this window.
    pub fay_wu_h: Option<f64>,
}

/// Compute Tajima's D and Fay-Wu H for every population over one window.
///
/// A site contributes for a population when its population-restricted
/// derived count is strictly between zero and the local coverage. With an
/// outgroup configured, aligned, and differing from the reference at a site,
/// the derived count flips to `coverage - count` (the reference allele is
/// the derived one there). Populations whose covered-site total falls below
/// `min_sites` of the window length get `None` for both statistics.
pub fn compute_sfs(
    window: &Window,
    registry: &SampleRegistry,
    tables: &SfsTables,
    params: &RunParams,
) -> Vec<PopSfs> {
    let npops = registry.num_populations();
    let outgroup = params.outgroup.map(|idx| (idx, registry.population_of(idx)));

    // Aligned-site totals per population.
    let mut aligned = vec![0usize; npops];
    for row in window.pop_cov() {
        for (pop, count) in aligned.iter_mut().enumerate() {
            if row[pop] {
                *count += 1;
            }
        }
    }

    let required = (window.len() as f64 * params.min_sites) as usize;

    registry
        .populations()
        .iter()
        .enumerate()
        .map(|(i, pop)| {
            let mut result = PopSfs {
                population: i,
                aligned_sites: aligned[i],
                num_snps: 0,
                tajima_d: None,
                fay_wu_h: None,
            };
            if aligned[i] < required {
                return result;
            }

            let mut d_sum = 0.0;
            let mut h_sum = 0.0;
            let mut depth_sum = 0usize;
            for (site, &t) in window.site_types().iter().enumerate() {
                let coverage = usize::from(window.ncov(site, i));
                let count = (t & pop.mask).count_ones() as usize;

                // Ancestral-state flip when the outgroup carries the
                // non-reference allele at this site.
                let derived = match outgroup {
                    Some((out_idx, out_pop))
                        if window.ncov(site, out_pop) > 0 && (t >> out_idx) & 1 == 1 =>
                    {
                        coverage - count
                    }
                    _ => count,
                };

                if derived > 0 && derived < coverage {
                    d_sum += tables.dw(coverage, derived);
                    h_sum += tables.hw(coverage, derived);
                    depth_sum += coverage;
                    result.num_snps += 1;
                }
            }

            if result.num_snps == 0 {
                return result;
            }

            let s = result.num_snps as f64;
            let n = (depth_sum as f64 / s + 0.4999) as usize;
            let fnn = n as f64;

            let d_var = tables.e1[n] * s + tables.e2[n] * s * (s - 1.0);
            if d_var > 0.0 {
                result.tajima_d = Some(d_sum / d_var.sqrt());
            }

            let a1 = tables.a1[n];
            let a2 = tables.a2[n];
            let a2n1 = tables.a2[n + 1];
            let h_var = (fnn - 2.0) * (s / a1) / (6.0 * (fnn - 1.0))
                + (s * (s - 1.0) / (a1 * a1 + a2))
                    * (18.0 * fnn * fnn * (3.0 * fnn + 2.0) * a2n1
                        - (88.0 * fnn * fnn * fnn + 9.0 * fnn * fnn - 13.0 * fnn + 6.0))
                    / (9.0 * fnn * (fnn - 1.0) * (fnn - 1.0));
            if h_var > 0.0 {
                result.fay_wu_h = Some(h_sum / h_var.sqrt());
            }

            result
        })
        .collect()
}
