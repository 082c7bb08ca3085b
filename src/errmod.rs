//! Empirical Bayesian error model for genotype likelihoods.
//!
//! The model follows the MAQ/samtools family of callers: repeated observations
//! of the same base on the same strand contribute diminishing evidence (the
//! `fk` decay), and each read's base quality is converted into a log-odds
//! penalty through a precomputed binomial tail table (`beta`). Heterozygous
//! genotypes additionally pay a log-binomial cost for splitting reads between
//! two alleles (`lhet`).
//!
//! All coefficient tables are built once per run from a single `depcorr`
//! parameter and a fixed overdispersion constant, then shared read-only by
//! every pileup column.

use rand::seq::SliceRandom;
use rand::Rng;
use statrs::function::gamma::ln_gamma;
use thiserror::Error;

use crate::pileup::{ReadObservation, NUM_BASES};

/// Maximum number of reads used for one likelihood computation.
///
/// Columns deeper than this are randomly downsampled before the likelihoods
/// are computed; the cap protects both runtime and numeric stability. The
/// depth persisted in a call word is the original, pre-downsampling depth.
pub const MAX_LIKELIHOOD_DEPTH: usize = 255;

/// Fixed overdispersion floor on the duplicate-read decay.
const ETA: f64 = 0.03;

/// Quality scores are clamped into this Phred range.
const MAX_QUALITY: usize = 63;

/// Scale factor between natural log and Phred-like decibans (10 / ln 10).
const PHRED_SCALE: f64 = 4.343;

/// Errors raised while constructing the error model.
#[derive(Debug, Error)]
pub enum ErrorModelError {
    /// The duplicate-read decay rate must lie in [0, 1).
    #[error("dependency coefficient {0} outside [0, 1)")]
    InvalidDepcorr(f64),
}

/// Precomputed coefficient tables plus the parameter they were built from.
///
/// Construct once per run and pass by shared reference into every call; the
/// tables are read-only after construction.
pub struct ErrorModel {
    depcorr: f64,
    /// `fk[r]`: weight of the r-th duplicate observation of one base/strand.
    fk: Vec<f64>,
    /// `beta[q<<16 | n<<8 | k]`: deciban penalty for the k-th error read out
    /// of n at quality q.
    beta: Vec<f64>,
    /// `lhet[n<<8 | k]`: ln C(n,k) - n ln 2, the heterozygote split cost.
    lhet: Vec<f64>,
}

impl std::fmt::Debug for ErrorModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorModel")
            .field("depcorr", &self.depcorr)
            .finish_non_exhaustive()
    }
}

impl ErrorModel {
    /// Build the coefficient tables for a given duplicate-read decay rate.
    pub fn new(depcorr: f64) -> Result<Self, ErrorModelError> {
        if !(0.0..1.0).contains(&depcorr) {
            return Err(ErrorModelError::InvalidDepcorr(depcorr));
        }

        let mut fk = vec![0.0; 256];
        fk[0] = 1.0;
        for n in 1..256 {
            fk[n] = (1.0 - depcorr).powi(n as i32) * (1.0 - ETA) + ETA;
        }

        // Log binomial coefficients, ln C(n,k), for n,k < 256.
        let mut lc = vec![0.0; 256 * 256];
        for n in 1..256usize {
            let lgn = ln_gamma(n as f64 + 1.0);
            for k in 1..=n {
                lc[n << 8 | k] =
                    lgn - ln_gamma(k as f64 + 1.0) - ln_gamma((n - k) as f64 + 1.0);
            }
        }

        // beta[q][n][k] = -10/ln10 * ln(P(X > k) / P(X >= k)) for
        // X ~ Binomial(n, 10^(-q/10)), accumulated from the tail.
        let mut beta = vec![0.0; 64 << 16];
        for q in 1..=MAX_QUALITY {
            let e = 10f64.powf(-(q as f64) / 10.0);
            let le = e.ln();
            let le1 = (1.0 - e).ln();
            for n in 1..=255usize {
                let row = q << 16 | n << 8;
                let mut tail = 0.0f64;
                for k in (0..=n).rev() {
                    let sum = tail + (lc[n << 8 | k] + k as f64 * le + (n - k) as f64 * le1).exp();
                    beta[row | k] = -PHRED_SCALE * (tail / sum).ln();
                    tail = sum;
                }
            }
        }

        let mut lhet = vec![0.0; 256 * 256];
        for n in 0..256usize {
            for k in 0..256usize {
                lhet[n << 8 | k] = lc[n << 8 | k] - std::f64::consts::LN_2 * n as f64;
            }
        }

        Ok(Self {
            depcorr,
            fk,
            beta,
            lhet,
        })
    }

    /// The decay rate the tables were built from.
    pub fn depcorr(&self) -> f64 {
        self.depcorr
    }

    /// Duplicate-read weight for the given occurrence rank.
    pub fn fk(&self, rank: usize) -> f64 {
        self.fk[rank.min(255)]
    }

    /// Genotype likelihood matrix for one sample's observations at one column.
    ///
    /// Returns a row-major 4x4 matrix of costs: entry `[a1*4 + a2]` is the
    /// penalty (in decibans, higher = less likely) of the unordered genotype
    /// `{a1, a2}`. The matrix is symmetric and every entry is non-negative.
    /// A zero-depth column carries no information and yields all zeros.
    pub fn genotype_likelihoods<R: Rng>(
        &self,
        observations: &[ReadObservation],
        rng: &mut R,
    ) -> [f64; 16] {
        let mut lik = [0.0f64; 16];
        if observations.is_empty() {
            return lik;
        }

        // Pack as qual:6 | strand:1 | base:2 so an ascending sort orders by
        // quality first; the scan below walks highest quality first.
        let mut bases: Vec<u16> = observations.iter().map(pack_observation).collect();
        if bases.len() > MAX_LIKELIHOOD_DEPTH {
            bases.shuffle(rng);
            bases.truncate(MAX_LIKELIHOOD_DEPTH);
        }
        bases.sort_unstable();
        let n = bases.len();

        // Occurrence ranks per (strand, base); evidence sums per base.
        let mut rank = [0usize; 32];
        let mut count = [0usize; NUM_BASES];
        let mut fsum = [0.0f64; NUM_BASES];
        let mut bsum = [0.0f64; NUM_BASES];

        for &b in bases.iter().rev() {
            let quality = ((b >> 5) as usize).clamp(NUM_BASES, MAX_QUALITY);
            let strand_base = (b & 0x1f) as usize;
            let base = strand_base & 0x3;
            let weight = self.fk[rank[strand_base]];
            fsum[base] += weight;
            bsum[base] += weight * self.beta[quality << 16 | n << 8 | count[base]];
            count[base] += 1;
            rank[strand_base] += 1;
        }

        for a1 in 0..NUM_BASES {
            // Homozygous: pay for every read disagreeing with a1.
            let mut contrary = 0.0f64;
            let mut penalty = 0.0f64;
            for b in 0..NUM_BASES {
                if b != a1 {
                    contrary += fsum[b];
                    penalty += bsum[b];
                }
            }
            if contrary > 0.0 {
                lik[a1 * NUM_BASES + a1] = penalty;
            }

            // Heterozygous: split cost plus penalty for bases outside the pair.
            for a2 in (a1 + 1)..NUM_BASES {
                let split = count[a1] + count[a2];
                let mut excluded = 0.0f64;
                let mut outside = 0.0f64;
                for b in 0..NUM_BASES {
                    if b != a1 && b != a2 {
                        excluded += fsum[b];
                        outside += bsum[b];
                    }
                }
                let het = -PHRED_SCALE * self.lhet[split << 8 | count[a2]];
                let value = if excluded > 0.0 { het + outside } else { het };
                lik[a1 * NUM_BASES + a2] = value;
                lik[a2 * NUM_BASES + a1] = value;
            }

            for a2 in 0..NUM_BASES {
                if lik[a1 * NUM_BASES + a2] < 0.0 {
                    lik[a1 * NUM_BASES + a2] = 0.0;
                }
            }
        }

        lik
    }
}

fn pack_observation(obs: &ReadObservation) -> u16 {
    let quality = obs.base_quality.min(MAX_QUALITY as u8) as u16;
    quality << 5 | (obs.is_reverse as u16) << 4 | (obs.base & 0x3) as u16
}
