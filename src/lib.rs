//! # Sliding-window population genetics from read pileups
//!
//! This library computes linkage-disequilibrium and site-frequency-spectrum
//! statistics per genomic window, per sample population, directly from
//! aligned-read pileup columns.
//!
//! ## Pipeline
//!
//! 1. **Error model**: depth/quality coefficient tables, built once per run,
//!    turn a pileup column into per-sample genotype likelihoods.
//! 2. **Consensus caller**: likelihoods become one packed [`CallWord`] per
//!    sample; quality filtering, heterozygote cleaning, and site
//!    classification produce a 64-bit site-type vector per segregating site.
//! 3. **Statistics engines**: per window, the site-type stream yields Zns,
//!    Omega-max, or Wall's B/Q ([`stats::ld`]) and Tajima's D / Fay-Wu H
//!    ([`stats::sfs`]) for every population.
//!
//! ## Usage example
//!
//! ```ignore
//! use popwin::{ErrorModel, LdKind, RunParams, SampleRegistry, WindowDriver};
//!
//! let registry = SampleRegistry::from_assignments(assignments)?;
//! let params = RunParams::default();
//! let model = ErrorModel::new(params.depcorr)?;
//! let mut driver = WindowDriver::new(&model, &registry, &params);
//!
//! driver.start_window(beg, end);
//! for column in columns {
//!     driver.process_column(&column, ref_base_at(column.pos));
//! }
//! let results = popwin::stats::compute_ld(LdKind::Zns, driver.window(), &registry, &params);
//! ```
//!
//! Processing is single-threaded and streaming: one column is fully handled
//! before the next, windows run strictly sequentially, and the only shared
//! state is read-only (coefficient tables and population masks).

#![warn(missing_docs, missing_debug_implementations)]

pub mod consensus;
pub mod errmod;
pub mod pileup;
pub mod sample;
pub mod stats;
pub mod window;

pub use consensus::{CallWord, Segregation};
pub use errmod::{ErrorModel, ErrorModelError};
pub use pileup::{PileupColumn, ReadObservation};
pub use sample::{Population, Sample, SampleRegistry};
pub use stats::{LdKind, LdValue, PopLd, PopSfs, SfsTables};
pub use window::{Window, WindowDriver};

use thiserror::Error;

/// Run parameters shared by every window.
///
/// Defaults mirror the standard analysis settings; `validate` enforces the
/// ranges before any window is processed.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunParams {
    /// Error-rate decay per duplicate read (error model parameter).
    pub depcorr: f64,
    /// Minimum RMS mapping quality for a sample call to pass.
    pub min_rms_quality: u16,
    /// Minimum read depth for a sample call to pass.
    pub min_depth: u16,
    /// Maximum read depth for a sample call to pass.
    pub max_depth: u16,
    /// Minimum SNP confidence for a call to count as a variant.
    pub min_snp_quality: u16,
    /// Minimum derived-allele count for a site to enter LD calculations
    /// (2 excludes singletons).
    pub min_freq: u32,
    /// Minimum qualifying SNPs for a window's LD statistic to be defined.
    pub min_snps: usize,
    /// Minimum fraction of window positions that must be aligned for SFS
    /// statistics to be defined.
    pub min_sites: f64,
    /// Minimum fraction of a population's samples that must pass filters for
    /// the population to count as covered at a site.
    pub min_pop: f64,
    /// Keep heterozygous encoded calls instead of collapsing them.
    pub keep_heterozygotes: bool,
    /// Outgroup sample index for ancestral-state polarisation.
    pub outgroup: Option<usize>,
    /// Seed for the downsampling RNG; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            depcorr: 0.17,
            min_rms_quality: 25,
            min_depth: 3,
            max_depth: 255,
            min_snp_quality: 25,
            min_freq: 1,
            min_snps: 2,
            min_sites: 0.5,
            min_pop: 1.0,
            keep_heterozygotes: false,
            outgroup: None,
            seed: None,
        }
    }
}

/// Configuration errors; all are fatal before any window is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Depth window is inverted.
    #[error("minimum depth {min} exceeds maximum depth {max}")]
    InvalidDepthRange {
        /// Configured minimum depth.
        min: u16,
        /// Configured maximum depth.
        max: u16,
    },

    /// A fraction parameter left [0, 1].
    #[error("{name} must lie in [0, 1], got {value}")]
    InvalidFraction {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
    },

    /// Minimum allele count of zero would admit monomorphic patterns.
    #[error("minimum allele frequency must be at least 1")]
    ZeroMinFreq,

    /// Outgroup index beyond the sample count.
    #[error("outgroup sample index {0} out of range")]
    OutgroupOutOfRange(usize),
}

impl RunParams {
    /// Check parameter ranges against a sample count.
    pub fn validate(&self, num_samples: usize) -> Result<(), ConfigError> {
        if self.min_depth > self.max_depth {
            return Err(ConfigError::InvalidDepthRange {
                min: self.min_depth,
                max: self.max_depth,
            });
        }
        for (name, value) in [("min_sites", self.min_sites), ("min_pop", self.min_pop)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidFraction { name, value });
            }
        }
        if self.min_freq == 0 {
            return Err(ConfigError::ZeroMinFreq);
        }
        if let Some(idx) = self.outgroup {
            if idx >= num_samples {
                return Err(ConfigError::OutgroupOutOfRange(idx));
            }
        }
        Ok(())
    }
}
