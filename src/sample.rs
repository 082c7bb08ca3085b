//! Sample and population bookkeeping.
//!
//! Populations are represented as 64-bit membership masks, one bit per sample.
//! The masks are built once at startup and are read-only for the rest of the
//! run; every statistic engine restricts site-type bit-vectors through them.

use thiserror::Error;

/// Hard cap on samples per run, set by the 64-bit site-type width.
pub const MAX_SAMPLES: usize = 64;

/// Hard cap on populations, set by the 32-bit coverage rows.
pub const MAX_POPULATIONS: usize = 32;

/// Errors raised while building the sample registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No samples were provided.
    #[error("no samples provided")]
    Empty,

    /// More samples than the site-type bit-vector can hold.
    #[error("{0} samples exceeds the maximum of {MAX_SAMPLES}")]
    TooManySamples(usize),

    /// More populations than the coverage row can hold.
    #[error("{0} populations exceeds the maximum of {MAX_POPULATIONS}")]
    TooManyPopulations(usize),

    /// The same sample name appeared twice.
    #[error("duplicate sample name: {0}")]
    DuplicateSample(String),

    /// A requested sample name does not exist.
    #[error("sample {0} not found")]
    UnknownSample(String),
}

/// One sequenced sample.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Index in [0, n); also the sample's bit position in site types.
    pub index: usize,
    /// Sample name, unique within the run.
    pub name: String,
    /// Index of the population this sample belongs to.
    pub population: usize,
}

/// A named set of samples.
#[derive(Debug, Clone)]
pub struct Population {
    /// Population name.
    pub name: String,
    /// Membership mask, one bit per sample index.
    pub mask: u64,
    /// Number of member samples.
    pub nsmpl: u8,
}

/// Immutable sample/population metadata for one run.
#[derive(Debug, Clone)]
pub struct SampleRegistry {
    samples: Vec<Sample>,
    populations: Vec<Population>,
}

impl SampleRegistry {
    /// Build a registry from `(sample_name, population_name)` assignments.
    ///
    /// Sample indices follow input order; populations are numbered in order
    /// of first appearance.
    pub fn from_assignments<I, S>(assignments: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut samples: Vec<Sample> = Vec::new();
        let mut populations: Vec<Population> = Vec::new();

        for (name, pop_name) in assignments {
            let name = name.into();
            let pop_name = pop_name.into();

            if samples.iter().any(|s| s.name == name) {
                return Err(RegistryError::DuplicateSample(name));
            }
            let index = samples.len();
            if index >= MAX_SAMPLES {
                return Err(RegistryError::TooManySamples(index + 1));
            }

            let pop_index = match populations.iter().position(|p| p.name == pop_name) {
                Some(i) => i,
                None => {
                    if populations.len() >= MAX_POPULATIONS {
                        return Err(RegistryError::TooManyPopulations(populations.len() + 1));
                    }
                    populations.push(Population {
                        name: pop_name,
                        mask: 0,
                        nsmpl: 0,
                    });
                    populations.len() - 1
                }
            };

            populations[pop_index].mask |= 1u64 << index;
            populations[pop_index].nsmpl += 1;
            samples.push(Sample {
                index,
                name,
                population: pop_index,
            });
        }

        if samples.is_empty() {
            return Err(RegistryError::Empty);
        }

        Ok(Self {
            samples,
            populations,
        })
    }

    /// Total number of samples.
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// Number of populations.
    pub fn num_populations(&self) -> usize {
        self.populations.len()
    }

    /// All samples, indexed by sample index.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// All populations, indexed by population index.
    pub fn populations(&self) -> &[Population] {
        &self.populations
    }

    /// Look up a sample index by name.
    pub fn sample_index(&self, name: &str) -> Result<usize, RegistryError> {
        self.samples
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| RegistryError::UnknownSample(name.to_string()))
    }

    /// Population index a sample belongs to.
    pub fn population_of(&self, sample: usize) -> usize {
        self.samples[sample].population
    }
}
