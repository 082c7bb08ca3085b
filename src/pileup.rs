//! Pileup column primitives consumed by the genotype caller.
//!
//! A pileup column is the set of read observations overlapping one genomic
//! position. Columns are produced by an external alignment layer and consumed
//! exactly once by the window driver; nothing here retains them.

/// Number of symbols in the base alphabet (A, C, G, T).
pub const NUM_BASES: usize = 4;

/// Map an ASCII nucleotide to its 2-bit code.
pub fn base_code(base: u8) -> Option<u8> {
    match base {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' | b'U' | b'u' => Some(3),
        _ => None,
    }
}

/// Map a 2-bit base code back to its uppercase ASCII nucleotide.
pub fn code_to_base(code: u8) -> u8 {
    match code & 0x3 {
        0 => b'A',
        1 => b'C',
        2 => b'G',
        _ => b'T',
    }
}

/// One aligned read base at a single genomic position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadObservation {
    /// Index of the sample the read belongs to.
    pub sample: usize,
    /// 2-bit base code (A=0, C=1, G=2, T=3).
    pub base: u8,
    /// Phred-scaled base quality, clamped to 0-63 by the error model.
    pub base_quality: u8,
    /// Phred-scaled mapping quality of the read.
    pub map_quality: u8,
    /// Whether the read maps to the reverse strand.
    pub is_reverse: bool,
}

impl ReadObservation {
    /// Construct an observation from an ASCII base call.
    ///
    /// Returns `None` for non-ACGT bases (ambiguity codes carry no usable
    /// signal for the biallelic caller).
    pub fn from_ascii(
        sample: usize,
        base: u8,
        base_quality: u8,
        map_quality: u8,
        is_reverse: bool,
    ) -> Option<Self> {
        base_code(base).map(|code| Self {
            sample,
            base: code,
            base_quality,
            map_quality,
            is_reverse,
        })
    }
}

/// All read observations overlapping one genomic position.
#[derive(Debug, Clone, Default)]
pub struct PileupColumn {
    /// Genomic coordinate (0-based).
    pub pos: u64,
    /// Per-read observations, in no particular order.
    pub observations: Vec<ReadObservation>,
}

impl PileupColumn {
    /// Construct an empty column at a position.
    pub fn new(pos: u64) -> Self {
        Self {
            pos,
            observations: Vec::new(),
        }
    }

    /// Add one observation to the column.
    pub fn push(&mut self, obs: ReadObservation) {
        self.observations.push(obs);
    }

    /// Total read depth across all samples.
    pub fn depth(&self) -> usize {
        self.observations.len()
    }
}
