//! Consensus base calling and per-site classification.
//!
//! Each sample's genotype likelihoods are condensed into one packed 64-bit
//! [`CallWord`] per site. The word layout is a fixed contract (tests inspect
//! raw words):
//!
//! ```text
//! bit  0        passes the quality filters
//! bit  1        variant present (homozygous non-reference, high confidence)
//! bits 8..10    allele 2 (2-bit base code)
//! bits 10..12   allele 1 (2-bit base code)
//! bits 16..32   read depth at this sample/site
//! bits 32..48   SNP confidence score (likelihood margin)
//! bits 48..64   RMS mapping quality
//! ```
//!
//! Call words are created fresh per sample per site, mutated in place by the
//! filtering and heterozygote-cleaning steps, and discarded after the site
//! has been classified.

use crate::pileup::NUM_BASES;

/// Packed per-sample consensus call for one site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallWord(u64);

impl CallWord {
    /// Pack a fresh call. The pass-filter and variant bits start clear.
    ///
    /// Allele codes must be 2-bit base codes; the u16 field widths make
    /// overflow of depth, confidence, and RMS quality unrepresentable.
    pub fn new(allele1: u8, allele2: u8, depth: u16, snp_quality: u16, rms_quality: u16) -> Self {
        debug_assert!(allele1 < NUM_BASES as u8 && allele2 < NUM_BASES as u8);
        let genotype = ((allele1 & 0x3) as u64) << 2 | (allele2 & 0x3) as u64;
        Self(
            genotype << 8
                | (depth as u64) << 16
                | (snp_quality as u64) << 32
                | (rms_quality as u64) << 48,
        )
    }

    /// The raw packed word.
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Whether this call passed the depth/RMS quality filters.
    pub fn passes_filter(self) -> bool {
        self.0 & 0x1 != 0
    }

    pub(crate) fn set_passes_filter(&mut self) {
        self.0 |= 0x1;
    }

    /// Whether a high-confidence non-reference call is present.
    pub fn is_variant(self) -> bool {
        self.0 & 0x2 != 0
    }

    pub(crate) fn set_variant(&mut self) {
        self.0 |= 0x2;
    }

    /// The two allele codes, in packed order.
    pub fn alleles(self) -> (u8, u8) {
        (((self.0 >> 10) & 0x3) as u8, ((self.0 >> 8) & 0x3) as u8)
    }

    pub(crate) fn set_alleles(&mut self, allele1: u8, allele2: u8) {
        debug_assert!(allele1 < NUM_BASES as u8 && allele2 < NUM_BASES as u8);
        self.0 &= !(0xf << 8);
        self.0 |= (((allele1 & 0x3) as u64) << 2 | (allele2 & 0x3) as u64) << 8;
    }

    /// Whether the two alleles differ.
    pub fn is_heterozygous(self) -> bool {
        let (a1, a2) = self.alleles();
        a1 != a2
    }

    /// Read depth recorded for this sample at this site.
    pub fn depth(self) -> u16 {
        ((self.0 >> 16) & 0xffff) as u16
    }

    /// SNP confidence score (margin between best and second-best genotype).
    pub fn snp_quality(self) -> u16 {
        ((self.0 >> 32) & 0xffff) as u16
    }

    /// Root-mean-square mapping quality of the reads at this sample/site.
    pub fn rms_quality(self) -> u16 {
        ((self.0 >> 48) & 0xffff) as u16
    }
}

/// Outcome of classifying one site across all samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segregation {
    /// No high-confidence non-reference call.
    Monomorphic,
    /// Exactly one derived allele segregates.
    Segregating {
        /// Number of samples carrying the derived allele.
        derived: u32,
    },
    /// More than one distinct derived allele: the site violates the
    /// infinite-sites assumption and is excluded from the SNP tally.
    MultiAllelic,
}

impl Segregation {
    /// Whether the site contributes to the segregating-site buffer.
    pub fn is_segregating(self) -> bool {
        matches!(self, Segregation::Segregating { .. })
    }
}

/// Condense a genotype likelihood matrix into a packed call word.
///
/// Scans the ten unordered genotype pairs for the minimum and second-minimum
/// cost; the gap between them, rounded and saturated to 16 bits, is the SNP
/// confidence score. The depth argument is the sample's original column
/// depth, not the downsampled likelihood depth.
pub fn encode_consensus(likelihoods: &[f64; 16], depth: u16, rms_quality: u16) -> CallWord {
    let mut best = f64::MAX;
    let mut second = f64::MAX;
    let mut pair = (0u8, 0u8);

    for a1 in 0..NUM_BASES {
        for a2 in a1..NUM_BASES {
            let cost = likelihoods[a1 * NUM_BASES + a2];
            if cost < best {
                pair = (a1 as u8, a2 as u8);
                second = best;
                best = cost;
            } else if cost < second {
                second = cost;
            }
        }
    }

    let snp_quality = ((second - best) + 0.499).clamp(0.0, f64::from(u16::MAX)) as u16;
    CallWord::new(pair.0, pair.1, depth, snp_quality, rms_quality)
}

/// Apply the per-sample quality filters in place.
///
/// Sets the pass-filter bit on every call whose RMS mapping quality reaches
/// `min_rms` and whose depth lies in `[min_depth, max_depth]`, and returns
/// the covered-sample mask (bit per sample index) used for population
/// coverage accounting.
pub fn qual_filter(calls: &mut [CallWord], min_rms: u16, min_depth: u16, max_depth: u16) -> u64 {
    let mut coverage = 0u64;
    for (i, call) in calls.iter_mut().enumerate() {
        if call.rms_quality() >= min_rms
            && call.depth() >= min_depth
            && call.depth() <= max_depth
        {
            call.set_passes_filter();
            coverage |= 1u64 << i;
        }
    }
    coverage
}

/// Resolve heterozygous encoded calls to homozygotes, in place.
///
/// High-confidence heterozygotes collapse to the non-reference allele (an
/// effectively-haploid model treats them as true variants miscalled as
/// mixtures); low-confidence heterozygotes collapse to the reference
/// homozygote (sequencing noise). A high-confidence heterozygote with no
/// reference allele is left untouched and later skipped by classification.
pub fn clean_heterozygotes(calls: &mut [CallWord], ref_code: u8, min_snp_quality: u16) {
    for call in calls.iter_mut() {
        let (a1, a2) = call.alleles();
        if a1 == a2 {
            continue;
        }
        if call.snp_quality() >= min_snp_quality {
            if a1 == ref_code {
                call.set_alleles(a2, a2);
            } else if a2 == ref_code {
                call.set_alleles(a1, a1);
            }
        } else {
            call.set_alleles(ref_code, ref_code);
        }
    }
}

/// Classify a site as monomorphic, segregating, or multi-allelic.
///
/// Homozygous non-reference calls with confidence at or above the threshold
/// get the variant bit and are tallied per allele; below the threshold the
/// genotype is folded back to the reference homozygote rather than discarded.
/// Observing more than one distinct derived allele rejects the site.
pub fn classify_site(calls: &mut [CallWord], ref_code: u8, min_snp_quality: u16) -> Segregation {
    let mut base_count = [0u32; NUM_BASES];

    for call in calls.iter_mut() {
        let (a1, a2) = call.alleles();
        if a1 != a2 || a1 == ref_code {
            continue;
        }
        if call.snp_quality() >= min_snp_quality {
            call.set_variant();
            base_count[a1 as usize] += 1;
        } else {
            call.set_alleles(ref_code, ref_code);
        }
    }

    let mut observed = 0;
    let mut derived = 0;
    for count in base_count {
        if count > 0 {
            observed += 1;
            derived = count;
        }
    }

    match observed {
        0 => Segregation::Monomorphic,
        1 => Segregation::Segregating { derived },
        _ => Segregation::MultiAllelic,
    }
}

/// Site-type bit-vector: bit `i` set iff sample `i` carries a pass-filtered,
/// high-confidence homozygous non-reference call.
pub fn site_type(calls: &[CallWord]) -> u64 {
    let mut bits = 0u64;
    for (i, call) in calls.iter().enumerate() {
        if call.is_variant() && call.passes_filter() {
            bits |= 1u64 << i;
        }
    }
    bits
}
