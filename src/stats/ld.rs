//! Linkage disequilibrium statistics over one window's segregating sites.
//!
//! All three statistics work on population-restricted site types: the window
//! site-type vector ANDed with the population mask. For the r2-based
//! statistics a site qualifies when its restricted derived-allele count lies
//! in `[min_freq, n - min_freq]` (`min_freq` of 2 excludes singletons);
//! Wall's B/Q qualify sites on polymorphism alone.

use crate::sample::SampleRegistry;
use crate::stats::pairs;
use crate::window::Window;
use crate::RunParams;

/// Which LD statistic a run computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LdKind {
    /// Kelly's ZnS: mean pairwise r2.
    Zns,
    /// Omega-max: maximum LD change-point score over contiguous splits.
    OmegaMax,
    /// Wall's B and Q congruency statistics.
    Wall,
}

/// Value of one LD statistic for one population.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LdValue {
    /// Mean pairwise r2.
    Zns(f64),
    /// Maximum omega over all split points.
    OmegaMax(f64),
    /// Wall's congruency pair.
    Wall {
        /// Fraction of adjacent congruent site pairs.
        b: f64,
        /// Congruent pairs plus novel partitions, per qualifying site.
        q: f64,
    },
}

/// Per-population LD result for one window.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PopLd {
    /// Population index.
    pub population: usize,
    /// Number of qualifying SNPs in the window.
    pub num_snps: usize,
    /// The statistic, or `None` when undefined for this window.
    pub value: Option<LdValue>,
}

/// Compute the selected LD statistic for every population.
pub fn compute_ld(
    kind: LdKind,
    window: &Window,
    registry: &SampleRegistry,
    params: &RunParams,
) -> Vec<PopLd> {
    let floor = params.min_snps.max(2);
    registry
        .populations()
        .iter()
        .enumerate()
        .map(|(i, pop)| {
            // Wall's statistics qualify sites on polymorphism alone; the
            // minor-allele-count bound applies only to the r2-based ones.
            let (num_snps, value) = match kind {
                LdKind::Wall => {
                    let (num_snps, bq) = wall(window.site_types(), pop.mask);
                    let value = if num_snps < floor {
                        None
                    } else {
                        bq.map(|(b, q)| LdValue::Wall { b, q })
                    };
                    (num_snps, value)
                }
                LdKind::Zns | LdKind::OmegaMax => {
                    let restricted = qualifying_sites(
                        window.site_types(),
                        pop.mask,
                        u32::from(pop.nsmpl),
                        params.min_freq,
                    );
                    let num_snps = restricted.len();
                    let value = if num_snps < floor {
                        None
                    } else if kind == LdKind::Zns {
                        zns(&restricted, u32::from(pop.nsmpl)).map(LdValue::Zns)
                    } else {
                        omega_max(&restricted, u32::from(pop.nsmpl)).map(LdValue::OmegaMax)
                    };
                    (num_snps, value)
                }
            };
            PopLd {
                population: i,
                num_snps,
                value,
            }
        })
        .collect()
}

/// Restrict site types to a population and keep the qualifying ones.
fn qualifying_sites(site_types: &[u64], mask: u64, n: u32, min_freq: u32) -> Vec<u64> {
    if n < min_freq {
        return Vec::new();
    }
    site_types
        .iter()
        .map(|&t| t & mask)
        .filter(|t| {
            let x = t.count_ones();
            x >= min_freq && x <= n - min_freq
        })
        .collect()
}

/// Squared correlation between the 2x2 haplotype contingency table of two
/// sites: `(x0 x1 - n x11)^2 / (x0 (n-x0) x1 (n-x1))`.
fn r_squared(type0: u64, type1: u64, n: u32) -> f64 {
    let x0 = type0.count_ones();
    let x1 = type1.count_ones();
    let x11 = (type0 & type1).count_ones();
    let num = f64::from(x0) * f64::from(x1) - f64::from(n) * f64::from(x11);
    let den =
        f64::from(x0) * f64::from(n - x0) * f64::from(x1) * f64::from(n - x1);
    num * num / den
}

/// Mean pairwise r2 across all qualifying pairs.
fn zns(restricted: &[u64], n: u32) -> Option<f64> {
    let s = restricted.len();
    if s < 2 {
        return None;
    }
    let mut sum = 0.0;
    for i in 0..s - 1 {
        for j in i + 1..s {
            sum += r_squared(restricted[i], restricted[j], n);
        }
    }
    Some(sum / pairs(s))
}

/// Maximum omega over every contiguous split of the qualifying-SNP list.
///
/// For a split after index `i` the left block holds `i + 1` SNPs; the score
/// is the within-block mean r2 scaled against the between-block sum. Splits
/// with zero between-block LD contribute no candidate.
fn omega_max(restricted: &[u64], n: u32) -> Option<f64> {
    let s = restricted.len();
    if s < 3 {
        return None;
    }

    let mut r2 = vec![0.0f64; s * s];
    for i in 0..s - 1 {
        for j in i + 1..s {
            let value = r_squared(restricted[i], restricted[j], n);
            r2[i * s + j] = value;
            r2[j * s + i] = value;
        }
    }

    let mut best: Option<f64> = None;
    for split in 1..s - 1 {
        let mut sum_left = 0.0;
        let mut sum_right = 0.0;
        let mut sum_between = 0.0;

        for i in 0..s - 1 {
            for j in i + 1..s {
                if j <= split {
                    sum_left += r2[i * s + j];
                } else if i > split {
                    sum_right += r2[i * s + j];
                } else {
                    sum_between += r2[i * s + j];
                }
            }
        }

        if sum_between == 0.0 {
            continue;
        }
        let left = split + 1;
        let right = s - left;
        let omega = (sum_left + sum_right) / (pairs(left) + pairs(right))
            * (left * right) as f64
            / sum_between;
        best = Some(best.map_or(omega, |b: f64| b.max(omega)));
    }
    best
}

/// Wall's B and Q for one population, with the qualifying-site count.
///
/// A site qualifies when its restricted bipartition pattern is polymorphic
/// within the population (neither empty nor the full mask); a qualifying
/// site is congruent when its pattern or the pattern's complement equals
/// the previous qualifying site's pattern. Congruent sites whose pattern
/// and complement are both unseen add a novel partition.
fn wall(site_types: &[u64], mask: u64) -> (usize, Option<(f64, f64)>) {
    let mut last: Option<u64> = None;
    let mut seen: Vec<u64> = Vec::new();
    let mut congruent = 0usize;
    let mut partitions = 0usize;
    let mut num_snps = 0usize;

    for &t in site_types {
        let pattern = t & mask;
        if pattern == 0 || pattern == mask {
            continue;
        }
        let complement = mask & !pattern;

        match last {
            None => {
                seen.push(pattern);
            }
            Some(previous) => {
                if pattern == previous || complement == previous {
                    congruent += 1;
                    if !seen.contains(&pattern) && !seen.contains(&complement) {
                        seen.push(pattern);
                        partitions += 1;
                    }
                }
            }
        }
        num_snps += 1;
        last = Some(pattern);
    }

    if num_snps < 2 {
        return (num_snps, None);
    }
    let b = congruent as f64 / (num_snps - 1) as f64;
    let q = (congruent + partitions) as f64 / num_snps as f64;
    (num_snps, Some((b, q)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn r_squared_matches_contingency_table() {
        // n=10, x0=3, x1=4, x11=2: (12 - 20)^2 / (3*7*4*6) = 64/504
        let type0 = (1u64 << 0) | (1 << 1) | (1 << 2);
        let type1 = (1u64 << 1) | (1 << 2) | (1 << 3) | (1 << 9);
        assert_eq!((type0 & type1).count_ones(), 2);
        assert_relative_eq!(r_squared(type0, type1, 10), 64.0 / 504.0, epsilon = 1e-12);
        // With exactly these two sites the pair average is the same value.
        assert_relative_eq!(
            zns(&[type0, type1], 10).unwrap(),
            64.0 / 504.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn zns_is_order_invariant() {
        let sites = vec![0b0111u64, 0b1100, 0b1010, 0b0011];
        let forward = zns(&sites, 4).unwrap();
        let mut reversed = sites.clone();
        reversed.reverse();
        assert_relative_eq!(forward, zns(&reversed, 4).unwrap(), epsilon = 1e-12);
    }

    #[test]
    fn zns_needs_two_sites() {
        assert_eq!(zns(&[0b01], 4), None);
        assert_eq!(zns(&[], 4), None);
    }

    #[test]
    fn omega_reports_best_split() {
        // r2(0,1) = 1, r2(0,2) = r2(1,2) = 1/3; the only split scores
        // (1 + 0) / 1 * 2 / (2/3) = 3.
        let sites = vec![0b0011u64, 0b0011, 0b1011];
        assert_relative_eq!(omega_max(&sites, 4).unwrap(), 3.0, epsilon = 1e-12);
        assert_eq!(omega_max(&sites[..2], 4), None);
    }

    #[test]
    fn omega_skips_zero_between_splits() {
        // The right-hand site is uncorrelated with the left pair (x11 = 1
        // zeroes the numerator), so the lone split has no between-block LD
        // and yields no candidate.
        let sites = vec![0b0011u64, 0b0011, 0b0101];
        assert_eq!(omega_max(&sites, 4), None);
    }

    #[test]
    fn wall_identical_patterns_give_b_one() {
        let sites = vec![0b0011u64; 5];
        let (num_snps, bq) = wall(&sites, 0b1111);
        assert_eq!(num_snps, 5);
        let (b, q) = bq.unwrap();
        assert_relative_eq!(b, 1.0, epsilon = 1e-12);
        // 4 congruent pairs, no novel partitions beyond the first pattern.
        assert_relative_eq!(q, 4.0 / 5.0, epsilon = 1e-12);
    }

    #[test]
    fn wall_complement_counts_as_congruent() {
        let sites = vec![0b0011u64, 0b1100];
        let (_, bq) = wall(&sites, 0b1111);
        let (b, _q) = bq.unwrap();
        assert_relative_eq!(b, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn wall_needs_two_qualifying_sites() {
        assert_eq!(wall(&[0b0011], 0b1111), (1, None));
        // Fixed (all-derived) sites never qualify.
        assert_eq!(wall(&[0b1111, 0b1111], 0b1111), (0, None));
    }

    #[test]
    fn wall_keeps_singletons_regardless_of_the_frequency_floor() {
        use crate::sample::SampleRegistry;
        use crate::window::Window;
        use crate::RunParams;

        let registry =
            SampleRegistry::from_assignments(vec![("s0", "p"), ("s1", "p"), ("s2", "p"), ("s3", "p")])
                .unwrap();
        let params = RunParams {
            min_freq: 2,
            ..RunParams::default()
        };

        let mut window = Window::new(1);
        window.reset(0, 100);
        for _ in 0..3 {
            window.push_aligned(crate::window::PopCoverageRow::ZERO);
            window.push_segregating(0b0001, &[4]);
        }

        // The singleton bound empties the r2-based site list but leaves
        // Wall's congruency scan untouched.
        let zns_result = compute_ld(LdKind::Zns, &window, &registry, &params);
        assert_eq!(zns_result[0].num_snps, 0);
        assert_eq!(zns_result[0].value, None);

        let wall_result = compute_ld(LdKind::Wall, &window, &registry, &params);
        assert_eq!(wall_result[0].num_snps, 3);
        match wall_result[0].value {
            Some(LdValue::Wall { b, q }) => {
                assert_relative_eq!(b, 1.0, epsilon = 1e-12);
                assert_relative_eq!(q, 2.0 / 3.0, epsilon = 1e-12);
            }
            other => panic!("expected Wall, got {other:?}"),
        }
    }
}
