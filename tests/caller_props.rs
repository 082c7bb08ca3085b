//! Property tests for the error model and call-word packing.

use proptest::prelude::*;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use popwin::consensus::encode_consensus;
use popwin::{CallWord, ErrorModel, ReadObservation};

fn arb_observation() -> impl Strategy<Value = ReadObservation> {
    (0u8..4, 1u8..60, any::<bool>()).prop_map(|(base, base_quality, is_reverse)| ReadObservation {
        sample: 0,
        base,
        base_quality,
        map_quality: 60,
        is_reverse,
    })
}

proptest! {
    #[test]
    fn likelihood_matrices_are_symmetric_and_non_negative(
        reads in proptest::collection::vec(arb_observation(), 0..60),
        seed in any::<u64>(),
    ) {
        let model = ErrorModel::new(0.17).unwrap();
        let mut rng = SmallRng::seed_from_u64(seed);
        let lik = model.genotype_likelihoods(&reads, &mut rng);

        for a1 in 0..4 {
            for a2 in 0..4 {
                let value = lik[a1 * 4 + a2];
                prop_assert!(value.is_finite());
                prop_assert!(value >= 0.0);
                prop_assert_eq!(value, lik[a2 * 4 + a1]);
            }
        }
    }

    #[test]
    fn unanimous_reads_leave_their_homozygote_unpenalised(
        base in 0u8..4,
        depth in 1usize..50,
        quality in 20u8..50,
    ) {
        let model = ErrorModel::new(0.17).unwrap();
        let mut rng = SmallRng::seed_from_u64(0);
        let reads: Vec<ReadObservation> = (0..depth)
            .map(|i| ReadObservation {
                sample: 0,
                base,
                base_quality: quality,
                map_quality: 60,
                is_reverse: i % 2 == 0,
            })
            .collect();

        let lik = model.genotype_likelihoods(&reads, &mut rng);
        let own = usize::from(base);
        prop_assert_eq!(lik[own * 4 + own], 0.0);
        for a1 in 0..4 {
            for a2 in a1..4 {
                if (a1, a2) != (own, own) {
                    prop_assert!(lik[a1 * 4 + a2] > 0.0);
                }
            }
        }
    }

    #[test]
    fn call_word_fields_survive_packing(
        allele1 in 0u8..4,
        allele2 in 0u8..4,
        depth in any::<u16>(),
        snp_quality in any::<u16>(),
        rms_quality in any::<u16>(),
    ) {
        let call = CallWord::new(allele1, allele2, depth, snp_quality, rms_quality);
        prop_assert_eq!(call.alleles(), (allele1, allele2));
        prop_assert_eq!(call.depth(), depth);
        prop_assert_eq!(call.snp_quality(), snp_quality);
        prop_assert_eq!(call.rms_quality(), rms_quality);
        prop_assert!(!call.passes_filter());
        prop_assert!(!call.is_variant());
    }

    #[test]
    fn encode_always_selects_a_minimal_genotype(
        costs in proptest::collection::vec(0.0f64..1000.0, 10),
    ) {
        // Fill the unordered upper triangle and mirror it.
        let mut lik = [0.0f64; 16];
        let mut idx = 0;
        for a1 in 0..4 {
            for a2 in a1..4 {
                lik[a1 * 4 + a2] = costs[idx];
                lik[a2 * 4 + a1] = costs[idx];
                idx += 1;
            }
        }

        let call = encode_consensus(&lik, 10, 50);
        let (a1, a2) = call.alleles();
        let chosen = lik[usize::from(a1) * 4 + usize::from(a2)];
        for value in lik {
            prop_assert!(chosen <= value);
        }
    }
}
