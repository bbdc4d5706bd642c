//! Nearest-neighbour search over 256-bit binary descriptors.

use camguard_core::Descriptor;
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod lsh;

pub use lsh::{LshMatcher, LshParams, MAX_MULTI_PROBE_LEVEL};

/// Number of differing bits between two descriptors
#[inline]
pub fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// A query descriptor paired with a train descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorMatch {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: u32,
}

/// Two nearest train descriptors for one query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnnMatch {
    pub best: DescriptorMatch,
    /// Absent when only one candidate was found
    pub second: Option<DescriptorMatch>,
}

impl KnnMatch {
    /// Lowe's ratio test; a match without a runner-up always passes.
    pub fn passes_ratio(&self, ratio: f32) -> bool {
        match self.second {
            Some(second) => (self.best.distance as f32) < ratio * second.distance as f32,
            None => true,
        }
    }
}

/// Finds the two nearest train descriptors of every query.
///
/// Queries for which no candidate is found are left out of the result;
/// the rest keep query order.
pub trait DescriptorMatcher: Send + Sync {
    fn knn_match(&self, query: &[Descriptor], train: &[Descriptor]) -> Vec<KnnMatch>;
}

/// Exhaustive search
#[derive(Debug, Clone, Copy, Default)]
pub struct BruteForceMatcher;

impl DescriptorMatcher for BruteForceMatcher {
    fn knn_match(&self, query: &[Descriptor], train: &[Descriptor]) -> Vec<KnnMatch> {
        query
            .par_iter()
            .enumerate()
            .filter_map(|(qi, q)| two_nearest(qi, q, train, 0..train.len()))
            .collect()
    }
}

/// Best and runner-up among `candidates`; ties go to the lower train index.
pub(crate) fn two_nearest(
    query_idx: usize,
    q: &Descriptor,
    train: &[Descriptor],
    candidates: impl IntoIterator<Item = usize>,
) -> Option<KnnMatch> {
    let mut best: Option<DescriptorMatch> = None;
    let mut second: Option<DescriptorMatch> = None;

    for train_idx in candidates {
        let m = DescriptorMatch {
            query_idx,
            train_idx,
            distance: hamming(q, &train[train_idx]),
        };
        let better = |cur: &Option<DescriptorMatch>| match cur {
            None => true,
            Some(c) => (m.distance, m.train_idx) < (c.distance, c.train_idx),
        };
        if better(&best) {
            second = best;
            best = Some(m);
        } else if better(&second) {
            second = Some(m);
        }
    }

    best.map(|best| KnnMatch { best, second })
}

/// Which nearest-neighbour backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MatcherKind {
    BruteForce,
    #[default]
    Lsh,
}

impl MatcherKind {
    pub fn build(self, lsh: LshParams) -> Box<dyn DescriptorMatcher> {
        match self {
            MatcherKind::BruteForce => Box::new(BruteForceMatcher),
            MatcherKind::Lsh => Box::new(LshMatcher::new(lsh)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    pub(crate) fn random_descriptors(n: usize, seed: u64) -> Vec<Descriptor> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let mut d = [0u8; 32];
                rng.fill(&mut d[..]);
                d
            })
            .collect()
    }

    pub(crate) fn flip_bits(d: &Descriptor, bits: &[usize]) -> Descriptor {
        let mut out = *d;
        for &b in bits {
            out[b / 8] ^= 1 << (b % 8);
        }
        out
    }

    #[test]
    fn hamming_counts_bits() {
        let a = [0u8; 32];
        assert_eq!(hamming(&a, &a), 0);
        assert_eq!(hamming(&a, &[0xff; 32]), 256);
        assert_eq!(hamming(&a, &flip_bits(&a, &[0, 9, 255])), 3);
    }

    #[test]
    fn brute_force_finds_two_nearest() {
        let base = [0u8; 32];
        let train = vec![
            flip_bits(&base, &[1, 2, 3, 4]),
            flip_bits(&base, &[1]),
            [0xff; 32],
            flip_bits(&base, &[7, 8]),
        ];
        let m = BruteForceMatcher.knn_match(&[base], &train);
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].best, DescriptorMatch { query_idx: 0, train_idx: 1, distance: 1 });
        assert_eq!(m[0].second.map(|s| s.train_idx), Some(3));
    }

    #[test]
    fn ties_prefer_lower_train_index() {
        let base = [0u8; 32];
        let train = vec![flip_bits(&base, &[5]), flip_bits(&base, &[6]), flip_bits(&base, &[7])];
        let m = BruteForceMatcher.knn_match(&[base], &train);
        assert_eq!(m[0].best.train_idx, 0);
        assert_eq!(m[0].second.map(|s| s.train_idx), Some(1));
    }

    #[test]
    fn empty_train_gives_no_matches() {
        assert!(BruteForceMatcher.knn_match(&random_descriptors(3, 1), &[]).is_empty());
    }

    #[test]
    fn ratio_test() {
        let mk = |d| DescriptorMatch { query_idx: 0, train_idx: 0, distance: d };
        let lone = KnnMatch { best: mk(40), second: None };
        assert!(lone.passes_ratio(0.7));
        let distinct = KnnMatch { best: mk(10), second: Some(mk(100)) };
        assert!(distinct.passes_ratio(0.7));
        let ambiguous = KnnMatch { best: mk(80), second: Some(mk(90)) };
        assert!(!ambiguous.passes_ratio(0.7));
    }

    proptest! {
        #[test]
        fn best_is_never_beaten(seed in 0u64..500, n in 1usize..40) {
            let train = random_descriptors(n, seed);
            let query = random_descriptors(4, seed + 10_000);
            let matches = BruteForceMatcher.knn_match(&query, &train);
            prop_assert_eq!(matches.len(), query.len());
            for m in matches {
                let q = &query[m.best.query_idx];
                for t in &train {
                    prop_assert!(m.best.distance <= hamming(q, t));
                }
                if let Some(s) = m.second {
                    prop_assert!(m.best.distance <= s.distance);
                    prop_assert_ne!(s.train_idx, m.best.train_idx);
                }
            }
        }
    }
}
