use std::collections::HashMap;

use camguard_core::Descriptor;
use rand::SeedableRng;
use rand::seq::index::sample;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{DescriptorMatcher, KnnMatch, two_nearest};

const DESCRIPTOR_BITS: usize = 256;
/// Probe sets grow as `C(key_size, level)`; level 3 on 32-bit keys is 5489 masks
pub const MAX_MULTI_PROBE_LEVEL: usize = 3;

/// Multi-probe LSH index parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LshParams {
    /// Number of independent hash tables
    pub table_number: usize,
    /// Bits per hash key (1..=32)
    pub key_size: usize,
    /// Neighbouring buckets within this many flipped key bits are probed too (0..=3)
    pub multi_probe_level: usize,
    /// Seed for the bit selection of every table
    pub seed: u64,
}

impl Default for LshParams {
    fn default() -> Self {
        Self {
            table_number: 6,
            key_size: 12,
            multi_probe_level: 1,
            seed: 0x15ac_a11e,
        }
    }
}

impl LshParams {
    pub fn validate(&self) -> Result<(), String> {
        if self.table_number == 0 {
            return Err("table_number must be at least 1".to_string());
        }
        if self.key_size == 0 || self.key_size > 32 {
            return Err(format!("key_size {} outside 1..=32", self.key_size));
        }
        if self.multi_probe_level > MAX_MULTI_PROBE_LEVEL {
            return Err(format!(
                "multi_probe_level {} above {MAX_MULTI_PROBE_LEVEL}",
                self.multi_probe_level
            ));
        }
        if self.multi_probe_level > self.key_size {
            return Err(format!(
                "multi_probe_level {} exceeds key_size {}",
                self.multi_probe_level, self.key_size
            ));
        }
        Ok(())
    }
}

/// Approximate matcher hashing descriptors on random bit subsets.
///
/// Tables are rebuilt from the train set on every call, so the matcher
/// itself is stateless apart from the chosen bit positions.
#[derive(Debug, Clone)]
pub struct LshMatcher {
    params: LshParams,
    /// Bit positions sampled for each table
    table_bits: Vec<Vec<usize>>,
    /// Key XOR masks visited per lookup, ordered by flipped-bit count
    probes: Vec<u32>,
}

impl LshMatcher {
    /// Parameters outside their valid range are clamped.
    pub fn new(params: LshParams) -> Self {
        let key_size = params.key_size.clamp(1, 32);
        let table_number = params.table_number.max(1);
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let table_bits = (0..table_number)
            .map(|_| sample(&mut rng, DESCRIPTOR_BITS, key_size).into_vec())
            .collect();
        let level = params.multi_probe_level.min(key_size).min(MAX_MULTI_PROBE_LEVEL);
        let probes = probe_masks(key_size, level);
        Self { params, table_bits, probes }
    }

    pub fn params(&self) -> &LshParams {
        &self.params
    }

    fn key(bits: &[usize], d: &Descriptor) -> u32 {
        bits.iter().enumerate().fold(0u32, |key, (i, &b)| {
            key | ((((d[b / 8] >> (b % 8)) & 1) as u32) << i)
        })
    }
}

/// All masks over `key_size` bits with at most `level` bits set
fn probe_masks(key_size: usize, level: usize) -> Vec<u32> {
    let mut masks = vec![0u32];
    let mut frontier = vec![(0u32, 0usize)];
    for _ in 0..level {
        let mut next = Vec::new();
        for &(mask, lowest) in &frontier {
            for bit in lowest..key_size {
                let m = mask | (1 << bit);
                masks.push(m);
                next.push((m, bit + 1));
            }
        }
        frontier = next;
    }
    masks
}

impl DescriptorMatcher for LshMatcher {
    fn knn_match(&self, query: &[Descriptor], train: &[Descriptor]) -> Vec<KnnMatch> {
        if train.is_empty() {
            return Vec::new();
        }

        let tables: Vec<HashMap<u32, Vec<usize>>> = self
            .table_bits
            .par_iter()
            .map(|bits| {
                let mut table: HashMap<u32, Vec<usize>> = HashMap::new();
                for (i, d) in train.iter().enumerate() {
                    table.entry(Self::key(bits, d)).or_default().push(i);
                }
                table
            })
            .collect();

        let matches: Vec<KnnMatch> = query
            .par_iter()
            .enumerate()
            .filter_map(|(qi, q)| {
                let mut candidates: Vec<usize> = Vec::new();
                for (bits, table) in self.table_bits.iter().zip(&tables) {
                    let key = Self::key(bits, q);
                    for probe in &self.probes {
                        if let Some(bucket) = table.get(&(key ^ probe)) {
                            candidates.extend_from_slice(bucket);
                        }
                    }
                }
                candidates.sort_unstable();
                candidates.dedup();
                two_nearest(qi, q, train, candidates)
            })
            .collect();

        debug!(
            queries = query.len(),
            train = train.len(),
            matched = matches.len(),
            "lsh knn match"
        );
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{flip_bits, random_descriptors};
    use crate::{BruteForceMatcher, MatcherKind};

    #[test]
    fn probe_masks_cover_hamming_ball() {
        assert_eq!(probe_masks(12, 0), vec![0]);
        assert_eq!(probe_masks(12, 1).len(), 13);
        // 1 + 12 + 66
        assert_eq!(probe_masks(12, 2).len(), 79);
        let masks = probe_masks(4, 4);
        assert_eq!(masks.len(), 16);
    }

    #[test]
    fn same_seed_same_tables() {
        let a = LshMatcher::new(LshParams::default());
        let b = LshMatcher::new(LshParams::default());
        assert_eq!(a.table_bits, b.table_bits);
        for bits in &a.table_bits {
            assert_eq!(bits.len(), 12);
            assert!(bits.iter().all(|&b| b < DESCRIPTOR_BITS));
        }
    }

    #[test]
    fn identical_descriptors_match_exactly() {
        let train = random_descriptors(300, 7);
        let matches = LshMatcher::new(LshParams::default()).knn_match(&train, &train);
        assert_eq!(matches.len(), train.len());
        for (i, m) in matches.iter().enumerate() {
            assert_eq!(m.best.query_idx, i);
            assert_eq!(m.best.train_idx, i);
            assert_eq!(m.best.distance, 0);
        }
    }

    #[test]
    fn slightly_perturbed_queries_agree_with_brute_force() {
        let train = random_descriptors(200, 3);
        let query: Vec<Descriptor> = train
            .iter()
            .enumerate()
            .map(|(i, d)| flip_bits(d, &[i % 256, (i * 7 + 3) % 256]))
            .collect();
        let lsh = MatcherKind::Lsh.build(LshParams::default()).knn_match(&query, &train);
        let exact = BruteForceMatcher.knn_match(&query, &train);
        assert_eq!(lsh.len(), exact.len());
        for (a, b) in lsh.iter().zip(&exact) {
            assert_eq!(a.best, b.best);
        }
    }

    #[test]
    fn validate_rejects_oversized_keys() {
        assert!(LshParams::default().validate().is_ok());
        let bad = LshParams { key_size: 40, ..LshParams::default() };
        assert!(bad.validate().is_err());
        let bad = LshParams { table_number: 0, ..LshParams::default() };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn deep_multi_probe_is_rejected_and_clamped() {
        let deep = LshParams { key_size: 32, multi_probe_level: 32, ..LshParams::default() };
        assert!(deep.validate().is_err());
        let edge = LshParams { multi_probe_level: MAX_MULTI_PROBE_LEVEL, ..deep };
        assert!(edge.validate().is_ok());

        // Unvalidated params still build a bounded probe set
        let matcher = LshMatcher::new(deep);
        assert_eq!(matcher.probes.len(), 1 + 32 + 496 + 4960);
    }
}
