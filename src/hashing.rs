//! Deterministic hashing and traffic bucketing.
//!
//! All bucketing in this crate runs through a single MurmurHash3-x86-32
//! call with a fixed seed, so that two processes holding the same
//! settings snapshot always bucket a given user identically.

use murmur3::murmur3_32;

/// Seed used for every bucketing hash. Matches the reference SDKs; do not change,
/// it would invalidate stickiness for anyone upgrading in place.
pub const HASH_SEED: u32 = 1;

const MAX_HASH_VALUE: f64 = 4_294_967_296.0; // 2^32

/// `MurmurHash3_x86_32(key, seed=1) & 0xFFFFFFFF`
pub fn hash(key: &str) -> u32 {
    let mut cursor = std::io::Cursor::new(key.as_bytes());
    murmur3_32(&mut cursor, HASH_SEED).expect("murmur3_32 over an in-memory cursor cannot fail")
}

/// `floor((max * hash/2^32 + 1) * multiplier)`
pub fn bucket_value(hash_value: u32, max_value: u32, multiplier: u32) -> u32 {
    let ratio = f64::from(hash_value) / MAX_HASH_VALUE;
    ((f64::from(max_value) * ratio + 1.0) * f64::from(multiplier)).floor() as u32
}

/// Convenience: hash `key` then bucket it into `[1, max_value]`.
pub fn bucket_for_user(key: &str, max_value: u32) -> u32 {
    bucket_value(hash(key), max_value, 1)
}

/// A contiguous, 1-indexed range assigned to a weighted item during allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Range {
    pub start: i64,
    pub end: i64,
}

impl Range {
    pub const NEVER: Range = Range { start: -1, end: -1 };

    pub fn contains(&self, value: u32) -> bool {
        self.start >= 0 && (value as i64) >= self.start && (value as i64) <= self.end
    }
}

/// Allocates weighted ranges across `[1, max_value]` (or `[0, max_value)` when
/// `zero_indexed` is set, as MEG arbitration requires). Weights that do not sum
/// to 100 are normalized first; an all-zero input is treated as equal weighting.
pub fn allocate_ranges(weights: &[f64], max_value: u32, zero_indexed: bool) -> Vec<Range> {
    let total: f64 = weights.iter().sum();
    let normalized: Vec<f64> = if total <= 0.0 {
        let equal = 100.0 / weights.len().max(1) as f64;
        weights.iter().map(|_| equal).collect()
    } else {
        weights.iter().map(|w| w * 100.0 / total).collect()
    };

    let mut cursor: i64 = if zero_indexed { 0 } else { 0 };
    let mut ranges = Vec::with_capacity(normalized.len());
    for weight in normalized {
        let step = ((weight * f64::from(max_value) / 100.0).ceil() as i64).min(max_value as i64);
        if step == 0 {
            ranges.push(Range::NEVER);
            continue;
        }
        if zero_indexed {
            let start = cursor;
            let end = cursor + step;
            ranges.push(Range { start, end });
            cursor = end;
        } else {
            let start = cursor + 1;
            let end = cursor + step;
            ranges.push(Range { start, end });
            cursor = end;
        }
    }
    ranges
}

#[cfg(test)]
mod hashing_tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash("Ashley"), hash("Ashley"));
        assert_ne!(hash("Ashley"), hash("Brian"));
    }

    #[test]
    fn bucket_value_is_bounded() {
        for key in ["a", "b", "c", "d", "e"] {
            let v = bucket_for_user(key, 10000);
            assert!(v >= 1 && v <= 10000);
        }
    }

    #[test]
    fn allocate_ranges_partitions_without_overlap() {
        let ranges = allocate_ranges(&[50.0, 50.0], 10000, false);
        assert_eq!(ranges[0], Range { start: 1, end: 5000 });
        assert_eq!(ranges[1], Range { start: 5001, end: 10000 });
    }

    #[test]
    fn allocate_ranges_equalizes_zero_weights() {
        let ranges = allocate_ranges(&[0.0, 0.0], 100, false);
        assert_eq!(ranges[0].end - ranges[0].start + 1, 50);
        assert_eq!(ranges[1].end - ranges[1].start + 1, 50);
    }

    #[test]
    fn allocate_ranges_zero_indexed_for_meg() {
        let ranges = allocate_ranges(&[50.0, 50.0], 10000, true);
        assert_eq!(ranges[0], Range { start: 0, end: 5000 });
        assert_eq!(ranges[1], Range { start: 5000, end: 10000 });
    }
}
