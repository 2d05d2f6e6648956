use xxhash_rust::xxh3::{xxh3_64, xxh3_64_with_seed};

/// Platform- and release-stable hash of a feature key.
///
/// Partition assignment is persisted on disk, so this must never change for a
/// given input.
pub fn stable_hash_str(seed: u64, value: &str) -> u64 {
    if seed == 0 {
        xxh3_64(value.as_bytes())
    } else {
        xxh3_64_with_seed(value.as_bytes(), seed)
    }
}

/// Partition that owns `key` in a store split `num_partitions` ways.
pub fn partition_for_key(key: &str, num_partitions: usize) -> usize {
    if num_partitions <= 1 {
        return 0;
    }
    (stable_hash_str(0, key) % num_partitions as u64) as usize
}
