//! Engine-wide tunables, centralized the way `cache::CacheConfig` centralizes
//! cache knobs rather than scattering magic numbers through call sites.

/// Tunable constants for the storage core. Defaults match the on-disk format
/// exactly; tests may shrink these to exercise boundary conditions cheaply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Physical WAL block size in bytes.
    pub wal_block_size: usize,
    /// Every Nth leaf entry carries a full-key anchor instead of a diff.
    pub entries_per_full_key: usize,
    /// Leaf entries per table leaf block before rotation.
    pub leaf_entries_per_index_entry: usize,
    /// Bytes per pool allocator chunk.
    pub pool_chunk_bytes: usize,
    /// Skiplist tower-height ladder, least to greatest.
    pub skiplist_ladder: [usize; 6],
    /// Entries held by the block cache.
    pub block_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            wal_block_size: 32_768,
            entries_per_full_key: 8,
            leaf_entries_per_index_entry: 512,
            pool_chunk_bytes: 128 * 1024 * 1024,
            skiplist_ladder: [8, 64, 512, 4096, 32768, 262144],
            block_cache_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.wal_block_size, 32_768);
        assert_eq!(cfg.entries_per_full_key, 8);
        assert_eq!(cfg.leaf_entries_per_index_entry, 512);
        assert_eq!(cfg.pool_chunk_bytes, 128 * 1024 * 1024);
        assert_eq!(cfg.skiplist_ladder, [8, 64, 512, 4096, 32768, 262144]);
    }
}
