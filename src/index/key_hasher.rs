use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

/// Maps index keys to the 32-bit hash the extendible hash table routes
/// on. Implementations must be deterministic across runs: the placement
/// they produce is persisted to disk.
pub trait KeyHasher<K>: Send + Sync {
    fn hash_key(&self, key: &K) -> u32;
}

/// Default hasher: FxHash truncated to 32 bits. Fx is seed-free, so the
/// same key always lands in the same bucket across restarts.
#[derive(Debug, Clone, Copy, Default)]
pub struct FxKeyHasher;

impl<K: Hash + Send + Sync> KeyHasher<K> for FxKeyHasher {
    fn hash_key(&self, key: &K) -> u32 {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        hasher.finish() as u32
    }
}

/// Hashes a `u32` key to itself. Makes bucket placement predictable,
/// which the tests rely on to force specific split sequences.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityKeyHasher;

impl KeyHasher<u32> for IdentityKeyHasher {
    fn hash_key(&self, key: &u32) -> u32 {
        *key
    }
}
