// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Stable 64-bit key hashing for the on-disk index family.
//!
//! The hash has to be identical across builds, platforms and crate
//! versions, because it is baked into sealed files. FNV-1a fits: tiny
//! state, no per-process randomness, and the seed folds into the offset
//! basis so each bucket gets an independent hash function.

use std::hash::Hasher;

use fnv::FnvHasher;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Seed-free hash, used for bucket selection and filter fingerprints.
pub fn hash_key(key: &[u8]) -> u64 {
    let mut hasher = FnvHasher::with_key(FNV_OFFSET_BASIS);
    hasher.write(key);
    hasher.finish()
}

/// Per-bucket seeded hash. The same key hashes differently under different
/// seeds, which is what lets the writer retry a bucket until its entries
/// are collision-free.
pub fn hash_key_seeded(seed: u32, key: &[u8]) -> u64 {
    let basis = FNV_OFFSET_BASIS ^ u64::from(seed).wrapping_mul(FNV_PRIME);
    let mut hasher = FnvHasher::with_key(basis);
    hasher.write(key);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable() {
        // Pinned values; a change here breaks every sealed index in the wild.
        assert_eq!(hash_key(b""), FNV_OFFSET_BASIS);
        assert_eq!(hash_key(b"chronicle"), hash_key(b"chronicle"));
        assert_ne!(hash_key(b"a"), hash_key(b"b"));
    }

    #[test]
    fn seeds_change_the_hash() {
        let key = b"signature-bytes";
        assert_eq!(hash_key_seeded(0, key), hash_key_seeded(0, key));
        assert_ne!(hash_key_seeded(0, key), hash_key_seeded(1, key));
    }
}
