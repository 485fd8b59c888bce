// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::solana::Pubkey;

/// Genesis manifest for epoch 0, produced by the ingestion tooling:
/// the genesis hash and the cluster creation time. Slot 0 responses and
/// `getGenesisHash` derive from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenesisInfo {
    /// Base58 genesis hash.
    pub hash: String,
    /// Cluster creation time, unix seconds.
    pub creation_time: i64,
}

impl GenesisInfo {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let info: Self = serde_yaml::from_str(&raw)?;
        // The hash field has to be a well-formed 32-byte base58 string.
        info.hash
            .parse::<Pubkey>()
            .map_err(|e| anyhow::anyhow!("genesis hash: {e}"))?;
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genesis.yaml");
        let hash = bs58::encode([7u8; 32]).into_string();
        std::fs::write(
            &path,
            format!("hash: {hash}\ncreation_time: 1584368940\n"),
        )
        .unwrap();
        let info = GenesisInfo::load(&path).unwrap();
        assert_eq!(info.hash, hash);
        assert_eq!(info.creation_time, 1_584_368_940);
    }

    #[test]
    fn bad_hash_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genesis.yaml");
        std::fs::write(&path, "hash: nope\ncreation_time: 0\n").unwrap();
        assert!(GenesisInfo::load(&path).is_err());
    }
}
