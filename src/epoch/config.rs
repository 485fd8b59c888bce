// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Per-epoch manifest: where the archive lives and where its indexes live.
//!
//! ```yaml
//! epoch: 42
//! data:
//!   filecoin_mode: false
//!   uri: /archives/epoch-42.car
//! indexes:
//!   cid_to_offset:
//!     uri: /indexes/epoch-42.cid-to-offset.index
//!   slot_to_cid:
//!     uri: /indexes/epoch-42.slot-to-cid.index
//!   sig_to_cid:
//!     uri: /indexes/epoch-42.sig-to-cid.index
//!   sig_exists:
//!     uri: /indexes/epoch-42.sig-exists.index
//!   gsfa:
//!     uri: /indexes/epoch-42.gsfa
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("parse error in {path}: {detail}")]
    Parse { path: String, detail: String },
    #[error("config {path} names no data source")]
    NoData { path: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UriRef {
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PiecesConfig {
    /// URI of the piece-list manifest (YAML list of piece URIs).
    pub metadata: Option<String>,
    /// URI of the storage-deal manifest; consumed by `check-deals`.
    pub deals: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DataConfig {
    #[serde(default)]
    pub filecoin_mode: bool,
    /// Single-archive URI; mutually exclusive with `pieces`.
    pub uri: Option<String>,
    pub pieces: Option<PiecesConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct IndexesConfig {
    pub cid_to_offset: Option<UriRef>,
    pub slot_to_cid: Option<UriRef>,
    pub sig_to_cid: Option<UriRef>,
    pub sig_exists: Option<UriRef>,
    pub slot_to_blocktime: Option<UriRef>,
    pub gsfa: Option<UriRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EpochConfig {
    pub epoch: u64,
    pub data: DataConfig,
    #[serde(default)]
    pub indexes: IndexesConfig,
    /// Genesis manifest, meaningful for epoch 0 only.
    pub genesis: Option<UriRef>,
    /// Network identifier cross-checked against index metadata.
    #[serde(default = "default_network")]
    pub network: String,
}

fn default_network() -> String {
    "mainnet".to_owned()
}

impl EpochConfig {
    /// Parse a YAML or JSON manifest; the extension picks the parser.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let config: Self = if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        {
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
                path: display.clone(),
                detail: e.to_string(),
            })?
        } else {
            serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
                path: display.clone(),
                detail: e.to_string(),
            })?
        };
        if config.data.uri.is_none()
            && config
                .data
                .pieces
                .as_ref()
                .is_none_or(|p| p.metadata.is_none())
        {
            return Err(ConfigError::NoData { path: display });
        }
        Ok(config)
    }

    pub fn is_config_file(path: &Path) -> bool {
        path.extension().is_some_and(|ext| {
            ext.eq_ignore_ascii_case("yaml")
                || ext.eq_ignore_ascii_case("yml")
                || ext.eq_ignore_ascii_case("json")
        })
    }
}

/// Piece-list manifest named by `data.pieces.metadata`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PieceList {
    pub pieces: Vec<String>,
}

impl PieceList {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: display,
            detail: e.to_string(),
        })
    }
}

/// Storage-deal manifest named by `data.pieces.deals`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DealList {
    pub deals: Vec<Deal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Deal {
    pub provider: String,
    pub piece_cid: String,
    pub url: Option<String>,
}

impl DealList {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: display,
            detail: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_manifest_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("epoch-42.yaml");
        std::fs::write(
            &path,
            r#"
epoch: 42
data:
  filecoin_mode: false
  uri: /archives/epoch-42.car
indexes:
  cid_to_offset:
    uri: /idx/epoch-42.cid.index
  slot_to_cid:
    uri: /idx/epoch-42.slot.index
  sig_to_cid:
    uri: /idx/epoch-42.sig.index
  gsfa:
    uri: /idx/epoch-42.gsfa
"#,
        )
        .unwrap();
        let config = EpochConfig::load(&path).unwrap();
        assert_eq!(config.epoch, 42);
        assert_eq!(config.network, "mainnet");
        assert_eq!(config.data.uri.as_deref(), Some("/archives/epoch-42.car"));
        assert!(config.indexes.gsfa.is_some());
        assert!(config.indexes.sig_exists.is_none());
    }

    #[test]
    fn json_manifest_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("epoch-0.json");
        std::fs::write(
            &path,
            r#"{
              "epoch": 0,
              "network": "devnet",
              "data": {"uri": "/archives/epoch-0.car"},
              "genesis": {"uri": "/archives/genesis.yaml"}
            }"#,
        )
        .unwrap();
        let config = EpochConfig::load(&path).unwrap();
        assert_eq!(config.epoch, 0);
        assert_eq!(config.network, "devnet");
        assert!(config.genesis.is_some());
    }

    #[test]
    fn missing_data_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "epoch: 1\ndata: {}\n").unwrap();
        assert!(matches!(
            EpochConfig::load(&path),
            Err(ConfigError::NoData { .. })
        ));
    }

    #[test]
    fn config_file_extensions() {
        assert!(EpochConfig::is_config_file(Path::new("a/epoch-1.yaml")));
        assert!(EpochConfig::is_config_file(Path::new("a/epoch-1.yml")));
        assert!(EpochConfig::is_config_file(Path::new("a/epoch-1.json")));
        assert!(!EpochConfig::is_config_file(Path::new("a/epoch-1.car")));
    }
}
