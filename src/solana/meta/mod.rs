// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Transaction status meta: one sum type over the three on-the-wire
//! schemas, and `parse_any_meta` which probes them in order (current
//! protobuf, legacy-latest, legacy-oldest) and returns the first parse
//! that consumes the input.

pub mod error;
pub mod legacy;
pub mod proto;

pub use error::{InstructionError, TransactionError};
pub use legacy::{LegacyMetaLatest, LegacyMetaOldest};

use quick_protobuf::{BytesReader, MessageRead, MessageWrite, Writer};

use super::{Pubkey, SolanaError};
use crate::solana::wire::Decoder;

#[derive(Debug, Clone, PartialEq)]
pub enum TxMeta {
    Current(proto::TransactionStatusMeta),
    LegacyLatest(LegacyMetaLatest),
    LegacyOldest(LegacyMetaOldest),
}

impl TxMeta {
    pub fn schema_name(&self) -> &'static str {
        match self {
            Self::Current(_) => "protobuf",
            Self::LegacyLatest(_) => "legacy-latest",
            Self::LegacyOldest(_) => "legacy-oldest",
        }
    }

    /// The decoded transaction error, if the transaction failed.
    pub fn err(&self) -> Result<Option<TransactionError>, SolanaError> {
        match self {
            Self::Current(meta) => match &meta.err {
                None => Ok(None),
                Some(wrapped) => {
                    let mut d = Decoder::new(&wrapped.err);
                    let err = TransactionError::decode(&mut d)?;
                    d.finish("protobuf transaction error")?;
                    Ok(Some(err))
                }
            },
            Self::LegacyLatest(meta) => Ok(meta.err.clone()),
            Self::LegacyOldest(meta) => Ok(meta.err.clone()),
        }
    }

    pub fn is_failed(&self) -> Result<bool, SolanaError> {
        Ok(self.err()?.is_some())
    }

    pub fn fee(&self) -> u64 {
        match self {
            Self::Current(m) => m.fee,
            Self::LegacyLatest(m) => m.fee,
            Self::LegacyOldest(m) => m.fee,
        }
    }

    /// Addresses loaded through address-table lookups. Only the protobuf
    /// schema carries them; v0 transactions never shipped with legacy metas.
    pub fn loaded_addresses(&self) -> (Vec<Pubkey>, Vec<Pubkey>) {
        match self {
            Self::Current(m) => (
                collect_keys(&m.loaded_writable_addresses),
                collect_keys(&m.loaded_readonly_addresses),
            ),
            _ => (Vec::new(), Vec::new()),
        }
    }
}

fn collect_keys(raw: &[Vec<u8>]) -> Vec<Pubkey> {
    raw.iter()
        .filter_map(|bytes| Some(Pubkey(bytes.as_slice().try_into().ok()?)))
        .collect()
}

/// Parse a raw (already decompressed) status meta under the first matching
/// schema.
pub fn parse_any_meta(bytes: &[u8]) -> Result<TxMeta, SolanaError> {
    if let Ok(meta) = decode_protobuf_meta(bytes) {
        return Ok(TxMeta::Current(meta));
    }
    if let Ok(meta) = LegacyMetaLatest::decode(bytes) {
        return Ok(TxMeta::LegacyLatest(meta));
    }
    if let Ok(meta) = LegacyMetaOldest::decode(bytes) {
        return Ok(TxMeta::LegacyOldest(meta));
    }
    Err(SolanaError::UnknownMetaSchema)
}

/// Metas are stored zstd-compressed in the archives.
pub fn decompress_and_parse(compressed: &[u8]) -> Result<TxMeta, SolanaError> {
    let raw = zstd::stream::decode_all(compressed).map_err(|e| SolanaError::Zstd(e.to_string()))?;
    parse_any_meta(&raw)
}

pub fn decode_protobuf_meta(bytes: &[u8]) -> Result<proto::TransactionStatusMeta, SolanaError> {
    // A protobuf reader skips unknown fields, which would let bincode-layout
    // legacy bytes "parse" into an empty meta. Require the exact field/wire
    // shape of the schema before handing the bytes to the reader.
    if !plausible_meta_wire(bytes) {
        return Err(SolanaError::malformed(
            "protobuf meta",
            "not in TransactionStatusMeta wire shape",
        ));
    }
    let mut reader = BytesReader::from_bytes(bytes);
    proto::TransactionStatusMeta::from_reader(&mut reader, bytes)
        .map_err(|e| SolanaError::malformed("protobuf meta", e))
}

fn plausible_meta_wire(bytes: &[u8]) -> bool {
    use integer_encoding::VarInt;
    let mut pos = 0usize;
    while pos < bytes.len() {
        let Some((tag, n)) = u64::decode_var(&bytes[pos..]) else {
            return false;
        };
        pos += n;
        let field = tag >> 3;
        let wire = tag & 0x7;
        let wire_ok = match field {
            // Scalar varint fields (packed repeateds may also arrive
            // unpacked for 3 and 4).
            2 | 10 | 11 | 15 | 16 => wire == 0,
            3 | 4 => wire == 0 || wire == 2,
            // Length-delimited messages, strings and bytes.
            1 | 5 | 6 | 7 | 8 | 9 | 12 | 13 | 14 => wire == 2,
            _ => false,
        };
        if !wire_ok {
            return false;
        }
        match wire {
            0 => {
                let Some((_, n)) = u64::decode_var(&bytes[pos..]) else {
                    return false;
                };
                pos += n;
            }
            2 => {
                let Some((len, n)) = u64::decode_var(&bytes[pos..]) else {
                    return false;
                };
                pos += n;
                let Some(end) = pos.checked_add(len as usize) else {
                    return false;
                };
                if end > bytes.len() {
                    return false;
                }
                pos = end;
            }
            _ => return false,
        }
    }
    true
}

pub fn encode_protobuf_meta(
    meta: &proto::TransactionStatusMeta,
) -> Result<Vec<u8>, SolanaError> {
    let mut out = Vec::with_capacity(meta.get_size());
    let mut writer = Writer::new(&mut out);
    meta.write_message(&mut writer)
        .map_err(|e| SolanaError::malformed("protobuf meta", e))?;
    Ok(out)
}

/// Rewards sidecars reuse the protobuf `Rewards` message, zstd-compressed.
pub fn decompress_and_parse_rewards(
    compressed: &[u8],
) -> Result<proto::Rewards, SolanaError> {
    let raw = zstd::stream::decode_all(compressed).map_err(|e| SolanaError::Zstd(e.to_string()))?;
    let mut reader = BytesReader::from_bytes(&raw);
    proto::Rewards::from_reader(&mut reader, &raw)
        .map_err(|e| SolanaError::malformed("protobuf rewards", e))
}

pub fn compress(raw: &[u8]) -> Result<Vec<u8>, SolanaError> {
    zstd::stream::encode_all(raw, 0).map_err(|e| SolanaError::Zstd(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_proto_meta() -> proto::TransactionStatusMeta {
        proto::TransactionStatusMeta {
            fee: 5000,
            pre_balances: vec![10_000, 0],
            post_balances: vec![4_000, 1_000],
            log_messages: vec!["Program log: ok".into()],
            loaded_writable_addresses: vec![vec![3u8; 32]],
            compute_units_consumed: Some(1234),
            ..Default::default()
        }
    }

    #[test]
    fn protobuf_meta_roundtrip() {
        let meta = sample_proto_meta();
        let bytes = encode_protobuf_meta(&meta).unwrap();
        let parsed = parse_any_meta(&bytes).unwrap();
        match parsed {
            TxMeta::Current(decoded) => assert_eq!(decoded, meta),
            other => panic!("parsed as {}", other.schema_name()),
        }
    }

    #[test]
    fn legacy_latest_is_recognised() {
        let meta = LegacyMetaLatest {
            fee: 1,
            pre_balances: vec![5],
            post_balances: vec![4],
            log_messages: Some(vec!["x".into()]),
            ..Default::default()
        };
        let parsed = parse_any_meta(&meta.encode()).unwrap();
        match parsed {
            TxMeta::LegacyLatest(decoded) => assert_eq!(decoded, meta),
            other => panic!("parsed as {}", other.schema_name()),
        }
    }

    #[test]
    fn legacy_oldest_is_recognised() {
        let meta = LegacyMetaOldest {
            err: Some(TransactionError::BlockhashNotFound),
            fee: 10,
            pre_balances: vec![],
            post_balances: vec![],
        };
        let parsed = parse_any_meta(&meta.encode()).unwrap();
        match parsed {
            TxMeta::LegacyOldest(decoded) => assert_eq!(decoded, meta),
            other => panic!("parsed as {}", other.schema_name()),
        }
        assert!(parsed.is_failed().unwrap());
    }

    #[test]
    fn err_is_decoded_from_protobuf_wrapper() {
        let err = TransactionError::InstructionError(2, InstructionError::Custom(11));
        let mut enc = crate::solana::wire::Encoder::new();
        err.encode(&mut enc);
        let meta = proto::TransactionStatusMeta {
            err: Some(proto::TransactionError {
                err: enc.into_bytes(),
            }),
            ..Default::default()
        };
        let tx_meta = TxMeta::Current(meta);
        assert_eq!(tx_meta.err().unwrap(), Some(err));
    }

    #[test]
    fn compressed_roundtrip() {
        let meta = sample_proto_meta();
        let compressed = compress(&encode_protobuf_meta(&meta).unwrap()).unwrap();
        let parsed = decompress_and_parse(&compressed).unwrap();
        assert_eq!(parsed, TxMeta::Current(meta));
    }

    #[test]
    fn garbage_is_not_any_schema() {
        assert!(matches!(
            parse_any_meta(&[0xff, 0xfe, 0xfd]),
            Err(SolanaError::UnknownMetaSchema)
        ));
    }

    #[test]
    fn rewards_roundtrip() {
        let rewards = proto::Rewards {
            rewards: vec![proto::Reward {
                pubkey: "abc".into(),
                lamports: -7,
                post_balance: 20,
                reward_type: proto::RewardType::Staking,
                commission: String::new(),
            }],
        };
        let mut out = Vec::new();
        let mut w = Writer::new(&mut out);
        rewards.write_message(&mut w).unwrap();
        let compressed = compress(&out).unwrap();
        let decoded = decompress_and_parse_rewards(&compressed).unwrap();
        assert_eq!(decoded, rewards);
    }
}
