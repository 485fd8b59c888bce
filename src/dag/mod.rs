// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Archive node kinds.
//!
//! Every payload stored in an epoch archive is a DAG-CBOR map whose `kind`
//! field selects one of seven variants. Links between nodes are CIDs; the
//! traversal order is bounded by the declared lists
//! (Epoch → Subset → Block → Entry → Transaction) and by DataFrame `next`
//! chains, so no cycle handling is required.

mod dataframe;

pub use dataframe::{checksum, reassemble, verify_hash, FrameFetch};

use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

pub const KIND_TRANSACTION: u64 = 0;
pub const KIND_ENTRY: u64 = 1;
pub const KIND_BLOCK: u64 = 2;
pub const KIND_SUBSET: u64 = 3;
pub const KIND_EPOCH: u64 = 4;
pub const KIND_REWARDS: u64 = 5;
pub const KIND_DATAFRAME: u64 = 6;

/// DAG-CBOR multicodec, used for node CIDs.
pub const DAG_CBOR: u64 = 0x71;

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("cbor decode: {0}")]
    Decode(String),
    #[error("cbor encode: {0}")]
    Encode(String),
    #[error("unknown node kind {0}")]
    UnknownKind(u64),
    #[error("expected {expected} node, found kind {found}")]
    WrongKind { expected: &'static str, found: u64 },
    #[error("dataframe chain too long (> {0} frames)")]
    ChainTooLong(usize),
    #[error("dataframe hash mismatch: declared {declared}, computed {computed}")]
    HashMismatch { declared: u64, computed: u64 },
    #[error("dataframe chain declares {declared} frames, assembled {assembled}")]
    ChainLengthMismatch { declared: u64, assembled: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochNode {
    pub kind: u64,
    pub epoch: u64,
    pub subsets: Vec<Cid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subset {
    pub kind: u64,
    /// First slot covered by this subset.
    pub first: u64,
    /// Last slot covered by this subset.
    pub last: u64,
    pub blocks: Vec<Cid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub kind: u64,
    pub slot: u64,
    pub entries: Vec<Cid>,
    pub meta: BlockMeta,
    /// Link to the Rewards node, or the sentinel CID when the block has none.
    pub rewards: Cid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockMeta {
    pub parent_slot: u64,
    pub blocktime: i64,
    pub block_height: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub kind: u64,
    pub num_hashes: u64,
    /// Proof-of-History hash after `num_hashes` iterations.
    pub hash: serde_bytes::ByteBuf,
    pub transactions: Vec<Cid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub kind: u64,
    /// Serialized transaction wire bytes, possibly chained.
    pub data: DataFrame,
    /// Zstd-compressed status meta, possibly chained.
    pub metadata: DataFrame,
    pub slot: u64,
    /// Deterministic position of the transaction within its block.
    pub index: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rewards {
    pub kind: u64,
    pub slot: u64,
    pub data: DataFrame,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    pub kind: u64,
    /// CRC-64 checksum over the fully reassembled stream, present on the
    /// first frame of a chain.
    pub hash: Option<u64>,
    pub index: Option<u64>,
    pub total: Option<u64>,
    pub data: serde_bytes::ByteBuf,
    pub next: Option<Vec<Cid>>,
}

impl DataFrame {
    pub fn wrap(data: Vec<u8>) -> Self {
        Self {
            kind: KIND_DATAFRAME,
            hash: None,
            index: None,
            total: None,
            data: serde_bytes::ByteBuf::from(data),
            next: None,
        }
    }

    /// True when the whole stream is inline in this frame.
    pub fn is_complete(&self) -> bool {
        self.next.as_ref().is_none_or(Vec::is_empty) && self.total.is_none_or(|t| t <= 1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Transaction(Transaction),
    Entry(Entry),
    Block(Block),
    Subset(Subset),
    Epoch(EpochNode),
    Rewards(Rewards),
    DataFrame(DataFrame),
}

impl Node {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Transaction(_) => "Transaction",
            Node::Entry(_) => "Entry",
            Node::Block(_) => "Block",
            Node::Subset(_) => "Subset",
            Node::Epoch(_) => "Epoch",
            Node::Rewards(_) => "Rewards",
            Node::DataFrame(_) => "DataFrame",
        }
    }
}

#[derive(Deserialize)]
struct KindProbe {
    kind: u64,
}

fn from_slice<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, NodeError> {
    serde_ipld_dagcbor::from_slice(bytes).map_err(|e| NodeError::Decode(e.to_string()))
}

/// Decode one archive payload into its node variant.
pub fn decode_node(bytes: &[u8]) -> Result<Node, NodeError> {
    let kind = from_slice::<KindProbe>(bytes)?.kind;
    Ok(match kind {
        KIND_TRANSACTION => Node::Transaction(from_slice(bytes)?),
        KIND_ENTRY => Node::Entry(from_slice(bytes)?),
        KIND_BLOCK => Node::Block(from_slice(bytes)?),
        KIND_SUBSET => Node::Subset(from_slice(bytes)?),
        KIND_EPOCH => Node::Epoch(from_slice(bytes)?),
        KIND_REWARDS => Node::Rewards(from_slice(bytes)?),
        KIND_DATAFRAME => Node::DataFrame(from_slice(bytes)?),
        other => return Err(NodeError::UnknownKind(other)),
    })
}

macro_rules! typed_decode {
    ($fn_name:ident, $variant:ident, $ty:ty) => {
        pub fn $fn_name(bytes: &[u8]) -> Result<$ty, NodeError> {
            match decode_node(bytes)? {
                Node::$variant(n) => Ok(n),
                other => Err(NodeError::WrongKind {
                    expected: stringify!($variant),
                    found: node_kind(&other),
                }),
            }
        }
    };
}

fn node_kind(node: &Node) -> u64 {
    match node {
        Node::Transaction(_) => KIND_TRANSACTION,
        Node::Entry(_) => KIND_ENTRY,
        Node::Block(_) => KIND_BLOCK,
        Node::Subset(_) => KIND_SUBSET,
        Node::Epoch(_) => KIND_EPOCH,
        Node::Rewards(_) => KIND_REWARDS,
        Node::DataFrame(_) => KIND_DATAFRAME,
    }
}

typed_decode!(decode_block, Block, Block);
typed_decode!(decode_entry, Entry, Entry);
typed_decode!(decode_transaction, Transaction, Transaction);
typed_decode!(decode_rewards, Rewards, Rewards);
typed_decode!(decode_dataframe, DataFrame, DataFrame);
typed_decode!(decode_epoch, Epoch, EpochNode);
typed_decode!(decode_subset, Subset, Subset);

/// Encode a node payload as DAG-CBOR. The write path lives in the index
/// builders and in tests; archives themselves are produced upstream.
pub fn encode<T: Serialize>(node: &T) -> Result<Vec<u8>, NodeError> {
    serde_ipld_dagcbor::to_vec(node).map_err(|e| NodeError::Encode(e.to_string()))
}

/// CID of a DAG-CBOR payload.
pub fn cid_for(bytes: &[u8]) -> Cid {
    Cid::new_v1(DAG_CBOR, Code::Sha2_256.digest(bytes))
}

/// The agreed placeholder CID meaning "this link is intentionally empty",
/// used for blocks without rewards.
pub fn dummy_cid() -> Cid {
    static DUMMY: OnceLock<Cid> = OnceLock::new();
    *DUMMY.get_or_init(|| Cid::new_v1(DAG_CBOR, Code::Sha2_256.digest(b"chronicle:empty")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Block {
        Block {
            kind: KIND_BLOCK,
            slot: 432_100,
            entries: vec![cid_for(b"entry-0"), cid_for(b"entry-1")],
            meta: BlockMeta {
                parent_slot: 432_099,
                blocktime: 1_690_000_000,
                block_height: Some(400_000),
            },
            rewards: dummy_cid(),
        }
    }

    #[test]
    fn node_roundtrip_dispatches_on_kind() {
        let block = sample_block();
        let bytes = encode(&block).unwrap();
        match decode_node(&bytes).unwrap() {
            Node::Block(b) => assert_eq!(b, block),
            other => panic!("decoded as {}", other.kind_name()),
        }
        assert_eq!(decode_block(&bytes).unwrap(), block);
    }

    #[test]
    fn typed_decode_rejects_wrong_kind() {
        let entry = Entry {
            kind: KIND_ENTRY,
            num_hashes: 12,
            hash: serde_bytes::ByteBuf::from(vec![7u8; 32]),
            transactions: vec![],
        };
        let bytes = encode(&entry).unwrap();
        let err = decode_block(&bytes).unwrap_err();
        assert!(matches!(
            err,
            NodeError::WrongKind {
                expected: "Block",
                found: KIND_ENTRY
            }
        ));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        #[derive(Serialize)]
        struct Bogus {
            kind: u64,
        }
        let bytes = encode(&Bogus { kind: 99 }).unwrap();
        assert!(matches!(
            decode_node(&bytes),
            Err(NodeError::UnknownKind(99))
        ));
    }

    #[test]
    fn dummy_cid_is_stable() {
        assert_eq!(dummy_cid(), dummy_cid());
        assert_eq!(dummy_cid().to_bytes().len(), 36);
    }
}
