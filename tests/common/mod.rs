// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Shared fixtures: a synthetic epoch archive with blocks, entries,
//! transactions and metas, plus the sealed indexes over it.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use cid::Cid;
use integer_encoding::VarIntWriter;

use chronicle::car::{CarHeader, MultiCarStream};
use chronicle::dag::{
    self, Block, BlockMeta, DataFrame, Entry, EpochNode, Node, Subset, Transaction, KIND_BLOCK,
    KIND_DATAFRAME, KIND_ENTRY, KIND_EPOCH, KIND_SUBSET, KIND_TRANSACTION,
};
use chronicle::gsfa::{GsfaWriter, LogRecord};
use chronicle::index::{
    BucketteerWriter, CidToOffsetWriter, IndexMetadata, OffsetAndSize, SigToCidWriter,
    SlotToBlocktimeWriter, SlotToCidWriter,
};
use chronicle::solana::meta::proto;
use chronicle::solana::{
    encode_transaction, CompiledInstruction, Message, MessageHeader, Pubkey, Signature,
    VersionedMessage, VersionedTransaction,
};

pub struct TxSpec {
    pub tx: VersionedTransaction,
    pub meta: Option<proto::TransactionStatusMeta>,
    /// Store the meta as a two-frame chain instead of inline.
    pub chain_meta: bool,
}

pub struct BlockSpec {
    pub slot: u64,
    pub parent_slot: u64,
    pub blocktime: i64,
    pub txs: Vec<TxSpec>,
}

pub fn legacy_tx(payer: Pubkey, program: Pubkey, sig_byte: u8) -> VersionedTransaction {
    VersionedTransaction {
        signatures: vec![Signature([sig_byte; 64])],
        message: VersionedMessage::Legacy(Message {
            header: MessageHeader {
                num_required_signatures: 1,
                num_readonly_signed_accounts: 0,
                num_readonly_unsigned_accounts: 1,
            },
            account_keys: vec![payer, program],
            recent_blockhash: [9u8; 32],
            instructions: vec![CompiledInstruction {
                program_id_index: 1,
                accounts: vec![0],
                data: vec![2, 0, 0, 0],
            }],
        }),
    }
}

pub fn vote_tx(voter: Pubkey, sig_byte: u8) -> VersionedTransaction {
    let mut tx = legacy_tx(voter, *chronicle::solana::vote_program_id(), sig_byte);
    if let VersionedMessage::Legacy(m) = &mut tx.message {
        m.instructions[0].data = vec![1, 2, 3];
    }
    tx
}

pub fn ok_meta(fee: u64) -> proto::TransactionStatusMeta {
    proto::TransactionStatusMeta {
        fee,
        pre_balances: vec![10_000, 0],
        post_balances: vec![10_000 - fee, 0],
        log_messages: vec!["Program log: ok".into()],
        compute_units_consumed: Some(150),
        ..Default::default()
    }
}

fn meta_frame(spec: &TxSpec, extra_sections: &mut Vec<(Cid, Vec<u8>)>) -> DataFrame {
    let Some(meta) = &spec.meta else {
        return DataFrame::wrap(Vec::new());
    };
    let raw = chronicle::solana::meta::encode_protobuf_meta(meta).expect("encode meta");
    let compressed = chronicle::solana::meta::compress(&raw).expect("compress meta");
    if !spec.chain_meta {
        return DataFrame::wrap(compressed);
    }
    let mid = compressed.len() / 2;
    let tail = DataFrame {
        kind: KIND_DATAFRAME,
        hash: None,
        index: Some(1),
        total: None,
        data: serde_bytes::ByteBuf::from(compressed[mid..].to_vec()),
        next: None,
    };
    let tail_bytes = dag::encode(&tail).expect("encode frame");
    let tail_cid = dag::cid_for(&tail_bytes);
    extra_sections.push((tail_cid, tail_bytes));
    DataFrame {
        kind: KIND_DATAFRAME,
        hash: Some(dag::checksum(&compressed)),
        index: Some(0),
        total: Some(2),
        data: serde_bytes::ByteBuf::from(compressed[..mid].to_vec()),
        next: Some(vec![tail_cid]),
    }
}

/// Serialize a whole epoch archive. The root Epoch node is the first
/// section; each block's children precede its Block node, so the
/// parent-window prefetch picks them up.
pub fn build_archive(epoch: u64, blocks: &[BlockSpec]) -> (Vec<u8>, Cid) {
    let mut block_cids = Vec::new();
    let mut per_block_sections: Vec<Vec<(Cid, Vec<u8>)>> = Vec::new();

    for block in blocks {
        let mut sections = Vec::new();
        let mut entry_cids = Vec::new();
        let mut position = 0u64;
        for (entry_ix, chunk) in block.txs.chunks(2).enumerate() {
            let mut tx_cids = Vec::new();
            for spec in chunk {
                let metadata = meta_frame(spec, &mut sections);
                let node = Transaction {
                    kind: KIND_TRANSACTION,
                    data: DataFrame::wrap(encode_transaction(&spec.tx)),
                    metadata,
                    slot: block.slot,
                    index: Some(position),
                };
                position += 1;
                let bytes = dag::encode(&node).expect("encode tx");
                let cid = dag::cid_for(&bytes);
                sections.push((cid, bytes));
                tx_cids.push(cid);
            }
            let mut hash = [0u8; 32];
            hash[0] = block.slot as u8;
            hash[1] = entry_ix as u8;
            let entry = Entry {
                kind: KIND_ENTRY,
                num_hashes: 12,
                hash: serde_bytes::ByteBuf::from(hash.to_vec()),
                transactions: tx_cids,
            };
            let bytes = dag::encode(&entry).expect("encode entry");
            let cid = dag::cid_for(&bytes);
            sections.push((cid, bytes));
            entry_cids.push(cid);
        }
        let node = Block {
            kind: KIND_BLOCK,
            slot: block.slot,
            entries: entry_cids,
            meta: BlockMeta {
                parent_slot: block.parent_slot,
                blocktime: block.blocktime,
                block_height: Some(block.slot),
            },
            rewards: dag::dummy_cid(),
        };
        let bytes = dag::encode(&node).expect("encode block");
        let cid = dag::cid_for(&bytes);
        sections.push((cid, bytes));
        block_cids.push(cid);
        per_block_sections.push(sections);
    }

    let subset = Subset {
        kind: KIND_SUBSET,
        first: blocks.first().map_or(0, |b| b.slot),
        last: blocks.last().map_or(0, |b| b.slot),
        blocks: block_cids,
    };
    let subset_bytes = dag::encode(&subset).expect("encode subset");
    let subset_cid = dag::cid_for(&subset_bytes);

    let epoch_node = EpochNode {
        kind: KIND_EPOCH,
        epoch,
        subsets: vec![subset_cid],
    };
    let epoch_bytes = dag::encode(&epoch_node).expect("encode epoch");
    let root = dag::cid_for(&epoch_bytes);

    let mut ordered = vec![(root, epoch_bytes)];
    ordered.extend(per_block_sections.into_iter().flatten());
    ordered.push((subset_cid, subset_bytes));

    let header = serde_ipld_dagcbor::to_vec(&CarHeader::new(vec![root], 1)).unwrap();
    let mut out = Vec::new();
    out.write_varint(header.len()).unwrap();
    out.write_all(&header).unwrap();
    for (cid, data) in &ordered {
        out.write_varint(cid.encoded_len() + data.len()).unwrap();
        cid.write_bytes(&mut out).unwrap();
        out.write_all(data).unwrap();
    }
    (out, root)
}

pub struct FixtureIndexes {
    pub cid_to_offset: PathBuf,
    pub slot_to_cid: PathBuf,
    pub sig_to_cid: PathBuf,
    pub sig_exists: PathBuf,
    pub blocktime: PathBuf,
    pub gsfa: PathBuf,
}

/// Stream the archive and seal every per-epoch index over it.
pub async fn build_indexes(car: &Path, index_dir: &Path, epoch: u64, root: Cid) -> FixtureIndexes {
    std::fs::create_dir_all(index_dir).unwrap();
    let meta = |kind: &str| IndexMetadata::for_archive(kind, &root, epoch, "devnet");
    let cars = [car.to_owned()];

    let mut sections = 0u64;
    let mut blocks = 0u64;
    let mut txs = 0u64;
    let mut stream = MultiCarStream::open(&cars).await.unwrap();
    while let Some(section) = stream.next_section().unwrap() {
        sections += 1;
        match dag::decode_node(&section.data) {
            Ok(Node::Block(_)) => blocks += 1,
            Ok(Node::Transaction(_)) => txs += 1,
            _ => {}
        }
    }

    let paths = FixtureIndexes {
        cid_to_offset: index_dir.join("cid-to-offset.index"),
        slot_to_cid: index_dir.join("slot-to-cid.index"),
        sig_to_cid: index_dir.join("sig-to-cid.index"),
        sig_exists: index_dir.join("sig-exists.index"),
        blocktime: index_dir.join("slot-to-blocktime.index"),
        gsfa: index_dir.join("gsfa"),
    };

    let mut cid_to_offset =
        CidToOffsetWriter::create(&paths.cid_to_offset, sections, meta("x"), None).unwrap();
    let mut slot_to_cid =
        SlotToCidWriter::create(&paths.slot_to_cid, blocks, meta("x"), None).unwrap();
    let mut sig_to_cid = SigToCidWriter::create(&paths.sig_to_cid, txs, meta("x"), None).unwrap();
    let mut sig_exists = BucketteerWriter::create(&paths.sig_exists, meta("sig_exists"));
    let mut blocktime =
        SlotToBlocktimeWriter::create(&paths.blocktime, meta("slot_to_blocktime")).unwrap();
    let mut gsfa = GsfaWriter::create(&paths.gsfa).unwrap();

    let mut stream = MultiCarStream::open(&cars).await.unwrap();
    while let Some(section) = stream.next_section().unwrap() {
        cid_to_offset
            .insert(
                &section.cid,
                OffsetAndSize {
                    offset: section.offset,
                    size: section.section_len as u32,
                },
            )
            .unwrap();
        match dag::decode_node(&section.data) {
            Ok(Node::Block(block)) => {
                slot_to_cid.insert(block.slot, &section.cid).unwrap();
                blocktime.set(block.slot, block.meta.blocktime).unwrap();
            }
            Ok(Node::Transaction(node)) => {
                // Fixture transaction payloads are always inline.
                let raw = node.data.data.to_vec();
                let parsed = chronicle::solana::parse_transaction(&raw).unwrap();
                let signature = *parsed.first_signature().unwrap();
                sig_to_cid
                    .insert(signature.as_bytes(), &section.cid)
                    .unwrap();
                sig_exists.put(signature.as_bytes());
                let record = LogRecord {
                    offset: section.offset,
                    size: section.section_len as u32,
                    slot: node.slot,
                    signature: *signature.as_bytes(),
                };
                for key in parsed.message.static_account_keys() {
                    gsfa.push(*key, record).unwrap();
                }
            }
            _ => {}
        }
    }

    cid_to_offset.seal().unwrap();
    slot_to_cid.seal().unwrap();
    sig_to_cid.seal().unwrap();
    sig_exists.seal().unwrap();
    blocktime.seal().unwrap();
    gsfa.seal(meta("gsfa_heads"), None).unwrap();
    paths
}

/// Write the epoch archive, its indexes, its config file and (for epoch 0)
/// a genesis manifest into `dir`; returns the config path and archive root.
pub async fn build_epoch_dir(
    dir: &Path,
    epoch: u64,
    blocks: &[BlockSpec],
    genesis_time: Option<i64>,
) -> (PathBuf, Cid) {
    let (bytes, root) = build_archive(epoch, blocks);
    let car = dir.join(format!("epoch-{epoch}.car"));
    std::fs::write(&car, &bytes).unwrap();
    let index_dir = dir.join(format!("epoch-{epoch}-indexes"));
    let indexes = build_indexes(&car, &index_dir, epoch, root).await;

    let genesis_line = match genesis_time {
        Some(time) => {
            let genesis_path = dir.join("genesis.yaml");
            let hash = bs58::encode([7u8; 32]).into_string();
            std::fs::write(
                &genesis_path,
                format!("hash: {hash}\ncreation_time: {time}\n"),
            )
            .unwrap();
            format!("genesis:\n  uri: {}\n", genesis_path.display())
        }
        None => String::new(),
    };
    let config = format!(
        "epoch: {epoch}\nnetwork: devnet\ndata:\n  uri: {car}\nindexes:\n  \
         cid_to_offset:\n    uri: {c2o}\n  slot_to_cid:\n    uri: {s2c}\n  \
         sig_to_cid:\n    uri: {sig}\n  sig_exists:\n    uri: {se}\n  \
         slot_to_blocktime:\n    uri: {bt}\n  gsfa:\n    uri: {gsfa}\n{genesis_line}",
        car = car.display(),
        c2o = indexes.cid_to_offset.display(),
        s2c = indexes.slot_to_cid.display(),
        sig = indexes.sig_to_cid.display(),
        se = indexes.sig_exists.display(),
        bt = indexes.blocktime.display(),
        gsfa = indexes.gsfa.display(),
    );
    let config_path = dir.join(format!("epoch-{epoch}.yaml"));
    std::fs::write(&config_path, config).unwrap();
    (config_path, root)
}

pub fn fixture_payer() -> Pubkey {
    Pubkey([21u8; 32])
}

pub fn fixture_voter() -> Pubkey {
    Pubkey([23u8; 32])
}

/// Blocks for the canonical single-epoch fixture: slots 1 and 2 carry
/// transfer-shaped transactions, slots 70..=100 carry one vote each.
pub fn default_blocks(base_slot_time: i64) -> Vec<BlockSpec> {
    let payer = fixture_payer();
    let program = Pubkey([22u8; 32]);
    let voter = fixture_voter();
    let mut blocks = vec![
        BlockSpec {
            slot: 1,
            parent_slot: 0,
            blocktime: base_slot_time + 1,
            txs: vec![
                TxSpec {
                    tx: legacy_tx(payer, program, 1),
                    meta: Some(ok_meta(5000)),
                    chain_meta: false,
                },
                TxSpec {
                    tx: legacy_tx(payer, program, 2),
                    meta: Some(ok_meta(5000)),
                    chain_meta: true,
                },
                TxSpec {
                    tx: legacy_tx(payer, program, 3),
                    meta: None,
                    chain_meta: false,
                },
            ],
        },
        BlockSpec {
            slot: 2,
            parent_slot: 1,
            blocktime: base_slot_time + 2,
            txs: vec![TxSpec {
                tx: legacy_tx(payer, program, 4),
                meta: Some(ok_meta(5000)),
                chain_meta: false,
            }],
        },
    ];
    for (i, slot) in [70u64, 80, 90, 100].into_iter().enumerate() {
        blocks.push(BlockSpec {
            slot,
            parent_slot: if slot == 70 { 2 } else { slot - 10 },
            blocktime: base_slot_time + slot as i64,
            txs: vec![TxSpec {
                tx: vote_tx(voter, 10 + i as u8),
                meta: Some(ok_meta(5000)),
                chain_meta: false,
            }],
        });
    }
    blocks
}
