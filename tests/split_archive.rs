// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Split-piece archives serve identically to single-file ones, and the
//! sealed indexes satisfy their round-trip laws over the archive stream.

mod common;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use chronicle::cache::NodeCache;
use chronicle::car::{CarStream, MultiCarStream};
use chronicle::dag::{self, Node};
use chronicle::epoch::{EpochConfig, EpochHandler};
use chronicle::index::{CidToOffsetReader, SigToCidReader, SlotToCidReader};

/// Cut the archive at Block-section boundaries into `piece_count` pieces.
fn split_archive(bytes: &[u8], piece_count: usize) -> Vec<Vec<u8>> {
    let mut stream = CarStream::new(bytes).unwrap();
    let mut block_ends = Vec::new();
    while let Some(section) = stream.next_section().unwrap() {
        if dag::decode_block(&section.data).is_ok() {
            block_ends.push((section.offset + section.section_len) as usize);
        }
    }
    assert!(block_ends.len() >= piece_count);
    let mut cuts = vec![0usize];
    // One cut after every few blocks, the tail carries the rest.
    let step = block_ends.len().div_ceil(piece_count);
    cuts.extend(block_ends.iter().step_by(step).skip(1).copied());
    cuts.push(bytes.len());
    cuts.dedup();
    cuts.windows(2)
        .map(|pair| bytes[pair[0]..pair[1]].to_vec())
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn split_pieces_serve_like_one_archive() {
    let dir = tempfile::tempdir().unwrap();
    let blocks = common::default_blocks(1_700_000_000);
    let (bytes, root) = common::build_archive(0, &blocks);

    let pieces = split_archive(&bytes, 3);
    assert!(pieces.len() >= 2, "fixture too small to split");
    let mut piece_paths = Vec::new();
    for (i, piece) in pieces.iter().enumerate() {
        let path = dir.path().join(format!("epoch-0-{i}.car"));
        std::fs::write(&path, piece).unwrap();
        piece_paths.push(path);
    }
    // Indexes are built over the stitched stream, shuffled piece order and
    // all.
    let index_dir = dir.path().join("indexes");
    piece_paths.reverse();
    let first_of = |p: &std::path::Path| p.display().to_string();
    {
        // MultiCarStream orders the pieces by first Block slot itself.
        let mut stream = MultiCarStream::open(&piece_paths).await.unwrap();
        assert_eq!(stream.root(), root);
        let mut slots = Vec::new();
        while let Some(section) = stream.next_section().unwrap() {
            if let Ok(Node::Block(b)) = dag::decode_node(&section.data) {
                slots.push(b.slot);
            }
        }
        assert_eq!(slots, vec![1, 2, 70, 80, 90, 100]);
    }
    let car0 = dir.path().join("whole-for-index.car");
    std::fs::write(&car0, &bytes).unwrap();
    let indexes = common::build_indexes(&car0, &index_dir, 0, root).await;

    let piece_list = dir.path().join("pieces.yaml");
    let listing = piece_paths
        .iter()
        .map(|p| format!("  - {}", first_of(p)))
        .collect::<Vec<_>>()
        .join("\n");
    std::fs::write(&piece_list, format!("pieces:\n{listing}\n")).unwrap();

    let config = format!(
        "epoch: 0\nnetwork: devnet\ndata:\n  pieces:\n    metadata: {}\nindexes:\n  \
         cid_to_offset:\n    uri: {}\n  slot_to_cid:\n    uri: {}\n  sig_to_cid:\n    uri: {}\n",
        piece_list.display(),
        indexes.cid_to_offset.display(),
        indexes.slot_to_cid.display(),
        indexes.sig_to_cid.display(),
    );
    let config_path = dir.path().join("epoch-0.yaml");
    std::fs::write(&config_path, config).unwrap();

    let handler = EpochHandler::open(
        EpochConfig::load(&config_path).unwrap(),
        None,
        Arc::new(NodeCache::default()),
        &dir.path().join("cache"),
    )
    .await
    .unwrap();
    assert_eq!(handler.root(), root);

    let ct = CancellationToken::new();
    let assembled = handler.get_block(90, true, true, &ct).await.unwrap();
    assert_eq!(assembled.transactions.len(), 1);
    assert!(assembled.transactions[0].parsed.is_vote());
    assert_eq!(assembled.block.meta.parent_slot, 80);
}

#[tokio::test(flavor = "multi_thread")]
async fn sealed_indexes_satisfy_round_trip_laws() {
    let dir = tempfile::tempdir().unwrap();
    let blocks = common::default_blocks(1_700_000_000);
    let (bytes, root) = common::build_archive(0, &blocks);
    let car = dir.path().join("epoch-0.car");
    std::fs::write(&car, &bytes).unwrap();
    let indexes = common::build_indexes(&car, &dir.path().join("indexes"), 0, root).await;

    let cid_to_offset = CidToOffsetReader::open(&indexes.cid_to_offset).unwrap();
    let slot_to_cid = SlotToCidReader::open(&indexes.slot_to_cid).unwrap();
    let sig_to_cid = SigToCidReader::open(&indexes.sig_to_cid).unwrap();
    cid_to_offset.metadata().check_root(&root).unwrap();

    let cars = [car.clone()];
    let mut stream = MultiCarStream::open(&cars).await.unwrap();
    let header_size = stream.header_size();
    let archive_len = bytes.len() as u64;
    let mut first = true;
    while let Some(section) = stream.next_section().unwrap() {
        let got = cid_to_offset.get(&section.cid).unwrap();
        assert_eq!(got.offset, section.offset);
        assert_eq!(u64::from(got.size), section.section_len);
        assert!(got.offset + u64::from(got.size) <= archive_len);
        if first {
            // The archive's single root is its first section.
            assert_eq!(section.cid, root);
            assert_eq!(got.offset, header_size);
            first = false;
        }
        match dag::decode_node(&section.data) {
            Ok(Node::Block(block)) => {
                assert_eq!(slot_to_cid.get(block.slot), Some(section.cid));
            }
            Ok(Node::Transaction(node)) => {
                let parsed = chronicle::solana::parse_transaction(&node.data.data).unwrap();
                let signature = parsed.first_signature().unwrap();
                assert_eq!(sig_to_cid.get(signature.as_bytes()), Some(section.cid));
            }
            _ => {}
        }
    }
}
