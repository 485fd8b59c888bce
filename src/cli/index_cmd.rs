// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Index builders: stream an epoch archive (split pieces included) and
//! seal one of the index files next to it. Writers that need an item count
//! up front get it from a counting pass over the same stream.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, ValueEnum};
use tracing::info;

use crate::car::{CarSection, MultiCarStream};
use crate::dag::{self, DataFrame, Node};
use crate::gsfa::{GsfaWriter, LogRecord};
use crate::index::typed::{
    KIND_CID_TO_OFFSET, KIND_SIG_TO_CID, KIND_SIG_TO_EPOCH, KIND_SLOT_TO_CID,
};
use crate::index::{
    BucketteerReader, BucketteerWriter, CidToOffsetReader, CidToOffsetWriter, IndexMetadata,
    OffsetAndSize, SigToCidReader, SigToCidWriter, SigToEpochWriter, SlotToBlocktimeWriter,
    SlotToCidReader, SlotToCidWriter,
};
use crate::solana::meta as tx_meta;
use crate::solana::{parse_transaction, Pubkey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IndexKind {
    CidToOffset,
    SlotToCid,
    SigToCid,
    SlotToBlocktime,
    SigExists,
    Gsfa,
    SigToEpoch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Network {
    Mainnet,
    Testnet,
    Devnet,
}

impl Network {
    fn as_str(self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Devnet => "devnet",
        }
    }
}

#[derive(Args)]
pub struct IndexArgs {
    /// Which index to build.
    #[arg(value_enum)]
    kind: IndexKind,

    /// Archive pieces (one logical CAR), or whole archives for
    /// sig-to-epoch.
    #[arg(required = true)]
    cars: Vec<PathBuf>,

    /// Output directory.
    index_dir: PathBuf,

    /// Re-stream the archive after sealing and verify every entry.
    #[arg(long)]
    verify: bool,

    /// Epoch number; defaults to the archive's Epoch root node.
    #[arg(long)]
    epoch: Option<u64>,

    #[arg(long, value_enum, default_value_t = Network::Mainnet)]
    network: Network,

    /// Staging directory for the writers.
    #[arg(long)]
    tmp_dir: Option<PathBuf>,
}

pub async fn run(args: IndexArgs) -> anyhow::Result<()> {
    std::fs::create_dir_all(&args.index_dir)?;
    if args.kind == IndexKind::SigToEpoch {
        return build_sig_to_epoch(&args).await;
    }

    let mut stream = MultiCarStream::open(&args.cars).await?;
    let root = stream.root();
    let epoch = match args.epoch {
        Some(epoch) => epoch,
        None => discover_epoch(&mut stream)
            .await
            .context("no --epoch given and no Epoch node found")?,
    };
    let metadata = |kind: &str| IndexMetadata::for_archive(kind, &root, epoch, args.network.as_str());
    let tmp_dir = args.tmp_dir.as_deref();
    info!(kind = ?args.kind, epoch, %root, "building index");

    match args.kind {
        IndexKind::CidToOffset => {
            let dest = args.index_dir.join(format!("epoch-{epoch}.cid-to-offset.index"));
            let expected = count_sections(&args.cars).await?;
            let mut writer = CidToOffsetWriter::create(
                &dest,
                expected,
                metadata(KIND_CID_TO_OFFSET),
                tmp_dir,
            )?;
            let mut stream = MultiCarStream::open(&args.cars).await?;
            while let Some(section) = stream.next_section()? {
                writer.insert(
                    &section.cid,
                    OffsetAndSize {
                        offset: section.offset,
                        size: section.section_len as u32,
                    },
                )?;
            }
            writer.seal()?;
            if args.verify {
                verify_cid_to_offset(&args.cars, &dest).await?;
            }
            info!(dest = %dest.display(), "sealed");
        }
        IndexKind::SlotToCid => {
            let dest = args.index_dir.join(format!("epoch-{epoch}.slot-to-cid.index"));
            let expected = count_blocks(&args.cars).await?;
            let mut writer =
                SlotToCidWriter::create(&dest, expected, metadata(KIND_SLOT_TO_CID), tmp_dir)?;
            let mut stream = MultiCarStream::open(&args.cars).await?;
            while let Some(section) = stream.next_section()? {
                if let Ok(block) = dag::decode_block(&section.data) {
                    writer.insert(block.slot, &section.cid)?;
                }
            }
            writer.seal()?;
            if args.verify {
                verify_slot_to_cid(&args.cars, &dest).await?;
            }
            info!(dest = %dest.display(), "sealed");
        }
        IndexKind::SigToCid => {
            let dest = args.index_dir.join(format!("epoch-{epoch}.sig-to-cid.index"));
            let expected = count_transactions(&args.cars).await?;
            let mut writer =
                SigToCidWriter::create(&dest, expected, metadata(KIND_SIG_TO_CID), tmp_dir)?;
            let mut walker = TransactionWalker::new(MultiCarStream::open(&args.cars).await?);
            while let Some(tx) = walker.next_transaction()? {
                writer.insert(tx.signature.as_bytes(), &tx.cid)?;
            }
            writer.seal()?;
            if args.verify {
                verify_sig_to_cid(&args.cars, &dest).await?;
            }
            info!(dest = %dest.display(), "sealed");
        }
        IndexKind::SlotToBlocktime => {
            let dest = args
                .index_dir
                .join(format!("epoch-{epoch}.slot-to-blocktime.index"));
            let mut writer =
                SlotToBlocktimeWriter::create(&dest, metadata("slot_to_blocktime"))?;
            let mut stream = MultiCarStream::open(&args.cars).await?;
            while let Some(section) = stream.next_section()? {
                if let Ok(block) = dag::decode_block(&section.data) {
                    writer.set(block.slot, block.meta.blocktime)?;
                }
            }
            writer.seal()?;
            info!(dest = %dest.display(), "sealed");
        }
        IndexKind::SigExists => {
            let dest = args.index_dir.join(format!("epoch-{epoch}.sig-exists.index"));
            let mut writer = BucketteerWriter::create(&dest, metadata("sig_exists"));
            let mut walker = TransactionWalker::new(MultiCarStream::open(&args.cars).await?);
            while let Some(tx) = walker.next_transaction()? {
                writer.put(tx.signature.as_bytes());
            }
            writer.seal()?;
            if args.verify {
                verify_sig_exists(&args.cars, &dest).await?;
            }
            info!(dest = %dest.display(), "sealed");
        }
        IndexKind::Gsfa => {
            let dest = args.index_dir.join(format!("epoch-{epoch}.gsfa"));
            let mut writer = GsfaWriter::create(&dest)?;
            let mut walker = TransactionWalker::new(MultiCarStream::open(&args.cars).await?);
            while let Some(tx) = walker.next_transaction()? {
                let record = LogRecord {
                    offset: tx.offset,
                    size: tx.size,
                    slot: tx.slot,
                    signature: *tx.signature.as_bytes(),
                };
                for address in tx.addresses {
                    writer.push(address, record)?;
                }
            }
            writer.seal(metadata("gsfa_heads"), tmp_dir)?;
            info!(dest = %dest.display(), "sealed");
        }
        IndexKind::SigToEpoch => unreachable!("handled above"),
    }
    Ok(())
}

/// sig-to-epoch spans archives: each car argument is one whole archive,
/// its epoch read from its Epoch root node.
async fn build_sig_to_epoch(args: &IndexArgs) -> anyhow::Result<()> {
    let dest = args.index_dir.join(super::rpc_cmd::SIG_TO_EPOCH_FILE);
    let mut total = 0u64;
    for car in &args.cars {
        total += count_transactions(std::slice::from_ref(car)).await?;
    }
    // The root recorded in the metadata is the first archive's; the index
    // spans several, which the kind makes plain.
    let first = MultiCarStream::open(std::slice::from_ref(&args.cars[0])).await?;
    let metadata = IndexMetadata::for_archive(
        KIND_SIG_TO_EPOCH,
        &first.root(),
        args.epoch.unwrap_or(0),
        args.network.as_str(),
    );
    drop(first);
    let mut writer =
        SigToEpochWriter::create(&dest, total, metadata, args.tmp_dir.as_deref())?;
    for car in &args.cars {
        let mut stream = MultiCarStream::open(std::slice::from_ref(car)).await?;
        let epoch = discover_epoch(&mut stream)
            .await
            .with_context(|| format!("no Epoch node in {}", car.display()))?;
        let mut walker = TransactionWalker::new(MultiCarStream::open(std::slice::from_ref(car)).await?);
        while let Some(tx) = walker.next_transaction()? {
            writer.insert(tx.signature.as_bytes(), epoch)?;
        }
        info!(car = %car.display(), epoch, "archive indexed");
    }
    writer.seal()?;
    info!(dest = %dest.display(), "sealed");
    Ok(())
}

async fn discover_epoch(stream: &mut MultiCarStream) -> anyhow::Result<u64> {
    while let Some(section) = stream.next_section()? {
        if let Ok(Node::Epoch(node)) = dag::decode_node(&section.data) {
            return Ok(node.epoch);
        }
    }
    anyhow::bail!("archive contains no Epoch node")
}

async fn count_sections(cars: &[impl AsRef<Path>]) -> anyhow::Result<u64> {
    let mut stream = MultiCarStream::open(cars).await?;
    let mut count = 0u64;
    while stream.next_section()?.is_some() {
        count += 1;
    }
    Ok(count)
}

async fn count_blocks(cars: &[impl AsRef<Path>]) -> anyhow::Result<u64> {
    let mut stream = MultiCarStream::open(cars).await?;
    let mut count = 0u64;
    while let Some(section) = stream.next_section()? {
        if dag::decode_block(&section.data).is_ok() {
            count += 1;
        }
    }
    Ok(count)
}

async fn count_transactions(cars: &[impl AsRef<Path>]) -> anyhow::Result<u64> {
    let mut stream = MultiCarStream::open(cars).await?;
    let mut count = 0u64;
    while let Some(section) = stream.next_section()? {
        if matches!(dag::decode_node(&section.data), Ok(Node::Transaction(_))) {
            count += 1;
        }
    }
    Ok(count)
}

struct WalkedTransaction {
    cid: cid::Cid,
    offset: u64,
    size: u32,
    slot: u64,
    signature: crate::solana::Signature,
    /// Static account keys plus meta-loaded addresses.
    addresses: Vec<Pubkey>,
}

/// Streaming pass that resolves each Transaction section. DataFrame
/// sections precede the transactions that link them, so a frame map
/// collected along the way suffices to reassemble oversize payloads; it is
/// drained at every Block boundary since frames never cross one.
struct TransactionWalker {
    stream: MultiCarStream,
    frames: HashMap<cid::Cid, DataFrame>,
}

impl TransactionWalker {
    fn new(stream: MultiCarStream) -> Self {
        Self {
            stream,
            frames: HashMap::new(),
        }
    }

    fn next_transaction(&mut self) -> anyhow::Result<Option<WalkedTransaction>> {
        while let Some(section) = self.stream.next_section()? {
            match dag::decode_node(&section.data) {
                Ok(Node::DataFrame(frame)) => {
                    self.frames.insert(section.cid, frame);
                }
                Ok(Node::Block(_)) => {
                    self.frames.clear();
                }
                Ok(Node::Transaction(node)) => {
                    let walked = self.resolve(&section, node)?;
                    return Ok(Some(walked));
                }
                _ => {}
            }
        }
        Ok(None)
    }

    fn resolve(
        &self,
        section: &CarSection,
        node: dag::Transaction,
    ) -> anyhow::Result<WalkedTransaction> {
        let raw = self.reassemble(&node.data)?;
        let parsed = parse_transaction(&raw)?;
        let signature = *parsed
            .first_signature()
            .context("transaction carries no signature")?;
        let mut addresses: Vec<Pubkey> = parsed.message.static_account_keys().to_vec();
        let meta_bytes = self.reassemble(&node.metadata)?;
        if !meta_bytes.is_empty() {
            let meta = tx_meta::decompress_and_parse(&meta_bytes)?;
            let (writable, readonly) = meta.loaded_addresses();
            addresses.extend(writable);
            addresses.extend(readonly);
        }
        addresses.sort();
        addresses.dedup();
        Ok(WalkedTransaction {
            cid: section.cid,
            offset: section.offset,
            size: section.section_len as u32,
            slot: node.slot,
            signature,
            addresses,
        })
    }

    /// Synchronous chain reassembly against the frame map.
    fn reassemble(&self, first: &DataFrame) -> anyhow::Result<Vec<u8>> {
        if first.is_complete() {
            if let Some(declared) = first.hash {
                dag::verify_hash(&first.data, declared)?;
            }
            return Ok(first.data.to_vec());
        }
        let mut parts: Vec<(Option<u64>, Vec<u8>)> = vec![(first.index, first.data.to_vec())];
        let mut worklist: std::collections::VecDeque<cid::Cid> =
            first.next.iter().flatten().copied().collect();
        while let Some(link) = worklist.pop_front() {
            let frame = self
                .frames
                .get(&link)
                .with_context(|| format!("dataframe {link} not seen before its parent"))?;
            worklist.extend(frame.next.iter().flatten().copied());
            parts.push((frame.index, frame.data.to_vec()));
        }
        if parts.iter().all(|(ix, _)| ix.is_some()) {
            parts.sort_by_key(|(ix, _)| ix.unwrap_or(u64::MAX));
        }
        let mut out = Vec::new();
        for (_, data) in parts {
            out.extend_from_slice(&data);
        }
        if let Some(declared) = first.hash {
            dag::verify_hash(&out, declared)?;
        }
        Ok(out)
    }
}

async fn verify_cid_to_offset(cars: &[PathBuf], dest: &Path) -> anyhow::Result<()> {
    let reader = CidToOffsetReader::open(dest)?;
    let mut stream = MultiCarStream::open(cars).await?;
    let mut checked = 0u64;
    while let Some(section) = stream.next_section()? {
        let got = reader
            .get(&section.cid)
            .with_context(|| format!("{} missing after seal", section.cid))?;
        anyhow::ensure!(
            got.offset == section.offset && u64::from(got.size) == section.section_len,
            "{}: sealed ({}, {}) != streamed ({}, {})",
            section.cid,
            got.offset,
            got.size,
            section.offset,
            section.section_len
        );
        checked += 1;
    }
    info!(checked, "cid-to-offset verified");
    Ok(())
}

async fn verify_slot_to_cid(cars: &[PathBuf], dest: &Path) -> anyhow::Result<()> {
    let reader = SlotToCidReader::open(dest)?;
    let mut stream = MultiCarStream::open(cars).await?;
    let mut checked = 0u64;
    while let Some(section) = stream.next_section()? {
        if let Ok(block) = dag::decode_block(&section.data) {
            anyhow::ensure!(
                reader.get(block.slot) == Some(section.cid),
                "slot {} does not map back to {}",
                block.slot,
                section.cid
            );
            checked += 1;
        }
    }
    info!(checked, "slot-to-cid verified");
    Ok(())
}

async fn verify_sig_to_cid(cars: &[PathBuf], dest: &Path) -> anyhow::Result<()> {
    let reader = SigToCidReader::open(dest)?;
    let mut walker = TransactionWalker::new(MultiCarStream::open(cars).await?);
    let mut checked = 0u64;
    while let Some(tx) = walker.next_transaction()? {
        anyhow::ensure!(
            reader.get(tx.signature.as_bytes()) == Some(tx.cid),
            "signature {} does not map back to {}",
            tx.signature,
            tx.cid
        );
        checked += 1;
    }
    info!(checked, "sig-to-cid verified");
    Ok(())
}

async fn verify_sig_exists(cars: &[PathBuf], dest: &Path) -> anyhow::Result<()> {
    let reader = BucketteerReader::open(dest)?;
    let mut walker = TransactionWalker::new(MultiCarStream::open(cars).await?);
    let mut checked = 0u64;
    while let Some(tx) = walker.next_transaction()? {
        anyhow::ensure!(
            reader.has(tx.signature.as_bytes()),
            "false negative for {}",
            tx.signature
        );
        checked += 1;
    }
    info!(checked, "sig-exists verified: no false negatives");
    Ok(())
}
