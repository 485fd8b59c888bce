// Copyright 2023-2025 Chronicle Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! One epoch's archive, indexes and caches, and the block/transaction
//! assembly on top of them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use cid::Cid;
use futures::{FutureExt, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::PieceList;
use super::{epoch_of_slot, EpochConfig, GenesisInfo};
use crate::cache::NodeCache;
use crate::car::{SectionCursor, SplitCarReader, MAX_READ_LENGTH};
use crate::dag::{self, DataFrame};
use crate::error::{Error, Result};
use crate::fetch::{self, SectionSource};
use crate::gsfa::GsfaReader;
use crate::index::{
    BucketteerReader, CidToOffsetReader, OffsetAndSize, SigToCidReader, SlotToBlocktimeReader,
    SlotToCidReader,
};
use crate::metrics::metrics;
use crate::solana::meta::{self, TxMeta};
use crate::solana::{parse_transaction, Signature, VersionedTransaction};

/// A transaction fully resolved out of the archive: node, wire bytes,
/// parsed form, and (when requested) its status meta.
#[derive(Debug, Clone)]
pub struct TransactionWithMeta {
    pub node: dag::Transaction,
    pub raw: Vec<u8>,
    pub parsed: VersionedTransaction,
    pub meta: Option<TxMeta>,
    pub position: Option<u64>,
    pub slot: u64,
}

impl TransactionWithMeta {
    pub fn signature(&self) -> Result<&Signature> {
        self.parsed
            .first_signature()
            .ok_or_else(|| Error::internal("transaction carries no signature"))
    }
}

/// A block with its transactions in final response order.
#[derive(Debug, Clone)]
pub struct AssembledBlock {
    pub slot: u64,
    pub cid: Cid,
    pub block: dag::Block,
    pub blockhash: Option<String>,
    pub previous_blockhash: Option<String>,
    pub transactions: Vec<TransactionWithMeta>,
    pub rewards: Option<meta::proto::Rewards>,
}

pub struct EpochHandler {
    epoch: u64,
    config: EpochConfig,
    config_path: Option<PathBuf>,
    car: SplitCarReader,
    root: Cid,
    cid_to_offset: CidToOffsetReader,
    slot_to_cid: SlotToCidReader,
    sig_to_cid: SigToCidReader,
    sig_exists: Option<BucketteerReader>,
    blocktime: Option<SlotToBlocktimeReader>,
    gsfa: Option<Arc<GsfaReader>>,
    genesis: Option<GenesisInfo>,
    cache: Arc<NodeCache>,
}

impl EpochHandler {
    /// Open every archive piece and index the manifest names. Remote index
    /// URIs are materialised into `cache_dir` first; each sealed index is
    /// cross-checked against the archive root.
    pub async fn open(
        config: EpochConfig,
        config_path: Option<PathBuf>,
        cache: Arc<NodeCache>,
        cache_dir: &Path,
    ) -> anyhow::Result<Self> {
        let epoch = config.epoch;
        let epoch_cache_dir = cache_dir.join(format!("epoch-{epoch}"));

        let car = if let Some(uri) = &config.data.uri {
            let source = fetch::open_source(uri)
                .await
                .with_context(|| format!("archive {uri}"))?;
            SplitCarReader::open_single(source).await?
        } else {
            let pieces_meta = config
                .data
                .pieces
                .as_ref()
                .and_then(|p| p.metadata.as_ref())
                .context("config names neither data.uri nor data.pieces.metadata")?;
            let list_path = fetch::materialize(pieces_meta, &epoch_cache_dir).await?;
            let list = PieceList::load(&list_path)?;
            let mut sources: Vec<Arc<dyn SectionSource>> = Vec::with_capacity(list.pieces.len());
            for piece in &list.pieces {
                sources.push(
                    fetch::open_source(piece)
                        .await
                        .with_context(|| format!("piece {piece}"))?,
                );
            }
            SplitCarReader::open(sources).await?
        };
        let root = car.root();

        let index_path = |uri_ref: &Option<super::config::UriRef>, what: &str| {
            let uri = uri_ref
                .as_ref()
                .map(|r| r.uri.clone())
                .with_context(|| format!("config names no {what} index"));
            (uri, epoch_cache_dir.clone())
        };

        let (uri, dir) = index_path(&config.indexes.cid_to_offset, "cid_to_offset");
        let cid_to_offset =
            CidToOffsetReader::open(fetch::materialize(&uri?, &dir).await?)?;
        let (uri, dir) = index_path(&config.indexes.slot_to_cid, "slot_to_cid");
        let slot_to_cid = SlotToCidReader::open(fetch::materialize(&uri?, &dir).await?)?;
        let (uri, dir) = index_path(&config.indexes.sig_to_cid, "sig_to_cid");
        let sig_to_cid = SigToCidReader::open(fetch::materialize(&uri?, &dir).await?)?;

        for (name, metadata) in [
            ("cid_to_offset", cid_to_offset.metadata()),
            ("slot_to_cid", slot_to_cid.metadata()),
            ("sig_to_cid", sig_to_cid.metadata()),
        ] {
            metadata
                .check_root(&root)
                .with_context(|| format!("{name} index for epoch {epoch}"))?;
        }

        let sig_exists = match &config.indexes.sig_exists {
            Some(r) => Some(BucketteerReader::open(
                fetch::materialize(&r.uri, &epoch_cache_dir).await?,
            )?),
            None => None,
        };
        let blocktime = match &config.indexes.slot_to_blocktime {
            Some(r) => Some(SlotToBlocktimeReader::open(
                fetch::materialize(&r.uri, &epoch_cache_dir).await?,
            )?),
            None => None,
        };
        let gsfa = match &config.indexes.gsfa {
            Some(r) => Some(Arc::new(GsfaReader::open(
                &fetch::materialize(&r.uri, &epoch_cache_dir).await?,
                epoch,
            )?)),
            None => None,
        };
        let genesis = match &config.genesis {
            Some(r) => Some(GenesisInfo::load(
                fetch::materialize(&r.uri, &epoch_cache_dir).await?,
            )?),
            None => None,
        };

        // The first section of a well-formed archive is its root node.
        match cid_to_offset.get(&root) {
            Some(os) if os.offset != car.header_size() => {
                anyhow::bail!(
                    "epoch {epoch}: root section at {} but header ends at {}",
                    os.offset,
                    car.header_size()
                );
            }
            Some(_) => {}
            None => warn!(epoch, %root, "root cid missing from cid_to_offset index"),
        }

        debug!(
            epoch,
            pieces = car.piece_count(),
            bytes = car.len(),
            "epoch handler ready"
        );
        Ok(Self {
            epoch,
            config,
            config_path,
            car,
            root,
            cid_to_offset,
            slot_to_cid,
            sig_to_cid,
            sig_exists,
            blocktime,
            gsfa,
            genesis,
            cache,
        })
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn root(&self) -> Cid {
        self.root
    }

    pub fn config(&self) -> &EpochConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn genesis(&self) -> Option<&GenesisInfo> {
        self.genesis.as_ref()
    }

    pub fn gsfa(&self) -> Option<&Arc<GsfaReader>> {
        self.gsfa.as_ref()
    }

    // --- index probes ---

    pub fn find_cid_from_slot(&self, slot: u64) -> Result<Cid> {
        self.slot_to_cid
            .get(slot)
            .ok_or_else(|| Error::not_found(format!("slot {slot} not present in epoch {}", self.epoch)))
    }

    pub fn find_offset_and_size_from_cid(&self, cid: &Cid) -> Result<OffsetAndSize> {
        self.cid_to_offset
            .get(cid)
            .ok_or_else(|| Error::internal(format!("cid {cid} missing from offset index")))
    }

    pub fn get_blocktime(&self, slot: u64) -> Result<i64> {
        let index = self
            .blocktime
            .as_ref()
            .ok_or_else(|| Error::not_found("no blocktime index configured"))?;
        index
            .get(slot)
            .ok_or_else(|| Error::not_found(format!("no blocktime for slot {slot}")))
    }

    /// Probabilistic filter probe followed by full index confirmation.
    /// Never reports a false positive to callers.
    pub fn contains_signature(&self, signature: &Signature) -> bool {
        if let Some(filter) = &self.sig_exists {
            if !filter.has(signature.as_bytes()) {
                return false;
            }
        }
        self.sig_to_cid.contains(signature.as_bytes())
    }

    // --- raw reads ---

    /// Backdoor read over the stitched archive, capped at
    /// [`MAX_READ_LENGTH`]. Exists for prefetching and tooling.
    pub async fn read_at_from_car(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        Ok(self.car.read_at(offset, len).await?)
    }

    /// Fetch a node payload by CID: cache, then index, then archive.
    pub async fn get_node_bytes(&self, cid: &Cid) -> Result<Bytes> {
        if let Some(hit) = self.cache.get(cid) {
            return Ok(hit);
        }
        let os = self.find_offset_and_size_from_cid(cid)?;
        let (found, data) = self.read_section(os).await?;
        if found != *cid {
            return Err(Error::internal(format!(
                "index pointed {cid} at a section holding {found}"
            )));
        }
        self.cache.put(*cid, data.clone());
        Ok(data)
    }

    /// Dereference a GSFA log pointer straight into the archive.
    pub async fn get_node_by_offset_and_size(&self, offset: u64, size: u32) -> Result<(Cid, Bytes)> {
        let os = OffsetAndSize { offset, size };
        let (cid, data) = self.read_section(os).await?;
        self.cache.put(cid, data.clone());
        Ok((cid, data))
    }

    async fn read_section(&self, os: OffsetAndSize) -> Result<(Cid, Bytes)> {
        let raw = self.car.read_at(os.offset, u64::from(os.size)).await?;
        let (cid, data) = crate::car::parse_section(&raw, os.offset)?;
        Ok((cid, Bytes::copy_from_slice(data)))
    }

    // --- typed fetches ---

    pub async fn get_entry(&self, cid: &Cid) -> Result<dag::Entry> {
        Ok(dag::decode_entry(&self.get_node_bytes(cid).await?)?)
    }

    pub async fn get_rewards(&self, cid: &Cid) -> Result<dag::Rewards> {
        Ok(dag::decode_rewards(&self.get_node_bytes(cid).await?)?)
    }

    pub async fn get_dataframe(&self, cid: &Cid) -> Result<DataFrame> {
        Ok(dag::decode_dataframe(&self.get_node_bytes(cid).await?)?)
    }

    /// Block node by slot, with the parent-window prefetch feeding the
    /// cache so the per-entry and per-transaction fetches that follow hit
    /// memory.
    pub async fn get_block_node(&self, slot: u64) -> Result<(dag::Block, Cid)> {
        let cid = self.find_cid_from_slot(slot)?;
        let os = self.find_offset_and_size_from_cid(&cid)?;
        let bytes = self.get_node_bytes(&cid).await?;
        let block = dag::decode_block(&bytes)?;
        self.prefetch_block_window(&block, os).await;
        Ok((block, cid))
    }

    /// Read `[parent_offset, block_offset)` (capped) and feed every section
    /// into the cache. Slot 0 and blocks whose parent lives in another
    /// epoch skip the parent lookup. Prefetching is advisory: failures are
    /// logged, never surfaced.
    async fn prefetch_block_window(&self, block: &dag::Block, block_os: OffsetAndSize) {
        if block.slot == 0 || epoch_of_slot(block.meta.parent_slot) != self.epoch {
            return;
        }
        let Some(parent_cid) = self.slot_to_cid.get(block.meta.parent_slot) else {
            return;
        };
        let Some(parent_os) = self.cid_to_offset.get(&parent_cid) else {
            return;
        };
        if parent_os.offset >= block_os.offset {
            return;
        }
        let len = (block_os.offset - parent_os.offset).min(MAX_READ_LENGTH);
        let window = match self.car.read_at(parent_os.offset, len).await {
            Ok(w) => w,
            Err(e) => {
                debug!(slot = block.slot, error = %e, "prefetch window read failed");
                return;
            }
        };
        metrics().prefetch_windows.inc();
        let mut cursor = SectionCursor::new(&window, parent_os.offset);
        loop {
            match cursor.next_section() {
                Ok(Some((info, data))) => {
                    self.cache.put(info.cid, Bytes::copy_from_slice(data));
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(slot = block.slot, error = %e, "prefetch window parse failed");
                    break;
                }
            }
        }
    }

    pub async fn get_transaction_node(
        &self,
        signature: &Signature,
    ) -> Result<(dag::Transaction, Cid)> {
        let cid = self.sig_to_cid.get(signature.as_bytes()).ok_or_else(|| {
            Error::not_found(format!("signature {signature} unknown to epoch {}", self.epoch))
        })?;
        let bytes = self.get_node_bytes(&cid).await?;
        Ok((dag::decode_transaction(&bytes)?, cid))
    }

    // --- composition ---

    pub async fn reassemble_frames(&self, first: &DataFrame) -> Result<Vec<u8>> {
        dag::reassemble(first, |cid: Cid| async move {
            self.get_dataframe(&cid).await
        })
        .await
    }

    /// Resolve a transaction node: reassemble and parse the wire bytes,
    /// and decode the status meta when asked to.
    pub async fn resolve_transaction(
        &self,
        node: dag::Transaction,
        want_meta: bool,
    ) -> Result<TransactionWithMeta> {
        let raw = self.reassemble_frames(&node.data).await?;
        let parsed =
            parse_transaction(&raw).map_err(|e| Error::internal(format!("transaction: {e}")))?;
        let meta = if want_meta {
            let meta_bytes = self.reassemble_frames(&node.metadata).await?;
            if meta_bytes.is_empty() {
                None
            } else {
                Some(
                    meta::decompress_and_parse(&meta_bytes)
                        .map_err(|e| Error::internal(format!("meta: {e}")))?,
                )
            }
        } else {
            None
        };
        Ok(TransactionWithMeta {
            position: node.index,
            slot: node.slot,
            node,
            raw,
            parsed,
            meta,
        })
    }

    /// Assemble a whole block: entries fan out bounded by `2·nproc`, each
    /// entry's transactions bounded by `nproc`; flattening preserves
    /// `(entry, transaction)` discovery order, then the position index,
    /// when every transaction carries one, overrides it.
    pub async fn get_block(
        &self,
        slot: u64,
        want_meta: bool,
        want_rewards: bool,
        ct: &CancellationToken,
    ) -> Result<AssembledBlock> {
        let (block, cid) = self.get_block_node(slot).await?;
        if ct.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let entry_bound = 2 * num_cpus::get();
        let tx_bound = num_cpus::get();
        let entry_cids: Vec<Cid> = block.entries.clone();
        let entries: Vec<dag::Entry> = futures::stream::iter(entry_cids)
            .map(|entry_cid| {
                async move {
                    if ct.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    self.get_entry(&entry_cid).await
                }
                .boxed()
            })
            .buffered(entry_bound)
            .try_collect()
            .await?;

        let tx_cid_lists: Vec<Vec<Cid>> = entries
            .iter()
            .map(|entry| entry.transactions.clone())
            .collect();
        let per_entry: Vec<Vec<TransactionWithMeta>> = futures::stream::iter(tx_cid_lists)
            .map(|tx_cids: Vec<Cid>| {
                async move {
                    let txs: Vec<TransactionWithMeta> = futures::stream::iter(tx_cids)
                        .map(|tx_cid| {
                            async move {
                                if ct.is_cancelled() {
                                    return Err(Error::Cancelled);
                                }
                                let bytes = self.get_node_bytes(&tx_cid).await?;
                                let node = dag::decode_transaction(&bytes)?;
                                self.resolve_transaction(node, want_meta).await
                            }
                            .boxed()
                        })
                        .buffered(tx_bound)
                        .try_collect()
                        .await?;
                    Ok::<_, Error>(txs)
                }
                .boxed()
            })
            .buffered(entry_bound)
            .try_collect()
            .await?;

        let mut transactions: Vec<TransactionWithMeta> =
            per_entry.into_iter().flatten().collect();
        if !transactions.is_empty() && transactions.iter().all(|t| t.position.is_some()) {
            transactions.sort_by_key(|t| t.position.unwrap_or(u64::MAX));
        }

        let blockhash = entries
            .last()
            .map(|entry| bs58::encode(entry.hash.as_ref()).into_string());
        let previous_blockhash = self.parent_blockhash(&block).await?;

        let rewards = if block.rewards == dag::dummy_cid() {
            None
        } else if want_rewards {
            let node = self.get_rewards(&block.rewards).await?;
            let raw = self.reassemble_frames(&node.data).await?;
            if raw.is_empty() {
                None
            } else {
                Some(
                    meta::decompress_and_parse_rewards(&raw)
                        .map_err(|e| Error::internal(format!("rewards: {e}")))?,
                )
            }
        } else {
            None
        };

        Ok(AssembledBlock {
            slot,
            cid,
            block,
            blockhash,
            previous_blockhash,
            transactions,
            rewards,
        })
    }

    /// PoH hash of the parent block's last entry. Skipped when the parent
    /// lives in a different epoch; slot 1's parent slot 0 is in this epoch
    /// by convention, so it resolves normally.
    async fn parent_blockhash(&self, block: &dag::Block) -> Result<Option<String>> {
        if block.slot == 0 || epoch_of_slot(block.meta.parent_slot) != self.epoch {
            return Ok(None);
        }
        let Some(parent_cid) = self.slot_to_cid.get(block.meta.parent_slot) else {
            return Ok(None);
        };
        let parent_bytes = self.get_node_bytes(&parent_cid).await?;
        let parent = dag::decode_block(&parent_bytes)?;
        let Some(last_entry_cid) = parent.entries.last() else {
            return Ok(None);
        };
        let entry = self.get_entry(last_entry_cid).await?;
        Ok(Some(bs58::encode(entry.hash.as_ref()).into_string()))
    }
}
