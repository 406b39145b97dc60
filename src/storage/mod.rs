//! Block storage abstraction for MST nodes

use bytes::Bytes;
use cid::Cid as IpldCid;

use crate::error::Result;

/// Async block storage trait
///
/// Provides CID-keyed, content-addressed block storage for MST nodes.
/// Implementations might use:
/// - In-memory BTreeMap ([`MemoryBlockStore`])
/// - SQLite/RocksDB (user-provided)
/// - Remote HTTP storage (user-provided)
///
/// Clone is required so tree handles can share storage references across
/// operations. Stores are append-only from the tree's perspective: blocks
/// already put remain available even when a mutation supersedes them, and
/// garbage collection of unreferenced blocks is the store's concern.
///
/// # WASM Compatibility
///
/// The trait uses `trait_variant` to conditionally require `Send` only on
/// non-WASM targets, allowing it to work in browser environments where
/// `Send` is not available.
#[trait_variant::make(Send)]
pub trait BlockStore: Clone {
    /// Get a block by CID
    ///
    /// Returns `None` if the block is not found.
    async fn get(&self, cid: &IpldCid) -> Result<Option<Bytes>>;

    /// Put a block, return its CID
    ///
    /// The CID is calculated from the data using a SHA-256 multihash and
    /// the DAG-CBOR codec, so equal blocks always yield equal CIDs and
    /// the operation is idempotent.
    async fn put(&self, data: &[u8]) -> Result<IpldCid>;

    /// Check if a block exists without retrieving it
    async fn has(&self, cid: &IpldCid) -> Result<bool>;
}

pub mod memory;

pub use memory::MemoryBlockStore;
