//! Content-addressed Merkle Search Tree primitives
//!
//! This crate provides a deterministic, persistent key→value index:
//!
//! - **MST (Merkle Search Tree)**: every key's depth is derived from its
//!   hash, so the tree's shape is a pure function of its contents and
//!   identical key/value sets always yield the same root CID
//! - **Storage**: pluggable async block storage abstraction with an
//!   in-memory implementation
//!
//! # Design Philosophy
//!
//! - Each node persists as a single DAG-CBOR block; every mutation
//!   re-persists the affected leaf-to-root path and returns the new root
//! - A handle is a single-writer value; readers share immutable roots by
//!   loading their own handles
//! - The block store and hash primitive are consumed as capabilities, not
//!   owned by the tree
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use twill::{MemoryBlockStore, Mst};
//!
//! # async fn example() -> twill::Result<()> {
//! let storage = Arc::new(MemoryBlockStore::new());
//! let mut tree = Mst::create(storage, 0).await?;
//!
//! let value = /* CID of some record */;
//! let root = tree.add("com.example.record/3jqfcqzm3fo2j", value).await?;
//!
//! if let Some(found) = tree.get("com.example.record/3jqfcqzm3fo2j").await? {
//!     println!("found: {}", found);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod error;
/// Merkle Search Tree implementation
pub mod mst;
/// Block storage abstraction
pub mod storage;

pub use error::{MstError, Result};
pub use mst::{Mst, NodeEntry, NodeShape, ShapeEntry};
pub use storage::{BlockStore, MemoryBlockStore};

/// DAG-CBOR codec identifier for CIDs (0x71)
pub const DAG_CBOR_CID_CODEC: u64 = 0x71;

/// Multihash code for SHA2-256 (0x12)
pub const SHA2_256: u64 = 0x12;
