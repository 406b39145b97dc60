//! Error types for tree and storage operations

use std::error::Error;

use cid::Cid as IpldCid;
use smol_str::SmolStr;

/// Boxed error type for error sources
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Result type alias for tree operations
pub type Result<T> = std::result::Result<T, MstError>;

/// Errors surfaced by MST and block store operations
///
/// None of these are recovered internally; operations are all-or-nothing
/// and the caller still holds the previous root CID on failure.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum MstError {
    /// Key is already present at the layer it naturally belongs to
    #[error("key already exists: {key}")]
    KeyExists {
        /// The conflicting key
        key: SmolStr,
    },

    /// Key is not present anywhere in the tree
    #[error("key not found: {key}")]
    KeyNotFound {
        /// The missing key
        key: SmolStr,
    },

    /// Empty key not allowed
    #[error("empty key not allowed")]
    EmptyKey,

    /// Node has no leaves to infer a layer from and no hint was supplied
    #[error("cannot infer layer of node {cid}: no leaves and no layer hint")]
    LayerUnknown {
        /// CID of the leafless node
        cid: IpldCid,
    },

    /// A referenced block is absent from the store
    #[error("block not found: {cid}")]
    BlockNotFound {
        /// The missing CID
        cid: IpldCid,
    },

    /// Merge attempted between nodes at different layers
    #[error("cannot merge nodes from different layers: {ours} vs {theirs}")]
    LayerMismatch {
        /// Layer of the receiving node
        ours: usize,
        /// Layer of the incoming node
        theirs: usize,
    },

    /// Decoded bytes do not describe a valid node
    #[error("malformed node: {0}")]
    InvalidNode(String),

    /// Node decoding failed
    #[error("node decode failed")]
    Decode(#[source] BoxError),

    /// Node encoding failed
    #[error("node encode failed")]
    Encode(#[source] BoxError),

    /// Block store I/O failure
    #[error("block store failure")]
    Io(#[source] BoxError),
}
