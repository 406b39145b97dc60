//! MST node entry types

use cid::Cid as IpldCid;
use smol_str::SmolStr;

/// Entry in an MST node - either a subtree pointer or a leaf
///
/// A node is an ordered sequence of these, stored as a single block.
/// Leaves appear in strictly ascending key order and a subtree pointer
/// between two leaves covers exactly the keys between them. A pointer in
/// a node at layer `z` references a node at layer `z - 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEntry {
    /// CID of a persisted subtree node one layer below
    Tree(IpldCid),

    /// Key-value pair stored directly at this layer
    Leaf {
        /// Record key
        key: SmolStr,
        /// CID of the record value
        value: IpldCid,
    },
}

impl NodeEntry {
    /// Check if this is a subtree pointer
    pub fn is_tree(&self) -> bool {
        matches!(self, NodeEntry::Tree(_))
    }

    /// Check if this is a leaf entry
    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeEntry::Leaf { .. })
    }

    /// Get the key if this is a leaf
    pub fn leaf_key(&self) -> Option<&str> {
        match self {
            NodeEntry::Leaf { key, .. } => Some(key.as_str()),
            NodeEntry::Tree(_) => None,
        }
    }
}

/// Fully expanded rendering of a node, as returned by [`Mst::structure`]
///
/// Values are omitted; the shape carries layers and keys only, which is
/// what golden-file and shape-preservation tests compare.
///
/// [`Mst::structure`]: crate::mst::Mst::structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeShape {
    /// Layer of the rendered node
    pub layer: usize,
    /// Entries in node order
    pub entries: Vec<ShapeEntry>,
}

/// One entry of a [`NodeShape`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeEntry {
    /// Leaf key
    Leaf(SmolStr),
    /// Recursively rendered subtree
    Subtree(NodeShape),
}
