//! Merkle Search Tree implementation

pub mod node;
pub mod tree;
pub mod util;

pub use node::{NodeEntry, NodeShape, ShapeEntry};
pub use tree::Mst;
