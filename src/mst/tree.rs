//! Merkle Search Tree operations

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use cid::Cid as IpldCid;
use smol_str::SmolStr;

use crate::error::{MstError, Result};
use crate::mst::node::{NodeEntry, NodeShape, ShapeEntry};
use crate::mst::util;
use crate::storage::BlockStore;

/// Handle to a loaded MST node
///
/// The tree is an ordered key→CID index whose shape is deterministic:
/// each key's depth is the leading-zero count of its hash, so identical
/// key/value sets always produce identical root CIDs regardless of
/// insertion order.
///
/// Mutating operations splice the in-memory entry list, re-persist the
/// node through the block store, and leave the handle pointing at the
/// new CID; children re-persist before their parent, so a stored parent
/// never references an absent block. A handle is a single-writer value.
/// Concurrent readers each load their own handle from a shared root CID.
///
/// # Architecture
///
/// A node is a flat `Vec<NodeEntry>`, where `NodeEntry` is an enum of
/// `Tree` (subtree pointer) and `Leaf` (key-value pair). Entries are
/// interleaved: `[Tree, Leaf, Tree, Leaf, Leaf, Tree]` etc. This
/// representation keeps operations simple (Vec slicing, splicing) and
/// maps one-to-one onto the wire format.
#[derive(Debug, Clone)]
pub struct Mst<S> {
    /// Block storage for loading/saving nodes (shared via Arc)
    storage: Arc<S>,

    /// CID of this node's persisted bytes
    cid: IpldCid,

    /// Entries of this node, in key order
    entries: Vec<NodeEntry>,

    /// Layer of this node: the leading-zero count of every leaf stored here
    layer: usize,
}

impl<S: BlockStore + Sync + 'static> Mst<S> {
    /// Create an empty tree at the given layer and persist its root
    pub async fn create(storage: Arc<S>, layer: usize) -> Result<Self> {
        Self::from_entries(storage, Vec::new(), layer).await
    }

    /// Persist `entries` as a node at the given layer and return a handle
    pub async fn from_entries(
        storage: Arc<S>,
        entries: Vec<NodeEntry>,
        layer: usize,
    ) -> Result<Self> {
        let bytes = util::encode_node(&entries)?;
        let cid = storage.put(&bytes).await?;

        Ok(Self {
            storage,
            cid,
            entries,
            layer,
        })
    }

    /// Load a node from the store
    ///
    /// When `layer` is `None` it is inferred from the first leaf. A node
    /// holding only subtree pointers cannot be loaded without a hint and
    /// fails with [`MstError::LayerUnknown`]; recursive descent always
    /// supplies the hint.
    pub async fn load(storage: Arc<S>, cid: IpldCid, layer: Option<usize>) -> Result<Self> {
        let bytes = storage
            .get(&cid)
            .await?
            .ok_or(MstError::BlockNotFound { cid })?;
        let entries = util::decode_node(&bytes)?;

        let layer = match layer {
            Some(layer) => layer,
            None => entries
                .iter()
                .find_map(NodeEntry::leaf_key)
                .map(util::leading_zeros_on_hash)
                .ok_or(MstError::LayerUnknown { cid })?,
        };

        Ok(Self {
            storage,
            cid,
            entries,
            layer,
        })
    }

    /// Re-serialize the current entries, persist them, and update the CID
    pub async fn put(&mut self) -> Result<IpldCid> {
        let bytes = util::encode_node(&self.entries)?;
        self.cid = self.storage.put(&bytes).await?;
        Ok(self.cid)
    }

    /// CID of this node as last persisted
    pub fn root(&self) -> IpldCid {
        self.cid
    }

    /// Layer of this node
    pub fn layer(&self) -> usize {
        self.layer
    }

    /// Entries of this node, in key order
    pub fn entries(&self) -> &[NodeEntry] {
        &self.entries
    }

    /// Shared reference to the block storage
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Index of the first leaf whose key is ≥ `key`
    ///
    /// Returns `entries.len()` if all leaves sort before `key`. Subtree
    /// pointers are skipped by the search but keep their positions, so
    /// the entry just before the returned index is the subtree (if any)
    /// covering the interval below `key`.
    fn find_gt_or_equal_leaf_index(&self, key: &str) -> usize {
        self.entries
            .iter()
            .position(|entry| matches!(entry, NodeEntry::Leaf { key: k, .. } if k.as_str() >= key))
            .unwrap_or(self.entries.len())
    }

    fn child_layer(&self) -> usize {
        self.layer.saturating_sub(1)
    }

    async fn load_child(&self, cid: IpldCid) -> Result<Mst<S>> {
        Mst::load(self.storage.clone(), cid, Some(self.child_layer())).await
    }

    /// Add a key-value pair and return the new root CID
    ///
    /// Fails with [`MstError::KeyExists`] if the key is already present.
    pub fn add<'a>(
        &'a mut self,
        key: &'a str,
        value: IpldCid,
    ) -> Pin<Box<dyn Future<Output = Result<IpldCid>> + Send + 'a>> {
        Box::pin(async move {
            util::validate_key(key)?;

            let key_layer = util::leading_zeros_on_hash(key);
            if key_layer == self.layer {
                self.add_here(key, value).await
            } else if key_layer < self.layer {
                self.add_below(key, value).await
            } else {
                self.add_above(key, value, key_layer).await
            }
        })
    }

    /// The key's natural layer is this node's layer: it becomes a leaf here
    async fn add_here(&mut self, key: &str, value: IpldCid) -> Result<IpldCid> {
        let index = self.find_gt_or_equal_leaf_index(key);
        if let Some(NodeEntry::Leaf { key: found, .. }) = self.entries.get(index) {
            if found.as_str() == key {
                return Err(MstError::KeyExists { key: found.clone() });
            }
        }

        let leaf = NodeEntry::Leaf {
            key: SmolStr::new(key),
            value,
        };

        match index.checked_sub(1).map(|i| &self.entries[i]) {
            Some(NodeEntry::Tree(ptr)) => {
                // The preceding subtree covers keys on both sides of the
                // new leaf; split it and put the halves around the leaf.
                let ptr = *ptr;
                let sub = self.load_child(ptr).await?;
                let (left, right) = sub.split_around(key).await?;

                let mut entries = Vec::with_capacity(self.entries.len() + 2);
                entries.extend_from_slice(&self.entries[..index - 1]);
                entries.extend(left.map(NodeEntry::Tree));
                entries.push(leaf);
                entries.extend(right.map(NodeEntry::Tree));
                entries.extend_from_slice(&self.entries[index..]);
                self.entries = entries;
            }
            _ => self.entries.insert(index, leaf),
        }

        self.put().await
    }

    /// The key belongs below this node: descend into (or grow) a subtree
    async fn add_below(&mut self, key: &str, value: IpldCid) -> Result<IpldCid> {
        let index = self.find_gt_or_equal_leaf_index(key);

        match index.checked_sub(1).map(|i| &self.entries[i]) {
            Some(NodeEntry::Tree(ptr)) => {
                let ptr = *ptr;
                let mut sub = self.load_child(ptr).await?;
                let new_cid = sub.add(key, value).await?;
                self.entries[index - 1] = NodeEntry::Tree(new_cid);
            }
            _ => {
                let mut child = Mst::create(self.storage.clone(), self.child_layer()).await?;
                let new_cid = child.add(key, value).await?;
                self.entries.insert(index, NodeEntry::Tree(new_cid));
            }
        }

        self.put().await
    }

    /// The key's layer is above this node: push the whole tree down under
    /// a new root at the key's layer
    async fn add_above(&mut self, key: &str, value: IpldCid, key_layer: usize) -> Result<IpldCid> {
        let (mut left, mut right) = self.split_around(key).await?;

        // Bridge any layer gap with single-pointer nodes.
        for layer in self.layer + 1..key_layer {
            if let Some(cid) = left {
                left = Some(self.wrap_pointer(cid, layer).await?);
            }
            if let Some(cid) = right {
                right = Some(self.wrap_pointer(cid, layer).await?);
            }
        }

        let mut entries = Vec::with_capacity(3);
        entries.extend(left.map(NodeEntry::Tree));
        entries.push(NodeEntry::Leaf {
            key: SmolStr::new(key),
            value,
        });
        entries.extend(right.map(NodeEntry::Tree));

        self.layer = key_layer;
        self.entries = entries;
        self.put().await
    }

    /// Persist a single-pointer node at `layer` wrapping `cid`
    async fn wrap_pointer(&self, cid: IpldCid, layer: usize) -> Result<IpldCid> {
        let node =
            Mst::from_entries(self.storage.clone(), vec![NodeEntry::Tree(cid)], layer).await?;
        Ok(node.root())
    }

    /// Split this tree around `key` into two persisted trees
    ///
    /// Returns `(left, right)` root CIDs covering all entries strictly
    /// less than and strictly greater than `key`; either side is `None`
    /// when empty. `key` itself must not be a leaf at this layer.
    pub fn split_around<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(Option<IpldCid>, Option<IpldCid>)>> + Send + 'a>> {
        Box::pin(async move {
            let index = self.find_gt_or_equal_leaf_index(key);
            let mut left = self.entries[..index].to_vec();
            let mut right = self.entries[index..].to_vec();

            // A subtree at the end of the left half may hold keys on both
            // sides of the split; split it recursively and reattach each
            // half to its own side.
            if let Some(NodeEntry::Tree(ptr)) = left.last() {
                let ptr = *ptr;
                left.pop();
                let sub = self.load_child(ptr).await?;
                let (sub_left, sub_right) = sub.split_around(key).await?;
                left.extend(sub_left.map(NodeEntry::Tree));
                if let Some(cid) = sub_right {
                    right.insert(0, NodeEntry::Tree(cid));
                }
            }

            let left_cid = if left.is_empty() {
                None
            } else {
                Some(Mst::from_entries(self.storage.clone(), left, self.layer).await?.root())
            };
            let right_cid = if right.is_empty() {
                None
            } else {
                Some(Mst::from_entries(self.storage.clone(), right, self.layer).await?.root())
            };

            Ok((left_cid, right_cid))
        })
    }

    /// Get a value by key, or `None` if absent
    pub fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<IpldCid>>> + Send + 'a>> {
        Box::pin(async move {
            util::validate_key(key)?;

            let index = self.find_gt_or_equal_leaf_index(key);
            if let Some(NodeEntry::Leaf { key: found, value }) = self.entries.get(index) {
                if found.as_str() == key {
                    return Ok(Some(*value));
                }
            }

            if let Some(NodeEntry::Tree(ptr)) = index.checked_sub(1).map(|i| &self.entries[i]) {
                let sub = self.load_child(*ptr).await?;
                return sub.get(key).await;
            }

            Ok(None)
        })
    }

    /// Overwrite the value of an existing key and return the new root CID
    ///
    /// The set of keys and the tree's shape are unchanged. Fails with
    /// [`MstError::KeyNotFound`] if the key is absent.
    pub fn edit<'a>(
        &'a mut self,
        key: &'a str,
        value: IpldCid,
    ) -> Pin<Box<dyn Future<Output = Result<IpldCid>> + Send + 'a>> {
        Box::pin(async move {
            util::validate_key(key)?;

            let index = self.find_gt_or_equal_leaf_index(key);
            if let Some(NodeEntry::Leaf { key: found, .. }) = self.entries.get(index) {
                if found.as_str() == key {
                    self.entries[index] = NodeEntry::Leaf {
                        key: SmolStr::new(key),
                        value,
                    };
                    return self.put().await;
                }
            }

            if let Some(NodeEntry::Tree(ptr)) = index.checked_sub(1).map(|i| &self.entries[i]) {
                let ptr = *ptr;
                let mut sub = self.load_child(ptr).await?;
                let new_cid = sub.edit(key, value).await?;
                self.entries[index - 1] = NodeEntry::Tree(new_cid);
                return self.put().await;
            }

            Err(MstError::KeyNotFound {
                key: SmolStr::new(key),
            })
        })
    }

    /// Merge another tree at the same layer into this one
    ///
    /// Walks the other node's entries in order, splicing leaves into
    /// place and recursively merging overlapping subtrees. The incoming
    /// tree wins on conflicting keys. Fails with
    /// [`MstError::LayerMismatch`] when the layers differ.
    pub fn merge_in<'a>(
        &'a mut self,
        other: &'a Mst<S>,
    ) -> Pin<Box<dyn Future<Output = Result<IpldCid>> + Send + 'a>> {
        Box::pin(async move {
            if self.layer != other.layer {
                return Err(MstError::LayerMismatch {
                    ours: self.layer,
                    theirs: other.layer,
                });
            }

            let mut index = 0;
            for entry in &other.entries {
                match entry {
                    NodeEntry::Leaf { key, .. } => {
                        index = self.find_gt_or_equal_leaf_index(key);
                        match self.entries.get(index) {
                            Some(NodeEntry::Leaf { key: ours, .. }) if ours == key => {
                                self.entries[index] = entry.clone();
                            }
                            _ => self.entries.insert(index, entry.clone()),
                        }
                    }
                    NodeEntry::Tree(theirs) => match self.entries.get(index) {
                        // Content addressing: equal pointers are equal subtrees.
                        Some(NodeEntry::Tree(ours)) if ours == theirs => {}
                        Some(NodeEntry::Tree(ours)) => {
                            let ours = *ours;
                            let mut merged = self.load_child(ours).await?;
                            let incoming = self.load_child(*theirs).await?;
                            merged.merge_in(&incoming).await?;
                            self.entries[index] = NodeEntry::Tree(merged.root());
                        }
                        _ => self.entries.insert(index, entry.clone()),
                    },
                }
                index += 1;
            }

            self.put().await
        })
    }

    /// In-order traversal
    ///
    /// Invokes `visitor(layer, key)` for every entry: `(z, None)` for a
    /// subtree pointer in a node at layer `z` (before descending into
    /// it), `(z, Some(key))` for a leaf stored at layer `z`.
    pub fn walk<'a, V>(
        &'a self,
        visitor: &'a mut V,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>
    where
        V: FnMut(usize, Option<&str>) + Send,
    {
        Box::pin(async move {
            for entry in &self.entries {
                match entry {
                    NodeEntry::Tree(ptr) => {
                        visitor(self.layer, None);
                        let sub = self.load_child(*ptr).await?;
                        sub.walk(visitor).await?;
                    }
                    NodeEntry::Leaf { key, .. } => visitor(self.layer, Some(key.as_str())),
                }
            }
            Ok(())
        })
    }

    /// Fully expanded rendering of the tree, for debugging and golden tests
    pub fn structure<'a>(&'a self) -> Pin<Box<dyn Future<Output = Result<NodeShape>> + Send + 'a>> {
        Box::pin(async move {
            let mut entries = Vec::with_capacity(self.entries.len());
            for entry in &self.entries {
                match entry {
                    NodeEntry::Tree(ptr) => {
                        let sub = self.load_child(*ptr).await?;
                        entries.push(ShapeEntry::Subtree(sub.structure().await?));
                    }
                    NodeEntry::Leaf { key, .. } => entries.push(ShapeEntry::Leaf(key.clone())),
                }
            }

            Ok(NodeShape {
                layer: self.layer,
                entries,
            })
        })
    }

    /// All leaf entries in lexicographic key order
    pub async fn leaves(&self) -> Result<Vec<(SmolStr, IpldCid)>> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out).await?;
        Ok(out)
    }

    fn collect_leaves<'a>(
        &'a self,
        out: &'a mut Vec<(SmolStr, IpldCid)>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            for entry in &self.entries {
                match entry {
                    NodeEntry::Tree(ptr) => {
                        let sub = self.load_child(*ptr).await?;
                        sub.collect_leaves(out).await?;
                    }
                    NodeEntry::Leaf { key, value } => out.push((key.clone(), *value)),
                }
            }
            Ok(())
        })
    }
}
