//! Hashing, layer assignment, and the node wire codec

use cid::Cid as IpldCid;
use ipld_core::ipld::Ipld;
use multibase::Base;
use sha2::{Digest, Sha256};
use smol_str::SmolStr;

use crate::error::{MstError, Result};
use crate::mst::node::NodeEntry;
use crate::{DAG_CBOR_CID_CODEC, SHA2_256};

/// Compute CID from raw bytes
///
/// Uses a SHA-256 multihash and the DAG-CBOR codec. Assumes data is
/// already DAG-CBOR encoded.
pub fn compute_cid(data: &[u8]) -> Result<IpldCid> {
    let digest = Sha256::digest(data);
    let mh = multihash::Multihash::<64>::wrap(SHA2_256, &digest)
        .map_err(|e| MstError::Encode(Box::new(e)))?;

    Ok(IpldCid::new_v1(DAG_CBOR_CID_CODEC, mh))
}

/// Calculate the natural layer of a key from its hash
///
/// Hashes the key with SHA-256, encodes the digest in lowercase RFC 4648
/// base32, and counts leading `'a'` characters (base32 value zero). Each
/// `'a'` is a zero 5-bit group, so higher counts are exponentially rarer
/// and the count makes a usable tree depth.
pub fn leading_zeros_on_hash(key: &str) -> usize {
    let digest = Sha256::digest(key.as_bytes());
    let b32 = Base::Base32Lower.encode(digest);

    b32.chars().take_while(|&c| c == 'a').count()
}

/// Validate a record key
///
/// Keys are arbitrary strings but must be non-empty.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(MstError::EmptyKey);
    }
    Ok(())
}

/// Serialize entries to canonical node bytes
///
/// The wire format is a DAG-CBOR array over a two-shape union:
/// - leaf → a `[key, value]` tuple
/// - subtree pointer → a bare CID link
///
/// The encoding contains no maps and no optional fields, so equal
/// logical nodes always produce identical bytes.
pub fn encode_node(entries: &[NodeEntry]) -> Result<Vec<u8>> {
    let items = entries
        .iter()
        .map(|entry| match entry {
            NodeEntry::Tree(cid) => Ipld::Link(*cid),
            NodeEntry::Leaf { key, value } => {
                Ipld::List(vec![Ipld::String(key.to_string()), Ipld::Link(*value)])
            }
        })
        .collect();

    serde_ipld_dagcbor::to_vec(&Ipld::List(items)).map_err(|e| MstError::Encode(Box::new(e)))
}

/// Decode node bytes back into entries
///
/// Maps each element's runtime shape onto the entry union: a bare link
/// becomes a subtree pointer, a `[string, link]` tuple becomes a leaf,
/// and anything else is rejected.
pub fn decode_node(bytes: &[u8]) -> Result<Vec<NodeEntry>> {
    let node: Ipld =
        serde_ipld_dagcbor::from_slice(bytes).map_err(|e| MstError::Decode(Box::new(e)))?;

    let Ipld::List(items) = node else {
        return Err(MstError::InvalidNode("node is not an array".into()));
    };

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Ipld::Link(cid) => entries.push(NodeEntry::Tree(cid)),
            Ipld::List(pair) => match <[Ipld; 2]>::try_from(pair) {
                Ok([Ipld::String(key), Ipld::Link(value)]) => {
                    if key.is_empty() {
                        return Err(MstError::InvalidNode("leaf has an empty key".into()));
                    }
                    entries.push(NodeEntry::Leaf {
                        key: SmolStr::new(&key),
                        value,
                    });
                }
                _ => {
                    return Err(MstError::InvalidNode(
                        "leaf entry must be a [key, cid] tuple".into(),
                    ));
                }
            },
            _ => {
                return Err(MstError::InvalidNode(
                    "entry must be a cid link or a [key, cid] tuple".into(),
                ));
            }
        }
    }

    Ok(entries)
}
