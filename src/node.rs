//! Node records and their fixed-size on-disk encoding.
//!
//! A single record type backs every position in the forest. The variant is
//! an explicit tag rather than "which fields happen to be populated":
//!
//! - **Leaf**: one stored item (external key plus its embedding).
//! - **Bucket**: up to `K` leaf children, no split vector.
//! - **Branch**: exactly two children partitioned by a hyperplane normal.
//!
//! Every record additionally carries one parent id *per tree*, because one
//! leaf record is simultaneously a descendant of every tree in the forest.
//! Internal (bucket/branch) records belong to exactly one tree; their parent
//! slots for the other trees stay unset.
//!
//! # Record layout (little-endian)
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ state (1B): 0 = free, 1 = live               │
//! │ tag   (1B): 0 = leaf, 1 = bucket, 2 = branch │
//! │ key   (8B): external key, -1 for internal    │
//! │ n_descendants (4B)                           │
//! │ child_count   (2B)                           │
//! │ parents:  tree x 8B (-1 = root/unset)        │
//! │ children: max(K, 2) x 8B                     │
//! │ vector:   dim x 4B (leaf item / branch normal)│
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Records are fixed-size for a given geometry, so a node id is just an
//! offset multiplier into the tree file.

use smallvec::SmallVec;

use crate::error::{GannoyError, Result};

/// Dense node identifier: position in the node table.
pub type NodeId = i64;

/// Sentinel for "no node" (absent parent, empty root slot).
pub const NO_NODE: NodeId = -1;

/// Sentinel key carried by internal (non-leaf) records.
pub const KEY_NONE: i64 = -1;

const TAG_LEAF: u8 = 0;
const TAG_BUCKET: u8 = 1;
const TAG_BRANCH: u8 = 2;

/// Fixed index geometry: forest width, vector dimension, bucket capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Number of independent trees.
    pub tree: usize,
    /// Vector dimensionality.
    pub dim: usize,
    /// Bucket capacity `K`.
    pub k: usize,
}

impl Geometry {
    /// Child slots per record. A branch always needs two even when `K < 2`.
    #[must_use]
    pub fn child_slots(&self) -> usize {
        self.k.max(2)
    }

    /// Size in bytes of one encoded node record.
    #[must_use]
    pub fn record_size(&self) -> usize {
        1 + 1 + 8 + 4 + 2 + self.tree * 8 + self.child_slots() * 8 + self.dim * 4
    }
}

/// Variant-specific payload of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// A stored item.
    Leaf { key: i64, vector: Vec<f32> },
    /// Up to `K` leaf children, unsplit.
    Bucket { children: SmallVec<[NodeId; 4]> },
    /// Two children partitioned by `normal`.
    Branch {
        normal: Vec<f32>,
        children: [NodeId; 2],
    },
}

/// One record in the node table.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Position in the node table; assigned on allocation.
    pub id: NodeId,
    /// Parent id per tree; `NO_NODE` marks a root (or an unset slot).
    pub parents: Vec<NodeId>,
    /// Leaf items reachable beneath this node (1 for a leaf).
    pub n_descendants: u32,
    pub kind: NodeKind,
}

impl Node {
    /// New leaf holding `key` and its embedding.
    #[must_use]
    pub fn leaf(tree: usize, key: i64, vector: Vec<f32>) -> Self {
        Self {
            id: NO_NODE,
            parents: vec![NO_NODE; tree],
            n_descendants: 1,
            kind: NodeKind::Leaf { key, vector },
        }
    }

    /// New empty bucket.
    #[must_use]
    pub fn bucket(tree: usize) -> Self {
        Self {
            id: NO_NODE,
            parents: vec![NO_NODE; tree],
            n_descendants: 0,
            kind: NodeKind::Bucket {
                children: SmallVec::new(),
            },
        }
    }

    /// New branch with a split normal; children are wired up by the caller.
    #[must_use]
    pub fn branch(tree: usize, normal: Vec<f32>) -> Self {
        Self {
            id: NO_NODE,
            parents: vec![NO_NODE; tree],
            n_descendants: 0,
            kind: NodeKind::Branch {
                normal,
                children: [NO_NODE, NO_NODE],
            },
        }
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    #[must_use]
    pub fn is_bucket(&self) -> bool {
        matches!(self.kind, NodeKind::Bucket { .. })
    }

    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(self.kind, NodeKind::Branch { .. })
    }

    /// Whether this node is the root of tree `i`.
    #[must_use]
    pub fn is_root(&self, i: usize) -> bool {
        self.parents[i] == NO_NODE
    }

    /// External key, for leaves.
    #[must_use]
    pub fn key(&self) -> Option<i64> {
        match &self.kind {
            NodeKind::Leaf { key, .. } => Some(*key),
            _ => None,
        }
    }

    /// Stored embedding (leaf) or split normal (branch).
    #[must_use]
    pub fn vector(&self) -> Option<&[f32]> {
        match &self.kind {
            NodeKind::Leaf { vector, .. } => Some(vector),
            NodeKind::Branch { normal, .. } => Some(normal),
            NodeKind::Bucket { .. } => None,
        }
    }

    /// Child ids, in order. Empty for leaves.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Leaf { .. } => &[],
            NodeKind::Bucket { children } => children,
            NodeKind::Branch { children, .. } => children,
        }
    }

    /// Encode into a fixed-size record.
    pub(crate) fn encode(&self, geo: &Geometry) -> Result<Vec<u8>> {
        if self.parents.len() != geo.tree {
            return Err(GannoyError::Integrity(format!(
                "node {} has {} parent slots, geometry has {} trees",
                self.id,
                self.parents.len(),
                geo.tree
            )));
        }

        let mut buf = Vec::with_capacity(geo.record_size());
        buf.push(1u8);

        let (tag, key, vector): (u8, i64, &[f32]) = match &self.kind {
            NodeKind::Leaf { key, vector } => (TAG_LEAF, *key, vector),
            NodeKind::Bucket { .. } => (TAG_BUCKET, KEY_NONE, &[]),
            NodeKind::Branch { normal, .. } => (TAG_BRANCH, KEY_NONE, normal),
        };
        let children = self.children();
        if children.len() > geo.child_slots() {
            return Err(GannoyError::Integrity(format!(
                "node {} has {} children, capacity is {}",
                self.id,
                children.len(),
                geo.child_slots()
            )));
        }

        buf.push(tag);
        buf.extend_from_slice(&key.to_le_bytes());
        buf.extend_from_slice(&self.n_descendants.to_le_bytes());
        buf.extend_from_slice(&(children.len() as u16).to_le_bytes());
        for p in &self.parents {
            buf.extend_from_slice(&p.to_le_bytes());
        }
        for c in children {
            buf.extend_from_slice(&c.to_le_bytes());
        }
        for _ in children.len()..geo.child_slots() {
            buf.extend_from_slice(&NO_NODE.to_le_bytes());
        }
        for x in vector {
            buf.extend_from_slice(&x.to_le_bytes());
        }
        for _ in vector.len()..geo.dim {
            buf.extend_from_slice(&0.0_f32.to_le_bytes());
        }

        debug_assert_eq!(buf.len(), geo.record_size());
        Ok(buf)
    }

    /// Decode a record at `id`. Returns `None` for a freed slot.
    pub(crate) fn decode(id: NodeId, geo: &Geometry, buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() != geo.record_size() {
            return Err(GannoyError::Integrity(format!(
                "record {} has {} bytes, expected {}",
                id,
                buf.len(),
                geo.record_size()
            )));
        }
        if buf[0] == 0 {
            return Ok(None);
        }

        let tag = buf[1];
        let mut at = 2usize;
        let key = read_i64(buf, &mut at);
        let n_descendants = read_u32(buf, &mut at);
        let child_count = read_u16(buf, &mut at) as usize;
        if child_count > geo.child_slots() {
            return Err(GannoyError::Integrity(format!(
                "record {} claims {} children, capacity is {}",
                id,
                child_count,
                geo.child_slots()
            )));
        }

        let parents: Vec<NodeId> = (0..geo.tree).map(|_| read_i64(buf, &mut at)).collect();
        let children: Vec<NodeId> = (0..geo.child_slots())
            .map(|_| read_i64(buf, &mut at))
            .collect();
        let vector: Vec<f32> = (0..geo.dim).map(|_| read_f32(buf, &mut at)).collect();

        let kind = match tag {
            TAG_LEAF => NodeKind::Leaf { key, vector },
            TAG_BUCKET => NodeKind::Bucket {
                children: children[..child_count].iter().copied().collect(),
            },
            TAG_BRANCH => {
                if child_count != 2 {
                    return Err(GannoyError::Integrity(format!(
                        "branch record {} has {} children",
                        id, child_count
                    )));
                }
                NodeKind::Branch {
                    normal: vector,
                    children: [children[0], children[1]],
                }
            }
            other => {
                return Err(GannoyError::Integrity(format!(
                    "record {} has unknown tag {}",
                    id, other
                )))
            }
        };

        Ok(Some(Self {
            id,
            parents,
            n_descendants,
            kind,
        }))
    }
}

fn read_i64(buf: &[u8], at: &mut usize) -> i64 {
    let v = i64::from_le_bytes(buf[*at..*at + 8].try_into().unwrap());
    *at += 8;
    v
}

fn read_u32(buf: &[u8], at: &mut usize) -> u32 {
    let v = u32::from_le_bytes(buf[*at..*at + 4].try_into().unwrap());
    *at += 4;
    v
}

fn read_u16(buf: &[u8], at: &mut usize) -> u16 {
    let v = u16::from_le_bytes(buf[*at..*at + 2].try_into().unwrap());
    *at += 2;
    v
}

fn read_f32(buf: &[u8], at: &mut usize) -> f32 {
    let v = f32::from_le_bytes(buf[*at..*at + 4].try_into().unwrap());
    *at += 4;
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    const GEO: Geometry = Geometry {
        tree: 2,
        dim: 3,
        k: 3,
    };

    #[test]
    fn leaf_round_trip() {
        let mut n = Node::leaf(GEO.tree, 10, vec![1.1, 1.2, 1.3]);
        n.id = 4;
        n.parents = vec![7, 9];
        let buf = n.encode(&GEO).unwrap();
        assert_eq!(buf.len(), GEO.record_size());
        let back = Node::decode(4, &GEO, &buf).unwrap().unwrap();
        assert_eq!(back, n);
    }

    #[test]
    fn bucket_round_trip() {
        let mut n = Node::bucket(GEO.tree);
        n.id = 2;
        n.n_descendants = 3;
        n.kind = NodeKind::Bucket {
            children: smallvec![0, 3, 11],
        };
        let buf = n.encode(&GEO).unwrap();
        let back = Node::decode(2, &GEO, &buf).unwrap().unwrap();
        assert_eq!(back, n);
        assert!(back.is_bucket());
        assert_eq!(back.key(), None);
    }

    #[test]
    fn branch_round_trip() {
        let mut n = Node::branch(GEO.tree, vec![0.5, 0.6, 0.7]);
        n.id = 7;
        n.n_descendants = 5;
        n.kind = NodeKind::Branch {
            normal: vec![0.5, 0.6, 0.7],
            children: [8, 0],
        };
        let buf = n.encode(&GEO).unwrap();
        let back = Node::decode(7, &GEO, &buf).unwrap().unwrap();
        assert_eq!(back, n);
        assert_eq!(back.children(), &[8, 0]);
    }

    #[test]
    fn freed_slot_decodes_to_none() {
        let buf = vec![0u8; GEO.record_size()];
        assert!(Node::decode(1, &GEO, &buf).unwrap().is_none());
    }

    #[test]
    fn unknown_tag_is_integrity_error() {
        let mut buf = vec![0u8; GEO.record_size()];
        buf[0] = 1;
        buf[1] = 9;
        assert!(Node::decode(1, &GEO, &buf).is_err());
    }

    #[test]
    fn root_markers() {
        let n = Node::leaf(GEO.tree, 10, vec![0.0; 3]);
        assert!(n.is_root(0));
        assert!(n.is_root(1));
    }
}
