//! The incremental ANN forest.
//!
//! A [`GannoyIndex`] maintains `tree` independent randomized binary
//! partition trees over one shared node table. Unlike batch-built ANN
//! indexes, items can be inserted, updated and removed online while the
//! structural invariants hold:
//!
//! 1. every tree has a unique, cycle-free root;
//! 2. a bucket holds at most `K` children, a branch exactly two;
//! 3. `n_descendants` equals the sum over children (1 for a leaf);
//! 4. parent and child pointers agree;
//! 5. no degenerate single-child node survives a deletion: it is collapsed
//!    and its sole child promoted under the grandparent.
//!
//! # Concurrency
//!
//! Mutations hold an exclusive advisory lock on the tree file, searches a
//! shared one. That is the *only* coordination: the lock serializes
//! cooperating processes, while within one process the `&mut self` receiver
//! on mutations is what prevents aliased writers on a single handle.
//! Separate in-process handles to the same files are coordinated by the file
//! lock alone, and their in-memory key maps do not observe each other's
//! writes; open one handle per index per process.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::distance::Distance;
use crate::error::{GannoyError, Result};
use crate::lock::{Flock, Locker};
use crate::meta::Meta;
use crate::node::{Geometry, Node, NodeId, NodeKind, NO_NODE};
use crate::queue::{heap_sort, Order, Ranked, SearchQueue};
use crate::random::RandomSource;
use crate::store::NodeStore;

/// Disk-backed forest of randomized partition trees with online mutation.
pub struct GannoyIndex<D: Distance, R: RandomSource> {
    meta_path: PathBuf,
    geo: Geometry,
    store: NodeStore,
    distance: D,
    random: R,
    locker: Box<dyn Locker>,
}

impl<D: Distance, R: RandomSource> GannoyIndex<D, R> {
    /// Open the index described by `meta_path`, creating the companion
    /// `.tree` file if needed. Fails `NotFound` if the meta file is absent.
    pub fn open(meta_path: impl AsRef<Path>, distance: D, random: R) -> Result<Self> {
        Self::with_locker(meta_path, distance, random, Box::new(Flock))
    }

    /// Like [`GannoyIndex::open`] with an explicit locking strategy.
    pub fn with_locker(
        meta_path: impl AsRef<Path>,
        distance: D,
        random: R,
        locker: Box<dyn Locker>,
    ) -> Result<Self> {
        let meta_path = meta_path.as_ref().to_path_buf();
        let meta = Meta::load(&meta_path)?;
        let geo = meta.geometry();
        let store = NodeStore::open(&Meta::tree_path(&meta_path), geo)?;
        Ok(Self {
            meta_path,
            geo,
            store,
            distance,
            random,
            locker,
        })
    }

    /// Number of trees in the forest.
    #[must_use]
    pub fn tree(&self) -> usize {
        self.geo.tree
    }

    /// Vector dimensionality.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.geo.dim
    }

    /// Bucket capacity `K`.
    #[must_use]
    pub fn k(&self) -> usize {
        self.geo.k
    }

    /// Number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Insert a new item. Fails `InvalidArgument` on a dimension mismatch or
    /// a duplicate key, before any mutation happens.
    pub fn add_item(&mut self, key: i64, vector: &[f32]) -> Result<()> {
        self.locker.write_lock(self.store.file(), 0, 0)?;
        let result = self.add_locked(key, vector);
        let unlocked = self.locker.unlock(self.store.file(), 0, 0);
        result?;
        unlocked?;
        Ok(())
    }

    /// Remove an item. Fails `NotFound` if `key` is not indexed.
    pub fn remove_item(&mut self, key: i64) -> Result<()> {
        self.locker.write_lock(self.store.file(), 0, 0)?;
        let result = self.remove_locked(key);
        let unlocked = self.locker.unlock(self.store.file(), 0, 0);
        result?;
        unlocked?;
        Ok(())
    }

    /// Replace an item's vector, preserving its key. The item may move to a
    /// structurally different position if the new coordinates route
    /// differently.
    pub fn update_item(&mut self, key: i64, vector: &[f32]) -> Result<()> {
        self.locker.write_lock(self.store.file(), 0, 0)?;
        let result = self.update_locked(key, vector);
        let unlocked = self.locker.unlock(self.store.file(), 0, 0);
        result?;
        unlocked?;
        Ok(())
    }

    /// Approximate `n` nearest neighbors of the already-indexed item `key`.
    ///
    /// `search_k` bounds how many candidate leaves the best-first expansion
    /// collects before exact re-ranking; a negative value searches
    /// exhaustively. Fails `NotFound` if `key` is not indexed.
    pub fn get_nns_by_key(&self, key: i64, n: usize, search_k: isize) -> Result<Vec<i64>> {
        self.locker.read_lock(self.store.file(), 0, 0)?;
        let result = self.search_locked(key, n, search_k);
        let unlocked = self.locker.unlock(self.store.file(), 0, 0);
        let nns = result?;
        unlocked?;
        Ok(nns)
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    fn add_locked(&mut self, key: i64, vector: &[f32]) -> Result<()> {
        if vector.len() != self.geo.dim {
            return Err(GannoyError::InvalidArgument(format!(
                "vector has {} dimensions, index expects {}",
                vector.len(),
                self.geo.dim
            )));
        }
        if self.store.contains_key(key) {
            return Err(GannoyError::InvalidArgument(format!(
                "key {} already exists",
                key
            )));
        }

        let mut meta = Meta::load(&self.meta_path)?;
        let mut leaf = Node::leaf(self.geo.tree, key, vector.to_vec());
        let leaf_id = self.store.allocate(&mut leaf)?;

        for i in 0..self.geo.tree {
            let root = meta.roots[i];
            if root == NO_NODE {
                meta.roots[i] = leaf_id;
            } else {
                self.insert_at(&mut meta, i, root, leaf_id, vector)?;
            }
        }

        meta.save(&self.meta_path)?;
        debug!(key, id = leaf_id, "added item");
        Ok(())
    }

    /// Descend tree `i` from `node_id` and attach the item where it lands.
    fn insert_at(
        &mut self,
        meta: &mut Meta,
        i: usize,
        node_id: NodeId,
        item_id: NodeId,
        item_vec: &[f32],
    ) -> Result<()> {
        let mut node = self.store.node(node_id)?;
        match node.kind.clone() {
            NodeKind::Branch { normal, children } => {
                node.n_descendants += 1;
                self.store.update(&node)?;
                let side = self.distance.side(&normal, item_vec, &mut self.random);
                self.insert_at(meta, i, children[side], item_id, item_vec)
            }
            NodeKind::Bucket { mut children } => {
                if children.len() < self.geo.k {
                    children.push(item_id);
                    node.n_descendants += 1;
                    node.kind = NodeKind::Bucket { children };
                    self.store.update(&node)?;
                    self.set_parent(item_id, i, node_id)
                } else {
                    self.split_bucket(meta, i, &node, item_id, item_vec)
                }
            }
            NodeKind::Leaf { .. } => {
                // Pair the resident leaf and the new item under a fresh bucket
                // occupying the old leaf's slot.
                let grand = node.parents[i];
                let mut bucket = Node::bucket(self.geo.tree);
                bucket.n_descendants = node.n_descendants + 1;
                bucket.kind = NodeKind::Bucket {
                    children: [node_id, item_id].into_iter().collect(),
                };
                bucket.parents[i] = grand;
                let bucket_id = self.store.allocate(&mut bucket)?;

                if grand == NO_NODE {
                    meta.roots[i] = bucket_id;
                } else {
                    self.replace_child(grand, node_id, bucket_id)?;
                }
                self.set_parent(node_id, i, bucket_id)?;
                self.set_parent(item_id, i, bucket_id)
            }
        }
    }

    /// Split a full bucket into a branch over two new partitions, then
    /// re-insert the pending item beneath the branch.
    fn split_bucket(
        &mut self,
        meta: &mut Meta,
        i: usize,
        bucket: &Node,
        item_id: NodeId,
        item_vec: &[f32],
    ) -> Result<()> {
        let members: Vec<Node> = bucket
            .children()
            .iter()
            .map(|&c| self.store.node(c))
            .collect::<Result<_>>()?;

        let mut vectors: Vec<&[f32]> = Vec::with_capacity(members.len());
        for m in &members {
            vectors.push(m.vector().ok_or_else(|| {
                GannoyError::Integrity(format!("bucket child {} has no vector", m.id))
            })?);
        }

        let normal = self.distance.create_split(&vectors, &mut self.random);

        let mut sides: [Vec<NodeId>; 2] = [Vec::new(), Vec::new()];
        for (m, v) in members.iter().zip(&vectors) {
            let side = self.distance.side(&normal, v, &mut self.random);
            sides[side].push(m.id);
        }
        // A degenerate hyperplane can still land every member on one side;
        // rebalance by alternating assignment so both partitions are
        // populated.
        if sides[0].is_empty() || sides[1].is_empty() {
            sides = [Vec::new(), Vec::new()];
            for (z, m) in members.iter().enumerate() {
                sides[z % 2].push(m.id);
            }
        }

        let grand = bucket.parents[i];
        let mut branch = Node::branch(self.geo.tree, normal.clone());
        branch.n_descendants = bucket.n_descendants;
        branch.parents[i] = grand;
        let branch_id = self.store.allocate(&mut branch)?;

        let mut child_ids = [NO_NODE; 2];
        for (side, ids) in sides.iter().enumerate() {
            child_ids[side] = if ids.len() == 1 {
                // A singleton partition stays a bare leaf under the branch.
                let leaf_id = ids[0];
                self.set_parent(leaf_id, i, branch_id)?;
                leaf_id
            } else {
                let mut part = Node::bucket(self.geo.tree);
                part.n_descendants = ids.len() as u32;
                part.kind = NodeKind::Bucket {
                    children: ids.iter().copied().collect(),
                };
                part.parents[i] = branch_id;
                let part_id = self.store.allocate(&mut part)?;
                for &c in ids {
                    self.set_parent(c, i, part_id)?;
                }
                part_id
            };
        }

        branch.kind = NodeKind::Branch {
            normal,
            children: child_ids,
        };
        self.store.update(&branch)?;

        if grand == NO_NODE {
            meta.roots[i] = branch_id;
        } else {
            self.replace_child(grand, bucket.id, branch_id)?;
        }
        self.store.release(bucket.id)?;

        self.insert_at(meta, i, branch_id, item_id, item_vec)
    }

    fn remove_locked(&mut self, key: i64) -> Result<()> {
        let leaf = self.store.node_by_key(key)?;
        let mut meta = Meta::load(&self.meta_path)?;

        for i in 0..self.geo.tree {
            self.unlink(&mut meta, i, &leaf)?;
        }

        self.store.release(leaf.id)?;
        meta.save(&self.meta_path)?;
        debug!(key, id = leaf.id, "removed item");
        Ok(())
    }

    /// Detach `leaf` from tree `i`, collapsing degenerate ancestors.
    fn unlink(&mut self, meta: &mut Meta, i: usize, leaf: &Node) -> Result<()> {
        let parent_id = leaf.parents[i];
        if parent_id == NO_NODE {
            // Singleton tree: the leaf is the root.
            if meta.roots[i] != leaf.id {
                return Err(GannoyError::Integrity(format!(
                    "leaf {} has no parent in tree {} but is not its root",
                    leaf.id, i
                )));
            }
            meta.roots[i] = NO_NODE;
            return Ok(());
        }

        let mut parent = self.store.node(parent_id)?;
        let grand = parent.parents[i];

        match parent.kind.clone() {
            NodeKind::Bucket { mut children } => {
                let before = children.len();
                children.retain(|c| *c != leaf.id);
                if children.len() == before {
                    return Err(GannoyError::Integrity(format!(
                        "bucket {} does not list child {}",
                        parent_id, leaf.id
                    )));
                }
                if children.len() == 1 {
                    self.promote(meta, i, parent_id, grand, children[0])?;
                } else {
                    parent.n_descendants -= 1;
                    parent.kind = NodeKind::Bucket { children };
                    self.store.update(&parent)?;
                }
            }
            NodeKind::Branch { children, .. } => {
                // Removing a direct branch child leaves one meaningful
                // subtree; collapse the branch around it.
                let promoted = if children[0] == leaf.id {
                    children[1]
                } else if children[1] == leaf.id {
                    children[0]
                } else {
                    return Err(GannoyError::Integrity(format!(
                        "branch {} does not list child {}",
                        parent_id, leaf.id
                    )));
                };
                self.promote(meta, i, parent_id, grand, promoted)?;
            }
            NodeKind::Leaf { .. } => {
                return Err(GannoyError::Integrity(format!(
                    "leaf {} recorded as a parent in tree {}",
                    parent_id, i
                )));
            }
        }

        // Every ancestor above the (possibly collapsed) parent lost one leaf.
        let mut cursor = grand;
        while cursor != NO_NODE {
            let mut ancestor = self.store.node(cursor)?;
            ancestor.n_descendants -= 1;
            self.store.update(&ancestor)?;
            cursor = ancestor.parents[i];
        }
        Ok(())
    }

    /// Collapse `old_parent` in tree `i`: hand its sole remaining child to
    /// the grandparent (or make it the root) and release the record.
    fn promote(
        &mut self,
        meta: &mut Meta,
        i: usize,
        old_parent: NodeId,
        grand: NodeId,
        child: NodeId,
    ) -> Result<()> {
        self.set_parent(child, i, grand)?;
        if grand == NO_NODE {
            meta.roots[i] = child;
        } else {
            self.replace_child(grand, old_parent, child)?;
        }
        self.store.release(old_parent)
    }

    fn update_locked(&mut self, key: i64, vector: &[f32]) -> Result<()> {
        if vector.len() != self.geo.dim {
            return Err(GannoyError::InvalidArgument(format!(
                "vector has {} dimensions, index expects {}",
                vector.len(),
                self.geo.dim
            )));
        }
        if !self.store.contains_key(key) {
            return Err(GannoyError::NotFound(format!("key {}", key)));
        }
        self.remove_locked(key)?;
        self.add_locked(key, vector)?;
        debug!(key, "updated item");
        Ok(())
    }

    fn set_parent(&mut self, id: NodeId, i: usize, parent: NodeId) -> Result<()> {
        let mut node = self.store.node(id)?;
        node.parents[i] = parent;
        self.store.update(&node)
    }

    fn replace_child(&mut self, parent_id: NodeId, old: NodeId, new: NodeId) -> Result<()> {
        let mut parent = self.store.node(parent_id)?;
        match &mut parent.kind {
            NodeKind::Bucket { children } => {
                let slot = children.iter_mut().find(|c| **c == old);
                match slot {
                    Some(c) => *c = new,
                    None => {
                        return Err(GannoyError::Integrity(format!(
                            "bucket {} does not list child {}",
                            parent_id, old
                        )))
                    }
                }
            }
            NodeKind::Branch { children, .. } => {
                if children[0] == old {
                    children[0] = new;
                } else if children[1] == old {
                    children[1] = new;
                } else {
                    return Err(GannoyError::Integrity(format!(
                        "branch {} does not list child {}",
                        parent_id, old
                    )));
                }
            }
            NodeKind::Leaf { .. } => {
                return Err(GannoyError::Integrity(format!(
                    "leaf {} cannot hold children",
                    parent_id
                )));
            }
        }
        self.store.update(&parent)
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    fn search_locked(&self, key: i64, n: usize, search_k: isize) -> Result<Vec<i64>> {
        let item = self.store.node_by_key(key)?;
        let query = item
            .vector()
            .ok_or_else(|| GannoyError::Integrity(format!("leaf {} has no vector", item.id)))?
            .to_vec();

        let meta = Meta::load(&self.meta_path)?;
        let limit = if search_k < 0 {
            usize::MAX
        } else {
            search_k as usize
        };

        // Best-first expansion across all trees, most promising node first.
        // The far side of each branch keeps a penalized priority so it stays
        // explorable instead of being discarded.
        let mut queue = SearchQueue::new();
        for &root in &meta.roots {
            if root != NO_NODE {
                queue.push(f32::INFINITY, root);
            }
        }

        let mut candidates: Vec<NodeId> = Vec::new();
        while candidates.len() < limit {
            let Some(entry) = queue.pop() else { break };
            let node = self.store.node(entry.id)?;
            match &node.kind {
                NodeKind::Leaf { .. } => candidates.push(node.id),
                NodeKind::Bucket { children } => candidates.extend(children.iter().copied()),
                NodeKind::Branch { normal, children } => {
                    let margin = self.distance.margin(normal, &query);
                    queue.push(entry.priority.min(margin), children[1]);
                    queue.push(entry.priority.min(-margin), children[0]);
                }
            }
        }

        // Exact re-ranking over the deduplicated candidate set.
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut ranked: Vec<Ranked> = Vec::new();
        for id in candidates {
            if !seen.insert(id) {
                continue;
            }
            let node = self.store.node(id)?;
            let (Some(candidate_key), Some(v)) = (node.key(), node.vector()) else {
                return Err(GannoyError::Integrity(format!(
                    "candidate {} is not a leaf",
                    id
                )));
            };
            ranked.push(Ranked {
                id: candidate_key,
                value: self.distance.distance(&query, v),
            });
        }

        let count = ranked.len().min(n);
        if count == 0 {
            return Ok(Vec::new());
        }
        heap_sort(&mut ranked, Order::Desc, count);

        let len = ranked.len();
        let nns = (0..count).map(|z| ranked[len - 1 - z].id).collect();
        debug!(key, n, search_k, examined = len, "searched neighbors");
        Ok(nns)
    }
}
