//! File-backed node table.
//!
//! The store is an arena of fixed-size node records addressed by dense id,
//! persisted in a single growable file:
//!
//! ```text
//! ┌───────────────────────────────────────┐
//! │ Header (32B):                         │
//! │   magic "GNNY" + format version       │
//! │   geometry echo (tree, dim, K)        │
//! ├───────────────────────────────────────┤
//! │ Record 0                              │
//! │ Record 1                              │
//! │ ...                                   │
//! └───────────────────────────────────────┘
//! ```
//!
//! The geometry echo is validated against the meta file on open, so a tree
//! file can never be silently read with the wrong record size.
//!
//! A key→id map and a free list of released record slots are rebuilt by
//! scanning the file on open and then maintained in memory. They are *not*
//! refreshed when another process mutates the file; cross-process access is
//! coordinated only by the advisory file lock held around whole operations
//! (see [`crate::lock`]).

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::error::{GannoyError, Result};
use crate::node::{Geometry, Node, NodeId};

const MAGIC: [u8; 4] = *b"GNNY";
const FORMAT_VERSION: u32 = 1;
const HEADER_SIZE: u64 = 32;

/// Persistent table of node records with a secondary key→id lookup.
#[derive(Debug)]
pub struct NodeStore {
    file: File,
    geo: Geometry,
    /// Allocated record slots (live + freed).
    slots: usize,
    key_map: HashMap<i64, NodeId>,
    free: Vec<NodeId>,
}

impl NodeStore {
    /// Open or create the node table at `path` with the given geometry.
    ///
    /// A new file gets a header; an existing file has its header validated
    /// and its records scanned to rebuild the key map and free list.
    pub fn open(path: &Path, geo: Geometry) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let file_len = file.metadata()?.len();
        let mut store = Self {
            file,
            geo,
            slots: 0,
            key_map: HashMap::new(),
            free: Vec::new(),
        };

        if file_len == 0 {
            store.write_header()?;
        } else {
            store.validate_header()?;
            store.scan(file_len)?;
        }
        Ok(store)
    }

    fn write_header(&mut self) -> Result<()> {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[8..12].copy_from_slice(&(self.geo.tree as u32).to_le_bytes());
        buf[12..16].copy_from_slice(&(self.geo.dim as u32).to_le_bytes());
        buf[16..20].copy_from_slice(&(self.geo.k as u32).to_le_bytes());
        self.file.write_all_at(&buf, 0)?;
        Ok(())
    }

    fn validate_header(&self) -> Result<()> {
        let mut buf = [0u8; HEADER_SIZE as usize];
        self.file.read_exact_at(&mut buf, 0)?;

        if buf[0..4] != MAGIC {
            return Err(GannoyError::Integrity("bad magic in tree file".into()));
        }
        let version = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(GannoyError::Integrity(format!(
                "tree file format version {} is not supported",
                version
            )));
        }
        let tree = u32::from_le_bytes(buf[8..12].try_into().unwrap()) as usize;
        let dim = u32::from_le_bytes(buf[12..16].try_into().unwrap()) as usize;
        let k = u32::from_le_bytes(buf[16..20].try_into().unwrap()) as usize;
        let echo = Geometry { tree, dim, k };
        if echo != self.geo {
            return Err(GannoyError::Integrity(format!(
                "tree file geometry {:?} does not match meta geometry {:?}",
                echo, self.geo
            )));
        }
        Ok(())
    }

    /// Rebuild the key map and free list from the record section.
    fn scan(&mut self, file_len: u64) -> Result<()> {
        let record_size = self.geo.record_size() as u64;
        let body = file_len.saturating_sub(HEADER_SIZE);
        if body % record_size != 0 {
            return Err(GannoyError::Integrity(
                "tree file has a truncated record".into(),
            ));
        }
        self.slots = (body / record_size) as usize;

        let mut buf = vec![0u8; self.geo.record_size()];
        for id in 0..self.slots as NodeId {
            self.file.read_exact_at(&mut buf, self.offset(id))?;
            match Node::decode(id, &self.geo, &buf)? {
                None => self.free.push(id),
                Some(node) => {
                    if let Some(key) = node.key() {
                        self.key_map.insert(key, id);
                    }
                }
            }
        }
        Ok(())
    }

    fn offset(&self, id: NodeId) -> u64 {
        HEADER_SIZE + id as u64 * self.geo.record_size() as u64
    }

    /// Backing file, for lock acquisition.
    #[must_use]
    pub fn file(&self) -> &File {
        &self.file
    }

    /// Number of stored items (live leaves).
    #[must_use]
    pub fn len(&self) -> usize {
        self.key_map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.key_map.is_empty()
    }

    /// Whether `key` currently maps to a live leaf.
    #[must_use]
    pub fn contains_key(&self, key: i64) -> bool {
        self.key_map.contains_key(&key)
    }

    /// Persist a new node, assigning it an id (reusing a freed slot if any).
    pub fn allocate(&mut self, node: &mut Node) -> Result<NodeId> {
        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                let id = self.slots as NodeId;
                self.slots += 1;
                id
            }
        };
        node.id = id;
        let buf = node.encode(&self.geo)?;
        self.file.write_all_at(&buf, self.offset(id))?;
        if let Some(key) = node.key() {
            self.key_map.insert(key, id);
        }
        Ok(id)
    }

    /// Load the node at `id`.
    pub fn node(&self, id: NodeId) -> Result<Node> {
        if id < 0 || id >= self.slots as NodeId {
            return Err(GannoyError::NotFound(format!("node id {}", id)));
        }
        let mut buf = vec![0u8; self.geo.record_size()];
        self.file.read_exact_at(&mut buf, self.offset(id))?;
        Node::decode(id, &self.geo, &buf)?
            .ok_or_else(|| GannoyError::NotFound(format!("node id {} is free", id)))
    }

    /// Load the leaf holding `key`.
    pub fn node_by_key(&self, key: i64) -> Result<Node> {
        let id = *self
            .key_map
            .get(&key)
            .ok_or_else(|| GannoyError::NotFound(format!("key {}", key)))?;
        self.node(id)
    }

    /// Persist mutated fields of an existing node.
    pub fn update(&mut self, node: &Node) -> Result<()> {
        if node.id < 0 || node.id >= self.slots as NodeId {
            return Err(GannoyError::NotFound(format!("node id {}", node.id)));
        }
        let buf = node.encode(&self.geo)?;
        self.file.write_all_at(&buf, self.offset(node.id))?;
        Ok(())
    }

    /// Release a record slot for reuse, dropping its key mapping if any.
    pub fn release(&mut self, id: NodeId) -> Result<()> {
        let node = self.node(id)?;
        if let Some(key) = node.key() {
            self.key_map.remove(&key);
        }
        let zeroes = vec![0u8; self.geo.record_size()];
        self.file.write_all_at(&zeroes, self.offset(id))?;
        self.free.push(id);
        Ok(())
    }
}
