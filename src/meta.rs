//! Index metadata file.
//!
//! `<name>.meta` is a small JSON document holding the fixed geometry (tree
//! count, dimensionality, bucket capacity) plus the current root node id of
//! each tree (`-1` while a tree is empty). Roots move as buckets split and
//! collapse, so the document is rewritten atomically (temp file + rename)
//! under the same write lock that guards the structural mutation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GannoyError, Result};
use crate::node::{Geometry, NodeId, NO_NODE};

/// Extension of the metadata file.
pub const META_EXT: &str = "meta";

/// Extension of the node-store file.
pub const TREE_EXT: &str = "tree";

/// On-disk metadata document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Number of independent trees.
    pub tree: usize,
    /// Vector dimensionality.
    pub dim: usize,
    /// Bucket capacity `K`.
    pub k: usize,
    /// Root node id per tree; `-1` marks an empty tree.
    pub roots: Vec<NodeId>,
}

impl Meta {
    /// Load the metadata document, failing `NotFound` if the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GannoyError::NotFound(format!(
                "meta file {}",
                path.display()
            )));
        }
        let data = std::fs::read(path)?;
        let meta: Meta = serde_json::from_slice(&data)?;
        if meta.roots.len() != meta.tree {
            return Err(GannoyError::Integrity(format!(
                "meta file {} has {} root slots for {} trees",
                path.display(),
                meta.roots.len(),
                meta.tree
            )));
        }
        Ok(meta)
    }

    /// Atomically rewrite the metadata document.
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("meta.tmp");
        std::fs::write(&tmp, &data)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Fixed geometry of this index.
    #[must_use]
    pub fn geometry(&self) -> Geometry {
        Geometry {
            tree: self.tree,
            dim: self.dim,
            k: self.k,
        }
    }

    /// Path of the node-store file living next to the meta file.
    #[must_use]
    pub fn tree_path(meta_path: &Path) -> PathBuf {
        meta_path.with_extension(TREE_EXT)
    }
}

/// Create `<dir>/<name>.meta` describing a fresh index.
///
/// The companion `.tree` file is created lazily on first open.
pub fn create_meta(dir: &Path, name: &str, tree: usize, dim: usize, k: usize) -> Result<PathBuf> {
    if tree == 0 {
        return Err(GannoyError::InvalidArgument(
            "tree count must be at least 1".into(),
        ));
    }
    if dim == 0 {
        return Err(GannoyError::InvalidArgument(
            "dimension must be at least 1".into(),
        ));
    }
    if k < 2 {
        return Err(GannoyError::InvalidArgument(
            "bucket capacity K must be at least 2".into(),
        ));
    }

    let meta = Meta {
        tree,
        dim,
        k,
        roots: vec![NO_NODE; tree],
    };
    let path = dir.join(name).with_extension(META_EXT);
    meta.save(&path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_and_load() {
        let tmp = tempdir().unwrap();
        let path = create_meta(tmp.path(), "idx", 2, 3, 4).unwrap();

        let meta = Meta::load(&path).unwrap();
        assert_eq!(meta.tree, 2);
        assert_eq!(meta.dim, 3);
        assert_eq!(meta.k, 4);
        assert_eq!(meta.roots, vec![NO_NODE, NO_NODE]);
    }

    #[test]
    fn load_missing_meta_is_not_found() {
        let tmp = tempdir().unwrap();
        let missing = tmp.path().join("nope.meta");
        assert!(matches!(
            Meta::load(&missing),
            Err(GannoyError::NotFound(_))
        ));
    }

    #[test]
    fn save_round_trips_roots() {
        let tmp = tempdir().unwrap();
        let path = create_meta(tmp.path(), "idx", 2, 3, 4).unwrap();

        let mut meta = Meta::load(&path).unwrap();
        meta.roots = vec![7, 9];
        meta.save(&path).unwrap();

        assert_eq!(Meta::load(&path).unwrap().roots, vec![7, 9]);
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        let tmp = tempdir().unwrap();
        assert!(create_meta(tmp.path(), "a", 0, 3, 4).is_err());
        assert!(create_meta(tmp.path(), "b", 2, 0, 4).is_err());
        assert!(create_meta(tmp.path(), "c", 2, 3, 1).is_err());
    }

    #[test]
    fn tree_path_is_sibling() {
        let p = PathBuf::from("/data/idx.meta");
        assert_eq!(Meta::tree_path(&p), PathBuf::from("/data/idx.tree"));
    }
}
