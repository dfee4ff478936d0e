//! gannoy: incremental approximate nearest neighbor search on disk.
//!
//! A forest of randomized binary partition trees over fixed-dimension `f32`
//! vectors, persisted in a single node-table file and coordinated across
//! processes by advisory file locks. Unlike batch-built ANN libraries, items
//! can be inserted, updated and removed *online*: buckets split into
//! branches as they fill and collapse back as they drain, so the forest
//! never needs a rebuild.
//!
//! # How it searches
//!
//! Each tree recursively halves the space with random hyperplanes estimated
//! by two-means over bucket members. A query descends all trees at once
//! through a shared max-priority queue (most promising node first, far sides
//! penalized but explorable), collects candidate leaves, then re-ranks the
//! deduplicated candidates by exact distance and keeps the nearest `n`.
//! Results are approximate; an exhaustive search (`search_k < 0`) degrades
//! gracefully to exact.
//!
//! # Usage
//!
//! ```no_run
//! use gannoy::{create_meta, Angular, GannoyIndex, StdRandom};
//!
//! # fn main() -> gannoy::Result<()> {
//! let dir = std::path::Path::new("/tmp/idx");
//! let meta = create_meta(dir, "vectors", 2, 3, 10)?;
//!
//! let mut index = GannoyIndex::open(&meta, Angular, StdRandom::new())?;
//! index.add_item(1, &[1.0, 0.0, 0.0])?;
//! index.add_item(2, &[0.9, 0.1, 0.0])?;
//!
//! let nns = index.get_nns_by_key(1, 2, -1)?;
//! assert_eq!(nns[0], 1);
//! # Ok(())
//! # }
//! ```
//!
//! This crate targets Unix: cross-process coordination relies on `flock(2)`
//! advisory semantics and positioned file I/O.

pub mod distance;
pub mod error;
pub mod index;
pub mod lock;
pub mod math;
pub mod meta;
pub mod node;
pub mod queue;
pub mod random;
pub mod store;

pub use distance::{Angular, Distance};
pub use error::{GannoyError, Result};
pub use index::GannoyIndex;
pub use lock::{Flock, Locker, NopLocker};
pub use meta::{create_meta, Meta};
pub use node::{Node, NodeId, NodeKind};
pub use random::{LoopRandom, RandomSource, StdRandom};
pub use store::NodeStore;
