//! Advisory file locking.
//!
//! This is the only enforced concurrency boundary: mutations hold an
//! exclusive lock on the tree file for their full duration, searches hold a
//! shared lock. The locks are advisory, so they constrain only cooperating
//! processes, and blocking acquisition has no timeout.
//!
//! The trait keeps the byte-range signature of the contract; the production
//! implementation locks the whole file regardless of the requested range,
//! which is what every caller in this crate asks for anyway.

use std::fs::File;
use std::io;

use fs2::FileExt;

/// Byte-range advisory lock over an open file.
pub trait Locker {
    /// Acquire a shared (read) lock, blocking until granted.
    fn read_lock(&self, file: &File, start: u64, len: u64) -> io::Result<()>;

    /// Acquire an exclusive (write) lock, blocking until granted.
    fn write_lock(&self, file: &File, start: u64, len: u64) -> io::Result<()>;

    /// Release a previously acquired lock.
    fn unlock(&self, file: &File, start: u64, len: u64) -> io::Result<()>;
}

/// Whole-file advisory locking via `flock(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Flock;

impl Locker for Flock {
    fn read_lock(&self, file: &File, _start: u64, _len: u64) -> io::Result<()> {
        file.lock_shared()
    }

    fn write_lock(&self, file: &File, _start: u64, _len: u64) -> io::Result<()> {
        file.lock_exclusive()
    }

    fn unlock(&self, file: &File, _start: u64, _len: u64) -> io::Result<()> {
        FileExt::unlock(file)
    }
}

/// No-op locker for single-process tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopLocker;

impl Locker for NopLocker {
    fn read_lock(&self, _file: &File, _start: u64, _len: u64) -> io::Result<()> {
        Ok(())
    }

    fn write_lock(&self, _file: &File, _start: u64, _len: u64) -> io::Result<()> {
        Ok(())
    }

    fn unlock(&self, _file: &File, _start: u64, _len: u64) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_lock_then_unlock() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("l.tree");
        let file = File::create(&path).unwrap();

        let locker = Flock;
        locker.write_lock(&file, 0, 0).unwrap();
        locker.unlock(&file, 0, 0).unwrap();
    }

    #[test]
    fn shared_locks_coexist() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("l.tree");
        std::fs::write(&path, b"").unwrap();

        let a = File::open(&path).unwrap();
        let b = File::open(&path).unwrap();

        let locker = Flock;
        locker.read_lock(&a, 0, 0).unwrap();
        locker.read_lock(&b, 0, 0).unwrap();
        locker.unlock(&a, 0, 0).unwrap();
        locker.unlock(&b, 0, 0).unwrap();
    }

    #[test]
    fn exclusive_lock_blocks_try_acquire() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("l.tree");
        std::fs::write(&path, b"").unwrap();

        let a = File::open(&path).unwrap();
        let b = File::open(&path).unwrap();

        let locker = Flock;
        locker.write_lock(&a, 0, 0).unwrap();
        assert!(b.try_lock_exclusive().is_err());
        locker.unlock(&a, 0, 0).unwrap();
    }
}
