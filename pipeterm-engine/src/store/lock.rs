//! Exclusive ownership of a storage directory
//!
//! Only one process may run an engine on a storage directory at a time,
//! since every save replaces the whole snapshot. Readers that never save
//! don't need the lock.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::StoreError;

/// Name of the lock file inside the storage directory
pub const LOCK_FILE_NAME: &str = "pipeterm.lock";

/// Advisory lock on a storage directory, released on drop
///
/// The lock file itself is left in place; removing it would let a second
/// process lock a fresh inode while the first still holds the old one.
#[derive(Debug)]
pub struct StorageLock {
    file: File,
    path: PathBuf,
}

impl StorageLock {
    /// Takes the lock without waiting
    ///
    /// Fails with [`StoreError::Locked`] if another holder exists. The
    /// holder's pid is written into the lock file for that message.
    pub fn acquire(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

        let path = dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;

        if !try_lock(&file).map_err(|e| StoreError::io(&path, e))? {
            let holder = fs::read_to_string(&path)
                .ok()
                .and_then(|pid| pid.trim().parse::<u32>().ok());
            return Err(StoreError::Locked { path, holder });
        }

        let mut lock = Self { file, path };
        lock.record_pid()?;
        debug!("Locked storage {}", lock.path.display());
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record_pid(&mut self) -> Result<(), StoreError> {
        self.file
            .set_len(0)
            .and_then(|_| self.file.write_all(std::process::id().to_string().as_bytes()))
            .map_err(|e| StoreError::io(&self.path, e))
    }
}

impl Drop for StorageLock {
    fn drop(&mut self) {
        unlock(&self.file);
        debug!("Released storage lock {}", self.path.display());
    }
}

#[cfg(unix)]
fn try_lock(file: &File) -> std::io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if ret == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    if err.kind() == std::io::ErrorKind::WouldBlock {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(unix)]
fn unlock(file: &File) {
    use std::os::unix::io::AsRawFd;

    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
}

// No advisory locking off unix; a single engine per directory is assumed.
#[cfg(not(unix))]
fn try_lock(_file: &File) -> std::io::Result<bool> {
    Ok(true)
}

#[cfg(not(unix))]
fn unlock(_file: &File) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_second_holder_is_refused() {
        let dir = tempfile::tempdir().unwrap();

        let first = StorageLock::acquire(dir.path()).unwrap();
        let err = StorageLock::acquire(dir.path()).unwrap_err();
        match err {
            StoreError::Locked { path, holder } => {
                assert_eq!(path, first.path());
                assert_eq!(holder, Some(std::process::id()));
            }
            other => panic!("expected Locked, got {}", other),
        }

        drop(first);
        assert!(StorageLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");

        let lock = StorageLock::acquire(&nested).unwrap();
        assert!(lock.path().exists());
    }
}
