//! Per-mapper advisory lock serializing lifecycle transitions on one host.
//!
//! Two concurrent invocations against the same mapper name would otherwise
//! race between the precondition probe and the first mutating step; the
//! encryption engine refusing a duplicate mapping is the only other backstop.

use crate::error::{SecsError, SecsResult};
use std::fs::{self, File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Exclusive advisory lock held for the duration of one transition.
/// Released when dropped; the lock file itself is left in place.
#[derive(Debug)]
pub struct TransitionLock {
    _file: File,
    path: PathBuf,
}

impl TransitionLock {
    /// Acquire the lock for `mapper` under `dir`, failing fast on contention
    /// rather than queueing behind a stuck transition.
    pub fn acquire(dir: &Path, mapper: &str) -> SecsResult<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{mapper}.lock"));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                return Err(SecsError::Busy(mapper.to_string()));
            }
            return Err(SecsError::Io(err));
        }

        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_creates_lock_file() {
        let tmp = tempdir().unwrap();
        let lock = TransitionLock::acquire(tmp.path(), "vault").unwrap();
        assert_eq!(lock.path(), tmp.path().join("vault.lock"));
        assert!(lock.path().exists());
    }

    #[test]
    fn second_acquire_fails_fast() {
        let tmp = tempdir().unwrap();
        let _held = TransitionLock::acquire(tmp.path(), "vault").unwrap();
        let err = TransitionLock::acquire(tmp.path(), "vault").unwrap_err();
        assert!(matches!(err, SecsError::Busy(name) if name == "vault"));
    }

    #[test]
    fn released_on_drop() {
        let tmp = tempdir().unwrap();
        {
            let _held = TransitionLock::acquire(tmp.path(), "vault").unwrap();
        }
        assert!(TransitionLock::acquire(tmp.path(), "vault").is_ok());
    }

    #[test]
    fn distinct_mappers_do_not_contend() {
        let tmp = tempdir().unwrap();
        let _a = TransitionLock::acquire(tmp.path(), "vault").unwrap();
        let _b = TransitionLock::acquire(tmp.path(), "other").unwrap();
    }
}
