//! Exclusive advisory locks for read-modify-write of shared files.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::HostError;

/// Held `flock` on a sidecar lock file. Released on drop; the file itself
/// stays so every process locks the same inode.
pub struct LockGuard {
    file: File,
}


impl Drop for LockGuard {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}


/// Sidecar lock path for `target`: `.<name>.lock` in the same directory.
pub fn lock_path_for(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let lock_name = format!(".{}.lock", name);
    match target.parent() {
        Some(parent) => parent.join(lock_name),
        None => PathBuf::from(lock_name),
    }
}


/// Acquire an exclusive lock on `lock_path`, polling until `timeout_ms`.
pub fn acquire_lock(lock_path: &Path, timeout_ms: u64) -> Result<LockGuard, HostError> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(lock_path)
        .map_err(|e| HostError::io(lock_path, e))?;

    let fd = file.as_raw_fd();
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);

    loop {
        let ret = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if ret == 0 {
            return Ok(LockGuard { file });
        }

        if Instant::now() >= deadline {
            return Err(HostError::io(
                lock_path,
                std::io::Error::new(
                    std::io::ErrorKind::WouldBlock,
                    format!("timed out acquiring lock after {}ms", timeout_ms),
                ),
            ));
        }

        std::thread::sleep(Duration::from_millis(10));
    }
}
