//! Host capabilities.
//!
//! The engine never touches the machine directly. Read-only probes live on
//! `HostState`, mutations on `Host`. `local::LocalHost` is the production
//! implementation; `mock::MockHost` is an in-memory double used by tests.

pub mod local;
pub mod lock;
pub mod mock;
pub mod runner;

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{CommandError, HostError};

pub type HostResult<T> = std::result::Result<T, HostError>;

/// What sits at a path, without following a final symlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Missing,
    File,
    Directory,
    Symlink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownership {
    pub owner: String,
    pub group: String,
}

/// Read-only view of a host.
pub trait HostState {
    /// `lstat`-style kind of the entry at `path`.
    fn entry_kind(&self, path: &Path) -> HostResult<EntryKind>;

    /// Permission bits (including setuid/setgid/sticky) of `path`, following symlinks.
    fn path_mode(&self, path: &Path) -> HostResult<u32>;

    /// Owner and group names of `path`, following symlinks.
    fn ownership(&self, path: &Path) -> HostResult<Ownership>;

    /// Target of the symlink at `path`, or `None` when it is not a symlink.
    fn link_target(&self, path: &Path) -> HostResult<Option<PathBuf>>;

    fn package_installed(&self, name: &str) -> HostResult<bool>;

    /// Contents of a regular file, `None` when absent.
    fn read_to_string(&self, path: &Path) -> HostResult<Option<String>>;

    /// Hex SHA-256 of a regular file, `None` when absent.
    fn file_digest(&self, path: &Path) -> HostResult<Option<String>>;

    /// Run a read-only probe command (guards, `update-alternatives --display`).
    fn probe_command(&self, command: &str) -> Result<String, CommandError>;

    fn path_exists(&self, path: &Path) -> HostResult<bool> {
        Ok(self.entry_kind(path)? != EntryKind::Missing)
    }

    /// True when `path` is a directory or a chain of symlinks ending at one.
    fn resolves_to_dir(&self, path: &Path) -> HostResult<bool> {
        let mut current = path.to_path_buf();
        for _ in 0..MAX_LINK_HOPS {
            match self.entry_kind(&current)? {
                EntryKind::Directory => return Ok(true),
                EntryKind::Symlink => match self.link_target(&current)? {
                    Some(target) => current = resolve_link(&current, &target),
                    None => return Ok(false),
                },
                _ => return Ok(false),
            }
        }
        Ok(false)
    }
}

/// A host that can be changed.
pub trait Host: HostState {
    fn install_package(&mut self, name: &str) -> HostResult<()>;

    fn create_dir(&mut self, path: &Path, recursive: bool) -> HostResult<()>;

    /// Change owner and/or group. `None` leaves that half unchanged.
    fn set_owner(&mut self, path: &Path, owner: Option<&str>, group: Option<&str>) -> HostResult<()>;

    fn set_mode(&mut self, path: &Path, mode: u32) -> HostResult<()>;

    /// Remove a real directory and everything below it.
    fn remove_dir_all(&mut self, path: &Path) -> HostResult<()>;

    /// Remove a regular file or a symlink (never its target).
    fn remove_file(&mut self, path: &Path) -> HostResult<()>;

    fn symlink(&mut self, target: &Path, path: &Path) -> HostResult<()>;

    /// Replace the file at `path` with `content` in one step.
    fn write_file(&mut self, path: &Path, content: &[u8]) -> HostResult<()>;

    /// Read-modify-write under an exclusive lock. `edit` receives the current
    /// contents (`None` when absent). Returns whether the file changed.
    fn update_file(&mut self, path: &Path, edit: &dyn Fn(Option<&str>) -> String) -> HostResult<bool>;

    fn run_command(&mut self, command: &str) -> Result<String, CommandError>;
}

const MAX_LINK_HOPS: usize = 16;

/// Absolute form of a symlink target, relative targets being taken from the
/// link's parent directory.
pub fn resolve_link(link: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        return target.to_path_buf();
    }
    match link.parent() {
        Some(parent) => parent.join(target),
        None => target.to_path_buf(),
    }
}

/// Hex SHA-256 of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
