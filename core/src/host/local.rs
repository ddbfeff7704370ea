//! The machine the engine runs on.
//!
//! Every absolute path can be mapped under a root prefix so a whole run can
//! be staged into a scratch directory. Commands (package manager,
//! `update-alternatives`, guards) always run unprefixed through the runner.

use std::ffi::{CStr, CString};
use std::fs;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use log::debug;

use super::lock::{acquire_lock, lock_path_for};
use super::runner::{CommandRunner, ShellRunner};
use super::{digest, EntryKind, Host, HostResult, HostState, Ownership};
use crate::error::{CommandError, HostError};
use crate::template::shell::quote;
use crate::types::config::PackageTool;

const LOCK_TIMEOUT_MS: u64 = 5000;

pub struct LocalHost {
    root: Option<PathBuf>,
    package_tool: PackageTool,
    runner: Box<dyn CommandRunner>,
}

impl LocalHost {
    pub fn new(package_tool: PackageTool) -> Self {
        LocalHost {
            root: None,
            package_tool,
            runner: Box::new(ShellRunner),
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_runner(mut self, runner: Box<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Guess the package tool from what is installed.
    pub fn detect_package_tool() -> PackageTool {
        if Path::new("/usr/bin/dpkg-query").exists() && !Path::new("/usr/bin/rpm").exists() {
            PackageTool::Apt
        } else {
            PackageTool::Yum
        }
    }

    /// Host path for a logical absolute path.
    fn real(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) => match path.strip_prefix("/") {
                Ok(rel) => root.join(rel),
                Err(_) => root.join(path),
            },
            None => path.to_path_buf(),
        }
    }

    /// Logical path for a host path (inverse of `real`).
    fn logical(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) => match path.strip_prefix(root) {
                Ok(rel) => Path::new("/").join(rel),
                Err(_) => path.to_path_buf(),
            },
            None => path.to_path_buf(),
        }
    }

    fn io(&self, path: &Path) -> impl FnOnce(std::io::Error) -> HostError + '_ {
        let path = path.to_path_buf();
        move |e| HostError::io(path, e)
    }

    fn write_atomic(&self, real: &Path, content: &[u8]) -> std::io::Result<()> {
        let name = real
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = real.with_file_name(format!(".{}.hconverge-tmp", name));
        let swapped = write_and_swap(&tmp, real, content);
        if swapped.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        swapped
    }
}

fn write_and_swap(tmp: &Path, real: &Path, content: &[u8]) -> std::io::Result<()> {
    {
        let mut f = fs::File::create(tmp)?;
        f.write_all(content)?;
        f.sync_all()?;
    }
    // Keep the existing permissions across the swap.
    if let Ok(meta) = fs::metadata(real) {
        fs::set_permissions(tmp, meta.permissions())?;
    }
    fs::rename(tmp, real)
}

impl HostState for LocalHost {
    fn entry_kind(&self, path: &Path) -> HostResult<EntryKind> {
        match fs::symlink_metadata(self.real(path)) {
            Ok(meta) => {
                let ft = meta.file_type();
                Ok(if ft.is_symlink() {
                    EntryKind::Symlink
                } else if ft.is_dir() {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(EntryKind::Missing),
            Err(e) => Err(HostError::io(path, e)),
        }
    }

    fn path_mode(&self, path: &Path) -> HostResult<u32> {
        let meta = fs::metadata(self.real(path)).map_err(self.io(path))?;
        Ok(meta.permissions().mode() & 0o7777)
    }

    fn ownership(&self, path: &Path) -> HostResult<Ownership> {
        let meta = fs::metadata(self.real(path)).map_err(self.io(path))?;
        Ok(Ownership {
            owner: user_name(meta.uid()).unwrap_or_else(|| meta.uid().to_string()),
            group: group_name(meta.gid()).unwrap_or_else(|| meta.gid().to_string()),
        })
    }

    fn link_target(&self, path: &Path) -> HostResult<Option<PathBuf>> {
        if self.entry_kind(path)? != EntryKind::Symlink {
            return Ok(None);
        }
        let target = fs::read_link(self.real(path)).map_err(self.io(path))?;
        Ok(Some(self.logical(&target)))
    }

    fn package_installed(&self, name: &str) -> HostResult<bool> {
        let cmd = match self.package_tool {
            PackageTool::Yum => format!("rpm -q {}", quote(name)),
            PackageTool::Apt => format!("dpkg-query -W -f='${{Status}}' {}", quote(name)),
        };
        match self.runner.run(&cmd) {
            Ok(out) => Ok(match self.package_tool {
                PackageTool::Yum => true,
                PackageTool::Apt => out.contains("install ok installed"),
            }),
            Err(CommandError::Failed { .. }) => Ok(false),
            Err(e) => Err(HostError::Command(e)),
        }
    }

    fn read_to_string(&self, path: &Path) -> HostResult<Option<String>> {
        match fs::read_to_string(self.real(path)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HostError::io(path, e)),
        }
    }

    fn file_digest(&self, path: &Path) -> HostResult<Option<String>> {
        match fs::read(self.real(path)) {
            Ok(bytes) => Ok(Some(digest(&bytes))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HostError::io(path, e)),
        }
    }

    fn probe_command(&self, command: &str) -> Result<String, CommandError> {
        self.runner.run(command)
    }
}

impl Host for LocalHost {
    fn install_package(&mut self, name: &str) -> HostResult<()> {
        let cmd = match self.package_tool {
            PackageTool::Yum => format!("yum install -y {}", quote(name)),
            PackageTool::Apt => format!(
                "DEBIAN_FRONTEND=noninteractive apt-get install -y {}",
                quote(name)
            ),
        };
        self.runner.run(&cmd)?;
        Ok(())
    }

    fn create_dir(&mut self, path: &Path, recursive: bool) -> HostResult<()> {
        let real = self.real(path);
        debug!("mkdir {}", real.display());
        if recursive {
            fs::create_dir_all(&real)
        } else {
            fs::create_dir(&real)
        }
        .map_err(self.io(path))
    }

    fn set_owner(&mut self, path: &Path, owner: Option<&str>, group: Option<&str>) -> HostResult<()> {
        let uid = match owner {
            Some(name) => Some(user_id(name).ok_or_else(|| {
                HostError::Unsupported(format!("unknown user `{}`", name))
            })?),
            None => None,
        };
        let gid = match group {
            Some(name) => Some(group_id(name).ok_or_else(|| {
                HostError::Unsupported(format!("unknown group `{}`", name))
            })?),
            None => None,
        };
        std::os::unix::fs::chown(self.real(path), uid, gid).map_err(self.io(path))
    }

    fn set_mode(&mut self, path: &Path, mode: u32) -> HostResult<()> {
        fs::set_permissions(self.real(path), fs::Permissions::from_mode(mode)).map_err(self.io(path))
    }

    fn remove_dir_all(&mut self, path: &Path) -> HostResult<()> {
        fs::remove_dir_all(self.real(path)).map_err(self.io(path))
    }

    fn remove_file(&mut self, path: &Path) -> HostResult<()> {
        fs::remove_file(self.real(path)).map_err(self.io(path))
    }

    fn symlink(&mut self, target: &Path, path: &Path) -> HostResult<()> {
        let target = if target.is_absolute() {
            self.real(target)
        } else {
            target.to_path_buf()
        };
        std::os::unix::fs::symlink(target, self.real(path)).map_err(self.io(path))
    }

    fn write_file(&mut self, path: &Path, content: &[u8]) -> HostResult<()> {
        self.write_atomic(&self.real(path), content).map_err(self.io(path))
    }

    fn update_file(&mut self, path: &Path, edit: &dyn Fn(Option<&str>) -> String) -> HostResult<bool> {
        let real = self.real(path);
        let _guard = acquire_lock(&lock_path_for(&real), LOCK_TIMEOUT_MS)?;
        let current = self.read_to_string(path)?;
        let updated = edit(current.as_deref());
        if current.as_deref() == Some(updated.as_str()) {
            return Ok(false);
        }
        self.write_atomic(&real, updated.as_bytes()).map_err(self.io(path))?;
        Ok(true)
    }

    fn run_command(&mut self, command: &str) -> Result<String, CommandError> {
        self.runner.run(command)
    }
}

// ---------------------------------------------------------------------------
// passwd / group lookups
// ---------------------------------------------------------------------------

fn user_name(uid: u32) -> Option<String> {
    unsafe {
        let pw = libc::getpwuid(uid);
        if pw.is_null() {
            return None;
        }
        Some(CStr::from_ptr((*pw).pw_name).to_string_lossy().into_owned())
    }
}

fn group_name(gid: u32) -> Option<String> {
    unsafe {
        let gr = libc::getgrgid(gid);
        if gr.is_null() {
            return None;
        }
        Some(CStr::from_ptr((*gr).gr_name).to_string_lossy().into_owned())
    }
}

fn user_id(name: &str) -> Option<u32> {
    if let Ok(uid) = name.parse::<u32>() {
        return Some(uid);
    }
    let c = CString::new(name).ok()?;
    unsafe {
        let pw = libc::getpwnam(c.as_ptr());
        if pw.is_null() {
            None
        } else {
            Some((*pw).pw_uid)
        }
    }
}

fn group_id(name: &str) -> Option<u32> {
    if let Ok(gid) = name.parse::<u32>() {
        return Some(gid);
    }
    let c = CString::new(name).ok()?;
    unsafe {
        let gr = libc::getgrnam(c.as_ptr());
        if gr.is_null() {
            None
        } else {
            Some((*gr).gr_gid)
        }
    }
}
