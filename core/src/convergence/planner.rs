//! Step planner: compares one resource against the host and returns the
//! steps needed to converge it.
//!
//! The planner only reads. An empty step list means the resource is up to
//! date. Probe failures that have a safe fallback (package queries, content
//! digests) are logged and treated as "absent", which at worst re-applies an
//! idempotent step.

use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::convergence::alternatives::{self, Decision};
use crate::convergence::limits;
use crate::error::{CommandError, Error, Result};
use crate::host::{digest, EntryKind, HostState};
use crate::template::Renderer;
use crate::types::resource::{Action, Guard, LimitsEntry, Metadata, Resource, Spec};

/// A single host mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    InstallPackage(String),
    CreateDir { path: PathBuf, recursive: bool },
    SetOwner { path: PathBuf, owner: Option<String>, group: Option<String> },
    SetMode { path: PathBuf, mode: u32 },
    RemoveDir(PathBuf),
    /// Unlink a file or symlink.
    RemoveFile(PathBuf),
    Symlink { path: PathBuf, target: PathBuf },
    WriteFile { path: PathBuf, content: Vec<u8> },
    UpsertLimit { file: PathBuf, entry: LimitsEntry },
    RunCommand(String),
    SelectAlternative {
        name: String,
        link: PathBuf,
        path: PathBuf,
        priority: u32,
        previous: Option<PathBuf>,
    },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::InstallPackage(name) => write!(f, "install package {}", name),
            Step::CreateDir { path, .. } => write!(f, "create directory {}", path.display()),
            Step::SetOwner { path, owner, group } => write!(
                f,
                "change ownership of {} to {}:{}",
                path.display(),
                owner.as_deref().unwrap_or(""),
                group.as_deref().unwrap_or("")
            ),
            Step::SetMode { path, mode } => write!(f, "change mode of {} to {:04o}", path.display(), mode),
            Step::RemoveDir(path) => write!(f, "remove directory {}", path.display()),
            Step::RemoveFile(path) => write!(f, "remove {}", path.display()),
            Step::Symlink { path, target } => {
                write!(f, "link {} to {}", path.display(), target.display())
            }
            Step::WriteFile { path, content } => {
                write!(f, "write {} (sha256 {})", path.display(), &digest(content)[..12])
            }
            Step::UpsertLimit { file, entry } => write!(f, "set `{}` in {}", entry, file.display()),
            Step::RunCommand(cmd) => write!(f, "run `{}`", cmd),
            Step::SelectAlternative { name, path, priority, .. } => write!(
                f,
                "select {} for {} (priority {})",
                path.display(),
                name,
                priority
            ),
        }
    }
}

/// Steps needed to converge `resource`. `forced` is set when the resource is
/// being run because of a notification.
pub fn examine<H: HostState + ?Sized>(
    resource: &Resource,
    host: &H,
    renderer: &dyn Renderer,
    forced: bool,
) -> Result<Vec<Step>> {
    let skip_guard = forced && resource.action == Action::Run;
    if let Some(guard) = &resource.guard {
        if !skip_guard && guard_holds(guard, host)? {
            debug!("{} skipped: guard holds", resource.id());
            return Ok(Vec::new());
        }
    }

    match (&resource.spec, resource.action) {
        (Spec::Package, _) => examine_package(&resource.name, host),
        (Spec::Directory { path, meta, recursive }, Action::Create) => {
            examine_directory(path, meta, *recursive, host)
        }
        (Spec::Directory { path, .. }, _) => examine_directory_delete(path, host),
        (Spec::File { path }, _) => examine_file_delete(path, host),
        (Spec::Link { path, target: Some(target) }, Action::Create) => examine_link(path, target, host),
        (Spec::Link { path, .. }, _) => examine_link_delete(path, host),
        (Spec::Template { path, source, meta, variables }, _) => {
            let content = renderer.render(source, variables)?;
            examine_template(path, content, meta, host)
        }
        (Spec::Limits { file, entry }, _) => examine_limits(file, entry, host),
        (Spec::Execute { command }, _) => Ok(vec![Step::RunCommand(command.clone())]),
        (Spec::Alternatives { link, path, priority }, _) => {
            examine_alternatives(&resource.name, link, path, *priority, forced, host)
        }
    }
}

/// Evaluate a `not_if` guard.
pub fn guard_holds<H: HostState + ?Sized>(guard: &Guard, host: &H) -> Result<bool> {
    match guard {
        Guard::Shell { command } => match host.probe_command(command) {
            Ok(_) => Ok(true),
            Err(CommandError::Failed { .. }) => Ok(false),
            Err(e) => Err(Error::probe(format!("guard `{}`", command), e.into())),
        },
        Guard::Symlink { path } => Ok(kind_of(path, host)? == EntryKind::Symlink),
        Guard::LinksTo { path, target } => {
            let current = host
                .link_target(path)
                .map_err(|e| Error::probe(path.display().to_string(), e))?;
            Ok(current.as_deref() == Some(target.as_path()))
        }
    }
}

fn kind_of<H: HostState + ?Sized>(path: &Path, host: &H) -> Result<EntryKind> {
    host.entry_kind(path)
        .map_err(|e| Error::probe(path.display().to_string(), e))
}

fn not_a(path: &Path, what: &str) -> Error {
    Error::config(path.display().to_string(), format!("exists but is not a {}", what))
}

// ---------------------------------------------------------------------------
// Per-kind examination
// ---------------------------------------------------------------------------

fn examine_package<H: HostState + ?Sized>(name: &str, host: &H) -> Result<Vec<Step>> {
    let installed = match host.package_installed(name) {
        Ok(installed) => installed,
        Err(e) => {
            warn!("cannot query package {}: {}; assuming absent", name, e);
            false
        }
    };
    if installed {
        Ok(Vec::new())
    } else {
        Ok(vec![Step::InstallPackage(name.to_string())])
    }
}

/// Ownership/mode steps for an entry that exists (or is about to).
fn metadata_steps<H: HostState + ?Sized>(path: &Path, meta: &Metadata, exists: bool, host: &H) -> Result<Vec<Step>> {
    if meta.is_empty() {
        return Ok(Vec::new());
    }
    let mut steps = Vec::new();
    if meta.owner.is_some() || meta.group.is_some() {
        let current = if exists {
            Some(
                host.ownership(path)
                    .map_err(|e| Error::probe(path.display().to_string(), e))?,
            )
        } else {
            None
        };
        let owner = meta
            .owner
            .clone()
            .filter(|o| current.as_ref().map(|c| &c.owner != o).unwrap_or(true));
        let group = meta
            .group
            .clone()
            .filter(|g| current.as_ref().map(|c| &c.group != g).unwrap_or(true));
        if owner.is_some() || group.is_some() {
            steps.push(Step::SetOwner {
                path: path.to_path_buf(),
                owner,
                group,
            });
        }
    }
    if let Some(mode) = meta.mode {
        let differs = !exists
            || host
                .path_mode(path)
                .map_err(|e| Error::probe(path.display().to_string(), e))?
                != mode;
        if differs {
            steps.push(Step::SetMode {
                path: path.to_path_buf(),
                mode,
            });
        }
    }
    Ok(steps)
}

fn examine_directory<H: HostState + ?Sized>(path: &Path, meta: &Metadata, recursive: bool, host: &H) -> Result<Vec<Step>> {
    match kind_of(path, host)? {
        EntryKind::Missing => {
            let mut steps = vec![Step::CreateDir {
                path: path.to_path_buf(),
                recursive,
            }];
            steps.extend(metadata_steps(path, meta, false, host)?);
            Ok(steps)
        }
        EntryKind::Directory => metadata_steps(path, meta, true, host),
        EntryKind::Symlink => {
            let resolves = host
                .resolves_to_dir(path)
                .map_err(|e| Error::probe(path.display().to_string(), e))?;
            if resolves {
                metadata_steps(path, meta, true, host)
            } else {
                Err(not_a(path, "directory"))
            }
        }
        EntryKind::File => Err(not_a(path, "directory")),
    }
}

fn examine_directory_delete<H: HostState + ?Sized>(path: &Path, host: &H) -> Result<Vec<Step>> {
    match kind_of(path, host)? {
        EntryKind::Missing => Ok(Vec::new()),
        EntryKind::Directory => Ok(vec![Step::RemoveDir(path.to_path_buf())]),
        // Only the link itself goes; whatever it points at is left alone.
        EntryKind::Symlink => Ok(vec![Step::RemoveFile(path.to_path_buf())]),
        EntryKind::File => Err(not_a(path, "directory")),
    }
}

fn examine_file_delete<H: HostState + ?Sized>(path: &Path, host: &H) -> Result<Vec<Step>> {
    match kind_of(path, host)? {
        EntryKind::Missing => Ok(Vec::new()),
        EntryKind::File | EntryKind::Symlink => Ok(vec![Step::RemoveFile(path.to_path_buf())]),
        EntryKind::Directory => Err(not_a(path, "file")),
    }
}

fn examine_link<H: HostState + ?Sized>(path: &Path, target: &Path, host: &H) -> Result<Vec<Step>> {
    let create = Step::Symlink {
        path: path.to_path_buf(),
        target: target.to_path_buf(),
    };
    match kind_of(path, host)? {
        EntryKind::Missing => Ok(vec![create]),
        EntryKind::Symlink => {
            let current = host
                .link_target(path)
                .map_err(|e| Error::probe(path.display().to_string(), e))?;
            if current.as_deref() == Some(target) {
                Ok(Vec::new())
            } else {
                Ok(vec![Step::RemoveFile(path.to_path_buf()), create])
            }
        }
        EntryKind::File => Ok(vec![Step::RemoveFile(path.to_path_buf()), create]),
        EntryKind::Directory => Ok(vec![Step::RemoveDir(path.to_path_buf()), create]),
    }
}

fn examine_link_delete<H: HostState + ?Sized>(path: &Path, host: &H) -> Result<Vec<Step>> {
    match kind_of(path, host)? {
        EntryKind::Symlink => Ok(vec![Step::RemoveFile(path.to_path_buf())]),
        EntryKind::Missing => Ok(Vec::new()),
        _ => {
            debug!("{} is not a symlink; nothing to unlink", path.display());
            Ok(Vec::new())
        }
    }
}

fn examine_template<H: HostState + ?Sized>(path: &Path, content: Vec<u8>, meta: &Metadata, host: &H) -> Result<Vec<Step>> {
    let kind = kind_of(path, host)?;
    if kind == EntryKind::Directory {
        return Err(not_a(path, "file"));
    }
    let current = match host.file_digest(path) {
        Ok(d) => d,
        Err(e) => {
            warn!("cannot read {}: {}; rewriting", path.display(), e);
            None
        }
    };
    let exists = kind != EntryKind::Missing;
    let mut steps = Vec::new();
    if current.as_deref() != Some(digest(&content).as_str()) {
        steps.push(Step::WriteFile {
            path: path.to_path_buf(),
            content,
        });
    }
    steps.extend(metadata_steps(path, meta, exists, host)?);
    Ok(steps)
}

fn examine_limits<H: HostState + ?Sized>(file: &Path, entry: &LimitsEntry, host: &H) -> Result<Vec<Step>> {
    let existing = host
        .read_to_string(file)
        .map_err(|e| Error::probe(file.display().to_string(), e))?;
    if existing.as_deref() == Some(limits::upsert(existing.as_deref(), entry).as_str()) {
        return Ok(Vec::new());
    }
    Ok(vec![Step::UpsertLimit {
        file: file.to_path_buf(),
        entry: entry.clone(),
    }])
}

fn examine_alternatives<H: HostState + ?Sized>(
    name: &str,
    link: &Path,
    path: &Path,
    priority: u32,
    forced: bool,
    host: &H,
) -> Result<Vec<Step>> {
    let status = alternatives::probe(host, name)
        .map_err(|e| Error::probe(format!("alternatives for {}", name), e.into()))?;
    let previous = status.as_ref().and_then(|s| s.current.clone());
    let select = Step::SelectAlternative {
        name: name.to_string(),
        link: link.to_path_buf(),
        path: path.to_path_buf(),
        priority,
        previous,
    };
    if forced {
        return Ok(vec![select]);
    }
    match alternatives::decide(status.as_ref(), path, priority) {
        Decision::Install => Ok(vec![select]),
        Decision::Current => Ok(Vec::new()),
        Decision::Outranked { current, priority: other } => {
            warn!(
                "{} points to {} (priority {}), above {} (priority {}); leaving it",
                name,
                current.display(),
                other,
                path.display(),
                priority
            );
            Ok(Vec::new())
        }
    }
}
