//! `update-alternatives` handling.
//!
//! The current selection is read from `--display` output, which on both
//! Debian and RHEL families carries a `link currently points to <path>` line
//! and one `<path> - priority <n>` line per registered candidate.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::CommandError;
use crate::host::{Host, HostState};

const TOOL: &str = "update-alternatives";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlternativeStatus {
    pub current: Option<PathBuf>,
    pub candidates: BTreeMap<PathBuf, u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Register the candidate and select it.
    Install,
    /// Already registered with this priority and selected.
    Current,
    /// Another candidate with a higher priority is selected; leave it.
    Outranked { current: PathBuf, priority: u32 },
}

pub fn display_command(name: &str) -> String {
    format!("{} --display {}", TOOL, name)
}

pub fn install_command(name: &str, link: &Path, path: &Path, priority: u32) -> String {
    format!(
        "{} --install {} {} {} {}",
        TOOL,
        link.display(),
        name,
        path.display(),
        priority
    )
}

pub fn set_command(name: &str, path: &Path) -> String {
    format!("{} --set {} {}", TOOL, name, path.display())
}

pub fn parse_display(output: &str) -> AlternativeStatus {
    let mut status = AlternativeStatus::default();
    for raw in output.lines() {
        let line = raw.trim();
        if let Some(rest) = line.strip_prefix("link currently points to ") {
            status.current = Some(PathBuf::from(rest.trim()));
            continue;
        }
        if let Some((path, priority)) = line.split_once(" - priority ") {
            if let Ok(p) = priority.trim().parse::<u32>() {
                status.candidates.insert(PathBuf::from(path.trim()), p);
            }
        }
    }
    status
}

/// What to do about candidate `path` at `priority`, given the current status
/// (`None` when the name is not registered at all).
pub fn decide(status: Option<&AlternativeStatus>, path: &Path, priority: u32) -> Decision {
    let Some(status) = status else {
        return Decision::Install;
    };
    let registered = status.candidates.get(path).copied();
    match &status.current {
        Some(current) if current == path => {
            if registered == Some(priority) {
                Decision::Current
            } else {
                Decision::Install
            }
        }
        Some(current) => match status.candidates.get(current) {
            Some(&other) if other > priority => Decision::Outranked {
                current: current.clone(),
                priority: other,
            },
            _ => Decision::Install,
        },
        None => Decision::Install,
    }
}

/// Read the status of `name`. A non-zero exit means it is not registered.
pub fn probe<H: HostState + ?Sized>(host: &H, name: &str) -> Result<Option<AlternativeStatus>, CommandError> {
    match host.probe_command(&display_command(name)) {
        Ok(out) => Ok(Some(parse_display(&out))),
        Err(CommandError::Failed { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Register and select `path`. When the selection step fails, the previous
/// selection is restored before the error is returned.
pub fn apply(
    host: &mut dyn Host,
    name: &str,
    link: &Path,
    path: &Path,
    priority: u32,
    previous: Option<&Path>,
) -> Result<(), String> {
    if !host.path_exists(path).map_err(|e| e.to_string())? {
        return Err(format!("alternative target {} does not exist", path.display()));
    }

    let out = host
        .run_command(&install_command(name, link, path, priority))
        .map_err(|e| e.to_string())?;
    for line in out.lines().filter(|l| l.contains("warning")) {
        warn!("{}", line.trim());
    }

    if let Err(e) = host.run_command(&set_command(name, path)) {
        if let Some(prev) = previous.filter(|p| *p != path) {
            warn!("restoring {} to {}", name, prev.display());
            if let Err(restore) = host.run_command(&set_command(name, prev)) {
                warn!("could not restore {}: {}", name, restore);
            }
        }
        return Err(e.to_string());
    }
    info!("{} now points to {}", name, path.display());
    Ok(())
}
