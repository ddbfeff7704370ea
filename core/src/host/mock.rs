//! In-memory host for tests.
//!
//! Holds a flat map of paths to entries (files, directories, symlinks) with
//! mode and ownership, a set of installed packages, and enough of
//! `update-alternatives` (`--display`, `--install`, `--set`) to exercise the
//! alternatives resource. Every mutation is appended to a log so tests can
//! assert exactly what a run touched.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};

use super::{digest, resolve_link, EntryKind, Host, HostResult, HostState, Ownership};
use crate::error::{CommandError, HostError};

const ALTERNATIVES_DIR: &str = "/etc/alternatives";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    File(Vec<u8>),
    Directory,
    Symlink(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub node: Node,
    pub mode: u32,
    pub owner: String,
    pub group: String,
}

impl Entry {
    fn new(node: Node) -> Self {
        let mode = match node {
            Node::File(_) => 0o644,
            Node::Directory => 0o755,
            Node::Symlink(_) => 0o777,
        };
        Entry {
            node,
            mode,
            owner: "root".into(),
            group: "root".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct AlternativeGroup {
    link: PathBuf,
    manual: bool,
    selected: Option<PathBuf>,
    candidates: BTreeMap<PathBuf, u32>,
}

pub struct MockHost {
    entries: BTreeMap<PathBuf, Entry>,
    packages: BTreeSet<String>,
    unavailable_packages: BTreeSet<String>,
    alternatives: BTreeMap<String, AlternativeGroup>,
    denied: HashMap<PathBuf, String>,
    unreadable: HashMap<PathBuf, String>,
    broken_package_queries: HashMap<String, String>,
    responses: HashMap<String, Result<String, String>>,
    commands: RefCell<Vec<String>>,
    mutations: Vec<String>,
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHost {
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(PathBuf::from("/"), Entry::new(Node::Directory));
        MockHost {
            entries,
            packages: BTreeSet::new(),
            unavailable_packages: BTreeSet::new(),
            alternatives: BTreeMap::new(),
            denied: HashMap::new(),
            unreadable: HashMap::new(),
            broken_package_queries: HashMap::new(),
            responses: HashMap::new(),
            commands: RefCell::new(Vec::new()),
            mutations: Vec::new(),
        }
    }

    // -- seeding (not logged) ------------------------------------------------

    fn seed_parents(&mut self, path: &Path) {
        let mut missing = Vec::new();
        let mut cur = path.parent();
        while let Some(p) = cur {
            if self.entries.contains_key(p) {
                break;
            }
            missing.push(p.to_path_buf());
            cur = p.parent();
        }
        for p in missing.into_iter().rev() {
            self.entries.insert(p, Entry::new(Node::Directory));
        }
    }

    pub fn seed_dir(&mut self, path: impl AsRef<Path>, owner: &str, group: &str, mode: u32) {
        let path = path.as_ref();
        self.seed_parents(path);
        self.entries.insert(
            path.to_path_buf(),
            Entry {
                node: Node::Directory,
                mode,
                owner: owner.into(),
                group: group.into(),
            },
        );
    }

    pub fn seed_file(&mut self, path: impl AsRef<Path>, content: &str) {
        let path = path.as_ref();
        self.seed_parents(path);
        self.entries
            .insert(path.to_path_buf(), Entry::new(Node::File(content.as_bytes().to_vec())));
    }

    pub fn seed_symlink(&mut self, path: impl AsRef<Path>, target: impl AsRef<Path>) {
        let path = path.as_ref();
        self.seed_parents(path);
        self.entries.insert(
            path.to_path_buf(),
            Entry::new(Node::Symlink(target.as_ref().to_path_buf())),
        );
    }

    pub fn seed_package(&mut self, name: &str) {
        self.packages.insert(name.to_string());
    }

    /// Register an alternative the way a distribution package would.
    pub fn seed_alternative(&mut self, name: &str, link: impl AsRef<Path>, path: impl AsRef<Path>, priority: u32) {
        self.register_alternative(name, link.as_ref(), path.as_ref(), priority);
        self.mutations.clear();
    }

    /// Installing `name` will fail as if the repository lacked it.
    pub fn make_package_unavailable(&mut self, name: &str) {
        self.unavailable_packages.insert(name.to_string());
    }

    /// Every mutation of `path` fails with permission denied.
    pub fn deny(&mut self, path: impl AsRef<Path>, reason: &str) {
        self.denied.insert(path.as_ref().to_path_buf(), reason.to_string());
    }

    /// Reading the content of `path` fails. Writes still succeed.
    pub fn make_unreadable(&mut self, path: impl AsRef<Path>, reason: &str) {
        self.unreadable.insert(path.as_ref().to_path_buf(), reason.to_string());
    }

    /// Asking whether `name` is installed fails, as with a locked package
    /// database. Installing it still works.
    pub fn break_package_query(&mut self, name: &str, reason: &str) {
        self.broken_package_queries.insert(name.to_string(), reason.to_string());
    }

    /// Script the result of a command. `Err(stderr)` exits 1.
    pub fn respond(&mut self, command: &str, response: Result<String, String>) {
        self.responses.insert(command.to_string(), response);
    }

    // -- inspection ----------------------------------------------------------

    pub fn entry(&self, path: impl AsRef<Path>) -> Option<&Entry> {
        self.entries.get(path.as_ref())
    }

    pub fn entries(&self) -> &BTreeMap<PathBuf, Entry> {
        &self.entries
    }

    pub fn file_text(&self, path: impl AsRef<Path>) -> Option<String> {
        match self.entries.get(path.as_ref()).map(|e| &e.node) {
            Some(Node::File(bytes)) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    pub fn installed_packages(&self) -> Vec<String> {
        self.packages.iter().cloned().collect()
    }

    pub fn selected_alternative(&self, name: &str) -> Option<PathBuf> {
        self.alternatives.get(name).and_then(|g| g.selected.clone())
    }

    /// Every command seen, probes included.
    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    /// Mutations performed since construction or the last `clear_mutations`.
    pub fn mutations(&self) -> &[String] {
        &self.mutations
    }

    pub fn clear_mutations(&mut self) {
        self.mutations.clear();
        self.commands.borrow_mut().clear();
    }

    // -- internals -----------------------------------------------------------

    fn check_denied(&self, path: &Path) -> HostResult<()> {
        match self.denied.get(path) {
            Some(reason) => Err(HostError::io(
                path,
                io::Error::new(io::ErrorKind::PermissionDenied, reason.clone()),
            )),
            None => Ok(()),
        }
    }

    fn check_readable(&self, path: &Path) -> HostResult<()> {
        match self.unreadable.get(path) {
            Some(reason) => Err(HostError::io(
                path,
                io::Error::new(io::ErrorKind::PermissionDenied, reason.clone()),
            )),
            None => Ok(()),
        }
    }

    fn not_found(path: &Path) -> HostError {
        HostError::io(path, io::Error::from(io::ErrorKind::NotFound))
    }

    /// Follow symlinks at `path` itself to the final entry.
    fn follow(&self, path: &Path) -> HostResult<(PathBuf, &Entry)> {
        let mut current = path.to_path_buf();
        for _ in 0..16 {
            let entry = self.entries.get(&current).ok_or_else(|| Self::not_found(path))?;
            match &entry.node {
                Node::Symlink(target) => current = normalize(&resolve_link(&current, target)),
                _ => return Ok((current, entry)),
            }
        }
        Err(HostError::io(path, io::Error::new(io::ErrorKind::Other, "too many levels of symbolic links")))
    }

    fn parent_is_dir(&self, path: &Path) -> bool {
        match path.parent() {
            Some(parent) => matches!(self.follow(parent), Ok((_, e)) if e.node == Node::Directory),
            None => true,
        }
    }

    fn insert(&mut self, path: &Path, node: Node) -> HostResult<()> {
        self.check_denied(path)?;
        if !self.parent_is_dir(path) {
            return Err(Self::not_found(path));
        }
        self.entries.insert(path.to_path_buf(), Entry::new(node));
        Ok(())
    }

    fn point_link(&mut self, link: &Path, target: &Path) -> Option<String> {
        let replaceable = match self.entries.get(link) {
            None => true,
            Some(entry) => matches!(entry.node, Node::Symlink(_)),
        };
        if !replaceable {
            return Some(format!(
                "update-alternatives: warning: not replacing {} with a link\n",
                link.display()
            ));
        }
        let wanted = Node::Symlink(target.to_path_buf());
        if self.entries.get(link).map(|e| &e.node) != Some(&wanted) {
            self.seed_parents(link);
            self.entries.insert(link.to_path_buf(), Entry::new(wanted));
            self.mutations
                .push(format!("ln -sfn {} {}", target.display(), link.display()));
        }
        None
    }

    fn sync_alternative_links(&mut self, name: &str) -> Option<String> {
        let group = self.alternatives.get(name)?.clone();
        let alt = Path::new(ALTERNATIVES_DIR).join(name);
        let selected = group.selected?;
        let mut warning = self.point_link(&group.link, &alt);
        if let Some(w) = self.point_link(&alt, &selected) {
            warning = Some(w);
        }
        warning
    }

    fn register_alternative(&mut self, name: &str, link: &Path, path: &Path, priority: u32) -> Option<String> {
        let group = self
            .alternatives
            .entry(name.to_string())
            .or_insert_with(|| AlternativeGroup {
                link: link.to_path_buf(),
                ..AlternativeGroup::default()
            });
        group.link = link.to_path_buf();
        group.candidates.insert(path.to_path_buf(), priority);
        if !group.manual {
            group.selected = group
                .candidates
                .iter()
                .max_by_key(|(_, p)| **p)
                .map(|(path, _)| path.clone());
        }
        self.sync_alternative_links(name)
    }

    fn display_alternative(&self, name: &str) -> Option<String> {
        let group = self.alternatives.get(name)?;
        let mut out = format!(
            "{} - {} mode\n",
            name,
            if group.manual { "manual" } else { "auto" }
        );
        if let Some(selected) = &group.selected {
            out.push_str(&format!("  link currently points to {}\n", selected.display()));
        }
        out.push_str(&format!("  link {} is {}\n", name, group.link.display()));
        for (path, priority) in &group.candidates {
            out.push_str(&format!("{} - priority {}\n", path.display(), priority));
        }
        Some(out)
    }

    /// The subset of commands the mock understands natively.
    fn emulate(&mut self, words: &[&str]) -> Option<Result<String, (i32, String)>> {
        match words {
            ["update-alternatives", "--install", link, name, path, priority] => {
                let priority = match priority.parse::<u32>() {
                    Ok(p) => p,
                    Err(_) => return Some(Err((2, format!("priority must be an integer: {}", priority)))),
                };
                let warning = self.register_alternative(name, Path::new(link), Path::new(path), priority);
                self.mutations.push(format!("alternatives install {} {}", name, path));
                Some(Ok(warning.unwrap_or_default()))
            }
            ["update-alternatives", "--set", name, path] => {
                let known = self
                    .alternatives
                    .get(*name)
                    .map(|g| g.candidates.contains_key(Path::new(path)))
                    .unwrap_or(false);
                if !known {
                    return Some(Err((
                        2,
                        format!("update-alternatives: error: alternative {} for {} not registered", path, name),
                    )));
                }
                if let Some(group) = self.alternatives.get_mut(*name) {
                    group.manual = true;
                    group.selected = Some(PathBuf::from(path));
                }
                self.mutations.push(format!("alternatives set {} {}", name, path));
                Some(Ok(self.sync_alternative_links(name).unwrap_or_default()))
            }
            _ => None,
        }
    }

    fn probe_emulate(&self, words: &[&str]) -> Option<Result<String, (i32, String)>> {
        match words {
            ["update-alternatives", "--display", name] => Some(match self.display_alternative(name) {
                Some(out) => Ok(out),
                None => Err((2, format!("update-alternatives: error: no alternatives for {}", name))),
            }),
            ["test", flag, path] => {
                let kind = self.entry_kind(Path::new(path)).unwrap_or(EntryKind::Missing);
                let holds = match *flag {
                    "-L" | "-h" => kind == EntryKind::Symlink,
                    "-e" => self.follow(Path::new(path)).is_ok(),
                    "-d" => self.resolves_to_dir(Path::new(path)).unwrap_or(false),
                    "-f" => matches!(self.follow(Path::new(path)), Ok((_, e)) if matches!(e.node, Node::File(_))),
                    _ => return None,
                };
                Some(if holds { Ok(String::new()) } else { Err((1, String::new())) })
            }
            _ => None,
        }
    }

    fn scripted(&self, command: &str) -> Option<Result<String, CommandError>> {
        self.responses.get(command).map(|r| match r {
            Ok(out) => Ok(out.clone()),
            Err(stderr) => Err(failed(command, 1, stderr.clone())),
        })
    }
}

fn failed(command: &str, status: i32, stderr: String) -> CommandError {
    CommandError::Failed {
        command: command.to_string(),
        status: Some(status),
        stderr,
    }
}

fn split_command(command: &str) -> Vec<&str> {
    command
        .split_whitespace()
        .map(|w| w.trim_matches('\''))
        .collect()
}

/// Collapse `.` and `..` components lexically.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::from("/");
    for comp in path.components() {
        match comp {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::Normal(c) => out.push(c),
            _ => {}
        }
    }
    out
}

impl HostState for MockHost {
    fn entry_kind(&self, path: &Path) -> HostResult<EntryKind> {
        Ok(match self.entries.get(path).map(|e| &e.node) {
            None => EntryKind::Missing,
            Some(Node::File(_)) => EntryKind::File,
            Some(Node::Directory) => EntryKind::Directory,
            Some(Node::Symlink(_)) => EntryKind::Symlink,
        })
    }

    fn path_mode(&self, path: &Path) -> HostResult<u32> {
        Ok(self.follow(path)?.1.mode)
    }

    fn ownership(&self, path: &Path) -> HostResult<Ownership> {
        let (_, entry) = self.follow(path)?;
        Ok(Ownership {
            owner: entry.owner.clone(),
            group: entry.group.clone(),
        })
    }

    fn link_target(&self, path: &Path) -> HostResult<Option<PathBuf>> {
        Ok(match self.entries.get(path).map(|e| &e.node) {
            Some(Node::Symlink(target)) => Some(target.clone()),
            _ => None,
        })
    }

    fn package_installed(&self, name: &str) -> HostResult<bool> {
        let command = format!("rpm -q {}", name);
        self.commands.borrow_mut().push(command.clone());
        if let Some(reason) = self.broken_package_queries.get(name) {
            return Err(failed(&command, 1, reason.clone()).into());
        }
        Ok(self.packages.contains(name))
    }

    fn read_to_string(&self, path: &Path) -> HostResult<Option<String>> {
        self.check_readable(path)?;
        match self.follow(path) {
            Ok((_, Entry { node: Node::File(bytes), .. })) => {
                Ok(Some(String::from_utf8_lossy(bytes).into_owned()))
            }
            Ok(_) => Err(HostError::io(path, io::Error::new(io::ErrorKind::Other, "is a directory"))),
            Err(_) => Ok(None),
        }
    }

    fn file_digest(&self, path: &Path) -> HostResult<Option<String>> {
        self.check_readable(path)?;
        match self.follow(path) {
            Ok((_, Entry { node: Node::File(bytes), .. })) => Ok(Some(digest(bytes))),
            Ok(_) => Err(HostError::io(path, io::Error::new(io::ErrorKind::Other, "is a directory"))),
            Err(_) => Ok(None),
        }
    }

    fn probe_command(&self, command: &str) -> Result<String, CommandError> {
        self.commands.borrow_mut().push(command.to_string());
        if let Some(result) = self.scripted(command) {
            return result;
        }
        match self.probe_emulate(&split_command(command)) {
            Some(Ok(out)) => Ok(out),
            Some(Err((status, stderr))) => Err(failed(command, status, stderr)),
            None => Ok(String::new()),
        }
    }
}

impl Host for MockHost {
    fn install_package(&mut self, name: &str) -> HostResult<()> {
        let command = format!("yum install -y {}", name);
        self.commands.borrow_mut().push(command.clone());
        if self.unavailable_packages.contains(name) {
            return Err(failed(&command, 1, format!("No package {} available.", name)).into());
        }
        self.packages.insert(name.to_string());
        self.mutations.push(format!("install {}", name));
        Ok(())
    }

    fn create_dir(&mut self, path: &Path, recursive: bool) -> HostResult<()> {
        if self.entries.contains_key(path) {
            return Err(HostError::io(path, io::Error::from(io::ErrorKind::AlreadyExists)));
        }
        if recursive {
            let mut missing = Vec::new();
            let mut cur = Some(path);
            while let Some(p) = cur {
                if self.entries.contains_key(p) {
                    break;
                }
                missing.push(p.to_path_buf());
                cur = p.parent();
            }
            for p in missing.into_iter().rev() {
                self.insert(&p, Node::Directory)?;
                self.mutations.push(format!("mkdir {}", p.display()));
            }
            Ok(())
        } else {
            self.insert(path, Node::Directory)?;
            self.mutations.push(format!("mkdir {}", path.display()));
            Ok(())
        }
    }

    fn set_owner(&mut self, path: &Path, owner: Option<&str>, group: Option<&str>) -> HostResult<()> {
        self.check_denied(path)?;
        let (real, _) = self.follow(path)?;
        if let Some(entry) = self.entries.get_mut(&real) {
            if let Some(o) = owner {
                entry.owner = o.to_string();
            }
            if let Some(g) = group {
                entry.group = g.to_string();
            }
        }
        self.mutations.push(format!(
            "chown {}:{} {}",
            owner.unwrap_or(""),
            group.unwrap_or(""),
            path.display()
        ));
        Ok(())
    }

    fn set_mode(&mut self, path: &Path, mode: u32) -> HostResult<()> {
        self.check_denied(path)?;
        let (real, _) = self.follow(path)?;
        if let Some(entry) = self.entries.get_mut(&real) {
            entry.mode = mode;
        }
        self.mutations.push(format!("chmod {:04o} {}", mode, path.display()));
        Ok(())
    }

    fn remove_dir_all(&mut self, path: &Path) -> HostResult<()> {
        self.check_denied(path)?;
        match self.entries.get(path).map(|e| &e.node) {
            Some(Node::Directory) => {}
            Some(_) => {
                return Err(HostError::io(
                    path,
                    io::Error::new(io::ErrorKind::Other, "not a directory"),
                ))
            }
            None => return Err(Self::not_found(path)),
        }
        let doomed: Vec<PathBuf> = self
            .entries
            .keys()
            .filter(|p| p.starts_with(path))
            .cloned()
            .collect();
        for p in doomed {
            self.entries.remove(&p);
        }
        self.mutations.push(format!("rm -rf {}", path.display()));
        Ok(())
    }

    fn remove_file(&mut self, path: &Path) -> HostResult<()> {
        self.check_denied(path)?;
        match self.entries.get(path).map(|e| &e.node) {
            Some(Node::File(_)) | Some(Node::Symlink(_)) => {
                self.entries.remove(path);
                self.mutations.push(format!("rm {}", path.display()));
                Ok(())
            }
            Some(Node::Directory) => Err(HostError::io(
                path,
                io::Error::new(io::ErrorKind::Other, "is a directory"),
            )),
            None => Err(Self::not_found(path)),
        }
    }

    fn symlink(&mut self, target: &Path, path: &Path) -> HostResult<()> {
        if self.entries.contains_key(path) {
            return Err(HostError::io(path, io::Error::from(io::ErrorKind::AlreadyExists)));
        }
        self.insert(path, Node::Symlink(target.to_path_buf()))?;
        self.mutations
            .push(format!("ln -s {} {}", target.display(), path.display()));
        Ok(())
    }

    fn write_file(&mut self, path: &Path, content: &[u8]) -> HostResult<()> {
        self.check_denied(path)?;
        match self.entries.get_mut(path) {
            Some(Entry { node: node @ Node::File(_), .. }) => {
                *node = Node::File(content.to_vec());
            }
            Some(_) => {
                return Err(HostError::io(
                    path,
                    io::Error::new(io::ErrorKind::Other, "not a regular file"),
                ))
            }
            None => self.insert(path, Node::File(content.to_vec()))?,
        }
        self.mutations.push(format!("write {}", path.display()));
        Ok(())
    }

    fn update_file(&mut self, path: &Path, edit: &dyn Fn(Option<&str>) -> String) -> HostResult<bool> {
        let current = self.read_to_string(path)?;
        let updated = edit(current.as_deref());
        if current.as_deref() == Some(updated.as_str()) {
            return Ok(false);
        }
        self.write_file(path, updated.as_bytes())?;
        Ok(true)
    }

    fn run_command(&mut self, command: &str) -> Result<String, CommandError> {
        self.commands.borrow_mut().push(command.to_string());
        if let Some(result) = self.scripted(command) {
            if result.is_ok() {
                self.mutations.push(format!("exec {}", command));
            }
            return result;
        }
        let words = split_command(command);
        if let Some(result) = self.emulate(&words) {
            return result.map_err(|(status, stderr)| failed(command, status, stderr));
        }
        if let Some(result) = self.probe_emulate(&words) {
            return result.map_err(|(status, stderr)| failed(command, status, stderr));
        }
        self.mutations.push(format!("exec {}", command));
        Ok(String::new())
    }
}
