use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Package,
    Directory,
    File,
    Link,
    Template,
    Limits,
    Execute,
    Alternatives,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Package => "package",
            ResourceKind::Directory => "directory",
            ResourceKind::File => "file",
            ResourceKind::Link => "link",
            ResourceKind::Template => "template",
            ResourceKind::Limits => "limits",
            ResourceKind::Execute => "execute",
            ResourceKind::Alternatives => "alternatives",
        }
    }

    /// Actions this kind accepts.
    pub fn allowed_actions(&self) -> &'static [Action] {
        match self {
            ResourceKind::Directory | ResourceKind::Link => &[Action::Create, Action::Delete],
            ResourceKind::File => &[Action::Delete],
            ResourceKind::Execute => &[Action::Run],
            _ => &[Action::Create],
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(kind, name)`: unique within a run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        ResourceId {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Delete,
    Run,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create => f.write_str(":create"),
            Action::Delete => f.write_str(":delete"),
            Action::Run => f.write_str(":run"),
        }
    }
}

// ---------------------------------------------------------------------------
// Guards and notifications
// ---------------------------------------------------------------------------

/// `not_if` predicate: when it holds, the resource is already converged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "guard", rename_all = "snake_case")]
pub enum Guard {
    /// Shell predicate; holds when it exits zero.
    Shell { command: String },
    /// Holds when `path` is a symlink (`test -L`).
    Symlink { path: PathBuf },
    /// Holds when `path` is a symlink pointing exactly at `target`.
    LinksTo { path: PathBuf, target: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    /// Right after the notifying resource completes.
    Immediate,
    /// After every declared resource has run.
    Delayed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub target: ResourceId,
    pub timing: Timing,
}

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

/// Ownership and permission bits to enforce. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub owner: Option<String>,
    pub group: Option<String>,
    pub mode: Option<u32>,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self.owner.is_none() && self.group.is_none() && self.mode.is_none()
    }
}

/// One line of a limits file: `<domain> <type> <item> <value>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsEntry {
    pub domain: String,
    #[serde(rename = "type")]
    pub limit_type: String,
    pub item: String,
    pub value: String,
}

impl LimitsEntry {
    pub fn new(domain: &str, limit_type: &str, item: &str, value: impl ToString) -> Self {
        LimitsEntry {
            domain: domain.to_string(),
            limit_type: limit_type.to_string(),
            item: item.to_string(),
            value: value.to_string(),
        }
    }

    pub fn key(&self) -> String {
        format!("{} {} {}", self.domain, self.limit_type, self.item)
    }
}

impl fmt::Display for LimitsEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.domain, self.limit_type, self.item, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Spec {
    Package,
    Directory {
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Metadata::is_empty")]
        meta: Metadata,
        recursive: bool,
    },
    File {
        path: PathBuf,
    },
    Link {
        path: PathBuf,
        target: Option<PathBuf>,
    },
    Template {
        path: PathBuf,
        source: String,
        #[serde(default, skip_serializing_if = "Metadata::is_empty")]
        meta: Metadata,
        /// Snapshot taken at declaration time.
        variables: Value,
    },
    Limits {
        file: PathBuf,
        entry: LimitsEntry,
    },
    Execute {
        command: String,
    },
    Alternatives {
        link: PathBuf,
        path: PathBuf,
        priority: u32,
    },
}

impl Spec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Spec::Package => ResourceKind::Package,
            Spec::Directory { .. } => ResourceKind::Directory,
            Spec::File { .. } => ResourceKind::File,
            Spec::Link { .. } => ResourceKind::Link,
            Spec::Template { .. } => ResourceKind::Template,
            Spec::Limits { .. } => ResourceKind::Limits,
            Spec::Execute { .. } => ResourceKind::Execute,
            Spec::Alternatives { .. } => ResourceKind::Alternatives,
        }
    }
}

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

/// A typed unit of desired state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub action: Action,
    pub spec: Spec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Guard>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notifies: Vec<Notification>,
}

impl Resource {
    fn new(name: impl Into<String>, action: Action, spec: Spec) -> Self {
        Resource {
            name: name.into(),
            action,
            spec,
            guard: None,
            notifies: Vec::new(),
        }
    }

    pub fn package(name: &str) -> Self {
        Resource::new(name, Action::Create, Spec::Package)
    }

    pub fn directory(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Resource::new(
            path.display().to_string(),
            Action::Create,
            Spec::Directory {
                path,
                meta: Metadata::default(),
                recursive: false,
            },
        )
    }

    pub fn delete_directory(path: impl AsRef<Path>) -> Self {
        let mut r = Resource::directory(path);
        r.action = Action::Delete;
        r
    }

    pub fn delete_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Resource::new(path.display().to_string(), Action::Delete, Spec::File { path })
    }

    pub fn link(path: impl AsRef<Path>, target: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Resource::new(
            path.display().to_string(),
            Action::Create,
            Spec::Link {
                path,
                target: Some(target.as_ref().to_path_buf()),
            },
        )
    }

    pub fn delete_link(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Resource::new(
            path.display().to_string(),
            Action::Delete,
            Spec::Link { path, target: None },
        )
    }

    pub fn template(path: impl AsRef<Path>, source: &str, variables: Value) -> Self {
        let path = path.as_ref().to_path_buf();
        Resource::new(
            path.display().to_string(),
            Action::Create,
            Spec::Template {
                path,
                source: source.to_string(),
                meta: Metadata::default(),
                variables,
            },
        )
    }

    pub fn limits(file: impl AsRef<Path>, entry: LimitsEntry) -> Self {
        Resource::new(
            entry.key(),
            Action::Create,
            Spec::Limits {
                file: file.as_ref().to_path_buf(),
                entry,
            },
        )
    }

    pub fn execute(name: &str, command: &str) -> Self {
        Resource::new(
            name,
            Action::Run,
            Spec::Execute {
                command: command.to_string(),
            },
        )
    }

    pub fn alternatives(name: &str, link: impl AsRef<Path>, path: impl AsRef<Path>, priority: u32) -> Self {
        Resource::new(
            name,
            Action::Create,
            Spec::Alternatives {
                link: link.as_ref().to_path_buf(),
                path: path.as_ref().to_path_buf(),
                priority,
            },
        )
    }

    pub fn owner(mut self, owner: &str) -> Self {
        if let Some(meta) = self.meta_mut() {
            meta.owner = Some(owner.to_string());
        }
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        if let Some(meta) = self.meta_mut() {
            meta.group = Some(group.to_string());
        }
        self
    }

    pub fn mode(mut self, mode: u32) -> Self {
        if let Some(meta) = self.meta_mut() {
            meta.mode = Some(mode);
        }
        self
    }

    pub fn recursive(mut self) -> Self {
        if let Spec::Directory { recursive, .. } = &mut self.spec {
            *recursive = true;
        }
        self
    }

    pub fn not_if(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn notifies(mut self, target: ResourceId, timing: Timing) -> Self {
        self.notifies.push(Notification { target, timing });
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.spec.kind()
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.kind(), self.name.clone())
    }

    pub fn meta(&self) -> Option<&Metadata> {
        match &self.spec {
            Spec::Directory { meta, .. } | Spec::Template { meta, .. } => Some(meta),
            _ => None,
        }
    }

    fn meta_mut(&mut self) -> Option<&mut Metadata> {
        match &mut self.spec {
            Spec::Directory { meta, .. } | Spec::Template { meta, .. } => Some(meta),
            _ => None,
        }
    }

    /// Structural checks that do not need the rest of the graph.
    pub fn validate(&self) -> Result<()> {
        let kind = self.kind();
        if !kind.allowed_actions().contains(&self.action) {
            return Err(Error::config(
                self.id().to_string(),
                format!("action {} is not supported by {}", self.action, kind),
            ));
        }
        if self.name.is_empty() {
            return Err(Error::config(kind.as_str(), "resource name is empty"));
        }
        match &self.spec {
            Spec::Link { target: None, .. } if self.action == Action::Create => Err(Error::config(
                self.id().to_string(),
                "link :create needs a target",
            )),
            Spec::Directory { path, .. }
            | Spec::File { path }
            | Spec::Link { path, .. }
            | Spec::Template { path, .. }
                if !path.is_absolute() =>
            {
                Err(Error::config(self.id().to_string(), "path must be absolute"))
            }
            _ => Ok(()),
        }
    }
}
