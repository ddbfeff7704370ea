use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PackageTool {
    Yum,
    Apt,
}

impl PackageTool {
    /// `rhel`-like platforms use yum, `debian`-like ones apt.
    pub fn for_platform_family(family: &str) -> Option<PackageTool> {
        match family {
            "rhel" | "fedora" | "amazon" | "suse" => Some(PackageTool::Yum),
            "debian" | "ubuntu" => Some(PackageTool::Apt),
            _ => None,
        }
    }
}

impl fmt::Display for PackageTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageTool::Yum => f.write_str("yum"),
            PackageTool::Apt => f.write_str("apt"),
        }
    }
}

impl FromStr for PackageTool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yum" | "rpm" => Ok(PackageTool::Yum),
            "apt" | "dpkg" => Ok(PackageTool::Apt),
            other => Err(format!("unknown package tool `{}` (expected yum or apt)", other)),
        }
    }
}

/// Knobs for a single convergence run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSettings {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_tool: Option<PackageTool>,
    #[serde(default = "default_max_notifications")]
    pub max_notifications: usize,
}

fn default_max_notifications() -> usize {
    64
}

impl Default for RunSettings {
    fn default() -> Self {
        RunSettings {
            dry_run: false,
            root: None,
            package_tool: None,
            max_notifications: default_max_notifications(),
        }
    }
}
