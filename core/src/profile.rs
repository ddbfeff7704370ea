//! Distribution profiles: per-vendor package names and filesystem layout.
//!
//! Selection is table-driven. An unknown distribution logs a warning and
//! falls back to the default (CDH-style) layout.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::attributes::AttributeTree;
use crate::error::Result;


/// The three services whose log directories and limits are managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Hdfs,
    Yarn,
    Mapred,
}

impl Service {
    pub const ALL: [Service; 3] = [Service::Hdfs, Service::Yarn, Service::Mapred];

    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Hdfs => "hdfs",
            Service::Yarn => "yarn",
            Service::Mapred => "mapred",
        }
    }

    /// The system user (and group) the service runs as.
    pub fn user(&self) -> &'static str {
        self.as_str()
    }

    /// Attribute subtree holding the service's environment, and the key
    /// inside it that overrides the log directory.
    pub fn log_dir_attribute(&self) -> (&'static str, &'static str) {
        match self {
            Service::Hdfs => ("hadoop_env", "hadoop_log_dir"),
            Service::Yarn => ("yarn_env", "yarn_log_dir"),
            Service::Mapred => ("mapred_env", "mapred_log_dir"),
        }
    }

    /// Older attribute names still honoured for the log directory.
    pub fn legacy_log_dir_keys(&self) -> &'static [&'static str] {
        match self {
            Service::Mapred => &["hadoop_mapred_log_dir"],
            _ => &[],
        }
    }

    /// Variable name the daemons read the log directory from.
    pub fn log_dir_env_var(&self) -> &'static str {
        match self {
            Service::Hdfs => "hadoop_log_dir",
            Service::Yarn => "yarn_log_dir",
            Service::Mapred => "hadoop_mapred_log_dir",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


/// Package names a profile supplies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packages {
    pub client: String,
    pub libhdfs: String,
}


/// Resolved names and paths for one distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub distribution: String,
    pub version: String,
    /// Private directory the engine renders into.
    pub conf_dir_chef: PathBuf,
    /// Public pointer managed by alternatives.
    pub conf_dir_system: PathBuf,
    /// Alternatives group name for the configuration pointer.
    pub alternatives_name: String,
    pub alternatives_priority: u32,
    /// Where daemons expect their logs by convention.
    pub default_log_dirs: BTreeMap<Service, PathBuf>,
    pub packages: Packages,
    /// The distribution ships `conf_dir_system` as a real directory that has
    /// to go before alternatives can own the path.
    pub preexisting_conf_dir: bool,
    /// Whether the canonical log directories are managed when no override
    /// is set.
    pub manage_default_log_dirs: bool,
    pub lib_dir: PathBuf,
}

impl Profile {
    pub fn canonical_log_dir(&self, service: Service) -> &PathBuf {
        &self.default_log_dirs[&service]
    }
}


/// Row of the profile table.
struct Layout {
    names: &'static [&'static str],
    log_dirs: [(Service, &'static str); 3],
    preexisting_conf_dir: bool,
    manage_default_log_dirs: bool,
}

const DEFAULT_LAYOUT: Layout = Layout {
    names: &["cdh", "bigtop"],
    log_dirs: [
        (Service::Hdfs, "/var/log/hadoop-hdfs"),
        (Service::Yarn, "/var/log/hadoop-yarn"),
        (Service::Mapred, "/var/log/hadoop-mapreduce"),
    ],
    preexisting_conf_dir: false,
    manage_default_log_dirs: true,
};

// Without an override the canonical HDP log dirs are neither created nor
// linked.
const HDP_LAYOUT: Layout = Layout {
    names: &["hdp"],
    log_dirs: [
        (Service::Hdfs, "/var/log/hadoop/hdfs"),
        (Service::Yarn, "/var/log/hadoop/yarn"),
        (Service::Mapred, "/var/log/hadoop/mapreduce"),
    ],
    preexisting_conf_dir: true,
    manage_default_log_dirs: false,
};

const LAYOUTS: [&Layout; 2] = [&DEFAULT_LAYOUT, &HDP_LAYOUT];

const ALTERNATIVES_NAME: &str = "hadoop-conf";
const ALTERNATIVES_PRIORITY: u32 = 50;


/// Resolve the profile for the distribution named in `attrs`.
pub fn resolve(attrs: &AttributeTree) -> Result<Profile> {
    let distribution = attrs.get_str_or("hadoop.distribution", "cdh")?;
    let version = attrs.get_str_or("hadoop.distribution_version", "")?;
    let conf_dir = attrs.get_str_or("hadoop.conf_dir", "conf.chef")?;
    let platform_family = attrs.get_str("platform_family")?;
    Ok(build(&distribution, &version, &conf_dir, platform_family.as_deref()))
}


/// Build a profile from its inputs. Never fails: unknown distributions get
/// the default layout.
pub fn build(distribution: &str, version: &str, conf_dir: &str, platform_family: Option<&str>) -> Profile {
    let layout = match LAYOUTS.iter().find(|l| l.names.contains(&distribution)) {
        Some(layout) => *layout,
        None => {
            log::warn!(
                "unknown distribution '{}', using the default profile",
                distribution
            );
            &DEFAULT_LAYOUT
        }
    };

    let hdp22 = distribution == "hdp" && version_at_least(version, &[2, 2]);
    let versioned = hdp22 && platform_family != Some("debian");
    let package = |name: &str| {
        if versioned {
            versioned_package(name, version)
        } else {
            name.to_string()
        }
    };

    Profile {
        distribution: distribution.to_string(),
        version: version.to_string(),
        conf_dir_chef: PathBuf::from("/etc/hadoop").join(conf_dir),
        conf_dir_system: PathBuf::from("/etc/hadoop/conf"),
        alternatives_name: ALTERNATIVES_NAME.to_string(),
        alternatives_priority: ALTERNATIVES_PRIORITY,
        default_log_dirs: layout
            .log_dirs
            .iter()
            .map(|(service, path)| (*service, PathBuf::from(path)))
            .collect(),
        packages: Packages {
            client: package("hadoop-client"),
            libhdfs: package("hadoop-libhdfs"),
        },
        preexisting_conf_dir: layout.preexisting_conf_dir,
        manage_default_log_dirs: layout.manage_default_log_dirs,
        lib_dir: if hdp22 {
            PathBuf::from("/usr/hdp/current")
        } else {
            PathBuf::from("/usr/lib")
        },
    }
}


/// `hadoop-client` at 2.2.4.2 becomes `hadoop_2_2_4_2-client`.
fn versioned_package(name: &str, version: &str) -> String {
    let suffix = version.replace(['.', '-'], "_");
    match name.split_once('-') {
        Some((framework, rest)) => format!("{}_{}-{}", framework, suffix, rest),
        None => format!("{}_{}", name, suffix),
    }
}

/// Compare the leading numeric components of a dotted version.
fn version_at_least(version: &str, minimum: &[u32]) -> bool {
    let parts: Vec<u32> = version
        .split(['.', '-'])
        .map_while(|p| p.parse().ok())
        .collect();
    for (i, want) in minimum.iter().enumerate() {
        let have = parts.get(i).copied().unwrap_or(0);
        if have != *want {
            return have > *want;
        }
    }
    true
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
