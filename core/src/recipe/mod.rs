//! The Hadoop client recipe: turns a frozen attribute tree and a resolved
//! profile into the ordered resource graph.

pub mod log_dirs;

#[cfg(test)]
mod scenarios;

use std::path::{Path, PathBuf};

use log::debug;
use serde_json::{json, Map, Value};

use crate::attributes::tree::kind_name;
use crate::attributes::AttributeTree;
use crate::convergence::graph::ResourceGraph;
use crate::error::{Error, Result};
use crate::profile::{Profile, Service};
use crate::template::{
    Renderer, CONTAINER_EXECUTOR_CFG, DEFAULT_ENV_SH, ENV_SH, FAIR_SCHEDULER_XML, PROPERTIES, SITE_XML,
};
use crate::types::resource::{Guard, LimitsEntry, Resource, ResourceId, ResourceKind, Spec, Timing};

pub const DEFAULT_ENV_FILE: &str = "/etc/default/hadoop";
pub const LIMITS_DIR: &str = "/etc/security/limits.d";
pub const LEGACY_LIMITS_FILE: &str = "/etc/security/limits.d/mapreduce.conf";

/// `(attribute subtree, file name)` for each `*-site.xml`-style file.
const SITE_FILES: [(&str, &str); 6] = [
    ("capacity_scheduler", "capacity-scheduler.xml"),
    ("core_site", "core-site.xml"),
    ("hadoop_policy", "hadoop-policy.xml"),
    ("hdfs_site", "hdfs-site.xml"),
    ("mapred_site", "mapred-site.xml"),
    ("yarn_site", "yarn-site.xml"),
];

/// `(attribute subtree, file name, source)` for the key=value files.
const PROPERTY_FILES: [(&str, &str, &str); 3] = [
    ("hadoop_metrics", "hadoop-metrics.properties", PROPERTIES),
    ("container_executor", "container-executor.cfg", CONTAINER_EXECUTOR_CFG),
    ("log4j", "log4j.properties", PROPERTIES),
];

/// Users that get a private temporary directory when `hadoop.tmp.dir`
/// contains `${user}`.
const TMP_DIR_USERS: [&str; 3] = ["hdfs", "yarn", "mapreduce"];

/// Users whose limits are managed, in declaration order.
const LIMITS_USERS: [&str; 3] = ["hdfs", "mapred", "yarn"];

/// Declare every resource of a run.
pub fn declare(attrs: &AttributeTree, profile: &Profile, renderer: &dyn Renderer) -> Result<ResourceGraph> {
    if !attrs.is_frozen() {
        return Err(Error::config(
            "hadoop",
            "attributes must be frozen before resources are declared",
        ));
    }

    let mut d = Declarer {
        graph: ResourceGraph::new(),
        renderer,
    };
    let alternatives_id = ResourceId::new(ResourceKind::Alternatives, profile.alternatives_name.clone());

    // Packages
    d.add(Resource::package(&profile.packages.client))?;
    d.add(Resource::package(&profile.packages.libhdfs))?;

    d.add(
        Resource::template(DEFAULT_ENV_FILE, DEFAULT_ENV_SH, default_env_variables(profile))
            .owner("root")
            .group("root")
            .mode(0o755),
    )?;

    d.add(
        Resource::directory(&profile.conf_dir_chef)
            .owner("root")
            .group("root")
            .mode(0o755)
            .recursive()
            .notifies(alternatives_id, Timing::Delayed),
    )?;

    // Configuration files
    for (section, file) in SITE_FILES {
        let vars = Value::Object(section_map(attrs, section)?);
        d.add(conf_template(profile, file, SITE_XML, vars, 0o644))?;
    }
    d.add(conf_template(
        profile,
        "fair-scheduler.xml",
        FAIR_SCHEDULER_XML,
        Value::Object(section_map(attrs, "fair_scheduler")?),
        0o644,
    ))?;

    for service in Service::ALL {
        let desired = log_dirs::desired_log_dir(attrs, profile, service)?;
        debug!("{} logs to {}", service, desired.display());
        for r in log_dirs::resources(profile, service, &desired) {
            d.add(r)?;
        }
        d.add(conf_template(
            profile,
            env_file_name(service),
            ENV_SH,
            env_variables(attrs, service, &desired)?,
            0o755,
        ))?;
    }

    for (section, file, source) in PROPERTY_FILES {
        let vars = Value::Object(section_map(attrs, section)?);
        d.add(conf_template(profile, file, source, vars, 0o644))?;
    }

    for dir in tmp_dirs(attrs)? {
        d.add(Resource::directory(&dir).mode(0o1777).recursive())?;
    }

    // Limits
    let nofile = limit_value(attrs, "nofile")?;
    let nproc = limit_value(attrs, "nproc")?;
    for user in LIMITS_USERS {
        let file = Path::new(LIMITS_DIR).join(format!("{}.conf", user));
        d.add(Resource::limits(&file, LimitsEntry::new(user, "-", "nofile", nofile)))?;
        d.add(Resource::limits(&file, LimitsEntry::new(user, "-", "nproc", nproc)))?;
    }
    d.add(Resource::delete_file(LEGACY_LIMITS_FILE))?;

    // Alternatives
    if profile.preexisting_conf_dir {
        d.add(
            Resource::delete_directory(&profile.conf_dir_system).not_if(Guard::Symlink {
                path: profile.conf_dir_system.clone(),
            }),
        )?;
    }
    d.add(Resource::alternatives(
        &profile.alternatives_name,
        &profile.conf_dir_system,
        &profile.conf_dir_chef,
        profile.alternatives_priority,
    ))?;

    d.graph.validate()?;
    Ok(d.graph)
}

struct Declarer<'a> {
    graph: ResourceGraph,
    renderer: &'a dyn Renderer,
}

impl<'a> Declarer<'a> {
    /// Add a resource, checking template variables now rather than at
    /// apply time. Re-declaring an identical resource is a no-op.
    fn add(&mut self, resource: Resource) -> Result<()> {
        if let Some(existing) = self.graph.get(&resource.id()) {
            if *existing == resource {
                debug!("{} already declared", resource.id());
                return Ok(());
            }
        }
        if let Spec::Template { source, variables, .. } = &resource.spec {
            self.renderer.validate(source, variables)?;
        }
        self.graph.add(resource)
    }
}

fn conf_template(profile: &Profile, file: &str, source: &str, vars: Value, mode: u32) -> Resource {
    Resource::template(profile.conf_dir_chef.join(file), source, vars)
        .owner("root")
        .group("root")
        .mode(mode)
}

fn env_file_name(service: Service) -> &'static str {
    match service {
        Service::Hdfs => "hadoop-env.sh",
        Service::Yarn => "yarn-env.sh",
        Service::Mapred => "mapred-env.sh",
    }
}

/// Effective mapping at `hadoop.<section>`; unset reads as empty.
fn section_map(attrs: &AttributeTree, section: &str) -> Result<Map<String, Value>> {
    let path = format!("hadoop.{}", section);
    match attrs.get(&path) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(Error::config(
            path,
            format!("expected a mapping, found {}", kind_name(&other)),
        )),
    }
}

/// `<service>_env` with the log-dir override keys replaced by the variable
/// the daemons read.
fn env_variables(attrs: &AttributeTree, service: Service, log_dir: &Path) -> Result<Value> {
    let (section, key) = service.log_dir_attribute();
    let mut vars = section_map(attrs, section)?;
    vars.remove(key);
    for legacy in service.legacy_log_dir_keys() {
        vars.remove(*legacy);
    }
    vars.insert(
        service.log_dir_env_var().to_string(),
        Value::String(log_dir.display().to_string()),
    );
    Ok(Value::Object(vars))
}

fn default_env_variables(profile: &Profile) -> Value {
    json!({
        "hadoop_pid_dir": "/var/run/hadoop",
        "hadoop_log_dir": "/var/log/hadoop",
        "hadoop_namenode_user": "hdfs",
        "hadoop_secondarynamenode_user": "hdfs",
        "hadoop_datanode_user": "hdfs",
        "hadoop_ident_string": "hadoop",
        "hadoop_libexec_dir": profile.lib_dir.join("hadoop/libexec").display().to_string(),
        "hadoop_conf_dir": profile.conf_dir_system.display().to_string(),
    })
}

/// Directories named by `hadoop.tmp.dir`, one per user when it contains
/// `${user}`.
fn tmp_dirs(attrs: &AttributeTree) -> Result<Vec<PathBuf>> {
    let attr = r#"hadoop.core_site."hadoop.tmp.dir""#;
    let Some(template) = attrs.get_str(attr)? else {
        return Ok(Vec::new());
    };
    if !template.starts_with('/') {
        return Err(Error::config(attr, format!("`{}` is not an absolute path", template)));
    }
    if !template.contains("${user}") {
        return Ok(vec![PathBuf::from(template)]);
    }
    let mut dirs: Vec<PathBuf> = Vec::new();
    for user in TMP_DIR_USERS {
        let dir = PathBuf::from(template.replace("${user}", user));
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    Ok(dirs)
}

fn limit_value(attrs: &AttributeTree, item: &str) -> Result<u64> {
    let attr = format!("hadoop.limits.{}", item);
    attrs
        .get_u64(&attr)?
        .ok_or_else(|| Error::config(attr, "limit is not set"))
}
