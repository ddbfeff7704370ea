//! Log directory placement.
//!
//! Daemons write to a canonical path fixed by the distribution. An operator
//! may move a service's logs elsewhere; the canonical path then becomes a
//! symlink to the chosen directory. The resources are declared in the order
//! destination, obstacle removal, link so the canonical path is only ever
//! missing between the last two.

use std::path::{Component, Path, PathBuf};

use crate::attributes::AttributeTree;
use crate::error::{Error, Result};
use crate::profile::{Profile, Service};
use crate::types::resource::{Guard, Resource};

pub const LOG_DIR_MODE: u32 = 0o775;

/// Where `service` should log: the `<service>_env` override (or a legacy
/// alias), else the canonical directory.
///
/// An override nested inside the canonical directory, or containing it, is
/// rejected: relocating would remove the canonical tree together with the
/// destination, or link the canonical path back into itself.
pub fn desired_log_dir(attrs: &AttributeTree, profile: &Profile, service: Service) -> Result<PathBuf> {
    let (section, key) = service.log_dir_attribute();
    let mut keys = vec![key];
    keys.extend_from_slice(service.legacy_log_dir_keys());

    for key in keys {
        let attr = format!("hadoop.{}.{}", section, key);
        if let Some(dir) = attrs.get_str(&attr)? {
            let dir = dir.trim();
            if dir.is_empty() {
                continue;
            }
            let path = PathBuf::from(dir);
            if !path.is_absolute() {
                return Err(Error::config(attr, format!("log directory `{}` is not absolute", dir)));
            }
            if path.components().any(|c| c == Component::ParentDir) {
                return Err(Error::config(attr, format!("log directory `{}` contains `..`", dir)));
            }
            let canonical = profile.canonical_log_dir(service);
            if path != *canonical {
                if path.starts_with(canonical) {
                    return Err(Error::config(
                        attr,
                        format!("log directory `{}` is inside {}", dir, canonical.display()),
                    ));
                }
                if canonical.starts_with(&path) {
                    return Err(Error::config(
                        attr,
                        format!("log directory `{}` contains {}", dir, canonical.display()),
                    ));
                }
            }
            return Ok(path);
        }
    }
    Ok(profile.canonical_log_dir(service).clone())
}

/// Resources that put `service`'s logs at `desired`.
pub fn resources(profile: &Profile, service: Service, desired: &Path) -> Vec<Resource> {
    let canonical = profile.canonical_log_dir(service);
    let user = service.user();

    let directory = |path: &Path| {
        Resource::directory(path)
            .owner(user)
            .group(user)
            .mode(LOG_DIR_MODE)
            .recursive()
    };

    if desired == canonical.as_path() {
        if !profile.manage_default_log_dirs {
            return Vec::new();
        }
        return vec![Resource::delete_link(canonical), directory(canonical)];
    }

    vec![
        directory(desired),
        Resource::delete_directory(canonical).not_if(Guard::LinksTo {
            path: canonical.clone(),
            target: desired.to_path_buf(),
        }),
        Resource::link(canonical, desired),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Layer;
    use crate::profile;
    use crate::types::resource::{Action, ResourceKind};
    use serde_json::json;

    fn cdh() -> Profile {
        profile::build("cdh", "5", "conf.chef", None)
    }

    fn hdp() -> Profile {
        profile::build("hdp", "2.2.4.2", "conf.chef", Some("rhel"))
    }

    #[test]
    fn desired_defaults_to_canonical() {
        let attrs = AttributeTree::new();
        assert_eq!(
            desired_log_dir(&attrs, &cdh(), Service::Yarn).unwrap(),
            PathBuf::from("/var/log/hadoop-yarn")
        );
    }

    #[test]
    fn override_and_legacy_alias() {
        let mut attrs = AttributeTree::new();
        attrs
            .set(Layer::Override, "hadoop.hadoop_env.hadoop_log_dir", json!("/data/log/hadoop-hdfs"))
            .unwrap();
        attrs
            .set(Layer::Default, "hadoop.mapred_env.hadoop_mapred_log_dir", json!("/data/log/mr"))
            .unwrap();
        assert_eq!(
            desired_log_dir(&attrs, &cdh(), Service::Hdfs).unwrap(),
            PathBuf::from("/data/log/hadoop-hdfs")
        );
        assert_eq!(
            desired_log_dir(&attrs, &cdh(), Service::Mapred).unwrap(),
            PathBuf::from("/data/log/mr")
        );
    }

    #[test]
    fn relative_override_is_config_error() {
        let mut attrs = AttributeTree::new();
        attrs
            .set(Layer::Override, "hadoop.yarn_env.yarn_log_dir", json!("logs/yarn"))
            .unwrap();
        assert!(matches!(
            desired_log_dir(&attrs, &cdh(), Service::Yarn),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn overlapping_override_is_config_error() {
        for dir in ["/var/log/hadoop-yarn/custom", "/var/log", "/data/../var/log/hadoop-yarn"] {
            let mut attrs = AttributeTree::new();
            attrs
                .set(Layer::Override, "hadoop.yarn_env.yarn_log_dir", json!(dir))
                .unwrap();
            match desired_log_dir(&attrs, &cdh(), Service::Yarn) {
                Err(Error::Config { path, .. }) => assert_eq!(path, "hadoop.yarn_env.yarn_log_dir"),
                other => panic!("{}: unexpected {:?}", dir, other),
            }
        }
    }

    #[test]
    fn override_equal_to_canonical_or_sibling_is_accepted() {
        for dir in ["/var/log/hadoop-yarn/", "/var/log/hadoop-yarn-archive"] {
            let mut attrs = AttributeTree::new();
            attrs
                .set(Layer::Override, "hadoop.yarn_env.yarn_log_dir", json!(dir))
                .unwrap();
            assert!(desired_log_dir(&attrs, &cdh(), Service::Yarn).is_ok(), "{}", dir);
        }
    }

    #[test]
    fn canonical_is_ensured_and_stale_link_removed() {
        let p = cdh();
        let rs = resources(&p, Service::Hdfs, Path::new("/var/log/hadoop-hdfs"));
        assert_eq!(rs.len(), 2);
        assert_eq!(rs[0].kind(), ResourceKind::Link);
        assert_eq!(rs[0].action, Action::Delete);
        assert_eq!(rs[1].kind(), ResourceKind::Directory);
        let meta = rs[1].meta().unwrap();
        assert_eq!(meta.mode, Some(0o775));
        assert_eq!(meta.owner.as_deref(), Some("hdfs"));
    }

    #[test]
    fn relocation_order() {
        let p = cdh();
        let rs = resources(&p, Service::Hdfs, Path::new("/data/log/hadoop-hdfs"));
        let ids: Vec<String> = rs.iter().map(|r| format!("{} {}", r.id(), r.action)).collect();
        assert_eq!(
            ids,
            vec![
                "directory[/data/log/hadoop-hdfs] :create",
                "directory[/var/log/hadoop-hdfs] :delete",
                "link[/var/log/hadoop-hdfs] :create",
            ]
        );
        assert!(rs[1].guard.is_some());
    }

    #[test]
    fn hdp_without_override_declares_nothing() {
        let p = hdp();
        let canonical = p.canonical_log_dir(Service::Hdfs).clone();
        assert!(resources(&p, Service::Hdfs, &canonical).is_empty());
    }

    #[test]
    fn hdp_with_override_relocates() {
        let p = hdp();
        let rs = resources(&p, Service::Hdfs, Path::new("/data/logs/hdfs"));
        assert_eq!(rs.len(), 3);
        assert_eq!(rs[2].id().to_string(), "link[/var/log/hadoop/hdfs]");
    }
}
