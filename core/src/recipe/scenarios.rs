//! End-to-end runs of the recipe against `MockHost`.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use crate::attributes::{AttributeTree, Layer};
use crate::engine;
use crate::host::mock::{MockHost, Node};
use crate::host::{EntryKind, HostState};
use crate::profile::Service;
use crate::template::BuiltinRenderer;
use crate::types::config::RunSettings;
use crate::types::report::{Report, ResourceState};
use crate::types::resource::{ResourceId, ResourceKind};

fn attrs(overrides: &[(&str, Value)]) -> AttributeTree {
    let mut tree = AttributeTree::new();
    for (path, value) in overrides {
        tree.set(Layer::Override, path, value.clone()).unwrap();
    }
    tree
}

fn hdp(extra: &[(&str, Value)]) -> AttributeTree {
    let mut overrides = vec![
        ("hadoop.distribution", json!("hdp")),
        ("hadoop.distribution_version", json!("2.2.4.2")),
    ];
    overrides.extend(extra.iter().cloned());
    attrs(&overrides)
}

/// A freshly provisioned box: the system directories exist, nothing
/// Hadoop-related does.
fn fresh_host() -> MockHost {
    let mut host = MockHost::new();
    host.seed_dir("/etc/default", "root", "root", 0o755);
    host.seed_dir("/etc/security/limits.d", "root", "root", 0o755);
    host.seed_dir("/var/log", "root", "root", 0o755);
    host.seed_dir("/tmp", "root", "root", 0o1777);
    host
}

/// What an HDP package install leaves behind.
fn hdp_host() -> MockHost {
    let mut host = fresh_host();
    host.seed_dir("/etc/hadoop/conf", "root", "root", 0o755);
    host.seed_file("/etc/hadoop/conf/core-site.xml", "<configuration/>\n");
    for service in ["hdfs", "yarn", "mapreduce"] {
        host.seed_dir(format!("/var/log/hadoop/{}", service), service, "hadoop", 0o755);
    }
    host
}

fn converge(tree: AttributeTree, host: &mut MockHost) -> Report {
    let report = engine::run(tree, host, &BuiltinRenderer, &RunSettings::default()).unwrap();
    assert!(report.is_success(), "run failed: {:?}", report.failure);
    report
}

fn position(mutations: &[String], wanted: &str) -> usize {
    mutations
        .iter()
        .position(|m| m == wanted)
        .unwrap_or_else(|| panic!("`{}` not in {:#?}", wanted, mutations))
}

fn assert_dir(host: &MockHost, path: &str, owner: &str, mode: u32) {
    let entry = host.entry(path).unwrap_or_else(|| panic!("{} missing", path));
    assert_eq!(entry.node, Node::Directory, "{} is not a directory", path);
    assert_eq!(entry.owner, owner, "owner of {}", path);
    assert_eq!(entry.mode, mode, "mode of {}", path);
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn s1_vanilla_install() {
    let mut host = fresh_host();
    converge(attrs(&[("hadoop.distribution", json!("cdh"))]), &mut host);

    assert!(host.installed_packages().contains(&"hadoop-client".to_string()));
    assert!(host.installed_packages().contains(&"hadoop-libhdfs".to_string()));
    assert_dir(&host, "/etc/hadoop/conf.chef", "root", 0o755);
    assert_dir(&host, "/var/log/hadoop-hdfs", "hdfs", 0o775);
    assert_dir(&host, "/var/log/hadoop-yarn", "yarn", 0o775);
    assert_dir(&host, "/var/log/hadoop-mapreduce", "mapred", 0o775);
    assert_eq!(
        host.selected_alternative("hadoop-conf"),
        Some(PathBuf::from("/etc/hadoop/conf.chef"))
    );
    assert_eq!(
        host.link_target(Path::new("/etc/hadoop/conf")).unwrap(),
        Some(PathBuf::from("/etc/alternatives/hadoop-conf"))
    );
    assert!(host.resolves_to_dir(Path::new("/etc/hadoop/conf")).unwrap());
}

#[test]
fn s1_conf_files_rendered() {
    let mut host = fresh_host();
    converge(AttributeTree::new(), &mut host);

    let env = host.file_text("/etc/hadoop/conf.chef/hadoop-env.sh").unwrap();
    assert!(env.contains("export HADOOP_LOG_DIR=/var/log/hadoop-hdfs"));
    let defaults = host.file_text("/etc/default/hadoop").unwrap();
    assert!(defaults.contains("export HADOOP_CONF_DIR=/etc/hadoop/conf"));
    assert_eq!(host.entry("/etc/default/hadoop").unwrap().mode, 0o755);
    assert_eq!(host.entry("/etc/hadoop/conf.chef/core-site.xml").unwrap().mode, 0o644);
}

#[test]
fn s2_custom_hdfs_log_dir() {
    let mut host = fresh_host();
    host.seed_dir("/var/log/hadoop-hdfs", "hdfs", "hdfs", 0o755);
    host.seed_file("/var/log/hadoop-hdfs/old.log", "stale\n");
    converge(
        attrs(&[("hadoop.hadoop_env.hadoop_log_dir", json!("/data/log/hadoop-hdfs"))]),
        &mut host,
    );

    assert_dir(&host, "/data/log/hadoop-hdfs", "hdfs", 0o775);
    assert_eq!(
        host.link_target(Path::new("/var/log/hadoop-hdfs")).unwrap(),
        Some(PathBuf::from("/data/log/hadoop-hdfs"))
    );
    assert!(host.entry("/var/log/hadoop-hdfs/old.log").is_none());

    let m = host.mutations();
    assert!(position(m, "mkdir /data/log/hadoop-hdfs") < position(m, "rm -rf /var/log/hadoop-hdfs"));
    assert!(
        position(m, "rm -rf /var/log/hadoop-hdfs")
            < position(m, "ln -s /data/log/hadoop-hdfs /var/log/hadoop-hdfs")
    );

    let env = host.file_text("/etc/hadoop/conf.chef/hadoop-env.sh").unwrap();
    assert!(env.contains("export HADOOP_LOG_DIR=/data/log/hadoop-hdfs"));
}

#[test]
fn s2_stale_symlink_replaced() {
    let mut host = fresh_host();
    host.seed_dir("/old/logs", "hdfs", "hdfs", 0o775);
    host.seed_symlink("/var/log/hadoop-hdfs", "/old/logs");
    converge(
        attrs(&[("hadoop.hadoop_env.hadoop_log_dir", json!("/data/log/hadoop-hdfs"))]),
        &mut host,
    );
    assert_eq!(
        host.link_target(Path::new("/var/log/hadoop-hdfs")).unwrap(),
        Some(PathBuf::from("/data/log/hadoop-hdfs"))
    );
    assert!(host.entry("/old/logs").is_some());
}

#[test]
fn s2_moving_back_to_canonical() {
    let mut host = fresh_host();
    let relocated = attrs(&[("hadoop.hadoop_env.hadoop_log_dir", json!("/data/log/hadoop-hdfs"))]);
    converge(relocated, &mut host);
    converge(AttributeTree::new(), &mut host);

    assert_dir(&host, "/var/log/hadoop-hdfs", "hdfs", 0o775);
    assert!(host.entry("/data/log/hadoop-hdfs").is_some());
}

#[test]
fn nested_log_dir_is_rejected_before_any_change() {
    let mut host = fresh_host();
    host.seed_dir("/var/log/hadoop-hdfs", "hdfs", "hdfs", 0o775);
    host.seed_file("/var/log/hadoop-hdfs/namenode.log", "keep\n");
    let tree = attrs(&[("hadoop.hadoop_env.hadoop_log_dir", json!("/var/log/hadoop-hdfs/custom"))]);

    let err = engine::run(tree, &mut host, &BuiltinRenderer, &RunSettings::default()).unwrap_err();
    match err {
        crate::error::Error::Config { path, reason } => {
            assert_eq!(path, "hadoop.hadoop_env.hadoop_log_dir");
            assert!(reason.contains("inside /var/log/hadoop-hdfs"), "{}", reason);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(host.mutations().is_empty());
    assert_eq!(host.entry_kind(Path::new("/var/log/hadoop-hdfs")).unwrap(), EntryKind::Directory);
    assert_eq!(host.file_text("/var/log/hadoop-hdfs/namenode.log").as_deref(), Some("keep\n"));
}

#[test]
fn s3_hdp_variant() {
    let mut host = hdp_host();
    converge(hdp(&[]), &mut host);

    assert!(host
        .installed_packages()
        .contains(&"hadoop_2_2_4_2-client".to_string()));
    assert!(host.entry("/etc/hadoop/conf/core-site.xml").is_none());

    let m = host.mutations();
    assert!(
        position(m, "rm -rf /etc/hadoop/conf")
            < position(m, "alternatives install hadoop-conf /etc/hadoop/conf.chef")
    );
    assert_eq!(host.entry_kind(Path::new("/etc/hadoop/conf")).unwrap(), EntryKind::Symlink);

    for service in ["hdfs", "yarn", "mapreduce"] {
        let path = format!("/var/log/hadoop/{}", service);
        assert_eq!(host.entry_kind(Path::new(&path)).unwrap(), EntryKind::Directory);
        // Left exactly as the packages shipped it.
        assert_dir(&host, &path, service, 0o755);
    }

    let defaults = host.file_text("/etc/default/hadoop").unwrap();
    assert!(defaults.contains("/usr/hdp/current/hadoop/libexec"));
}

#[test]
fn s3_hdp_without_log_dirs_creates_none() {
    let mut host = fresh_host();
    host.seed_dir("/etc/hadoop/conf", "root", "root", 0o755);
    converge(hdp(&[]), &mut host);
    assert_eq!(host.entry_kind(Path::new("/var/log/hadoop/hdfs")).unwrap(), EntryKind::Missing);
}

#[test]
fn s4_hdp_custom_log_dir() {
    let mut host = hdp_host();
    converge(
        hdp(&[("hadoop.hadoop_env.hadoop_log_dir", json!("/data/logs/hdfs"))]),
        &mut host,
    );

    assert_dir(&host, "/data/logs/hdfs", "hdfs", 0o775);
    assert_eq!(
        host.link_target(Path::new("/var/log/hadoop/hdfs")).unwrap(),
        Some(PathBuf::from("/data/logs/hdfs"))
    );
    assert_eq!(
        host.entry_kind(Path::new("/var/log/hadoop/yarn")).unwrap(),
        EntryKind::Directory
    );
}

#[test]
fn s5_attribute_injection_into_xml() {
    let mut host = fresh_host();
    converge(
        attrs(&[(r#"hadoop.hdfs_site."dfs.datanode.max.transfer.threads""#, json!("4096"))]),
        &mut host,
    );
    let xml = host.file_text("/etc/hadoop/conf.chef/hdfs-site.xml").unwrap();
    assert!(xml.contains("<configuration>"));
    assert!(xml.contains(
        "  <property>\n    <name>dfs.datanode.max.transfer.threads</name>\n    <value>4096</value>\n  </property>\n"
    ));
}

#[test]
fn s6_limits_and_cleanup() {
    let mut host = fresh_host();
    host.seed_file("/etc/security/limits.d/mapreduce.conf", "mapred - nofile 1024\n");
    host.seed_file("/etc/security/limits.d/hdfs.conf", "# local\nhdfs - nofile 1024\n");
    converge(AttributeTree::new(), &mut host);

    assert!(host.entry("/etc/security/limits.d/mapreduce.conf").is_none());
    assert_eq!(
        host.file_text("/etc/security/limits.d/hdfs.conf").unwrap(),
        "# local\nhdfs - nofile 32768\nhdfs - nproc 65536\n"
    );
    for user in ["mapred", "yarn"] {
        let text = host
            .file_text(format!("/etc/security/limits.d/{}.conf", user))
            .unwrap();
        assert_eq!(
            text,
            format!("{user} - nofile 32768\n{user} - nproc 65536\n", user = user)
        );
    }
}

#[test]
fn tmp_dirs_are_sticky() {
    let mut host = fresh_host();
    converge(AttributeTree::new(), &mut host);
    for user in ["hdfs", "yarn", "mapreduce"] {
        assert_dir(&host, &format!("/tmp/hadoop-{}", user), "root", 0o1777);
    }
}

// ---------------------------------------------------------------------------
// Failure and dry run
// ---------------------------------------------------------------------------

#[test]
fn failed_package_halts_before_files() {
    let mut host = fresh_host();
    host.make_package_unavailable("hadoop-libhdfs");
    let report = engine::run(AttributeTree::new(), &mut host, &BuiltinRenderer, &RunSettings::default()).unwrap();

    assert_eq!(report.exit_code(), 1);
    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.resource, ResourceId::new(ResourceKind::Package, "hadoop-libhdfs"));
    assert_eq!(host.mutations(), &["install hadoop-client".to_string()]);
    assert!(host.entry("/etc/hadoop/conf.chef").is_none());
}

#[test]
fn rerun_after_failure_resumes() {
    let mut host = fresh_host();
    host.make_package_unavailable("hadoop-libhdfs");
    let report = engine::run(AttributeTree::new(), &mut host, &BuiltinRenderer, &RunSettings::default()).unwrap();
    assert!(!report.is_success());

    // The package becomes installable out of band.
    host.seed_package("hadoop-libhdfs");
    let report = converge(AttributeTree::new(), &mut host);
    for package in ["hadoop-client", "hadoop-libhdfs"] {
        let id = ResourceId::new(ResourceKind::Package, package);
        assert_eq!(report.outcome(&id).unwrap().state, ResourceState::UpToDate);
    }
    assert!(host.entry("/etc/hadoop/conf.chef/core-site.xml").is_some());
}

#[test]
fn dry_run_reports_without_mutating() {
    let mut host = fresh_host();
    let settings = RunSettings {
        dry_run: true,
        ..RunSettings::default()
    };
    let report = engine::run(AttributeTree::new(), &mut host, &BuiltinRenderer, &settings).unwrap();
    assert!(report.is_success());
    assert!(report.applied_count() > 0);
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.state == ResourceState::WouldApply || o.state == ResourceState::UpToDate));
    assert!(host.mutations().is_empty());
}

// ---------------------------------------------------------------------------
// Universal properties
// ---------------------------------------------------------------------------

type HostFactory = fn() -> MockHost;

fn property_inputs() -> Vec<(AttributeTree, HostFactory)> {
    vec![
        (AttributeTree::new(), fresh_host as HostFactory),
        (
            attrs(&[
                ("hadoop.hadoop_env.hadoop_log_dir", json!("/data/log/hadoop-hdfs")),
                ("hadoop.yarn_env.yarn_log_dir", json!("/data/log/hadoop-yarn")),
            ]),
            fresh_host as HostFactory,
        ),
        (hdp(&[]), hdp_host as HostFactory),
        (
            hdp(&[("hadoop.mapred_env.mapred_log_dir", json!("/data/logs/mr"))]),
            hdp_host as HostFactory,
        ),
    ]
}

#[test]
fn second_run_applies_nothing() {
    for (tree, make_host) in property_inputs() {
        let mut host = make_host();
        converge(tree.clone(), &mut host);
        let after_first = host.entries().clone();
        host.clear_mutations();

        let report = converge(tree, &mut host);
        assert_eq!(report.applied_count(), 0, "{}", report.summary());
        assert!(host.mutations().is_empty(), "{:#?}", host.mutations());
        assert_eq!(host.entries(), &after_first);
    }
}

#[test]
fn equal_inputs_give_equal_hosts() {
    for (tree, make_host) in property_inputs() {
        let mut a = make_host();
        let mut b = make_host();
        converge(tree.clone(), &mut a);
        converge(tree, &mut b);
        assert_eq!(a.entries(), b.entries());
        assert_eq!(a.mutations(), b.mutations());
    }
}

#[test]
fn declaration_order_is_stable() {
    for (tree, _) in property_inputs() {
        let first = engine::prepare(tree.clone(), &BuiltinRenderer).unwrap();
        let second = engine::prepare(tree, &BuiltinRenderer).unwrap();
        assert_eq!(first.graph.ids(), second.graph.ids());
    }
}

#[test]
fn unrelated_paths_untouched() {
    for (tree, make_host) in property_inputs() {
        let mut host = make_host();
        host.seed_file("/etc/hosts", "127.0.0.1 localhost\n");
        host.seed_file("/var/log/messages", "boot\n");
        host.seed_file("/etc/security/limits.conf", "* soft core 0\n");
        converge(tree, &mut host);

        assert_eq!(host.file_text("/etc/hosts").unwrap(), "127.0.0.1 localhost\n");
        assert_eq!(host.file_text("/var/log/messages").unwrap(), "boot\n");
        assert_eq!(host.file_text("/etc/security/limits.conf").unwrap(), "* soft core 0\n");
        for path in ["/etc/hosts", "/var/log/messages", "/etc/security/limits.conf"] {
            assert!(
                host.mutations().iter().all(|m| !m.ends_with(path)),
                "{} was touched",
                path
            );
        }
    }
}

#[test]
fn canonical_log_dirs_are_safe() {
    for (tree, make_host) in property_inputs() {
        let prepared = engine::prepare(tree.clone(), &BuiltinRenderer).unwrap();
        let mut host = make_host();
        converge(tree, &mut host);

        for service in Service::ALL {
            let canonical = prepared.profile.canonical_log_dir(service);
            let desired =
                super::log_dirs::desired_log_dir(&prepared.attrs, &prepared.profile, service).unwrap();
            if &desired == canonical && !prepared.profile.manage_default_log_dirs {
                continue;
            }
            match host.entry_kind(canonical).unwrap() {
                EntryKind::Directory => assert_eq!(&desired, canonical),
                EntryKind::Symlink => {
                    assert_eq!(host.link_target(canonical).unwrap(), Some(desired.clone()));
                }
                other => panic!("{} is {:?}", canonical.display(), other),
            }
            assert!(host.resolves_to_dir(&desired).unwrap());
        }
    }
}
