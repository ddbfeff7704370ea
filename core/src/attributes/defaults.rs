//! Built-in default attributes for the `hadoop` namespace.
//!
//! Applied underneath whatever the caller already put in the default layer,
//! and always before the tree is frozen.

use serde_json::{json, Value};

use super::tree::{AttributeTree, Layer};
use crate::error::Result;

/// Populate the default layer. Keys the caller already set in the default
/// layer are kept.
pub fn apply(tree: &mut AttributeTree) -> Result<()> {
    let fqdn = node_fqdn(tree)?;
    tree.underlay(Layer::Default, &default_attributes(&fqdn))
}

/// The host name used for default cluster addresses.
///
/// `automatic.fqdn`, else `hostname` + `domain`, else `localhost`.
pub fn node_fqdn(tree: &AttributeTree) -> Result<String> {
    if let Some(fqdn) = tree.get_str("fqdn")? {
        return Ok(fqdn);
    }
    let hostname = tree.get_str("hostname")?;
    let domain = tree.get_str("domain")?;
    Ok(match (hostname, domain) {
        (Some(h), Some(d)) => format!("{}.{}", h, d),
        (Some(h), None) => h,
        _ => "localhost".to_string(),
    })
}

fn default_attributes(fqdn: &str) -> Value {
    json!({
        "hadoop": {
            "distribution": "cdh",
            "distribution_version": "5",
            "conf_dir": "conf.chef",
            "core_site": {
                "fs.defaultFS": format!("hdfs://{}", fqdn),
                "hadoop.tmp.dir": "/tmp/hadoop-${user}"
            },
            "hdfs_site": {
                "dfs.datanode.max.transfer.threads": "4096"
            },
            "mapred_site": {
                "mapreduce.framework.name": "yarn"
            },
            "yarn_site": {
                "yarn.resourcemanager.hostname": fqdn,
                "yarn.nodemanager.aux-services": "mapreduce_shuffle",
                "yarn.nodemanager.aux-services.mapreduce_shuffle.class": "org.apache.hadoop.mapred.ShuffleHandler"
            },
            "capacity_scheduler": {
                "yarn.scheduler.capacity.maximum-applications": "10000",
                "yarn.scheduler.capacity.maximum-am-resource-percent": "0.1",
                "yarn.scheduler.capacity.root.queues": "default",
                "yarn.scheduler.capacity.root.default.capacity": "100",
                "yarn.scheduler.capacity.root.default.maximum-capacity": "100",
                "yarn.scheduler.capacity.root.default.state": "RUNNING"
            },
            "fair_scheduler": {
                "defaults": {}
            },
            "hadoop_policy": {
                "security.client.protocol.acl": "*",
                "security.client.datanode.protocol.acl": "*",
                "security.datanode.protocol.acl": "*"
            },
            "hadoop_metrics": {
                "dfs.class": "org.apache.hadoop.metrics.spi.NullContextWithUpdateThread",
                "dfs.period": "60",
                "jvm.class": "org.apache.hadoop.metrics.spi.NullContextWithUpdateThread",
                "jvm.period": "60"
            },
            "container_executor": {
                "yarn.nodemanager.linux-container-executor.group": "yarn",
                "min.user.id": "1000",
                "allowed.system.users": null,
                "banned.users": "hdfs,yarn,mapred,bin"
            },
            "hadoop_env": {
                "hadoop_opts": "-Djava.net.preferIPv4Stack=true"
            },
            "mapred_env": {},
            "yarn_env": {},
            "log4j": {
                "hadoop.root.logger": "INFO,console",
                "hadoop.log.dir": ".",
                "hadoop.log.file": "hadoop.log",
                "log4j.rootLogger": "${hadoop.root.logger}, EventCounter",
                "log4j.threshold": "ALL",
                "log4j.appender.console": "org.apache.log4j.ConsoleAppender",
                "log4j.appender.console.target": "System.err",
                "log4j.appender.console.layout": "org.apache.log4j.PatternLayout",
                "log4j.appender.console.layout.ConversionPattern": "%d{yy/MM/dd HH:mm:ss} %p %c{2}: %m%n",
                "log4j.appender.EventCounter": "org.apache.hadoop.log.metrics.EventCounter"
            },
            "limits": {
                "nofile": 32768,
                "nproc": 65536
            }
        }
    })
}
