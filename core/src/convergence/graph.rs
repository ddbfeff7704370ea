//! The ordered set of declared resources.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::types::resource::{Resource, ResourceId};

/// Resources in declaration order, unique by id.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    resources: Vec<Resource>,
    index: HashMap<ResourceId, usize>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resource. Structural problems and duplicate ids are
    /// configuration errors.
    pub fn add(&mut self, resource: Resource) -> Result<()> {
        resource.validate()?;
        let id = resource.id();
        if self.index.contains_key(&id) {
            return Err(Error::config(id.to_string(), "declared more than once"));
        }
        self.index.insert(id, self.resources.len());
        self.resources.push(resource);
        Ok(())
    }

    /// Whole-graph checks: every notification names a resource declared
    /// after its sender, so declaration order plus notifications stays a DAG.
    pub fn validate(&self) -> Result<()> {
        for (at, resource) in self.resources.iter().enumerate() {
            let id = resource.id();
            for n in &resource.notifies {
                if n.target == id {
                    return Err(Error::config(id.to_string(), "resource notifies itself"));
                }
                match self.position(&n.target) {
                    None => {
                        return Err(Error::config(
                            id.to_string(),
                            format!("notifies undeclared resource {}", n.target),
                        ))
                    }
                    Some(target) if target <= at => {
                        return Err(Error::config(
                            id.to_string(),
                            format!("notifies {}, which is declared before it", n.target),
                        ))
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    pub fn from_resources(resources: Vec<Resource>) -> Result<Self> {
        let mut graph = ResourceGraph::new();
        for r in resources {
            graph.add(r)?;
        }
        graph.validate()?;
        Ok(graph)
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.index.get(id).map(|&i| &self.resources[i])
    }

    pub fn position(&self, id: &ResourceId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn ids(&self) -> Vec<ResourceId> {
        self.resources.iter().map(|r| r.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::resource::{ResourceKind, Timing};

    #[test]
    fn keeps_declaration_order() {
        let graph = ResourceGraph::from_resources(vec![
            Resource::package("hadoop-client"),
            Resource::directory("/etc/hadoop/conf.chef"),
            Resource::package("hadoop-libhdfs"),
        ])
        .unwrap();
        let names: Vec<String> = graph.resources().iter().map(|r| r.name.clone()).collect();
        assert_eq!(names, vec!["hadoop-client", "/etc/hadoop/conf.chef", "hadoop-libhdfs"]);
        assert_eq!(
            graph.position(&ResourceId::new(ResourceKind::Package, "hadoop-libhdfs")),
            Some(2)
        );
    }

    #[test]
    fn duplicate_ids_rejected() {
        let err = ResourceGraph::from_resources(vec![
            Resource::package("hadoop-client"),
            Resource::package("hadoop-client"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("declared more than once"));
    }

    #[test]
    fn same_name_different_kind_is_fine() {
        let graph = ResourceGraph::from_resources(vec![
            Resource::delete_link("/var/log/hadoop-hdfs"),
            Resource::directory("/var/log/hadoop-hdfs"),
        ]);
        assert!(graph.is_ok());
    }

    #[test]
    fn notification_target_must_exist() {
        let alt = ResourceId::new(ResourceKind::Alternatives, "hadoop-conf");
        let err = ResourceGraph::from_resources(vec![
            Resource::directory("/etc/hadoop/conf.chef").notifies(alt, Timing::Delayed)
        ])
        .unwrap_err();
        match err {
            Error::Config { reason, .. } => assert!(reason.contains("alternatives[hadoop-conf]")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn forward_notifications_allowed() {
        let alt = ResourceId::new(ResourceKind::Alternatives, "hadoop-conf");
        let graph = ResourceGraph::from_resources(vec![
            Resource::directory("/etc/hadoop/conf.chef").notifies(alt, Timing::Delayed),
            Resource::alternatives("hadoop-conf", "/etc/hadoop/conf", "/etc/hadoop/conf.chef", 50),
        ]);
        assert!(graph.is_ok());
    }

    #[test]
    fn backward_notifications_rejected() {
        let pkg = ResourceId::new(ResourceKind::Package, "hadoop-client");
        let err = ResourceGraph::from_resources(vec![
            Resource::package("hadoop-client"),
            Resource::directory("/etc/hadoop/conf.chef").notifies(pkg, Timing::Delayed),
        ])
        .unwrap_err();
        match err {
            Error::Config { path, reason } => {
                assert_eq!(path, "directory[/etc/hadoop/conf.chef]");
                assert!(reason.contains("declared before it"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn self_notification_rejected() {
        let id = ResourceId::new(ResourceKind::Package, "hadoop-client");
        let r = Resource::package("hadoop-client").notifies(id, Timing::Immediate);
        assert!(ResourceGraph::from_resources(vec![r]).is_err());
    }
}
