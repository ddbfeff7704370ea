//! Loading attribute documents from YAML/JSON files and `--set` strings.
//!
//! A node attribute file has up to three top-level mappings, one per layer:
//!
//! ```yaml
//! default:
//!   hadoop:
//!     hdfs_site:
//!       dfs.datanode.max.transfer.threads: "4096"
//! override:
//!   hadoop:
//!     distribution: hdp
//! automatic:
//!   fqdn: nn1.example.com
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::path::AttrPath;
use super::tree::{AttributeTree, Layer};
use crate::error::{Error, Result};


/// Top-level shape of a node attribute file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(default, rename = "override", skip_serializing_if = "Option::is_none")]
    pub override_: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automatic: Option<Value>,
}

impl NodeAttributes {
    /// Merge every present layer into `tree`.
    pub fn merge_into(&self, tree: &mut AttributeTree) -> Result<()> {
        let layers = [
            (Layer::Default, &self.default),
            (Layer::Override, &self.override_),
            (Layer::Automatic, &self.automatic),
        ];
        for (layer, doc) in layers {
            if let Some(doc) = doc {
                tree.merge_layer(layer, doc)?;
            }
        }
        Ok(())
    }
}


/// Load a node attribute file. YAML is a superset of JSON, so both work.
pub fn load(path: &Path) -> Result<NodeAttributes> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::config(path.display().to_string(), format!("cannot read: {}", e))
    })?;
    parse(&content).map_err(|e| match e {
        Error::Config { reason, .. } => Error::config(path.display().to_string(), reason),
        other => other,
    })
}


/// Parse a node attribute document.
pub fn parse(content: &str) -> Result<NodeAttributes> {
    if content.trim().is_empty() {
        return Ok(NodeAttributes::default());
    }
    serde_yaml::from_str(content).map_err(|e| Error::config("<attributes>", e.to_string()))
}


/// A single `[LAYER:]PATH=VALUE` assignment from the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub layer: Layer,
    pub path: AttrPath,
    pub value: Value,
}

impl Assignment {
    /// Parse `[LAYER:]PATH=VALUE`. The layer defaults to `override`. VALUE
    /// is read as a YAML scalar, so `4096` is a number and `"4096"` a string.
    pub fn parse(input: &str) -> Result<Assignment> {
        let (lhs, raw_value) = input
            .split_once('=')
            .ok_or_else(|| Error::config(input, "expected [LAYER:]PATH=VALUE"))?;

        let (layer, raw_path) = match lhs.split_once(':') {
            Some((prefix, rest)) => match prefix.parse::<Layer>() {
                Ok(layer) => (layer, rest),
                Err(_) => (Layer::Override, lhs),
            },
            None => (Layer::Override, lhs),
        };
        let path = AttrPath::parse(raw_path).map_err(|e| Error::config(input, e))?;
        let value = serde_yaml::from_str::<Value>(raw_value)
            .unwrap_or_else(|_| Value::String(raw_value.to_string()));

        Ok(Assignment { layer, path, value })
    }

    pub fn apply(&self, tree: &mut AttributeTree) -> Result<()> {
        tree.set_path(self.layer, &self.path, self.value.clone())
    }
}
