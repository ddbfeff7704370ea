//! Layered attribute tree.
//!
//! Each precedence layer is an independent nested mapping backed by
//! `serde_json::Value`. Reads overlay the layers lazily: the effective value
//! at a path is the fold of every layer's value there, lowest precedence
//! first, with mappings merged and everything else replaced.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::merge::{deep_merge, overlay_all};
use super::path::AttrPath;
use crate::error::{Error, Result};


/// Attribute precedence layers, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Default,
    Override,
    Automatic,
}

impl Layer {
    /// All layers in ascending precedence.
    pub const ALL: [Layer; 3] = [Layer::Default, Layer::Override, Layer::Automatic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Default => "default",
            Layer::Override => "override",
            Layer::Automatic => "automatic",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "default" => Ok(Layer::Default),
            "override" => Ok(Layer::Override),
            "automatic" => Ok(Layer::Automatic),
            other => Err(format!("unknown attribute layer '{}'", other)),
        }
    }
}


/// Hierarchical key/value store merged from three precedence layers.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeTree {
    layers: [Value; 3],
    frozen: bool,
}

impl Default for AttributeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeTree {
    /// Create an empty, writable tree.
    pub fn new() -> Self {
        AttributeTree {
            layers: [
                Value::Object(Map::new()),
                Value::Object(Map::new()),
                Value::Object(Map::new()),
            ],
            frozen: false,
        }
    }

    /// SET a value at a dotted path in one layer.
    pub fn set(&mut self, layer: Layer, path: &str, value: Value) -> Result<()> {
        let parsed = AttrPath::parse(path).map_err(|e| Error::config(path, e))?;
        self.set_path(layer, &parsed, value)
    }

    /// SET a value at a parsed path in one layer. Intermediate mappings
    /// are created as needed.
    pub fn set_path(&mut self, layer: Layer, path: &AttrPath, value: Value) -> Result<()> {
        self.ensure_writable(&path.to_dotted())?;

        let (last, parents) = match path.segments().split_last() {
            Some(split) => split,
            None => return Err(Error::config("", "empty path")),
        };
        let mut node = &mut self.layers[layer.index()];
        for seg in parents {
            let map = match node {
                Value::Object(map) => map,
                _ => {
                    return Err(Error::config(
                        path.to_dotted(),
                        format!("cannot descend into non-mapping value at '{}'", seg),
                    ))
                }
            };
            node = map
                .entry(seg.clone())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        match node {
            Value::Object(map) => {
                map.insert(last.clone(), value);
                Ok(())
            }
            _ => Err(Error::config(
                path.to_dotted(),
                "parent of the target is not a mapping",
            )),
        }
    }

    /// Deep-merge a whole document into one layer (used when loading files).
    pub fn merge_layer(&mut self, layer: Layer, document: &Value) -> Result<()> {
        self.ensure_writable(layer.as_str())?;
        if !document.is_object() {
            return Err(Error::config(
                layer.as_str(),
                "attribute layer must be a mapping",
            ));
        }
        deep_merge(&mut self.layers[layer.index()], document);
        Ok(())
    }

    /// Merge a document *underneath* one layer: keys already present in the
    /// layer keep their values.
    pub fn underlay(&mut self, layer: Layer, document: &Value) -> Result<()> {
        self.ensure_writable(layer.as_str())?;
        if !document.is_object() {
            return Err(Error::config(
                layer.as_str(),
                "attribute layer must be a mapping",
            ));
        }
        let mut merged = document.clone();
        deep_merge(&mut merged, &self.layers[layer.index()]);
        self.layers[layer.index()] = merged;
        Ok(())
    }

    /// GET the effective value at a dotted path, or `None` when unset.
    ///
    /// Malformed paths read as unset.
    pub fn get(&self, path: &str) -> Option<Value> {
        match AttrPath::parse(path) {
            Ok(parsed) => self.lookup(&parsed),
            Err(e) => {
                log::debug!("attribute read with malformed path '{}': {}", path, e);
                None
            }
        }
    }

    /// GET the effective value at a parsed path.
    pub fn lookup(&self, path: &AttrPath) -> Option<Value> {
        overlay_all(
            self.layers
                .iter()
                .filter_map(|layer| value_at(layer, path.segments())),
        )
    }

    /// Snapshot of the effective mapping at `path` as a new, frozen tree.
    ///
    /// The snapshot holds the merged view in its default layer. An unset or
    /// non-mapping path yields an empty tree.
    pub fn subtree(&self, path: &str) -> AttributeTree {
        let mut tree = AttributeTree::new();
        if let Some(value @ Value::Object(_)) = self.get(path) {
            tree.layers[Layer::Default.index()] = value;
        }
        tree.frozen = true;
        tree
    }

    /// The fully merged view of all layers.
    pub fn effective(&self) -> Value {
        overlay_all(self.layers.iter()).unwrap_or_else(|| Value::Object(Map::new()))
    }

    /// Reject every write from now on.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Read a scalar as a string. Numbers and booleans are stringified;
    /// mappings and sequences are a configuration error.
    pub fn get_str(&self, path: &str) -> Result<Option<String>> {
        match self.get(path) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(other) => Err(Error::config(
                path,
                format!("expected a scalar, found {}", kind_name(&other)),
            )),
        }
    }

    /// Like `get_str`, with a fallback for unset keys.
    pub fn get_str_or(&self, path: &str, default: &str) -> Result<String> {
        Ok(self.get_str(path)?.unwrap_or_else(|| default.to_string()))
    }

    /// Read an unsigned integer, accepting numeric strings.
    pub fn get_u64(&self, path: &str) -> Result<Option<u64>> {
        match self.get(path) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| Error::config(path, format!("expected an unsigned integer, found {}", n))),
            Some(Value::String(s)) => s
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|_| Error::config(path, format!("expected an unsigned integer, found '{}'", s))),
            Some(other) => Err(Error::config(
                path,
                format!("expected an unsigned integer, found {}", kind_name(&other)),
            )),
        }
    }

    fn ensure_writable(&self, path: &str) -> Result<()> {
        if self.frozen {
            return Err(Error::config(path, "attributes are frozen"));
        }
        Ok(())
    }
}


fn value_at<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut node = root;
    for seg in segments {
        node = node.as_object()?.get(seg)?;
    }
    Some(node)
}

/// Human-readable JSON kind, for error messages.
pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unset_key_reads_none() {
        let tree = AttributeTree::new();
        assert!(tree.get("hadoop.distribution").is_none());
        assert!(tree.get("hadoop..broken").is_none());
        assert_eq!(tree.get_str("hadoop.distribution").unwrap(), None);
    }

    #[test]
    fn higher_layer_scalar_wins() {
        let mut tree = AttributeTree::new();
        tree.set(Layer::Default, "hadoop.distribution", json!("cdh")).unwrap();
        tree.set(Layer::Override, "hadoop.distribution", json!("hdp")).unwrap();
        assert_eq!(tree.get("hadoop.distribution"), Some(json!("hdp")));

        tree.set(Layer::Automatic, "hadoop.distribution", json!("bigtop")).unwrap();
        assert_eq!(tree.get("hadoop.distribution"), Some(json!("bigtop")));
    }

    #[test]
    fn mappings_merge_across_layers() {
        let mut tree = AttributeTree::new();
        tree.set(Layer::Default, r#"hadoop.hdfs_site."dfs.replication""#, json!("3")).unwrap();
        tree.set(Layer::Override, r#"hadoop.hdfs_site."dfs.blocksize""#, json!("256m")).unwrap();
        assert_eq!(
            tree.get("hadoop.hdfs_site"),
            Some(json!({"dfs.replication": "3", "dfs.blocksize": "256m"}))
        );
    }

    #[test]
    fn sequences_replace_across_layers() {
        let mut tree = AttributeTree::new();
        tree.set(Layer::Default, "hadoop.users", json!(["a", "b"])).unwrap();
        tree.set(Layer::Override, "hadoop.users", json!(["c"])).unwrap();
        assert_eq!(tree.get("hadoop.users"), Some(json!(["c"])));
    }

    #[test]
    fn writes_after_freeze_are_rejected() {
        let mut tree = AttributeTree::new();
        tree.freeze();
        let err = tree.set(Layer::Default, "hadoop.x", json!(1)).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(tree.merge_layer(Layer::Default, &json!({})).is_err());
    }

    #[test]
    fn cannot_descend_into_scalar() {
        let mut tree = AttributeTree::new();
        tree.set(Layer::Default, "hadoop.distribution", json!("cdh")).unwrap();
        assert!(tree.set(Layer::Default, "hadoop.distribution.flavor", json!("x")).is_err());
    }

    #[test]
    fn subtree_snapshot_is_independent_and_frozen() {
        let mut tree = AttributeTree::new();
        tree.set(Layer::Default, "hadoop.yarn_env.yarn_log_dir", json!("/var/log/hadoop-yarn")).unwrap();
        let sub = tree.subtree("hadoop.yarn_env");
        tree.set(Layer::Override, "hadoop.yarn_env.yarn_log_dir", json!("/data/yarn")).unwrap();

        assert!(sub.is_frozen());
        assert_eq!(sub.get("yarn_log_dir"), Some(json!("/var/log/hadoop-yarn")));
        assert_eq!(tree.get("hadoop.yarn_env.yarn_log_dir"), Some(json!("/data/yarn")));
    }

    #[test]
    fn subtree_of_unset_is_empty() {
        let tree = AttributeTree::new();
        assert_eq!(tree.subtree("hadoop.nothing").effective(), json!({}));
    }

    #[test]
    fn get_str_rejects_mappings() {
        let mut tree = AttributeTree::new();
        tree.set(Layer::Default, "hadoop.distribution.name", json!("cdh")).unwrap();
        let err = tree.get_str("hadoop.distribution").unwrap_err();
        assert!(err.to_string().contains("expected a scalar"));
    }

    #[test]
    fn get_str_stringifies_numbers_and_bools() {
        let mut tree = AttributeTree::new();
        tree.set(Layer::Default, "a", json!(4096)).unwrap();
        tree.set(Layer::Default, "b", json!(true)).unwrap();
        assert_eq!(tree.get_str("a").unwrap().as_deref(), Some("4096"));
        assert_eq!(tree.get_str("b").unwrap().as_deref(), Some("true"));
    }

    #[test]
    fn get_u64_accepts_numeric_strings() {
        let mut tree = AttributeTree::new();
        tree.set(Layer::Default, "hadoop.limits.nofile", json!("32768")).unwrap();
        tree.set(Layer::Default, "hadoop.limits.nproc", json!(65536)).unwrap();
        tree.set(Layer::Default, "hadoop.limits.bad", json!("lots")).unwrap();
        assert_eq!(tree.get_u64("hadoop.limits.nofile").unwrap(), Some(32768));
        assert_eq!(tree.get_u64("hadoop.limits.nproc").unwrap(), Some(65536));
        assert!(tree.get_u64("hadoop.limits.bad").is_err());
    }

    #[test]
    fn underlay_keeps_existing_keys() {
        let mut tree = AttributeTree::new();
        tree.set(Layer::Default, "hadoop.distribution", json!("hdp")).unwrap();
        tree.underlay(
            Layer::Default,
            &json!({"hadoop": {"distribution": "cdh", "conf_dir": "conf.chef"}}),
        )
        .unwrap();
        assert_eq!(tree.get("hadoop.distribution"), Some(json!("hdp")));
        assert_eq!(tree.get("hadoop.conf_dir"), Some(json!("conf.chef")));
    }

    #[test]
    fn layer_parse_round_trip() {
        for layer in Layer::ALL {
            assert_eq!(layer.as_str().parse::<Layer>().unwrap(), layer);
        }
        assert!("normal".parse::<Layer>().is_err());
    }
}
