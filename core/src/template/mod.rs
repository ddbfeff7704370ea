//! Template rendering.
//!
//! A template is a pure function from a variables snapshot to bytes. The
//! engine only knows a template by its source name; the bodies live behind
//! the `Renderer` trait so they can be swapped without touching the engine.
//! `BuiltinRenderer` supplies the stock Hadoop formats.

pub mod properties;
pub mod shell;
pub mod xml;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::attributes::tree::kind_name;
use crate::error::{Error, Result};
use properties::Dialect;

/// Header line stamped into every generated file.
pub const GENERATED_NOTICE: &str = "Generated by hconverge. Local changes will be overwritten.";

pub const SITE_XML: &str = "generic-site.xml";
pub const FAIR_SCHEDULER_XML: &str = "fair-scheduler.xml";
pub const ENV_SH: &str = "generic-env.sh";
pub const DEFAULT_ENV_SH: &str = "default-env.sh";
pub const PROPERTIES: &str = "generic.properties";
pub const CONTAINER_EXECUTOR_CFG: &str = "container-executor.cfg";

/// Turns a template source name and its variables into file content.
pub trait Renderer {
    /// Render `source` with `variables`. Must be deterministic.
    fn render(&self, source: &str, variables: &Value) -> Result<Vec<u8>>;

    /// Variables that must be present for `source` to render.
    fn required_variables(&self, _source: &str) -> &'static [&'static str] {
        &[]
    }

    /// Declaration-time check: the source is known and every required
    /// variable is set.
    fn validate(&self, source: &str, variables: &Value) -> Result<()> {
        for name in self.required_variables(source) {
            let present = variables
                .get(*name)
                .map(|v| !v.is_null())
                .unwrap_or(false);
            if !present {
                return Err(Error::template(source, name, "is required but not set"));
            }
        }
        self.render(source, variables).map(|_| ())
    }
}


/// The stock Hadoop configuration formats.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinRenderer;

impl Renderer for BuiltinRenderer {
    fn render(&self, source: &str, variables: &Value) -> Result<Vec<u8>> {
        let text = match source {
            SITE_XML => xml::render_site(&flatten(source, variables)?),
            FAIR_SCHEDULER_XML => xml::render_fair_scheduler(source, variables)?,
            ENV_SH | DEFAULT_ENV_SH => shell::render_env(&flatten(source, variables)?),
            PROPERTIES => properties::render(source, &flatten(source, variables)?, Dialect::Java)?,
            CONTAINER_EXECUTOR_CFG => {
                properties::render(source, &flatten(source, variables)?, Dialect::ContainerExecutor)?
            }
            other => return Err(Error::config(other, "unknown template source")),
        };
        Ok(text.into_bytes())
    }

    fn required_variables(&self, source: &str) -> &'static [&'static str] {
        match source {
            DEFAULT_ENV_SH => &["hadoop_conf_dir", "hadoop_log_dir", "hadoop_pid_dir"],
            _ => &[],
        }
    }
}


/// Flatten a variables mapping into ordered `key -> value` pairs.
///
/// Nested mappings join their keys with `.`; sequences of scalars join with
/// `,`; `null` maps to `None` so formats can leave the key out.
pub fn flatten(source: &str, variables: &Value) -> Result<BTreeMap<String, Option<String>>> {
    let mut out = BTreeMap::new();
    match variables {
        Value::Object(map) => {
            for (key, value) in map {
                flatten_into(source, key, value, &mut out)?;
            }
            Ok(out)
        }
        Value::Null => Ok(out),
        other => Err(Error::config(
            source,
            format!("template variables must be a mapping, found {}", kind_name(other)),
        )),
    }
}

fn flatten_into(
    source: &str,
    key: &str,
    value: &Value,
    out: &mut BTreeMap<String, Option<String>>,
) -> Result<()> {
    match value {
        Value::Object(map) => {
            for (child, v) in map {
                flatten_into(source, &format!("{}.{}", key, child), v, out)?;
            }
        }
        Value::Array(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                match scalar_text(item) {
                    Some(text) => parts.push(text),
                    None => {
                        return Err(Error::config(
                            format!("{}:{}", source, key),
                            format!("sequence items must be scalars, found {}", kind_name(item)),
                        ))
                    }
                }
            }
            out.insert(key.to_string(), Some(parts.join(",")));
        }
        scalar => {
            out.insert(key.to_string(), scalar_text(scalar));
        }
    }
    Ok(())
}

/// Text of a scalar; `None` for null and for compound values.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
