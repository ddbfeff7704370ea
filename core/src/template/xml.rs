//! Hadoop XML formats: `*-site.xml` and `fair-scheduler.xml`.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde_json::Value;

use super::{flatten, GENERATED_NOTICE};
use crate::attributes::tree::kind_name;
use crate::error::{Error, Result};

const XML_PROLOG: &str = "<?xml version=\"1.0\"?>\n";

/// `<configuration>` with one `<property>` per key, in key order. Keys whose
/// value is `None` are left out.
pub fn render_site(props: &BTreeMap<String, Option<String>>) -> String {
    let mut out = String::new();
    out.push_str(XML_PROLOG);
    out.push_str("<?xml-stylesheet type=\"text/xsl\" href=\"configuration.xsl\"?>\n");
    let _ = writeln!(out, "<!-- {} -->", GENERATED_NOTICE);
    out.push_str("<configuration>\n");
    for (name, value) in props {
        let Some(value) = value else { continue };
        out.push_str("  <property>\n");
        let _ = writeln!(out, "    <name>{}</name>", escape(name));
        let _ = writeln!(out, "    <value>{}</value>", escape(value));
        out.push_str("  </property>\n");
    }
    out.push_str("</configuration>\n");
    out
}

/// `<allocations>` built from `defaults` (top-level elements) and `queues`
/// (one `<queue name="...">` block each).
pub fn render_fair_scheduler(source: &str, variables: &Value) -> Result<String> {
    let defaults = match variables.get("defaults") {
        Some(v) => flatten(source, v)?,
        None => BTreeMap::new(),
    };

    let mut queues: BTreeMap<String, BTreeMap<String, Option<String>>> = BTreeMap::new();
    match variables.get("queues") {
        None | Some(Value::Null) => {}
        Some(Value::Object(map)) => {
            for (queue, settings) in map {
                queues.insert(queue.clone(), flatten(source, settings)?);
            }
        }
        Some(other) => {
            return Err(Error::config(
                format!("{}:queues", source),
                format!("expected a mapping, found {}", kind_name(other)),
            ))
        }
    }

    let mut out = String::new();
    out.push_str(XML_PROLOG);
    let _ = writeln!(out, "<!-- {} -->", GENERATED_NOTICE);
    out.push_str("<allocations>\n");
    for (name, value) in &defaults {
        if let Some(value) = value {
            write_element(&mut out, source, 1, name, value)?;
        }
    }
    for (queue, settings) in &queues {
        let _ = writeln!(out, "  <queue name=\"{}\">", escape(queue));
        for (name, value) in settings {
            if let Some(value) = value {
                write_element(&mut out, source, 2, name, value)?;
            }
        }
        out.push_str("  </queue>\n");
    }
    out.push_str("</allocations>\n");
    Ok(out)
}

fn write_element(out: &mut String, source: &str, depth: usize, name: &str, value: &str) -> Result<()> {
    if !is_element_name(name) {
        return Err(Error::template(source, name, "is not a valid XML element name"));
    }
    let indent = "  ".repeat(depth);
    let _ = writeln!(out, "{}<{}>{}</{}>", indent, name, escape(value), name);
    Ok(())
}

/// ASCII subset of the XML `Name` production, without namespaces.
fn is_element_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Escape the five XML special characters.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
