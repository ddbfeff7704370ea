//! `key=value` formats: `*.properties` and `container-executor.cfg`.

use std::collections::BTreeMap;
use std::fmt::Write;

use super::GENERATED_NOTICE;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `java.util.Properties`: special characters are backslash-escaped and
    /// `None` values are dropped.
    Java,
    /// `container-executor.cfg`: read literally up to the first `=` on each
    /// line, so nothing can be escaped. `None` values are written as `key=`.
    ContainerExecutor,
}

/// Sorted `key=value` lines in `dialect`.
pub fn render(source: &str, props: &BTreeMap<String, Option<String>>, dialect: Dialect) -> Result<String> {
    let mut out = String::new();
    let _ = writeln!(out, "# {}", GENERATED_NOTICE);
    for (key, value) in props {
        match dialect {
            Dialect::Java => {
                if let Some(v) = value {
                    let _ = writeln!(out, "{}={}", escape(key, true), escape(v, false));
                }
            }
            Dialect::ContainerExecutor => {
                if key.is_empty() || key.contains(['=', '\n', '\r']) {
                    return Err(Error::template(source, key, "cannot be written as a key"));
                }
                let v = value.as_deref().unwrap_or("");
                if v.contains(['\n', '\r']) {
                    return Err(Error::template(source, key, "has a value spanning lines"));
                }
                let _ = writeln!(out, "{}={}", key, v);
            }
        }
    }
    Ok(out)
}

/// Backslash-escape `text` for a properties file. Keys also escape spaces,
/// and a leading space in a value is kept by escaping it.
fn escape(text: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            other => out.push(other),
        }
    }
    out
}
