//! Shell-sourceable environment files (`*-env.sh`, `/etc/default/hadoop`).

use std::collections::BTreeMap;
use std::fmt::Write;

use super::GENERATED_NOTICE;

/// One `export KEY=value` line per variable, keys upper-cased and sorted.
pub fn render_env(vars: &BTreeMap<String, Option<String>>) -> String {
    let upper: BTreeMap<String, &String> = vars
        .iter()
        .filter_map(|(k, v)| v.as_ref().map(|v| (env_key(k), v)))
        .collect();

    let mut out = String::new();
    let _ = writeln!(out, "# {}", GENERATED_NOTICE);
    for (key, value) in upper {
        let _ = writeln!(out, "export {}={}", key, quote(value));
    }
    out
}

/// `hadoop.log-dir` style keys become valid shell identifiers.
fn env_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

/// Leave safe words bare, single-quote everything else.
pub fn quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=,+@%".contains(c));
    if safe {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}
