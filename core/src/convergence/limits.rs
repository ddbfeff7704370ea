//! `limits.d` file editing.
//!
//! Lines are `<domain> <type> <item> <value>`. An entry is keyed by its first
//! three fields; other lines (including comments) pass through untouched.

use crate::types::resource::LimitsEntry;

/// Contents of the file after setting `entry`. The first line with the same
/// key is replaced in place and later duplicates are dropped; when no line
/// matches, the entry is appended.
pub fn upsert(existing: Option<&str>, entry: &LimitsEntry) -> String {
    let wanted = entry.to_string();
    let mut out = String::new();
    let mut placed = false;

    for line in existing.unwrap_or("").lines() {
        if same_key(line, entry) {
            if !placed {
                out.push_str(&wanted);
                out.push('\n');
                placed = true;
            }
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }

    if !placed {
        out.push_str(&wanted);
        out.push('\n');
    }
    out
}

fn same_key(line: &str, entry: &LimitsEntry) -> bool {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return false;
    }
    let mut fields = trimmed.split_whitespace();
    fields.next() == Some(entry.domain.as_str())
        && fields.next() == Some(entry.limit_type.as_str())
        && fields.next() == Some(entry.item.as_str())
}
