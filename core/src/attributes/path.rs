//! Dotted attribute paths.
//!
//! Parses paths like `hadoop.distribution` or
//! `hadoop.hdfs_site."dfs.datanode.max.transfer.threads"` into segments.
//! Hadoop property names contain dots themselves, so a segment may be
//! wrapped in double quotes to keep it whole.

use std::fmt;


/// A parsed dotted path. Always has at least one segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttrPath {
    segments: Vec<String>,
}

impl AttrPath {
    /// Parse a dotted string into an AttrPath.
    ///
    /// Unquoted segments are split on `.`; a segment enclosed in `"` may
    /// contain dots, and `\"` / `\\` escape inside quotes.
    pub fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim();
        if input.is_empty() {
            return Err("empty path".to_string());
        }

        let mut segments = Vec::new();
        let mut chars = input.chars().peekable();

        loop {
            let mut seg = String::new();
            if chars.peek() == Some(&'"') {
                chars.next();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some(escaped) => seg.push(escaped),
                            None => break,
                        },
                        '"' => {
                            closed = true;
                            break;
                        }
                        other => seg.push(other),
                    }
                }
                if !closed {
                    return Err(format!("unterminated quote in path '{}'", input));
                }
                if seg.is_empty() {
                    return Err(format!("empty segment in path '{}'", input));
                }
                match chars.next() {
                    None => {
                        segments.push(seg);
                        break;
                    }
                    Some('.') => {}
                    Some(other) => {
                        return Err(format!(
                            "unexpected '{}' after quoted segment in path '{}'",
                            other, input
                        ))
                    }
                }
            } else {
                let mut ended = true;
                for c in chars.by_ref() {
                    if c == '.' {
                        ended = false;
                        break;
                    }
                    seg.push(c);
                }
                if seg.is_empty() {
                    return Err(format!("empty segment in path '{}'", input));
                }
                if ended {
                    segments.push(seg);
                    break;
                }
            }
            if seg.is_empty() {
                return Err(format!("empty segment in path '{}'", input));
            }
            segments.push(seg);
        }

        Ok(AttrPath { segments })
    }

    /// Build a path from already-split segments.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err("empty path".to_string());
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err("empty segment in path".to_string());
        }
        Ok(AttrPath { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// A new path with `segment` appended.
    pub fn child(&self, segment: &str) -> AttrPath {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        AttrPath { segments }
    }

    /// Format back to a dotted string, quoting segments that need it.
    pub fn to_dotted(&self) -> String {
        let mut out = String::new();
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            if seg.contains('.') || seg.contains('"') {
                out.push('"');
                for c in seg.chars() {
                    if c == '"' || c == '\\' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
            } else {
                out.push_str(seg);
            }
        }
        out
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dotted())
    }
}

impl std::str::FromStr for AttrPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AttrPath::parse(s)
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_path() {
        let p = AttrPath::parse("hadoop.distribution").unwrap();
        assert_eq!(p.segments(), &["hadoop", "distribution"]);
    }

    #[test]
    fn parse_quoted_segment_keeps_dots() {
        let p = AttrPath::parse(r#"hadoop.hdfs_site."dfs.datanode.max.transfer.threads""#).unwrap();
        assert_eq!(
            p.segments(),
            &["hadoop", "hdfs_site", "dfs.datanode.max.transfer.threads"]
        );
    }

    #[test]
    fn parse_quoted_segment_in_the_middle() {
        let p = AttrPath::parse(r#"a."b.c".d"#).unwrap();
        assert_eq!(p.segments(), &["a", "b.c", "d"]);
    }

    #[test]
    fn parse_escapes_inside_quotes() {
        let p = AttrPath::parse(r#"a."say \"hi\"""#).unwrap();
        assert_eq!(p.segments(), &["a", "say \"hi\""]);
    }

    #[test]
    fn parse_rejects_empty_and_malformed() {
        assert!(AttrPath::parse("").is_err());
        assert!(AttrPath::parse("hadoop..x").is_err());
        assert!(AttrPath::parse("hadoop.").is_err());
        assert!(AttrPath::parse(r#"hadoop."open"#).is_err());
        assert!(AttrPath::parse(r#"hadoop."a"b"#).is_err());
        assert!(AttrPath::parse(r#"hadoop."""#).is_err());
    }

    #[test]
    fn dotted_round_trip_quotes_when_needed() {
        let input = r#"hadoop.core_site."fs.defaultFS""#;
        let p = AttrPath::parse(input).unwrap();
        assert_eq!(p.to_dotted(), input);
        assert_eq!(p.to_string(), input);
    }

    #[test]
    fn child_appends() {
        let p = AttrPath::parse("hadoop").unwrap().child("yarn_site");
        assert_eq!(p.to_dotted(), "hadoop.yarn_site");
    }

    #[test]
    fn from_segments_validates() {
        assert!(AttrPath::from_segments(Vec::<String>::new()).is_err());
        assert!(AttrPath::from_segments(["hadoop", ""]).is_err());
        let p = AttrPath::from_segments(["hadoop", "fair_scheduler", "defaults"]).unwrap();
        assert_eq!(p.segments().len(), 3);
    }
}
