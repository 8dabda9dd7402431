//! Schema Location Resolution
//!
//! Maps `schemaLocation` hints to loadable locations through an ordered list
//! of literal or regex rules. Regex templates may reference capture groups as
//! `\1`, `$1` or `${1}`; every reference is checked against the pattern's
//! group count when the resolver is built.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};

/// One `from -> to` location rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaLocationMapping {
    pub from: String,
    pub to: String,
    /// Treat `from` as a regular expression and `to` as a template
    #[serde(default)]
    pub pattern: bool,
}

impl SchemaLocationMapping {
    pub fn literal(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            pattern: false,
        }
    }

    pub fn pattern(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            pattern: true,
        }
    }
}

#[derive(Debug)]
enum Rule {
    Literal { from: String, to: String },
    Pattern { regex: Regex, template: String },
}

/// Compiled, ordered mapping rules
#[derive(Debug, Default)]
pub struct LocationResolver {
    rules: Vec<Rule>,
}

impl LocationResolver {
    /// Compile mapping rules, rejecting bad patterns and templates up front
    pub fn new(mappings: &[SchemaLocationMapping]) -> Result<Self> {
        let mut rules = Vec::with_capacity(mappings.len());

        for mapping in mappings {
            if !mapping.pattern {
                rules.push(Rule::Literal {
                    from: mapping.from.clone(),
                    to: mapping.to.clone(),
                });
                continue;
            }

            let regex = Regex::new(&mapping.from).map_err(|e| {
                SchemaError::config(format!("invalid location pattern '{}': {}", mapping.from, e))
            })?;
            let (template, groups) = convert_template(&mapping.to);
            let available = regex.captures_len() - 1;
            if let Some(&bad) = groups.iter().find(|&&g| g > available) {
                return Err(SchemaError::config(format!(
                    "location template '{}' references group {} but pattern '{}' has {} group(s)",
                    mapping.to, bad, mapping.from, available
                )));
            }
            rules.push(Rule::Pattern { regex, template });
        }

        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply the first matching rule to a hint
    pub fn map(&self, hint: &str) -> Option<String> {
        self.rules.iter().find_map(|rule| match rule {
            Rule::Literal { from, to } => (from == hint).then(|| to.clone()),
            Rule::Pattern { regex, template } => regex
                .is_match(hint)
                .then(|| regex.replace(hint, template.as_str()).into_owned()),
        })
    }
}

/// Rewrite a template into `regex` replacement syntax.
///
/// Returns the rewritten template and every group number it references.
fn convert_template(template: &str) -> (String, Vec<usize>) {
    let mut out = String::with_capacity(template.len() + 8);
    let mut groups = Vec::new();
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;

    let read_digits = |start: usize| -> (String, usize) {
        let mut end = start;
        while end < chars.len() && chars[end].is_ascii_digit() {
            end += 1;
        }
        (chars[start..end].iter().collect(), end)
    };

    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() && chars[i + 1].is_ascii_digit() => {
                let (digits, end) = read_digits(i + 1);
                push_group(&mut out, &mut groups, &digits);
                i = end;
            }
            '\\' if i + 1 < chars.len() && chars[i + 1] == '\\' => {
                out.push('\\');
                i += 2;
            }
            '$' if i + 1 < chars.len() && chars[i + 1].is_ascii_digit() => {
                let (digits, end) = read_digits(i + 1);
                push_group(&mut out, &mut groups, &digits);
                i = end;
            }
            '$' if i + 1 < chars.len() && chars[i + 1] == '{' => {
                let (digits, end) = read_digits(i + 2);
                if !digits.is_empty() && end < chars.len() && chars[end] == '}' {
                    push_group(&mut out, &mut groups, &digits);
                    i = end + 1;
                } else {
                    out.push_str("$$");
                    i += 1;
                }
            }
            '$' => {
                out.push_str("$$");
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    (out, groups)
}

fn push_group(out: &mut String, groups: &mut Vec<usize>, digits: &str) {
    let n: usize = digits.parse().unwrap_or(usize::MAX);
    groups.push(n);
    out.push_str(&format!("${{{}}}", digits));
}

/// Whether a hint points at a remote resource
pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Whether a location is absolute (filesystem root, drive letter or URL)
pub fn is_absolute(location: &str) -> bool {
    let bytes = location.as_bytes();
    location.starts_with('/')
        || location.starts_with('\\')
        || is_remote(location)
        || (bytes.len() > 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && (bytes[2] == b'/' || bytes[2] == b'\\'))
}

/// Join a relative hint onto the directory of the referencing location,
/// collapsing `.` and `..` segments
pub fn join_location(base: &str, hint: &str) -> String {
    if is_absolute(hint) {
        return normalize_location(hint);
    }
    let parent = match base.rfind(|c| c == '/' || c == '\\') {
        Some(idx) => &base[..=idx],
        None => "",
    };
    normalize_location(&format!("{}{}", parent, hint))
}

/// Collapse `.`/`..` segments and unify separators to `/`
pub fn normalize_location(location: &str) -> String {
    if is_remote(location) {
        return location.to_string();
    }
    let unified = location.replace('\\', "/");
    let rooted = unified.starts_with('/');
    let mut components: Vec<&str> = Vec::new();

    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(components.last(), Some(last) if *last != "..") {
                    components.pop();
                } else if !rooted {
                    components.push("..");
                }
            }
            s => components.push(s),
        }
    }

    let joined = components.join("/");
    if rooted {
        format!("/{}", joined)
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_first_match_wins() {
        let resolver = LocationResolver::new(&[
            SchemaLocationMapping::literal("a.xsd", "first.xsd"),
            SchemaLocationMapping::literal("a.xsd", "second.xsd"),
        ])
        .unwrap();
        assert_eq!(resolver.map("a.xsd").as_deref(), Some("first.xsd"));
        assert_eq!(resolver.map("b.xsd"), None);
    }

    #[test]
    fn test_pattern_backreferences() {
        let resolver = LocationResolver::new(&[SchemaLocationMapping::pattern(
            r"^https?://example\.org/schemas/(.+)/(.+\.xsd)$",
            r"vendor/\1/\2",
        )])
        .unwrap();
        assert_eq!(
            resolver.map("http://example.org/schemas/gml/base.xsd").as_deref(),
            Some("vendor/gml/base.xsd")
        );
    }

    #[test]
    fn test_dollar_syntax_and_literal_dollar() {
        let resolver = LocationResolver::new(&[SchemaLocationMapping::pattern(
            r"^(\w+)\.xsd$",
            "cost$/${1}_v$1.xsd",
        )])
        .unwrap();
        assert_eq!(resolver.map("unit.xsd").as_deref(), Some("cost$/unit_vunit.xsd"));
    }

    #[test]
    fn test_template_group_out_of_range() {
        let err = LocationResolver::new(&[SchemaLocationMapping::pattern(r"^(a)$", r"\2")]).unwrap_err();
        assert!(matches!(err, SchemaError::Configuration(_)));
        assert!(err.to_string().contains("group 2"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = LocationResolver::new(&[SchemaLocationMapping::pattern("(", "x")]).unwrap_err();
        assert!(matches!(err, SchemaError::Configuration(_)));
    }

    #[test]
    fn test_join_location() {
        assert_eq!(join_location("schemas/a/main.xsd", "../common/types.xsd"), "schemas/common/types.xsd");
        assert_eq!(join_location("/root/x/main.xsd", "./y.xsd"), "/root/x/y.xsd");
        assert_eq!(join_location("main.xsd", "y.xsd"), "y.xsd");
        assert_eq!(join_location("main.xsd", "../y.xsd"), "../y.xsd");
        assert_eq!(join_location("a/main.xsd", "/abs/y.xsd"), "/abs/y.xsd");
        assert_eq!(join_location("a/main.xsd", "http://x.org/y.xsd"), "http://x.org/y.xsd");
    }

    #[test]
    fn test_is_absolute() {
        assert!(is_absolute("/etc/x.xsd"));
        assert!(is_absolute("C:\\x.xsd"));
        assert!(is_absolute("https://x.org/a.xsd"));
        assert!(!is_absolute("x/a.xsd"));
    }
}
