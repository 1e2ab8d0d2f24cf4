//! Named-capture patterns.
//!
//! Response patterns are authored with `(?<name>...)` groups. Before compiling
//! them the scanner walks the source once, records the capture names in
//! ordinal order and emits a native pattern with plain `(` groups. Captures
//! are then read back by position and re-keyed by name, so the engine never
//! has to understand the naming syntax.
//!
//! ```text
//!   source:  ^Stats: hp=(?<hp>\d+) (\w+)$
//!                       │            │
//!   names:            ["hp",       "group1"]
//!   native:  ^Stats: hp=(\d+) (\w+)$
//! ```
//!
//! A bare `(` gets the positional name `group<N>`, where `N` is the
//! capture-group ordinal (zero-based, counting named groups too). Callers may
//! rely on these names.

use std::collections::HashMap;

use regex::Regex;

use crate::error::{PatternError, PatternResult};

/// Capture name → captured text for one match.
pub type CapturedGroups = HashMap<String, String>;

// ============================================================================
// NamedPattern
// ============================================================================

/// The result of translating a named-capture pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedPattern {
    native: String,
    names: Vec<String>,
}

impl NamedPattern {
    /// Scans `source`, stripping group names and recording them in order.
    ///
    /// Escaped characters and character classes are copied through untouched.
    /// `(?:`, lookarounds and inline flag groups are non-capturing and get no
    /// name.
    pub fn parse(source: &str) -> PatternResult<Self> {
        let chars: Vec<char> = source.chars().collect();
        let mut native = String::with_capacity(source.len());
        let mut names: Vec<String> = Vec::new();
        let mut class_depth = 0usize;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '\\' => {
                    let Some(&next) = chars.get(i + 1) else {
                        return Err(PatternError::TrailingEscape {
                            pattern: source.to_string(),
                        });
                    };
                    native.push(c);
                    native.push(next);
                    i += 2;
                    continue;
                }
                '[' => {
                    native.push(c);
                    class_depth += 1;
                    i += 1;
                    // `]` right after `[` or `[^` is a literal member.
                    if chars.get(i) == Some(&'^') {
                        native.push('^');
                        i += 1;
                    }
                    if chars.get(i) == Some(&']') {
                        native.push(']');
                        i += 1;
                    }
                    continue;
                }
                ']' if class_depth > 0 => {
                    class_depth -= 1;
                    native.push(c);
                }
                '(' if class_depth == 0 => {
                    if chars.get(i + 1) == Some(&'?') {
                        if let Some(start) = name_start(&chars, i) {
                            let end = chars[start..]
                                .iter()
                                .position(|&ch| ch == '>')
                                .map(|offset| start + offset)
                                .ok_or_else(|| PatternError::UnterminatedGroupName {
                                    pattern: source.to_string(),
                                })?;
                            let name: String = chars[start..end].iter().collect();
                            validate_name(source, &name, &names)?;
                            names.push(name);
                            native.push('(');
                            i = end + 1;
                            continue;
                        }
                        // Non-capturing group, lookaround or inline flags.
                        native.push(c);
                    } else {
                        names.push(format!("group{}", names.len()));
                        native.push(c);
                    }
                }
                _ => native.push(c),
            }
            i += 1;
        }

        Ok(Self { native, names })
    }

    /// The pattern with group names removed.
    pub fn native(&self) -> &str {
        &self.native
    }

    /// Capture names in ordinal order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn into_parts(self) -> (String, Vec<String>) {
        (self.native, self.names)
    }
}

/// Index of the first name character if `(` at `open` starts a named group.
fn name_start(chars: &[char], open: usize) -> Option<usize> {
    match chars.get(open + 2..) {
        Some(['<', next, ..]) if *next != '=' && *next != '!' => Some(open + 3),
        Some(['P', '<', ..]) => Some(open + 4),
        _ => None,
    }
}

fn validate_name(pattern: &str, name: &str, seen: &[String]) -> PatternResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(PatternError::InvalidGroupName {
            pattern: pattern.to_string(),
            name: name.to_string(),
        });
    }
    if seen.iter().any(|existing| existing == name) {
        return Err(PatternError::DuplicateGroupName {
            pattern: pattern.to_string(),
            name: name.to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// CompiledPattern
// ============================================================================

/// A translated pattern bound to a compiled regex.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: String,
    names: Vec<String>,
    regex: Regex,
}

impl CompiledPattern {
    /// Compiles `source` so it must match a whole line.
    pub fn anchored(source: &str) -> PatternResult<Self> {
        Self::build(source, |native| format!("^(?:{native})$"))
    }

    /// Compiles `source` for searching anywhere in the text.
    pub fn unanchored(source: &str) -> PatternResult<Self> {
        Self::build(source, str::to_string)
    }

    fn build(source: &str, wrap: impl FnOnce(&str) -> String) -> PatternResult<Self> {
        let (native, names) = NamedPattern::parse(source)?.into_parts();
        let regex = Regex::new(&wrap(&native)).map_err(|source_err| PatternError::Compile {
            pattern: source.to_string(),
            source: source_err,
        })?;
        Ok(Self {
            source: source.to_string(),
            names,
            regex,
        })
    }

    /// The pattern as authored.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Capture names in ordinal order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Captures of the first match, keyed by name.
    ///
    /// Groups that did not participate in the match are absent from the map.
    pub fn captures(&self, text: &str) -> Option<CapturedGroups> {
        self.regex.captures(text).map(|caps| self.extract(&caps))
    }

    /// Captures of every non-overlapping match, in order.
    pub fn captures_all(&self, text: &str) -> Vec<CapturedGroups> {
        self.regex
            .captures_iter(text)
            .map(|caps| self.extract(&caps))
            .collect()
    }

    fn extract(&self, caps: &regex::Captures<'_>) -> CapturedGroups {
        self.names
            .iter()
            .enumerate()
            .filter_map(|(ordinal, name)| {
                caps.get(ordinal + 1)
                    .map(|m| (name.clone(), m.as_str().to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_group_is_stripped() {
        let pattern = NamedPattern::parse("(?<namedGroup>.*)").unwrap();
        assert_eq!(pattern.native(), "(.*)");
        assert_eq!(pattern.names(), ["namedGroup"]);
    }

    #[test]
    fn test_positional_group_name() {
        let pattern = NamedPattern::parse("(.*)").unwrap();
        assert_eq!(pattern.native(), "(.*)");
        assert_eq!(pattern.names(), ["group0"]);
    }

    #[test]
    fn test_non_capturing_has_no_name() {
        let pattern = NamedPattern::parse("(?:.*)").unwrap();
        assert_eq!(pattern.native(), "(?:.*)");
        assert!(pattern.names().is_empty());

        let pattern = NamedPattern::parse("(?i)a(?=b)(?!c)(?<=d)(?<!e)").unwrap();
        assert!(pattern.names().is_empty());
    }

    #[test]
    fn test_positional_uses_capture_ordinal() {
        let pattern = NamedPattern::parse(r"(?<a>\d+)-(\w+)-(?:x)-(.)").unwrap();
        assert_eq!(pattern.names(), ["a", "group1", "group2"]);
        assert_eq!(pattern.native(), r"(\d+)-(\w+)-(?:x)-(.)");
    }

    #[test]
    fn test_python_style_name() {
        let pattern = NamedPattern::parse("(?P<level>[0-9]+)").unwrap();
        assert_eq!(pattern.names(), ["level"]);
        assert_eq!(pattern.native(), "([0-9]+)");
    }

    #[test]
    fn test_escapes_and_classes_are_skipped() {
        let pattern = NamedPattern::parse(r"\((?<x>[(\]]+)\)[^(]").unwrap();
        assert_eq!(pattern.names(), ["x"]);
        assert_eq!(pattern.native(), r"\(([(\]]+)\)[^(]");

        let pattern = NamedPattern::parse(r"[]()]([[:alpha:]])").unwrap();
        assert_eq!(pattern.names(), ["group0"]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            NamedPattern::parse(r"abc\"),
            Err(PatternError::TrailingEscape { .. })
        ));
        assert!(matches!(
            NamedPattern::parse("(?<open"),
            Err(PatternError::UnterminatedGroupName { .. })
        ));
        assert!(matches!(
            NamedPattern::parse("(?<bad-name>x)"),
            Err(PatternError::InvalidGroupName { .. })
        ));
        assert!(matches!(
            NamedPattern::parse("(?<a>x)(?<a>y)"),
            Err(PatternError::DuplicateGroupName { .. })
        ));
    }

    #[test]
    fn test_anchored_captures() {
        let pattern = CompiledPattern::anchored("^foo=(?<x>.*)$").unwrap();
        let groups = pattern.captures("foo=bar").unwrap();
        assert_eq!(groups.get("x").map(String::as_str), Some("bar"));
        assert!(pattern.captures("xfoo=bar").is_none());
    }

    #[test]
    fn test_anchored_requires_whole_line() {
        let pattern = CompiledPattern::anchored("hp=(?<hp>\\d+)").unwrap();
        assert!(pattern.is_match("hp=12"));
        assert!(!pattern.is_match("hp=12 mp=3"));
    }

    #[test]
    fn test_optional_group_absent() {
        let pattern = CompiledPattern::anchored("a(?<opt>b)?c").unwrap();
        let groups = pattern.captures("ac").unwrap();
        assert!(!groups.contains_key("opt"));
    }

    #[test]
    fn test_unanchored_captures_all() {
        let pattern = CompiledPattern::unanchored(r"(?<name>\w+):(?<qty>\d+)").unwrap();
        let all = pattern.captures_all("sword:1, potion:3, arrow:20");
        assert_eq!(all.len(), 3);
        assert_eq!(all[1]["name"], "potion");
        assert_eq!(all[2]["qty"], "20");
    }

    #[test]
    fn test_compile_error() {
        let err = CompiledPattern::anchored("(?<x>[a-").unwrap_err();
        assert!(matches!(err, PatternError::Compile { .. }));
    }
}
