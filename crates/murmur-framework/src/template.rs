//! Command text templates with `{param}` placeholders.

use std::collections::HashMap;
use std::ops::Range;

/// Returns `true` if `text` still contains a `{param}` placeholder.
pub fn has_unresolved_params(text: &str) -> bool {
    placeholders(text).next().is_some()
}

/// Yields `(span, name)` for every `{name}` in `text`, where `name` is an
/// identifier (`[A-Za-z_][A-Za-z0-9_]*`).
fn placeholders(text: &str) -> impl Iterator<Item = (Range<usize>, &str)> {
    let mut cursor = 0;
    std::iter::from_fn(move || {
        while let Some(offset) = text[cursor..].find('{') {
            let open = cursor + offset;
            let body_start = open + 1;
            let body_len = text[body_start..]
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(text.len() - body_start);
            let name = &text[body_start..body_start + body_len];
            let close = body_start + body_len;
            cursor = body_start;
            let is_ident = name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_');
            if is_ident && text[close..].starts_with('}') {
                cursor = close + 1;
                return Some((open..close + 1, name));
            }
        }
        None
    })
}

/// Command text, possibly parameterized.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandTemplate(String);

impl CommandTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A template with no placeholders is sent as-is.
    pub fn is_literal(&self) -> bool {
        !has_unresolved_params(&self.0)
    }

    /// Placeholder names in first-appearance order, without repeats.
    pub fn params(&self) -> Vec<String> {
        let mut params: Vec<String> = Vec::new();
        for (_, name) in placeholders(&self.0) {
            if !params.iter().any(|p| p == name) {
                params.push(name.to_string());
            }
        }
        params
    }

    /// Substitutes every known placeholder with its value, verbatim.
    ///
    /// Placeholders without a value are left in place, so the result can be
    /// checked with [`has_unresolved_params`].
    pub fn render(&self, values: &HashMap<String, String>) -> String {
        let mut rendered = String::with_capacity(self.0.len());
        let mut last = 0;
        for (span, name) in placeholders(&self.0) {
            if let Some(value) = values.get(name) {
                rendered.push_str(&self.0[last..span.start]);
                rendered.push_str(value);
                last = span.end;
            }
        }
        rendered.push_str(&self.0[last..]);
        rendered
    }
}

impl std::fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_template() {
        let template = CommandTemplate::new("!stats");
        assert!(template.is_literal());
        assert!(template.params().is_empty());
        assert_eq!(template.render(&HashMap::new()), "!stats");
    }

    #[test]
    fn test_params_in_order() {
        let template = CommandTemplate::new("!give {item} {count} {item}");
        assert_eq!(template.params(), ["item", "count"]);
        assert!(!template.is_literal());
    }

    #[test]
    fn test_render_is_verbatim() {
        let template = CommandTemplate::new("!say {text}");
        let values = HashMap::from([("text".to_string(), "$1 {and} \\n".to_string())]);
        assert_eq!(template.render(&values), "!say $1 {and} \\n");
    }

    #[test]
    fn test_braces_that_are_not_placeholders() {
        assert!(!has_unresolved_params("{} {1x} { a} {{"));
        assert!(has_unresolved_params("{{name}}"));
    }

    #[test]
    fn test_render_leaves_missing() {
        let template = CommandTemplate::new("!give {item} {count}");
        let values = HashMap::from([("item".to_string(), "potion".to_string())]);
        let text = template.render(&values);
        assert_eq!(text, "!give potion {count}");
        assert!(has_unresolved_params(&text));
    }
}
