//! Response shapes.
//!
//! A [`CommandResponse`] is one anchored pattern identified by its result key,
//! optionally followed by a [`SubgroupPattern`] that pulls repeating records
//! out of the same line. A [`ResponseSet`] holds every response registered
//! under one dotted key; a line is evaluated against all of them.

use crate::error::PatternResult;
use crate::pattern::{CapturedGroups, CompiledPattern};

/// Secondary, global-match pass over a line.
#[derive(Debug, Clone)]
pub struct SubgroupPattern {
    pattern: CompiledPattern,
    container: Option<String>,
}

impl SubgroupPattern {
    pub fn new(source: &str, container: Option<String>) -> PatternResult<Self> {
        Ok(Self {
            pattern: CompiledPattern::unanchored(source)?,
            container,
        })
    }

    pub fn pattern(&self) -> &CompiledPattern {
        &self.pattern
    }

    /// Name of the primary capture whose text is scanned, if any.
    pub fn container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    /// Extracts every record from `line`.
    ///
    /// With a container, only that capture's text is scanned; a container
    /// that did not participate in the primary match yields nothing.
    pub fn extract(&self, line: &str, groups: &CapturedGroups) -> Vec<CapturedGroups> {
        let haystack = match &self.container {
            Some(name) => match groups.get(name) {
                Some(text) => text.as_str(),
                None => return Vec::new(),
            },
            None => line,
        };
        self.pattern.captures_all(haystack)
    }
}

/// One anchored response pattern.
#[derive(Debug, Clone)]
pub struct CommandResponse {
    id: String,
    response: CompiledPattern,
    subgroup: Option<SubgroupPattern>,
}

impl CommandResponse {
    /// Creates a response that must match the whole line.
    pub fn new(id: impl Into<String>, pattern: &str) -> PatternResult<Self> {
        Ok(Self {
            id: id.into(),
            response: CompiledPattern::anchored(pattern)?,
            subgroup: None,
        })
    }

    /// Attaches a subgroup pass.
    pub fn with_subgroup(mut self, subgroup: SubgroupPattern) -> Self {
        self.subgroup = Some(subgroup);
        self
    }

    /// The result key this response is registered under.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pattern(&self) -> &CompiledPattern {
        &self.response
    }

    pub fn subgroup(&self) -> Option<&SubgroupPattern> {
        self.subgroup.as_ref()
    }

    /// Matches `line`, returning the primary captures and any subgroup records.
    pub fn evaluate(&self, line: &str) -> Option<ResponseMatch> {
        let groups = self.response.captures(line)?;
        let subgroups = self
            .subgroup
            .as_ref()
            .map(|sub| sub.extract(line, &groups))
            .unwrap_or_default();
        Some(ResponseMatch {
            response_id: self.id.clone(),
            groups,
            subgroups,
        })
    }
}

/// The outcome of a single response matching a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMatch {
    pub response_id: String,
    pub groups: CapturedGroups,
    pub subgroups: Vec<CapturedGroups>,
}

/// All responses registered under one key, ordered by result key.
#[derive(Debug, Clone, Default)]
pub struct ResponseSet {
    responses: Vec<CommandResponse>,
}

impl ResponseSet {
    pub fn new(mut responses: Vec<CommandResponse>) -> Self {
        responses.sort_by(|a, b| a.id.cmp(&b.id));
        Self { responses }
    }

    pub fn get(&self, id: &str) -> Option<&CommandResponse> {
        self.responses.iter().find(|r| r.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandResponse> {
        self.responses.iter()
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Evaluates `line` against every response. All matches are returned.
    pub fn evaluate(&self, line: &str) -> Vec<ResponseMatch> {
        self.responses
            .iter()
            .filter_map(|response| response.evaluate(line))
            .collect()
    }
}
