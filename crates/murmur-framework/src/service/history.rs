//! Per-subscription match history.

use serde::Serialize;

use crate::pattern::CapturedGroups;
use crate::response::ResponseMatch;

/// A response that matched a logged line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedResponse {
    /// Response key the match was recorded under.
    pub key: String,
    /// Result key of the response that matched.
    pub response_id: String,
    /// Position of the line in the incoming log.
    pub line_index: usize,
    /// Arrival time of the line, milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub captured_groups: CapturedGroups,
    pub repeated_subgroups: Vec<CapturedGroups>,
}

impl MatchedResponse {
    pub(crate) fn new(key: &str, matched: ResponseMatch, line_index: usize, timestamp: i64) -> Self {
        Self {
            key: key.to_string(),
            response_id: matched.response_id,
            line_index,
            timestamp,
            captured_groups: matched.groups,
            repeated_subgroups: matched.subgroups,
        }
    }

    /// Text of the capture `name`, if it participated in the match.
    pub fn group(&self, name: &str) -> Option<&str> {
        self.captured_groups.get(name).map(String::as_str)
    }
}

/// Matches accumulated for one `(subscriber, key)` pair.
///
/// `last_scanned` is the number of log lines already evaluated; catch-up
/// resumes from there so no line is evaluated twice.
#[derive(Debug, Clone, Default)]
pub struct ResponseHistory {
    matches: Vec<MatchedResponse>,
    last_scanned: usize,
}

impl ResponseHistory {
    pub fn matches(&self) -> &[MatchedResponse] {
        &self.matches
    }

    pub fn last_scanned(&self) -> usize {
        self.last_scanned
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub(crate) fn record(&mut self, matched: MatchedResponse) {
        self.matches.push(matched);
    }

    pub(crate) fn advance_to(&mut self, scanned: usize) {
        self.last_scanned = self.last_scanned.max(scanned);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_is_monotonic() {
        let mut history = ResponseHistory::default();
        history.advance_to(5);
        history.advance_to(3);
        assert_eq!(history.last_scanned(), 5);
    }

    #[test]
    fn test_group_lookup() {
        let matched = MatchedResponse::new(
            "message.g.m",
            ResponseMatch {
                response_id: "r".into(),
                groups: CapturedGroups::from([("x".to_string(), "1".to_string())]),
                subgroups: Vec::new(),
            },
            0,
            0,
        );
        assert_eq!(matched.group("x"), Some("1"));
        assert_eq!(matched.group("y"), None);
    }
}
