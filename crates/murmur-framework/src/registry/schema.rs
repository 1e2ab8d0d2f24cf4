//! Serde model of the command configuration document.
//!
//! ```json
//! {
//!   "version": 1,
//!   "commands": {
//!     "<group>": {
//!       "<command>": {
//!         "command": "!stats",
//!         "alternates": ["!s"],
//!         "responses": {
//!           "<category>": {
//!             "<resultKey>": "^pattern$",
//!             "<resultKey>": { "response": "...", "subGroups": { "pattern": "...", "container": "list" } }
//!           }
//!         }
//!       }
//!     }
//!   },
//!   "messages": { "<group>": { "<name>": { "<resultKey>": "<leaf>" } } }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Document version understood by this build.
pub const SUPPORTED_VERSION: u32 = 1;

/// Result key → response leaf.
pub type ResponseLeaves = BTreeMap<String, ResponseLeaf>;

/// Root of the command configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandDocument {
    pub version: u32,
    #[serde(default)]
    pub commands: BTreeMap<String, BTreeMap<String, CommandDefinition>>,
    #[serde(default)]
    pub messages: BTreeMap<String, BTreeMap<String, ResponseLeaves>>,
}

/// One sendable command and the replies it can produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandDefinition {
    /// Primary command text; may contain `{param}` placeholders.
    pub command: String,
    /// Other spellings that count as the same command having been sent.
    #[serde(default)]
    pub alternates: Vec<String>,
    /// Category → result key → leaf.
    #[serde(default)]
    pub responses: BTreeMap<String, ResponseLeaves>,
}

/// A response pattern, either bare or with a subgroup pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseLeaf {
    Pattern(String),
    Structured(StructuredResponse),
}

impl ResponseLeaf {
    /// The primary (anchored) pattern.
    pub fn response(&self) -> &str {
        match self {
            Self::Pattern(pattern) => pattern,
            Self::Structured(structured) => &structured.response,
        }
    }

    pub fn sub_groups(&self) -> Option<&SubGroupsDefinition> {
        match self {
            Self::Pattern(_) => None,
            Self::Structured(structured) => structured.sub_groups.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructuredResponse {
    pub response: String,
    #[serde(default, rename = "subGroups", skip_serializing_if = "Option::is_none")]
    pub sub_groups: Option<SubGroupsDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubGroupsDefinition {
    pub pattern: String,
    /// Name of the primary capture to scan; the whole line when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_leaf_variants() {
        let doc: CommandDocument = serde_json::from_str(
            r#"{
                "version": 1,
                "commands": {
                    "rpg": {
                        "inventory": {
                            "command": "!inv",
                            "responses": {
                                "ok": {
                                    "plain": "^Empty$",
                                    "list": {
                                        "response": "^Items: (?<list>.*)$",
                                        "subGroups": { "pattern": "(?<item>\\w+)", "container": "list" }
                                    }
                                }
                            }
                        }
                    }
                }
            }"#,
        )
        .unwrap();

        let inventory = &doc.commands["rpg"]["inventory"];
        assert!(inventory.alternates.is_empty());
        let ok = &inventory.responses["ok"];
        assert_eq!(ok["plain"], ResponseLeaf::Pattern("^Empty$".into()));
        assert_eq!(ok["list"].response(), "^Items: (?<list>.*)$");
        assert_eq!(
            ok["list"].sub_groups().and_then(|s| s.container.as_deref()),
            Some("list")
        );
        assert!(doc.messages.is_empty());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result = serde_json::from_str::<CommandDocument>(r#"{"version": 1, "extra": true}"#);
        assert!(result.is_err());

        let result = serde_json::from_str::<CommandDocument>(
            r#"{"version": 1, "commands": {"g": {"c": {"command": "!c", "typo": 1}}}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_structured_leaf_rejects_unknown_fields() {
        let result = serde_json::from_str::<ResponseLeaf>(r#"{"response": "x", "sub": {}}"#);
        assert!(result.is_err());
    }
}
