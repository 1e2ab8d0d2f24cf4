//! Flattens a [`CommandDocument`] into compiled response sets.
//!
//! Every response set is registered under a dotted key:
//!
//! - `command.<group>.<command>.responses.<category>` for command replies
//! - `message.<group>.<name>` for unsolicited messages
//!
//! Loading is all-or-nothing. Any bad pattern, unknown container or
//! unsupported version rejects the whole document.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use super::schema::{CommandDocument, ResponseLeaves, SUPPORTED_VERSION};
use crate::error::{RegistryError, RegistryResult};
use crate::response::{CommandResponse, ResponseSet, SubgroupPattern};
use crate::template::CommandTemplate;

/// A command as registered: its primary text, alternates and reply categories.
#[derive(Debug, Clone)]
pub struct CommandEntry {
    group: String,
    name: String,
    template: CommandTemplate,
    alternates: Vec<CommandTemplate>,
    categories: Vec<String>,
}

impl CommandEntry {
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Primary command text.
    pub fn template(&self) -> &CommandTemplate {
        &self.template
    }

    pub fn alternates(&self) -> &[CommandTemplate] {
        &self.alternates
    }

    /// Primary text followed by alternates.
    pub fn spellings(&self) -> impl Iterator<Item = &CommandTemplate> {
        std::iter::once(&self.template).chain(self.alternates.iter())
    }

    /// Response categories declared for this command.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }
}

/// Compiled command configuration.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    responses: HashMap<String, ResponseSet>,
    commands: HashMap<(String, String), CommandEntry>,
}

impl CommandRegistry {
    /// Key for the replies of `group.command` in `category`.
    pub fn command_key(group: &str, command: &str, category: &str) -> String {
        format!("command.{group}.{command}.responses.{category}")
    }

    /// Key for the unsolicited message `group.name`.
    pub fn message_key(group: &str, name: &str) -> String {
        format!("message.{group}.{name}")
    }

    /// Compiles every pattern in `document`.
    pub fn load(document: &CommandDocument) -> RegistryResult<Self> {
        if document.version != SUPPORTED_VERSION {
            return Err(RegistryError::UnsupportedVersion {
                found: document.version,
                expected: SUPPORTED_VERSION,
            });
        }

        let mut registry = Self::default();

        for (group, commands) in &document.commands {
            check_name("commands", group)?;
            for (name, definition) in commands {
                let location = format!("commands.{group}");
                check_name(&location, name)?;

                for (category, leaves) in &definition.responses {
                    check_name(&format!("{location}.{name}.responses"), category)?;
                    let key = Self::command_key(group, name, category);
                    registry.insert_set(key, leaves)?;
                }

                let entry = CommandEntry {
                    group: group.clone(),
                    name: name.clone(),
                    template: CommandTemplate::new(definition.command.clone()),
                    alternates: definition
                        .alternates
                        .iter()
                        .cloned()
                        .map(CommandTemplate::new)
                        .collect(),
                    categories: definition.responses.keys().cloned().collect(),
                };
                registry
                    .commands
                    .insert((group.clone(), name.clone()), entry);
            }
        }

        for (group, messages) in &document.messages {
            check_name("messages", group)?;
            for (name, leaves) in messages {
                check_name(&format!("messages.{group}"), name)?;
                registry.insert_set(Self::message_key(group, name), leaves)?;
            }
        }

        info!(
            commands = registry.commands.len(),
            response_sets = registry.responses.len(),
            "Loaded command registry"
        );
        Ok(registry)
    }

    /// Parses and compiles a JSON document.
    pub fn from_json_str(json: &str) -> RegistryResult<Self> {
        let document: CommandDocument = serde_json::from_str(json)?;
        Self::load(&document)
    }

    /// Reads, parses and compiles a JSON document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Reading command document");
        let json = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    fn insert_set(&mut self, key: String, leaves: &ResponseLeaves) -> RegistryResult<()> {
        let mut responses = Vec::with_capacity(leaves.len());
        for (id, leaf) in leaves {
            let location = format!("{key}.{id}");
            let mut response = CommandResponse::new(id.clone(), leaf.response())
                .map_err(|e| RegistryError::pattern(location.clone(), e))?;

            if let Some(sub) = leaf.sub_groups() {
                if let Some(container) = &sub.container {
                    if !response.pattern().has_group(container) {
                        return Err(RegistryError::UnknownContainer {
                            location,
                            container: container.clone(),
                        });
                    }
                }
                let subgroup = SubgroupPattern::new(&sub.pattern, sub.container.clone())
                    .map_err(|e| RegistryError::pattern(format!("{location}.subGroups"), e))?;
                response = response.with_subgroup(subgroup);
            }
            responses.push(response);
        }

        debug!(key = %key, responses = responses.len(), "Registered response set");
        self.responses.insert(key, ResponseSet::new(responses));
        Ok(())
    }

    /// The response set registered under `key`.
    pub fn responses(&self, key: &str) -> Option<&ResponseSet> {
        self.responses.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.responses.contains_key(key)
    }

    /// All registered response keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.responses.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn command(&self, group: &str, command: &str) -> Option<&CommandEntry> {
        self.commands
            .get(&(group.to_string(), command.to_string()))
    }

    pub fn commands(&self) -> impl Iterator<Item = &CommandEntry> {
        self.commands.values()
    }

    /// Number of response sets.
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

/// Names become key segments, so they must be non-empty and dot-free.
fn check_name(location: &str, name: &str) -> RegistryResult<()> {
    if name.is_empty() || name.contains('.') {
        return Err(RegistryError::InvalidName {
            location: location.to_string(),
            name: name.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "version": 1,
        "commands": {
            "rpg": {
                "stats": {
                    "command": "!stats",
                    "alternates": ["!s"],
                    "responses": {
                        "ok": { "stats": "^HP (?<hp>\\d+)/(?<max>\\d+)$" },
                        "error": { "cooldown": "^Wait (?<secs>\\d+)s$" }
                    }
                },
                "buy": {
                    "command": "!buy {item}",
                    "responses": {
                        "ok": {
                            "bought": {
                                "response": "^Bought: (?<list>.*)$",
                                "subGroups": { "pattern": "(?<item>\\w+)", "container": "list" }
                            }
                        }
                    }
                }
            }
        },
        "messages": {
            "rpg": { "levelup": { "level": "^Level up! (?<level>\\d+)$" } }
        }
    }"#;

    #[test]
    fn test_load_flattens_keys() {
        let registry = CommandRegistry::from_json_str(DOCUMENT).unwrap();
        assert_eq!(
            registry.keys(),
            [
                "command.rpg.buy.responses.ok",
                "command.rpg.stats.responses.error",
                "command.rpg.stats.responses.ok",
                "message.rpg.levelup",
            ]
        );
        assert_eq!(registry.len(), 4);

        let stats = registry.responses("command.rpg.stats.responses.ok").unwrap();
        let matched = stats.evaluate("HP 7/10");
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].groups["max"], "10");
    }

    #[test]
    fn test_command_entries() {
        let registry = CommandRegistry::from_json_str(DOCUMENT).unwrap();
        let stats = registry.command("rpg", "stats").unwrap();
        assert_eq!(stats.template().as_str(), "!stats");
        let spellings: Vec<_> = stats.spellings().map(CommandTemplate::as_str).collect();
        assert_eq!(spellings, ["!stats", "!s"]);
        assert_eq!(stats.categories(), ["error", "ok"]);

        let buy = registry.command("rpg", "buy").unwrap();
        assert!(!buy.template().is_literal());
        assert!(registry.command("rpg", "missing").is_none());
    }

    #[test]
    fn test_subgroups_loaded() {
        let registry = CommandRegistry::from_json_str(DOCUMENT).unwrap();
        let set = registry.responses("command.rpg.buy.responses.ok").unwrap();
        let matched = &set.evaluate("Bought: axe bow")[0];
        assert_eq!(matched.subgroups.len(), 2);
    }

    #[test]
    fn test_unsupported_version() {
        let err = CommandRegistry::from_json_str(r#"{"version": 2}"#).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::UnsupportedVersion { found: 2, .. }
        ));
    }

    #[test]
    fn test_bad_pattern_reports_location() {
        let err = CommandRegistry::from_json_str(
            r#"{"version": 1, "messages": {"g": {"m": {"r": "(?<x>[a-"}}}}"#,
        )
        .unwrap_err();
        match err {
            RegistryError::Pattern { location, .. } => assert_eq!(location, "message.g.m.r"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_container() {
        let err = CommandRegistry::from_json_str(
            r#"{"version": 1, "messages": {"g": {"m": {"r": {
                "response": "(?<a>.*)",
                "subGroups": {"pattern": "(\\w)", "container": "b"}
            }}}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownContainer { .. }));
    }

    #[test]
    fn test_dotted_name_rejected() {
        let err = CommandRegistry::from_json_str(
            r#"{"version": 1, "messages": {"g.x": {"m": {"r": ".*"}}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidName { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let err = CommandRegistry::from_json_str("{").unwrap_err();
        assert!(matches!(err, RegistryError::Json(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = CommandRegistry::from_path("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, RegistryError::Io { .. }));
    }
}
