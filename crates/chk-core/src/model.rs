//! Declarative, immutable task-model tree (spec.md §3).
//!
//! A [`TaskModel`] is either an *inner* node (has `subtasks`, never
//! executes, carries no description) or a *leaf* node (no `subtasks`,
//! carries a description and is eligible to run). Names must be unique
//! across the whole tree and `[A-Za-z_][A-Za-z0-9_]*`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One node of the declarative task tree.
///
/// Constructed either in code (see [`TaskModel::leaf`] / [`TaskModel::inner`])
/// or parsed from the JSON task-file format (spec.md §6) via `serde`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskModel {
    pub name: String,
    /// Required for leaves, forbidden for inner nodes. May contain
    /// `%{key}%` placeholders resolved by Config at compile time.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub subtasks: Vec<TaskModel>,
    /// Names of tasks (leaf or inner) that must complete before this one.
    #[serde(default)]
    pub prerequisites: BTreeSet<String>,
    /// If true, this task has no meaningful manual fallback: DONE is never
    /// an allowed response on failure, only RETRY or SKIP.
    #[serde(default)]
    pub only_auto: bool,
}

impl TaskModel {
    /// Build a leaf (executable) task.
    pub fn leaf(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            subtasks: Vec::new(),
            prerequisites: BTreeSet::new(),
            only_auto: false,
        }
    }

    /// Build an inner (grouping) task.
    pub fn inner(name: impl Into<String>, subtasks: Vec<TaskModel>) -> Self {
        Self {
            name: name.into(),
            description: None,
            subtasks,
            prerequisites: BTreeSet::new(),
            only_auto: false,
        }
    }

    pub fn with_prerequisites(mut self, prereqs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.prerequisites = prereqs.into_iter().map(Into::into).collect();
        self
    }

    pub fn only_auto(mut self) -> Self {
        self.only_auto = true;
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.subtasks.is_empty()
    }

    /// Parse the JSON task-file format (spec.md §6). Unknown keys are
    /// rejected, matching `serde(deny_unknown_fields)`.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct Raw {
            #[serde(default)]
            name: Option<String>,
            #[serde(default)]
            description: Option<String>,
            #[serde(default)]
            subtasks: Vec<Raw>,
            #[serde(default)]
            prerequisites: BTreeSet<String>,
            #[serde(default)]
            only_auto: bool,
        }

        fn convert(raw: Raw, default_name: &str) -> TaskModel {
            TaskModel {
                name: raw.name.unwrap_or_else(|| default_name.to_string()),
                description: raw.description,
                subtasks: raw
                    .subtasks
                    .into_iter()
                    .map(|r| convert(r, ""))
                    .collect(),
                prerequisites: raw.prerequisites,
                only_auto: raw.only_auto,
            }
        }

        let raw: Raw = serde_json::from_str(text)?;
        Ok(convert(raw, "root"))
    }
}

/// Valid identifier: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.bytes();
    match chars.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
        _ => return false,
    }
    chars.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_has_no_subtasks() {
        let t = TaskModel::leaf("a", "do a");
        assert!(t.is_leaf());
        assert_eq!(t.description.as_deref(), Some("do a"));
    }

    #[test]
    fn valid_names() {
        assert!(is_valid_name("a"));
        assert!(is_valid_name("_a1"));
        assert!(is_valid_name("A_b2"));
        assert!(!is_valid_name("1a"));
        assert!(!is_valid_name("a-b"));
        assert!(!is_valid_name(""));
    }

    #[test]
    fn parse_json_tree() {
        let json = r#"{
            "name": "root",
            "subtasks": [
                { "name": "a", "description": "do a" },
                { "name": "b", "description": "do b", "prerequisites": ["a"], "only_auto": true }
            ]
        }"#;
        let model = TaskModel::from_json(json).unwrap();
        assert_eq!(model.subtasks.len(), 2);
        assert!(model.subtasks[1].only_auto);
        assert!(model.subtasks[1].prerequisites.contains("a"));
    }

    #[test]
    fn parse_rejects_unknown_field() {
        let json = r#"{ "name": "root", "subtasks": [{ "name": "a", "description": "x", "bogus": 1 }] }"#;
        assert!(TaskModel::from_json(json).is_err());
    }
}
