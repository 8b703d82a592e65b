use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::logging::LoggingConfig;
use crate::types::HumanDuration;
use crate::validate;

// ---------------------------------------------------------------------------
// Raw TOML structure (intermediate representation)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChecklistConfigRaw {
    /// Path to the JSON task-file (spec.md §6), relative to the config
    /// file's directory unless absolute.
    #[serde(default = "default_task_file")]
    task_file: PathBuf,
    /// How often `sleep_attentively` wakes to check for cancellation.
    #[serde(default = "default_poll_frequency")]
    poll_frequency: HumanDuration,
    #[serde(default)]
    logging: LoggingConfig,
    /// Values substituted into `%{key}%` placeholders in task descriptions.
    #[serde(default)]
    placeholders: HashMap<String, String>,
}

fn default_task_file() -> PathBuf {
    PathBuf::from("tasks.json")
}

fn default_poll_frequency() -> HumanDuration {
    HumanDuration::from(std::time::Duration::from_millis(100))
}

// ---------------------------------------------------------------------------
// ChecklistConfig (resolved, validated)
// ---------------------------------------------------------------------------

/// Resolved, validated configuration for a checklist run.
///
/// Everything the task graph, the runtime, and the logging stack need
/// to know that isn't already baked into the task-file itself.
#[derive(Debug, Clone)]
pub struct ChecklistConfig {
    pub task_file: PathBuf,
    pub poll_frequency: HumanDuration,
    pub logging: LoggingConfig,
    pub placeholders: HashMap<String, String>,
}

impl ChecklistConfig {
    /// Read and parse a `checklist.toml` file. `task_file` in the result is
    /// resolved relative to `path`'s parent directory.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        let mut config: ChecklistConfig = content.parse()?;
        if config.task_file.is_relative() {
            if let Some(parent) = path.parent() {
                config.task_file = parent.join(&config.task_file);
            }
        }
        Ok(config)
    }

    /// Substitute every `%{key}%` placeholder in `text` from `self.placeholders`.
    /// Unlike the pre-existing stub this resolves from, an unresolved
    /// placeholder name is a hard error rather than silently passed through.
    pub fn fill_placeholders(&self, text: &str) -> anyhow::Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        loop {
            let Some(start) = rest.find("%{") else {
                out.push_str(rest);
                break;
            };
            out.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];
            let Some(end) = after_open.find("}%") else {
                anyhow::bail!("unterminated %{{ placeholder in {text:?}");
            };
            let key = &after_open[..end];
            let value = self
                .placeholders
                .get(key)
                .ok_or_else(|| anyhow::anyhow!("unknown placeholder %{{{key}}}% in {text:?}"))?;
            out.push_str(value);
            rest = &after_open[end + 2..];
        }
        Ok(out)
    }
}

impl FromStr for ChecklistConfig {
    type Err = anyhow::Error;

    fn from_str(toml_str: &str) -> anyhow::Result<Self> {
        let raw: ChecklistConfigRaw = toml::from_str(toml_str)?;
        let config = ChecklistConfig {
            task_file: raw.task_file,
            poll_frequency: raw.poll_frequency,
            logging: raw.logging,
            placeholders: raw.placeholders,
        };
        validate::validate(&config)?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_TOML: &str = r#"
task_file = "tasks.json"
poll_frequency = "100ms_is_not_supported_use_s"
"#;

    #[test]
    fn defaults_when_sections_omitted() {
        let cfg: ChecklistConfig = "".parse().unwrap();
        assert_eq!(cfg.task_file, PathBuf::from("tasks.json"));
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn load_placeholders() {
        let toml = r#"
[placeholders]
mic_model = "Shure SM58"
"#;
        let cfg: ChecklistConfig = toml.parse().unwrap();
        assert_eq!(cfg.placeholders["mic_model"], "Shure SM58");
    }

    #[test]
    fn fill_placeholders_substitutes() {
        let toml = r#"
[placeholders]
host = "church-foh"
"#;
        let cfg: ChecklistConfig = toml.parse().unwrap();
        let resolved = cfg.fill_placeholders("Log into %{host}% and check levels").unwrap();
        assert_eq!(resolved, "Log into church-foh and check levels");
    }

    #[test]
    fn fill_placeholders_rejects_unknown_key() {
        let cfg: ChecklistConfig = "".parse().unwrap();
        assert!(cfg.fill_placeholders("%{ghost}%").is_err());
    }

    #[test]
    fn reject_invalid_poll_frequency() {
        assert!(FULL_TOML.parse::<ChecklistConfig>().is_err());
    }

    #[test]
    fn custom_poll_frequency() {
        let toml = r#"poll_frequency = "1s""#;
        let cfg: ChecklistConfig = toml.parse().unwrap();
        assert_eq!(
            cfg.poll_frequency.as_duration(),
            std::time::Duration::from_secs(1)
        );
    }
}
