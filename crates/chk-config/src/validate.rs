use crate::config::ChecklistConfig;

/// Internal validation, called automatically during `ChecklistConfig::from_str` / `load`.
pub(crate) fn validate(config: &ChecklistConfig) -> anyhow::Result<()> {
    if config.poll_frequency.as_duration().is_zero() {
        anyhow::bail!("poll_frequency must be > 0");
    }

    if config.task_file.as_os_str().is_empty() {
        anyhow::bail!("task_file must be a non-empty path");
    }

    for key in config.placeholders.keys() {
        if !is_valid_placeholder_name(key) {
            anyhow::bail!(
                "placeholders: invalid key {:?} — must match [A-Za-z_][A-Za-z0-9_]*",
                key,
            );
        }
    }

    Ok(())
}

/// A valid placeholder key starts with an ASCII letter or underscore,
/// followed by ASCII alphanumerics or underscores.
fn is_valid_placeholder_name(name: &str) -> bool {
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
    use crate::config::ChecklistConfig;

    #[test]
    fn reject_invalid_placeholder_name() {
        let toml = "[placeholders]\n\"bad-name\" = \"x\"\n";
        let err = toml.parse::<ChecklistConfig>().unwrap_err();
        assert!(err.to_string().contains("bad-name"));
    }

    #[test]
    fn reject_zero_poll_frequency() {
        let toml = "poll_frequency = \"0s\"\n";
        assert!(toml.parse::<ChecklistConfig>().is_err());
    }
}
