//! `webstage.toml` parsing with line-context error messages.

use std::path::Path;

use anyhow::{Context, Result};

use super::settings::DeploySettings;

/// Parse a settings file from disk.
pub fn parse_settings_toml(path: &Path) -> Result<DeploySettings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

    parse_settings_toml_str(&content)
        .with_context(|| format!("Failed to parse settings file: {}", path.display()))
}

/// Parse settings from a TOML string and validate them.
pub fn parse_settings_toml_str(content: &str) -> Result<DeploySettings> {
    let settings: DeploySettings =
        toml::from_str(content).map_err(|e| describe_toml_error(e, content))?;
    settings.validate()?;
    Ok(settings)
}

fn describe_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let message = error.message().to_string();
    match error.span() {
        Some(span) => {
            let line = content[..span.start.min(content.len())].matches('\n').count() + 1;
            anyhow::anyhow!(
                "TOML error at line {}:\n{}\n\nError: {}",
                line,
                excerpt(content, line),
                message
            )
        }
        None => anyhow::anyhow!("TOML error: {}", message),
    }
}

/// Up to two lines either side of `line` (1-based), with the line marked.
fn excerpt(content: &str, line: usize) -> String {
    content
        .lines()
        .enumerate()
        .map(|(idx, text)| (idx + 1, text))
        .filter(|(num, _)| num.abs_diff(line) <= 2)
        .map(|(num, text)| {
            let marker = if num == line { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
