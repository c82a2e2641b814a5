//! Locating and loading `webstage.toml`.

use std::path::{Path, PathBuf};

use super::parser::parse_settings_toml;
use super::settings::DeploySettings;

pub const SETTINGS_FILE: &str = "webstage.toml";

/// `<config_dir>/webstage/webstage.toml`, when a config dir exists.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("webstage").join(SETTINGS_FILE))
}

/// Load settings.
///
/// An explicit path must exist. Without one, the default location is used
/// if present and built-in defaults otherwise.
pub fn load_settings(explicit: Option<&Path>) -> anyhow::Result<DeploySettings> {
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("Settings file not found: {}", path.display());
        }
        return parse_settings_toml(path);
    }

    match default_settings_path() {
        Some(path) if path.exists() => {
            tracing::debug!(path = %path.display(), "loading settings");
            parse_settings_toml(&path)
        }
        _ => Ok(DeploySettings::default()),
    }
}
