//! Site creation and target binding.

use std::path::Path;

use serde::Serialize;

use super::cli::HostingCli;
use crate::command::CommandOutput;
use crate::error::{DeployError, Result};

/// Outcome of [`ensure_site`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteStatus {
    Created,
    AlreadyExists,
}

impl SiteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SiteStatus::Created => "created",
            SiteStatus::AlreadyExists => "already_exists",
        }
    }
}

const CONFLICT_MARKERS: [&str; 4] = [
    "already exists",
    "already_exists",
    "http error: 409",
    "409 conflict",
];

/// Whether a failed create reported that the site exists.
pub fn is_conflict(output: &CommandOutput) -> bool {
    let text = format!("{}\n{}", output.stdout, output.stderr).to_ascii_lowercase();
    CONFLICT_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Create the site unless it already exists.
///
/// Only a conflict response is tolerated; any other failure is fatal, so a
/// transient control-plane error never passes for an existing site.
pub fn ensure_site(
    cli: &HostingCli<'_>,
    workspace_root: &Path,
    site_id: &str,
    project_id: &str,
) -> Result<SiteStatus> {
    let log = cli.log();
    log.info(format!(
        "Ensuring hosting site {} exists in project {}",
        site_id, project_id
    ));
    let args = vec![
        "hosting:sites:create".to_string(),
        site_id.to_string(),
        format!("--project={}", project_id),
    ];
    let output = cli.run(&args, workspace_root)?;

    if output.success() {
        log.info(format!("Site {} created", site_id));
        return Ok(SiteStatus::Created);
    }
    if is_conflict(&output) {
        log.info(format!("Site {} already exists, continuing", site_id));
        return Ok(SiteStatus::AlreadyExists);
    }

    log.error(format!("Creating site {} failed", site_id));
    Err(DeployError::SiteProvision {
        site_id: site_id.to_string(),
        output: output.diagnostics(),
    })
}

/// Bind the hosting target to the site. Rebinding the same pair is a no-op
/// on the control plane.
pub fn bind_target(
    cli: &HostingCli<'_>,
    workspace_root: &Path,
    target_name: &str,
    site_id: &str,
    project_id: &str,
) -> Result<()> {
    let log = cli.log();
    log.info(format!(
        "Binding target '{}' to site '{}' in project {}",
        target_name, site_id, project_id
    ));
    let args = vec![
        "target:apply".to_string(),
        "hosting".to_string(),
        target_name.to_string(),
        site_id.to_string(),
        format!("--project={}", project_id),
    ];
    let output = cli.run(&args, workspace_root)?;

    if !output.success() {
        log.error(format!("Binding target '{}' failed", target_name));
        return Err(DeployError::Bind {
            target: target_name.to_string(),
            site_id: site_id.to_string(),
            output: output.diagnostics(),
        });
    }
    log.info(format!("Target '{}' bound to site '{}'", target_name, site_id));
    Ok(())
}
