//! Pushing the staged tree live.

use std::path::Path;

use super::cli::HostingCli;
use crate::error::{DeployError, Result};

/// Deploy only `target_name`, without interactive confirmation.
pub fn publish(
    cli: &HostingCli<'_>,
    workspace_root: &Path,
    target_name: &str,
    project_id: &str,
) -> Result<()> {
    let log = cli.log();
    log.info(format!("Publishing target {}", target_name));
    let args = vec![
        "deploy".to_string(),
        format!("--project={}", project_id),
        format!("--only=hosting:{}", target_name),
        "--force".to_string(),
    ];
    let output = cli.run(&args, workspace_root)?;

    if !output.success() {
        log.error(format!("Publishing target {} failed", target_name));
        return Err(DeployError::Publish {
            target: target_name.to_string(),
            output: output.diagnostics(),
        });
    }
    log.info(format!("Target {} published", target_name));
    Ok(())
}
