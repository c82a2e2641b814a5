//! Assembly of the site's staging tree from build outputs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::context::RepositoryEntry;
use crate::error::{DeployError, Result};
use crate::fs::{hash_tree, list_dir, merge_copy};
use crate::hosting::STAGING_DIR;
use crate::runlog::RunLog;

/// The shared staging root of one site, `<workspace>/deploy_staging/<site>`.
///
/// Created once per run. Each repository's output lands in its own
/// subdirectory, so staging order never affects the final tree.
#[derive(Debug)]
pub struct StagingTree {
    root: PathBuf,
    staged: BTreeMap<String, String>,
}

impl StagingTree {
    /// Clear any stale root and create it fresh.
    pub fn create(workspace_root: &Path, site_id: &str) -> Result<Self> {
        let root = workspace_root.join(STAGING_DIR).join(site_id);
        let to_error = |source| DeployError::Resource {
            path: root.clone(),
            source,
        };
        if root.exists() {
            std::fs::remove_dir_all(&root).map_err(to_error)?;
        }
        std::fs::create_dir_all(&root).map_err(to_error)?;
        Ok(Self {
            root,
            staged: BTreeMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Digest of each staged repository subdirectory, keyed by name.
    pub fn staged(&self) -> &BTreeMap<String, String> {
        &self.staged
    }

    pub fn repo_dir(&self, repo_name: &str) -> PathBuf {
        self.root.join(repo_name)
    }

    /// Merge-copy the entry's build output into `<root>/<repo>`.
    pub fn stage(&mut self, entry: &RepositoryEntry, log: &RunLog) -> Result<PathBuf> {
        let output = match &entry.build_output {
            Some(path) if path.is_dir() => path.clone(),
            Some(path) => return Err(self.missing_output(entry, path.clone(), log)),
            None => {
                let expected = crate::builder::build_output_dir(&entry.local_path);
                return Err(self.missing_output(entry, expected, log));
            }
        };

        let dest = self.repo_dir(&entry.name);
        log.info(format!(
            "Staging '{}' from {} to {}",
            entry.name,
            output.display(),
            dest.display()
        ));
        let copied = merge_copy(&output, &dest).map_err(|e| DeployError::StageCopy {
            repo: entry.name.clone(),
            detail: format!("{:#}", e),
        })?;

        self.log_listing(&dest, log);
        // Diagnostics only; a failed digest does not fail the stage.
        let digest = match hash_tree(&dest) {
            Ok(digest) => digest,
            Err(e) => {
                log.error(format!("Failed to hash {}: {:#}", dest.display(), e));
                String::new()
            }
        };
        log.info(format!(
            "Staged {} files for '{}' (digest {})",
            copied, entry.name, digest
        ));
        self.staged.insert(entry.name.clone(), digest);
        Ok(dest)
    }

    pub fn stage_all(&mut self, entries: &[RepositoryEntry], log: &RunLog) -> Result<()> {
        for entry in entries {
            self.stage(entry, log)?;
        }
        Ok(())
    }

    fn missing_output(&self, entry: &RepositoryEntry, path: PathBuf, log: &RunLog) -> DeployError {
        log.error(format!(
            "Build output for '{}' not found at {}",
            entry.name,
            path.display()
        ));
        DeployError::Stage {
            repo: entry.name.clone(),
            path,
        }
    }

    fn log_listing(&self, dest: &Path, log: &RunLog) {
        for dir in [self.root.as_path(), dest] {
            match list_dir(dir) {
                Ok(names) => log.info(format!("Contents of {}: {}", dir.display(), names.join(", "))),
                Err(e) => log.error(format!("Failed to list {}: {:#}", dir.display(), e)),
            }
        }
    }
}
