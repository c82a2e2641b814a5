//! Per-run isolated working directory.

use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{DeployError, Result};

/// A uniquely named directory that holds all local state of one run.
///
/// [`Workspace::release`] removes the tree. If a workspace is dropped without
/// being released (early return, panic unwinding) the drop performs the same
/// removal, so the directory never outlives the run.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    released: bool,
}

impl Workspace {
    /// Create `<base_dir>/<uuid>`.
    pub fn acquire(base_dir: &Path) -> Result<Self> {
        let root = base_dir.join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(&root).map_err(|source| DeployError::Resource {
            path: root.clone(),
            source,
        })?;
        tracing::debug!(workspace = %root.display(), "workspace acquired");
        Ok(Self {
            root,
            released: false,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    /// Remove the workspace tree.
    ///
    /// Moves the process out of the workspace first if it is inside it. The
    /// error is returned for reporting only; callers must not let it replace
    /// the run's own outcome.
    pub fn release(mut self) -> io::Result<PathBuf> {
        self.released = true;
        remove_tree(&self.root)?;
        Ok(self.root.clone())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = remove_tree(&self.root) {
            tracing::warn!(workspace = %self.root.display(), error = %err, "failed to remove workspace");
        }
    }
}

fn remove_tree(root: &Path) -> io::Result<()> {
    step_out_of(root);
    match std::fs::remove_dir_all(root) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

fn step_out_of(root: &Path) {
    if let Ok(cwd) = std::env::current_dir()
        && cwd.starts_with(root)
    {
        let refuge = root.parent().unwrap_or(Path::new("/"));
        if let Err(err) = std::env::set_current_dir(refuge) {
            tracing::warn!(error = %err, "failed to leave workspace before removal");
        }
    }
}
