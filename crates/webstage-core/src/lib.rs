//! Webstage Core Library
//!
//! One-shot preview deployments: fetch web repositories, build them, stage
//! their outputs under a single hosting site and publish it, recording the
//! whole run in a request-scoped log.

pub mod builder;
pub mod command;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod fakes;
pub mod fs;
pub mod git;
pub mod hosting;
pub mod identity;
pub mod pipeline;
pub mod runlog;
pub mod stage;
pub mod storage;
pub mod workspace;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{DeployRequest, DeploySettings, RawInputs, load_settings};

    // Pipeline
    pub use crate::pipeline::{DeployPipeline, DeployReport};

    // External commands
    pub use crate::command::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};

    // Errors
    pub use crate::error::{DeployError, Result, error_chain};

    // Hosting
    pub use crate::hosting::{HostingTarget, SiteStatus};

    // Storage
    pub use crate::storage::{BlobStore, GcsBlobStore};

    // Identity
    pub use crate::identity::resolve_site_id;
}
