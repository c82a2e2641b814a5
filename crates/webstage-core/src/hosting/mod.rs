//! Hosting control plane: declarative config, site provisioning, publishing.

pub mod cli;
pub mod config;
pub mod publish;
pub mod site;

pub use cli::HostingCli;
pub use config::{
    HostingTarget, PROJECT_BINDING_FILE, ROUTING_CONFIG_FILE, RewriteRule, RoutingConfig,
    STAGING_DIR, emit_project_binding, emit_routing_config, public_dir,
};
pub use publish::publish;
pub use site::{SiteStatus, bind_target, ensure_site};
