//! Webstage - one-shot preview deployments
//!
//! Usage:
//!   webstage deploy                 # Run a deployment (inputs from env or flags)
//!   webstage site-id <REQUEST_ID>   # Print the site a request deploys to
//!   webstage render-config ...      # Print the hosting documents for a site

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webstage_core::config::inputs::parse_repo_names;
use webstage_core::hosting::config::ProjectBinding;
use webstage_core::prelude::*;

#[derive(Parser)]
#[command(name = "webstage")]
#[command(about = "One-shot preview deployments for web repositories", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, build, stage and publish repositories to a preview site
    ///
    /// Every flag falls back to its environment variable.
    Deploy(DeployArgs),

    /// Print the site identifier derived from a request identifier
    SiteId {
        request_id: String,
    },

    /// Print `.firebaserc` and `firebase.json` for a site as JSON
    RenderConfig {
        /// Site identifier (also the target name)
        #[arg(long)]
        site: String,

        /// JSON array of repository names
        #[arg(long)]
        repos: String,

        /// Hosting project (defaults to the configured one)
        #[arg(long)]
        project_id: Option<String>,

        /// Settings file
        #[arg(long, env = "WEBSTAGE_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct DeployArgs {
    /// Settings file
    #[arg(long, env = "WEBSTAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Request identifier [env: REQUEST_ID]
    #[arg(long)]
    request_id: Option<String>,

    /// Source-control project [env: AZURE_PROJECT_NAME]
    #[arg(long)]
    project: Option<String>,

    /// JSON array of repository names [env: AZURE_REPO_NAMES]
    #[arg(long)]
    repos: Option<String>,

    /// Source-control access token [env: AZURE_PAT]
    #[arg(long)]
    pat: Option<String>,

    /// Bucket receiving the run log [env: GCS_BUCKET_NAME]
    #[arg(long)]
    bucket: Option<String>,
}

impl DeployArgs {
    /// Flags override the environment.
    fn inputs(&self) -> RawInputs {
        let env = RawInputs::from_env();
        RawInputs {
            request_id: self.request_id.clone().or(env.request_id),
            project_name: self.project.clone().or(env.project_name),
            repo_names: self.repos.clone().or(env.repo_names),
            access_token: self.pat.clone().or(env.access_token),
            bucket: self.bucket.clone().or(env.bucket),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webstage=debug,webstage_core=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Deploy(args) => run_deploy(&args),
        Commands::SiteId { request_id } => {
            println!("{}", resolve_site_id(&request_id));
            Ok(())
        }
        Commands::RenderConfig {
            site,
            repos,
            project_id,
            config,
        } => run_render_config(&site, &repos, project_id, config),
    }
}

fn run_deploy(args: &DeployArgs) -> Result<()> {
    let settings = load_settings(args.config.as_deref())?;
    let request = args.inputs().validate()?;
    tracing::info!(request = ?request, "deployment requested");

    let runner = SystemRunner::new()?;
    let store = GcsBlobStore::new(&runner, &settings);
    let report = DeployPipeline::new(&settings, &runner, &store)
        .run(&request)
        .map_err(|err| {
            tracing::error!("{}", error_chain(&err));
            err
        })?;

    let rendered = serde_json::to_string_pretty(&report).context("Failed to render report")?;
    println!("{}", rendered);
    Ok(())
}

fn run_render_config(
    site: &str,
    repos: &str,
    project_id: Option<String>,
    config: Option<PathBuf>,
) -> Result<()> {
    let repo_names = parse_repo_names(repos)?;
    let project_id = match project_id {
        Some(id) => id,
        None => load_settings(config.as_deref())?.hosting_project_id,
    };
    let target = HostingTarget::for_site(site, &project_id, &repo_names);

    let documents = serde_json::json!({
        ".firebaserc": ProjectBinding::new(&project_id),
        "firebase.json": target.routing_config(),
    });
    println!("{}", serde_json::to_string_pretty(&documents)?);
    Ok(())
}
