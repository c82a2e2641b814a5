//! Source-control access through the git CLI.
//!
//! - [`Remote`]: authenticated clone URLs with the token kept out of logs
//! - [`GitFetcher`]: shallow, single-branch clones into the workspace

mod fetcher;
mod remote;

pub use fetcher::{CloneFailure, GitFetcher, REPOS_DIR, checkout_dir};
pub use remote::Remote;
