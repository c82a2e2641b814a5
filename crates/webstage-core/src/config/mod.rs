//! Run configuration.
//!
//! Two layers:
//! - [`DeployRequest`]: per-run inputs from the environment or flags,
//!   validated before any side effect
//! - [`DeploySettings`]: deployment-wide tunables from an optional
//!   `webstage.toml`, defaulting to the production constants

pub mod inputs;
pub mod parser;
pub mod settings;
pub mod store;

pub use inputs::{DeployRequest, RawInputs};
pub use parser::{parse_settings_toml, parse_settings_toml_str};
pub use settings::{DeploySettings, ToolSettings};
pub use store::{default_settings_path, load_settings};
