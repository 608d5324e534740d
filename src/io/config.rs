//! Run configuration files.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SimResult;

/// Optional run settings, loadable from TOML. Every field may be omitted;
/// command-line flags take precedence over file values, and the driver's
/// defaults apply last.
///
/// ```toml
/// replicates = 100
/// threads = 8
/// max_transitions = 10000
/// max_duration = 500.0
/// seed = 42
/// output = "trace.txt"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub replicates: Option<usize>,
    pub threads: Option<usize>,
    pub max_transitions: Option<u64>,
    pub max_duration: Option<f64>,
    pub seed: Option<u64>,
    pub output: Option<PathBuf>,
}

pub fn load_config(path: &Path) -> SimResult<RunConfig> {
    let text = fs::read_to_string(path)?;
    let config = toml::from_str(&text)?;
    Ok(config)
}
