//! # IO Module - Program Loading and Run Configuration
//!
//! Programs reach the simulator as a JSON document produced by an external
//! parser frontend: definitions, the initial system, and the global
//! environment, with expressions already flattened to postfix token
//! streams. Loading finalizes the trees (stamping each node with its
//! owning definition) and validates structural well-formedness before the
//! engine ever sees them.
//!
//! Run configuration is a small optional TOML file; command-line flags
//! override whatever it sets.

pub mod config;

use std::fs;
use std::path::Path;

use crate::error::SimResult;
use crate::syntax::Program;

pub use config::{RunConfig, load_config};

/// Reads, finalizes, and validates a parsed program.
pub fn load_program(path: &Path) -> SimResult<Program> {
    let text = fs::read_to_string(path)?;
    let mut program: Program = serde_json::from_str(&text)?;
    program.finalize();
    program.validate()?;
    Ok(program)
}

/// Writes a program in the JSON interchange form, pretty-printed so the
/// result stays reviewable next to the model source.
pub fn save_program(program: &Program, path: &Path) -> SimResult<()> {
    let text = serde_json::to_string_pretty(program)?;
    fs::write(path, text)?;
    Ok(())
}
