//! # CLI Module - Command Line Interface
//!
//! Two subcommands cover the simulator's surface:
//!
//! ## `simulate`
//!
//! Runs independent replicates of a parsed program and writes the combined
//! trace, one `>=======` marker line before each replicate:
//!
//! ```bash
//! bcsim simulate --program model.json --replicates 100 --threads 8 \
//!     --max-transitions 10000 --output trace.txt
//! ```
//!
//! Defaults can live in a TOML file passed with `--config`; explicit flags
//! always win over file values. The `demos/` directory ships small
//! interchange programs and a sample configuration to start from:
//!
//! ```bash
//! bcsim simulate --program demos/countdown.json --config demos/run.toml
//! ```
//!
//! ## `validate`
//!
//! Loads a parsed program and reports structural problems (unresolved
//! process references, arity mismatches, malformed composition) without
//! running anything:
//!
//! ```bash
//! bcsim validate --program demos/handshake.json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run stochastic simulations of a parsed program
    Simulate {
        /// Parsed program in the JSON interchange form
        #[arg(short, long)]
        program: PathBuf,

        /// Optional TOML run configuration; explicit flags override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// File receiving the combined trace
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of independent replicates
        #[arg(short, long)]
        replicates: Option<usize>,

        /// Worker threads for replicate parallelism
        #[arg(short, long)]
        threads: Option<usize>,

        /// Transition bound per replicate
        #[arg(long)]
        max_transitions: Option<u64>,

        /// Simulated-time bound per replicate
        #[arg(long)]
        max_duration: Option<f64>,

        /// Base seed; replicate i seeds from seed + i
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Check a parsed program without running it
    Validate {
        /// Parsed program in the JSON interchange form
        #[arg(short, long)]
        program: PathBuf,
    },
}
