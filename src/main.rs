use bcsim_lib::cli::{Cli, Commands};
use bcsim_lib::error::SimResult;
use bcsim_lib::io;
use bcsim_lib::system::{RunOptions, simulate_system};
use clap::Parser;
use std::path::PathBuf;

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> SimResult<()> {
    match cli.command {
        Commands::Simulate {
            program,
            config,
            output,
            replicates,
            threads,
            max_transitions,
            max_duration,
            seed,
        } => {
            let file_config = match config {
                Some(path) => io::load_config(&path)?,
                None => io::RunConfig::default(),
            };
            let program = io::load_program(&program)?;
            let options = RunOptions {
                replicates: replicates.or(file_config.replicates).unwrap_or(1),
                threads: threads.or(file_config.threads).unwrap_or(4),
                max_transitions: max_transitions
                    .or(file_config.max_transitions)
                    .unwrap_or(u64::MAX),
                max_duration: max_duration
                    .or(file_config.max_duration)
                    .unwrap_or(f64::INFINITY),
                seed: seed.or(file_config.seed),
            };
            let output = output
                .or(file_config.output)
                .unwrap_or_else(|| PathBuf::from("trace.txt"));
            simulate_system(&program, &options, &output)?;
            println!(
                "wrote {} replicate{} to {}",
                options.replicates,
                if options.replicates == 1 { "" } else { "s" },
                output.display()
            );
            Ok(())
        }
        Commands::Validate { program } => {
            let loaded = io::load_program(&program)?;
            println!(
                "ok: {} definitions, {} initial processes",
                loaded.definitions.len(),
                loaded.initial.len()
            );
            Ok(())
        }
    }
}
