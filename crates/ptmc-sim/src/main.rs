use std::error::Error;

use clap::{Parser, Subcommand};
use commands::{
    ladder::{self, LadderArgs},
    run::{self, RunArgs},
};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "ptmc-sim", about = "Parallel tempering Monte Carlo driver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run harmonic-well replicas under parallel tempering from a YAML configuration.
    Run(RunArgs),
    /// Print the geometric temperature ladder for the given bounds.
    Ladder(LadderArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run::run(&args),
        Command::Ladder(args) => ladder::run(&args),
    }
}
