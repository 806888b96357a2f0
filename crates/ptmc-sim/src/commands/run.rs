use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use log::info;
use ptmc_exchange::{run_local, HarmonicConfig, HarmonicWalker, RunConfig};
use serde::{Deserialize, Serialize};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// YAML configuration describing the run.
    #[arg(long)]
    pub config: PathBuf,
    /// Output directory for run artefacts.
    #[arg(long)]
    pub out: PathBuf,
    /// Overrides the replica count from the configuration.
    #[arg(long)]
    pub replicas: Option<usize>,
}

/// Run configuration plus the participant count and walker tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(flatten)]
    pub run: RunConfig,
    #[serde(default = "default_replicas")]
    pub replicas: usize,
    #[serde(default)]
    pub walker: HarmonicConfig,
}

fn default_replicas() -> usize {
    4
}

pub fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(&args.out)?;
    let mut sim = load_config(&args.config)?;
    if let Some(replicas) = args.replicas {
        sim.replicas = replicas;
    }
    sim.run.output.run_directory = Some(args.out.clone());
    sim.run.validate()?;
    sim.walker.validate()?;

    let walker = sim.walker.clone();
    let outcome = run_local(&sim.run, sim.replicas, |_, seed| {
        HarmonicWalker::new(walker.clone(), seed)
    })?;

    fs::write(
        args.out.join("summary.json"),
        serde_json::to_string_pretty(&outcome.replicas)?,
    )?;
    // Keep the effective configuration next to the artefacts.
    fs::write(args.out.join("config.yaml"), serde_yaml::to_string(&sim)?)?;
    if let Some(path) = &outcome.manifest_path {
        info!("manifest written to {}", path.display());
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<SimConfig, Box<dyn Error>> {
    let text = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&text)?)
}
