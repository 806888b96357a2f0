use std::error::Error;

use clap::Args;
use ptmc_exchange::{build_ladder, LadderConfig};
use serde_json::json;

#[derive(Args, Debug)]
pub struct LadderArgs {
    #[arg(long)]
    pub t_min: f64,
    #[arg(long)]
    pub t_max: f64,
    /// Number of participants sharing the ladder.
    #[arg(long)]
    pub replicas: usize,
}

pub fn run(args: &LadderArgs) -> Result<(), Box<dyn Error>> {
    let bounds = LadderConfig {
        t_min: args.t_min,
        t_max: args.t_max,
    };
    let ladder = build_ladder(&bounds, args.replicas)?;
    let ratios: Vec<f64> = ladder.windows(2).map(|pair| pair[1] / pair[0]).collect();
    let report = json!({
        "t_min": args.t_min,
        "t_max": args.t_max,
        "replicas": args.replicas,
        "temperatures": ladder,
        "ratio": ratios.first().copied(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
