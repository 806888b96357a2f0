use std::path::PathBuf;
use std::thread;

use log::{error, info};
use ptmc_core::{ErrorInfo, PtError, Rank, Walker};

use crate::channel::LocalGroup;
use crate::config::RunConfig;
use crate::determinism;
use crate::driver::{ParallelTempering, ReplicaSummary};
use crate::manifest::RunManifest;
use crate::persistence::FileSink;

/// Results of a run launched with [`run_local`].
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRun {
    /// Per-rank summaries, ordered by rank.
    pub replicas: Vec<ReplicaSummary>,
    /// Manifest written to the run directory, if persistence is enabled.
    pub manifest_path: Option<PathBuf>,
}

/// Runs `participants` replicas on scoped threads over a [`LocalGroup`].
///
/// `make_walker` receives each rank and its deterministic walker seed. If any
/// participant fails, including while building its walker, the whole run
/// fails: the first non-transport error is reported, since transport errors on
/// the other ranks are its consequence.
pub fn run_local<W, F>(
    config: &RunConfig,
    participants: usize,
    make_walker: F,
) -> Result<LocalRun, PtError>
where
    W: Walker,
    F: Fn(Rank, u64) -> Result<W, PtError> + Sync,
{
    config.validate()?;
    let channels = LocalGroup::new(participants, config.exchange.timeout())
        .channels::<W::Config>()?;
    let run_directory = config.output.run_directory.clone();
    info!(
        "launching {participants} replicas, T in [{}, {}], {} iterations",
        config.ladder.t_min, config.ladder.t_max, config.max_iterations
    );

    let results: Vec<Result<ReplicaSummary, PtError>> = thread::scope(|scope| {
        let handles: Vec<_> = channels
            .into_iter()
            .enumerate()
            .map(|(rank, channel)| {
                let make_walker = &make_walker;
                let run_directory = run_directory.clone();
                scope.spawn(move || {
                    let seed = determinism::replica_seed(config.seed_policy.master_seed, rank);
                    let walker = make_walker(rank, seed)?;
                    let sink = run_directory.map(FileSink::new);
                    let mut driver = ParallelTempering::new(walker, channel, sink, config.clone())?;
                    driver.run()
                })
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, handle)| {
                handle.join().unwrap_or_else(|_| {
                    Err(PtError::Transport(
                        ErrorInfo::new("participant-panicked", "participant thread panicked")
                            .with_context("rank", rank.to_string()),
                    ))
                })
            })
            .collect()
    });

    let mut replicas = Vec::with_capacity(participants);
    let mut failures = Vec::new();
    for (rank, result) in results.into_iter().enumerate() {
        match result {
            Ok(summary) => replicas.push(summary),
            Err(err) => {
                error!("rank {rank} aborted: {err}");
                failures.push(err);
            }
        }
    }
    if !failures.is_empty() {
        let root_cause = failures
            .iter()
            .position(|err| !matches!(err, PtError::Transport(_)))
            .unwrap_or(0);
        return Err(failures.swap_remove(root_cause));
    }

    let manifest_path = match &config.output.run_directory {
        Some(dir) => {
            let path = dir.join(&config.output.manifest_file);
            RunManifest::new(config, replicas.clone())?.write(&path)?;
            Some(path)
        }
        None => None,
    };
    Ok(LocalRun {
        replicas,
        manifest_path,
    })
}
