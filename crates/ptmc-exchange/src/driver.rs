use log::{debug, info, warn, Level};
use ptmc_core::{ErrorInfo, PtError, Rank, Walker};
use serde::{Deserialize, Serialize};

use crate::channel::CollectiveChannel;
use crate::config::RunConfig;
use crate::exchange::{Coordinator, ExchangePattern, ExchangeRole, Follower, LadderStatistics};
use crate::persistence::{DiagnosticSink, ParameterReport};
use crate::replica::ReplicaState;
use crate::tempering;

/// Lifecycle of a participant's PT loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Constructed; ladder not yet distributed.
    Uninitialized,
    /// Temperature received and walker primed; no iteration run yet.
    Initialized,
    /// At least one iteration completed, more remain.
    Running,
    /// `max_iterations` reached.
    Finished,
}

/// Result reported by each participant once its loop finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaSummary {
    /// Rank of the participant.
    pub rank: Rank,
    /// Temperature pinned to the rank.
    pub temperature: f64,
    /// Completed PT iterations.
    pub iterations: usize,
    /// Accepted swaps this rank took part in.
    pub swaps: usize,
    /// Energy of the final configuration.
    pub final_energy: f64,
    /// Walker local-move acceptance fraction.
    pub accepted_fraction: f64,
    /// Local Monte Carlo moves attempted by the walker.
    pub mc_steps: usize,
    /// Permutation-log rows emitted (coordinator only, zero elsewhere).
    pub permutation_entries: usize,
    /// Exchange statistics per adjacent pair, coordinator only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ladder_statistics: Option<LadderStatistics>,
}

/// Per-participant parallel tempering driver.
///
/// Every participant runs the same loop. Each iteration steps the local
/// walker, gathers energies on the coordinator, receives the broadcast
/// pattern and, if paired, swaps its payload with the named partner. The
/// gather/broadcast pair is the single synchronisation point per iteration.
pub struct ParallelTempering<W, Ch, S>
where
    W: Walker,
{
    walker: W,
    channel: Ch,
    sink: S,
    config: RunConfig,
    role: Box<dyn ExchangeRole>,
    replica: Option<ReplicaState<W::Config>>,
    phase: Phase,
    permutation_entries: usize,
}

impl<W, Ch, S> ParallelTempering<W, Ch, S>
where
    W: Walker,
    Ch: CollectiveChannel<W::Config>,
    S: DiagnosticSink,
{
    /// Validates the configuration and assigns the coordinator role to rank 0.
    ///
    /// The coordinator builds the ladder here, so configuration errors surface
    /// before any collective operation is entered.
    pub fn new(walker: W, channel: Ch, sink: S, config: RunConfig) -> Result<Self, PtError> {
        config.validate()?;
        let participants = channel.size();
        if participants < 2 {
            return Err(PtError::Config(
                ErrorInfo::new(
                    "ladder-participants",
                    "parallel tempering requires at least two participants",
                )
                .with_context("participants", participants.to_string()),
            ));
        }
        let role: Box<dyn ExchangeRole> = if channel.is_root() {
            let ladder = tempering::build_ladder(&config.ladder, participants)?;
            Box::new(Coordinator::new(
                ladder,
                config.seed_policy.master_seed,
                config.verbose,
            ))
        } else {
            Box::new(Follower)
        };
        Ok(Self {
            walker,
            channel,
            sink,
            config,
            role,
            replica: None,
            phase: Phase::Uninitialized,
            permutation_entries: 0,
        })
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns true on the participant that computes exchange patterns.
    pub fn is_coordinator(&self) -> bool {
        self.role.is_coordinator()
    }

    /// Replica state, available once initialised.
    pub fn replica(&self) -> Option<&ReplicaState<W::Config>> {
        self.replica.as_ref()
    }

    /// Local walker.
    pub fn walker(&self) -> &W {
        &self.walker
    }

    /// Diagnostic sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Consumes the driver and returns the walker and sink.
    pub fn into_parts(self) -> (W, S) {
        (self.walker, self.sink)
    }

    /// Distributes the ladder and primes the walker at its temperature.
    pub fn initialise(&mut self) -> Result<(), PtError> {
        if self.phase != Phase::Uninitialized {
            return Err(self.out_of_phase("initialise"));
        }
        let rank = self.channel.rank();
        let ladder = self.role.ladder().map(<[f64]>::to_vec);
        let temperature = self.channel.scatter(ladder.as_deref())?;
        if let Some(ladder) = &ladder {
            self.sink.record_ladder(ladder).map_err(sink_failure)?;
        }

        let (config, energy) = self.walker.config();
        self.walker.set_temperature(temperature);
        self.replica = Some(ReplicaState::new(rank, temperature, config, energy));
        self.phase = if self.config.max_iterations == 0 {
            Phase::Finished
        } else {
            Phase::Initialized
        };
        log::log!(self.verbosity(), "processor {rank} temperature {temperature}");
        Ok(())
    }

    /// Runs one PT iteration and returns the phase reached.
    ///
    /// On error the replica keeps the state it had when the failure hit, so
    /// [`summary`](Self::summary) still reports how far the participant got.
    pub fn step(&mut self) -> Result<Phase, PtError> {
        match self.phase {
            Phase::Uninitialized => return Err(self.out_of_phase("step")),
            Phase::Finished => return Ok(Phase::Finished),
            Phase::Initialized | Phase::Running => {}
        }
        let mut replica = self.replica.take().ok_or_else(|| self.out_of_phase("step"))?;
        let iteration = replica.iteration();

        let pattern = match self.agree_on_pattern(&mut replica) {
            Ok(pattern) => pattern,
            Err(err) => {
                self.replica = Some(replica);
                return Err(err);
            }
        };
        if let Some(partner) = pattern.partner(replica.rank()) {
            replica = self.swap(replica, partner)?;
        }

        replica.advance();
        let finished = replica.iteration() >= self.config.max_iterations;
        self.replica = Some(replica);
        self.phase = if finished {
            Phase::Finished
        } else {
            Phase::Running
        };
        self.record_iteration(iteration, &pattern, finished)?;
        Ok(self.phase)
    }

    /// Local walker step followed by the gather/propose/broadcast round.
    fn agree_on_pattern(
        &mut self,
        replica: &mut ReplicaState<W::Config>,
    ) -> Result<ExchangePattern, PtError> {
        self.walker.step()?;
        let (config, energy) = self.walker.config();
        replica.update(config, energy);

        let energies = self.channel.gather(energy)?;
        let proposed = self.role.propose_exchanges(replica.iteration(), energies)?;
        let pattern = self.channel.broadcast(proposed)?;
        pattern.validate(self.channel.size())?;
        Ok(pattern)
    }

    fn swap(
        &mut self,
        replica: ReplicaState<W::Config>,
        partner: Rank,
    ) -> Result<ReplicaState<W::Config>, PtError> {
        let (rank, temperature) = (replica.rank(), replica.temperature());
        let (iteration, swaps) = (replica.iteration(), replica.swaps());
        match replica.swap_through(&mut self.channel, partner) {
            Ok(replica) => {
                self.walker.set_config(replica.config().clone(), replica.energy());
                debug!("rank {rank} swapped with {partner} at iteration {iteration}");
                Ok(replica)
            }
            Err(err) => {
                // the walker still holds the payload that was handed to the channel
                let (config, energy) = self.walker.config();
                self.replica = Some(ReplicaState::resume(
                    rank,
                    temperature,
                    config,
                    energy,
                    iteration,
                    swaps,
                ));
                Err(err)
            }
        }
    }

    fn record_iteration(
        &mut self,
        iteration: usize,
        pattern: &ExchangePattern,
        finished: bool,
    ) -> Result<(), PtError> {
        if self.role.is_coordinator() && pattern.any_swap() {
            self.sink
                .record_permutation(iteration, pattern)
                .map_err(sink_failure)?;
            self.permutation_entries += 1;
        }
        if iteration % self.config.persistence_period == 0 {
            self.sink
                .record_snapshot(self.channel.rank(), iteration, &self.walker)
                .map_err(sink_failure)?;
        }
        if finished {
            if let Some(report) = self.replica.as_ref().map(|r| self.parameter_report(r)) {
                self.sink.record_parameters(&report).map_err(sink_failure)?;
            }
        }
        Ok(())
    }

    /// Drives the loop from its current phase to [`Phase::Finished`].
    pub fn run(&mut self) -> Result<ReplicaSummary, PtError> {
        if self.phase == Phase::Uninitialized {
            self.initialise()?;
        }
        while self.phase != Phase::Finished {
            self.step()?;
        }
        let summary = self.summary()?;
        info!(
            "rank {} finished: T={} iterations={} swaps={} acceptance={:.3}",
            summary.rank,
            summary.temperature,
            summary.iterations,
            summary.swaps,
            summary.accepted_fraction
        );
        if let Some(stats) = &summary.ladder_statistics {
            info!(
                "exchange acceptance per adjacent pair: rates {:?}, mean w {:?}",
                stats.acceptance_rates(),
                stats.mean_acceptance()
            );
        }
        Ok(summary)
    }

    /// Snapshot of the participant's results so far.
    pub fn summary(&self) -> Result<ReplicaSummary, PtError> {
        let replica = self
            .replica
            .as_ref()
            .ok_or_else(|| self.out_of_phase("summary"))?;
        Ok(ReplicaSummary {
            rank: replica.rank(),
            temperature: replica.temperature(),
            iterations: replica.iteration(),
            swaps: replica.swaps(),
            final_energy: replica.energy(),
            accepted_fraction: self.walker.accepted_fraction(),
            mc_steps: self.walker.iterations(),
            permutation_entries: self.permutation_entries,
            ladder_statistics: self.role.statistics().cloned(),
        })
    }

    fn parameter_report(&self, replica: &ReplicaState<W::Config>) -> ParameterReport {
        ParameterReport {
            node: replica.rank(),
            temperature: replica.temperature(),
            initial_step_size: self.walker.initial_step_size(),
            adapted_step_size: self.walker.step_size(),
            pt_iterations: replica.iteration(),
            total_mc_iterations: self.walker.iterations(),
            acceptance_fraction: self.walker.accepted_fraction(),
        }
    }

    fn verbosity(&self) -> Level {
        if self.config.verbose {
            Level::Info
        } else {
            Level::Debug
        }
    }

    fn out_of_phase(&self, operation: &str) -> PtError {
        PtError::Protocol(
            ErrorInfo::new("phase", "operation not valid in the current phase")
                .with_context("operation", operation.to_string())
                .with_context("phase", format!("{:?}", self.phase))
                .with_context("rank", self.channel.rank().to_string()),
        )
    }
}

fn sink_failure(err: PtError) -> PtError {
    warn!("diagnostic sink failed: {err}");
    err
}
