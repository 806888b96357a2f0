#![deny(missing_docs)]

//! Replica-exchange (parallel tempering) coordination over a collective channel.
//!
//! Each participant owns one temperature slot of a geometric ladder. Every
//! iteration the participants step their walkers, the coordinator gathers the
//! energies, pairs neighbouring slots under the Metropolis replica-exchange
//! criterion and broadcasts the resulting pattern, and paired participants
//! swap their configurations point to point.

/// Collective-communication contract and the in-process transport.
pub mod channel;
/// YAML configuration schema and defaults.
pub mod config;
/// Deterministic seed derivation helpers.
pub mod determinism;
/// Per-participant PT loop.
pub mod driver;
/// Pairing, acceptance decisions and the coordinator role.
pub mod exchange;
/// Reference harmonic-well walker.
pub mod harmonic;
/// Thread-per-replica launcher.
pub mod launch;
/// Run manifest serialization helpers.
pub mod manifest;
/// Diagnostic sinks for ladder, permutation and histogram artefacts.
pub mod persistence;
/// Per-participant replica state.
pub mod replica;
/// Temperature ladder and Metropolis exchange acceptance.
pub mod tempering;

pub use channel::{CollectiveChannel, LocalChannel, LocalGroup, ReplicaPayload};
pub use config::{ExchangeConfig, LadderConfig, OutputConfig, RunConfig, SeedPolicy};
pub use driver::{ParallelTempering, Phase, ReplicaSummary};
pub use exchange::{
    candidate_pairs, propose_pattern, Coordinator, Direction, ExchangePattern, ExchangeRole,
    Follower, LadderStatistics, PairAttempt, Proposal, ProposalContext,
};
pub use harmonic::{HarmonicConfig, HarmonicWalker};
pub use launch::{run_local, LocalRun};
pub use manifest::RunManifest;
pub use persistence::{DiagnosticSink, FileSink, NullSink, ParameterReport};
pub use replica::ReplicaState;
pub use tempering::{build_ladder, exchange_acceptance};
