use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use ptmc_core::{PtError, Rank, Walker};
use serde::{Deserialize, Serialize};

use crate::exchange::ExchangePattern;

/// Per-rank record written once the last iteration completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterReport {
    /// Rank of the participant.
    pub node: Rank,
    /// Temperature pinned to the rank.
    pub temperature: f64,
    /// Walker step size at start-up.
    pub initial_step_size: f64,
    /// Walker step size at the end of the run.
    pub adapted_step_size: f64,
    /// Completed PT iterations.
    pub pt_iterations: usize,
    /// Local Monte Carlo moves attempted by the walker.
    pub total_mc_iterations: usize,
    /// Fraction of local moves accepted.
    pub acceptance_fraction: f64,
}

/// Receives diagnostic records emitted during a run.
///
/// Implementations must not feed anything back into the run: they only see
/// immutable views of the ladder, patterns and walkers.
pub trait DiagnosticSink {
    /// Ladder as distributed at initialisation (coordinator only).
    fn record_ladder(&mut self, ladder: &[f64]) -> Result<(), PtError>;

    /// Pattern of an iteration in which at least one pair swapped (coordinator only).
    fn record_permutation(
        &mut self,
        iteration: usize,
        pattern: &ExchangePattern,
    ) -> Result<(), PtError>;

    /// Periodic walker snapshot.
    fn record_snapshot<W: Walker>(
        &mut self,
        rank: Rank,
        iteration: usize,
        walker: &W,
    ) -> Result<(), PtError>;

    /// Final per-rank parameters.
    fn record_parameters(&mut self, report: &ParameterReport) -> Result<(), PtError>;
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn record_ladder(&mut self, _ladder: &[f64]) -> Result<(), PtError> {
        Ok(())
    }

    fn record_permutation(
        &mut self,
        _iteration: usize,
        _pattern: &ExchangePattern,
    ) -> Result<(), PtError> {
        Ok(())
    }

    fn record_snapshot<W: Walker>(
        &mut self,
        _rank: Rank,
        _iteration: usize,
        _walker: &W,
    ) -> Result<(), PtError> {
        Ok(())
    }

    fn record_parameters(&mut self, _report: &ParameterReport) -> Result<(), PtError> {
        Ok(())
    }
}

impl<S: DiagnosticSink> DiagnosticSink for Option<S> {
    fn record_ladder(&mut self, ladder: &[f64]) -> Result<(), PtError> {
        match self {
            Some(sink) => sink.record_ladder(ladder),
            None => Ok(()),
        }
    }

    fn record_permutation(
        &mut self,
        iteration: usize,
        pattern: &ExchangePattern,
    ) -> Result<(), PtError> {
        match self {
            Some(sink) => sink.record_permutation(iteration, pattern),
            None => Ok(()),
        }
    }

    fn record_snapshot<W: Walker>(
        &mut self,
        rank: Rank,
        iteration: usize,
        walker: &W,
    ) -> Result<(), PtError> {
        match self {
            Some(sink) => sink.record_snapshot(rank, iteration, walker),
            None => Ok(()),
        }
    }

    fn record_parameters(&mut self, report: &ParameterReport) -> Result<(), PtError> {
        match self {
            Some(sink) => sink.record_parameters(report),
            None => Ok(()),
        }
    }
}

/// Writes the tab-separated artefacts consumed by the analysis tooling.
///
/// Layout under `root`:
/// - `temperatures`: one temperature per line, ordered by rank
/// - `rem_permutations`: `iteration\tp_0\t...\tp_{P-1}\t` with 1-indexed partners
/// - `<rank>/Visits.his.<mc_steps>`: walker histogram snapshots
/// - `<rank>/parameters`: final per-rank parameters
#[derive(Debug, Clone)]
pub struct FileSink {
    root: PathBuf,
}

impl FileSink {
    /// Sink rooted at `root`; directories are created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the temperature ladder record.
    pub fn ladder_path(&self) -> PathBuf {
        self.root.join("temperatures")
    }

    /// Path of the permutation log.
    pub fn permutations_path(&self) -> PathBuf {
        self.root.join("rem_permutations")
    }

    /// Directory holding the records of `rank`.
    pub fn rank_dir(&self, rank: Rank) -> PathBuf {
        self.root.join(rank.to_string())
    }

    fn ensure_dir(dir: &Path) -> Result<(), PtError> {
        fs::create_dir_all(dir).map_err(|err| PtError::io("sink-mkdir", err, dir))
    }

    fn append(path: &Path, text: &str) -> Result<(), PtError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| PtError::io("sink-open", err, path))?;
        file.write_all(text.as_bytes())
            .map_err(|err| PtError::io("sink-write", err, path))
    }
}

impl DiagnosticSink for FileSink {
    fn record_ladder(&mut self, ladder: &[f64]) -> Result<(), PtError> {
        Self::ensure_dir(&self.root)?;
        let path = self.ladder_path();
        let text: String = ladder.iter().map(|t| format!("{t:.18e}\n")).collect();
        fs::write(&path, text).map_err(|err| PtError::io("ladder-write", err, &path))
    }

    fn record_permutation(
        &mut self,
        iteration: usize,
        pattern: &ExchangePattern,
    ) -> Result<(), PtError> {
        Self::ensure_dir(&self.root)?;
        let mut line = format!("{iteration}\t");
        for entry in pattern.permutation_row() {
            line.push_str(&format!("{entry}\t"));
        }
        line.push('\n');
        Self::append(&self.permutations_path(), &line)
    }

    fn record_snapshot<W: Walker>(
        &mut self,
        rank: Rank,
        _iteration: usize,
        walker: &W,
    ) -> Result<(), PtError> {
        let dir = self.rank_dir(rank);
        Self::ensure_dir(&dir)?;
        walker.dump_histogram(&dir.join(format!("Visits.his.{}", walker.iterations())))
    }

    fn record_parameters(&mut self, report: &ParameterReport) -> Result<(), PtError> {
        let dir = self.rank_dir(report.node);
        Self::ensure_dir(&dir)?;
        let text = format!(
            "node:\t{}\ntemperature:\t{}\ninitial step size:\t{}\nadapted step size:\t{}\n\
             PT iterations:\t{}\ntotal MC iterations:\t{}\nacceptance fraction:\t{}\n",
            report.node,
            report.temperature,
            report.initial_step_size,
            report.adapted_step_size,
            report.pt_iterations,
            report.total_mc_iterations,
            report.acceptance_fraction,
        );
        Self::append(&dir.join("parameters"), &text)
    }
}
