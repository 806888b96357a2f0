#![allow(dead_code)]

use std::path::Path;
use std::thread;
use std::time::Duration;

use ptmc_core::{ErrorInfo, PtError, Rank, Walker};
use ptmc_exchange::{
    DiagnosticSink, ExchangePattern, LocalGroup, ParallelTempering, ParameterReport,
    ReplicaSummary, RunConfig,
};

/// Walker whose energy never changes; its configuration is a label that makes
/// payload movement observable.
#[derive(Debug, Clone)]
pub struct LabelWalker {
    pub label: usize,
    pub energy: f64,
    pub temperature: Option<f64>,
    pub steps: usize,
    /// Step count at which `step` starts failing.
    pub fail_at: Option<usize>,
}

impl LabelWalker {
    pub fn new(label: usize, energy: f64) -> Self {
        Self {
            label,
            energy,
            temperature: None,
            steps: 0,
            fail_at: None,
        }
    }
}

impl Walker for LabelWalker {
    type Config = usize;

    fn config(&self) -> (Self::Config, f64) {
        (self.label, self.energy)
    }

    fn set_config(&mut self, config: Self::Config, energy: f64) {
        self.label = config;
        self.energy = energy;
    }

    fn set_temperature(&mut self, temperature: f64) {
        self.temperature = Some(temperature);
    }

    fn step(&mut self) -> Result<(), PtError> {
        if self.fail_at == Some(self.steps) {
            return Err(PtError::Walker(ErrorInfo::new(
                "label-walker-failure",
                "scripted walker failure",
            )));
        }
        self.steps += 1;
        Ok(())
    }

    fn energy(&self) -> f64 {
        self.energy
    }

    fn dump_histogram(&self, path: &Path) -> Result<(), PtError> {
        std::fs::write(path, format!("{}\t1\n", self.energy))
            .map_err(|err| PtError::io("histogram-write", err, path))
    }

    fn accepted_fraction(&self) -> f64 {
        1.0
    }

    fn iterations(&self) -> usize {
        self.steps
    }
}

#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub ladder: Option<Vec<f64>>,
    pub permutations: Vec<(usize, Vec<usize>)>,
    pub snapshots: Vec<(Rank, usize)>,
    pub parameters: Vec<ParameterReport>,
}

impl DiagnosticSink for RecordingSink {
    fn record_ladder(&mut self, ladder: &[f64]) -> Result<(), PtError> {
        self.ladder = Some(ladder.to_vec());
        Ok(())
    }

    fn record_permutation(
        &mut self,
        iteration: usize,
        pattern: &ExchangePattern,
    ) -> Result<(), PtError> {
        self.permutations.push((iteration, pattern.permutation_row()));
        Ok(())
    }

    fn record_snapshot<W: Walker>(
        &mut self,
        rank: Rank,
        iteration: usize,
        _walker: &W,
    ) -> Result<(), PtError> {
        self.snapshots.push((rank, iteration));
        Ok(())
    }

    fn record_parameters(&mut self, report: &ParameterReport) -> Result<(), PtError> {
        self.parameters.push(report.clone());
        Ok(())
    }
}

pub struct Finished<W> {
    pub summary: ReplicaSummary,
    pub walker: W,
    pub sink: RecordingSink,
}

pub fn quick_config(max_iterations: usize) -> RunConfig {
    let mut config = RunConfig::default();
    config.ladder.t_min = 1.0;
    config.ladder.t_max = 8.0;
    config.max_iterations = max_iterations;
    config.persistence_period = 1;
    config.exchange.timeout_ms = 10_000;
    config
}

/// Runs one driver per walker on its own thread and returns results by rank.
pub fn run_group<W: Walker>(config: &RunConfig, walkers: Vec<W>) -> Vec<Finished<W>> {
    let channels = LocalGroup::new(walkers.len(), Duration::from_millis(config.exchange.timeout_ms))
        .channels::<W::Config>()
        .unwrap();
    thread::scope(|scope| {
        let handles: Vec<_> = walkers
            .into_iter()
            .zip(channels)
            .map(|(walker, channel)| {
                scope.spawn(move || {
                    let mut driver = ParallelTempering::new(
                        walker,
                        channel,
                        RecordingSink::default(),
                        config.clone(),
                    )
                    .unwrap();
                    let summary = driver.run().unwrap();
                    let (walker, sink) = driver.into_parts();
                    Finished {
                        summary,
                        walker,
                        sink,
                    }
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}
