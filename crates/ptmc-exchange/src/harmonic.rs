//! Reference walker: a particle in an isotropic N-dimensional harmonic well.
//!
//! The potential `E = |x|^2 / 2` has a temperature-independent heat capacity
//! `Cv = Var(E) / T^2 + N / 2 = N`, which makes it a convenient end-to-end
//! check of a tempered ensemble.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use ptmc_core::{ErrorInfo, PtError, RngHandle, Walker};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Tunables of the harmonic walker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarmonicConfig {
    /// Number of spatial dimensions.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Metropolis displacement moves per PT iteration.
    #[serde(default = "default_moves_per_step")]
    pub moves_per_step: usize,
    /// Initial maximum displacement per coordinate.
    #[serde(default = "default_step_size")]
    pub step_size: f64,
    /// Moves during which the step size is tuned and the histogram is not filled.
    #[serde(default)]
    pub equilibration_moves: usize,
    /// Acceptance rate the step-size tuner aims for.
    #[serde(default = "default_target_acceptance")]
    pub target_acceptance: f64,
    /// Width of the energy histogram bins.
    #[serde(default = "default_histogram_bin_width")]
    pub histogram_bin_width: f64,
}

fn default_dimensions() -> usize {
    3
}

fn default_moves_per_step() -> usize {
    100
}

fn default_step_size() -> f64 {
    0.5
}

fn default_target_acceptance() -> f64 {
    0.5
}

fn default_histogram_bin_width() -> f64 {
    0.01
}

impl Default for HarmonicConfig {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
            moves_per_step: default_moves_per_step(),
            step_size: default_step_size(),
            equilibration_moves: 0,
            target_acceptance: default_target_acceptance(),
            histogram_bin_width: default_histogram_bin_width(),
        }
    }
}

impl HarmonicConfig {
    /// Rejects tunables that would make the move proposal or the histogram meaningless.
    pub fn validate(&self) -> Result<(), PtError> {
        if self.dimensions == 0 {
            return Err(PtError::Config(
                invalid("walker-dimensions", "dimensions must be at least one")
                    .with_context("dimensions", self.dimensions.to_string()),
            ));
        }
        if !(self.step_size.is_finite() && self.step_size > 0.0) {
            return Err(PtError::Config(
                invalid("walker-step-size", "step_size must be finite and positive")
                    .with_context("step_size", self.step_size.to_string()),
            ));
        }
        if !(self.histogram_bin_width.is_finite() && self.histogram_bin_width > 0.0) {
            return Err(PtError::Config(
                invalid(
                    "walker-bin-width",
                    "histogram_bin_width must be finite and positive",
                )
                .with_context("histogram_bin_width", self.histogram_bin_width.to_string()),
            ));
        }
        if !(self.target_acceptance > 0.0 && self.target_acceptance < 1.0) {
            return Err(PtError::Config(
                invalid(
                    "walker-target-acceptance",
                    "target_acceptance must lie strictly between 0 and 1",
                )
                .with_context("target_acceptance", self.target_acceptance.to_string()),
            ));
        }
        Ok(())
    }
}

fn invalid(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message).with_hint("fix the walker block of the run configuration")
}

const TUNING_WINDOW: usize = 100;

/// Metropolis walker in a harmonic well with an energy-visits histogram.
#[derive(Debug, Clone)]
pub struct HarmonicWalker {
    config: HarmonicConfig,
    position: Vec<f64>,
    energy: f64,
    temperature: Option<f64>,
    step_size: f64,
    rng: RngHandle,
    attempted: usize,
    accepted: usize,
    window_accepted: usize,
    histogram: BTreeMap<i64, u64>,
}

/// Harmonic potential energy of `position`.
pub fn harmonic_energy(position: &[f64]) -> f64 {
    0.5 * position.iter().map(|x| x * x).sum::<f64>()
}

impl HarmonicWalker {
    /// Walker starting at the origin, after validating `config`.
    pub fn new(config: HarmonicConfig, seed: u64) -> Result<Self, PtError> {
        config.validate()?;
        let position = vec![0.0; config.dimensions];
        let step_size = config.step_size;
        Ok(Self {
            config,
            position,
            energy: 0.0,
            temperature: None,
            step_size,
            rng: RngHandle::from_seed(seed),
            attempted: 0,
            accepted: 0,
            window_accepted: 0,
            histogram: BTreeMap::new(),
        })
    }

    /// Walker starting at `position`, which must match the configured dimensions.
    pub fn with_position(
        config: HarmonicConfig,
        seed: u64,
        position: Vec<f64>,
    ) -> Result<Self, PtError> {
        if position.len() != config.dimensions {
            return Err(PtError::Config(
                ErrorInfo::new("walker-position", "start position has the wrong dimension")
                    .with_context("expected", config.dimensions.to_string())
                    .with_context("actual", position.len().to_string()),
            ));
        }
        let mut walker = Self::new(config, seed)?;
        walker.energy = harmonic_energy(&position);
        walker.position = position;
        Ok(walker)
    }

    /// Temperature the walker is pinned to, once set.
    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    /// Visited-energy histogram as `(bin centre, count)` pairs.
    pub fn histogram(&self) -> Vec<(f64, u64)> {
        let width = self.config.histogram_bin_width;
        self.histogram
            .iter()
            .map(|(&bin, &count)| ((bin as f64 + 0.5) * width, count))
            .collect()
    }

    fn equilibrating(&self) -> bool {
        self.attempted < self.config.equilibration_moves
    }

    fn tune_step_size(&mut self) {
        if self.attempted % TUNING_WINDOW != 0 {
            return;
        }
        let rate = self.window_accepted as f64 / TUNING_WINDOW as f64;
        self.step_size *= if rate > self.config.target_acceptance {
            1.1
        } else {
            0.9
        };
        self.window_accepted = 0;
    }
}

impl Walker for HarmonicWalker {
    type Config = Vec<f64>;

    fn config(&self) -> (Self::Config, f64) {
        (self.position.clone(), self.energy)
    }

    fn set_config(&mut self, config: Self::Config, energy: f64) {
        self.position = config;
        self.energy = energy;
    }

    fn set_temperature(&mut self, temperature: f64) {
        self.temperature = Some(temperature);
    }

    fn step(&mut self) -> Result<(), PtError> {
        let temperature = self.temperature.ok_or_else(|| {
            PtError::Walker(ErrorInfo::new(
                "temperature-unset",
                "walker stepped before a temperature was assigned",
            ))
        })?;
        let width = self.config.histogram_bin_width;
        let mut trial = vec![0.0; self.position.len()];
        for _ in 0..self.config.moves_per_step {
            let equilibrating = self.equilibrating();
            for (t, x) in trial.iter_mut().zip(self.position.iter()) {
                *t = x + self
                    .rng
                    .inner_mut()
                    .gen_range(-self.step_size..=self.step_size);
            }
            let trial_energy = harmonic_energy(&trial);
            let delta = trial_energy - self.energy;
            let accept = delta <= 0.0 || self.rng.uniform() < (-delta / temperature).exp();
            self.attempted += 1;
            if accept {
                std::mem::swap(&mut self.position, &mut trial);
                self.energy = trial_energy;
                self.accepted += 1;
                self.window_accepted += 1;
            }
            if equilibrating {
                self.tune_step_size();
            } else {
                let bin = (self.energy / width).floor() as i64;
                *self.histogram.entry(bin).or_insert(0) += 1;
            }
        }
        if !self.energy.is_finite() {
            return Err(PtError::Walker(
                ErrorInfo::new("energy-diverged", "walker energy is not finite")
                    .with_context("temperature", temperature.to_string()),
            ));
        }
        Ok(())
    }

    fn energy(&self) -> f64 {
        self.energy
    }

    fn dump_histogram(&self, path: &Path) -> Result<(), PtError> {
        let text: String = self
            .histogram()
            .into_iter()
            .map(|(centre, count)| format!("{centre:.6}\t{count}\n"))
            .collect();
        fs::write(path, text).map_err(|err| PtError::io("histogram-write", err, path))
    }

    fn accepted_fraction(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.accepted as f64 / self.attempted as f64
        }
    }

    fn iterations(&self) -> usize {
        self.attempted
    }

    fn initial_step_size(&self) -> f64 {
        self.config.step_size
    }

    fn step_size(&self) -> f64 {
        self.step_size
    }
}
