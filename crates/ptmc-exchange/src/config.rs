use std::path::{Path, PathBuf};
use std::time::Duration;

use ptmc_core::{ErrorInfo, PtError};
use serde::{Deserialize, Serialize};

/// YAML-configurable parameters governing a parallel tempering run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Temperature bounds of the ladder.
    #[serde(default)]
    pub ladder: LadderConfig,
    /// Number of PT iterations (walker step + exchange attempt) to execute.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Interval, in PT iterations, between histogram snapshots.
    #[serde(default = "default_persistence_period")]
    pub persistence_period: usize,
    /// Log every accepted exchange at `info` instead of `debug`.
    #[serde(default)]
    pub verbose: bool,
    /// Exchange protocol settings.
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// Master seed and substream policy.
    #[serde(default)]
    pub seed_policy: SeedPolicy,
    /// Output directory configuration.
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_max_iterations() -> usize {
    100
}

fn default_persistence_period() -> usize {
    10
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            ladder: LadderConfig::default(),
            max_iterations: default_max_iterations(),
            persistence_period: default_persistence_period(),
            verbose: false,
            exchange: ExchangeConfig::default(),
            seed_policy: SeedPolicy::default(),
            output: OutputConfig::default(),
        }
    }
}

impl RunConfig {
    /// Loads a configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, PtError> {
        let contents =
            std::fs::read_to_string(path).map_err(|err| PtError::io("config-read", err, path))?;
        Self::from_yaml(&contents).map_err(|err| match err {
            PtError::Serde(info) => {
                PtError::Serde(info.with_context("path", path.display().to_string()))
            }
            other => other,
        })
    }

    /// Parses and validates a configuration from YAML text.
    pub fn from_yaml(contents: &str) -> Result<Self, PtError> {
        let config: RunConfig = serde_yaml::from_str(contents)
            .map_err(|err| PtError::Serde(ErrorInfo::new("config-parse", err.to_string())))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects parameter combinations that cannot produce a valid run.
    ///
    /// `max_iterations = 0` is accepted and yields a run that finishes right
    /// after initialisation.
    pub fn validate(&self) -> Result<(), PtError> {
        self.ladder.validate()?;
        if self.persistence_period == 0 {
            return Err(PtError::Config(
                ErrorInfo::new(
                    "persistence-period",
                    "persistence_period must be at least one iteration",
                )
                .with_hint("set persistence_period to 1 to snapshot every iteration"),
            ));
        }
        if self.exchange.timeout_ms == 0 {
            return Err(PtError::Config(ErrorInfo::new(
                "exchange-timeout",
                "exchange.timeout_ms must be positive",
            )));
        }
        Ok(())
    }
}

/// Temperature bounds of the geometric ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LadderConfig {
    /// Temperature assigned to rank 0.
    #[serde(default = "default_t_min")]
    pub t_min: f64,
    /// Temperature assigned to the highest rank.
    #[serde(default = "default_t_max")]
    pub t_max: f64,
}

fn default_t_min() -> f64 {
    1.0
}

fn default_t_max() -> f64 {
    2.0
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            t_min: default_t_min(),
            t_max: default_t_max(),
        }
    }
}

impl LadderConfig {
    /// Checks that both bounds are finite, positive and strictly ordered.
    pub fn validate(&self) -> Result<(), PtError> {
        let finite = self.t_min.is_finite() && self.t_max.is_finite();
        if !finite || self.t_min <= 0.0 {
            return Err(PtError::Config(
                ErrorInfo::new("ladder-positive", "temperatures must be finite and positive")
                    .with_context("t_min", self.t_min.to_string())
                    .with_context("t_max", self.t_max.to_string()),
            ));
        }
        if self.t_min >= self.t_max {
            return Err(PtError::Config(
                ErrorInfo::new("ladder-bounds", "t_min must be strictly below t_max")
                    .with_context("t_min", self.t_min.to_string())
                    .with_context("t_max", self.t_max.to_string()),
            ));
        }
        Ok(())
    }
}

/// Exchange protocol settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Liveness timeout applied to every blocking collective receive.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    60_000
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ExchangeConfig {
    /// Timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Deterministic seeding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedPolicy {
    /// Master seed used for the run.
    #[serde(default = "default_master_seed")]
    pub master_seed: u64,
    /// Optional label recorded in the run manifest.
    #[serde(default)]
    pub label: Option<String>,
}

fn default_master_seed() -> u64 {
    0x05EE_D5EE_DD15_5EED_u64
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self {
            master_seed: default_master_seed(),
            label: None,
        }
    }
}

/// Output directory layout configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory for run artefacts. `None` disables persistence.
    #[serde(default)]
    pub run_directory: Option<PathBuf>,
    /// Manifest filename relative to `run_directory`.
    #[serde(default = "default_manifest_filename")]
    pub manifest_file: PathBuf,
}

fn default_manifest_filename() -> PathBuf {
    PathBuf::from("manifest.json")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            run_directory: None,
            manifest_file: default_manifest_filename(),
        }
    }
}
