use std::fs;
use std::path::Path;

use ptmc_core::errors::ErrorInfo;
use ptmc_core::PtError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::RunConfig;
use crate::driver::ReplicaSummary;

/// Structured manifest describing a completed parallel tempering run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    /// Configuration used for the run.
    pub config: RunConfig,
    /// SHA-256 of the canonical JSON form of `config`.
    pub config_hash: String,
    /// Master seed used to derive walker and exchange substreams.
    pub master_seed: u64,
    /// Optional seed label captured from the configuration.
    pub seed_label: Option<String>,
    /// Number of participants.
    pub participants: usize,
    /// RFC 3339 timestamp of manifest creation.
    pub created_at: String,
    /// Per-rank summaries, ordered by rank.
    pub replicas: Vec<ReplicaSummary>,
}

impl RunManifest {
    /// Assembles a manifest for the given run results.
    pub fn new(config: &RunConfig, replicas: Vec<ReplicaSummary>) -> Result<Self, PtError> {
        Ok(Self {
            config: config.clone(),
            config_hash: config_hash(config)?,
            master_seed: config.seed_policy.master_seed,
            seed_label: config.seed_policy.label.clone(),
            participants: replicas.len(),
            created_at: chrono::Utc::now().to_rfc3339(),
            replicas,
        })
    }

    /// Writes the manifest to a JSON file.
    pub fn write(&self, path: &Path) -> Result<(), PtError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| PtError::io("manifest-mkdir", err, parent))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            PtError::Serde(
                ErrorInfo::new("manifest-serialize", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        fs::write(path, json).map_err(|err| PtError::io("manifest-write", err, path))
    }

    /// Loads a manifest from disk.
    pub fn load(path: &Path) -> Result<Self, PtError> {
        let contents =
            fs::read_to_string(path).map_err(|err| PtError::io("manifest-read", err, path))?;
        serde_json::from_str(&contents).map_err(|err| {
            PtError::Serde(
                ErrorInfo::new("manifest-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}

/// Hex-encoded SHA-256 of the configuration's JSON serialization.
pub fn config_hash(config: &RunConfig) -> Result<String, PtError> {
    let bytes = serde_json::to_vec(config)
        .map_err(|err| PtError::Serde(ErrorInfo::new("config-serialize", err.to_string())))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
