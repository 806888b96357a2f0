#![deny(missing_docs)]
#![doc = "Core traits and data types for the ptmc replica-exchange engine."]

use std::path::Path;

pub mod errors;
pub mod rng;

pub use errors::{ErrorInfo, PtError};
pub use rng::{derive_substream_seed, RngHandle};

/// Index of a participant within the process group. Rank 0 is the coordinator.
pub type Rank = usize;

/// The rank that owns the coordinator role.
pub const ROOT: Rank = 0;

/// Contract for a temperature-pinned Monte Carlo walker.
///
/// The replica-exchange driver only ever talks to the walker through this
/// trait: it pins the temperature once, asks for local moves every iteration
/// and pushes exchanged configurations back in when a swap is accepted.
pub trait Walker: Send {
    /// Opaque configuration moved between participants on an accepted swap.
    type Config: Clone + Send + 'static;

    /// Returns the current configuration together with its energy.
    fn config(&self) -> (Self::Config, f64);

    /// Replaces the current configuration with one received from a partner.
    fn set_config(&mut self, config: Self::Config, energy: f64);

    /// Pins the walker to the given temperature.
    fn set_temperature(&mut self, temperature: f64);

    /// Performs the configured number of local Monte Carlo moves.
    fn step(&mut self) -> Result<(), PtError>;

    /// Returns the energy of the current configuration.
    fn energy(&self) -> f64;

    /// Writes the visited-energy histogram to `path`.
    fn dump_histogram(&self, path: &Path) -> Result<(), PtError>;

    /// Fraction of local moves accepted so far.
    fn accepted_fraction(&self) -> f64;

    /// Total number of local moves attempted so far.
    fn iterations(&self) -> usize;

    /// Step size the walker started with.
    fn initial_step_size(&self) -> f64 {
        self.step_size()
    }

    /// Step size currently in use.
    fn step_size(&self) -> f64 {
        0.0
    }
}
