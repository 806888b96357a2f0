use ptmc_core::{PtError, Rank};

use crate::channel::{CollectiveChannel, ReplicaPayload};

/// State owned by one participant: a fixed temperature slot plus the payload
/// currently occupying it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaState<C> {
    rank: Rank,
    temperature: f64,
    payload: ReplicaPayload<C>,
    iteration: usize,
    swaps: usize,
}

impl<C> ReplicaState<C> {
    /// Creates the replica for `rank` at `temperature` from the walker's initial state.
    pub fn new(rank: Rank, temperature: f64, config: C, energy: f64) -> Self {
        Self {
            rank,
            temperature,
            payload: ReplicaPayload { config, energy },
            iteration: 0,
            swaps: 0,
        }
    }

    /// Rebuilds a replica mid-run, keeping its counters.
    pub(crate) fn resume(
        rank: Rank,
        temperature: f64,
        config: C,
        energy: f64,
        iteration: usize,
        swaps: usize,
    ) -> Self {
        Self {
            iteration,
            swaps,
            ..Self::new(rank, temperature, config, energy)
        }
    }

    /// Rank that owns this replica.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Temperature pinned to this rank.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Current configuration.
    pub fn config(&self) -> &C {
        &self.payload.config
    }

    /// Energy of the current configuration.
    pub fn energy(&self) -> f64 {
        self.payload.energy
    }

    /// Completed PT iterations.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Accepted swaps this replica took part in.
    pub fn swaps(&self) -> usize {
        self.swaps
    }

    /// Stores the result of a local walker step.
    pub fn update(&mut self, config: C, energy: f64) {
        self.payload = ReplicaPayload { config, energy };
    }

    /// Marks the end of one PT iteration.
    pub fn advance(&mut self) {
        self.iteration += 1;
    }

    /// Hands the payload to `partner` and adopts the one received in return.
    ///
    /// The outgoing payload is moved into the channel, so this replica keeps
    /// no copy of it. The temperature stays with the rank.
    pub fn swap_through<Ch>(self, channel: &mut Ch, partner: Rank) -> Result<Self, PtError>
    where
        Ch: CollectiveChannel<C>,
    {
        let Self {
            rank,
            temperature,
            payload,
            iteration,
            swaps,
        } = self;
        let received = channel.exchange(partner, payload)?;
        Ok(Self {
            rank,
            temperature,
            payload: received,
            iteration,
            swaps: swaps + 1,
        })
    }
}
