use log::Level;
use ptmc_core::{ErrorInfo, PtError, Rank, RngHandle};
use serde::{Deserialize, Serialize};

use crate::determinism;
use crate::tempering;

/// Side of the ladder each even slot tries to swap with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Pair slot `i` with `i + 1`.
    Right,
    /// Pair slot `i` with `i - 1`.
    Left,
}

impl Direction {
    /// Direction used on the given iteration; every participant derives it locally.
    pub fn for_iteration(iteration: usize) -> Self {
        if iteration % 2 == 0 {
            Direction::Right
        } else {
            Direction::Left
        }
    }

    /// Signed slot offset, `+1` or `-1`.
    pub fn offset(self) -> isize {
        match self {
            Direction::Right => 1,
            Direction::Left => -1,
        }
    }

    /// The opposite direction.
    pub fn flipped(self) -> Self {
        match self {
            Direction::Right => Direction::Left,
            Direction::Left => Direction::Right,
        }
    }

    /// Partner slot of `slot`, or `None` when it would fall off the ladder.
    pub fn partner(self, slot: usize, len: usize) -> Option<usize> {
        let partner = slot as isize + self.offset();
        if partner < 0 || partner as usize >= len {
            None
        } else {
            Some(partner as usize)
        }
    }
}

/// Slot pairs attempted for one iteration, in proposal order.
///
/// Even slots propose to their neighbour in `direction`. Slots whose partner
/// would fall off the ladder sit the iteration out, so the edge replicas get
/// fewer exchange opportunities than interior ones.
pub fn candidate_pairs(len: usize, direction: Direction) -> Vec<(usize, usize)> {
    (0..len)
        .step_by(2)
        .filter_map(|slot| direction.partner(slot, len).map(|partner| (slot, partner)))
        .collect()
}

/// Per-rank swap assignment for one iteration.
///
/// Entry `r` names the rank that `r` swaps with, or `None` for no exchange.
/// The assignment is always an involution: `partner(a) == Some(b)` implies
/// `partner(b) == Some(a)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangePattern {
    partners: Vec<Option<Rank>>,
}

impl ExchangePattern {
    /// Pattern of the given size with no exchanges.
    pub fn empty(size: usize) -> Self {
        Self {
            partners: vec![None; size],
        }
    }

    /// Rebuilds a pattern from raw entries and checks that it is an involution.
    pub fn from_partners(partners: Vec<Option<Rank>>) -> Result<Self, PtError> {
        let pattern = Self { partners };
        pattern.validate(pattern.len())?;
        Ok(pattern)
    }

    /// Number of ranks covered by the pattern.
    pub fn len(&self) -> usize {
        self.partners.len()
    }

    /// Returns true for a zero-rank pattern.
    pub fn is_empty(&self) -> bool {
        self.partners.is_empty()
    }

    /// Partner assigned to `rank`, if any.
    pub fn partner(&self, rank: Rank) -> Option<Rank> {
        self.partners.get(rank).copied().flatten()
    }

    /// Raw per-rank entries.
    pub fn as_slice(&self) -> &[Option<Rank>] {
        &self.partners
    }

    /// Returns true when at least one pair swaps.
    pub fn any_swap(&self) -> bool {
        self.partners.iter().any(Option::is_some)
    }

    /// Number of swapping pairs.
    pub fn swapped_pairs(&self) -> usize {
        self.partners.iter().filter(|entry| entry.is_some()).count() / 2
    }

    /// Records a swap between ranks `a` and `b`.
    ///
    /// Assigning a rank twice within one pattern is a fatal protocol violation.
    pub fn pair(&mut self, a: Rank, b: Rank) -> Result<(), PtError> {
        if a == b || a >= self.len() || b >= self.len() {
            return Err(PtError::Protocol(
                ErrorInfo::new("invalid-pair", "exchange pair must name two distinct ranks")
                    .with_context("a", a.to_string())
                    .with_context("b", b.to_string())
                    .with_context("size", self.len().to_string()),
            ));
        }
        for rank in [a, b] {
            if let Some(existing) = self.partners[rank] {
                return Err(PtError::Protocol(
                    ErrorInfo::new("double-assignment", "rank assigned twice in one pattern")
                        .with_context("rank", rank.to_string())
                        .with_context("existing_partner", existing.to_string()),
                ));
            }
        }
        self.partners[a] = Some(b);
        self.partners[b] = Some(a);
        Ok(())
    }

    /// Checks the pattern size and the involution property.
    pub fn validate(&self, size: usize) -> Result<(), PtError> {
        if self.len() != size {
            return Err(PtError::Protocol(
                ErrorInfo::new("pattern-size", "exchange pattern does not cover every rank")
                    .with_context("expected", size.to_string())
                    .with_context("actual", self.len().to_string()),
            ));
        }
        for (rank, entry) in self.partners.iter().enumerate() {
            let Some(partner) = *entry else { continue };
            if partner == rank || self.partner(partner) != Some(rank) {
                return Err(PtError::Protocol(
                    ErrorInfo::new("pattern-involution", "exchange pattern is not symmetric")
                        .with_context("rank", rank.to_string())
                        .with_context("partner", partner.to_string()),
                ));
            }
        }
        Ok(())
    }

    /// Row for the permutation log: partner rank or own rank, both 1-indexed.
    pub fn permutation_row(&self) -> Vec<usize> {
        self.partners
            .iter()
            .enumerate()
            .map(|(rank, entry)| entry.unwrap_or(rank) + 1)
            .collect()
    }
}

/// Outcome of one attempted slot pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairAttempt {
    /// Slot that proposed the exchange.
    pub slot: usize,
    /// Neighbouring slot it proposed to.
    pub partner_slot: usize,
    /// Metropolis acceptance probability.
    pub acceptance: f64,
    /// Whether the uniform draw accepted the swap.
    pub accepted: bool,
}

/// Pattern plus the per-pair decisions that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// Swap assignment to broadcast.
    pub pattern: ExchangePattern,
    /// Attempted pairs in proposal order.
    pub attempts: Vec<PairAttempt>,
}

/// Immutable inputs of the pairing computation.
#[derive(Debug, Clone, Copy)]
pub struct ProposalContext<'a> {
    /// Temperature per ladder slot.
    pub ladder: &'a [f64],
    /// Rank owning each ladder slot.
    pub ranks: &'a [Rank],
    /// Master seed for the per-pair uniform draws.
    pub master_seed: u64,
}

/// Computes the exchange pattern for one iteration.
///
/// `energies` is indexed by rank, as produced by the gather, and must all be
/// finite. Each candidate
/// pair from [`candidate_pairs`] is accepted iff `w > r` with `r` drawn from a
/// per-(iteration, pair) substream, so the decision sequence is reproducible.
pub fn propose_pattern(
    ctx: ProposalContext<'_>,
    energies: &[f64],
    iteration: usize,
) -> Result<Proposal, PtError> {
    let size = ctx.ladder.len();
    if ctx.ranks.len() != size {
        return Err(PtError::Protocol(
            ErrorInfo::new("ladder-size", "ladder and rank mapping differ in length")
                .with_context("ladder", size.to_string())
                .with_context("ranks", ctx.ranks.len().to_string()),
        ));
    }
    if let Some(&rank) = ctx.ranks.iter().find(|&&rank| rank >= size) {
        return Err(PtError::Protocol(
            ErrorInfo::new("rank-mapping", "rank mapping names a rank outside the group")
                .with_context("rank", rank.to_string())
                .with_context("size", size.to_string()),
        ));
    }
    if energies.len() != size {
        return Err(PtError::Protocol(
            ErrorInfo::new("gather-size", "gathered energies do not cover every rank")
                .with_context("expected", size.to_string())
                .with_context("actual", energies.len().to_string()),
        ));
    }

    if let Some((rank, energy)) = energies
        .iter()
        .enumerate()
        .find(|(_, energy)| !energy.is_finite())
    {
        return Err(PtError::Walker(
            ErrorInfo::new("energy-non-finite", "gathered energy is not finite")
                .with_context("rank", rank.to_string())
                .with_context("energy", energy.to_string())
                .with_context("iteration", iteration.to_string()),
        ));
    }

    let direction = Direction::for_iteration(iteration);
    let mut pattern = ExchangePattern::empty(size);
    let mut attempts = Vec::new();
    for (slot, partner_slot) in candidate_pairs(size, direction) {
        let (rank_i, rank_j) = (ctx.ranks[slot], ctx.ranks[partner_slot]);
        let (energy_i, energy_j) = (energies[rank_i], energies[rank_j]);
        let (temp_i, temp_j) = (ctx.ladder[slot], ctx.ladder[partner_slot]);

        let pair_index = slot.min(partner_slot);
        let mut rng = RngHandle::from_seed(determinism::exchange_seed(
            ctx.master_seed,
            iteration,
            pair_index,
        ));
        let (accepted, acceptance) =
            tempering::attempt_exchange(energy_i, temp_i, energy_j, temp_j, &mut rng);
        if accepted {
            pattern.pair(rank_i, rank_j)?;
        }
        attempts.push(PairAttempt {
            slot,
            partner_slot,
            acceptance,
            accepted,
        });
    }
    Ok(Proposal { pattern, attempts })
}

/// Exchange statistics per adjacent ladder pair `(k, k + 1)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LadderStatistics {
    /// Attempted exchanges per adjacency.
    pub attempts: Vec<usize>,
    /// Accepted exchanges per adjacency.
    pub accepts: Vec<usize>,
    /// Sum of Metropolis acceptance probabilities per adjacency.
    pub acceptance_sum: Vec<f64>,
}

impl LadderStatistics {
    /// Zeroed statistics for a ladder of `size` slots.
    pub fn new(size: usize) -> Self {
        let pairs = size.saturating_sub(1);
        Self {
            attempts: vec![0; pairs],
            accepts: vec![0; pairs],
            acceptance_sum: vec![0.0; pairs],
        }
    }

    fn record(&mut self, attempt: &PairAttempt) {
        let pair = attempt.slot.min(attempt.partner_slot);
        if let Some(count) = self.attempts.get_mut(pair) {
            *count += 1;
        }
        if let Some(total) = self.acceptance_sum.get_mut(pair) {
            *total += attempt.acceptance;
        }
        if attempt.accepted {
            if let Some(count) = self.accepts.get_mut(pair) {
                *count += 1;
            }
        }
    }

    /// Total attempted exchanges over the whole ladder.
    pub fn total_attempts(&self) -> usize {
        self.attempts.iter().sum()
    }

    /// Fraction of accepted exchanges per adjacency (0 when never attempted).
    pub fn acceptance_rates(&self) -> Vec<f64> {
        self.accepts
            .iter()
            .zip(self.attempts.iter())
            .map(|(&accepts, &attempts)| {
                if attempts == 0 {
                    0.0
                } else {
                    accepts as f64 / attempts as f64
                }
            })
            .collect()
    }

    /// Mean Metropolis acceptance probability per adjacency.
    pub fn mean_acceptance(&self) -> Vec<f64> {
        self.acceptance_sum
            .iter()
            .zip(self.attempts.iter())
            .map(|(&sum, &attempts)| {
                if attempts == 0 {
                    0.0
                } else {
                    sum / attempts as f64
                }
            })
            .collect()
    }
}

/// Role a participant plays in the exchange step.
///
/// Exactly one participant holds the [`Coordinator`]; every other participant
/// holds a [`Follower`] and receives the pattern by broadcast.
pub trait ExchangeRole: Send {
    /// Returns true on the participant that computes exchange patterns.
    fn is_coordinator(&self) -> bool;

    /// Full ladder, available on the coordinator only.
    fn ladder(&self) -> Option<&[f64]>;

    /// Turns the gathered energies into this iteration's pattern.
    ///
    /// Followers receive `None` and return `None`.
    fn propose_exchanges(
        &mut self,
        iteration: usize,
        energies: Option<Vec<f64>>,
    ) -> Result<Option<ExchangePattern>, PtError>;

    /// Accumulated exchange statistics, coordinator only.
    fn statistics(&self) -> Option<&LadderStatistics> {
        None
    }
}

/// Rank-0 role: builds the pattern from the gathered energies.
#[derive(Debug, Clone)]
pub struct Coordinator {
    ladder: Vec<f64>,
    ranks: Vec<Rank>,
    master_seed: u64,
    verbose: bool,
    statistics: LadderStatistics,
}

impl Coordinator {
    /// Coordinator for a ladder whose slot `i` is owned by rank `i`.
    pub fn new(ladder: Vec<f64>, master_seed: u64, verbose: bool) -> Self {
        let ranks = (0..ladder.len()).collect();
        Self::from_parts(ladder, ranks, master_seed, verbose)
    }

    /// Coordinator with an explicit slot-to-rank mapping.
    pub fn with_ranks(
        ladder: Vec<f64>,
        ranks: Vec<Rank>,
        master_seed: u64,
        verbose: bool,
    ) -> Result<Self, PtError> {
        let mut seen = vec![false; ladder.len()];
        if ranks.len() != ladder.len() {
            return Err(PtError::Protocol(
                ErrorInfo::new("ladder-size", "ladder and rank mapping differ in length")
                    .with_context("ladder", ladder.len().to_string())
                    .with_context("ranks", ranks.len().to_string()),
            ));
        }
        for &rank in &ranks {
            match seen.get_mut(rank) {
                Some(flag) if !*flag => *flag = true,
                _ => {
                    return Err(PtError::Protocol(
                        ErrorInfo::new("rank-mapping", "rank mapping is not a permutation")
                            .with_context("rank", rank.to_string()),
                    ))
                }
            }
        }
        Ok(Self::from_parts(ladder, ranks, master_seed, verbose))
    }

    fn from_parts(ladder: Vec<f64>, ranks: Vec<Rank>, master_seed: u64, verbose: bool) -> Self {
        let statistics = LadderStatistics::new(ladder.len());
        Self {
            ladder,
            ranks,
            master_seed,
            verbose,
            statistics,
        }
    }

    fn context(&self) -> ProposalContext<'_> {
        ProposalContext {
            ladder: &self.ladder,
            ranks: &self.ranks,
            master_seed: self.master_seed,
        }
    }
}

impl ExchangeRole for Coordinator {
    fn is_coordinator(&self) -> bool {
        true
    }

    fn ladder(&self) -> Option<&[f64]> {
        Some(&self.ladder)
    }

    fn propose_exchanges(
        &mut self,
        iteration: usize,
        energies: Option<Vec<f64>>,
    ) -> Result<Option<ExchangePattern>, PtError> {
        let energies = energies.ok_or_else(|| {
            PtError::Protocol(
                ErrorInfo::new("gather-missing", "coordinator received no gathered energies")
                    .with_context("iteration", iteration.to_string()),
            )
        })?;
        let proposal = propose_pattern(self.context(), &energies, iteration)?;
        let level = if self.verbose {
            Level::Info
        } else {
            Level::Debug
        };
        for attempt in &proposal.attempts {
            self.statistics.record(attempt);
            if attempt.accepted {
                let (i, j) = (attempt.slot, attempt.partner_slot);
                log::log!(
                    level,
                    "accepting exchange {} {} {:e} {:e} {} {} {}",
                    self.ranks[i],
                    self.ranks[j],
                    energies[self.ranks[i]],
                    energies[self.ranks[j]],
                    self.ladder[i],
                    self.ladder[j],
                    iteration
                );
            }
        }
        Ok(Some(proposal.pattern))
    }

    fn statistics(&self) -> Option<&LadderStatistics> {
        Some(&self.statistics)
    }
}

/// No-op role held by every non-coordinating participant.
#[derive(Debug, Clone, Copy, Default)]
pub struct Follower;

impl ExchangeRole for Follower {
    fn is_coordinator(&self) -> bool {
        false
    }

    fn ladder(&self) -> Option<&[f64]> {
        None
    }

    fn propose_exchanges(
        &mut self,
        iteration: usize,
        energies: Option<Vec<f64>>,
    ) -> Result<Option<ExchangePattern>, PtError> {
        if energies.is_some() {
            return Err(PtError::Protocol(
                ErrorInfo::new("unexpected-gather", "follower received gathered energies")
                    .with_context("iteration", iteration.to_string()),
            ));
        }
        Ok(None)
    }
}
