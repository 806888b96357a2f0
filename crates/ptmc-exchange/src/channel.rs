//! Collective-communication contract used by the exchange loop, plus an
//! in-process implementation that runs each participant on its own thread.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use ptmc_core::{ErrorInfo, PtError, Rank, ROOT};

use crate::exchange::ExchangePattern;

/// Configuration and energy moved between two partners on an accepted swap.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaPayload<C> {
    /// Walker configuration.
    pub config: C,
    /// Energy of `config`.
    pub energy: f64,
}

/// Logical collective operations a transport must provide.
///
/// Root is always [`ROOT`]. Every operation except [`exchange`](Self::exchange)
/// is collective and must be entered by all participants in the same order.
pub trait CollectiveChannel<C> {
    /// Rank of the calling participant.
    fn rank(&self) -> Rank;

    /// Number of participants.
    fn size(&self) -> usize;

    /// Returns true on the coordinating participant.
    fn is_root(&self) -> bool {
        self.rank() == ROOT
    }

    /// Root distributes `values[r]` to rank `r`; others pass `None`.
    fn scatter(&mut self, values: Option<&[f64]>) -> Result<f64, PtError>;

    /// Collects one value per rank on root (`Some`), returns `None` elsewhere.
    fn gather(&mut self, value: f64) -> Result<Option<Vec<f64>>, PtError>;

    /// Root sends `pattern` to every participant; all receive the same pattern.
    fn broadcast(&mut self, pattern: Option<ExchangePattern>)
        -> Result<ExchangePattern, PtError>;

    /// Symmetric swap with `partner`; the payload is moved out of the caller.
    fn exchange(
        &mut self,
        partner: Rank,
        payload: ReplicaPayload<C>,
    ) -> Result<ReplicaPayload<C>, PtError>;
}

enum Message<C> {
    Scatter(f64),
    Gather { from: Rank, value: f64 },
    Broadcast(ExchangePattern),
    Payload { from: Rank, payload: ReplicaPayload<C> },
}

/// Builder for a fully connected group of in-process channels.
#[derive(Debug, Clone, Copy)]
pub struct LocalGroup {
    size: usize,
    timeout: Duration,
}

impl LocalGroup {
    /// Group of `size` participants whose receives give up after `timeout`.
    pub fn new(size: usize, timeout: Duration) -> Self {
        Self { size, timeout }
    }

    /// Creates one channel per rank, ordered by rank.
    pub fn channels<C>(&self) -> Result<Vec<LocalChannel<C>>, PtError> {
        if self.size == 0 {
            return Err(PtError::Config(ErrorInfo::new(
                "group-size",
                "a process group needs at least one participant",
            )));
        }
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..self.size).map(|_| mpsc::channel::<Message<C>>()).unzip();
        let channels = receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalChannel {
                rank,
                peers: senders
                    .iter()
                    .enumerate()
                    .map(|(peer, sender)| (peer != rank).then(|| sender.clone()))
                    .collect(),
                inbox,
                pending: VecDeque::new(),
                timeout: self.timeout,
            })
            .collect();
        Ok(channels)
    }
}

/// One participant's endpoint in a [`LocalGroup`].
///
/// Messages that arrive before the caller asks for them (for example a
/// neighbour's next-iteration energy while a swap is still in flight) are
/// parked and matched later by kind and source.
pub struct LocalChannel<C> {
    rank: Rank,
    peers: Vec<Option<Sender<Message<C>>>>,
    inbox: Receiver<Message<C>>,
    pending: VecDeque<Message<C>>,
    timeout: Duration,
}

impl<C> std::fmt::Debug for LocalChannel<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalChannel")
            .field("rank", &self.rank)
            .field("size", &self.peers.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl<C> LocalChannel<C> {
    fn send(&self, to: Rank, message: Message<C>) -> Result<(), PtError> {
        let sender = self.peers.get(to).and_then(Option::as_ref).ok_or_else(|| {
            PtError::Protocol(
                ErrorInfo::new("unknown-rank", "message addressed to an unknown rank")
                    .with_context("from", self.rank.to_string())
                    .with_context("to", to.to_string()),
            )
        })?;
        sender.send(message).map_err(|_| {
            PtError::Transport(
                ErrorInfo::new("peer-disconnected", "participant is no longer reachable")
                    .with_context("from", self.rank.to_string())
                    .with_context("rank", to.to_string()),
            )
        })
    }

    fn receive<F>(
        &mut self,
        operation: &str,
        waiting_on: &[Rank],
        matches: F,
    ) -> Result<Message<C>, PtError>
    where
        F: Fn(&Message<C>) -> bool,
    {
        if let Some(message) = self
            .pending
            .iter()
            .position(&matches)
            .and_then(|index| self.pending.remove(index))
        {
            return Ok(message);
        }
        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.inbox.recv_timeout(remaining) {
                Ok(message) if matches(&message) => return Ok(message),
                Ok(message) => self.pending.push_back(message),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(self.stalled("timeout", operation, waiting_on))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(self.stalled("disconnected", operation, waiting_on))
                }
            }
        }
    }

    fn stalled(&self, cause: &str, operation: &str, waiting_on: &[Rank]) -> PtError {
        let ranks = waiting_on
            .iter()
            .map(Rank::to_string)
            .collect::<Vec<_>>()
            .join(",");
        PtError::Transport(
            ErrorInfo::new(
                format!("{operation}-{cause}"),
                format!("{operation} did not complete: participant {cause}"),
            )
            .with_context("rank", self.rank.to_string())
            .with_context("stalled", ranks)
            .with_context("timeout_ms", self.timeout.as_millis().to_string())
            .with_hint("the run is aborted; no partial-ensemble recovery is attempted"),
        )
    }
}

impl<C> CollectiveChannel<C> for LocalChannel<C> {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn scatter(&mut self, values: Option<&[f64]>) -> Result<f64, PtError> {
        if !self.is_root() {
            let message = self.receive("scatter", &[ROOT], |m| matches!(m, Message::Scatter(_)))?;
            return match message {
                Message::Scatter(value) => Ok(value),
                _ => Err(unexpected("scatter", self.rank)),
            };
        }
        let values = values.ok_or_else(|| {
            PtError::Protocol(ErrorInfo::new(
                "scatter-missing",
                "root entered scatter without values",
            ))
        })?;
        if values.len() != self.size() {
            return Err(PtError::Protocol(
                ErrorInfo::new("ladder-size", "ladder length differs from participant count")
                    .with_context("ladder", values.len().to_string())
                    .with_context("participants", self.size().to_string()),
            ));
        }
        for (rank, &value) in values.iter().enumerate().skip(1) {
            self.send(rank, Message::Scatter(value))?;
        }
        Ok(values[ROOT])
    }

    fn gather(&mut self, value: f64) -> Result<Option<Vec<f64>>, PtError> {
        if !self.is_root() {
            self.send(
                ROOT,
                Message::Gather {
                    from: self.rank,
                    value,
                },
            )?;
            return Ok(None);
        }
        let size = self.size();
        let mut values: Vec<Option<f64>> = vec![None; size];
        values[ROOT] = Some(value);
        loop {
            let missing: Vec<Rank> = (0..size).filter(|&r| values[r].is_none()).collect();
            if missing.is_empty() {
                break;
            }
            let message =
                self.receive("gather", &missing, |m| matches!(m, Message::Gather { .. }))?;
            let Message::Gather { from, value } = message else {
                return Err(unexpected("gather", self.rank));
            };
            match values.get_mut(from) {
                Some(slot) if slot.is_none() => *slot = Some(value),
                _ => {
                    return Err(PtError::Protocol(
                        ErrorInfo::new("gather-duplicate", "rank reported twice in one gather")
                            .with_context("rank", from.to_string()),
                    ))
                }
            }
        }
        Ok(Some(values.into_iter().flatten().collect()))
    }

    fn broadcast(
        &mut self,
        pattern: Option<ExchangePattern>,
    ) -> Result<ExchangePattern, PtError> {
        if !self.is_root() {
            let message =
                self.receive("broadcast", &[ROOT], |m| matches!(m, Message::Broadcast(_)))?;
            return match message {
                Message::Broadcast(pattern) => Ok(pattern),
                _ => Err(unexpected("broadcast", self.rank)),
            };
        }
        let pattern = pattern.ok_or_else(|| {
            PtError::Protocol(ErrorInfo::new(
                "broadcast-missing",
                "root entered broadcast without a pattern",
            ))
        })?;
        pattern.validate(self.size())?;
        for rank in 1..self.size() {
            self.send(rank, Message::Broadcast(pattern.clone()))?;
        }
        Ok(pattern)
    }

    fn exchange(
        &mut self,
        partner: Rank,
        payload: ReplicaPayload<C>,
    ) -> Result<ReplicaPayload<C>, PtError> {
        if partner == self.rank || partner >= self.size() {
            return Err(PtError::Protocol(
                ErrorInfo::new("invalid-partner", "exchange partner must be another rank")
                    .with_context("rank", self.rank.to_string())
                    .with_context("partner", partner.to_string()),
            ));
        }
        self.send(
            partner,
            Message::Payload {
                from: self.rank,
                payload,
            },
        )?;
        let message = self.receive("exchange", &[partner], |m| {
            matches!(m, Message::Payload { from, .. } if *from == partner)
        })?;
        match message {
            Message::Payload { payload, .. } => Ok(payload),
            _ => Err(unexpected("exchange", self.rank)),
        }
    }
}

fn unexpected(operation: &str, rank: Rank) -> PtError {
    PtError::Protocol(
        ErrorInfo::new("unexpected-message", "received a message of the wrong kind")
            .with_context("operation", operation.to_string())
            .with_context("rank", rank.to_string()),
    )
}
