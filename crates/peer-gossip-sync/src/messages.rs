//! Push protocol frame types.
//!
//! A push session receives [`Presentation`] frames from the remote peer and
//! sends [`OutboundFrame`]s back. See [`crate::codec`] for the wire shapes.

use peer_gossip_core::{DeltaEntry, StateSnapshot, VectorClock};

/// Frame size limits.
pub mod limits {
    /// Max deltas in one `Deltas` frame.
    pub const MAX_DELTAS_PER_FRAME: usize = 64;
    /// Max actors in any clock carried by a frame.
    pub const MAX_CLOCK_ACTORS: usize = 4096;
}

/// Control frame sent by the remote peer.
///
/// Carries what the remote knows and how it wants to be fed: eagerly (push
/// payloads) or lazily (announce clocks only; the remote pulls).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Presentation {
    /// Remote clock, if the remote chose to share it.
    pub remote_clock: Option<VectorClock>,
    /// Switch this session to lazy mode.
    pub start_lazy: bool,
    /// Switch this session to eager mode. Wins over `start_lazy`.
    pub start_eager: bool,
}

impl Presentation {
    /// Share a clock without changing mode.
    pub fn clock(clock: VectorClock) -> Self {
        Self {
            remote_clock: Some(clock),
            ..Self::default()
        }
    }

    /// Ask for lazy mode.
    pub fn lazy(clock: Option<VectorClock>) -> Self {
        Self {
            remote_clock: clock,
            start_lazy: true,
            start_eager: false,
        }
    }

    /// Ask for eager mode.
    pub fn eager(clock: Option<VectorClock>) -> Self {
        Self {
            remote_clock: clock,
            start_lazy: false,
            start_eager: true,
        }
    }

    /// Whether handling this frame requires a reconciliation attempt.
    pub fn triggers_reconcile(&self) -> bool {
        self.remote_clock.is_some() || self.start_eager
    }

    /// Check if this frame respects size limits.
    pub fn validate_limits(&self) -> Result<(), &'static str> {
        match &self.remote_clock {
            Some(clock) if clock.len() > limits::MAX_CLOCK_ACTORS => {
                Err("too many actors in remote clock")
            }
            _ => Ok(()),
        }
    }
}

/// Frames a push session emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// One or more deltas. Sessions emit one delta per frame.
    Deltas(Vec<DeltaEntry>),

    /// Full clock and state, used to bootstrap a peer deltas cannot reach.
    Snapshot(StateSnapshot),

    /// Clock announcement only.
    ClockOnly(VectorClock),
}

/// Discriminant of an [`OutboundFrame`], for logs and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Deltas,
    Snapshot,
    ClockOnly,
}

impl OutboundFrame {
    /// Frame carrying a single delta.
    pub fn delta(entry: DeltaEntry) -> Self {
        OutboundFrame::Deltas(vec![entry])
    }

    /// Which kind of frame this is.
    pub fn kind(&self) -> FrameKind {
        match self {
            OutboundFrame::Deltas(_) => FrameKind::Deltas,
            OutboundFrame::Snapshot(_) => FrameKind::Snapshot,
            OutboundFrame::ClockOnly(_) => FrameKind::ClockOnly,
        }
    }

    /// The clock a receiver can claim after applying this frame.
    pub fn clock(&self) -> Option<VectorClock> {
        match self {
            OutboundFrame::Deltas(deltas) => deltas
                .iter()
                .map(DeltaEntry::resulting_clock)
                .reduce(|a, b| a.merge(&b)),
            OutboundFrame::Snapshot(snapshot) => Some(snapshot.clock.clone()),
            OutboundFrame::ClockOnly(clock) => Some(clock.clone()),
        }
    }

    /// Check if this frame respects size limits.
    pub fn validate_limits(&self) -> Result<(), &'static str> {
        match self {
            OutboundFrame::Deltas(deltas) => {
                if deltas.len() > limits::MAX_DELTAS_PER_FRAME {
                    return Err("too many deltas");
                }
                if deltas
                    .iter()
                    .any(|d| d.previous_clock.len() > limits::MAX_CLOCK_ACTORS)
                {
                    return Err("too many actors in delta clock");
                }
            }
            OutboundFrame::Snapshot(snapshot) => {
                if snapshot.clock.len() > limits::MAX_CLOCK_ACTORS {
                    return Err("too many actors in snapshot clock");
                }
            }
            OutboundFrame::ClockOnly(clock) => {
                if clock.len() > limits::MAX_CLOCK_ACTORS {
                    return Err("too many actors in clock");
                }
            }
        }
        Ok(())
    }
}
