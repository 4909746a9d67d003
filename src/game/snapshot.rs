//! Snapshot/delta shaping and per-client outbound queues

use crate::ws::channel::ClientChannel;
use crate::ws::protocol::{EntityState, Point};

use super::geometry::Vec2;

/// Decimal places kept on the wire
pub const WIRE_PRECISION: i32 = 3;

/// Round to [`WIRE_PRECISION`] decimal places
pub fn round(n: f32) -> f32 {
    let factor = 10f32.powi(WIRE_PRECISION);
    (n * factor).round() / factor
}

impl From<Vec2> for Point {
    fn from(v: Vec2) -> Self {
        Point {
            x: round(v.x),
            y: round(v.y),
        }
    }
}

/// Whether an entity should describe itself fully or as a delta
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    /// Full descriptor, sent on spawn and on request
    Snapshot,
    /// Per-tick update omitting static fields
    Delta,
}

impl SendMode {
    pub fn is_snapshot(self) -> bool {
        self == SendMode::Snapshot
    }
}

/// State messages waiting for the next network tick
#[derive(Debug, Default)]
pub struct OutboundQueue {
    pending: Vec<EntityState>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend_from_slice(&mut self, states: &[EntityState]) {
        self.pending.extend_from_slice(states);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Send everything queued as one `set` batch and clear the queue. An
    /// empty queue still produces an (empty) batch.
    pub fn flush(&mut self, channel: &ClientChannel) -> usize {
        let batch = std::mem::take(&mut self.pending);
        let count = batch.len();
        channel.push_set(batch);
        count
    }
}
