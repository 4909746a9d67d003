//! Deferred one-shot tasks with cancellation handles
//!
//! Every timer is fire-once. Repeating behaviour (health regeneration) is
//! built by re-arming from the handler. Cancelled timers stay in the heap
//! and are skipped when they surface.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

use super::EntityId;

/// Handle returned by [`Timers::schedule`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Work to run when a timer fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTask {
    /// Projectile lifetime elapsed
    ExpireProjectile(EntityId),
    /// Fire cooldown elapsed
    RearmWeapon(EntityId),
    /// One health regeneration step
    RegenHealth(EntityId),
    /// Full-state snapshot to every client
    BroadcastSnapshot,
}

#[derive(Debug, Default)]
pub struct Timers {
    next_id: u64,
    queue: BinaryHeap<Reverse<(Instant, TimerId)>>,
    pending: HashMap<TimerId, TimerTask>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, at: Instant, task: TimerTask) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.queue.push(Reverse((at, id)));
        self.pending.insert(id, task);
        id
    }

    /// Cancel a pending timer. Returns false if it already fired or was
    /// cancelled before.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Number of timers that will still fire
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Earliest deadline among live timers
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.discard_cancelled();
        self.queue.peek().map(|Reverse((at, _))| *at)
    }

    /// Pop the next task whose deadline is at or before `now`. Ties fire in
    /// scheduling order.
    pub fn pop_due(&mut self, now: Instant) -> Option<TimerTask> {
        self.discard_cancelled();
        let Reverse((at, id)) = *self.queue.peek()?;
        if at > now {
            return None;
        }
        self.queue.pop();
        self.pending.remove(&id)
    }

    fn discard_cancelled(&mut self) {
        while let Some(Reverse((_, id))) = self.queue.peek() {
            if self.pending.contains_key(id) {
                break;
            }
            self.queue.pop();
        }
    }
}
