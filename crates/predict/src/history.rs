//! Rollback bookkeeping fed between prediction bursts.

use netstep_common::NetworkTick;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashSet;

/// An unordered, deduplicated set of valid ticks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSet {
    ticks: HashSet<NetworkTick>,
}

/// Ticks at which authoritative state was applied to a predicted entity.
pub type AppliedTickSet = TickSet;

/// Ticks for which new input arrived since the last burst.
pub type UniqueInputTickSet = TickSet;

impl TickSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `tick`. Invalid ticks are ignored. Returns whether it was new.
    pub fn insert(&mut self, tick: NetworkTick) -> bool {
        tick.is_valid() && self.ticks.insert(tick)
    }

    pub fn contains(&self, tick: NetworkTick) -> bool {
        self.ticks.contains(&tick)
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn clear(&mut self) {
        self.ticks.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = NetworkTick> + '_ {
        self.ticks.iter().copied()
    }

    /// The tick furthest behind `reference`.
    pub fn oldest_relative_to(&self, reference: NetworkTick) -> Option<NetworkTick> {
        self.iter().max_by_key(|t| reference.ticks_since(*t))
    }

    /// All ticks ordered oldest first relative to `reference`.
    pub fn sorted_oldest_first(&self, reference: NetworkTick) -> Vec<NetworkTick> {
        let mut ticks: Vec<NetworkTick> = self.iter().collect();
        ticks.sort_by_key(|t| Reverse(reference.ticks_since(*t)));
        ticks
    }
}

/// The two sets the rollback scheduler consumes at burst setup.
#[derive(Debug, Clone, Default)]
pub struct RollbackHistory {
    applied: AppliedTickSet,
    inputs: UniqueInputTickSet,
}

impl RollbackHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that authoritative state for `tick` was applied to a predicted
    /// entity, so the burst must replay from it.
    pub fn record_applied(&mut self, tick: NetworkTick) {
        self.applied.insert(tick);
    }

    /// Record that new input for `tick` arrived.
    pub fn record_input(&mut self, tick: NetworkTick) {
        self.inputs.insert(tick);
    }

    pub fn applied(&self) -> &AppliedTickSet {
        &self.applied
    }

    pub fn applied_mut(&mut self) -> &mut AppliedTickSet {
        &mut self.applied
    }

    pub fn inputs(&self) -> &UniqueInputTickSet {
        &self.inputs
    }

    pub fn inputs_mut(&mut self) -> &mut UniqueInputTickSet {
        &mut self.inputs
    }

    pub fn clear(&mut self) {
        self.applied.clear();
        self.inputs.clear();
    }
}
