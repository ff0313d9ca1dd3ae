//! Predicted entities and their simulation-eligibility flags.

use crate::history::RollbackHistory;
use netstep_common::{EntityId, NetworkTick};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Toggles whether predicted entities take part in the next invocation.
///
/// The rollback scheduler disables everything at burst setup, then re-enables
/// entities as the replay reaches the tick their authoritative state is from.
pub trait SimulationEligibility {
    /// Whether any predicted entity exists.
    fn has_predicted(&self) -> bool;

    fn disable_all(&mut self);

    /// Enable every entity whose rollback base tick is not newer than `base`.
    fn enable_from(&mut self, base: NetworkTick);

    fn enable_all(&mut self);
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GhostError {
    #[error("unknown predicted ghost {0:?}")]
    Unknown(EntityId),
    #[error("snapshot tick is invalid")]
    InvalidTick,
}

/// Rollback state of one predicted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictedGhost {
    /// Tick of the last authoritative state applied. Invalid until the first
    /// snapshot arrives.
    pub base_tick: NetworkTick,
    pub simulate: bool,
}

impl Default for PredictedGhost {
    fn default() -> Self {
        Self {
            base_tick: NetworkTick::INVALID,
            simulate: true,
        }
    }
}

/// All predicted entities of one client world.
#[derive(Debug, Clone, Default)]
pub struct GhostRegistry {
    ghosts: BTreeMap<EntityId, PredictedGhost>,
}

impl GhostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new predicted entity.
    pub fn spawn(&mut self) -> EntityId {
        let id = EntityId::new();
        self.ghosts.insert(id, PredictedGhost::default());
        id
    }

    pub fn despawn(&mut self, id: EntityId) -> Option<PredictedGhost> {
        self.ghosts.remove(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&PredictedGhost> {
        self.ghosts.get(&id)
    }

    pub fn len(&self) -> usize {
        self.ghosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ghosts.is_empty()
    }

    /// Apply authoritative state for `tick` to `id` and record the tick for
    /// the next burst.
    pub fn apply_snapshot(
        &mut self,
        id: EntityId,
        tick: NetworkTick,
        history: &mut RollbackHistory,
    ) -> Result<(), GhostError> {
        if !tick.is_valid() {
            return Err(GhostError::InvalidTick);
        }
        let ghost = self.ghosts.get_mut(&id).ok_or(GhostError::Unknown(id))?;
        ghost.base_tick = tick;
        history.record_applied(tick);
        tracing::trace!(?id, %tick, "snapshot applied");
        Ok(())
    }

    /// Entities that will run in the next invocation.
    pub fn simulating(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.ghosts
            .iter()
            .filter(|(_, g)| g.simulate)
            .map(|(id, _)| *id)
    }
}

impl SimulationEligibility for GhostRegistry {
    fn has_predicted(&self) -> bool {
        !self.ghosts.is_empty()
    }

    fn disable_all(&mut self) {
        for ghost in self.ghosts.values_mut() {
            ghost.simulate = false;
        }
    }

    fn enable_from(&mut self, base: NetworkTick) {
        for ghost in self.ghosts.values_mut() {
            // No snapshot yet: nothing to roll back to, always simulate.
            if !ghost.base_tick.is_valid() || !ghost.base_tick.is_newer_than(base) {
                ghost.simulate = true;
            }
        }
    }

    fn enable_all(&mut self) {
        for ghost in self.ghosts.values_mut() {
            ghost.simulate = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_snapshot_records_tick() {
        let mut ghosts = GhostRegistry::new();
        let mut history = RollbackHistory::new();
        let id = ghosts.spawn();

        ghosts
            .apply_snapshot(id, NetworkTick::new(20), &mut history)
            .unwrap();
        assert_eq!(ghosts.get(id).unwrap().base_tick, NetworkTick::new(20));
        assert!(history.applied().contains(NetworkTick::new(20)));
    }

    #[test]
    fn apply_snapshot_rejects_bad_input() {
        let mut ghosts = GhostRegistry::new();
        let mut history = RollbackHistory::new();
        let id = ghosts.spawn();
        let stranger = EntityId::new();

        assert_eq!(
            ghosts.apply_snapshot(id, NetworkTick::INVALID, &mut history),
            Err(GhostError::InvalidTick)
        );
        assert_eq!(
            ghosts.apply_snapshot(stranger, NetworkTick::new(1), &mut history),
            Err(GhostError::Unknown(stranger))
        );
        assert!(history.applied().is_empty());
    }

    #[test]
    fn enable_from_follows_base_tick() {
        let mut ghosts = GhostRegistry::new();
        let mut history = RollbackHistory::new();
        let old = ghosts.spawn();
        let new = ghosts.spawn();
        let fresh = ghosts.spawn();
        ghosts.apply_snapshot(old, NetworkTick::new(10), &mut history).unwrap();
        ghosts.apply_snapshot(new, NetworkTick::new(14), &mut history).unwrap();

        ghosts.disable_all();
        assert_eq!(ghosts.simulating().count(), 0);

        ghosts.enable_from(NetworkTick::new(12));
        let running: Vec<EntityId> = ghosts.simulating().collect();
        assert!(running.contains(&old));
        assert!(running.contains(&fresh));
        assert!(!running.contains(&new));

        ghosts.enable_from(NetworkTick::new(14));
        assert_eq!(ghosts.simulating().count(), 3);
    }
}
