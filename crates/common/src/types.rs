use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a simulated entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

/// Real (wall-clock) timing of the frame currently being scheduled.
///
/// Supplied by the host loop once per frame. The drivers never read a clock
/// themselves.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameTime {
    /// Seconds of simulated time elapsed since the world started.
    pub elapsed: f64,
    /// Real seconds since the previous frame.
    pub delta: f64,
}

impl FrameTime {
    pub fn new(elapsed: f64, delta: f64) -> Self {
        Self { elapsed, delta }
    }

    /// Advance to the next frame by `delta` seconds.
    pub fn advanced(self, delta: f64) -> Self {
        Self {
            elapsed: self.elapsed + delta,
            delta,
        }
    }
}
