use crate::tick::NetworkTick;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-invocation flags describing where the current simulation step sits
/// inside a prediction or catch-up burst.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkTimeFlags(pub u8);

impl NetworkTimeFlags {
    pub const NONE: NetworkTimeFlags = NetworkTimeFlags(0);

    pub const IN_PREDICTION_LOOP: u8 = 0b0000_0001;
    pub const FIRST_PREDICTION_TICK: u8 = 0b0000_0010;
    pub const FINAL_PREDICTION_TICK: u8 = 0b0000_0100;
    pub const FINAL_FULL_PREDICTION_TICK: u8 = 0b0000_1000;
    pub const FIRST_TIME_FULLY_PREDICTING_TICK: u8 = 0b0001_0000;
    pub const CATCH_UP_TICK: u8 = 0b0010_0000;

    /// Flags that only have meaning inside a prediction burst.
    pub const PREDICTION_LOOP_MASK: u8 = Self::IN_PREDICTION_LOOP
        | Self::FIRST_PREDICTION_TICK
        | Self::FINAL_PREDICTION_TICK
        | Self::FINAL_FULL_PREDICTION_TICK
        | Self::FIRST_TIME_FULLY_PREDICTING_TICK;

    #[inline]
    pub fn contains(self, bits: u8) -> bool {
        self.0 & bits == bits
    }

    #[inline]
    pub fn set(&mut self, bits: u8, value: bool) {
        if value {
            self.0 |= bits;
        } else {
            self.0 &= !bits;
        }
    }

    #[inline]
    pub fn insert(&mut self, bits: u8) {
        self.0 |= bits;
    }

    #[inline]
    pub fn remove(&mut self, bits: u8) {
        self.0 &= !bits;
    }

    #[inline]
    pub fn is_in_prediction_loop(self) -> bool {
        self.contains(Self::IN_PREDICTION_LOOP)
    }

    #[inline]
    pub fn is_first_prediction_tick(self) -> bool {
        self.contains(Self::FIRST_PREDICTION_TICK)
    }

    #[inline]
    pub fn is_final_prediction_tick(self) -> bool {
        self.contains(Self::FINAL_PREDICTION_TICK)
    }

    #[inline]
    pub fn is_final_full_prediction_tick(self) -> bool {
        self.contains(Self::FINAL_FULL_PREDICTION_TICK)
    }

    #[inline]
    pub fn is_first_time_fully_predicting_tick(self) -> bool {
        self.contains(Self::FIRST_TIME_FULLY_PREDICTING_TICK)
    }

    #[inline]
    pub fn is_catch_up_tick(self) -> bool {
        self.contains(Self::CATCH_UP_TICK)
    }
}

impl fmt::Display for NetworkTimeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(u8, &str); 6] = [
            (NetworkTimeFlags::IN_PREDICTION_LOOP, "loop"),
            (NetworkTimeFlags::FIRST_PREDICTION_TICK, "first"),
            (NetworkTimeFlags::FINAL_PREDICTION_TICK, "final"),
            (NetworkTimeFlags::FINAL_FULL_PREDICTION_TICK, "final-full"),
            (NetworkTimeFlags::FIRST_TIME_FULLY_PREDICTING_TICK, "first-time"),
            (NetworkTimeFlags::CATCH_UP_TICK, "catch-up"),
        ];
        let mut wrote = false;
        for (bit, name) in NAMES {
            if self.contains(bit) {
                if wrote {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                wrote = true;
            }
        }
        if !wrote {
            f.write_str("-")?;
        }
        Ok(())
    }
}

/// The shared "current network time" record of one simulated world.
///
/// Written only by the driver that is currently running; every simulation
/// system invoked inside that driver's window reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkTime {
    pub server_tick: NetworkTick,
    /// Progress toward `server_tick`, in `(0, 1]`.
    pub server_tick_fraction: f32,
    pub interpolation_tick: NetworkTick,
    pub interpolation_tick_fraction: f32,
    pub flags: NetworkTimeFlags,
    /// Number of ticks the current invocation advances by.
    pub simulation_step_batch_size: u32,
    /// Invocations run so far in the current prediction burst.
    pub predicted_tick_index: u32,
    pub num_predicted_ticks_expected: u32,
    pub elapsed_network_time: f64,
    pub effective_input_latency_ticks: u32,
}

impl Default for NetworkTime {
    fn default() -> Self {
        Self {
            server_tick: NetworkTick::INVALID,
            server_tick_fraction: 1.0,
            interpolation_tick: NetworkTick::INVALID,
            interpolation_tick_fraction: 1.0,
            flags: NetworkTimeFlags::NONE,
            simulation_step_batch_size: 1,
            predicted_tick_index: 0,
            num_predicted_ticks_expected: 0,
            elapsed_network_time: 0.0,
            effective_input_latency_ticks: 0,
        }
    }
}

impl NetworkTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_partial_tick(&self) -> bool {
        self.server_tick_fraction < 1.0
    }

    pub fn is_in_prediction_loop(&self) -> bool {
        self.flags.is_in_prediction_loop()
    }

    /// Clear every flag that is scoped to a prediction burst.
    pub fn clear_prediction_flags(&mut self) {
        self.flags.remove(NetworkTimeFlags::PREDICTION_LOOP_MASK);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_set_and_clear() {
        let mut flags = NetworkTimeFlags::NONE;
        flags.insert(NetworkTimeFlags::IN_PREDICTION_LOOP);
        flags.set(NetworkTimeFlags::FINAL_PREDICTION_TICK, true);
        assert!(flags.is_in_prediction_loop());
        assert!(flags.is_final_prediction_tick());
        assert!(!flags.is_catch_up_tick());

        flags.set(NetworkTimeFlags::FINAL_PREDICTION_TICK, false);
        assert!(!flags.is_final_prediction_tick());
    }

    #[test]
    fn clearing_prediction_flags_keeps_catch_up() {
        let mut time = NetworkTime::new();
        time.flags.insert(NetworkTimeFlags::CATCH_UP_TICK);
        time.flags.insert(NetworkTimeFlags::PREDICTION_LOOP_MASK);
        time.clear_prediction_flags();
        assert_eq!(time.flags.0, NetworkTimeFlags::CATCH_UP_TICK);
    }

    #[test]
    fn flags_display() {
        let mut flags = NetworkTimeFlags::NONE;
        assert_eq!(flags.to_string(), "-");
        flags.insert(
            NetworkTimeFlags::IN_PREDICTION_LOOP | NetworkTimeFlags::FINAL_PREDICTION_TICK,
        );
        assert_eq!(flags.to_string(), "loop|final");
    }

    #[test]
    fn default_time_is_whole_and_invalid() {
        let time = NetworkTime::default();
        assert!(!time.server_tick.is_valid());
        assert!(!time.is_partial_tick());
        assert_eq!(time.simulation_step_batch_size, 1);
    }
}
