use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A simulation tick id.
///
/// Ticks are a 31-bit wrapping counter stored as `(index << 1) | 1`, so the raw
/// value `0` is reserved for [`NetworkTick::INVALID`]. All comparisons go
/// through [`NetworkTick::ticks_since`], which stays correct across
/// wrap-around. There is deliberately no `Ord` impl: "older" only has meaning
/// relative to another tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkTick(u32);

impl NetworkTick {
    pub const INVALID: Self = Self(0);

    /// Create a valid tick from its index.
    pub fn new(index: u32) -> Self {
        Self((index << 1) | 1)
    }

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Tick index. Only meaningful for valid ticks.
    pub fn index(self) -> u32 {
        debug_assert!(self.is_valid(), "index of an invalid tick");
        self.0 >> 1
    }

    /// Signed number of ticks from `older` to `self`.
    pub fn ticks_since(self, older: Self) -> i32 {
        debug_assert!(self.is_valid() && older.is_valid());
        (self.0.wrapping_sub(older.0) as i32) >> 1
    }

    pub fn is_newer_than(self, other: Self) -> bool {
        self.ticks_since(other) > 0
    }

    pub fn next(self) -> Self {
        self + 1
    }

    pub fn prev(self) -> Self {
        self - 1
    }
}

impl Add<u32> for NetworkTick {
    type Output = Self;

    fn add(self, ticks: u32) -> Self {
        debug_assert!(self.is_valid(), "advancing an invalid tick");
        Self(self.0.wrapping_add(ticks.wrapping_mul(2)))
    }
}

impl AddAssign<u32> for NetworkTick {
    fn add_assign(&mut self, ticks: u32) {
        *self = *self + ticks;
    }
}

impl Sub<u32> for NetworkTick {
    type Output = Self;

    fn sub(self, ticks: u32) -> Self {
        debug_assert!(self.is_valid(), "rewinding an invalid tick");
        Self(self.0.wrapping_sub(ticks.wrapping_mul(2)))
    }
}

impl SubAssign<u32> for NetworkTick {
    fn sub_assign(&mut self, ticks: u32) {
        *self = *self - ticks;
    }
}

impl fmt::Display for NetworkTick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.index())
        } else {
            f.write_str("invalid")
        }
    }
}

/// The latest server tick known to be valid for the local world this frame,
/// plus fractional progress toward it.
///
/// A fraction of exactly `1.0` means the tick is complete; anything in `(0, 1)`
/// means the world is partway from `tick - 1` to `tick`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedTick {
    pub tick: NetworkTick,
    pub fraction: f32,
}

impl ConfirmedTick {
    pub const INVALID: Self = Self {
        tick: NetworkTick::INVALID,
        fraction: 1.0,
    };

    /// A fully completed tick.
    pub fn whole(tick: NetworkTick) -> Self {
        Self {
            tick,
            fraction: 1.0,
        }
    }

    /// A tick that is `fraction` of the way done. Out-of-range fractions are
    /// clamped into `(0, 1]`.
    pub fn partial(tick: NetworkTick, fraction: f32) -> Self {
        let fraction = if fraction.is_finite() && fraction > 0.0 {
            fraction.min(1.0)
        } else {
            1.0
        };
        Self { tick, fraction }
    }

    pub fn is_valid(&self) -> bool {
        self.tick.is_valid()
    }

    pub fn is_partial(&self) -> bool {
        self.fraction < 1.0
    }
}

impl Default for ConfirmedTick {
    fn default() -> Self {
        Self::INVALID
    }
}
