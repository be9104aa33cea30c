//! Crossfader gain law for the two music decks.
//!
//! The law is linear with a center dip: at the midpoint both decks sit at
//! half their fader volume. It is not an equal-power curve.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Per-deck linear gains derived from the faders and the crossfader.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainSnapshot {
    pub left: f64,
    pub right: f64,
}

/// Live fader inputs of the gain law.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainModel {
    left_volume: f64,
    right_volume: f64,
    crossfade: f64,
}

impl GainModel {
    /// Create a model from initial inputs, each in 0.0 to 1.0.
    pub fn new(left_volume: f64, right_volume: f64, crossfade: f64) -> Result<Self> {
        Ok(Self {
            left_volume: unit("left volume", left_volume)?,
            right_volume: unit("right volume", right_volume)?,
            crossfade: unit("crossfade", crossfade)?,
        })
    }

    pub const fn left_volume(&self) -> f64 {
        self.left_volume
    }

    pub const fn right_volume(&self) -> f64 {
        self.right_volume
    }

    pub const fn crossfade(&self) -> f64 {
        self.crossfade
    }

    /// Update the left fader and return the new gains.
    pub fn set_left_volume(&mut self, value: f64) -> Result<GainSnapshot> {
        self.left_volume = unit("left volume", value)?;
        Ok(self.snapshot())
    }

    /// Update the right fader and return the new gains.
    pub fn set_right_volume(&mut self, value: f64) -> Result<GainSnapshot> {
        self.right_volume = unit("right volume", value)?;
        Ok(self.snapshot())
    }

    /// Update the crossfader and return the new gains.
    pub fn set_crossfade(&mut self, value: f64) -> Result<GainSnapshot> {
        self.crossfade = unit("crossfade", value)?;
        Ok(self.snapshot())
    }

    /// Gains for the current inputs.
    pub fn snapshot(&self) -> GainSnapshot {
        crossfade_gains(self.left_volume, self.right_volume, self.crossfade)
    }
}

/// `left = left_volume * (1 - crossfade)`, `right = right_volume * crossfade`.
pub fn crossfade_gains(left_volume: f64, right_volume: f64, crossfade: f64) -> GainSnapshot {
    GainSnapshot {
        left: left_volume * (1.0 - crossfade),
        right: right_volume * crossfade,
    }
}

fn unit(name: &str, value: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(Error::InvalidArgument(format!(
            "{name} should be between 0 and 1, got {value}"
        )))
    }
}
