//! Turntable scratch gesture mapping.
//!
//! A drag around the platter is converted to an absolute track position.
//! The angle travelled since the drag began is accumulated and scaled by a
//! fixed seconds-per-radian ratio, so the seek distance depends only on how
//! far the pointer turned, never on how fast.

use std::f64::consts::{PI, TAU};

/// Default amount of track covered by one full platter revolution.
pub const DEFAULT_SECONDS_PER_REVOLUTION: f64 = 5.0;

/// Circular control region a drag must start in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScratchRegion {
    pub center_x: f64,
    pub center_y: f64,
    pub radius: f64,
}

impl ScratchRegion {
    pub const fn new(center_x: f64, center_y: f64, radius: f64) -> Self {
        Self {
            center_x,
            center_y,
            radius,
        }
    }

    /// Whether a pointer at `(x, y)` lies on the platter.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (x - self.center_x).hypot(y - self.center_y) <= self.radius
    }

    /// Angle of `(x, y)` around the center, in `(-PI, PI]`.
    pub fn angle_of(&self, x: f64, y: f64) -> f64 {
        (y - self.center_y).atan2(x - self.center_x)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Idle,
    Dragging {
        last_angle: f64,
        accumulated: f64,
        start_position: f64,
    },
}

/// Idle/dragging state machine turning pointer angles into seek targets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScratchMapper {
    state: State,
    seconds_per_radian: f64,
}

impl Default for ScratchMapper {
    fn default() -> Self {
        Self::new(DEFAULT_SECONDS_PER_REVOLUTION)
    }
}

impl ScratchMapper {
    /// Create a mapper covering `seconds_per_revolution` per full turn.
    pub fn new(seconds_per_revolution: f64) -> Self {
        Self {
            state: State::Idle,
            seconds_per_radian: seconds_per_revolution / TAU,
        }
    }

    pub const fn seconds_per_radian(&self) -> f64 {
        self.seconds_per_radian
    }

    pub const fn is_dragging(&self) -> bool {
        matches!(self.state, State::Dragging { .. })
    }

    /// Total angle turned since the current drag began (0 when idle).
    pub const fn accumulated_angle(&self) -> f64 {
        match self.state {
            State::Dragging { accumulated, .. } => accumulated,
            State::Idle => 0.0,
        }
    }

    /// Start a drag at `angle` with the deck currently at `position` seconds.
    ///
    /// A drag already in progress is restarted from the new angle. A
    /// non-finite angle is ignored.
    pub fn begin(&mut self, angle: f64, position: f64) {
        if !angle.is_finite() {
            return;
        }
        self.state = State::Dragging {
            last_angle: angle,
            accumulated: 0.0,
            start_position: position,
        };
    }

    /// Start a drag from a pointer-down at `(x, y)` if it hit the region.
    pub fn pointer_down(&mut self, region: &ScratchRegion, x: f64, y: f64, position: f64) -> bool {
        if !region.contains(x, y) {
            return false;
        }
        self.begin(region.angle_of(x, y), position);
        true
    }

    /// Feed a new pointer angle; returns the position to seek to.
    ///
    /// Returns `None` while idle and for a non-finite angle, which leaves
    /// the drag as it was.
    pub fn update(&mut self, angle: f64, length: f64) -> Option<f64> {
        if !angle.is_finite() {
            return None;
        }
        let State::Dragging {
            last_angle,
            accumulated,
            start_position,
        } = &mut self.state
        else {
            return None;
        };

        *accumulated += wrapped_delta(*last_angle, angle);
        *last_angle = angle;

        let target = *start_position + *accumulated * self.seconds_per_radian;
        Some(target.clamp(0.0, length.max(0.0)))
    }

    /// End the drag. No further positions are produced until the next begin.
    pub fn end(&mut self) {
        self.state = State::Idle;
    }
}

/// Shortest signed angle from `from` to `to`.
///
/// Crossing the PI/-PI seam counts as a small step, not a near full turn.
pub fn wrapped_delta(from: f64, to: f64) -> f64 {
    let delta = to - from;
    if delta > PI {
        delta - TAU
    } else if delta < -PI {
        delta + TAU
    } else {
        delta
    }
}
