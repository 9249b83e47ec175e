//! Common types used throughout footstep_planner

use std::f64::consts::PI;
use std::fmt;

use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};

/// Which foot a pose belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Leg {
    #[default]
    Right,
    Left,
    /// Robot-centre poses that are not a foot placement
    NoLeg,
}

impl Leg {
    /// The other foot. `NoLeg` stays `NoLeg`.
    pub fn opposite(self) -> Leg {
        match self {
            Leg::Right => Leg::Left,
            Leg::Left => Leg::Right,
            Leg::NoLeg => Leg::NoLeg,
        }
    }

    /// Lateral sign of the foot relative to the robot centre (left is +y)
    pub fn lateral_sign(self) -> f64 {
        match self {
            Leg::Left => 1.0,
            Leg::Right => -1.0,
            Leg::NoLeg => 0.0,
        }
    }

    pub(crate) fn as_index(self) -> u32 {
        match self {
            Leg::Right => 0,
            Leg::Left => 1,
            Leg::NoLeg => 2,
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::Right => write!(f, "right"),
            Leg::Left => write!(f, "left"),
            Leg::NoLeg => write!(f, "noleg"),
        }
    }
}

/// 2D pose (position + orientation) of the robot centre
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose2D {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }
}

/// Continuous foot pose in the world frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct State {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub leg: Leg,
}

impl State {
    pub fn new(x: f64, y: f64, theta: f64, leg: Leg) -> Self {
        Self { x, y, theta, leg }
    }

    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    /// Express a vector given in this pose's local frame in the world frame
    pub fn local_to_world(&self, local: Vector2<f64>) -> Vector2<f64> {
        self.position() + Rotation2::new(self.theta) * local
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3}, {})", self.x, self.y, self.theta, self.leg)
    }
}

/// Planned footstep sequence from start to goal
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FootstepPath {
    pub steps: Vec<State>,
    /// Total cost in the units of the configured step cost
    pub cost: f64,
}

impl FootstepPath {
    pub fn new(steps: Vec<State>, cost: f64) -> Self {
        Self { steps, cost }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Wrap an angle into [-pi, pi)
pub fn normalize_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_leg_opposite() {
        assert_eq!(Leg::Left.opposite(), Leg::Right);
        assert_eq!(Leg::Right.opposite(), Leg::Left);
        assert_eq!(Leg::NoLeg.opposite(), Leg::NoLeg);
    }

    #[test]
    fn test_default_leg_is_right() {
        assert_eq!(Leg::default(), Leg::Right);
    }

    #[test]
    fn test_state_local_to_world() {
        let s = State::new(1.0, 2.0, PI / 2.0, Leg::Left);
        let p = s.local_to_world(Vector2::new(1.0, 0.0));
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_normalize_angle() {
        assert_relative_eq!(normalize_angle(3.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(normalize_angle(-0.25), -0.25, epsilon = 1e-12);
    }
}
