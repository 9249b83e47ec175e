//! Footstep action primitives
//!
//! A footstep is the displacement `(x, y, theta)` of the swing foot relative
//! to the stance foot, expressed in the stance foot's frame for one
//! reference stance leg. Steps taken from the other stance leg mirror the
//! lateral offset and the rotation. Cell displacements are precomputed for
//! every stance angle bin, which makes `invert(apply(s)) == s` exact.

use std::f64::consts::SQRT_2;

use nalgebra::{Rotation2, Vector2};

use crate::common::Leg;

use super::discretization::{norm_angle_bin, signed_bin_difference, Discretization};
use super::planning_state::PlanningState;

#[derive(Debug, Clone)]
pub struct Footstep {
    x: f64,
    y: f64,
    theta: f64,
    disc_theta: i32,
    reference_leg: Leg,
    /// stance angle bin -> cell displacement, stance on the reference leg
    reference_moves: Vec<(i32, i32)>,
    /// stance angle bin -> cell displacement, stance on the other leg
    mirrored_moves: Vec<(i32, i32)>,
}

impl Footstep {
    pub fn new(x: f64, y: f64, theta: f64, reference_leg: Leg, disc: &Discretization) -> Self {
        let bins = 0..disc.num_angle_bins;
        let reference_moves = bins
            .clone()
            .map(|bin| Self::calculate_move(x, y, bin, disc))
            .collect();
        let mirrored_moves = bins.map(|bin| Self::calculate_move(x, -y, bin, disc)).collect();

        Self {
            x,
            y,
            theta,
            disc_theta: (theta / disc.angle_bin_size()).round() as i32,
            reference_leg,
            reference_moves,
            mirrored_moves,
        }
    }

    fn calculate_move(x: f64, y: f64, stance_bin: i32, disc: &Discretization) -> (i32, i32) {
        let world = Rotation2::new(disc.bin_to_angle(stance_bin)) * Vector2::new(x, y);
        (disc.cont_to_disc(world.x), disc.cont_to_disc(world.y))
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }

    /// Rotation in angle bins when stepping from the reference leg
    pub fn disc_theta(&self) -> i32 {
        self.disc_theta
    }

    /// Length of the planar displacement [m]
    pub fn reach(&self) -> f64 {
        self.x.hypot(self.y)
    }

    fn moves_and_rotation(&self, stance_leg: Leg) -> (&[(i32, i32)], i32) {
        if stance_leg == self.reference_leg {
            (&self.reference_moves, self.disc_theta)
        } else {
            (&self.mirrored_moves, -self.disc_theta)
        }
    }

    /// Successor reached by moving the swing foot from `stance`
    pub fn apply(&self, stance: &PlanningState, disc: &Discretization) -> PlanningState {
        let (moves, dtheta) = self.moves_and_rotation(stance.leg());
        let (dx, dy) = moves[stance.theta() as usize];
        PlanningState::new(
            stance.x() + dx,
            stance.y() + dy,
            stance.theta() + dtheta,
            stance.leg().opposite(),
            disc,
        )
    }

    /// Stance state from which `apply` yields `swing`
    pub fn invert(&self, swing: &PlanningState, disc: &Discretization) -> PlanningState {
        let stance_leg = swing.leg().opposite();
        let (moves, dtheta) = self.moves_and_rotation(stance_leg);
        let stance_theta = norm_angle_bin(swing.theta() - dtheta, disc.num_angle_bins);
        let (dx, dy) = moves[stance_theta as usize];
        PlanningState::new(swing.x() - dx, swing.y() - dy, stance_theta, stance_leg, disc)
    }
}

/// Continuous kinematic step limits, relative to the nominal foot separation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLimits {
    pub max_x: f64,
    pub max_y: f64,
    pub max_theta: f64,
    pub max_inv_x: f64,
    pub max_inv_y: f64,
    pub max_inv_theta: f64,
}

/// Discretized step limits.
///
/// A step is measured in the stance frame and mirrored so that the swing
/// foot is always on the +y side: positive x is forward, positive y beyond
/// the separation is outward and positive theta turns away from the stance
/// foot. The `max_*` bounds limit those directions, the `max_inv_*` bounds
/// limit the opposite ones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepBounds {
    max_x: i32,
    max_y: i32,
    max_theta: i32,
    max_inv_x: i32,
    max_inv_y: i32,
    max_inv_theta: i32,
    separation: i32,
}

impl StepBounds {
    pub fn new(limits: &StepLimits, foot_separation: f64, disc: &Discretization) -> Self {
        let angle = |theta: f64| (theta / disc.angle_bin_size()).round() as i32;
        Self {
            max_x: disc.cont_to_disc(limits.max_x),
            max_y: disc.cont_to_disc(limits.max_y),
            max_theta: angle(limits.max_theta),
            max_inv_x: disc.cont_to_disc(limits.max_inv_x),
            max_inv_y: disc.cont_to_disc(limits.max_inv_y),
            max_inv_theta: angle(limits.max_inv_theta),
            separation: disc.cont_to_disc(foot_separation),
        }
    }

    /// Step from `stance` to `swing` as (x cells, y cells beyond separation, theta bins)
    pub fn relative_step(
        &self,
        stance: &PlanningState,
        swing: &PlanningState,
        disc: &Discretization,
    ) -> (i32, i32, i32) {
        let delta = Vector2::new(
            disc.disc_to_cont(swing.x() - stance.x()),
            disc.disc_to_cont(swing.y() - stance.y()),
        );
        let local = Rotation2::new(-disc.bin_to_angle(stance.theta())) * delta;
        let mut local_y = local.y;
        let mut dtheta = signed_bin_difference(swing.theta() - stance.theta(), disc.num_angle_bins);
        if stance.leg() == Leg::Left {
            local_y = -local_y;
            dtheta = -dtheta;
        }
        (
            disc.cont_to_disc(local.x),
            disc.cont_to_disc(local_y) - self.separation,
            dtheta,
        )
    }

    /// True if the step from `stance` to `swing` respects the limits
    pub fn performable(&self, stance: &PlanningState, swing: &PlanningState, disc: &Discretization) -> bool {
        if swing.leg() != stance.leg().opposite() || stance.leg() == Leg::NoLeg {
            return false;
        }
        let (x, y, theta) = self.relative_step(stance, swing, disc);
        x <= self.max_x
            && x >= -self.max_inv_x
            && y <= self.max_y
            && y >= -self.max_inv_y
            && theta <= self.max_theta
            && theta >= -self.max_inv_theta
    }

    /// Upper bound on the planar distance covered by any performable step [m]
    pub fn max_reach(&self, disc: &Discretization) -> f64 {
        let x = self.max_x.max(self.max_inv_x);
        let y = (self.separation + self.max_y).max((self.separation - self.max_inv_y).abs());
        disc.disc_to_cont(x).hypot(disc.disc_to_cont(y)) + disc.cell_size * SQRT_2
    }
}
