//! Discrete planning state: a foot pose on the planning lattice

use crate::common::{Leg, State};

use super::discretization::{int_hash, norm_angle_bin, Discretization};

/// Discretized foot pose with its hash bucket and (once registered) its id.
///
/// Equality compares the hash tag first and then all four discrete fields;
/// the id does not take part in it.
#[derive(Debug, Clone)]
pub struct PlanningState {
    x: i32,
    y: i32,
    theta: i32,
    leg: Leg,
    id: Option<usize>,
    hash_tag: u32,
}

impl PlanningState {
    /// State from discrete fields; `theta` is wrapped into the bin range
    pub fn new(x: i32, y: i32, theta: i32, leg: Leg, disc: &Discretization) -> Self {
        let theta = norm_angle_bin(theta, disc.num_angle_bins);
        Self {
            x,
            y,
            theta,
            leg,
            id: None,
            hash_tag: Self::calculate_hash_tag(x, y, theta, leg, disc.max_hash_size),
        }
    }

    /// Discretize a continuous foot pose
    pub fn from_state(state: &State, disc: &Discretization) -> Self {
        Self::new(
            disc.cont_to_disc(state.x),
            disc.cont_to_disc(state.y),
            disc.angle_to_bin(state.theta),
            state.leg,
            disc,
        )
    }

    /// Continuous pose at the centre of this lattice cell
    pub fn to_state(&self, disc: &Discretization) -> State {
        State::new(
            disc.disc_to_cont(self.x),
            disc.disc_to_cont(self.y),
            disc.bin_to_angle(self.theta),
            self.leg,
        )
    }

    fn calculate_hash_tag(x: i32, y: i32, theta: i32, leg: Leg, max_hash_size: u32) -> u32 {
        let combined = (int_hash(x as u32) << 3)
            .wrapping_add(int_hash(y as u32) << 2)
            .wrapping_add(int_hash(theta as u32) << 1)
            .wrapping_add(int_hash(leg.as_index()));
        int_hash(combined) % max_hash_size.max(1)
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn theta(&self) -> i32 {
        self.theta
    }

    pub fn leg(&self) -> Leg {
        self.leg
    }

    pub fn hash_tag(&self) -> u32 {
        self.hash_tag
    }

    pub fn id(&self) -> Option<usize> {
        self.id
    }

    /// Assigned once, when the environment registers the state
    pub(crate) fn set_id(&mut self, id: usize) {
        debug_assert!(self.id.is_none(), "planning state id assigned twice");
        self.id = Some(id);
    }

    /// Same cell and orientation, ignoring the leg
    pub fn same_pose(&self, other: &PlanningState) -> bool {
        self.x == other.x && self.y == other.y && self.theta == other.theta
    }
}

impl PartialEq for PlanningState {
    fn eq(&self, other: &Self) -> bool {
        if self.hash_tag != other.hash_tag {
            return false;
        }
        self.x == other.x && self.y == other.y && self.theta == other.theta && self.leg == other.leg
    }
}

impl Eq for PlanningState {}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::PI;

    fn disc() -> Discretization {
        Discretization::new(0.02, 64, 65536)
    }

    #[test]
    fn test_discretization_is_idempotent() {
        let d = disc();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let s = State::new(
                rng.gen_range(-5.0..5.0),
                rng.gen_range(-5.0..5.0),
                rng.gen_range(-4.0 * PI..4.0 * PI),
                if rng.gen_bool(0.5) { Leg::Left } else { Leg::Right },
            );
            let first = PlanningState::from_state(&s, &d);
            let second = PlanningState::from_state(&first.to_state(&d), &d);
            assert_eq!(first, second);
            assert_eq!(first.x(), second.x());
            assert_eq!(first.theta(), second.theta());
            assert!(first.theta() >= 0 && first.theta() < 64);
        }
    }

    #[test]
    fn test_equality_requires_all_fields() {
        let d = disc();
        let a = PlanningState::new(3, 4, 5, Leg::Left, &d);
        let b = PlanningState::new(3, 4, 5, Leg::Left, &d);
        let c = PlanningState::new(3, 4, 5, Leg::Right, &d);
        assert_eq!(a, b);
        assert_eq!(a.hash_tag(), b.hash_tag());
        assert_ne!(a, c);
    }

    #[test]
    fn test_hash_collisions_do_not_imply_equality() {
        // a single bucket forces every tag to collide
        let d = Discretization::new(0.02, 64, 1);
        let a = PlanningState::new(1, 2, 3, Leg::Left, &d);
        let b = PlanningState::new(2, 1, 3, Leg::Left, &d);
        assert_eq!(a.hash_tag(), b.hash_tag());
        assert_ne!(a, b);
    }

    #[test]
    fn test_tag_mismatch_implies_inequality() {
        let d = disc();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..500 {
            let a = PlanningState::new(rng.gen_range(-20..20), rng.gen_range(-20..20), rng.gen_range(0..64), Leg::Left, &d);
            let b = PlanningState::new(rng.gen_range(-20..20), rng.gen_range(-20..20), rng.gen_range(0..64), Leg::Left, &d);
            if a.hash_tag() != b.hash_tag() {
                assert_ne!(a, b);
            }
            if a.x() == b.x() && a.y() == b.y() && a.theta() == b.theta() {
                assert_eq!(a.hash_tag(), b.hash_tag());
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn test_theta_wraps_on_construction() {
        let d = disc();
        let s = PlanningState::new(0, 0, -1, Leg::Right, &d);
        assert_eq!(s.theta(), 63);
        assert_eq!(s, PlanningState::new(0, 0, 63, Leg::Right, &d));
        assert_eq!(s.id(), None);
    }
}
