//! Footstep search domain
//!
//! Owns the table of discovered planning states, expands them through the
//! configured footstep set, checks foot placements against the map and
//! prices every transition.

use std::collections::HashSet;
use std::f64::consts::SQRT_2;
use std::sync::Arc;

use itertools::Itertools;
use log::{debug, info};
use nalgebra::{Rotation2, Vector2};

use crate::common::{
    edge_to_search_cost, heuristic_to_search_cost, Leg, PlannerError, PlannerResult, PlanningEdges,
    SearchEnvironment, State,
};
use crate::mapping::GridMap2D;

use super::discretization::Discretization;
use super::footstep::{Footstep, StepBounds};
use super::heuristic::Heuristic;
use super::planning_state::PlanningState;

const MAX_SUBDIVISION_DEPTH: u32 = 16;

/// Foot rectangle and its placement relative to the foot pose
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FootGeometry {
    /// Length along the foot's heading [m]
    pub size_x: f64,
    /// Width across the foot's heading [m]
    pub size_y: f64,
    /// Lateral distance between the feet in the neutral stance [m]
    pub separation: f64,
    /// Offset of the rectangle centre from the foot pose, +y pointing away
    /// from the body for the left foot
    pub origin_shift_x: f64,
    pub origin_shift_y: f64,
}

impl FootGeometry {
    /// Radius of the circle around a foot pose that contains the foot
    /// rectangle, in map cells
    pub fn max_foot_radius(&self, resolution: f64) -> f64 {
        let x = self.origin_shift_x.abs() + self.size_x / 2.0;
        let y = self.origin_shift_y.abs() + self.size_y / 2.0;
        x.hypot(y) / resolution
    }

    /// Radius in map cells around a foot pose beyond which flipping a single
    /// cell cannot change the outcome of [`FootstepEnvironment::occupied`].
    ///
    /// The subdivided rectangles are tested with their circumcircles, which
    /// reach past the foot outline; on top of that come two cell diagonals
    /// for the clearance margin and for poses sitting anywhere inside their
    /// cells.
    pub fn influence_radius(&self, resolution: f64) -> f64 {
        let long = self.size_x.max(self.size_y);
        let short = self.size_x.min(self.size_y);
        // pieces after the first split are never longer than this
        let piece_long = (long / 2.0).max(short);
        let overshoot = ((long.hypot(short) - short) / 2.0).max(piece_long / 2.0);
        self.max_foot_radius(resolution) + overshoot / resolution + 2.0 * SQRT_2
    }

    /// World position of the foot rectangle centre for a foot pose
    pub fn footprint_center(&self, state: &State) -> Vector2<f64> {
        let shift = Vector2::new(self.origin_shift_x, state.leg.lateral_sign() * self.origin_shift_y);
        state.local_to_world(shift)
    }
}

/// Static configuration of a [`FootstepEnvironment`]
#[derive(Debug, Clone)]
pub struct EnvironmentParams {
    pub disc: Discretization,
    pub footsteps: Vec<Footstep>,
    pub bounds: StepBounds,
    pub foot: FootGeometry,
    /// 0: centre cell and outer circle, 1: inner circle, 2: exact subdivision.
    /// Below 2, undecided footprints count as free.
    pub collision_check_accuracy: u8,
    pub step_cost: f64,
    pub diff_angle_cost: f64,
    pub forward_search: bool,
}

/// Registered search start and goal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartGoalIds {
    pub start: usize,
    pub goal: usize,
}

/// Occupancy of the state hash table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashStatistics {
    pub num_states: usize,
    pub used_buckets: usize,
    pub longest_chain: usize,
}

pub struct FootstepEnvironment {
    params: EnvironmentParams,
    heuristic: Box<dyn Heuristic>,
    map: Option<Arc<GridMap2D>>,
    buckets: Vec<Vec<usize>>,
    states: Vec<PlanningState>,
    expanded: HashSet<usize>,
    expanded_ids: Vec<usize>,
    num_expanded: usize,
    ids: Option<StartGoalIds>,
    /// Target and map the heuristic was last prepared for
    heuristic_prepared: Option<(PlanningState, Arc<GridMap2D>)>,
}

impl FootstepEnvironment {
    pub fn new(params: EnvironmentParams, heuristic: Box<dyn Heuristic>) -> Self {
        let num_buckets = params.disc.max_hash_size.max(1) as usize;
        Self {
            params,
            heuristic,
            map: None,
            buckets: vec![Vec::new(); num_buckets],
            states: Vec::new(),
            expanded: HashSet::new(),
            expanded_ids: Vec::new(),
            num_expanded: 0,
            ids: None,
            heuristic_prepared: None,
        }
    }

    pub fn params(&self) -> &EnvironmentParams {
        &self.params
    }

    pub fn heuristic(&self) -> &dyn Heuristic {
        self.heuristic.as_ref()
    }

    pub fn map(&self) -> Option<&Arc<GridMap2D>> {
        self.map.as_ref()
    }

    pub fn set_map(&mut self, map: Arc<GridMap2D>) {
        self.map = Some(map);
    }

    /// Forget every registered state and all counters. Configuration and
    /// map are kept.
    pub fn reset(&mut self) {
        for bucket in self.buckets.iter_mut() {
            bucket.clear();
        }
        self.states.clear();
        self.expanded.clear();
        self.expanded_ids.clear();
        self.num_expanded = 0;
        self.ids = None;
    }

    /// Register the four start and goal feet.
    ///
    /// The search starts from the left start foot and ends at the right goal
    /// foot. The heuristic is (re)prepared toward the search target.
    pub fn set_up(
        &mut self,
        start_left: &State,
        start_right: &State,
        goal_left: &State,
        goal_right: &State,
    ) -> PlannerResult<StartGoalIds> {
        let map = self.require_map()?;
        let disc = self.params.disc;

        let start = self.register(PlanningState::from_state(start_left, &disc));
        self.register(PlanningState::from_state(start_right, &disc));
        self.register(PlanningState::from_state(goal_left, &disc));
        let goal = self.register(PlanningState::from_state(goal_right, &disc));

        let target_id = if self.params.forward_search { goal } else { start };
        let target = self.states[target_id].clone();
        let up_to_date = match &self.heuristic_prepared {
            Some((prepared, prepared_map)) => *prepared == target && Arc::ptr_eq(prepared_map, &map),
            None => false,
        };
        if !up_to_date {
            self.heuristic.prepare(&map, &target)?;
            self.heuristic_prepared = Some((target, map));
        }

        let ids = StartGoalIds { start, goal };
        self.ids = Some(ids);
        debug!("Environment set up: start id {}, goal id {}", start, goal);
        Ok(ids)
    }

    pub fn start_goal_ids(&self) -> Option<StartGoalIds> {
        self.ids
    }

    /// Continuous pose of a registered state
    pub fn state(&self, id: usize) -> PlannerResult<State> {
        self.states
            .get(id)
            .map(|s| s.to_state(&self.params.disc))
            .ok_or_else(|| PlannerError::InvalidState(format!("state id {} was never registered", id)))
    }

    pub fn planning_state(&self, id: usize) -> Option<&PlanningState> {
        self.states.get(id)
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// Number of distinct states whose neighbors were generated
    pub fn num_expanded_states(&self) -> usize {
        self.num_expanded
    }

    /// Ids of expanded states in expansion order
    pub fn expanded_states(&self) -> &[usize] {
        &self.expanded_ids
    }

    pub fn hash_statistics(&self) -> HashStatistics {
        let used = self.buckets.iter().filter(|b| !b.is_empty());
        HashStatistics {
            num_states: self.states.len(),
            used_buckets: used.clone().count(),
            longest_chain: used.map(Vec::len).max().unwrap_or(0),
        }
    }

    pub fn print_hash_statistics(&self) {
        let stats = self.hash_statistics();
        info!(
            "Hash table: {} states in {} of {} buckets, longest chain {}",
            stats.num_states,
            stats.used_buckets,
            self.buckets.len(),
            stats.longest_chain
        );
    }

    /// Registered ids at the cells and orientations of the given world poses.
    /// Used to mark the sources of changed transitions in a forward search.
    pub fn succs_of_grid_cells(&self, states: &[State]) -> Vec<usize> {
        self.registered_ids_at(states)
    }

    /// Counterpart of [`succs_of_grid_cells`](Self::succs_of_grid_cells) for
    /// a backward search
    pub fn preds_of_grid_cells(&self, states: &[State]) -> Vec<usize> {
        self.registered_ids_at(states)
    }

    fn registered_ids_at(&self, states: &[State]) -> Vec<usize> {
        let disc = &self.params.disc;
        states
            .iter()
            .flat_map(|s| {
                let (x, y, theta) = (disc.cont_to_disc(s.x), disc.cont_to_disc(s.y), disc.angle_to_bin(s.theta));
                [Leg::Left, Leg::Right]
                    .into_iter()
                    .filter_map(move |leg| self.find(&PlanningState::new(x, y, theta, leg, disc)))
            })
            .unique()
            .collect()
    }

    /// True if the foot placed at `state` overlaps an occupied map cell or
    /// leaves the map. Without a map every placement counts as occupied.
    ///
    /// Only accuracy 2 reports every overlap. Accuracies 0 and 1 treat a
    /// footprint as free when the clearance circles cannot decide.
    pub fn occupied(&self, state: &State) -> bool {
        let map = match &self.map {
            Some(map) => map,
            None => return true,
        };
        if map.is_occupied_at(state.x, state.y) {
            return true;
        }
        let center = self.params.foot.footprint_center(state);
        let rotation = Rotation2::new(state.theta);
        collision_check(
            map,
            center,
            &rotation,
            (self.params.foot.size_x, self.params.foot.size_y),
            self.params.collision_check_accuracy,
            0,
        )
    }

    fn occupied_planning_state(&self, state: &PlanningState) -> bool {
        self.occupied(&state.to_state(&self.params.disc))
    }

    fn find(&self, state: &PlanningState) -> Option<usize> {
        self.buckets[state.hash_tag() as usize]
            .iter()
            .copied()
            .find(|&id| self.states[id] == *state)
    }

    /// Id of `state`, registering it on first sight
    fn register(&mut self, mut state: PlanningState) -> usize {
        if let Some(id) = self.find(&state) {
            return id;
        }
        let id = self.states.len();
        state.set_id(id);
        self.buckets[state.hash_tag() as usize].push(id);
        self.states.push(state);
        id
    }

    fn require_map(&self) -> PlannerResult<Arc<GridMap2D>> {
        self.map
            .clone()
            .ok_or_else(|| PlannerError::Precondition("environment has no map".to_string()))
    }

    fn require_ids(&self) -> PlannerResult<StartGoalIds> {
        self.ids
            .ok_or_else(|| PlannerError::Precondition("environment start and goal are not set up".to_string()))
    }

    fn lookup(&self, id: usize) -> PlannerResult<PlanningState> {
        self.states
            .get(id)
            .cloned()
            .ok_or_else(|| PlannerError::InvalidState(format!("state id {} was never registered", id)))
    }

    fn mark_expanded(&mut self, id: usize) {
        if self.expanded.insert(id) {
            self.num_expanded += 1;
            self.expanded_ids.push(id);
        }
    }

    /// Real-valued cost of a transition between two lattice states
    pub fn transition_cost(&self, from: &PlanningState, to: &PlanningState) -> f64 {
        let disc = &self.params.disc;
        let dx = disc.disc_to_cont(to.x() - from.x());
        let dy = disc.disc_to_cont(to.y() - from.y());
        dx.hypot(dy)
            + self.params.step_cost
            + self.params.diff_angle_cost * disc.angle_bin_distance(from.theta(), to.theta())
    }

    fn edge(&self, from: &PlanningState, to: &PlanningState, id: usize) -> (usize, i32) {
        (id, edge_to_search_cost(self.transition_cost(from, to)))
    }

    fn push_unique(edges: &mut Vec<(usize, i32)>, edge: (usize, i32)) {
        if !edges.iter().any(|(id, _)| *id == edge.0) {
            edges.push(edge);
        }
    }
}

impl SearchEnvironment for FootstepEnvironment {
    fn successors(&mut self, state_id: usize) -> PlanningEdges {
        self.require_map()?;
        let ids = self.require_ids()?;
        let current = self.lookup(state_id)?;
        self.mark_expanded(state_id);

        let mut edges = Vec::new();
        if state_id == ids.goal {
            return Ok(edges);
        }
        let disc = self.params.disc;

        let goal = self.states[ids.goal].clone();
        if self.params.bounds.performable(&current, &goal, &disc) && !self.occupied_planning_state(&goal) {
            edges.push(self.edge(&current, &goal, ids.goal));
        }

        for i in 0..self.params.footsteps.len() {
            let next = self.params.footsteps[i].apply(&current, &disc);
            if !self.params.bounds.performable(&current, &next, &disc) || self.occupied_planning_state(&next) {
                continue;
            }
            let id = self.register(next.clone());
            let edge = self.edge(&current, &next, id);
            Self::push_unique(&mut edges, edge);
        }
        Ok(edges)
    }

    fn predecessors(&mut self, state_id: usize) -> PlanningEdges {
        self.require_map()?;
        let ids = self.require_ids()?;
        let current = self.lookup(state_id)?;
        self.mark_expanded(state_id);

        let mut edges = Vec::new();
        if state_id == ids.start {
            return Ok(edges);
        }
        let disc = self.params.disc;

        let start = self.states[ids.start].clone();
        if self.params.bounds.performable(&start, &current, &disc) && !self.occupied_planning_state(&start) {
            edges.push(self.edge(&start, &current, ids.start));
        }

        for i in 0..self.params.footsteps.len() {
            let prev = self.params.footsteps[i].invert(&current, &disc);
            if !self.params.bounds.performable(&prev, &current, &disc) || self.occupied_planning_state(&prev) {
                continue;
            }
            let id = self.register(prev.clone());
            let edge = self.edge(&prev, &current, id);
            Self::push_unique(&mut edges, edge);
        }
        Ok(edges)
    }

    fn heuristic(&self, from_id: usize, to_id: usize) -> i32 {
        match (self.states.get(from_id), self.states.get(to_id)) {
            (Some(from), Some(to)) => heuristic_to_search_cost(self.heuristic.estimate(from, to)),
            _ => 0,
        }
    }
}

/// Footprint test against the clearance field.
///
/// `center` and `rotation` place a `size` rectangle in the world. The
/// clearance of the centre cell, reduced by one cell diagonal, bounds the
/// distance from `center` to every occupied cell.
fn collision_check(
    map: &GridMap2D,
    center: Vector2<f64>,
    rotation: &Rotation2<f64>,
    size: (f64, f64),
    accuracy: u8,
    depth: u32,
) -> bool {
    let clearance = match map.clearance_at(center.x, center.y) {
        Some(c) => c - map.resolution() * SQRT_2,
        None => return true,
    };

    let r_o = size.0.hypot(size.1) / 2.0;
    if clearance >= r_o {
        return false;
    }
    if accuracy == 0 {
        return false;
    }
    let r_i = size.0.min(size.1) / 2.0;
    if clearance <= r_i {
        return true;
    }
    if accuracy == 1 {
        return false;
    }
    if depth >= MAX_SUBDIVISION_DEPTH {
        return true;
    }

    // split along the long side
    let (half_size, offset) = if size.0 >= size.1 {
        ((size.0 / 2.0, size.1), Vector2::new(size.0 / 4.0, 0.0))
    } else {
        ((size.0, size.1 / 2.0), Vector2::new(0.0, size.1 / 4.0))
    };
    let offset = rotation * offset;
    collision_check(map, center + offset, rotation, half_size, accuracy, depth + 1)
        || collision_check(map, center - offset, rotation, half_size, accuracy, depth + 1)
}
