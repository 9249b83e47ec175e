//! Cost-to-go estimates for the footstep search
//!
//! All heuristics are admissible and consistent with respect to the
//! environment's transition cost `dist + step_cost + diff_angle_cost * |dtheta|`.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::f64::consts::SQRT_2;
use std::fmt;
use std::str::FromStr;

use log::{debug, info};
use nalgebra::DMatrix;
use ordered_float::OrderedFloat;

use crate::common::{PlannerError, PlannerResult};
use crate::mapping::GridMap2D;

use super::discretization::Discretization;
use super::planning_state::PlanningState;

/// Available heuristic variants, named as in the configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeuristicType {
    Euclidean,
    EuclStepCost,
    PathCost,
}

impl FromStr for HeuristicType {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EuclideanHeuristic" => Ok(HeuristicType::Euclidean),
            "EuclStepCostHeuristic" => Ok(HeuristicType::EuclStepCost),
            "PathCostHeuristic" => Ok(HeuristicType::PathCost),
            other => Err(PlannerError::Configuration(format!(
                "Heuristic {} not available",
                other
            ))),
        }
    }
}

impl fmt::Display for HeuristicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeuristicType::Euclidean => write!(f, "EuclideanHeuristic"),
            HeuristicType::EuclStepCost => write!(f, "EuclStepCostHeuristic"),
            HeuristicType::PathCost => write!(f, "PathCostHeuristic"),
        }
    }
}

/// Cost terms a heuristic may use
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicParams {
    pub disc: Discretization,
    pub step_cost: f64,
    pub diff_angle_cost: f64,
    /// Upper bound on the planar distance covered by one transition [m]
    pub max_step_width: f64,
}

/// Precomputed cost-to-go over the map cells, seeded at one target cell
#[derive(Debug, Clone)]
pub struct CostField {
    costs: DMatrix<f64>,
    resolution: f64,
    origin: (f64, f64),
}

impl CostField {
    /// Cost-to-go from the map cell containing a world position
    pub fn cost_at(&self, wx: f64, wy: f64) -> Option<f64> {
        let mx = ((wx - self.origin.0) / self.resolution).floor();
        let my = ((wy - self.origin.1) / self.resolution).floor();
        if mx < 0.0 || my < 0.0 || mx >= self.costs.nrows() as f64 || my >= self.costs.ncols() as f64 {
            return None;
        }
        Some(self.costs[(mx as usize, my as usize)])
    }

    pub fn costs(&self) -> &DMatrix<f64> {
        &self.costs
    }
}

/// Cost-to-go estimator.
///
/// `prepare` is called by the environment whenever the search target or the
/// map changes; variants that do not precompute anything ignore it.
pub trait Heuristic {
    fn heuristic_type(&self) -> HeuristicType;

    /// Non-negative estimate of the cost from `from` to `to`
    fn estimate(&self, from: &PlanningState, to: &PlanningState) -> f64;

    fn prepare(&mut self, _map: &GridMap2D, _target: &PlanningState) -> PlannerResult<()> {
        Ok(())
    }

    /// Precomputed cost field, for variants that have one
    fn cost_field(&self) -> Option<&CostField> {
        None
    }
}

fn planar_distance(from: &PlanningState, to: &PlanningState, disc: &Discretization) -> f64 {
    let dx = disc.disc_to_cont(from.x() - to.x());
    let dy = disc.disc_to_cont(from.y() - to.y());
    dx.hypot(dy)
}

/// Straight-line distance between the two foot positions
pub struct EuclideanHeuristic {
    disc: Discretization,
}

impl EuclideanHeuristic {
    pub fn new(disc: Discretization) -> Self {
        Self { disc }
    }
}

impl Heuristic for EuclideanHeuristic {
    fn heuristic_type(&self) -> HeuristicType {
        HeuristicType::Euclidean
    }

    fn estimate(&self, from: &PlanningState, to: &PlanningState) -> f64 {
        if from == to {
            return 0.0;
        }
        planar_distance(from, to, &self.disc)
    }
}

/// Distance plus the step cost of the fewest maximal steps plus the
/// unavoidable turning cost
pub struct EuclStepCostHeuristic {
    params: HeuristicParams,
}

impl EuclStepCostHeuristic {
    pub fn new(params: HeuristicParams) -> Self {
        Self { params }
    }

    fn turning_cost(&self, from: &PlanningState, to: &PlanningState) -> f64 {
        self.params.diff_angle_cost * self.params.disc.angle_bin_distance(from.theta(), to.theta())
    }
}

impl Heuristic for EuclStepCostHeuristic {
    fn heuristic_type(&self) -> HeuristicType {
        HeuristicType::EuclStepCost
    }

    fn estimate(&self, from: &PlanningState, to: &PlanningState) -> f64 {
        if from == to {
            return 0.0;
        }
        let dist = planar_distance(from, to, &self.params.disc);
        let steps = dist / self.params.max_step_width;
        dist + steps * self.params.step_cost + self.turning_cost(from, to)
    }
}

/// Map-aware estimate from a Dijkstra wavefront over free map cells.
///
/// The wavefront runs on a relaxed graph: any free cell may hop to any free
/// cell within one step reach (widened by a cell diagonal), paying the hop
/// distance shortened by a cell diagonal plus the step cost. Every real
/// transition between collision-free states is such a hop at no higher
/// cost, so the field is admissible and consistent.
pub struct PathCostHeuristic {
    fallback: EuclStepCostHeuristic,
    field: Option<CostField>,
    target: Option<PlanningState>,
}

impl PathCostHeuristic {
    pub fn new(params: HeuristicParams) -> Self {
        Self {
            fallback: EuclStepCostHeuristic::new(params),
            field: None,
            target: None,
        }
    }

    fn params(&self) -> &HeuristicParams {
        &self.fallback.params
    }

    fn hop_offsets(&self, resolution: f64) -> Vec<(i64, i64, f64)> {
        let slack = resolution * SQRT_2;
        let radius = self.params().max_step_width + slack;
        let r = (radius / resolution).ceil() as i64;
        let mut offsets = Vec::new();
        for dx in -r..=r {
            for dy in -r..=r {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let dist = (dx as f64).hypot(dy as f64) * resolution;
                if dist <= radius {
                    let cost = (dist - slack).max(0.0) + self.params().step_cost;
                    offsets.push((dx, dy, cost));
                }
            }
        }
        offsets
    }

    fn compute_field(&self, map: &GridMap2D, target: &PlanningState) -> CostField {
        let (width, height) = map.size();
        let mut costs = DMatrix::from_element(width, height, f64::INFINITY);
        let disc = &self.params().disc;
        let field = |costs| CostField {
            costs,
            resolution: map.resolution(),
            origin: map.origin(),
        };

        let (tx, ty) = (disc.disc_to_cont(target.x()), disc.disc_to_cont(target.y()));
        let seed = match map.world_to_map(tx, ty) {
            Some(cell) => cell,
            None => return field(costs),
        };

        let offsets = self.hop_offsets(map.resolution());
        let mut open = BinaryHeap::new();
        costs[seed] = 0.0;
        open.push(Reverse((OrderedFloat(0.0), seed.0, seed.1)));

        while let Some(Reverse((OrderedFloat(cost), x, y))) = open.pop() {
            if cost > costs[(x, y)] {
                continue;
            }
            for &(dx, dy, hop) in &offsets {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                    continue;
                }
                let (nx, ny) = (nx as usize, ny as usize);
                if map.is_occupied(nx, ny) {
                    continue;
                }
                let new_cost = cost + hop;
                if new_cost < costs[(nx, ny)] {
                    costs[(nx, ny)] = new_cost;
                    open.push(Reverse((OrderedFloat(new_cost), nx, ny)));
                }
            }
        }

        field(costs)
    }
}

impl Heuristic for PathCostHeuristic {
    fn heuristic_type(&self) -> HeuristicType {
        HeuristicType::PathCost
    }

    fn estimate(&self, from: &PlanningState, to: &PlanningState) -> f64 {
        if from == to {
            return 0.0;
        }
        let field = match (&self.field, &self.target) {
            (Some(field), Some(target)) if target.same_pose(to) => field,
            _ => return self.fallback.estimate(from, to),
        };
        let disc = &self.params().disc;
        match field.cost_at(disc.disc_to_cont(from.x()), disc.disc_to_cont(from.y())) {
            Some(cost) => cost + self.fallback.turning_cost(from, to),
            None => self.fallback.estimate(from, to),
        }
    }

    fn prepare(&mut self, map: &GridMap2D, target: &PlanningState) -> PlannerResult<()> {
        info!("Computing path cost heuristic field ({} x {} cells)", map.width(), map.height());
        let field = self.compute_field(map, target);
        debug!(
            "Path cost field: {} reachable cells",
            field.costs.iter().filter(|c| c.is_finite()).count()
        );
        self.field = Some(field);
        self.target = Some(target.clone());
        Ok(())
    }

    fn cost_field(&self) -> Option<&CostField> {
        self.field.as_ref()
    }
}

/// Build the configured heuristic
pub fn create_heuristic(kind: HeuristicType, params: HeuristicParams) -> Box<dyn Heuristic> {
    match kind {
        HeuristicType::Euclidean => {
            info!("FootstepPlanner heuristic: euclidean distance");
            Box::new(EuclideanHeuristic::new(params.disc))
        }
        HeuristicType::EuclStepCost => {
            info!("FootstepPlanner heuristic: euclidean distance with step costs");
            Box::new(EuclStepCostHeuristic::new(params))
        }
        HeuristicType::PathCost => {
            info!("FootstepPlanner heuristic: 2D path euclidean distance with step costs");
            Box::new(PathCostHeuristic::new(params))
        }
    }
}
