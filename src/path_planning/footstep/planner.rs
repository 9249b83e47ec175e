//! Footstep planning session
//!
//! Owns the configuration, the environment, the search and the current
//! map, and keeps the last successful plan. Map updates go through the
//! change detector, which decides between keeping, repairing and
//! discarding the search effort spent so far.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info, warn};
use nalgebra::Vector2;

use crate::common::{
    FootstepPath, Leg, PlannerError, PlannerResult, Pose2D, SearchAlgorithm, State, COST_SCALE,
};
use crate::mapping::GridMap2D;
use crate::path_planning::ara_star::AnytimeAStar;

use super::change_detection::{ChangeDetector, MapUpdateState, UpdateDecision};
use super::config::{PlannerConfig, PlannerType};
use super::environment::FootstepEnvironment;
use super::heuristic::create_heuristic;

/// What [`FootstepPlanner::set_map`] did with a new map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapUpdate {
    /// First map of the session
    Initial,
    /// No plan to repair, the map was only stored
    Stored,
    /// Occupancy did not change
    Unchanged,
    /// The existing search was informed about the changed states
    Incremental {
        changed_cells: usize,
        affected_states: usize,
    },
    /// The search was discarded and the plan recomputed from scratch
    Reset,
}

/// Build the search algorithm for a planner type
pub fn create_search(planner_type: PlannerType, forward_search: bool) -> Box<dyn SearchAlgorithm> {
    let name = planner_type.to_string();
    if planner_type == PlannerType::RStar {
        warn!("{} runs as a non-incremental anytime search", name);
    }
    Box::new(AnytimeAStar::new(&name, forward_search, planner_type.is_incremental()))
}

pub struct FootstepPlanner {
    config: PlannerConfig,
    planner_type: PlannerType,
    env: FootstepEnvironment,
    search: Box<dyn SearchAlgorithm>,
    detector: ChangeDetector,
    map: Option<Arc<GridMap2D>>,
    /// (left, right)
    start_feet: Option<(State, State)>,
    goal_feet: Option<(State, State)>,
    path: FootstepPath,
    plan_exists: bool,
}

impl FootstepPlanner {
    pub fn new(config: PlannerConfig) -> PlannerResult<Self> {
        let params = config.environment_params()?;
        let heuristic = create_heuristic(config.heuristic_type()?, config.heuristic_params(&params));
        let planner_type = config.planner_type()?;
        let search = create_search(planner_type, config.forward_search);
        let detector = ChangeDetector::new(params.foot, params.disc, config.changed_cells_limit);
        info!(
            "FootstepPlanner: {} with {} footsteps, {} search",
            planner_type,
            params.footsteps.len(),
            if config.forward_search { "forward" } else { "backward" }
        );

        Ok(Self {
            env: FootstepEnvironment::new(params, heuristic),
            config,
            planner_type,
            search,
            detector,
            map: None,
            start_feet: None,
            goal_feet: None,
            path: FootstepPath::default(),
            plan_exists: false,
        })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn environment(&self) -> &FootstepEnvironment {
        &self.env
    }

    pub fn map_update_state(&self) -> MapUpdateState {
        self.detector.state()
    }

    /// Last successful plan
    pub fn path(&self) -> Option<&FootstepPath> {
        if self.plan_exists {
            Some(&self.path)
        } else {
            None
        }
    }

    pub fn path_cost(&self) -> f64 {
        self.path.cost
    }

    pub fn plan_exists(&self) -> bool {
        self.plan_exists
    }

    /// Foot pose of `leg` when the robot centre stands at `robot`
    pub fn foot_position(&self, robot: &Pose2D, leg: Leg) -> State {
        let centre = State::new(robot.x, robot.y, robot.theta, leg);
        let lateral = Vector2::new(0.0, leg.lateral_sign() * self.config.foot.separation / 2.0);
        let foot = centre.local_to_world(lateral);
        State::new(foot.x, foot.y, robot.theta, leg)
    }

    /// Replace the map. With a plan in place the change detector decides
    /// how the search reacts, and the plan is updated accordingly.
    pub fn set_map(&mut self, map: Arc<GridMap2D>) -> PlannerResult<MapUpdate> {
        let old = self.map.replace(map.clone());
        self.env.set_map(map.clone());

        let old = match old {
            Some(old) => old,
            None => {
                self.detector.map_received();
                return Ok(MapUpdate::Initial);
            }
        };
        if !self.plan_exists {
            self.detector.settle();
            return Ok(MapUpdate::Stored);
        }

        let decision = self.detector.detect(&old, &map, self.search.supports_incremental());
        let update = self.apply_update(decision);
        self.detector.settle();
        update
    }

    fn apply_update(&mut self, decision: UpdateDecision) -> PlannerResult<MapUpdate> {
        match decision {
            UpdateDecision::NoChange => Ok(MapUpdate::Unchanged),
            UpdateDecision::Incremental {
                changed_cells,
                changed_states,
            } => {
                let ids = if self.config.forward_search {
                    self.env.succs_of_grid_cells(&changed_states)
                } else {
                    self.env.preds_of_grid_cells(&changed_states)
                };
                if ids.is_empty() {
                    info!("no registered states affected; no replanning necessary");
                } else {
                    self.search.costs_changed(&ids);
                    self.run()?;
                }
                Ok(MapUpdate::Incremental {
                    changed_cells,
                    affected_states: ids.len(),
                })
            }
            UpdateDecision::Reset { .. } => {
                self.reset_search();
                self.run()?;
                Ok(MapUpdate::Reset)
            }
        }
    }

    fn require_map(&self) -> PlannerResult<()> {
        match self.map {
            Some(_) => Ok(()),
            None => Err(PlannerError::Precondition(
                "Distance map hasn't been initialized yet.".to_string(),
            )),
        }
    }

    /// Set the start from the robot centre pose
    pub fn set_start(&mut self, x: f64, y: f64, theta: f64) -> PlannerResult<()> {
        self.require_map()?;
        let pose = Pose2D::new(x, y, theta);
        let left = self.foot_position(&pose, Leg::Left);
        let right = self.foot_position(&pose, Leg::Right);
        match self.set_start_feet(left, right) {
            Ok(()) => {
                info!("Start pose set to ({} {} {})", x, y, theta);
                Ok(())
            }
            Err(e) => {
                error!("Start pose ({} {} {}) not accessible.", x, y, theta);
                Err(e)
            }
        }
    }

    /// Set the start from explicit foot poses
    pub fn set_start_feet(&mut self, left: State, right: State) -> PlannerResult<()> {
        self.require_map()?;
        if self.env.occupied(&left) || self.env.occupied(&right) {
            return Err(PlannerError::Precondition(format!(
                "start feet {} / {} are in collision",
                left, right
            )));
        }
        self.start_feet = Some((left, right));
        Ok(())
    }

    /// Set the goal from the robot centre pose
    pub fn set_goal(&mut self, x: f64, y: f64, theta: f64) -> PlannerResult<()> {
        self.require_map()?;
        let pose = Pose2D::new(x, y, theta);
        let left = self.foot_position(&pose, Leg::Left);
        let right = self.foot_position(&pose, Leg::Right);
        if self.env.occupied(&left) || self.env.occupied(&right) {
            error!("Goal pose at ({} {} {}) not accessible.", x, y, theta);
            return Err(PlannerError::Precondition(format!(
                "goal pose ({} {} {}) is in collision",
                x, y, theta
            )));
        }
        self.goal_feet = Some((left, right));
        info!("Goal pose set to ({} {} {})", x, y, theta);
        Ok(())
    }

    /// Plan from scratch between two robot poses
    pub fn plan(&mut self, start: &Pose2D, goal: &Pose2D) -> PlannerResult<()> {
        self.set_start(start.x, start.y, start.theta)?;
        self.set_goal(goal.x, goal.y, goal.theta)?;
        self.plan_current()
    }

    /// Plan from scratch between the current start and goal
    pub fn plan_current(&mut self) -> PlannerResult<()> {
        self.check_preconditions()?;
        self.reset_search();
        self.run()
    }

    /// Replan reusing the current search if a plan exists
    pub fn replan(&mut self) -> PlannerResult<()> {
        if self.plan_exists {
            self.run()
        } else {
            self.plan_current()
        }
    }

    fn check_preconditions(&self) -> PlannerResult<()> {
        if self.map.is_none() {
            return Err(PlannerError::Precondition(
                "FootstepPlanner has no map yet for planning".to_string(),
            ));
        }
        if self.start_feet.is_none() || self.goal_feet.is_none() {
            return Err(PlannerError::Precondition(
                "FootstepPlanner has no start or goal pose set".to_string(),
            ));
        }
        Ok(())
    }

    fn reset_search(&mut self) {
        self.env.reset();
        self.search = create_search(self.planner_type, self.config.forward_search);
    }

    /// Run the search on the current environment. On failure the previous
    /// plan stays untouched.
    pub fn run(&mut self) -> PlannerResult<()> {
        self.check_preconditions()?;
        let ((start_left, start_right), (goal_left, goal_right)) = match (self.start_feet, self.goal_feet) {
            (Some(start), Some(goal)) => (start, goal),
            _ => return Err(PlannerError::Precondition("start or goal missing".to_string())),
        };
        let ids = self.env.set_up(&start_left, &start_right, &goal_left, &goal_right)?;

        if !self.search.set_start(ids.start) {
            return Err(PlannerError::SearchFailure("Failed to set start state.".to_string()));
        }
        if !self.search.set_goal(ids.goal) {
            return Err(PlannerError::SearchFailure("Failed to set goal state".to_string()));
        }
        self.search.set_initial_epsilon(self.config.initial_epsilon);
        self.search.set_search_mode(self.config.search_until_first_solution);

        info!(
            "Start planning (max time: {}, initial eps: {} ({}))",
            self.config.allocated_time,
            self.config.initial_epsilon,
            self.search.initial_epsilon()
        );
        let started = Instant::now();
        let budget = Duration::from_secs_f64(self.config.allocated_time);
        let result = self.search.replan(&mut self.env, budget)?;
        self.env.print_hash_statistics();

        let solution = match result {
            Some(solution) if !solution.state_ids.is_empty() => solution,
            _ => {
                error!("No solution found");
                return Err(PlannerError::SearchFailure("No solution found".to_string()));
            }
        };
        info!(
            "Solution of size {} found after {:.3} s",
            solution.state_ids.len(),
            started.elapsed().as_secs_f64()
        );

        let steps = solution
            .state_ids
            .iter()
            .map(|&id| self.env.state(id))
            .collect::<PlannerResult<Vec<State>>>()
            .map_err(|e| {
                error!("extracting path failed");
                PlannerError::SearchFailure(e.to_string())
            })?;

        self.path = FootstepPath::new(steps, solution.cost as f64 / COST_SCALE);
        self.plan_exists = true;

        info!(
            "Expanded states: {} total / {} new",
            self.env.num_expanded_states(),
            self.search.expansion_count()
        );
        info!("Final eps: {}", self.search.final_epsilon());
        info!("Path cost: {} ({})", self.path.cost, solution.cost);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Leg;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    fn scenario_config(planner_type: &str) -> PlannerConfig {
        let mut config = PlannerConfig::default();
        config.planner_type = planner_type.to_string();
        config.accuracy.cell_size = 0.02;
        config.accuracy.num_angle_bins = 64;
        config.foot.max_inverse_step_y = 0.04;
        config.footsteps.x = vec![0.04];
        config.footsteps.y = vec![0.095];
        config.footsteps.theta = vec![0.0];
        config
    }

    /// 1 m walking corridor with room for the feet around start and goal
    fn scenario_map() -> GridMap2D {
        GridMap2D::new(DMatrix::from_element(70, 50, false), 0.02, -0.2, -0.5).unwrap()
    }

    fn planned(config: PlannerConfig) -> FootstepPlanner {
        let mut planner = FootstepPlanner::new(config).unwrap();
        assert_eq!(planner.set_map(Arc::new(scenario_map())).unwrap(), MapUpdate::Initial);
        planner
            .plan(&Pose2D::new(0.0, 0.0, 0.0), &Pose2D::new(1.0, 0.0, 0.0))
            .unwrap();
        planner
    }

    #[test]
    fn test_straight_walk() {
        let planner = planned(scenario_config("ARAPlanner"));
        let path = planner.path().unwrap();

        assert_eq!(path.len(), 26);
        for pair in path.steps.windows(2) {
            assert_eq!(pair[1].leg, pair[0].leg.opposite());
            assert!(pair[1].x > pair[0].x);
        }
        assert_eq!(path.steps[0].leg, Leg::Left);
        assert_eq!(path.steps[25].leg, Leg::Right);

        let step = 0.04f64.hypot(0.10) + 0.05;
        let last = 0.04f64.hypot(0.08) + 0.05;
        assert_relative_eq!(planner.path_cost(), 24.0 * step + last, epsilon = 0.03);
    }

    #[test]
    fn test_straight_walk_forward() {
        let mut config = scenario_config("ARAPlanner");
        config.forward_search = true;
        config.heuristic_type = "EuclStepCostHeuristic".to_string();
        let planner = planned(config);
        let path = planner.path().unwrap();
        assert_eq!(path.len(), 26);
        assert!(path.steps.windows(2).all(|p| p[1].x > p[0].x));
    }

    #[test]
    fn test_path_cost_heuristic_plans_the_same_walk() {
        let mut config = scenario_config("ARAPlanner");
        config.heuristic_type = "PathCostHeuristic".to_string();
        let planner = planned(config);
        assert_eq!(planner.path().unwrap().len(), 26);
        assert!(planner.environment().heuristic().cost_field().is_some());
    }

    #[test]
    fn test_foot_position() {
        let planner = FootstepPlanner::new(PlannerConfig::default()).unwrap();
        let pose = Pose2D::new(1.0, 2.0, std::f64::consts::FRAC_PI_2);
        let left = planner.foot_position(&pose, Leg::Left);
        let right = planner.foot_position(&pose, Leg::Right);
        assert_relative_eq!(left.x, 1.0 - 0.0475, epsilon = 1e-12);
        assert_relative_eq!(right.x, 1.0 + 0.0475, epsilon = 1e-12);
        assert_relative_eq!(left.y, 2.0, epsilon = 1e-12);
        assert_eq!(left.leg, Leg::Left);
    }

    #[test]
    fn test_blocked_goal_is_rejected() {
        let mut planner = FootstepPlanner::new(scenario_config("ARAPlanner")).unwrap();
        let map = GridMap2D::new(
            DMatrix::from_fn(70, 50, |x, y| (58..=63).contains(&x) && (20..=29).contains(&y)),
            0.02,
            -0.2,
            -0.5,
        )
        .unwrap();
        planner.set_map(Arc::new(map)).unwrap();
        planner.set_start(0.0, 0.0, 0.0).unwrap();
        assert!(matches!(
            planner.set_goal(1.0, 0.0, 0.0),
            Err(PlannerError::Precondition(_))
        ));
        assert!(matches!(planner.plan_current(), Err(PlannerError::Precondition(_))));
        assert!(!planner.plan_exists());
        assert!(planner.path().is_none());
    }

    #[test]
    fn test_requests_without_map_are_rejected() {
        let mut planner = FootstepPlanner::new(PlannerConfig::default()).unwrap();
        assert!(matches!(planner.set_start(0.0, 0.0, 0.0), Err(PlannerError::Precondition(_))));
        assert!(matches!(planner.replan(), Err(PlannerError::Precondition(_))));
        assert_eq!(planner.map_update_state(), MapUpdateState::NoMapYet);
    }

    #[test]
    fn test_bad_config_is_rejected() {
        let mut config = PlannerConfig::default();
        config.footsteps.y.push(0.1);
        assert!(matches!(FootstepPlanner::new(config), Err(PlannerError::Configuration(_))));
    }

    #[test]
    fn test_far_map_change_keeps_the_plan() {
        let mut planner = planned(scenario_config("ADPlanner"));
        let before = planner.path().unwrap().clone();

        let updated = scenario_map().with_cells(vec![(69, 49)], true);
        let update = planner.set_map(Arc::new(updated)).unwrap();
        assert_eq!(
            update,
            MapUpdate::Incremental {
                changed_cells: 1,
                affected_states: 0
            }
        );
        assert_eq!(planner.path().unwrap(), &before);
        assert_eq!(planner.map_update_state(), MapUpdateState::Stable);
    }

    #[test]
    fn test_identical_map_is_unchanged() {
        let mut planner = planned(scenario_config("ADPlanner"));
        assert_eq!(planner.set_map(Arc::new(scenario_map())).unwrap(), MapUpdate::Unchanged);
    }

    #[test]
    fn test_blocking_update_keeps_the_last_plan() {
        let mut planner = planned(scenario_config("ADPlanner"));
        let before = planner.path().unwrap().clone();
        // block the right foot's line halfway to the goal; the single
        // footstep type leaves no way around
        let updated = scenario_map().with_cells((30..=32).flat_map(|x| (20..=24).map(move |y| (x, y))), true);
        let result = planner.set_map(Arc::new(updated));
        assert!(matches!(result, Err(PlannerError::SearchFailure(_))));
        assert_eq!(planner.path().unwrap(), &before);
        assert_eq!(planner.map_update_state(), MapUpdateState::Stable);
    }

    #[test]
    fn test_non_incremental_planner_resets() {
        let mut planner = planned(scenario_config("ARAPlanner"));
        let before = planner.path().unwrap().clone();
        let updated = scenario_map().with_cells(vec![(69, 49)], true);
        assert_eq!(planner.set_map(Arc::new(updated)).unwrap(), MapUpdate::Reset);
        assert_eq!(planner.path().unwrap(), &before);
    }
}
