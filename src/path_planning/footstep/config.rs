//! Planner configuration loaded from YAML

use std::f64::consts::SQRT_2;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::common::{Leg, PlannerError, PlannerResult};

use super::discretization::Discretization;
use super::environment::{EnvironmentParams, FootGeometry};
use super::footstep::{Footstep, StepBounds, StepLimits};
use super::heuristic::{HeuristicParams, HeuristicType};
use super::planning_state::PlanningState;

/// Search algorithm families accepted in the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerType {
    Ara,
    Ad,
    RStar,
}

impl PlannerType {
    /// Only the AD planner reuses search effort after cost changes
    pub fn is_incremental(self) -> bool {
        self == PlannerType::Ad
    }
}

impl FromStr for PlannerType {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ARAPlanner" => Ok(PlannerType::Ara),
            "ADPlanner" => Ok(PlannerType::Ad),
            "RSTARPlanner" => Ok(PlannerType::RStar),
            other => Err(PlannerError::Configuration(format!(
                "Planner {} not available / untested.",
                other
            ))),
        }
    }
}

impl fmt::Display for PlannerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlannerType::Ara => write!(f, "ARAPlanner"),
            PlannerType::Ad => write!(f, "ADPlanner"),
            PlannerType::RStar => write!(f, "RSTARPlanner"),
        }
    }
}

/// Full planner configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// EuclideanHeuristic, EuclStepCostHeuristic or PathCostHeuristic
    pub heuristic_type: String,
    /// ARAPlanner, ADPlanner or RSTARPlanner
    pub planner_type: String,
    pub forward_search: bool,
    pub search_until_first_solution: bool,
    /// Search time budget [s]
    pub allocated_time: f64,
    pub initial_epsilon: f64,
    /// More changed map cells than this force a full replan
    pub changed_cells_limit: usize,
    pub max_hash_size: u32,
    /// Fixed cost added to every step
    pub step_cost: f64,
    /// Cost per radian of rotation between two feet
    pub diff_angle_cost: f64,
    pub accuracy: AccuracySection,
    pub foot: FootSection,
    pub footsteps: FootstepSection,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            heuristic_type: "EuclideanHeuristic".to_string(),
            planner_type: "ARAPlanner".to_string(),
            forward_search: false,
            search_until_first_solution: false,
            allocated_time: 7.0,
            initial_epsilon: 3.0,
            changed_cells_limit: 5000,
            max_hash_size: 65536,
            step_cost: 0.05,
            diff_angle_cost: 0.0,
            accuracy: AccuracySection::default(),
            foot: FootSection::default(),
            footsteps: FootstepSection::default(),
        }
    }
}

/// Discretization and collision check settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AccuracySection {
    /// 0: circles only, 1: inner circle, 2: exact footprint
    pub collision_check: u8,
    /// Planning cell size [m]
    pub cell_size: f64,
    pub num_angle_bins: i32,
}

impl Default for AccuracySection {
    fn default() -> Self {
        Self {
            collision_check: 2,
            cell_size: 0.01,
            num_angle_bins: 64,
        }
    }
}

/// Foot geometry and kinematic step limits
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FootSection {
    pub size_x: f64,
    pub size_y: f64,
    pub size_z: f64,
    pub separation: f64,
    pub origin_shift_x: f64,
    pub origin_shift_y: f64,
    pub max_step_x: f64,
    pub max_step_y: f64,
    pub max_step_theta: f64,
    pub max_inverse_step_x: f64,
    pub max_inverse_step_y: f64,
    pub max_inverse_step_theta: f64,
}

impl Default for FootSection {
    fn default() -> Self {
        Self {
            size_x: 0.16,
            size_y: 0.06,
            size_z: 0.015,
            separation: 0.095,
            origin_shift_x: 0.02,
            origin_shift_y: 0.0,
            max_step_x: 0.04,
            max_step_y: 0.04,
            max_step_theta: 0.349,
            max_inverse_step_x: 0.04,
            max_inverse_step_y: 0.01,
            max_inverse_step_theta: 0.05,
        }
    }
}

/// Footstep set as parallel lists, expressed for a `reference_leg` stance
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FootstepSection {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub theta: Vec<f64>,
    pub reference_leg: Leg,
}

impl Default for FootstepSection {
    fn default() -> Self {
        Self {
            x: vec![0.04, 0.02, 0.0, -0.02, 0.0, 0.02, 0.0, 0.0],
            y: vec![0.095, 0.095, 0.095, 0.095, 0.13, 0.115, 0.095, 0.095],
            theta: vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.15, 0.3, -0.05],
            reference_leg: Leg::Right,
        }
    }
}

impl PlannerConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> PlannerResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse from YAML string
    pub fn from_yaml(yaml: &str) -> PlannerResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn validate(&self) -> PlannerResult<()> {
        self.heuristic_type()?;
        self.planner_type()?;

        let fs = &self.footsteps;
        if fs.x.len() != fs.y.len() || fs.x.len() != fs.theta.len() {
            return Err(PlannerError::Configuration(format!(
                "Footstep parameterization has different sizes for x/y/theta ({}/{}/{})",
                fs.x.len(),
                fs.y.len(),
                fs.theta.len()
            )));
        }
        if fs.x.is_empty() {
            return Err(PlannerError::Configuration("footstep set is empty".to_string()));
        }
        if fs.reference_leg == Leg::NoLeg {
            return Err(PlannerError::Configuration(
                "footstep reference leg must be Left or Right".to_string(),
            ));
        }

        let acc = &self.accuracy;
        if acc.cell_size <= 0.0 || acc.num_angle_bins <= 0 {
            return Err(PlannerError::Configuration(format!(
                "invalid discretization: cell size {}, {} angle bins",
                acc.cell_size, acc.num_angle_bins
            )));
        }
        if acc.collision_check > 2 {
            return Err(PlannerError::Configuration(format!(
                "collision check accuracy must be 0, 1 or 2, got {}",
                acc.collision_check
            )));
        }
        if self.max_hash_size == 0 {
            return Err(PlannerError::Configuration("max_hash_size must be > 0".to_string()));
        }
        if self.step_cost < 0.0 || self.diff_angle_cost < 0.0 {
            return Err(PlannerError::Configuration("step costs must not be negative".to_string()));
        }
        if !(self.allocated_time > 0.0 && self.allocated_time.is_finite()) {
            return Err(PlannerError::Configuration(format!(
                "allocated_time must be a positive number of seconds, got {}",
                self.allocated_time
            )));
        }
        if self.initial_epsilon < 1.0 {
            return Err(PlannerError::Configuration("initial_epsilon must be >= 1".to_string()));
        }
        if self.foot.size_x <= 0.0 || self.foot.size_y <= 0.0 {
            return Err(PlannerError::Configuration("foot size must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn heuristic_type(&self) -> PlannerResult<HeuristicType> {
        self.heuristic_type.parse()
    }

    pub fn planner_type(&self) -> PlannerResult<PlannerType> {
        self.planner_type.parse()
    }

    pub fn discretization(&self) -> Discretization {
        Discretization::new(
            self.accuracy.cell_size,
            self.accuracy.num_angle_bins,
            self.max_hash_size,
        )
    }

    pub fn step_limits(&self) -> StepLimits {
        StepLimits {
            max_x: self.foot.max_step_x,
            max_y: self.foot.max_step_y,
            max_theta: self.foot.max_step_theta,
            max_inv_x: self.foot.max_inverse_step_x,
            max_inv_y: self.foot.max_inverse_step_y,
            max_inv_theta: self.foot.max_inverse_step_theta,
        }
    }

    pub fn foot_geometry(&self) -> FootGeometry {
        FootGeometry {
            size_x: self.foot.size_x,
            size_y: self.foot.size_y,
            separation: self.foot.separation,
            origin_shift_x: self.foot.origin_shift_x,
            origin_shift_y: self.foot.origin_shift_y,
        }
    }

    pub fn footstep_set(&self) -> Vec<Footstep> {
        let disc = self.discretization();
        let fs = &self.footsteps;
        fs.x.iter()
            .zip(&fs.y)
            .zip(&fs.theta)
            .map(|((&x, &y), &theta)| Footstep::new(x, y, theta, fs.reference_leg, &disc))
            .collect()
    }

    /// Validated environment parameters
    pub fn environment_params(&self) -> PlannerResult<EnvironmentParams> {
        self.validate()?;
        let disc = self.discretization();
        let footsteps = self.footstep_set();
        let bounds = StepBounds::new(&self.step_limits(), self.foot.separation, &disc);

        let stance = PlanningState::new(0, 0, 0, self.footsteps.reference_leg, &disc);
        for fs in &footsteps {
            if !bounds.performable(&stance, &fs.apply(&stance, &disc), &disc) {
                warn!(
                    "Footstep ({}, {}, {}) exceeds the step limits and will never be taken",
                    fs.x(),
                    fs.y(),
                    fs.theta()
                );
            }
        }

        Ok(EnvironmentParams {
            disc,
            footsteps,
            bounds,
            foot: self.foot_geometry(),
            collision_check_accuracy: self.accuracy.collision_check,
            step_cost: self.step_cost,
            diff_angle_cost: self.diff_angle_cost,
            forward_search: self.forward_search,
        })
    }

    /// Heuristic cost terms for the given environment parameters
    pub fn heuristic_params(&self, env: &EnvironmentParams) -> HeuristicParams {
        let disc = env.disc;
        let footstep_reach = env.footsteps.iter().map(Footstep::reach).fold(0.0, f64::max);
        let max_step_width = footstep_reach.max(env.bounds.max_reach(&disc)) + disc.cell_size * SQRT_2;
        HeuristicParams {
            disc,
            step_cost: self.step_cost,
            diff_angle_cost: self.diff_angle_cost,
            max_step_width,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PlannerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_hash_size, 65536);
        assert_eq!(config.accuracy.num_angle_bins, 64);
        assert_eq!(config.planner_type().unwrap(), PlannerType::Ara);
        assert_eq!(config.footstep_set().len(), 8);
    }

    #[test]
    fn test_yaml_overrides_and_defaults() {
        let yaml = r#"
heuristic_type: PathCostHeuristic
planner_type: ADPlanner
forward_search: true
step_cost: 0.1
accuracy:
  cell_size: 0.02
footsteps:
  x: [0.04, 0.0]
  y: [0.1, 0.1]
  theta: [0.0, 0.0]
  reference_leg: Left
"#;
        let config = PlannerConfig::from_yaml(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.heuristic_type().unwrap(), HeuristicType::PathCost);
        assert!(config.planner_type().unwrap().is_incremental());
        assert!(config.forward_search);
        assert_eq!(config.accuracy.cell_size, 0.02);
        assert_eq!(config.accuracy.num_angle_bins, 64);
        assert_eq!(config.footsteps.reference_leg, Leg::Left);
        assert_eq!(config.foot.separation, 0.095);
    }

    #[test]
    fn test_mismatched_footstep_lists_are_rejected() {
        let mut config = PlannerConfig::default();
        config.footsteps.theta.pop();
        assert!(matches!(config.validate(), Err(PlannerError::Configuration(_))));
        assert!(config.environment_params().is_err());
    }

    #[test]
    fn test_unknown_names_are_rejected() {
        let mut config = PlannerConfig::default();
        config.planner_type = "DijkstraPlanner".to_string();
        assert!(matches!(config.validate(), Err(PlannerError::Configuration(_))));

        let mut config = PlannerConfig::default();
        config.heuristic_type = "Manhattan".to_string();
        assert!(matches!(config.validate(), Err(PlannerError::Configuration(_))));
    }

    #[test]
    fn test_broken_yaml_is_a_parse_error() {
        assert!(matches!(
            PlannerConfig::from_yaml("step_cost: [1, 2"),
            Err(PlannerError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = PlannerConfig::load(Path::new("/nonexistent/footstep_planner.yaml"));
        assert!(matches!(result, Err(PlannerError::Io(_))));
    }

    #[test]
    fn test_heuristic_step_width_covers_bounds() {
        let config = PlannerConfig::default();
        let env = config.environment_params().unwrap();
        let params = config.heuristic_params(&env);
        assert!(params.max_step_width >= env.bounds.max_reach(&env.disc));
        assert!(params.max_step_width >= 0.13);
    }
}
