//! Footstep Planner Module
//!
//! Plans sequences of alternating foot placements for a biped on a 2D
//! occupancy grid. Continuous foot poses are quantized into a hashable
//! lattice; a fixed set of footstep primitives spans the transitions.
//!
//! # Components
//!
//! - `discretization`: cell and angle-bin conversions, state hashing
//! - `planning_state`: discrete foot pose with hash tag and id
//! - `footstep`: footstep primitives and kinematic step bounds
//! - `heuristic`: Euclidean, step-cost and path-cost estimates
//! - `environment`: state table, neighbor generation, collision checks
//! - `change_detection`: map diffing for incremental replanning
//! - `config`: YAML configuration
//! - `planner`: planning session tying everything together
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use footstep_planner::common::Pose2D;
//! use footstep_planner::mapping::GridMap2D;
//! use footstep_planner::path_planning::footstep::{FootstepPlanner, PlannerConfig};
//!
//! let mut planner = FootstepPlanner::new(PlannerConfig::default()).unwrap();
//! let map = GridMap2D::new(nalgebra::DMatrix::from_element(300, 200, false), 0.01, -0.5, -1.0).unwrap();
//! planner.set_map(Arc::new(map)).unwrap();
//! planner.plan(&Pose2D::new(0.0, 0.0, 0.0), &Pose2D::new(1.5, 0.3, 0.0)).unwrap();
//! let path = planner.path().unwrap();
//! ```

pub mod discretization;
pub mod planning_state;
pub mod footstep;
pub mod heuristic;
pub mod environment;
pub mod change_detection;
pub mod config;
pub mod planner;

// Re-exports
pub use discretization::Discretization;
pub use planning_state::PlanningState;
pub use footstep::{Footstep, StepBounds, StepLimits};
pub use heuristic::{
    create_heuristic, CostField, EuclStepCostHeuristic, EuclideanHeuristic, Heuristic, HeuristicParams,
    HeuristicType, PathCostHeuristic,
};
pub use environment::{EnvironmentParams, FootGeometry, FootstepEnvironment, HashStatistics, StartGoalIds};
pub use change_detection::{ChangeDetector, MapUpdateState, UpdateDecision};
pub use config::{PlannerConfig, PlannerType};
pub use planner::{create_search, FootstepPlanner, MapUpdate};
