//! footstep_planner - footstep planning for humanoid robots
//!
//! This crate plans alternating foot placements from a start to a goal
//! pose on a 2D occupancy grid and repairs the plan incrementally when
//! the map changes.

// Core modules
pub mod common;
pub mod mapping;

// Planning
pub mod path_planning;

// Re-export common types for convenience
pub use common::{FootstepPath, Leg, Pose2D, State};
pub use common::{SearchAlgorithm, SearchEnvironment};
pub use common::{PlannerError, PlannerResult};
pub use path_planning::footstep::{FootstepPlanner, MapUpdate, PlannerConfig};
