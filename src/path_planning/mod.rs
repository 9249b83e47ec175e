// Path planning: footstep domain and the anytime search that consumes it

pub mod ara_star;
pub mod footstep;

pub use ara_star::AnytimeAStar;
pub use footstep::{FootstepPlanner, PlannerConfig};
