// Occupancy map and distance fields

pub mod distance_transform;
pub mod grid_map_2d;

pub use distance_transform::*;
pub use grid_map_2d::*;
