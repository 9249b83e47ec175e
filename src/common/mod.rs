//! Common types, traits, and error definitions for footstep_planner
//!
//! This module provides the foundational building blocks shared by the
//! map, the footstep domain and the search.

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;
