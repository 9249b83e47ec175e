//! Common traits defining the contract between a search domain and the
//! graph search that consumes it

use std::time::Duration;

use crate::common::error::PlannerResult;

/// Integer edge costs are real costs multiplied by this factor
pub const COST_SCALE: f64 = 1000.0;

/// Convert a real-valued transition cost into an integer search cost.
///
/// Rounds up so that summed integer edge costs never undercut a heuristic
/// computed with [`heuristic_to_search_cost`].
pub fn edge_to_search_cost(cost: f64) -> i32 {
    (cost * COST_SCALE - 1e-6).ceil().max(0.0) as i32
}

/// Convert a real-valued heuristic estimate into an integer search cost
pub fn heuristic_to_search_cost(estimate: f64) -> i32 {
    let scaled = (estimate * COST_SCALE).floor();
    if scaled >= i32::MAX as f64 / 4.0 {
        i32::MAX / 4
    } else {
        scaled.max(0.0) as i32
    }
}

/// Graph exposed to a search algorithm. States are identified by dense ids.
pub trait SearchEnvironment {
    /// Outgoing transitions of `state_id` as (neighbor id, integer cost)
    fn successors(&mut self, state_id: usize) -> PlanningEdges;

    /// Incoming transitions of `state_id` as (neighbor id, integer cost)
    fn predecessors(&mut self, state_id: usize) -> PlanningEdges;

    /// Integer cost-to-go estimate between two registered states
    fn heuristic(&self, from_id: usize, to_id: usize) -> i32;
}

/// Result of a neighbor query
pub type PlanningEdges = PlannerResult<Vec<(usize, i32)>>;

/// A solution returned by [`SearchAlgorithm::replan`]
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSolution {
    /// State ids ordered from start to goal
    pub state_ids: Vec<usize>,
    /// Total integer cost
    pub cost: i32,
}

/// Anytime / incremental graph search driven by a [`SearchEnvironment`]
pub trait SearchAlgorithm {
    fn name(&self) -> &str;

    /// Returns false if the id cannot be used as a start
    fn set_start(&mut self, state_id: usize) -> bool;

    /// Returns false if the id cannot be used as a goal
    fn set_goal(&mut self, state_id: usize) -> bool;

    fn set_initial_epsilon(&mut self, epsilon: f64);

    fn initial_epsilon(&self) -> f64;

    /// Stop after the first solution instead of improving until the budget runs out
    fn set_search_mode(&mut self, stop_at_first_solution: bool);

    /// Search for (or improve) a solution within `time_budget`.
    ///
    /// `Ok(None)` means no solution was found in time.
    fn replan(
        &mut self,
        env: &mut dyn SearchEnvironment,
        time_budget: Duration,
    ) -> PlannerResult<Option<SearchSolution>>;

    /// Whether [`costs_changed`](SearchAlgorithm::costs_changed) lets the search reuse work
    fn supports_incremental(&self) -> bool {
        false
    }

    /// Notify the search that transitions touching these states changed cost
    fn costs_changed(&mut self, _state_ids: &[usize]) {}

    /// Expansions performed by the last `replan` call
    fn expansion_count(&self) -> usize;

    /// Suboptimality bound of the last solution
    fn final_epsilon(&self) -> f64;
}
