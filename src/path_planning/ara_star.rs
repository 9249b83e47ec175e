//! Anytime Repairing A*
//!
//! Weighted A* that starts with an inflated heuristic and tightens the
//! inflation by `EPSILON_STEP` after every solution until the time budget
//! runs out or the search is optimal. Expands successors toward the goal in
//! forward mode and predecessors toward the start in backward mode.
//!
//! In incremental mode the last solution is kept and returned again until
//! the start, the goal or the cost of a transition it touched changes.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::{Duration, Instant};

use log::{debug, info};
use ordered_float::OrderedFloat;

use crate::common::{PlannerResult, SearchAlgorithm, SearchEnvironment, SearchSolution};

const EPSILON_STEP: f64 = 0.2;

#[derive(Debug, Clone, Copy)]
struct SearchNode {
    g: i64,
    h: i32,
    parent: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenEntry {
    key: OrderedFloat<f64>,
    g: i64,
    id: usize,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior, ties prefer larger g
        other
            .key
            .cmp(&self.key)
            .then_with(|| self.g.cmp(&other.g))
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

enum Improvement {
    Done,
    TimedOut,
}

pub struct AnytimeAStar {
    name: String,
    forward_search: bool,
    incremental: bool,
    start: Option<usize>,
    goal: Option<usize>,
    initial_epsilon: f64,
    stop_at_first_solution: bool,
    final_epsilon: f64,
    expansions: usize,
    nodes: HashMap<usize, SearchNode>,
    open: BinaryHeap<OpenEntry>,
    closed: HashSet<usize>,
    incons: HashSet<usize>,
    solution: Option<SearchSolution>,
}

impl AnytimeAStar {
    pub fn new(name: &str, forward_search: bool, incremental: bool) -> Self {
        Self {
            name: name.to_string(),
            forward_search,
            incremental,
            start: None,
            goal: None,
            initial_epsilon: 3.0,
            stop_at_first_solution: false,
            final_epsilon: f64::INFINITY,
            expansions: 0,
            nodes: HashMap::new(),
            open: BinaryHeap::new(),
            closed: HashSet::new(),
            incons: HashSet::new(),
            solution: None,
        }
    }

    /// Search source and target ids for the configured direction
    fn endpoints(&self) -> Option<(usize, usize)> {
        let (start, goal) = (self.start?, self.goal?);
        if self.forward_search {
            Some((start, goal))
        } else {
            Some((goal, start))
        }
    }

    fn g(&self, id: usize) -> i64 {
        self.nodes.get(&id).map_or(i64::MAX, |n| n.g)
    }

    fn key(&self, node: &SearchNode, epsilon: f64) -> OrderedFloat<f64> {
        OrderedFloat(node.g as f64 + epsilon * node.h as f64)
    }

    fn push_open(&mut self, id: usize, epsilon: f64) {
        if let Some(node) = self.nodes.get(&id) {
            let entry = OpenEntry {
                key: self.key(node, epsilon),
                g: node.g,
                id,
            };
            self.open.push(entry);
        }
    }

    /// Drop outdated heap entries and return the smallest live key
    fn min_open_key(&mut self) -> Option<OrderedFloat<f64>> {
        while let Some(top) = self.open.peek() {
            if self.closed.contains(&top.id) || self.g(top.id) != top.g {
                self.open.pop();
            } else {
                return Some(top.key);
            }
        }
        None
    }

    fn improve_path(
        &mut self,
        env: &mut dyn SearchEnvironment,
        target: usize,
        epsilon: f64,
        deadline: Instant,
    ) -> PlannerResult<Improvement> {
        loop {
            let min_key = match self.min_open_key() {
                Some(key) => key,
                None => return Ok(Improvement::Done),
            };
            let target_g = self.g(target);
            if target_g != i64::MAX && OrderedFloat(target_g as f64) <= min_key {
                return Ok(Improvement::Done);
            }
            if Instant::now() >= deadline {
                return Ok(Improvement::TimedOut);
            }

            let entry = match self.open.pop() {
                Some(entry) => entry,
                None => return Ok(Improvement::Done),
            };
            self.closed.insert(entry.id);
            self.expansions += 1;

            let edges = if self.forward_search {
                env.successors(entry.id)?
            } else {
                env.predecessors(entry.id)?
            };
            for (neighbor, cost) in edges {
                let new_g = entry.g + cost as i64;
                if new_g >= self.g(neighbor) {
                    continue;
                }
                let h = match self.nodes.get(&neighbor) {
                    Some(node) => node.h,
                    None => env.heuristic(neighbor, target),
                };
                self.nodes.insert(
                    neighbor,
                    SearchNode {
                        g: new_g,
                        h,
                        parent: Some(entry.id),
                    },
                );
                if self.closed.contains(&neighbor) {
                    self.incons.insert(neighbor);
                } else {
                    self.push_open(neighbor, epsilon);
                }
            }
        }
    }

    /// Ids along the parent chain from `target` back to `source`
    fn extract(&self, source: usize, target: usize) -> Option<SearchSolution> {
        let cost = self.g(target);
        if cost == i64::MAX {
            return None;
        }
        let mut ids = vec![target];
        let mut current = target;
        while current != source {
            current = self.nodes.get(&current)?.parent?;
            ids.push(current);
            if ids.len() > self.nodes.len() + 1 {
                return None;
            }
        }
        // the chain runs target -> source; forward solutions read start -> goal
        if self.forward_search {
            ids.reverse();
        }
        Some(SearchSolution {
            state_ids: ids,
            cost: cost.min(i32::MAX as i64) as i32,
        })
    }

    /// Move inconsistent states back into OPEN with the new inflation
    fn rebuild_open(&mut self, epsilon: f64) {
        let mut ids: Vec<usize> = self.open.drain().map(|e| e.id).collect();
        ids.extend(self.incons.drain());
        ids.sort_unstable();
        ids.dedup();
        self.closed.clear();
        for id in ids {
            self.push_open(id, epsilon);
        }
    }

    fn clear_search(&mut self) {
        self.nodes.clear();
        self.open.clear();
        self.closed.clear();
        self.incons.clear();
    }
}

impl SearchAlgorithm for AnytimeAStar {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_start(&mut self, state_id: usize) -> bool {
        if self.start != Some(state_id) {
            self.solution = None;
        }
        self.start = Some(state_id);
        true
    }

    fn set_goal(&mut self, state_id: usize) -> bool {
        if self.goal != Some(state_id) {
            self.solution = None;
        }
        self.goal = Some(state_id);
        true
    }

    fn set_initial_epsilon(&mut self, epsilon: f64) {
        self.initial_epsilon = epsilon.max(1.0);
    }

    fn initial_epsilon(&self) -> f64 {
        self.initial_epsilon
    }

    fn set_search_mode(&mut self, stop_at_first_solution: bool) {
        self.stop_at_first_solution = stop_at_first_solution;
    }

    fn replan(
        &mut self,
        env: &mut dyn SearchEnvironment,
        time_budget: Duration,
    ) -> PlannerResult<Option<SearchSolution>> {
        self.expansions = 0;
        let (source, target) = match self.endpoints() {
            Some(endpoints) => endpoints,
            None => return Ok(None),
        };

        if self.incremental {
            if let Some(solution) = &self.solution {
                debug!("{}: previous solution is still valid", self.name);
                return Ok(Some(solution.clone()));
            }
        }

        let deadline = Instant::now() + time_budget;
        self.clear_search();
        self.nodes.insert(
            source,
            SearchNode {
                g: 0,
                h: env.heuristic(source, target),
                parent: None,
            },
        );

        let mut epsilon = self.initial_epsilon;
        self.push_open(source, epsilon);
        let mut best = None;
        loop {
            let outcome = self.improve_path(env, target, epsilon, deadline)?;
            if let Improvement::TimedOut = outcome {
                debug!("{}: time budget exhausted at eps {:.2}", self.name, epsilon);
                break;
            }
            match self.extract(source, target) {
                Some(solution) => {
                    debug!(
                        "{}: solution with eps {:.2}, cost {}, {} expansions",
                        self.name, epsilon, solution.cost, self.expansions
                    );
                    self.final_epsilon = epsilon;
                    best = Some(solution);
                }
                // OPEN ran empty without reaching the target
                None => break,
            }
            if self.stop_at_first_solution || epsilon <= 1.0 {
                break;
            }
            epsilon = (epsilon - EPSILON_STEP).max(1.0);
            self.rebuild_open(epsilon);
        }

        if best.is_none() {
            info!("{}: no solution after {} expansions", self.name, self.expansions);
        }
        self.solution = best.clone();
        Ok(best)
    }

    fn supports_incremental(&self) -> bool {
        self.incremental
    }

    fn costs_changed(&mut self, state_ids: &[usize]) {
        if !self.incremental {
            return;
        }
        if state_ids.iter().any(|id| self.nodes.contains_key(id)) {
            debug!("{}: cost changes touch the search tree", self.name);
            self.solution = None;
        }
    }

    fn expansion_count(&self) -> usize {
        self.expansions
    }

    fn final_epsilon(&self) -> f64 {
        self.final_epsilon
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PlanningEdges;

    /// 4-connected grid with unit cost 10 per move and blocked cells
    struct GridWorld {
        width: usize,
        height: usize,
        blocked: HashSet<usize>,
        expanded: usize,
    }

    impl GridWorld {
        fn new(width: usize, height: usize, blocked: &[(usize, usize)]) -> Self {
            Self {
                width,
                height,
                blocked: blocked.iter().map(|&(x, y)| y * width + x).collect(),
                expanded: 0,
            }
        }

        fn id(&self, x: usize, y: usize) -> usize {
            y * self.width + x
        }

        fn neighbors(&mut self, id: usize) -> PlanningEdges {
            self.expanded += 1;
            let (x, y) = ((id % self.width) as i64, (id / self.width) as i64);
            let mut edges = Vec::new();
            for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= self.width as i64 || ny >= self.height as i64 {
                    continue;
                }
                let nid = ny as usize * self.width + nx as usize;
                if !self.blocked.contains(&nid) {
                    edges.push((nid, 10));
                }
            }
            Ok(edges)
        }
    }

    impl SearchEnvironment for GridWorld {
        fn successors(&mut self, state_id: usize) -> PlanningEdges {
            self.neighbors(state_id)
        }

        fn predecessors(&mut self, state_id: usize) -> PlanningEdges {
            self.neighbors(state_id)
        }

        fn heuristic(&self, from_id: usize, to_id: usize) -> i32 {
            let (fx, fy) = ((from_id % self.width) as i32, (from_id / self.width) as i32);
            let (tx, ty) = ((to_id % self.width) as i32, (to_id / self.width) as i32);
            10 * ((fx - tx).abs() + (fy - ty).abs())
        }
    }

    fn budget() -> Duration {
        Duration::from_secs(10)
    }

    fn wall_world() -> GridWorld {
        // wall at x = 5 with a gap at the top
        let wall: Vec<(usize, usize)> = (0..9).map(|y| (5, y)).collect();
        GridWorld::new(10, 10, &wall)
    }

    fn assert_valid_path(world: &GridWorld, ids: &[usize]) {
        for pair in ids.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let (ax, ay) = (a % world.width, a / world.width);
            let (bx, by) = (b % world.width, b / world.width);
            assert_eq!((ax as i64 - bx as i64).abs() + (ay as i64 - by as i64).abs(), 1);
            assert!(!world.blocked.contains(&b));
        }
    }

    #[test]
    fn test_finds_optimal_path_when_given_time() {
        let mut world = wall_world();
        let mut search = AnytimeAStar::new("ARAPlanner", true, false);
        let (start, goal) = (world.id(0, 0), world.id(9, 0));
        assert!(search.set_start(start));
        assert!(search.set_goal(goal));
        search.set_initial_epsilon(3.0);

        let solution = search.replan(&mut world, budget()).unwrap().unwrap();
        // up to the gap, across and back down: 9 + 9 + 9 moves
        assert_eq!(solution.cost, 270);
        assert_eq!(solution.state_ids.first(), Some(&start));
        assert_eq!(solution.state_ids.last(), Some(&goal));
        assert_valid_path(&world, &solution.state_ids);
        assert_eq!(search.final_epsilon(), 1.0);
        assert!(search.expansion_count() > 0);
    }

    #[test]
    fn test_stops_at_first_solution() {
        let mut world = wall_world();
        let mut search = AnytimeAStar::new("ARAPlanner", true, false);
        search.set_start(world.id(0, 0));
        search.set_goal(world.id(9, 0));
        search.set_initial_epsilon(3.0);
        search.set_search_mode(true);

        let solution = search.replan(&mut world, budget()).unwrap().unwrap();
        assert_eq!(search.final_epsilon(), 3.0);
        // the epsilon bound holds for the first solution
        assert!(solution.cost <= 3 * 270);
    }

    #[test]
    fn test_backward_search_returns_start_to_goal() {
        let mut world = wall_world();
        let mut search = AnytimeAStar::new("ARAPlanner", false, false);
        let (start, goal) = (world.id(0, 0), world.id(9, 0));
        search.set_start(start);
        search.set_goal(goal);

        let solution = search.replan(&mut world, budget()).unwrap().unwrap();
        assert_eq!(solution.state_ids.first(), Some(&start));
        assert_eq!(solution.state_ids.last(), Some(&goal));
        assert_eq!(solution.cost, 270);
        assert_valid_path(&world, &solution.state_ids);
    }

    #[test]
    fn test_unreachable_goal_has_no_solution() {
        let wall: Vec<(usize, usize)> = (0..10).map(|y| (5, y)).collect();
        let mut world = GridWorld::new(10, 10, &wall);
        let mut search = AnytimeAStar::new("ARAPlanner", true, false);
        search.set_start(world.id(0, 0));
        search.set_goal(world.id(9, 0));
        assert!(search.replan(&mut world, budget()).unwrap().is_none());
    }

    #[test]
    fn test_incremental_reuses_solution_until_costs_change() {
        let mut world = wall_world();
        let mut search = AnytimeAStar::new("ADPlanner", true, true);
        assert!(search.supports_incremental());
        search.set_start(world.id(0, 0));
        search.set_goal(world.id(9, 0));

        let first = search.replan(&mut world, budget()).unwrap().unwrap();
        let again = search.replan(&mut world, budget()).unwrap().unwrap();
        assert_eq!(first, again);
        assert_eq!(search.expansion_count(), 0);

        // a state the search never touched changes nothing
        search.costs_changed(&[usize::MAX]);
        search.replan(&mut world, budget()).unwrap();
        assert_eq!(search.expansion_count(), 0);

        search.costs_changed(&[world.id(0, 0)]);
        search.replan(&mut world, budget()).unwrap();
        assert!(search.expansion_count() > 0);
    }

    #[test]
    fn test_non_incremental_search_always_replans() {
        let mut world = wall_world();
        let mut search = AnytimeAStar::new("ARAPlanner", true, false);
        search.set_start(world.id(0, 0));
        search.set_goal(world.id(9, 0));
        search.replan(&mut world, budget()).unwrap();
        search.replan(&mut world, budget()).unwrap();
        assert!(search.expansion_count() > 0);
        assert!(world.expanded > 0);
    }

    #[test]
    fn test_missing_endpoints() {
        let mut world = wall_world();
        let mut search = AnytimeAStar::new("ARAPlanner", true, false);
        search.set_start(0);
        assert!(search.replan(&mut world, budget()).unwrap().is_none());
    }
}
