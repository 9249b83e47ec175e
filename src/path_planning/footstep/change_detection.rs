//! Map change detection for incremental replanning
//!
//! Two occupancy snapshots are compared cell by cell, the flipped cells are
//! inflated by the collision check's influence radius and every planning
//! state that could sit on an inflated cell is reported as changed.

use log::{debug, info};
use nalgebra::DMatrix;

use crate::common::{Leg, State};
use crate::mapping::{distance_transform, GridMap2D};

use super::discretization::Discretization;
use super::environment::FootGeometry;

/// Progress of the change detector through one map update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapUpdateState {
    NoMapYet,
    Stable,
    Diffing,
    IncrementalUpdate,
    Reset,
}

/// Outcome of comparing two map snapshots
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateDecision {
    /// Both bitmaps are identical
    NoChange,
    /// Feed the changed states into the running search
    Incremental {
        changed_cells: usize,
        changed_states: Vec<State>,
    },
    /// Discard the search and plan from scratch
    Reset { changed_cells: Option<usize> },
}

/// Cells whose occupancy differs between the two bitmaps
pub fn changed_cells(old: &DMatrix<bool>, new: &DMatrix<bool>) -> DMatrix<bool> {
    old.zip_map(new, |a, b| a ^ b)
}

/// Cells within `radius` cells of any flagged cell
pub fn inflate(mask: &DMatrix<bool>, radius: f64) -> DMatrix<bool> {
    distance_transform(mask).map(|d| d <= radius)
}

/// One state per angle bin for every planning cell whose lattice position
/// lies inside a flagged map cell.
///
/// Lattice positions are assigned to map cells with
/// [`GridMap2D::world_to_map`], the same lookup the collision check uses.
pub fn changed_states(map: &GridMap2D, mask: &DMatrix<bool>, disc: &Discretization) -> Vec<State> {
    let res = map.resolution();
    let (origin_x, origin_y) = map.origin();
    // lattice indices that may fall into map cell `m`, one spare on each side
    let candidates = |origin: f64, m: usize| {
        let lo = ((origin + m as f64 * res) / disc.cell_size).floor() as i32 - 1;
        let hi = ((origin + (m + 1) as f64 * res) / disc.cell_size).ceil() as i32 + 1;
        lo..=hi
    };

    let mut states = Vec::new();
    for my in 0..mask.ncols() {
        for mx in 0..mask.nrows() {
            if !mask[(mx, my)] {
                continue;
            }
            for cy in candidates(origin_y, my) {
                let wy = disc.disc_to_cont(cy);
                for cx in candidates(origin_x, mx) {
                    let wx = disc.disc_to_cont(cx);
                    if map.world_to_map(wx, wy) != Some((mx, my)) {
                        continue;
                    }
                    states.extend(
                        (0..disc.num_angle_bins).map(|bin| State::new(wx, wy, disc.bin_to_angle(bin), Leg::NoLeg)),
                    );
                }
            }
        }
    }
    states
}

pub struct ChangeDetector {
    foot: FootGeometry,
    disc: Discretization,
    changed_cells_limit: usize,
    state: MapUpdateState,
}

impl ChangeDetector {
    pub fn new(foot: FootGeometry, disc: Discretization, changed_cells_limit: usize) -> Self {
        Self {
            foot,
            disc,
            changed_cells_limit,
            state: MapUpdateState::NoMapYet,
        }
    }

    pub fn state(&self) -> MapUpdateState {
        self.state
    }

    /// The first map arrived, nothing to compare against
    pub fn map_received(&mut self) {
        self.state = MapUpdateState::Stable;
    }

    /// The decision of the last `detect` has been applied
    pub fn settle(&mut self) {
        if self.state != MapUpdateState::NoMapYet {
            self.state = MapUpdateState::Stable;
        }
    }

    /// Compare `old` and `new` and decide how the search has to react
    pub fn detect(&mut self, old: &GridMap2D, new: &GridMap2D, incremental_search: bool) -> UpdateDecision {
        if !incremental_search || !old.same_geometry(new) {
            debug!("Map update is not incremental (search support: {})", incremental_search);
            self.state = MapUpdateState::Reset;
            return UpdateDecision::Reset { changed_cells: None };
        }

        info!("Received an updated map => change detection");
        self.state = MapUpdateState::Diffing;
        let diff = changed_cells(old.binary_map(), new.binary_map());
        let num_changed = diff.iter().filter(|&&c| c).count();
        if num_changed == 0 {
            info!("old map equals new map; no replanning necessary");
            self.state = MapUpdateState::Stable;
            return UpdateDecision::NoChange;
        }
        info!("{} changed map cells found", num_changed);

        if num_changed > self.changed_cells_limit {
            info!("Reset old information in new planning task");
            self.state = MapUpdateState::Reset;
            return UpdateDecision::Reset {
                changed_cells: Some(num_changed),
            };
        }

        let radius = self.foot.influence_radius(new.resolution());
        let inflated = inflate(&diff, radius);
        let changed_states = changed_states(new, &inflated, &self.disc);
        info!("Use old information in new planning task");
        debug!("{} changed states after inflation by {:.2} cells", changed_states.len(), radius);
        self.state = MapUpdateState::IncrementalUpdate;
        UpdateDecision::Incremental {
            changed_cells: num_changed,
            changed_states,
        }
    }
}
