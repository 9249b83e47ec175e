//! Binary occupancy grid map with a precomputed clearance field
//!
//! Cell `(mx, my)` covers `[origin + m * resolution, origin + (m + 1) * resolution)`
//! on both axes. The occupancy bitmap is stored as a `DMatrix<bool>` indexed
//! `(mx, my)`, `true` meaning occupied.

use nalgebra::DMatrix;

use crate::common::{PlannerError, PlannerResult};
use crate::mapping::distance_transform::distance_transform;

#[derive(Debug, Clone)]
pub struct GridMap2D {
    resolution: f64,
    origin_x: f64,
    origin_y: f64,
    occupancy: DMatrix<bool>,
    /// Distance in meters from each cell centre to the nearest occupied cell
    /// centre, cells outside the map counting as occupied
    clearance: DMatrix<f64>,
}

impl GridMap2D {
    pub fn new(
        occupancy: DMatrix<bool>,
        resolution: f64,
        origin_x: f64,
        origin_y: f64,
    ) -> PlannerResult<Self> {
        if resolution <= 0.0 {
            return Err(PlannerError::Precondition(format!(
                "map resolution must be > 0, got {}",
                resolution
            )));
        }
        if occupancy.nrows() == 0 || occupancy.ncols() == 0 {
            return Err(PlannerError::Precondition("map has no cells".to_string()));
        }
        let clearance = Self::compute_clearance(&occupancy, resolution);
        Ok(Self {
            resolution,
            origin_x,
            origin_y,
            occupancy,
            clearance,
        })
    }

    /// All-free map of `width x height` cells with the origin at (0, 0)
    pub fn empty(width: usize, height: usize, resolution: f64) -> PlannerResult<Self> {
        Self::new(DMatrix::from_element(width, height, false), resolution, 0.0, 0.0)
    }

    /// Map whose occupancy is given by `occupied(mx, my)`
    pub fn from_fn<F>(width: usize, height: usize, resolution: f64, occupied: F) -> PlannerResult<Self>
    where
        F: FnMut(usize, usize) -> bool,
    {
        Self::new(DMatrix::from_fn(width, height, occupied), resolution, 0.0, 0.0)
    }

    /// Copy of this map with the given cells set to `occupied`
    pub fn with_cells<I>(&self, cells: I, occupied: bool) -> Self
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        let mut occupancy = self.occupancy.clone();
        for (mx, my) in cells {
            if mx < self.width() && my < self.height() {
                occupancy[(mx, my)] = occupied;
            }
        }
        let clearance = Self::compute_clearance(&occupancy, self.resolution);
        Self {
            resolution: self.resolution,
            origin_x: self.origin_x,
            origin_y: self.origin_y,
            occupancy,
            clearance,
        }
    }

    fn compute_clearance(occupancy: &DMatrix<bool>, resolution: f64) -> DMatrix<f64> {
        let (w, h) = occupancy.shape();
        // one ring of occupied cells around the map stands in for "outside"
        let padded = DMatrix::from_fn(w + 2, h + 2, |x, y| {
            x == 0 || y == 0 || x == w + 1 || y == h + 1 || occupancy[(x - 1, y - 1)]
        });
        let dist = distance_transform(&padded);
        DMatrix::from_fn(w, h, |x, y| dist[(x + 1, y + 1)] * resolution)
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn width(&self) -> usize {
        self.occupancy.nrows()
    }

    pub fn height(&self) -> usize {
        self.occupancy.ncols()
    }

    /// (width, height) in cells
    pub fn size(&self) -> (usize, usize) {
        (self.width(), self.height())
    }

    pub fn origin(&self) -> (f64, f64) {
        (self.origin_x, self.origin_y)
    }

    /// True if both maps can be compared cell by cell
    pub fn same_geometry(&self, other: &GridMap2D) -> bool {
        self.resolution == other.resolution && self.size() == other.size()
    }

    /// Map cell containing a world position, `None` outside the map
    pub fn world_to_map(&self, wx: f64, wy: f64) -> Option<(usize, usize)> {
        let (mx, my) = self.world_to_map_unbounded(wx, wy);
        if mx < 0 || my < 0 || mx >= self.width() as i64 || my >= self.height() as i64 {
            None
        } else {
            Some((mx as usize, my as usize))
        }
    }

    /// Map cell containing a world position, possibly outside the map
    pub fn world_to_map_unbounded(&self, wx: f64, wy: f64) -> (i64, i64) {
        (
            ((wx - self.origin_x) / self.resolution).floor() as i64,
            ((wy - self.origin_y) / self.resolution).floor() as i64,
        )
    }

    /// World position of a cell centre
    pub fn map_to_world(&self, mx: usize, my: usize) -> (f64, f64) {
        (
            self.origin_x + (mx as f64 + 0.5) * self.resolution,
            self.origin_y + (my as f64 + 0.5) * self.resolution,
        )
    }

    pub fn is_occupied(&self, mx: usize, my: usize) -> bool {
        self.occupancy[(mx, my)]
    }

    /// Occupancy at a world position; outside the map counts as occupied
    pub fn is_occupied_at(&self, wx: f64, wy: f64) -> bool {
        match self.world_to_map(wx, wy) {
            Some((mx, my)) => self.occupancy[(mx, my)],
            None => true,
        }
    }

    /// Distance in meters from the cell at a world position to the nearest
    /// occupied cell (or the map border); `None` outside the map
    pub fn clearance_at(&self, wx: f64, wy: f64) -> Option<f64> {
        self.world_to_map(wx, wy).map(|(mx, my)| self.clearance[(mx, my)])
    }

    pub fn clearance(&self, mx: usize, my: usize) -> f64 {
        self.clearance[(mx, my)]
    }

    /// Binary occupancy bitmap, `true` meaning occupied
    pub fn binary_map(&self) -> &DMatrix<bool> {
        &self.occupancy
    }

    pub fn num_occupied(&self) -> usize {
        self.occupancy.iter().filter(|&&o| o).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_world_map_conversion() {
        let map = GridMap2D::empty(10, 20, 0.1).unwrap();
        assert_eq!(map.size(), (10, 20));
        assert_eq!(map.world_to_map(0.05, 0.15), Some((0, 1)));
        assert_eq!(map.world_to_map(-0.01, 0.15), None);
        assert_eq!(map.world_to_map(1.0, 0.15), None);
        let (wx, wy) = map.map_to_world(3, 4);
        assert_relative_eq!(wx, 0.35, epsilon = 1e-12);
        assert_relative_eq!(wy, 0.45, epsilon = 1e-12);
        assert_eq!(map.world_to_map(wx, wy), Some((3, 4)));
    }

    #[test]
    fn test_invalid_map_rejected() {
        assert!(GridMap2D::empty(10, 10, 0.0).is_err());
        assert!(GridMap2D::empty(0, 10, 0.1).is_err());
    }

    #[test]
    fn test_clearance_counts_border_and_obstacles() {
        let map = GridMap2D::from_fn(11, 11, 0.1, |x, y| x == 8 && y == 5).unwrap();
        // cell (5, 5): obstacle is 3 cells away, border 6 cells away
        assert_relative_eq!(map.clearance(5, 5), 0.3, epsilon = 1e-9);
        // cell (0, 0): next to the border
        assert_relative_eq!(map.clearance(0, 0), 0.1, epsilon = 1e-9);
        assert_relative_eq!(map.clearance(8, 5), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_with_cells_copies_and_updates() {
        let map = GridMap2D::empty(5, 5, 0.1).unwrap();
        let updated = map.with_cells(vec![(1, 1), (2, 2), (9, 9)], true);
        assert_eq!(map.num_occupied(), 0);
        assert_eq!(updated.num_occupied(), 2);
        assert!(updated.is_occupied(1, 1));
        assert!(updated.is_occupied_at(0.25, 0.25));
        assert!(updated.is_occupied_at(-1.0, 0.25));
        assert!(map.same_geometry(&updated));
    }
}
