//! Discretization of continuous foot poses into the planning lattice

use std::f64::consts::PI;

/// Lattice resolution shared by every planning state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Discretization {
    /// Edge length of a planning cell [m]
    pub cell_size: f64,
    /// Number of orientation bins over a full turn
    pub num_angle_bins: i32,
    /// Number of hash buckets in the state table
    pub max_hash_size: u32,
}

impl Discretization {
    pub fn new(cell_size: f64, num_angle_bins: i32, max_hash_size: u32) -> Self {
        Self {
            cell_size,
            num_angle_bins,
            max_hash_size,
        }
    }

    pub fn cont_to_disc(&self, value: f64) -> i32 {
        cont_to_disc(value, self.cell_size)
    }

    pub fn disc_to_cont(&self, cell: i32) -> f64 {
        disc_to_cont(cell, self.cell_size)
    }

    pub fn angle_to_bin(&self, theta: f64) -> i32 {
        angle_state_to_cell(theta, self.num_angle_bins)
    }

    pub fn bin_to_angle(&self, bin: i32) -> f64 {
        angle_cell_to_state(bin, self.num_angle_bins)
    }

    /// Size of one angle bin [rad]
    pub fn angle_bin_size(&self) -> f64 {
        2.0 * PI / self.num_angle_bins as f64
    }

    /// Smallest absolute rotation between two angle bins [rad]
    pub fn angle_bin_distance(&self, a: i32, b: i32) -> f64 {
        signed_bin_difference(b - a, self.num_angle_bins).abs() as f64 * self.angle_bin_size()
    }
}

/// `round(value / cell_size)`
pub fn cont_to_disc(value: f64, cell_size: f64) -> i32 {
    (value / cell_size).round() as i32
}

pub fn disc_to_cont(cell: i32, cell_size: f64) -> f64 {
    cell as f64 * cell_size
}

/// Angle bin of `theta`, wrapped into `[0, num_angle_bins)`
pub fn angle_state_to_cell(theta: f64, num_angle_bins: i32) -> i32 {
    let bin_size = 2.0 * PI / num_angle_bins as f64;
    norm_angle_bin((theta / bin_size).round() as i32, num_angle_bins)
}

pub fn angle_cell_to_state(bin: i32, num_angle_bins: i32) -> f64 {
    bin as f64 * 2.0 * PI / num_angle_bins as f64
}

pub fn norm_angle_bin(bin: i32, num_angle_bins: i32) -> i32 {
    bin.rem_euclid(num_angle_bins)
}

/// Bin difference mapped into `(-n/2, n/2]`
pub fn signed_bin_difference(diff: i32, num_angle_bins: i32) -> i32 {
    let d = norm_angle_bin(diff, num_angle_bins);
    if d > num_angle_bins / 2 {
        d - num_angle_bins
    } else {
        d
    }
}

/// Thomas Wang's 32 bit integer hash
pub fn int_hash(key: u32) -> u32 {
    let mut key = key;
    key = key.wrapping_add(key << 12);
    key ^= key >> 22;
    key = key.wrapping_add(key << 4);
    key ^= key >> 9;
    key = key.wrapping_add(key << 10);
    key ^= key >> 2;
    key = key.wrapping_add(key << 7);
    key ^= key >> 12;
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cont_to_disc_rounds() {
        assert_eq!(cont_to_disc(0.0475, 0.02), 2);
        assert_eq!(cont_to_disc(-0.0475, 0.02), -2);
        assert_eq!(cont_to_disc(0.061, 0.02), 3);
        assert_relative_eq!(disc_to_cont(3, 0.02), 0.06, epsilon = 1e-12);
    }

    #[test]
    fn test_angle_bins_wrap() {
        assert_eq!(angle_state_to_cell(0.0, 64), 0);
        assert_eq!(angle_state_to_cell(2.0 * PI, 64), 0);
        assert_eq!(angle_state_to_cell(-PI / 32.0, 64), 63);
        assert_eq!(angle_state_to_cell(PI, 64), 32);
        assert_eq!(norm_angle_bin(-65, 64), 63);
    }

    #[test]
    fn test_signed_bin_difference() {
        assert_eq!(signed_bin_difference(63, 64), -1);
        assert_eq!(signed_bin_difference(32, 64), 32);
        assert_eq!(signed_bin_difference(-3, 64), -3);
        let disc = Discretization::new(0.01, 64, 1024);
        assert_relative_eq!(disc.angle_bin_distance(1, 63), 2.0 * disc.angle_bin_size());
    }

    #[test]
    fn test_int_hash_spreads_neighbors() {
        assert_ne!(int_hash(1), int_hash(2));
        assert_ne!(int_hash(0), int_hash(1));
        assert_eq!(int_hash(12345), int_hash(12345));
    }
}
