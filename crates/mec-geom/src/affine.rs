//! Spatial transforms and obliquity.

use serde::{Deserialize, Serialize};

/// Row-major 4x4 homogeneous transform from voxel indices to physical
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine(pub [[f64; 4]; 4]);

impl Affine {
    /// The identity transform.
    pub fn identity() -> Self {
        let mut rows = [[0.0; 4]; 4];
        for (i, row) in rows.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        Self(rows)
    }

    /// An axis-aligned transform with the given voxel scales and origin.
    pub fn scaled(scales: [f64; 3], origin: [f64; 3]) -> Self {
        let mut affine = Self::identity();
        for i in 0..3 {
            affine.0[i][i] = scales[i];
            affine.0[i][3] = origin[i];
        }
        affine
    }

    /// The 3x3 linear part (rotation, scale, shear).
    pub fn linear(&self) -> [[f64; 3]; 3] {
        let mut out = [[0.0; 3]; 3];
        for i in 0..3 {
            out[i].copy_from_slice(&self.0[i][..3]);
        }
        out
    }
}

/// Angular deviation of the sampling axes from plumb, in degrees.
///
/// For each column of the linear part, the largest absolute entry is
/// compared against the column's Euclidean norm; the smallest such ratio
/// is the figure of merit in [0, 1] and the angle is its arccosine. A
/// perfectly axis-aligned transform yields 0.
pub fn obliquity_degrees(affine: &Affine) -> f64 {
    let linear = affine.linear();
    let mut fig_merit = f64::INFINITY;
    for col in 0..3 {
        let mut norm_sq = 0.0;
        let mut max_abs = 0.0f64;
        for row in linear.iter() {
            let entry = row[col];
            norm_sq += entry * entry;
            max_abs = max_abs.max(entry.abs());
        }
        let norm = norm_sq.sqrt();
        if norm > 0.0 {
            fig_merit = fig_merit.min(max_abs / norm);
        }
    }
    if !fig_merit.is_finite() {
        return 0.0;
    }
    fig_merit.clamp(0.0, 1.0).acos().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotated_z(degrees: f64) -> Affine {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let mut affine = Affine::identity();
        affine.0[0][0] = cos;
        affine.0[0][1] = -sin;
        affine.0[1][0] = sin;
        affine.0[1][1] = cos;
        affine
    }

    #[test]
    fn identity_is_plumb() {
        assert!(obliquity_degrees(&Affine::identity()).abs() < 1e-9);
    }

    #[test]
    fn scaled_axis_aligned_transform_is_plumb() {
        let affine = Affine::scaled([3.0, 3.0, 3.5], [-90.0, -126.0, -72.0]);
        assert!(obliquity_degrees(&affine).abs() < 1e-9);
    }

    #[test]
    fn thirty_degree_rotation_is_detected() {
        let angle = obliquity_degrees(&rotated_z(30.0));
        assert!((angle - 30.0).abs() < 1e-6, "got {angle}");
    }
}
