//! Volume intensity grids and center-of-mass derivation.

use serde::{Deserialize, Serialize};

use mec_core::{ErrorInfo, MecError};

use crate::affine::Affine;

fn geometry_error(code: &str, message: impl Into<String>) -> MecError {
    MecError::Geometry(ErrorInfo::new(code, message.into()))
}

/// A single 3D intensity frame.
///
/// Time series are reduced to their first frame before construction; the
/// analyzer never looks past the first volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    data: Vec<f64>,
    shape: [usize; 3],
}

impl Volume {
    /// Builds a volume from row-major data (`i` fastest) and its shape.
    pub fn new(data: Vec<f64>, shape: [usize; 3]) -> Result<Self, MecError> {
        let expected = shape[0] * shape[1] * shape[2];
        if data.len() != expected {
            return Err(geometry_error(
                "volume_shape_mismatch",
                format!("{} intensities do not fill a {:?} grid", data.len(), shape),
            ));
        }
        Ok(Self { data, shape })
    }

    /// A volume of constant intensity.
    pub fn constant(value: f64, shape: [usize; 3]) -> Self {
        Self {
            data: vec![value; shape[0] * shape[1] * shape[2]],
            shape,
        }
    }

    /// Grid shape as (i, j, k) extents.
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Intensity at voxel (i, j, k).
    pub fn value(&self, i: usize, j: usize, k: usize) -> f64 {
        self.data[i + self.shape[0] * (j + self.shape[1] * k)]
    }

    fn intensity_sum(&self) -> f64 {
        self.data.iter().sum()
    }
}

/// Intensity-weighted centroid of `volume` in physical coordinates.
///
/// Each axis is weighted independently: the voxel-space centroid is the
/// intensity-weighted mean index per axis, falling back to the geometric
/// grid center when the intensity sum is not positive. Conversion to
/// physical space follows the toolkit's convention: the first two affine
/// rows are sign-flipped, rows are reordered so each original axis maps
/// to the row carrying its maximum absolute weight, coordinates are
/// `translation + index * diagonal scale`, and the result is permuted
/// back to original axis order.
pub fn center_of_mass(volume: &Volume, affine: &Affine) -> [f64; 3] {
    let shape = volume.shape();
    let total = volume.intensity_sum();

    let mut cm = [0.0f64; 3];
    if total > 0.0 {
        let mut weighted = [0.0f64; 3];
        for k in 0..shape[2] {
            for j in 0..shape[1] {
                for i in 0..shape[0] {
                    let value = volume.value(i, j, k);
                    weighted[0] += i as f64 * value;
                    weighted[1] += j as f64 * value;
                    weighted[2] += k as f64 * value;
                }
            }
        }
        for axis in 0..3 {
            cm[axis] = weighted[axis] / total;
        }
    } else {
        for axis in 0..3 {
            cm[axis] = 0.5 * (shape[axis] as f64 - 1.0);
        }
    }

    // Flip the first two rows to match the toolkit's physical-space
    // convention, then reindex rows by dominant axis.
    let mut flipped = affine.0;
    for row in flipped.iter_mut().take(2) {
        for entry in row.iter_mut() {
            *entry = -*entry;
        }
    }

    let mut orient = [0usize; 3];
    for (col, slot) in orient.iter_mut().enumerate() {
        let mut best_row = 0;
        let mut best = f64::NEG_INFINITY;
        for (row, values) in flipped.iter().enumerate().take(3) {
            let weight = values[col].abs();
            if weight > best {
                best = weight;
                best_row = row;
            }
        }
        *slot = best_row;
    }

    let mut physical = [0.0f64; 3];
    for axis in 0..3 {
        let row = flipped[orient[axis]];
        physical[axis] = row[3] + cm[axis] * row[axis];
    }

    // Undo the reindexing so coordinates come back in original axis order.
    let mut out = [0.0f64; 3];
    for axis in 0..3 {
        let source = orient.iter().position(|&o| o == axis).unwrap_or(axis);
        out[axis] = physical[source];
    }
    out
}
