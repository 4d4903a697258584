//! Per-volume geometry summaries.

use std::path::Path;

use serde::{Deserialize, Serialize};

use mec_core::MecError;

use crate::affine::obliquity_degrees;
use crate::provider::VolumeReader;
use crate::volume::center_of_mass;

/// Geometry derived once per referenced volume and reused.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeGeometry {
    /// Angular deviation from plumb, in degrees.
    pub obliquity_deg: f64,
    /// Intensity-weighted centroid in physical coordinates.
    pub center_of_mass: [f64; 3],
    /// Voxel dimensions along each axis, in millimeters.
    pub voxel_dims: [f64; 3],
}

impl VolumeGeometry {
    /// Whether the sampling axes deviate from plumb at all.
    pub fn is_oblique(&self) -> bool {
        self.obliquity_deg != 0.0
    }

    /// Largest voxel dimension, used by the alignment padding heuristic.
    pub fn max_voxel_dim(&self) -> f64 {
        self.voxel_dims.iter().cloned().fold(0.0, f64::max)
    }
}

/// Derives the geometry of the volume at `path` through `reader`.
///
/// Safe to call repeatedly; identical inputs yield identical results.
pub fn analyze_volume(reader: &dyn VolumeReader, path: &Path) -> Result<VolumeGeometry, MecError> {
    let affine = reader.affine(path)?;
    let volume = reader.first_volume(path)?;
    Ok(VolumeGeometry {
        obliquity_deg: obliquity_degrees(&affine),
        center_of_mass: center_of_mass(&volume, &affine),
        voxel_dims: reader.voxel_dims(path)?,
    })
}
