//! Geometry Provider capability.
//!
//! The analyzer never parses volume headers itself; any conformant
//! metadata reader can supply the affine transform, voxel geometry,
//! slice timing and first-volume intensities behind this trait. An
//! in-memory implementation backs the test suites.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use mec_core::{ErrorInfo, MecError};

use crate::affine::Affine;
use crate::volume::Volume;

/// Slice-timing metadata used to derive the repetition time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SliceTiming {
    /// Acquisition duration of a single slice, in seconds.
    pub slice_duration: f64,
    /// Number of slices per volume.
    pub slice_count: usize,
}

impl SliceTiming {
    /// Repetition time implied by the header, rounded to milliseconds.
    pub fn repetition_time(&self) -> f64 {
        let tr = self.slice_duration * self.slice_count as f64;
        (tr * 1000.0).round() / 1000.0
    }
}

/// Read access to volume metadata and the first intensity frame.
pub trait VolumeReader {
    /// Spatial transform from voxel indices to physical coordinates.
    fn affine(&self, path: &Path) -> Result<Affine, MecError>;
    /// Voxel dimensions along each axis, in millimeters.
    fn voxel_dims(&self, path: &Path) -> Result<[f64; 3], MecError>;
    /// Slice-timing metadata of the volume.
    fn slice_timing(&self, path: &Path) -> Result<SliceTiming, MecError>;
    /// The first 3D frame of the volume.
    fn first_volume(&self, path: &Path) -> Result<Volume, MecError>;
}

/// One stored volume of the in-memory reader.
#[derive(Debug, Clone)]
pub struct StoredVolume {
    /// Spatial transform of the stored volume.
    pub affine: Affine,
    /// Voxel dimensions in millimeters.
    pub voxel_dims: [f64; 3],
    /// Slice-timing metadata.
    pub slice_timing: SliceTiming,
    /// First intensity frame.
    pub volume: Volume,
}

/// In-memory [`VolumeReader`] keyed by path, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVolumes {
    volumes: BTreeMap<PathBuf, StoredVolume>,
}

impl InMemoryVolumes {
    /// An empty reader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `stored` under `path`, replacing any previous entry.
    pub fn insert(&mut self, path: impl Into<PathBuf>, stored: StoredVolume) {
        self.volumes.insert(path.into(), stored);
    }

    /// Builder-style variant of [`InMemoryVolumes::insert`].
    pub fn with_volume(mut self, path: impl Into<PathBuf>, stored: StoredVolume) -> Self {
        self.insert(path, stored);
        self
    }

    fn lookup(&self, path: &Path) -> Result<&StoredVolume, MecError> {
        self.volumes.get(path).ok_or_else(|| {
            MecError::Geometry(
                ErrorInfo::new("volume_unreadable", "no metadata registered for volume")
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}

impl VolumeReader for InMemoryVolumes {
    fn affine(&self, path: &Path) -> Result<Affine, MecError> {
        Ok(self.lookup(path)?.affine)
    }

    fn voxel_dims(&self, path: &Path) -> Result<[f64; 3], MecError> {
        Ok(self.lookup(path)?.voxel_dims)
    }

    fn slice_timing(&self, path: &Path) -> Result<SliceTiming, MecError> {
        Ok(self.lookup(path)?.slice_timing)
    }

    fn first_volume(&self, path: &Path) -> Result<Volume, MecError> {
        Ok(self.lookup(path)?.volume.clone())
    }
}
