//! Volume geometry analysis for MEC.
//!
//! Computes obliquity and center of mass from a volume's spatial
//! transform and first intensity frame, behind a provider capability so
//! any conformant metadata reader can supply the raw values.

pub mod affine;
pub mod analyze;
pub mod provider;
pub mod volume;

pub use affine::{obliquity_degrees, Affine};
pub use analyze::{analyze_volume, VolumeGeometry};
pub use provider::{InMemoryVolumes, SliceTiming, StoredVolume, VolumeReader};
pub use volume::{center_of_mass, Volume};
