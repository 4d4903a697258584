//! Explicit per-phase context records.
//!
//! Each compiler phase reads a small record derived once up front instead
//! of ambient local state: timing, obliquity/padding geometry, alignment
//! interpolation settings and the anatomical name chain.

use std::path::Path;

use serde::{Deserialize, Serialize};

use mec_core::{ErrorInfo, MecError};
use mec_geom::{analyze_volume, SliceTiming, VolumeGeometry, VolumeReader};
use mec_spec::parse_name;

use crate::config::{BaseTime, CoregMode, RunConfiguration};

/// Geometry and header timing derived from the referenced volumes.
///
/// Derived once per compile; the compiler is a pure function of the
/// configuration and this summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometrySummary {
    /// First functional echo.
    pub epi: VolumeGeometry,
    /// Anatomical reference, when configured.
    pub anat: Option<VolumeGeometry>,
    /// Slice timing of the first functional echo.
    pub slice_timing: SliceTiming,
}

/// Reads every referenced volume once and summarizes its geometry.
pub fn derive_geometry(
    config: &RunConfiguration,
    reader: &dyn VolumeReader,
) -> Result<GeometrySummary, MecError> {
    let first_echo = config.dataset_spec.resolve(&config.echo_times, 0)?;
    let epi_path = config.start_dir.join(&first_echo);
    let epi = analyze_volume(reader, &epi_path)?;
    let slice_timing = reader.slice_timing(&epi_path)?;
    let anat = match &config.anatomical {
        Some(anat) => Some(analyze_volume(reader, &config.start_dir.join(anat))?),
        None => None,
    };
    Ok(GeometrySummary {
        epi,
        anat,
        slice_timing,
    })
}

/// Repetition time and equilibration offset, resolved to frames.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingContext {
    /// Repetition time in seconds.
    pub tr: f64,
    /// First usable frame index.
    pub base_index: usize,
}

impl TimingContext {
    /// Resolves timing from the override or the header-derived value.
    pub fn derive(config: &RunConfiguration, summary: &GeometrySummary) -> Result<Self, MecError> {
        let tr = match config.tr_override {
            Some(tr) => tr,
            None => summary.slice_timing.repetition_time(),
        };
        if tr <= 0.0 {
            return Err(MecError::Geometry(
                ErrorInfo::new("repetition_time_invalid", "repetition time must be positive")
                    .with_context("tr", tr.to_string())
                    .with_hint("pass an explicit --TR"),
            ));
        }
        let base_index = match config.base_time {
            BaseTime::Volumes(n) => n,
            BaseTime::Seconds(s) => (s / tr).round() as usize,
        };
        Ok(Self { tr, base_index })
    }
}

/// Obliquity flags and the mask padding width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometryContext {
    /// The first functional echo is oblique.
    pub oblique_epi: bool,
    /// The anatomical is oblique.
    pub oblique_anat: bool,
    /// Either referenced volume is oblique.
    pub oblique_mode: bool,
    /// Symmetric zero-padding width for the functional mask, derived from
    /// the anatomical/functional center-of-mass offset; absent without an
    /// anatomical.
    pub zeropad_slabs: Option<i64>,
}

impl GeometryContext {
    /// Derives obliquity flags and padding from the volume summaries.
    pub fn derive(summary: &GeometrySummary) -> Self {
        let oblique_epi = summary.epi.is_oblique();
        let oblique_anat = summary.anat.map(|a| a.is_oblique()).unwrap_or(false);
        let zeropad_slabs = summary.anat.map(|anat| {
            let epi_cm = summary.epi.center_of_mass;
            let anat_cm = anat.center_of_mass;
            let cm_dif = (0..3)
                .map(|axis| (epi_cm[axis] - anat_cm[axis]).abs())
                .fold(0.0, f64::max);
            let max_voxel = summary.epi.max_voxel_dim();
            (cm_dif / max_voxel).trunc().abs() as i64 + 10
        });
        Self {
            oblique_epi,
            oblique_anat,
            oblique_mode: oblique_epi || oblique_anat,
            zeropad_slabs,
        }
    }
}

/// Interpolation settings and resolution argument fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentContext {
    /// Interpolant for intermediate alignment applications.
    pub interp: String,
    /// Interpolant for final resampling.
    pub final_interp: String,
    /// The coregistration is driven by the decay/combined volumes.
    pub t2s_align: bool,
    /// `-mast_dxyz` fragment for alignment applications.
    pub master_fres: String,
    /// `-dxyz` fragment for nonlinear warp applications.
    pub qwarp_fres: String,
}

impl AlignmentContext {
    /// Derives alignment settings from the configuration.
    pub fn derive(config: &RunConfiguration) -> Self {
        let (master_fres, qwarp_fres) = match config.functional_voxel_size {
            Some(fres) => (format!("-mast_dxyz {fres}"), format!("-dxyz {fres}")),
            None => ("-mast_dxyz ${voxsize}".to_string(), "-dxyz ${voxsize}".to_string()),
        };
        Self {
            interp: "cubic".to_string(),
            final_interp: "wsinc5".to_string(),
            t2s_align: config.coreg_mode == CoregMode::LocalPearsonT2s,
            master_fres,
            qwarp_fres,
        }
    }
}

/// Name chain of the anatomical as it moves through preparation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnatContext {
    /// Anatomical filename as configured.
    pub raw: String,
    /// Filename prefix of the configured anatomical.
    pub prefix: String,
    /// Deobliqued anatomical, or the raw file when plumb.
    pub deobliqued: String,
    /// Skull-stripped anatomical, or its input when already stripped.
    pub stripped: String,
    /// Filename prefix of the skull-stripped anatomical.
    pub stripped_prefix: String,
    /// Affine-normalized anatomical cached in the start directory.
    pub affine_warped: String,
    /// Nonlinearly-normalized anatomical cached in the start directory.
    pub nonlinear_warped: String,
    /// Warp field emitted alongside the nonlinear normalization.
    pub nonlinear_warp_field: String,
}

impl AnatContext {
    /// Derives the anatomical name chain.
    pub fn derive(config: &RunConfiguration, geometry: &GeometryContext) -> Option<Self> {
        let raw = config.anatomical.clone()?;
        let file_name = Path::new(&raw)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| raw.clone());
        let prefix = parse_name(&file_name).prefix;
        let deobliqued = if geometry.oblique_mode {
            format!("{prefix}_do.nii.gz")
        } else {
            raw.clone()
        };
        let stripped = if config.anat_stripped {
            raw.clone()
        } else {
            format!("{prefix}_ns.nii.gz")
        };
        let stripped_prefix = parse_name(&stripped).prefix;
        let affine_warped = format!("{stripped_prefix}_at.nii.gz");
        let nonlinear_warped = format!("{stripped_prefix}_atnl.nii.gz");
        let nonlinear_warp_field = format!("{stripped_prefix}_atnl_WARP.nii.gz");
        Some(Self {
            raw,
            prefix,
            deobliqued,
            stripped,
            stripped_prefix,
            affine_warped,
            nonlinear_warped,
            nonlinear_warp_field,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(epi_cm: [f64; 3], anat_cm: Option<[f64; 3]>) -> GeometrySummary {
        let epi = VolumeGeometry {
            obliquity_deg: 0.0,
            center_of_mass: epi_cm,
            voxel_dims: [3.0, 3.0, 3.5],
        };
        let anat = anat_cm.map(|cm| VolumeGeometry {
            obliquity_deg: 0.0,
            center_of_mass: cm,
            voxel_dims: [1.0, 1.0, 1.0],
        });
        GeometrySummary {
            epi,
            anat,
            slice_timing: SliceTiming {
                slice_duration: 0.08,
                slice_count: 25,
            },
        }
    }

    #[test]
    fn padding_follows_the_center_of_mass_offset() {
        let summary = summary([0.0, 0.0, 0.0], Some([7.2, -21.3, 3.0]));
        let geometry = GeometryContext::derive(&summary);
        // Largest offset 21.3 over max voxel 3.5 truncates to 6.
        assert_eq!(geometry.zeropad_slabs, Some(16));
    }

    #[test]
    fn padding_is_absent_without_an_anatomical() {
        let geometry = GeometryContext::derive(&summary([0.0, 0.0, 0.0], None));
        assert_eq!(geometry.zeropad_slabs, None);
        assert!(!geometry.oblique_mode);
    }

    #[test]
    fn seconds_offsets_round_to_frames() {
        let mut config = crate::test_fixtures::two_echo_config();
        config.base_time = BaseTime::Seconds(4.1);
        let timing =
            TimingContext::derive(&config, &summary([0.0; 3], None)).expect("timing");
        assert!((timing.tr - 2.0).abs() < 1e-9);
        assert_eq!(timing.base_index, 2);
    }
}
