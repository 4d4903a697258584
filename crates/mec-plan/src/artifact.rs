//! Deterministic artifact naming.
//!
//! Every working file a plan touches is addressed by an [`ArtifactId`]
//! built from the run name, an optional echo tag and a stage tag.
//! Per-echo artifacts are tagged `e<index+1>`; run-level artifacts carry
//! the run name; a handful of working names are fixed across runs.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use mec_core::RunName;

/// String key identifying one artifact in a plan's namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Creates an identifier from its string form.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArtifactId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for ArtifactId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Pure naming scheme for one run's artifact namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingScheme {
    run: RunName,
}

impl NamingScheme {
    /// Creates the scheme for `run`.
    pub fn new(run: RunName) -> Self {
        Self { run }
    }

    /// The run this scheme namespaces.
    pub fn run(&self) -> &RunName {
        &self.run
    }

    /// Echo tag for a 0-based echo index (`e1`, `e2`, ...).
    pub fn echo_token(&self, echo: usize) -> String {
        format!("e{}", echo + 1)
    }

    /// Per-echo artifact: `e<index+1>_<tag>`.
    pub fn per_echo(&self, echo: usize, tag: &str) -> ArtifactId {
        ArtifactId::new(format!("{}_{}", self.echo_token(echo), tag))
    }

    /// Per-echo working copy of the raw dataset: `e<index+1>.nii`.
    pub fn echo_copy(&self, echo: usize) -> ArtifactId {
        ArtifactId::new(format!("{}.nii", self.echo_token(echo)))
    }

    /// Run-level artifact: `<run>_<tag>`.
    pub fn run_tagged(&self, tag: &str) -> ArtifactId {
        ArtifactId::new(format!("{}_{}", self.run, tag))
    }

    /// Working directory for the run.
    pub fn run_dir(&self) -> String {
        format!("mec.{}", self.run)
    }

    /// Name of the serialized plan script.
    pub fn script_name(&self) -> String {
        format!("_mec_{}.sh", self.run)
    }
}

/// Spatial-transform path an exported quantity went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarpCode {
    /// Nonlinear normalization into the template space.
    Nonlinear,
    /// Affine normalization into the template space.
    Affine,
    /// Native-space resample against the anatomical grid.
    NativeAnat,
    /// Native-space resample against the functional grid.
    NativeEpi,
}

impl WarpCode {
    /// Short tag appended to exported artifact names.
    pub fn as_str(&self) -> &'static str {
        match self {
            WarpCode::Nonlinear => "nlw",
            WarpCode::Affine => "afw",
            WarpCode::NativeAnat => "nat",
            WarpCode::NativeEpi => "epi",
        }
    }

    /// The shared export mask computed once per warp code.
    pub fn export_mask(&self) -> ArtifactId {
        ArtifactId::new(format!("{}_export_mask.nii", self.as_str()))
    }
}

/// Fixed working artifact names shared by every run.
pub mod fixed {
    /// Motion-correction base frame.
    pub const EBBASE: &str = "eBbase.nii.gz";
    /// Stacked short sub-series of all echoes.
    pub const BASESTACK: &str = "basestack.nii.gz";
    /// Decay-rate map from the mono-exponential fit.
    pub const T2SVM: &str = "t2svm.nii";
    /// Skull-stripped decay-rate map.
    pub const T2SVM_SS: &str = "t2svm_ss.nii.gz";
    /// Intercept map from the mono-exponential fit.
    pub const S0V: &str = "s0v.nii";
    /// Skull-stripped intercept map.
    pub const S0V_SS: &str = "s0v_ss.nii.gz";
    /// Optimally-combined volume.
    pub const OCV: &str = "ocv.nii";
    /// Intensity-unified combined volume.
    pub const OCV_UNI: &str = "ocv_uni+orig";
    /// Skull-stripped combined volume.
    pub const OCV_SS: &str = "ocv_ss.nii.gz";
    /// Motion parameter time series.
    pub const MOTION: &str = "motion.1D";
    /// Functional mask threaded through extended preprocessing.
    pub const EBVRMASK: &str = "eBvrmask.nii.gz";
    /// Grand-mean scaling percentile capture.
    pub const GMS: &str = "gms.1D";
    /// Captured isotropic decomposition voxel size.
    pub const VOXSIZE: &str = "voxsize.1D";
    /// Captured native voxel dimensions.
    pub const VOXDIMS: &str = "voxdims.1D";
    /// Median decay value inside the mask.
    pub const T2S_MED: &str = "t2s_med.1D";
    /// Median intercept value inside the mask.
    pub const S0V_MED: &str = "s0v_med.1D";
    /// Anatomical/template prior reprojected into functional space.
    pub const ANATMASK_EPI: &str = "anatmask_epi.nii.gz";
    /// Autoboxed copy of the normalization template.
    pub const ABTEMPLATE: &str = "abtemplate.nii.gz";
    /// Spatially concatenated multi-echo series.
    pub const ZCAT: &str = "zcat_ffd.nii.gz";
    /// Binary mask of the concatenated series.
    pub const ZCAT_MASK: &str = "zcat_mask.nii.gz";
    /// Mask derived from the decomposition's combined series.
    pub const EXPORT_MASK: &str = "export_mask.nii.gz";
}

/// Output files of the external decomposition tool.
pub mod ted {
    /// Optimally-combined time series.
    pub const TS_OC: &str = "TED/ts_OC.nii";
    /// Denoised time series.
    pub const DN_TS_OC: &str = "TED/dn_ts_OC.nii";
    /// Denoised, T1-corrected time series.
    pub const DN_TS_OC_T1C: &str = "TED/dn_ts_OC_T1c.nii";
    /// Noise-free, T1-corrected time series.
    pub const HIK_TS_OC_T1C: &str = "TED/hik_ts_OC_T1c.nii";
    /// Denoised ICA coefficient set.
    pub const BETAS_HIK_OC: &str = "TED/betas_hik_OC.nii";
    /// Full ICA coefficient set.
    pub const BETAS_OC: &str = "TED/betas_OC.nii";
    /// Z-normalized component maps.
    pub const FEATS_OC2: &str = "TED/feats_OC2.nii";
    /// Component assessment table.
    pub const COMP_TABLE: &str = "TED/comp_table.txt";
    /// Mixing matrix.
    pub const MIX: &str = "TED/meica_mix.1D";
    /// Decomposition cache cleared on resume.
    pub const PCA_CACHE: &str = "TED/pcastate.pklbz";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_echo_names_are_one_based() {
        let scheme = NamingScheme::new(RunName::new("rest_e123"));
        assert_eq!(scheme.per_echo(0, "ts+orig").as_str(), "e1_ts+orig");
        assert_eq!(scheme.per_echo(2, "vr.nii.gz").as_str(), "e3_vr.nii.gz");
    }

    #[test]
    fn run_level_names_carry_the_run() {
        let scheme = NamingScheme::new(RunName::new("rest_e123"));
        assert_eq!(
            scheme.run_tagged("vrmat.aff12.1D").as_str(),
            "rest_e123_vrmat.aff12.1D"
        );
        assert_eq!(scheme.run_dir(), "mec.rest_e123");
        assert_eq!(scheme.script_name(), "_mec_rest_e123.sh");
    }

    #[test]
    fn export_masks_are_per_warp_code() {
        assert_eq!(WarpCode::Nonlinear.export_mask().as_str(), "nlw_export_mask.nii");
        assert_eq!(WarpCode::NativeEpi.export_mask().as_str(), "epi_export_mask.nii");
    }
}
