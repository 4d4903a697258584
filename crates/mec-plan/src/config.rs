//! Run configuration.
//!
//! A [`RunConfiguration`] is built once from a validated option set and
//! never mutated. Mode selectors are closed enumerations resolved at
//! configuration build time, so no downstream code re-checks raw tokens.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use mec_core::{EchoTimes, ErrorInfo, MecError, RunName};
use mec_spec::DatasetSpec;

/// Canonical template used when normalization is requested by shorthand.
pub const MNI_TEMPLATE: &str = "MNI_caez_N27+tlrc";

fn options_error(code: &str, message: impl Into<String>) -> MecError {
    MecError::ConflictingOptions(ErrorInfo::new(code, message.into()))
}

/// Steady-state equilibration offset before the first usable frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "kebab-case")]
pub enum BaseTime {
    /// Offset expressed as a frame count.
    Volumes(usize),
    /// Offset expressed in seconds, converted via the repetition time.
    Seconds(f64),
}

impl Default for BaseTime {
    fn default() -> Self {
        BaseTime::Volumes(0)
    }
}

impl FromStr for BaseTime {
    type Err = MecError;

    /// Parses `4v`, `12.5s`, or a bare volume count.
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        let malformed = || {
            MecError::InvalidSpecification(
                ErrorInfo::new(
                    "base_time_malformed",
                    format!("'{token}' is not a volume count (Nv) or seconds (Ns) offset"),
                )
                .with_hint("examples: 4v, 12.5s"),
            )
        };
        if let Some(volumes) = token.strip_suffix('v') {
            return volumes.parse::<usize>().map(BaseTime::Volumes).map_err(|_| malformed());
        }
        if let Some(seconds) = token.strip_suffix('s') {
            return seconds.parse::<f64>().map(BaseTime::Seconds).map_err(|_| malformed());
        }
        token.parse::<usize>().map(BaseTime::Volumes).map_err(|_| malformed())
    }
}

/// Functional masking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaskMode {
    /// Mask from the functional data alone.
    #[default]
    Functional,
    /// Refine the functional mask with the anatomical.
    Anatomical,
    /// Refine the functional mask with the normalization template.
    Template,
}

impl FromStr for MaskMode {
    type Err = MecError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "func" => Ok(MaskMode::Functional),
            "anat" => Ok(MaskMode::Anatomical),
            "template" => Ok(MaskMode::Template),
            other => Err(options_error(
                "mask_mode_unrecognized",
                format!("mask mode '{other}' is not recognized (func, anat, template)"),
            )),
        }
    }
}

/// Anatomical-functional coregistration strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoregMode {
    /// Local-Pearson alignment driven by the decay and combined volumes.
    #[default]
    LocalPearsonT2s,
    /// Edge-based alignment via the external alignment script.
    EdgeBased,
}

impl FromStr for CoregMode {
    type Err = MecError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token {
            "lp-t2s" => Ok(CoregMode::LocalPearsonT2s),
            "aea" => Ok(CoregMode::EdgeBased),
            other => Err(options_error(
                "coreg_mode_unrecognized",
                format!("coregistration mode '{other}' is not recognized (lp-t2s, aea)"),
            )),
        }
    }
}

/// Terminal compiler modes; each produces a well-defined plan prefix or
/// suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompilerMode {
    /// Preprocess, decompose and export.
    #[default]
    Full,
    /// Stop after spatial concatenation.
    PreprocOnly,
    /// Re-run the decomposition against existing preprocessed data.
    DecompositionOnly,
    /// Re-run component selection against a fixed mixing matrix.
    SelectionOnly,
    /// Export existing decomposition results only.
    ExportOnly,
}

/// Base frame selection for volume registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum AlignBase {
    /// Explicit frame index into the motion-correction input.
    Frame(usize),
    /// External base volume supplied by the caller.
    External(String),
}

impl FromStr for AlignBase {
    type Err = MecError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
            token.parse().map(AlignBase::Frame).map_err(|_| {
                MecError::InvalidSpecification(ErrorInfo::new(
                    "align_base_malformed",
                    format!("'{token}' is not a usable frame index"),
                ))
            })
        } else {
            Ok(AlignBase::External(token.to_string()))
        }
    }
}

fn default_source_tes() -> String {
    "-1".to_string()
}

fn default_kdaw() -> String {
    "10".to_string()
}

fn default_rdaw() -> String {
    "1".to_string()
}

fn default_cost() -> String {
    "tanh".to_string()
}

fn default_conv() -> String {
    "2.5e-5".to_string()
}

/// Pass-through tuning for the external decomposition tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompositionOpts {
    /// Seed-echo hint forwarded as `--sourceTEs`.
    #[serde(default = "default_source_tes")]
    pub source_tes: String,
    /// Kappa dimensionality-augmentation weight.
    #[serde(default = "default_kdaw")]
    pub kdaw: String,
    /// Rho dimensionality-augmentation weight.
    #[serde(default = "default_rdaw")]
    pub rdaw: String,
    /// Optimizer cost function for initial iterations.
    #[serde(default = "default_cost")]
    pub initcost: String,
    /// Optimizer cost function for final iterations.
    #[serde(default = "default_cost")]
    pub finalcost: String,
    /// Convergence tolerance.
    #[serde(default = "default_conv")]
    pub convergence: String,
    /// Free-form extra arguments appended verbatim.
    #[serde(default)]
    pub extra_args: String,
}

impl Default for DecompositionOpts {
    fn default() -> Self {
        Self {
            source_tes: default_source_tes(),
            kdaw: default_kdaw(),
            rdaw: default_rdaw(),
            initcost: default_cost(),
            finalcost: default_cost(),
            convergence: default_conv(),
            extra_args: String::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cpus() -> usize {
    2
}

/// Fully-resolved configuration of one compile call.
///
/// Built once from a validated option set; the compiler only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfiguration {
    /// Ordered echo times in milliseconds.
    pub echo_times: EchoTimes,
    /// Dataset specification in shorthand or longhand form.
    pub dataset_spec: DatasetSpec,
    /// Optional anatomical reference, relative to `start_dir`.
    #[serde(default)]
    pub anatomical: Option<String>,
    /// Steady-state equilibration offset.
    #[serde(default)]
    pub base_time: BaseTime,
    /// Normalization template path, if normalization is requested.
    #[serde(default)]
    pub normalization_target: Option<String>,
    /// Coregistration strategy.
    #[serde(default)]
    pub coreg_mode: CoregMode,
    /// Masking strategy.
    #[serde(default)]
    pub mask_mode: MaskMode,
    /// Nonlinear warp into the template space.
    #[serde(default)]
    pub qwarp: bool,
    /// Also export native-space results alongside normalized ones.
    #[serde(default)]
    pub native: bool,
    /// Isotropic functional voxel size override, in millimeters.
    #[serde(default)]
    pub functional_voxel_size: Option<f64>,
    /// The anatomical is already intensity-normalized and skull-stripped.
    #[serde(default)]
    pub anat_stripped: bool,
    /// De-spike functional data.
    #[serde(default = "default_true")]
    pub despike: bool,
    /// Re-write datasets in axial-first order.
    #[serde(default = "default_true")]
    pub axialize: bool,
    /// Explicit base for volume registration.
    #[serde(default)]
    pub align_base: Option<AlignBase>,
    /// Repetition time override, in seconds; read from the header when
    /// absent.
    #[serde(default)]
    pub tr_override: Option<f64>,
    /// Slice-timing pattern override.
    #[serde(default)]
    pub tpattern: Option<String>,
    /// Smoothing kernel width token (e.g. `3mm`); no smoothing when
    /// absent.
    #[serde(default)]
    pub smoothing: Option<String>,
    /// Detrend polynomial order.
    #[serde(default)]
    pub detrend: Option<u32>,
    /// Highpass cutoff in Hz.
    #[serde(default)]
    pub highpass: Option<f64>,
    /// Resume from the normalization step, reusing prior preprocessing.
    #[serde(default)]
    pub resume: bool,
    /// Overwrite an existing run directory.
    #[serde(default)]
    pub overwrite: bool,
    /// Keep preprocessing intermediates.
    #[serde(default)]
    pub keep_intermediates: bool,
    /// Align and preprocess one echo, then stop (smoke test).
    #[serde(default)]
    pub smoke_test: bool,
    /// Terminal compiler mode.
    #[serde(default)]
    pub mode: CompilerMode,
    /// Strict component selection.
    #[serde(default)]
    pub strict: bool,
    /// Prefix for final output datasets; run name when empty.
    #[serde(default)]
    pub prefix: String,
    /// Label appended to the run name.
    #[serde(default)]
    pub label: String,
    /// OpenMP thread count stamped into the plan environment.
    #[serde(default = "default_cpus")]
    pub cpus: usize,
    /// Extra arguments for the coregistration routine.
    #[serde(default)]
    pub align_args: String,
    /// Decomposition tool tuning.
    #[serde(default)]
    pub decomposition: DecompositionOpts,
    /// Invocation directory all relative inputs resolve against.
    #[serde(default)]
    pub start_dir: PathBuf,
}

impl RunConfiguration {
    /// Creates a configuration with default options for the given inputs.
    pub fn new(echo_times: EchoTimes, dataset_spec: DatasetSpec) -> Self {
        Self {
            echo_times,
            dataset_spec,
            anatomical: None,
            base_time: BaseTime::default(),
            normalization_target: None,
            coreg_mode: CoregMode::default(),
            mask_mode: MaskMode::default(),
            qwarp: false,
            native: false,
            functional_voxel_size: None,
            anat_stripped: false,
            despike: true,
            axialize: true,
            align_base: None,
            tr_override: None,
            tpattern: None,
            smoothing: None,
            detrend: None,
            highpass: None,
            resume: false,
            overwrite: false,
            keep_intermediates: false,
            smoke_test: false,
            mode: CompilerMode::default(),
            strict: false,
            prefix: String::new(),
            label: String::new(),
            cpus: default_cpus(),
            align_args: String::new(),
            decomposition: DecompositionOpts::default(),
            start_dir: PathBuf::new(),
        }
    }

    /// Canonical run name: the dataset-derived name plus the label.
    pub fn run_name(&self) -> Result<RunName, MecError> {
        let base = self.dataset_spec.run_name(&self.echo_times)?;
        if self.label.is_empty() {
            Ok(base)
        } else {
            Ok(base.with_label(&self.label))
        }
    }

    /// Prefix under which final outputs are exported.
    pub fn output_prefix(&self) -> Result<String, MecError> {
        if self.prefix.is_empty() {
            Ok(self.run_name()?.to_string())
        } else {
            Ok(self.prefix.clone())
        }
    }

    /// Whether the nonlinear-warp export path is in effect.
    pub fn qwarp_valid(&self) -> bool {
        self.qwarp && self.anatomical.is_some() && self.normalization_target.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_time_parses_all_three_forms() {
        assert_eq!("4v".parse::<BaseTime>().expect("volumes"), BaseTime::Volumes(4));
        assert_eq!("12.5s".parse::<BaseTime>().expect("seconds"), BaseTime::Seconds(12.5));
        assert_eq!("0".parse::<BaseTime>().expect("bare"), BaseTime::Volumes(0));
        assert!("steady".parse::<BaseTime>().is_err());
    }

    #[test]
    fn mode_tokens_resolve_once() {
        assert_eq!("func".parse::<MaskMode>().expect("func"), MaskMode::Functional);
        assert_eq!("template".parse::<MaskMode>().expect("template"), MaskMode::Template);
        let err = "skull".parse::<MaskMode>().expect_err("unknown token");
        assert_eq!(err.info().code, "mask_mode_unrecognized");
        assert_eq!("aea".parse::<CoregMode>().expect("aea"), CoregMode::EdgeBased);
        assert!("edge".parse::<CoregMode>().is_err());
    }

    #[test]
    fn align_base_distinguishes_frames_from_files() {
        assert_eq!("12".parse::<AlignBase>().expect("frame"), AlignBase::Frame(12));
        assert_eq!(
            "base.nii.gz".parse::<AlignBase>().expect("file"),
            AlignBase::External("base.nii.gz".to_string())
        );
    }
}
