//! Pre-compilation option validation.
//!
//! Runs before any stage is emitted; any failure aborts the compile call
//! with no partial plan. Filesystem and environment access goes through
//! the [`Probe`] capability so validation stays testable without touching
//! the real system.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use mec_core::{ErrorInfo, MecError};

use crate::config::{MaskMode, RunConfiguration};

/// Environment variables the external toolkit requires.
pub const TOOLKIT_ENV_VARS: &[&str] = &["AFNIDIR"];

/// Read access to the filesystem and process environment.
pub trait Probe {
    /// Whether a file exists at `path`.
    fn file_exists(&self, path: &Path) -> bool;
    /// Value of the environment variable `name`, if set.
    fn env_var(&self, name: &str) -> Option<String>;
    /// Whether a directory named `dir` exists under the start directory.
    fn dir_exists(&self, dir: &Path) -> bool;
}

/// Probe backed by the real filesystem and environment.
#[derive(Debug, Default)]
pub struct SystemProbe;

impl Probe for SystemProbe {
    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn env_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn dir_exists(&self, dir: &Path) -> bool {
        dir.is_dir()
    }
}

/// In-memory probe for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    files: BTreeSet<PathBuf>,
    env: BTreeMap<String, String>,
    dirs: BTreeSet<PathBuf>,
}

impl StaticProbe {
    /// A probe with the toolkit environment present and nothing on disk.
    pub fn ready() -> Self {
        let mut probe = Self::default();
        for name in TOOLKIT_ENV_VARS {
            probe.env.insert(name.to_string(), "/opt/toolkit".to_string());
        }
        probe
    }

    /// Registers an existing file.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.insert(path.into());
        self
    }

    /// Registers an existing directory.
    pub fn with_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.dirs.insert(path.into());
        self
    }

    /// Sets an environment variable.
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// Removes an environment variable.
    pub fn without_env(mut self, name: &str) -> Self {
        self.env.remove(name);
        self
    }
}

impl Probe for StaticProbe {
    fn file_exists(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    fn env_var(&self, name: &str) -> Option<String> {
        self.env.get(name).cloned()
    }

    fn dir_exists(&self, dir: &Path) -> bool {
        self.dirs.contains(dir)
    }
}

/// Cross-checks a fully-resolved configuration.
///
/// Every rule must hold; the first violation is returned as a specific
/// diagnostic naming the violated rule.
pub fn validate(config: &RunConfiguration, probe: &dyn Probe) -> Result<(), MecError> {
    config.dataset_spec.validate(&config.echo_times)?;

    for echo in 0..config.echo_times.count() {
        let dataset = config.dataset_spec.resolve(&config.echo_times, echo)?;
        let path = config.start_dir.join(&dataset);
        if !probe.file_exists(&path) {
            return Err(MecError::MissingInput(
                ErrorInfo::new("dataset_missing", "cannot find an input dataset")
                    .with_context("dataset", dataset)
                    .with_context("echo", (echo + 1).to_string()),
            ));
        }
    }

    if let Some(anat) = &config.anatomical {
        let path = config.start_dir.join(anat);
        if !probe.file_exists(&path) {
            return Err(MecError::MissingInput(
                ErrorInfo::new("anatomical_missing", "cannot find the anatomical dataset")
                    .with_context("anatomical", anat.clone()),
            ));
        }
    }

    let run_dir = config.start_dir.join(format!("mec.{}", config.run_name()?));
    let run_dir_present = probe.dir_exists(&run_dir);
    if run_dir_present && !config.overwrite && !config.resume {
        return Err(MecError::ConflictingOptions(
            ErrorInfo::new("run_dir_exists", "a run directory for this acquisition already exists")
                .with_context("directory", run_dir.display().to_string())
                .with_hint("pass --OVERWRITE to replace it, or --RESUME to continue it"),
        ));
    }
    if config.resume && !run_dir_present {
        return Err(MecError::MissingInput(
            ErrorInfo::new("resume_dir_missing", "cannot resume without a prior run directory")
                .with_context("directory", run_dir.display().to_string()),
        ));
    }

    for name in TOOLKIT_ENV_VARS {
        if probe.env_var(name).is_none() {
            return Err(MecError::EnvironmentNotReady(
                ErrorInfo::new("toolkit_env_missing", "toolkit environment variable is not set")
                    .with_context("variable", name.to_string())
                    .with_hint("point it at the local toolkit installation"),
            ));
        }
    }

    if config.qwarp && !(config.anatomical.is_some() && config.normalization_target.is_some()) {
        return Err(MecError::ConflictingOptions(
            ErrorInfo::new(
                "qwarp_requires_anat_and_target",
                "nonlinear normalization needs both an anatomical and a template",
            )
            .with_hint("supply -a and --space (or --MNI) together with --qwarp"),
        ));
    }

    if config.mask_mode != MaskMode::Functional && config.anatomical.is_none() {
        return Err(MecError::ConflictingOptions(
            ErrorInfo::new(
                "mask_mode_requires_anat",
                "anatomical-assisted masking needs an anatomical",
            )
            .with_context("mask_mode", format!("{:?}", config.mask_mode)),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MaskMode;
    use crate::test_fixtures::two_echo_config;

    fn probe_with_datasets(config: &RunConfiguration) -> StaticProbe {
        let mut probe = StaticProbe::ready();
        for echo in 0..config.echo_times.count() {
            let dataset = config
                .dataset_spec
                .resolve(&config.echo_times, echo)
                .expect("dataset");
            probe = probe.with_file(config.start_dir.join(dataset));
        }
        probe
    }

    #[test]
    fn accepts_a_complete_two_echo_setup() {
        let config = two_echo_config();
        let probe = probe_with_datasets(&config);
        validate(&config, &probe).expect("valid");
    }

    #[test]
    fn missing_dataset_is_fatal() {
        let config = two_echo_config();
        let probe = StaticProbe::ready();
        let err = validate(&config, &probe).expect_err("missing dataset");
        assert_eq!(err.info().code, "dataset_missing");
    }

    #[test]
    fn qwarp_without_target_is_rejected() {
        let mut config = two_echo_config();
        config.anatomical = Some("mprage.nii.gz".to_string());
        config.qwarp = true;
        let probe = probe_with_datasets(&config).with_file("mprage.nii.gz");
        let err = validate(&config, &probe).expect_err("qwarp gate");
        assert_eq!(err.info().code, "qwarp_requires_anat_and_target");
    }

    #[test]
    fn template_masking_without_anat_is_rejected() {
        let mut config = two_echo_config();
        config.mask_mode = MaskMode::Template;
        config.normalization_target = Some("MNI_caez_N27+tlrc".to_string());
        let probe = probe_with_datasets(&config);
        let err = validate(&config, &probe).expect_err("mask gate");
        assert_eq!(err.info().code, "mask_mode_requires_anat");
    }

    #[test]
    fn existing_run_dir_requires_overwrite() {
        let config = two_echo_config();
        let run_dir = format!("mec.{}", config.run_name().expect("run"));
        let probe = probe_with_datasets(&config).with_dir(run_dir.clone());
        let err = validate(&config, &probe).expect_err("dir gate");
        assert_eq!(err.info().code, "run_dir_exists");

        let mut overwrite = config.clone();
        overwrite.overwrite = true;
        let probe = probe_with_datasets(&overwrite).with_dir(run_dir);
        validate(&overwrite, &probe).expect("overwrite allowed");
    }

    #[test]
    fn resume_needs_a_prior_run_dir() {
        let mut config = two_echo_config();
        config.resume = true;
        let probe = probe_with_datasets(&config);
        let err = validate(&config, &probe).expect_err("resume gate");
        assert_eq!(err.info().code, "resume_dir_missing");
    }

    #[test]
    fn system_probe_reads_the_real_filesystem() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("rest_e1.nii.gz");
        std::fs::write(&file, b"stub").expect("write stub");
        let probe = SystemProbe;
        assert!(probe.file_exists(&file));
        assert!(!probe.file_exists(&dir.path().join("absent.nii.gz")));
        assert!(probe.dir_exists(dir.path()));
        assert!(!probe.dir_exists(&file));
    }

    #[test]
    fn toolkit_environment_is_required() {
        let config = two_echo_config();
        let probe = probe_with_datasets(&config).without_env(TOOLKIT_ENV_VARS[0]);
        let err = validate(&config, &probe).expect_err("env gate");
        assert_eq!(err.info().code, "toolkit_env_missing");
    }
}
