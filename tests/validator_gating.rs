//! Validator gating is total: every illegal configuration is rejected
//! before any stage is emitted.

mod common;

use common::{anat_config, probe_for, two_echo_config};
use mec_core::{EchoTimes, MecError};
use mec_plan::{validate, MaskMode, RunConfiguration, StaticProbe, TOOLKIT_ENV_VARS};
use mec_spec::parse_dataset_spec;

#[test]
fn qwarp_without_target_is_always_rejected() {
    let mut config = anat_config();
    config.qwarp = true;
    let err = validate(&config, &probe_for(&config)).expect_err("gate");
    assert!(matches!(err, MecError::ConflictingOptions(_)));
    assert_eq!(err.info().code, "qwarp_requires_anat_and_target");
}

#[test]
fn qwarp_without_anatomical_is_rejected() {
    let mut config = two_echo_config();
    config.qwarp = true;
    config.normalization_target = Some("MNI_caez_N27+tlrc".to_string());
    let err = validate(&config, &probe_for(&config)).expect_err("gate");
    assert_eq!(err.info().code, "qwarp_requires_anat_and_target");
}

#[test]
fn template_masking_without_anatomical_is_rejected() {
    let mut config = two_echo_config();
    config.mask_mode = MaskMode::Template;
    config.normalization_target = Some("MNI_caez_N27+tlrc".to_string());
    let err = validate(&config, &probe_for(&config)).expect_err("gate");
    assert!(matches!(err, MecError::ConflictingOptions(_)));
    assert_eq!(err.info().code, "mask_mode_requires_anat");
}

#[test]
fn anatomical_masking_without_anatomical_is_rejected() {
    let mut config = two_echo_config();
    config.mask_mode = MaskMode::Anatomical;
    let err = validate(&config, &probe_for(&config)).expect_err("gate");
    assert_eq!(err.info().code, "mask_mode_requires_anat");
}

#[test]
fn echo_count_mismatch_fails_before_any_geometry_is_read() {
    let echo_times = EchoTimes::new(vec![14.5, 38.5, 62.5]).expect("echo times");
    let dataset_spec =
        parse_dataset_spec("rest_e1.nii.gz,rest_e2.nii.gz").expect("dataset spec");
    let config = RunConfiguration::new(echo_times, dataset_spec);
    // The probe has no registered files: a count check that ran after file
    // probing would report a missing dataset instead.
    let err = validate(&config, &StaticProbe::ready()).expect_err("gate");
    assert!(matches!(err, MecError::InvalidSpecification(_)));
    assert_eq!(err.info().code, "echo_count_mismatch");
}

#[test]
fn missing_echo_dataset_is_rejected() {
    let config = two_echo_config();
    let first = config
        .dataset_spec
        .resolve(&config.echo_times, 0)
        .expect("first dataset");
    let probe = StaticProbe::ready().with_file(first);
    let err = validate(&config, &probe).expect_err("gate");
    assert!(matches!(err, MecError::MissingInput(_)));
    assert_eq!(err.info().code, "dataset_missing");
}

#[test]
fn missing_anatomical_is_rejected() {
    let mut config = anat_config();
    config.anatomical = Some("absent_mprage.nii.gz".to_string());
    let mut probe = StaticProbe::ready();
    for echo in 0..config.echo_times.count() {
        let dataset = config
            .dataset_spec
            .resolve(&config.echo_times, echo)
            .expect("dataset");
        probe = probe.with_file(dataset);
    }
    let err = validate(&config, &probe).expect_err("gate");
    assert_eq!(err.info().code, "anatomical_missing");
}

#[test]
fn existing_run_dir_without_overwrite_is_rejected() {
    let config = two_echo_config();
    let run = config.run_name().expect("run");
    let probe = probe_for(&config).with_dir(format!("mec.{run}"));
    let err = validate(&config, &probe).expect_err("gate");
    assert_eq!(err.info().code, "run_dir_exists");
    assert!(err.info().hint.as_deref().unwrap_or("").contains("--OVERWRITE"));
}

#[test]
fn missing_toolkit_environment_is_rejected() {
    let config = two_echo_config();
    let probe = probe_for(&config).without_env(TOOLKIT_ENV_VARS[0]);
    let err = validate(&config, &probe).expect_err("gate");
    assert!(matches!(err, MecError::EnvironmentNotReady(_)));
    assert_eq!(err.info().code, "toolkit_env_missing");
}
