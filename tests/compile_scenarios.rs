//! End-to-end scenarios over the compiled stage sequence.

mod common;

use common::{anat_config, summary_for, two_echo_config};
use mec_core::MecError;
use mec_plan::{compile, CompilerMode, Plan};

fn lines_of(plan: &Plan) -> Vec<String> {
    plan.script_lines()
}

#[test]
fn two_echo_default_run_exports_native_epi_space() {
    let config = two_echo_config();
    let plan = compile(&config, &summary_for(&config)).expect("compile");
    let lines = lines_of(&plan);

    // No anatomical preparation stages.
    assert!(!lines.iter().any(|l| l.contains("3dSkullStrip -shrink_fac_bot_lim")));
    assert!(!lines.iter().any(|l| l.contains("align_epi_anat.py")));
    assert!(!lines.iter().any(|l| l.contains("@auto_tlrc")));

    // Export path resolves to the native functional resample.
    assert!(lines.iter().any(|l| l.contains("epi_export_mask.nii")));
    assert!(lines.iter().any(|l| l.contains("_epi.nii")));
    assert!(!lines.iter().any(|l| l.contains("_afw.nii")));
    assert!(!lines.iter().any(|l| l.contains("_nlw.nii")));
}

#[test]
fn qwarp_run_computes_the_nonlinear_warp_exactly_once() {
    let mut config = anat_config();
    config.normalization_target = Some("MNI_caez_N27+tlrc".to_string());
    config.qwarp = true;
    let plan = compile(&config, &summary_for(&config)).expect("compile");
    let lines = lines_of(&plan);

    let qwarp_stages = plan.stages().filter(|s| s.command() == "3dQwarp").count();
    assert_eq!(qwarp_stages, 1);

    // All seven quantities export through the nonlinear warp code, but the
    // shared export mask is warped only once.
    let quantity_exports = lines.iter().filter(|l| l.contains("-interp wsinc5 -prefix") && l.contains("_nlw.nii")).count();
    assert_eq!(quantity_exports, 7);
    let mask_warps = lines
        .iter()
        .filter(|l| l.contains("-prefix nlw_export_mask.nii"))
        .count();
    assert_eq!(mask_warps, 1);
    assert!(!lines.iter().any(|l| l.contains("_afw.nii")));
}

#[test]
fn qwarp_without_target_never_produces_a_plan() {
    let mut config = anat_config();
    config.qwarp = true;
    let err = compile(&config, &summary_for(&config)).expect_err("conflicting options");
    assert!(matches!(err, MecError::ConflictingOptions(_)));
}

#[test]
fn resume_plan_begins_at_the_resume_boundary() {
    let mut config = anat_config();
    config.normalization_target = Some("MNI_caez_N27+tlrc".to_string());
    config.resume = true;
    let plan = compile(&config, &summary_for(&config)).expect("compile");
    plan.verify_ordering().expect("ordering");
    let lines = lines_of(&plan);

    // Setup, ingestion and the motion baseline are omitted.
    assert!(!lines.iter().any(|l| l.starts_with("mkdir")));
    assert!(!lines.iter().any(|l| l.starts_with("3dvolreg")));
    assert!(!lines.iter().any(|l| l.starts_with("3dDespike")));
    assert!(!lines.iter().any(|l| l.starts_with("t2smap")));

    // The plan opens at the boundary and clears the decomposition cache.
    assert!(lines[0].contains("Resume"));
    assert!(lines.iter().any(|l| l.contains("AFNI_DECONFLICT=OVERWRITE")));
    assert!(lines.iter().any(|l| l.contains("rm -f TED/pcastate.pklbz")));

    // Prior preprocessing products are assumed to exist.
    assert!(plan.externals().iter().any(|a| a.as_str() == "eBbase.nii.gz"));
}

#[test]
fn preproc_only_plans_stop_before_the_decomposition() {
    let mut config = two_echo_config();
    config.mode = CompilerMode::PreprocOnly;
    let plan = compile(&config, &summary_for(&config)).expect("compile");
    let lines = lines_of(&plan);
    assert!(!lines.iter().any(|l| l.starts_with("tedana")));
    assert!(!lines.iter().any(|l| l.contains("export_mask")));
    assert!(lines.iter().any(|l| l.contains("zcat_ffd.nii.gz")));
}

#[test]
fn selection_only_plans_reuse_the_fixed_mixing_matrix() {
    let mut config = two_echo_config();
    config.mode = CompilerMode::SelectionOnly;
    let plan = compile(&config, &summary_for(&config)).expect("compile");
    plan.verify_ordering().expect("ordering");
    let lines = lines_of(&plan);
    let tedana_lines: Vec<&String> = lines.iter().filter(|l| l.starts_with("tedana")).collect();
    assert_eq!(tedana_lines.len(), 1);
    assert!(tedana_lines[0].contains("--mix=meica_mix.1D"));
}

#[test]
fn decomposition_only_plans_skip_preprocessing() {
    let mut config = two_echo_config();
    config.mode = CompilerMode::DecompositionOnly;
    let plan = compile(&config, &summary_for(&config)).expect("compile");
    plan.verify_ordering().expect("ordering");
    let lines = lines_of(&plan);
    assert!(!lines.iter().any(|l| l.starts_with("3dvolreg")));
    assert!(lines.iter().any(|l| l.starts_with("tedana")));
    assert!(plan.externals().iter().any(|a| a.as_str() == "zcat_ffd.nii.gz"));
}

#[test]
fn smoke_test_plans_stop_after_the_first_echo() {
    let mut config = two_echo_config();
    config.smoke_test = true;
    let plan = compile(&config, &summary_for(&config)).expect("compile");
    let lines = lines_of(&plan);
    assert_eq!(lines.last().map(String::as_str), Some("exit"));
    assert!(!lines.iter().any(|l| l.contains("e2_vr.nii.gz")));
    assert!(!lines.iter().any(|l| l.starts_with("tedana")));
}

#[test]
fn strict_selection_reaches_the_decomposition_invocation() {
    let mut config = two_echo_config();
    config.strict = true;
    let plan = compile(&config, &summary_for(&config)).expect("compile");
    let lines = lines_of(&plan);
    assert!(lines.iter().any(|l| l.starts_with("tedana") && l.contains("--strict")));
}

#[test]
fn labels_namespace_the_run_directory() {
    let mut config = two_echo_config();
    config.label = "_pilot".to_string();
    let plan = compile(&config, &summary_for(&config)).expect("compile");
    let lines = lines_of(&plan);
    assert!(lines.iter().any(|l| l.contains("mec.rest_e12_pilot")));
}
