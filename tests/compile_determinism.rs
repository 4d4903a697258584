mod common;

use common::{anat_config, summary_for, two_echo_config};
use mec_plan::compile;

#[test]
fn identical_inputs_yield_identical_plans() {
    let config = two_echo_config();
    let summary = summary_for(&config);
    let first = compile(&config, &summary).expect("first compile");
    let second = compile(&config, &summary).expect("second compile");
    assert_eq!(first, second);
    assert_eq!(first.script_lines(), second.script_lines());
    assert_eq!(
        first.plan_hash().expect("hash a"),
        second.plan_hash().expect("hash b")
    );
}

#[test]
fn option_changes_change_the_plan_hash() {
    let config = two_echo_config();
    let summary = summary_for(&config);
    let base = compile(&config, &summary).expect("base compile");

    let mut smoothed = config.clone();
    smoothed.smoothing = Some("3mm".to_string());
    let smoothed_plan = compile(&smoothed, &summary_for(&smoothed)).expect("smoothed compile");

    assert_ne!(
        base.plan_hash().expect("base hash"),
        smoothed_plan.plan_hash().expect("smoothed hash")
    );
}

#[test]
fn anatomical_plans_are_deterministic_too() {
    let mut config = anat_config();
    config.normalization_target = Some("MNI_caez_N27+tlrc".to_string());
    config.qwarp = true;
    let summary = summary_for(&config);
    let first = compile(&config, &summary).expect("first compile");
    let second = compile(&config, &summary).expect("second compile");
    assert_eq!(
        first.plan_hash().expect("hash a"),
        second.plan_hash().expect("hash b")
    );
}

#[test]
fn rendered_script_round_trips_through_entries() {
    let config = two_echo_config();
    let plan = compile(&config, &summary_for(&config)).expect("compile");
    let lines = plan.script_lines();
    assert_eq!(lines.len(), plan.entries().len());
    assert!(lines.iter().any(|l| l.starts_with("# ")));
    assert!(!plan.script_text().is_empty());
}
