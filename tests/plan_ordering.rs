//! Sweeps the configuration matrix and checks that every compiled plan
//! satisfies the dependency contract: each consumed artifact was produced
//! by a strictly earlier stage or declared externally available.

mod common;

use common::{anat_config, oblique_volume, reader_with, summary_for, two_echo_config};
use mec_plan::{
    compile, derive_geometry, AlignBase, BaseTime, CompilerMode, CoregMode, MaskMode,
    RunConfiguration,
};

fn check(config: &RunConfiguration) {
    let summary = summary_for(config);
    let plan = compile(config, &summary).expect("compile");
    plan.verify_ordering().expect("artifact ordering");
    assert!(plan.stages().count() > 0);
}

#[test]
fn functional_only_branches_are_ordered() {
    for despike in [true, false] {
        for axialize in [true, false] {
            for smoothing in [None, Some("3mm".to_string())] {
                for mode in [
                    CompilerMode::Full,
                    CompilerMode::PreprocOnly,
                    CompilerMode::DecompositionOnly,
                    CompilerMode::SelectionOnly,
                    CompilerMode::ExportOnly,
                ] {
                    let mut config = two_echo_config();
                    config.despike = despike;
                    config.axialize = axialize;
                    config.smoothing = smoothing.clone();
                    config.mode = mode;
                    check(&config);
                }
            }
        }
    }
}

#[test]
fn anatomical_branches_are_ordered() {
    for target in [None, Some("MNI_caez_N27+tlrc".to_string())] {
        for mask_mode in [MaskMode::Functional, MaskMode::Anatomical, MaskMode::Template] {
            for coreg_mode in [CoregMode::LocalPearsonT2s, CoregMode::EdgeBased] {
                for qwarp in [false, true] {
                    if qwarp && target.is_none() {
                        continue;
                    }
                    let mut config = anat_config();
                    config.normalization_target = target.clone();
                    config.mask_mode = mask_mode;
                    config.coreg_mode = coreg_mode;
                    config.qwarp = qwarp;
                    check(&config);
                }
            }
        }
    }
}

#[test]
fn oblique_branches_are_ordered() {
    for anatomical in [false, true] {
        let mut config = if anatomical { anat_config() } else { two_echo_config() };
        config.normalization_target = anatomical.then(|| "MNI_caez_N27+tlrc".to_string());
        let reader = reader_with(&config, oblique_volume());
        let summary = derive_geometry(&config, &reader).expect("geometry");
        let plan = compile(&config, &summary).expect("compile");
        plan.verify_ordering().expect("artifact ordering");
        assert!(
            plan.script_lines().iter().any(|l| l.contains("-deoblique") || l.contains("card2oblique"))
        );
    }
}

#[test]
fn resume_and_filter_branches_are_ordered() {
    for resume in [false, true] {
        for highpass in [None, Some(0.01)] {
            for detrend in [None, Some(2)] {
                for native in [false, true] {
                    let mut config = anat_config();
                    config.normalization_target = Some("MNI_caez_N27+tlrc".to_string());
                    config.resume = resume;
                    config.highpass = highpass;
                    config.detrend = detrend;
                    config.native = native;
                    check(&config);
                }
            }
        }
    }
}

#[test]
fn functional_only_resume_is_ordered() {
    let mut config = two_echo_config();
    config.resume = true;
    check(&config);
}

#[test]
fn base_selection_branches_are_ordered() {
    for align_base in [
        None,
        Some(AlignBase::Frame(4)),
        Some(AlignBase::External("steadybase.nii.gz".to_string())),
    ] {
        for base_time in [BaseTime::Volumes(3), BaseTime::Seconds(6.0)] {
            let mut config = two_echo_config();
            config.align_base = align_base.clone();
            config.base_time = base_time;
            check(&config);
        }
    }
}

#[test]
fn voxel_and_cleanup_branches_are_ordered() {
    for fres in [None, Some(2.5)] {
        for keep in [false, true] {
            for stripped in [false, true] {
                let mut config = anat_config();
                config.normalization_target = Some("MNI_caez_N27+tlrc".to_string());
                config.functional_voxel_size = fres;
                config.keep_intermediates = keep;
                config.anat_stripped = stripped;
                check(&config);
            }
        }
    }
}
