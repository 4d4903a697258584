//! Functional ingestion, motion baseline, preliminary per-echo
//! preprocessing and signal-decay estimation.

use mec_core::MecError;

use crate::artifact::{fixed, ArtifactId};
use crate::config::AlignBase;
use crate::plan::{PlanBuilder, Stage};

use super::Cx;

pub(super) fn emit_ingestion(cx: &Cx, b: &mut PlanBuilder) -> Result<(), MecError> {
    b.section("Copy in functional datasets, reset NIFTI tags as needed");
    let retag = cx.config.dataset_spec.file_type().is_nifti();
    for echo in 0..cx.echo_count() {
        let dataset = cx.dataset(echo)?;
        let copy = cx.scheme.echo_copy(echo);
        b.push(
            Stage::tool("3dcalc")
                .arg("-a")
                .arg(format!("{}/{}", cx.start, dataset))
                .args(["-expr", "'a'", "-prefix"])
                .arg(format!("./{copy}"))
                .reads(dataset.as_str())
                .writes(copy.clone()),
        )?;
        if retag {
            b.push(
                Stage::tool("nifti_tool")
                    .args([
                        "-mod_hdr",
                        "-mod_field",
                        "sform_code",
                        "1",
                        "-mod_field",
                        "qform_code",
                        "1",
                        "-infiles",
                    ])
                    .arg(format!("./{copy}"))
                    .arg("-overwrite")
                    .reads(copy.clone())
                    .writes(copy),
            )?;
        }
    }
    Ok(())
}

pub(super) fn emit_motion_baseline(cx: &Cx, b: &mut PlanBuilder) -> Result<(), MecError> {
    b.section(
        "Calculate and save motion and obliquity parameters, despiking first \
         if not disabled, and separately save and mask the base volume",
    );

    let first_copy = cx.scheme.echo_copy(0);
    let mut vr_input = (format!("./{first_copy}"), first_copy.clone());
    let vr_a = cx.scheme.run_tagged("vrA.nii.gz");

    if cx.geom.oblique_mode {
        if let Some(anat) = &cx.anat {
            let oblique_matrix = cx.scheme.run_tagged("obla2e_mat.1D");
            b.push(
                Stage::shell(format!(
                    "3dWarp -verb -card2oblique {input}[0] -overwrite -newgrid 1.000000 \
                     -prefix ./{prefix}_ob.nii.gz {start}/{anat} | \\grep -A 4 \
                     '# mat44 Obliquity Transformation ::' > {matrix}",
                    input = vr_input.0,
                    prefix = anat.prefix,
                    start = cx.start,
                    anat = anat.stripped,
                    matrix = oblique_matrix,
                ))
                .reads(vr_input.1.clone())
                .reads(anat.stripped.as_str())
                .writes(format!("{}_ob.nii.gz", anat.prefix))
                .writes(oblique_matrix),
            )?;
        } else {
            b.push(
                Stage::tool("3dWarp")
                    .args(["-overwrite", "-prefix"])
                    .arg(&vr_input.0)
                    .arg("-deoblique")
                    .arg(&vr_input.0)
                    .reads(vr_input.1.clone())
                    .writes(vr_input.1.clone()),
            )?;
        }
    }

    if cx.config.despike {
        b.push(
            Stage::tool("3dDespike")
                .args(["-overwrite", "-prefix"])
                .arg(format!("./{vr_a}"))
                .arg(&vr_input.0)
                .reads(vr_input.1.clone())
                .writes(vr_a.clone()),
        )?;
        vr_input = (format!("./{vr_a}"), vr_a.clone());
    }
    if cx.config.axialize {
        b.push(
            Stage::tool("3daxialize")
                .args(["-overwrite", "-prefix"])
                .arg(format!("./{vr_a}"))
                .arg(&vr_input.0)
                .reads(vr_input.1.clone())
                .writes(vr_a.clone()),
        )?;
        vr_input = (format!("./{vr_a}"), vr_a.clone());
    }

    let (base_volume, base_artifact, external_base) = match &cx.config.align_base {
        Some(AlignBase::Frame(index)) => {
            (format!("{}[{index}]", vr_input.0), vr_input.1.clone(), false)
        }
        Some(AlignBase::External(file)) => (file.clone(), ArtifactId::new(file.clone()), true),
        None => (
            format!("{}[{}]", vr_input.0, cx.timing.base_index),
            vr_input.1.clone(),
            false,
        ),
    };
    b.push(
        Stage::tool("3dcalc")
            .arg("-a")
            .arg(base_volume)
            .args(["-expr", "'a'", "-prefix", fixed::EBBASE])
            .reads(base_artifact)
            .writes(fixed::EBBASE),
    )?;
    if external_base {
        if cx.geom.oblique_mode {
            b.push(
                Stage::tool("3dWarp")
                    .args(["-overwrite", "-deoblique", fixed::EBBASE, fixed::EBBASE])
                    .reads(fixed::EBBASE)
                    .writes(fixed::EBBASE),
            )?;
        }
        if cx.config.axialize {
            b.push(
                Stage::tool("3daxialize")
                    .args(["-overwrite", "-prefix", fixed::EBBASE, fixed::EBBASE])
                    .reads(fixed::EBBASE)
                    .writes(fixed::EBBASE),
            )?;
        }
    }

    let motion_series = cx.scheme.run_tagged("vrA.1D");
    let motion_matrix = cx.scheme.run_tagged("vrmat.aff12.1D");
    b.push(
        Stage::tool("3dvolreg")
            .args(["-overwrite", "-tshift", "-quintic", "-prefix"])
            .arg(format!("./{vr_a}"))
            .args(["-base", fixed::EBBASE, "-dfile"])
            .arg(format!("./{motion_series}"))
            .arg("-1Dmatrix_save")
            .arg(format!("./{motion_matrix}"))
            .arg(&vr_input.0)
            .reads(vr_input.1.clone())
            .reads(fixed::EBBASE)
            .writes(vr_a)
            .writes(motion_series.clone())
            .writes(motion_matrix),
    )?;
    b.push(
        Stage::shell(format!(
            "1dcat './{series}[1..6]{{{base}..$}}' > {motion}",
            series = motion_series,
            base = cx.timing.base_index,
            motion = fixed::MOTION,
        ))
        .reads(motion_series)
        .writes(fixed::MOTION),
    )?;
    Ok(())
}

pub(super) fn emit_preliminary(cx: &Cx, b: &mut PlanBuilder) -> Result<(), MecError> {
    b.section(
        "Preliminary preprocessing of functional datasets: despike, tshift, \
         deoblique, and/or axialize",
    );
    for echo in 0..cx.echo_count() {
        let dataset = cx.dataset(echo)?;
        let etok = cx.etok(echo);
        let te = cx.config.echo_times.values()[echo];
        let ts = cx.scheme.per_echo(echo, "ts+orig");
        b.section(format!(
            "Preliminary preprocessing dataset {dataset} of TE={te}ms to produce {ts}"
        ));

        let copy = cx.scheme.echo_copy(echo);
        let shift_input = if cx.config.despike {
            let despiked = cx.scheme.per_echo(echo, "pt.nii.gz");
            b.push(
                Stage::tool("3dDespike")
                    .args(["-overwrite", "-prefix"])
                    .arg(format!("./{despiked}"))
                    .arg(format!("./{copy}"))
                    .reads(copy)
                    .writes(despiked.clone()),
            )?;
            despiked
        } else {
            copy
        };

        let mut shift = Stage::tool("3dTshift").arg("-heptic");
        if let Some(pattern) = &cx.config.tpattern {
            shift = shift.arg("-tpattern").arg(pattern);
        }
        b.push(
            shift
                .arg("-prefix")
                .arg(format!("./{ts}"))
                .arg(format!("./{shift_input}"))
                .reads(shift_input)
                .writes(ts.clone()),
        )?;
        b.push(
            Stage::tool("3drefit")
                .args(["-view", "orig"])
                .arg(format!("{etok}_ts*HEAD"))
                .reads(ts.clone())
                .writes(ts.clone()),
        )?;
        if cx.geom.oblique_mode && cx.anat.is_none() {
            b.push(
                Stage::tool("3dWarp")
                    .args(["-overwrite", "-deoblique", "-prefix"])
                    .arg(format!("./{ts}"))
                    .arg(format!("./{ts}"))
                    .reads(ts.clone())
                    .writes(ts.clone()),
            )?;
        }
        if cx.config.axialize {
            b.push(
                Stage::tool("3daxialize")
                    .args(["-overwrite", "-prefix"])
                    .arg(format!("./{ts}"))
                    .arg(format!("./{ts}"))
                    .reads(ts.clone())
                    .writes(ts.clone()),
            )?;
        }
        let mut refit = Stage::tool("3drefit");
        if cx.geom.oblique_mode {
            refit = refit.arg("-deoblique");
        }
        b.push(
            refit
                .arg("-TR")
                .arg(cx.timing.tr.to_string())
                .arg(ts.as_str())
                .reads(ts.clone())
                .writes(ts),
        )?;
    }
    Ok(())
}

pub(super) fn emit_decay_estimation(cx: &Cx, b: &mut PlanBuilder) -> Result<(), MecError> {
    b.section(
        "Prepare T2* and S0 volumes for use in functional masking and \
         (optionally) anatomical-functional coregistration (takes a little while)",
    );
    let matrix = cx.scheme.run_tagged("vrmat.aff12.1D");
    let window_start = cx.timing.base_index;
    let window_end = window_start + 20;
    let mut stack = Vec::new();
    for echo in 0..cx.echo_count() {
        let ts = cx.scheme.per_echo(echo, "ts+orig");
        let aligned = cx.scheme.per_echo(echo, "vrA.nii.gz");
        b.push(
            Stage::tool("3dAllineate")
                .args(["-overwrite", "-final", "NN", "-NN", "-float", "-1Dmatrix_apply"])
                .arg(format!("{matrix}'{{{window_start}..{window_end}}}'"))
                .args(["-base", fixed::EBBASE, "-input"])
                .arg(format!("{ts}'[{window_start}..{window_end}]'"))
                .arg("-prefix")
                .arg(aligned.as_str())
                .reads(matrix.clone())
                .reads(fixed::EBBASE)
                .reads(ts)
                .writes(aligned.clone()),
        )?;
        stack.push(aligned);
    }
    let mut zcat = Stage::tool("3dZcat").args(["-prefix", fixed::BASESTACK]);
    for aligned in &stack {
        zcat = zcat.arg(aligned.as_str()).reads(aligned.clone());
    }
    b.push(zcat.writes(fixed::BASESTACK))?;
    b.push(
        Stage::tool("t2smap")
            .args(["-d", fixed::BASESTACK, "-e"])
            .arg(cx.te_arg())
            .reads(fixed::BASESTACK)
            .writes(fixed::T2SVM)
            .writes(fixed::S0V)
            .writes(fixed::OCV),
    )?;
    b.push(
        Stage::tool("3dUnifize")
            .arg("-prefix")
            .arg(format!("./{}", fixed::OCV_UNI))
            .arg(fixed::OCV)
            .reads(fixed::OCV)
            .writes(fixed::OCV_UNI),
    )?;
    b.push(
        Stage::tool("3dSkullStrip")
            .args(["-no_avoid_eyes", "-prefix"])
            .arg(format!("./{}", fixed::OCV_SS))
            .args(["-overwrite", "-input", fixed::OCV_UNI])
            .reads(fixed::OCV_UNI)
            .writes(fixed::OCV_SS),
    )?;
    b.push(
        Stage::tool("3dcalc")
            .args(["-overwrite", "-a", fixed::T2SVM, "-b", fixed::OCV_SS])
            .args(["-expr", "'a*ispositive(a)*step(b)'", "-prefix", fixed::T2SVM_SS])
            .reads(fixed::T2SVM)
            .reads(fixed::OCV_SS)
            .writes(fixed::T2SVM_SS),
    )?;
    b.push(
        Stage::tool("3dcalc")
            .args(["-overwrite", "-a", fixed::S0V, "-b", fixed::OCV_SS])
            .args(["-expr", "'a*ispositive(a)*step(b)'", "-prefix", fixed::S0V_SS])
            .reads(fixed::S0V)
            .reads(fixed::OCV_SS)
            .writes(fixed::S0V_SS),
    )?;
    if cx.config.axialize {
        for name in [fixed::T2SVM_SS, fixed::OCV_SS, fixed::S0V_SS] {
            b.push(
                Stage::tool("3daxialize")
                    .args(["-overwrite", "-prefix", name, name])
                    .reads(name)
                    .writes(name),
            )?;
        }
    }
    Ok(())
}
