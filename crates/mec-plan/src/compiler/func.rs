//! Functional masking, per-echo extended preprocessing and concatenation.

use mec_core::MecError;

use crate::artifact::fixed;
use crate::config::MaskMode;
use crate::plan::{PlanBuilder, Stage};

use super::align::needs_decay_reprojection;
use super::Cx;

pub(super) fn emit_scaling_prologue(cx: &Cx, b: &mut PlanBuilder) -> Result<(), MecError> {
    b.section("Extended preprocessing of functional datasets");
    let first_ts = cx.scheme.per_echo(0, "ts+orig");
    b.push(
        Stage::shell(format!(
            "3dBrickStat -mask {base} -percentile 50 1 50 {ts}[{frame}] > {gms}",
            base = fixed::EBBASE,
            ts = first_ts,
            frame = cx.timing.base_index,
            gms = fixed::GMS,
        ))
        .reads(fixed::EBBASE)
        .reads(first_ts)
        .writes(fixed::GMS),
    )?;
    b.push(Stage::shell("gms=`cat gms.1D`; gmsa=($gms); p50=${gmsa[1]}").reads(fixed::GMS))?;

    // Decomposition voxel size: slightly upsampled isotropic approximation
    // of the native resolution, so acquisition artifacts stay off Nyquist.
    b.push(
        Stage::shell(format!(
            "voxsize=`ccalc .85*$(3dinfo -voxvol {base})**.33`",
            base = fixed::EBBASE
        ))
        .reads(fixed::EBBASE)
        .writes(fixed::VOXSIZE),
    )?;
    b.push(
        Stage::shell(format!(
            "voxdims=\"`3dinfo -adi {base}` `3dinfo -adj {base}` `3dinfo -adk {base}`\"",
            base = fixed::EBBASE
        ))
        .reads(fixed::EBBASE)
        .writes(fixed::VOXDIMS),
    )?;
    b.push(Stage::shell("echo $voxdims > voxdims.1D").reads(fixed::VOXDIMS).writes(fixed::VOXDIMS))?;
    b.push(Stage::shell("echo $voxsize > voxsize.1D").reads(fixed::VOXSIZE).writes(fixed::VOXSIZE))?;
    Ok(())
}

pub(super) fn emit_masking(cx: &Cx, b: &mut PlanBuilder) -> Result<(), MecError> {
    b.section("Preparing functional masking for this multi-echo run");
    let mask = fixed::EBVRMASK;

    match cx.geom.zeropad_slabs {
        Some(slabs) => {
            let mut pad = Stage::tool("3dZeropad");
            for face in ["-I", "-S", "-A", "-P", "-L", "-R"] {
                pad = pad.arg(face).arg(slabs.to_string());
            }
            b.push(
                pad.args(["-prefix", mask])
                    .arg(format!("{}[0]", fixed::OCV_SS))
                    .reads(fixed::OCV_SS)
                    .writes(mask),
            )?;
        }
        None => {
            b.push(
                Stage::tool("3dcalc")
                    .arg("-a")
                    .arg(format!("{}[0]", fixed::OCV_SS))
                    .args(["-expr", "'a'", "-prefix", mask])
                    .reads(fixed::OCV_SS)
                    .writes(mask),
            )?;
        }
    }

    if let Some(anat) = &cx.anat {
        let combined = cx.scheme.run_tagged("wmat.aff12.1D");
        let master = format!("-master {}", anat.stripped);
        b.push(
            Stage::tool("3dAllineate")
                .args(["-overwrite", "-final", "NN", "-NN", "-float", "-1Dmatrix_apply"])
                .arg(combined.as_str())
                .arg("-base")
                .arg(&anat.stripped)
                .args(["-input", mask, "-prefix"])
                .arg(format!("./{mask}"))
                .arg(&master)
                .arg(&cx.align.master_fres)
                .reads(combined.clone())
                .reads(anat.stripped.as_str())
                .reads(mask)
                .writes(mask),
        )?;
        if needs_decay_reprojection(cx) {
            for (input, output) in [
                (fixed::T2SVM_SS, "t2svm_ss_vr.nii.gz"),
                (fixed::OCV_UNI, "ocv_uni_vr.nii.gz"),
                (fixed::S0V_SS, "s0v_ss_vr.nii.gz"),
            ] {
                b.push(
                    Stage::tool("3dAllineate")
                        .args(["-overwrite", "-final", "NN", "-NN", "-float", "-1Dmatrix_apply"])
                        .arg(combined.as_str())
                        .args(["-base", mask, "-input", input, "-prefix"])
                        .arg(format!("./{output}"))
                        .arg(&master)
                        .arg(&cx.align.master_fres)
                        .reads(combined.clone())
                        .reads(mask)
                        .reads(input)
                        .writes(output),
                )?;
            }
        }

        if cx.config.mask_mode != MaskMode::Functional {
            emit_mask_refinement(cx, b, anat)?;
        }
    }

    b.section("Trim empty space off of mask dataset and/or resample");
    b.push(
        Stage::tool("3dAutobox")
            .args(["-overwrite", "-prefix", mask, mask])
            .reads(mask)
            .writes(mask),
    )?;
    // Isotropic so later spatial operations are not confounded.
    b.push(
        Stage::tool("3dresample")
            .args(["-overwrite", "-master", mask])
            .args(["-dxyz", "${voxsize}", "${voxsize}", "${voxsize}"])
            .args(["-input", mask, "-prefix", mask])
            .reads(mask)
            .reads(fixed::VOXSIZE)
            .writes(mask),
    )?;
    b.push(
        Stage::tool("3dcalc")
            .args(["-float", "-a", mask, "-expr", "'notzero(a)'"])
            .args(["-overwrite", "-prefix", mask])
            .reads(mask)
            .writes(mask),
    )?;
    Ok(())
}

fn emit_mask_refinement(
    cx: &Cx,
    b: &mut PlanBuilder,
    anat: &crate::context::AnatContext,
) -> Result<(), MecError> {
    let mask = fixed::EBVRMASK;
    match cx.config.mask_mode {
        MaskMode::Template if cx.config.normalization_target.is_some() => {
            b.push(
                Stage::tool("3dfractionize")
                    .args(["-overwrite", "-template", mask, "-input", fixed::ABTEMPLATE])
                    .args(["-prefix"])
                    .arg(format!("./{}", fixed::ANATMASK_EPI))
                    .args(["-clip", "1"])
                    .reads(mask)
                    .reads(fixed::ABTEMPLATE)
                    .writes(fixed::ANATMASK_EPI),
            )?;
            let inverse_norm = format!("{}_xat2ns.aff12.1D", anat.prefix);
            b.push(
                Stage::tool("3dAllineate")
                    .args(["-overwrite", "-float", "-1Dmatrix_apply"])
                    .arg(inverse_norm.as_str())
                    .args(["-base", mask, "-input", fixed::ANATMASK_EPI])
                    .args(["-prefix", fixed::ANATMASK_EPI, "-overwrite"])
                    .reads(inverse_norm.as_str())
                    .reads(mask)
                    .reads(fixed::ANATMASK_EPI)
                    .writes(fixed::ANATMASK_EPI),
            )?;
            b.section(
                "Preparing functional mask using information from standard \
                 space template (takes a little while)",
            );
        }
        _ => {
            b.push(
                Stage::tool("3dfractionize")
                    .args(["-template", mask, "-input"])
                    .arg(&anat.stripped)
                    .arg("-prefix")
                    .arg(format!("./{}", fixed::ANATMASK_EPI))
                    .args(["-clip", "0.5"])
                    .reads(mask)
                    .reads(anat.stripped.as_str())
                    .writes(fixed::ANATMASK_EPI),
            )?;
            b.section(
                "Preparing functional mask using information from anatomical \
                 (takes a little while)",
            );
        }
    }

    b.push(
        Stage::shell(format!(
            "3dBrickStat -mask {mask} -percentile 50 1 50 t2svm_ss_vr.nii.gz > {med}",
            med = fixed::T2S_MED
        ))
        .reads(mask)
        .reads("t2svm_ss_vr.nii.gz")
        .writes(fixed::T2S_MED),
    )?;
    b.push(
        Stage::shell(format!(
            "3dBrickStat -mask {mask} -percentile 50 1 50 s0v_ss_vr.nii.gz > {med}",
            med = fixed::S0V_MED
        ))
        .reads(mask)
        .reads("s0v_ss_vr.nii.gz")
        .writes(fixed::S0V_MED),
    )?;
    b.push(Stage::shell("t2sm=`cat t2s_med.1D`; t2sma=($t2sm); t2sm=${t2sma[1]}").reads(fixed::T2S_MED))?;
    b.push(Stage::shell("s0vm=`cat s0v_med.1D`; s0vma=($s0vm); s0vm=${s0vma[1]}").reads(fixed::S0V_MED))?;
    b.push(
        Stage::shell(
            "3dcalc -a ocv_uni_vr.nii.gz -b anatmask_epi.nii.gz -c t2svm_ss_vr.nii.gz \
             -d s0v_ss_vr.nii.gz -expr \
             \"a-a*equals(equals(b,0)+isnegative(c-${t2sm})+ispositive(d-${s0vm}),3)\" \
             -overwrite -prefix ocv_uni_vr.nii.gz",
        )
        .reads("ocv_uni_vr.nii.gz")
        .reads(fixed::ANATMASK_EPI)
        .reads("t2svm_ss_vr.nii.gz")
        .reads("s0v_ss_vr.nii.gz")
        .reads(fixed::T2S_MED)
        .reads(fixed::S0V_MED)
        .writes("ocv_uni_vr.nii.gz"),
    )?;
    b.push(
        Stage::tool("3dSkullStrip")
            .args(["-no_avoid_eyes", "-overwrite", "-input", "ocv_uni_vr.nii.gz"])
            .args(["-prefix", mask])
            .reads("ocv_uni_vr.nii.gz")
            .writes(mask),
    )?;
    let resample = match cx.config.functional_voxel_size {
        Some(fres) => format!("-dxyz {fres} {fres} {fres}"),
        None => "-dxyz ${voxsize} ${voxsize} ${voxsize}".to_string(),
    };
    let mut stage = Stage::tool("3dresample")
        .args(["-overwrite", "-master"])
        .arg(&anat.stripped)
        .arg(&resample)
        .args(["-input", mask, "-prefix", mask])
        .reads(anat.stripped.as_str())
        .reads(mask)
        .writes(mask);
    if cx.config.functional_voxel_size.is_none() {
        stage = stage.reads(fixed::VOXSIZE);
    }
    b.push(stage)?;
    Ok(())
}

/// Emits extended preprocessing for every echo.
///
/// Returns `true` when the smoke-test early exit truncated the plan.
pub(super) fn emit_extended(cx: &Cx, b: &mut PlanBuilder) -> Result<bool, MecError> {
    let mask = fixed::EBVRMASK;
    let vrw_matrix = cx.scheme.run_tagged("vrwmat.aff12.1D");
    for echo in 0..cx.echo_count() {
        let ts = cx.scheme.per_echo(echo, "ts+orig");
        let vr = cx.scheme.per_echo(echo, "vr.nii.gz");
        let sm = cx.scheme.per_echo(echo, "sm.nii.gz");
        let mean = cx.scheme.per_echo(echo, "mean.nii.gz");
        let filtered = cx.scheme.per_echo(echo, "in.nii.gz");
        b.section(format!(
            "Apply combined co-registration/motion correction parameter set to {ts}"
        ));
        b.push(
            Stage::tool("3dAllineate")
                .arg("-final")
                .arg(&cx.align.final_interp)
                .arg(format!("-{}", cx.align.interp))
                .args(["-float", "-1Dmatrix_apply"])
                .arg(vrw_matrix.as_str())
                .args(["-base", mask, "-input"])
                .arg(ts.as_str())
                .arg("-prefix")
                .arg(format!("./{vr}"))
                .reads(vrw_matrix.clone())
                .reads(mask)
                .reads(ts)
                .writes(vr.clone()),
        )?;

        if echo == 0 {
            let vr_min = cx.scheme.per_echo(echo, "vr_min.nii.gz");
            b.push(
                Stage::tool("3dTstat")
                    .args(["-min", "-prefix"])
                    .arg(format!("./{vr_min}"))
                    .arg(format!("./{vr}"))
                    .reads(vr.clone())
                    .writes(vr_min.clone()),
            )?;
            b.push(
                Stage::tool("3dcalc")
                    .args(["-a", mask, "-b"])
                    .arg(vr_min.as_str())
                    .args(["-expr", "'step(a)*step(b)'", "-overwrite", "-prefix", mask])
                    .reads(mask)
                    .reads(vr_min)
                    .writes(mask),
            )?;
        }

        match &cx.config.smoothing {
            None => {
                b.push(
                    Stage::tool("3dcalc")
                        .args(["-float", "-overwrite", "-a", mask, "-b"])
                        .arg(format!("./{vr}[{}..$]", cx.timing.base_index))
                        .args(["-expr", "'step(a)*b'", "-prefix"])
                        .arg(format!("./{sm}"))
                        .reads(mask)
                        .reads(vr.clone())
                        .writes(sm.clone()),
                )?;
            }
            Some(width) => {
                b.push(
                    Stage::tool("3dBlurInMask")
                        .arg("-fwhm")
                        .arg(width)
                        .args(["-mask", mask, "-prefix"])
                        .arg(format!("./{sm}"))
                        .arg(format!("./{vr}[{}..$]", cx.timing.base_index))
                        .reads(mask)
                        .reads(vr.clone())
                        .writes(sm.clone()),
                )?;
            }
        }
        // Grand-mean scale to a fixed in-mask median of 10000.
        b.push(
            Stage::shell(format!(
                "3dcalc -float -overwrite -a ./{sm} -expr \"a*10000/${{p50}}\" -prefix ./{sm}"
            ))
            .reads(sm.clone())
            .reads(fixed::GMS)
            .writes(sm.clone()),
        )?;
        b.push(
            Stage::tool("3dTstat")
                .arg("-prefix")
                .arg(format!("./{mean}"))
                .arg(format!("./{sm}"))
                .reads(sm.clone())
                .writes(mean.clone()),
        )?;
        if let Some(order) = cx.config.detrend {
            b.push(
                Stage::tool("3dDetrend")
                    .arg("-polort")
                    .arg(order.to_string())
                    .args(["-overwrite", "-prefix"])
                    .arg(format!("./{sm}"))
                    .arg(format!("./{sm}"))
                    .reads(sm.clone())
                    .writes(sm.clone()),
            )?;
        }
        match cx.config.highpass {
            Some(cutoff) => {
                b.push(
                    Stage::tool("3dBandpass")
                        .arg("-prefix")
                        .arg(format!("./{filtered}"))
                        .arg(format!("{cutoff}"))
                        .arg("99")
                        .arg(format!("./{sm}"))
                        .reads(sm.clone())
                        .writes(filtered.clone()),
                )?;
            }
            None => {
                b.push(
                    Stage::tool("mv")
                        .arg(sm.as_str())
                        .arg(filtered.as_str())
                        .reads(sm.clone())
                        .writes(filtered.clone()),
                )?;
            }
        }
        // Re-add the temporal mean removed by filtering.
        b.push(
            Stage::shell(format!(
                "3dcalc -float -overwrite -a ./{filtered} -b ./{mean} -expr 'a+b' \
                 -prefix ./{filtered}"
            ))
            .reads(filtered.clone())
            .reads(mean)
            .writes(filtered.clone()),
        )?;
        let stdev = cx.scheme.per_echo(echo, "std.nii.gz");
        b.push(
            Stage::tool("3dTstat")
                .args(["-stdev", "-prefix"])
                .arg(format!("./{stdev}"))
                .arg(format!("./{filtered}"))
                .reads(filtered)
                .writes(stdev),
        )?;

        if cx.config.smoke_test {
            b.push(Stage::shell("exit"))?;
            return Ok(true);
        }
        if !cx.config.keep_intermediates {
            let despiked = cx.scheme.per_echo(echo, "pt.nii.gz");
            let mut cleanup = Stage::tool("rm").arg("-f");
            if cx.config.despike {
                cleanup = cleanup.arg(despiked.as_str()).reads(despiked);
            }
            b.push(cleanup.arg(vr.as_str()).arg(sm.as_str()).reads(vr).reads(sm))?;
        }
    }
    Ok(false)
}

pub(super) fn emit_concatenation(cx: &Cx, b: &mut PlanBuilder) -> Result<(), MecError> {
    let mut zcat = Stage::tool("3dZcat").args(["-overwrite", "-prefix", fixed::ZCAT]);
    for echo in 0..cx.echo_count() {
        let filtered = cx.scheme.per_echo(echo, "in.nii.gz");
        zcat = zcat.arg(format!("./{filtered}")).reads(filtered);
    }
    b.blank();
    b.push(zcat.writes(fixed::ZCAT))?;
    b.push(
        Stage::tool("3dcalc")
            .args(["-float", "-overwrite", "-a"])
            .arg(format!("{}[0]", fixed::ZCAT))
            .args(["-expr", "'notzero(a)'", "-prefix", fixed::ZCAT_MASK])
            .reads(fixed::ZCAT)
            .writes(fixed::ZCAT_MASK),
    )?;
    Ok(())
}
