//! Decomposition handoff and final export.

use std::collections::BTreeMap;

use mec_core::MecError;

use crate::artifact::{fixed, ted, ArtifactId, WarpCode};
use crate::plan::{PlanBuilder, Stage};

use super::align::split_extra;
use super::Cx;

/// Canonical export table: decomposition output, variable suffix and
/// human-readable description.
const EXPORTS: [(&str, &str, &str); 7] = [
    (ted::TS_OC, "tsoc", "T2* weighted average of ME time series"),
    (
        ted::DN_TS_OC,
        "medn",
        "Denoised timeseries (including thermal noise)",
    ),
    (
        ted::DN_TS_OC_T1C,
        "T1c_medn",
        "Denoised timeseries with T1 equilibration correction (including thermal noise)",
    ),
    (
        ted::HIK_TS_OC_T1C,
        "hikts",
        "Denoised timeseries with T1 equilibration correction (no thermal noise)",
    ),
    (
        ted::BETAS_HIK_OC,
        "mefc",
        "Denoised ICA coeff. set for ME-ICR seed-based FC analysis",
    ),
    (ted::BETAS_OC, "mefl", "Full ICA coeff. set for component assessment"),
    (ted::FEATS_OC2, "mefcz", "Z-normalized spatial component maps"),
];

const TED_OUTPUTS: [&str; 9] = [
    ted::TS_OC,
    ted::DN_TS_OC,
    ted::DN_TS_OC_T1C,
    ted::HIK_TS_OC_T1C,
    ted::BETAS_HIK_OC,
    ted::BETAS_OC,
    ted::FEATS_OC2,
    ted::COMP_TABLE,
    ted::MIX,
];

pub(super) fn emit_cache_clear(b: &mut PlanBuilder) -> Result<(), MecError> {
    b.push(Stage::tool("rm").args(["-f", ted::PCA_CACHE]))?;
    Ok(())
}

fn decomposition_stage(cx: &Cx) -> Stage {
    let opts = &cx.config.decomposition;
    let mut stage = Stage::tool("tedana")
        .arg("-e")
        .arg(cx.te_arg())
        .args(["-d", fixed::ZCAT])
        .arg(format!("--sourceTEs={}", opts.source_tes))
        .arg(format!("--kdaw={}", opts.kdaw))
        .arg(format!("--rdaw={}", opts.rdaw))
        .arg(format!("--initcost={}", opts.initcost))
        .arg(format!("--finalcost={}", opts.finalcost))
        .arg(format!("--conv={}", opts.convergence))
        .reads(fixed::ZCAT);
    for output in TED_OUTPUTS {
        stage = stage.writes(output);
    }
    stage
}

fn strict_and_extra(cx: &Cx, mut stage: Stage) -> Stage {
    if cx.config.strict {
        stage = stage.arg("--strict");
    }
    stage.args(split_extra(&cx.config.decomposition.extra_args))
}

pub(super) fn emit_decomposition(cx: &Cx, b: &mut PlanBuilder) -> Result<(), MecError> {
    b.section("Perform TE-dependence analysis (takes a good while)");
    b.push(strict_and_extra(cx, decomposition_stage(cx)))?;
    Ok(())
}

pub(super) fn emit_selection(cx: &Cx, b: &mut PlanBuilder) -> Result<(), MecError> {
    let stage = decomposition_stage(cx).arg("--mix=meica_mix.1D").reads(ted::MIX);
    b.push(strict_and_extra(cx, stage))?;
    Ok(())
}

pub(super) fn emit_export(cx: &Cx, b: &mut PlanBuilder) -> Result<(), MecError> {
    let start = &cx.start;
    let prefix = cx.config.output_prefix()?;
    b.blank();
    b.push(
        Stage::shell(format!(
            "voxdims=\"`3dinfo -adi {base}` `3dinfo -adj {base}` `3dinfo -adk {base}`\"",
            base = fixed::EBBASE
        ))
        .reads(fixed::EBBASE)
        .writes(fixed::VOXDIMS),
    )?;
    b.push(Stage::shell("echo $voxdims > voxdims.1D").reads(fixed::VOXDIMS).writes(fixed::VOXDIMS))?;
    b.push(
        Stage::tool("3dcalc")
            .args(["-float", "-a"])
            .arg(format!("{}[0]", ted::TS_OC))
            .args(["-overwrite", "-expr", "'notzero(a)'", "-prefix"])
            .arg(format!("./{}", fixed::EXPORT_MASK))
            .reads(ted::TS_OC)
            .writes(fixed::EXPORT_MASK),
    )?;
    b.section("Copying results to start directory");

    let resample_dims = match cx.config.functional_voxel_size {
        Some(fres) => format!("-dxyz {fres} {fres} {fres}"),
        None => "-dxyz ${voxdims}".to_string(),
    };
    let template_master = cx
        .config
        .normalization_target
        .as_ref()
        .map(|_| format!("-master {}", fixed::ABTEMPLATE));

    let mut mask_memo: BTreeMap<WarpCode, ArtifactId> = BTreeMap::new();
    for (source, var_suffix, description) in EXPORTS {
        let var = format!("{prefix}_{var_suffix}");
        let mut to_export: Vec<(String, ArtifactId)> = Vec::new();
        let mut native_export = cx.config.native;

        if cx.config.qwarp_valid() {
            emit_nonlinear_export(cx, b, source, &var, &template_master, &mut mask_memo)?;
            to_export.push((
                format!("{var}_{}", WarpCode::Nonlinear.as_str()),
                WarpCode::Nonlinear.export_mask(),
            ));
        } else if cx.config.normalization_target.is_some() {
            emit_affine_export(cx, b, source, &var, &template_master, &mut mask_memo)?;
            to_export.push((
                format!("{var}_{}", WarpCode::Affine.as_str()),
                WarpCode::Affine.export_mask(),
            ));
        } else {
            native_export = true;
        }
        if native_export {
            let code = emit_native_export(cx, b, source, &var, &resample_dims, &mut mask_memo)?;
            to_export.push((format!("{var}_{}", code.as_str()), code.export_mask()));
        }

        for (exported, mask) in to_export {
            b.push(
                Stage::tool("3dNotes")
                    .arg("-h")
                    .arg(format!("'{description}'"))
                    .arg(format!("{exported}.nii"))
                    .reads(format!("{exported}.nii"))
                    .writes(format!("{exported}.nii")),
            )?;
            if cx.anat.is_some()
                && cx.config.normalization_target.is_some()
                && !exported.contains("_nat")
            {
                b.push(
                    Stage::tool("nifti_tool")
                        .args([
                            "-mod_hdr",
                            "-mod_field",
                            "sform_code",
                            "2",
                            "-mod_field",
                            "qform_code",
                            "2",
                            "-infiles",
                        ])
                        .arg(format!("{exported}.nii"))
                        .arg("-overwrite")
                        .reads(format!("{exported}.nii"))
                        .writes(format!("{exported}.nii")),
                )?;
            }
            b.push(
                Stage::shell(format!(
                    "3dcalc -overwrite -a {mask} -b {exported}.nii \
                     -expr 'ispositive(a-.5)*b' -prefix {exported}.nii; \
                     gzip -f {exported}.nii; mv {exported}.nii.gz {start}",
                ))
                .reads(mask)
                .reads(format!("{exported}.nii"))
                .writes(format!("{exported}.nii.gz")),
            )?;
        }
    }

    b.push(
        Stage::tool("cp")
            .arg(ted::COMP_TABLE)
            .arg(format!("{start}/{prefix}_ctab.txt"))
            .reads(ted::COMP_TABLE)
            .writes(format!("{prefix}_ctab.txt")),
    )?;
    b.push(
        Stage::tool("cp")
            .arg(ted::MIX)
            .arg(format!("{start}/{prefix}_mmix.1D"))
            .reads(ted::MIX)
            .writes(format!("{prefix}_mmix.1D")),
    )?;
    Ok(())
}

fn emit_nonlinear_export(
    cx: &Cx,
    b: &mut PlanBuilder,
    source: &str,
    var: &str,
    template_master: &Option<String>,
    mask_memo: &mut BTreeMap<WarpCode, ArtifactId>,
) -> Result<(), MecError> {
    let Some(anat) = &cx.anat else {
        return Ok(());
    };
    let start = &cx.start;
    let forward_norm = format!("{}_xns2at.aff12.1D", anat.prefix);
    let nwarp = format!(
        "-nwarp {start}/{forward_norm} '{start}/{field}'",
        field = anat.nonlinear_warp_field
    );
    let master = template_master.clone().unwrap_or_default();
    let code = WarpCode::Nonlinear;
    b.push(
        Stage::shell(format!(
            "3dNwarpApply -overwrite {nwarp} {master} {fres} -source {source} \
             -interp wsinc5 -prefix {var}_nlw.nii",
            fres = cx.align.qwarp_fres,
        ))
        .reads(forward_norm.as_str())
        .reads(anat.nonlinear_warp_field.as_str())
        .reads(fixed::ABTEMPLATE)
        .reads(source)
        .writes(format!("{var}_nlw.nii")),
    )?;
    if !mask_memo.contains_key(&code) {
        let mask = code.export_mask();
        b.push(
            Stage::shell(format!(
                "3dNwarpApply -overwrite {nwarp} {master} {fres} -source {src} \
                 -interp wsinc5 -prefix {mask}",
                fres = cx.align.qwarp_fres,
                src = fixed::EXPORT_MASK,
            ))
            .reads(forward_norm.as_str())
            .reads(anat.nonlinear_warp_field.as_str())
            .reads(fixed::ABTEMPLATE)
            .reads(fixed::EXPORT_MASK)
            .writes(mask.clone()),
        )?;
        emit_template_orientation_stamp(b, &mask)?;
        mask_memo.insert(code, mask);
    }
    Ok(())
}

fn emit_affine_export(
    cx: &Cx,
    b: &mut PlanBuilder,
    source: &str,
    var: &str,
    template_master: &Option<String>,
    mask_memo: &mut BTreeMap<WarpCode, ArtifactId>,
) -> Result<(), MecError> {
    let Some(anat) = &cx.anat else {
        return Ok(());
    };
    let start = &cx.start;
    let forward_norm = format!("{}_xns2at.aff12.1D", anat.prefix);
    let master = template_master.clone().unwrap_or_default();
    let code = WarpCode::Affine;
    b.push(
        Stage::shell(format!(
            "3dAllineate -overwrite -final wsinc5 -{interp} -float -1Dmatrix_apply \
             {start}/{forward_norm} -input {source} -prefix ./{var}_afw.nii \
             {master} {fres}",
            interp = cx.align.interp,
            fres = cx.align.master_fres,
        ))
        .reads(forward_norm.as_str())
        .reads(fixed::ABTEMPLATE)
        .reads(source)
        .writes(format!("{var}_afw.nii")),
    )?;
    if !mask_memo.contains_key(&code) {
        let mask = code.export_mask();
        b.push(
            Stage::shell(format!(
                "3dAllineate -overwrite -final wsinc5 -{interp} -float -1Dmatrix_apply \
                 {start}/{forward_norm} -input {src} -prefix ./{mask} {master} {fres}",
                interp = cx.align.interp,
                src = fixed::EXPORT_MASK,
                fres = cx.align.master_fres,
            ))
            .reads(forward_norm.as_str())
            .reads(fixed::ABTEMPLATE)
            .reads(fixed::EXPORT_MASK)
            .writes(mask.clone()),
        )?;
        emit_template_orientation_stamp(b, &mask)?;
        mask_memo.insert(code, mask);
    }
    Ok(())
}

fn emit_native_export(
    cx: &Cx,
    b: &mut PlanBuilder,
    source: &str,
    var: &str,
    resample_dims: &str,
    mask_memo: &mut BTreeMap<WarpCode, ArtifactId>,
) -> Result<WarpCode, MecError> {
    let (code, master, master_artifact) = match &cx.anat {
        Some(anat) => (
            WarpCode::NativeAnat,
            format!("-master {}", anat.stripped),
            Some(anat.stripped.clone()),
        ),
        None => (WarpCode::NativeEpi, String::new(), None),
    };
    let mut stage = Stage::shell(format!(
        "3dresample -rmode Li -overwrite {master} {resample_dims} -input {source} \
         -prefix {var}_{code}.nii",
        code = code.as_str(),
    ))
    .reads(source)
    .writes(format!("{var}_{}.nii", code.as_str()));
    if let Some(master_artifact) = &master_artifact {
        stage = stage.reads(master_artifact.as_str());
    }
    if cx.config.functional_voxel_size.is_none() {
        stage = stage.reads(fixed::VOXDIMS);
    }
    b.push(stage)?;

    if !mask_memo.contains_key(&code) {
        let mask = code.export_mask();
        let mut stage = Stage::shell(format!(
            "3dresample -rmode Li -overwrite {master} {resample_dims} -input {src} \
             -prefix {mask}",
            src = fixed::EXPORT_MASK,
        ))
        .reads(fixed::EXPORT_MASK)
        .writes(mask.clone());
        if let Some(master_artifact) = &master_artifact {
            stage = stage.reads(master_artifact.as_str());
        }
        if cx.config.functional_voxel_size.is_none() {
            stage = stage.reads(fixed::VOXDIMS);
        }
        b.push(stage)?;
        mask_memo.insert(code, mask);
    }
    Ok(code)
}

fn emit_template_orientation_stamp(b: &mut PlanBuilder, mask: &ArtifactId) -> Result<(), MecError> {
    b.push(
        Stage::tool("nifti_tool")
            .args([
                "-mod_hdr",
                "-mod_field",
                "sform_code",
                "2",
                "-mod_field",
                "qform_code",
                "2",
                "-infiles",
            ])
            .arg(mask.as_str())
            .arg("-overwrite")
            .reads(mask.clone())
            .writes(mask.clone()),
    )?;
    Ok(())
}
