//! Anatomical preparation, normalization warps and transform composition.

use mec_core::MecError;

use crate::artifact::fixed;
use crate::config::{CoregMode, MaskMode};
use crate::plan::{PlanBuilder, Stage};

use super::Cx;

pub(super) fn emit_anat_preparation(cx: &Cx, b: &mut PlanBuilder) -> Result<(), MecError> {
    let Some(anat) = &cx.anat else {
        return Ok(());
    };
    b.section(
        "Deoblique, unifize, skullstrip, and/or autobox anatomical, in \
         starting directory (may take a little while)",
    );
    let start = &cx.start;
    if cx.geom.oblique_mode {
        b.push(
            Stage::shell(format!(
                "if [ ! -e {start}/{prefix}_do.nii.gz ]; then 3dWarp -overwrite \
                 -prefix {start}/{prefix}_do.nii.gz -deoblique {start}/{raw}; fi",
                prefix = anat.prefix,
                raw = anat.raw,
            ))
            .reads(anat.raw.as_str())
            .writes(anat.deobliqued.as_str()),
        )?;
    }
    if !cx.config.anat_stripped {
        b.push(
            Stage::shell(format!(
                "if [ ! -e {start}/{prefix}_ns.nii.gz ]; then 3dUnifize -overwrite \
                 -prefix {start}/{prefix}_u.nii.gz {start}/{deobliqued}; \
                 3dSkullStrip -shrink_fac_bot_lim 0.3 -orig_vol -overwrite \
                 -prefix {start}/{prefix}_ns.nii.gz -input {start}/{prefix}_u.nii.gz; \
                 3dAutobox -overwrite -prefix {start}/{prefix}_ns.nii.gz \
                 {start}/{prefix}_ns.nii.gz; fi",
                prefix = anat.prefix,
                deobliqued = anat.deobliqued,
            ))
            .reads(anat.deobliqued.as_str())
            .writes(format!("{}_u.nii.gz", anat.prefix))
            .writes(anat.stripped.as_str()),
        )?;
    }
    Ok(())
}

pub(super) fn emit_alignment(cx: &Cx, b: &mut PlanBuilder) -> Result<(), MecError> {
    let vrw_matrix = cx.scheme.run_tagged("vrwmat.aff12.1D");
    let vr_matrix = cx.scheme.run_tagged("vrmat.aff12.1D");
    let Some(anat) = &cx.anat else {
        b.push(
            Stage::tool("cp")
                .arg(vr_matrix.as_str())
                .arg(vrw_matrix.as_str())
                .reads(vr_matrix)
                .writes(vrw_matrix),
        )?;
        return Ok(());
    };

    b.section("Copy anatomical into the run directory and process warps");
    let start = &cx.start;
    b.push(
        Stage::shell(format!("cp {start}/{stripped}* .", stripped = anat.stripped))
            .reads(anat.stripped.as_str())
            .writes(anat.stripped.as_str()),
    )?;

    if let Some(target) = &cx.config.normalization_target {
        emit_normalization(cx, b, target)?;
    }

    // Anatomical reference for functional-anatomical coregistration.
    let coreg_anat = if cx.geom.oblique_mode {
        format!("./{}_ob.nii.gz", anat.prefix)
    } else {
        format!("{start}/{}", anat.stripped)
    };
    let coreg_anat_artifact = if cx.geom.oblique_mode {
        format!("{}_ob.nii.gz", anat.prefix)
    } else {
        anat.stripped.clone()
    };
    let alignment_matrix = format!("{}_al_mat.aff12.1D", anat.prefix);

    match cx.config.coreg_mode {
        CoregMode::LocalPearsonT2s => {
            let mut local_anat = coreg_anat.clone();
            let mut local_artifact = coreg_anat_artifact.clone();
            if cx.config.axialize {
                local_artifact = coreg_anat_artifact
                    .rsplit('/')
                    .next()
                    .unwrap_or(&coreg_anat_artifact)
                    .to_string();
                b.push(
                    Stage::tool("3daxialize")
                        .args(["-overwrite", "-prefix"])
                        .arg(format!("./{local_artifact}"))
                        .arg(&coreg_anat)
                        .reads(coreg_anat_artifact.as_str())
                        .writes(local_artifact.as_str()),
                )?;
                local_anat = local_artifact.clone();
            }
            let raw_matrix = "alignp.mepi/mepi_al_mat.aff12.1D";
            b.push(
                Stage::tool("alignp_mepi_anat.py")
                    .args(["-t", fixed::T2SVM_SS, "-a"])
                    .arg(&local_anat)
                    .args(["-p", "mepi"])
                    .args(split_extra(&cx.config.align_args))
                    .reads(fixed::T2SVM_SS)
                    .reads(local_artifact.as_str())
                    .writes(raw_matrix),
            )?;
            b.push(
                Stage::tool("cp")
                    .arg(raw_matrix)
                    .arg(format!("./{alignment_matrix}"))
                    .reads(raw_matrix)
                    .writes(alignment_matrix.as_str()),
            )?;
        }
        CoregMode::EdgeBased => {
            b.section("Using align_epi_anat.py to drive anatomical-functional coregistration");
            b.push(
                Stage::tool("3dcopy")
                    .arg(&coreg_anat)
                    .arg("./ANAT_ns+orig")
                    .reads(coreg_anat_artifact.as_str())
                    .writes("ANAT_ns+orig"),
            )?;
            b.push(
                Stage::tool("align_epi_anat.py")
                    .args([
                        "-anat2epi",
                        "-volreg",
                        "off",
                        "-tshift",
                        "off",
                        "-deoblique",
                        "off",
                        "-anat_has_skull",
                        "no",
                        "-save_script",
                        "aea_anat_to_ocv.tcsh",
                        "-anat",
                        "ANAT_ns+orig",
                        "-epi",
                        fixed::OCV_UNI,
                        "-epi_base",
                        "0",
                    ])
                    .args(split_extra(&cx.config.align_args))
                    .reads("ANAT_ns+orig")
                    .reads(fixed::OCV_UNI)
                    .writes("ANAT_ns_al_mat.aff12.1D"),
            )?;
            b.push(
                Stage::tool("cp")
                    .arg("ANAT_ns_al_mat.aff12.1D")
                    .arg(alignment_matrix.as_str())
                    .reads("ANAT_ns_al_mat.aff12.1D")
                    .writes(alignment_matrix.as_str()),
            )?;
        }
    }

    if cx.config.normalization_target.is_some() {
        let forward_norm = format!("{}_xns2at.aff12.1D", anat.prefix);
        let inverse_norm = format!("{}_xat2ns.aff12.1D", anat.prefix);
        b.push(
            Stage::shell(format!(
                "cat_matvec -ONELINE {start}/{warped}::WARP_DATA -I > {start}/{forward_norm}",
                warped = anat.affine_warped,
            ))
            .reads(anat.affine_warped.as_str())
            .writes(forward_norm.as_str()),
        )?;
        b.push(
            Stage::shell(format!(
                "cat_matvec -ONELINE {start}/{warped}::WARP_DATA > {inverse_norm}",
                warped = anat.affine_warped,
            ))
            .reads(anat.affine_warped.as_str())
            .writes(inverse_norm.as_str()),
        )?;
    }

    let oblique_matrix = cx.scheme.run_tagged("obla2e_mat.1D");
    let oblique_fragment = if cx.geom.oblique_mode {
        format!("{oblique_matrix} ")
    } else {
        String::new()
    };
    let combined = cx.scheme.run_tagged("wmat.aff12.1D");
    let mut stage = Stage::shell(format!(
        "cat_matvec -ONELINE {oblique_fragment}{alignment_matrix} -I > {combined}"
    ))
    .reads(alignment_matrix.as_str())
    .writes(combined);
    if cx.geom.oblique_mode {
        stage = stage.reads(oblique_matrix.clone());
    }
    b.push(stage)?;

    let mut stage = Stage::shell(format!(
        "cat_matvec -ONELINE {oblique_fragment}{alignment_matrix} -I {vr_matrix} > {vrw_matrix}"
    ))
    .reads(alignment_matrix.as_str())
    .reads(vr_matrix)
    .writes(vrw_matrix);
    if cx.geom.oblique_mode {
        stage = stage.reads(oblique_matrix);
    }
    b.push(stage)?;
    Ok(())
}

fn emit_normalization(cx: &Cx, b: &mut PlanBuilder, target: &str) -> Result<(), MecError> {
    let Some(anat) = &cx.anat else {
        return Ok(());
    };
    let start = &cx.start;
    b.push(Stage::shell("afnibin_loc=`which 3dSkullStrip`"))?;
    if let Some((template_dir, _)) = target.rsplit_once('/') {
        b.push(Stage::shell(format!("templateloc={template_dir}")))?;
    } else {
        b.push(Stage::shell("templateloc=${afnibin_loc%/*}"))?;
    }
    let template = target.rsplit('/').next().unwrap_or(target);

    let warp_input = format!("{}.nii.gz", anat.stripped_prefix);
    let already_compressed = matches!(
        mec_spec::parse_name(&anat.stripped).ftype,
        mec_spec::FileType::Ext(ext) if ext == ".nii.gz"
    );
    if !already_compressed {
        b.push(
            Stage::tool("3dcalc")
                .args(["-float", "-a"])
                .arg(anat.stripped.as_str())
                .args(["-expr", "'a'", "-prefix"])
                .arg(warp_input.as_str())
                .reads(anat.stripped.as_str())
                .writes(warp_input.as_str()),
        )?;
    }

    b.section(
        "If can't find affine-warped anatomical, copy native anatomical here, \
         compute warps (takes a while) and save in start dir; otherwise link \
         in existing files",
    );
    let warped = &anat.affine_warped;
    let warped_prefix = format!("{}_at", anat.stripped_prefix);
    b.push(
        Stage::shell(format!(
            "if [ ! -e {start}/{warped} ]; then \\@auto_tlrc -no_ss \
             -init_xform AUTO_CENTER -base ${{templateloc}}/{template} \
             -input {prefix}.nii.gz -suffix _at; \
             cp {warped_prefix}.nii {start}; gzip -f {start}/{warped_prefix}.nii; \
             else if [ ! -e {warped} ]; then ln -s {start}/{warped} .; fi; fi",
            prefix = anat.stripped_prefix,
        ))
        .reads(warp_input.as_str())
        .reads(target)
        .writes(warped.as_str()),
    )?;
    b.push(
        Stage::tool("3dcopy")
            .arg(format!("{start}/{warped}"))
            .arg(&warped_prefix)
            .reads(warped.as_str())
            .writes(format!("{warped_prefix}+tlrc")),
    )?;
    b.push(
        Stage::shell(format!(
            "rm -f {warped_prefix}+orig.*; 3drefit -view orig {warped_prefix}+tlrc"
        ))
        .reads(format!("{warped_prefix}+tlrc"))
        .writes(format!("{warped_prefix}+orig")),
    )?;
    b.push(
        Stage::tool("3dAutobox")
            .args(["-overwrite", "-prefix"])
            .arg(format!("./{}", fixed::ABTEMPLATE))
            .arg(format!("${{templateloc}}/{template}"))
            .reads(target)
            .writes(fixed::ABTEMPLATE),
    )?;

    if cx.config.qwarp_valid() {
        b.section("If can't find non-linearly warped anatomical, compute, save back; otherwise link");
        let nonlinear = &anat.nonlinear_warped;
        b.push(Stage::shell(format!("if [ ! -e {start}/{nonlinear} ]; then")))?;
        b.section("Compute non-linear warp to standard space using 3dQwarp (get lunch, takes a while)");
        b.push(
            Stage::tool("3dUnifize")
                .args(["-overwrite", "-GM", "-prefix"])
                .arg(format!("./{warped_prefix}u.nii.gz"))
                .arg(format!("{start}/{warped}"))
                .reads(warped.as_str())
                .writes(format!("{warped_prefix}u.nii.gz")),
        )?;
        b.push(
            Stage::tool("3dQwarp")
                .args([
                    "-iwarp",
                    "-overwrite",
                    "-resample",
                    "-useweight",
                    "-blur",
                    "2",
                    "2",
                    "-duplo",
                    "-workhard",
                    "-base",
                ])
                .arg(format!("${{templateloc}}/{template}"))
                .arg("-prefix")
                .arg(format!("{start}/{nonlinear}"))
                .arg("-source")
                .arg(format!("./{warped_prefix}u.nii.gz"))
                .reads(format!("{warped_prefix}u.nii.gz"))
                .reads(target)
                .writes(nonlinear.as_str())
                .writes(anat.nonlinear_warp_field.as_str()),
        )?;
        b.push(Stage::shell("fi"))?;
        b.push(
            Stage::shell(format!(
                "if [ ! -e {nonlinear} ]; then ln -s {start}/{nonlinear} .; fi"
            ))
            .reads(nonlinear.as_str()),
        )?;
    }
    Ok(())
}

/// Splits a free-form passthrough argument string into tokens.
pub(super) fn split_extra(args: &str) -> Vec<String> {
    args.split_whitespace().map(|s| s.to_string()).collect()
}

/// Whether the masking stages need the decay/combined volumes reprojected.
pub(super) fn needs_decay_reprojection(cx: &Cx) -> bool {
    cx.align.t2s_align || cx.config.mask_mode != MaskMode::Functional
}
