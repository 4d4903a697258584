//! The plan compiler.
//!
//! Emits the ordered stage groups in a fixed sequence, each guarded by
//! configuration predicates: setup, anatomical preparation, functional
//! ingestion, motion baseline, per-echo preliminary preprocessing, decay
//! estimation, the resume boundary, anatomical alignment, masking,
//! per-echo extended preprocessing, concatenation, decomposition handoff
//! and export. The compiler reasons purely about artifact names; it
//! either returns a complete plan or fails before emitting anything.

mod align;
mod baseline;
mod export;
mod func;

use mec_core::{ErrorInfo, MecError};

use crate::artifact::NamingScheme;
use crate::config::{CompilerMode, RunConfiguration};
use crate::context::{
    AlignmentContext, AnatContext, GeometryContext, GeometrySummary, TimingContext,
};
use crate::plan::{Plan, PlanBuilder, Stage};

/// Everything the stage groups read while emitting.
pub(crate) struct Cx<'a> {
    pub config: &'a RunConfiguration,
    pub scheme: NamingScheme,
    pub timing: TimingContext,
    pub geom: GeometryContext,
    pub align: AlignmentContext,
    pub anat: Option<AnatContext>,
    pub start: String,
}

impl Cx<'_> {
    pub fn echo_count(&self) -> usize {
        self.config.echo_times.count()
    }

    pub fn dataset(&self, echo: usize) -> Result<String, MecError> {
        self.config.dataset_spec.resolve(&self.config.echo_times, echo)
    }

    pub fn te_arg(&self) -> String {
        self.config.echo_times.to_arg()
    }

    /// `e<n>` token for a 0-based echo index.
    pub fn etok(&self, echo: usize) -> String {
        self.scheme.echo_token(echo)
    }

    pub fn run_dir(&self) -> String {
        self.scheme.run_dir()
    }
}

/// Compiles a validated configuration and derived geometry into a plan.
///
/// Pure function of its inputs: identical configuration and geometry
/// always yield an identical ordered stage list.
pub fn compile(config: &RunConfiguration, geometry: &GeometrySummary) -> Result<Plan, MecError> {
    config.dataset_spec.validate(&config.echo_times)?;
    if config.qwarp && !config.qwarp_valid() {
        return Err(MecError::ConflictingOptions(
            ErrorInfo::new(
                "qwarp_requires_anat_and_target",
                "nonlinear normalization needs both an anatomical and a template",
            )
            .with_hint("supply -a and --space (or --MNI) together with --qwarp"),
        ));
    }
    let run = config.run_name()?;
    let scheme = NamingScheme::new(run.clone());
    let timing = TimingContext::derive(config, geometry)?;
    let geom = GeometryContext::derive(geometry);
    let align = AlignmentContext::derive(config);
    let anat = AnatContext::derive(config, &geom);
    let start = if config.start_dir.as_os_str().is_empty() {
        ".".to_string()
    } else {
        config.start_dir.display().to_string()
    };
    let cx = Cx {
        config,
        scheme,
        timing,
        geom,
        align,
        anat,
        start,
    };

    let mut builder = PlanBuilder::new();
    declare_externals(&cx, &mut builder)?;
    emit_setup(&cx, &mut builder)?;
    if cx.anat.is_some() {
        align::emit_anat_preparation(&cx, &mut builder)?;
    }
    baseline::emit_ingestion(&cx, &mut builder)?;
    baseline::emit_motion_baseline(&cx, &mut builder)?;
    baseline::emit_preliminary(&cx, &mut builder)?;
    baseline::emit_decay_estimation(&cx, &mut builder)?;

    if config.resume {
        builder.restart();
        emit_resume_preamble(&cx, &mut builder)?;
    }

    align::emit_alignment(&cx, &mut builder)?;
    func::emit_scaling_prologue(&cx, &mut builder)?;
    func::emit_masking(&cx, &mut builder)?;
    let stopped = func::emit_extended(&cx, &mut builder)?;
    if stopped {
        return Ok(builder.build());
    }
    func::emit_concatenation(&cx, &mut builder)?;

    if config.resume {
        export::emit_cache_clear(&mut builder)?;
    }
    if config.mode == CompilerMode::DecompositionOnly {
        builder.restart();
        emit_partial_preamble(&cx, &mut builder, "Re-run the TE-dependence analysis")?;
    }
    if config.mode != CompilerMode::PreprocOnly {
        export::emit_decomposition(&cx, &mut builder)?;
        if config.mode == CompilerMode::SelectionOnly {
            builder.restart();
            emit_partial_preamble(&cx, &mut builder, "Re-run component selection")?;
            export::emit_selection(&cx, &mut builder)?;
        }
        if config.mode == CompilerMode::ExportOnly {
            builder.restart();
            emit_partial_preamble(&cx, &mut builder, "Export existing analysis results")?;
        }
        export::emit_export(&cx, &mut builder)?;
    }

    Ok(builder.build())
}

fn declare_externals(cx: &Cx, b: &mut PlanBuilder) -> Result<(), MecError> {
    for echo in 0..cx.echo_count() {
        b.external(cx.dataset(echo)?);
    }
    if let Some(anat) = &cx.anat {
        b.external(anat.raw.clone());
    }
    if let Some(target) = &cx.config.normalization_target {
        b.external(target.clone());
    }
    if let Some(crate::config::AlignBase::External(file)) = &cx.config.align_base {
        b.external(file.clone());
    }
    b.external(cx.scheme.script_name());
    Ok(())
}

fn emit_setup(cx: &Cx, b: &mut PlanBuilder) -> Result<(), MecError> {
    b.comment("Set up script run environment");
    b.push(Stage::shell("set -e"))?;
    b.push(Stage::shell(format!("export OMP_NUM_THREADS={}", cx.config.cpus)))?;
    b.push(Stage::shell(format!("export MKL_NUM_THREADS={}", cx.config.cpus)))?;
    b.push(Stage::shell("export AFNI_3dDespike_NEW=YES"))?;
    b.push(Stage::tool("mkdir").arg("-p").arg(cx.run_dir()))?;
    let script = cx.scheme.script_name();
    if !matches!(
        cx.config.mode,
        CompilerMode::DecompositionOnly | CompilerMode::SelectionOnly
    ) {
        b.push(
            Stage::tool("cp")
                .arg(&script)
                .arg(format!("{}/", cx.run_dir()))
                .reads(script.as_str()),
        )?;
    }
    b.push(Stage::tool("cd").arg(cx.run_dir()))?;
    Ok(())
}

fn emit_resume_preamble(cx: &Cx, b: &mut PlanBuilder) -> Result<(), MecError> {
    b.comment("Resume preprocessing from the normalization step");
    b.push(Stage::shell("set -e"))?;
    b.push(Stage::shell(format!(
        "if [ ! -e {dir}/_mec.orig.sh ]; then mv `ls {dir}/_mec*sh` {dir}/_mec.orig.sh; fi",
        dir = cx.run_dir()
    )))?;
    b.push(Stage::tool("cd").arg(cx.run_dir()))?;
    b.push(Stage::shell("export AFNI_DECONFLICT=OVERWRITE"))?;
    Ok(())
}

fn emit_partial_preamble(cx: &Cx, b: &mut PlanBuilder, comment: &str) -> Result<(), MecError> {
    b.comment(comment);
    b.push(Stage::shell("set -e"))?;
    b.push(Stage::tool("cd").arg(cx.run_dir()))?;
    Ok(())
}
