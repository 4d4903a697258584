use std::error::Error;
use std::fs;

use clap::Parser;

use mec_core::{EchoTimes, ErrorInfo, MecError};
use mec_plan::{
    compile, derive_geometry, validate, AlignBase, BaseTime, CompilerMode, CoregMode, MaskMode,
    RunConfiguration, SystemProbe, MNI_TEMPLATE,
};
use mec_spec::parse_dataset_spec;

mod toolkit;

#[derive(Parser, Debug)]
#[command(name = "mec", about = "Multi-echo preprocessing plan compiler")]
struct Cli {
    /// Echo times in ms. ex: -e 14.5,38.5,62.5
    #[arg(short = 'e', long = "tes")]
    tes: String,
    /// Input datasets. ex: -d rest_e[1,2,3].nii.gz
    #[arg(short = 'd', long = "input")]
    input: String,
    /// Anatomical dataset. ex: -a mprage.nii.gz
    #[arg(short = 'a', long = "anat")]
    anat: Option<String>,
    /// Time to steady-state equilibration in seconds (s) or volumes (v).
    #[arg(short = 'b', long = "basetime", default_value = "0")]
    basetime: String,
    /// Warp to the canonical standard space.
    #[arg(long = "MNI")]
    mni: bool,
    /// Path to a specific standard-space template for affine normalization.
    #[arg(long)]
    space: Option<String>,
    /// Nonlinear warp to standard space (requires anatomical and template).
    #[arg(long)]
    qwarp: bool,
    /// Output native-space results in addition to standard-space results.
    #[arg(long)]
    native: bool,
    /// Functional voxel dimensions in mm (isotropic) for resampling.
    #[arg(long)]
    fres: Option<f64>,
    /// Anatomical is already intensity-normalized and skull-stripped.
    #[arg(long = "no_skullstrip")]
    no_skullstrip: bool,
    /// Do not de-spike functional data.
    #[arg(long = "no_despike")]
    no_despike: bool,
    /// Do not re-write datasets in axial-first order.
    #[arg(long = "no_axialize")]
    no_axialize: bool,
    /// Masking strategy: func, anat or template.
    #[arg(long = "mask_mode")]
    mask_mode: Option<String>,
    /// Coregistration strategy: lp-t2s or aea.
    #[arg(long = "coreg_mode", default_value = "lp-t2s")]
    coreg_mode: String,
    /// FWHM smoothing width. ex: --smooth 3mm
    #[arg(long = "smooth", default_value = "0mm")]
    smooth: String,
    /// Explicit base dataset or frame index for volume registration.
    #[arg(long = "align_base")]
    align_base: Option<String>,
    /// Repetition time override; read from the header by default.
    #[arg(long = "TR")]
    tr: Option<f64>,
    /// Slice-timing pattern override (e.g. alt+z).
    #[arg(long)]
    tpattern: Option<String>,
    /// Extra arguments for the coregistration routine.
    #[arg(long = "align_args", default_value = "")]
    align_args: String,
    /// Extra arguments for the TE-dependence analysis.
    #[arg(long = "ted_args", default_value = "")]
    ted_args: String,
    /// Highpass filter cutoff in Hz.
    #[arg(long)]
    highpass: Option<f64>,
    /// Detrend polynomial order.
    #[arg(long)]
    detrend: Option<u32>,
    /// Seed-echo hint for the decomposition.
    #[arg(long = "sourceTEs", default_value = "-1")]
    source_tes: String,
    /// Kappa dimensionality-augmentation weight.
    #[arg(long, default_value = "10")]
    daw: String,
    /// Initial optimizer cost function.
    #[arg(long, default_value = "tanh")]
    initcost: String,
    /// Final optimizer cost function.
    #[arg(long, default_value = "tanh")]
    finalcost: String,
    /// Use strict component selection.
    #[arg(long)]
    strict: bool,
    /// Prefix for final output datasets.
    #[arg(long, default_value = "")]
    prefix: String,
    /// Label to tag the analysis folder.
    #[arg(long, default_value = "")]
    label: String,
    /// Maximum number of OpenMP threads.
    #[arg(long, default_value_t = 2)]
    cpus: usize,
    /// Align and preprocess one dataset, then exit.
    #[arg(long = "test_proc")]
    test_proc: bool,
    /// Preprocess only, then exit.
    #[arg(long = "pp_only")]
    pp_only: bool,
    /// Re-run the decomposition against existing preprocessed data.
    #[arg(long = "tedica_only")]
    tedica_only: bool,
    /// Re-run component selection against a fixed mixing matrix.
    #[arg(long = "select_only")]
    select_only: bool,
    /// Export existing decomposition results only.
    #[arg(long = "export_only")]
    export_only: bool,
    /// Keep preprocessing intermediates.
    #[arg(long = "keep_int")]
    keep_int: bool,
    /// Resume from the normalization step onwards.
    #[arg(long = "RESUME")]
    resume: bool,
    /// Overwrite an existing run directory.
    #[arg(long = "OVERWRITE")]
    overwrite: bool,
}

fn resolve_mode(cli: &Cli) -> Result<CompilerMode, MecError> {
    let modes = [
        (cli.pp_only, CompilerMode::PreprocOnly),
        (cli.tedica_only, CompilerMode::DecompositionOnly),
        (cli.select_only, CompilerMode::SelectionOnly),
        (cli.export_only, CompilerMode::ExportOnly),
    ];
    let selected: Vec<CompilerMode> =
        modes.iter().filter(|(on, _)| *on).map(|(_, mode)| *mode).collect();
    match selected.len() {
        0 => Ok(CompilerMode::Full),
        1 => Ok(selected[0]),
        _ => Err(MecError::ConflictingOptions(ErrorInfo::new(
            "multiple_terminal_modes",
            "at most one of --pp_only, --tedica_only, --select_only, --export_only may be set",
        ))),
    }
}

fn build_configuration(cli: &Cli) -> Result<RunConfiguration, MecError> {
    let echo_times = EchoTimes::parse(&cli.tes)?;
    let dataset_spec = parse_dataset_spec(&cli.input)?;
    let normalization_target = if cli.mni {
        Some(MNI_TEMPLATE.to_string())
    } else {
        cli.space.clone()
    };
    // Unset mask mode follows the normalization target: template-assisted
    // when one exists, functional otherwise.
    let mask_mode = match &cli.mask_mode {
        Some(token) => token.parse::<MaskMode>()?,
        None if normalization_target.is_some() => MaskMode::Template,
        None => MaskMode::Functional,
    };

    let mut config = RunConfiguration::new(echo_times, dataset_spec);
    config.anatomical = cli.anat.clone();
    config.base_time = cli.basetime.parse::<BaseTime>()?;
    config.normalization_target = normalization_target;
    config.coreg_mode = cli.coreg_mode.parse::<CoregMode>()?;
    config.mask_mode = mask_mode;
    config.qwarp = cli.qwarp;
    config.native = cli.native;
    config.functional_voxel_size = cli.fres;
    config.anat_stripped = cli.no_skullstrip;
    config.despike = !cli.no_despike;
    config.axialize = !cli.no_axialize;
    config.align_base = match &cli.align_base {
        Some(token) => Some(token.parse::<AlignBase>()?),
        None => None,
    };
    config.tr_override = cli.tr;
    config.tpattern = cli.tpattern.clone();
    config.smoothing = match cli.smooth.as_str() {
        "" | "0mm" => None,
        width => Some(width.to_string()),
    };
    config.detrend = cli.detrend;
    config.highpass = cli.highpass;
    config.resume = cli.resume;
    config.overwrite = cli.overwrite;
    config.keep_intermediates = cli.keep_int;
    config.smoke_test = cli.test_proc;
    config.mode = resolve_mode(cli)?;
    config.strict = cli.strict;
    config.prefix = cli.prefix.clone();
    config.label = cli.label.clone();
    config.cpus = cli.cpus;
    config.align_args = cli.align_args.clone();
    config.decomposition.source_tes = cli.source_tes.clone();
    config.decomposition.kdaw = cli.daw.clone();
    config.decomposition.initcost = cli.initcost.clone();
    config.decomposition.finalcost = cli.finalcost.clone();
    config.decomposition.extra_args = cli.ted_args.clone();
    config.start_dir = std::env::current_dir().map_err(|err| {
        MecError::EnvironmentNotReady(ErrorInfo::new("start_dir_unreadable", err.to_string()))
    })?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = build_configuration(&cli)?;
    validate(&config, &SystemProbe)?;

    let reader = toolkit::ToolkitReader;
    let geometry = derive_geometry(&config, &reader)?;
    let plan = compile(&config, &geometry)?;

    let run = config.run_name()?;
    let script = config.start_dir.join(format!("_mec_{run}.sh"));
    fs::write(&script, format!("{}\n", plan.script_text()))?;
    println!(
        "wrote {} ({} stages, plan {})",
        script.display(),
        plan.stages().count(),
        plan.plan_hash()?
    );
    Ok(())
}
