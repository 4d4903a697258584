#![allow(dead_code)]

use mec_core::EchoTimes;
use mec_geom::{Affine, InMemoryVolumes, SliceTiming, StoredVolume, Volume};
use mec_plan::{derive_geometry, GeometrySummary, RunConfiguration, StaticProbe};
use mec_spec::parse_dataset_spec;

/// Two-echo configuration with no anatomical and default options.
pub fn two_echo_config() -> RunConfiguration {
    let echo_times = EchoTimes::new(vec![14.5, 38.5]).expect("echo times");
    let dataset_spec = parse_dataset_spec("rest_e[1,2].nii.gz").expect("dataset spec");
    RunConfiguration::new(echo_times, dataset_spec)
}

/// Three-echo configuration with an anatomical reference.
pub fn anat_config() -> RunConfiguration {
    let echo_times = EchoTimes::new(vec![14.5, 38.5, 62.5]).expect("echo times");
    let dataset_spec = parse_dataset_spec("rest_e[1,2,3].nii.gz").expect("dataset spec");
    let mut config = RunConfiguration::new(echo_times, dataset_spec);
    config.anatomical = Some("mprage.nii.gz".to_string());
    config
}

/// Plumb synthetic volume with a 2 s repetition time.
pub fn plumb_volume() -> StoredVolume {
    StoredVolume {
        affine: Affine::scaled([3.0, 3.0, 3.5], [-90.0, -126.0, -72.0]),
        voxel_dims: [3.0, 3.0, 3.5],
        slice_timing: SliceTiming {
            slice_duration: 0.08,
            slice_count: 25,
        },
        volume: Volume::constant(1.0, [4, 4, 4]),
    }
}

/// Volume rotated 12 degrees about z, detected as oblique.
pub fn oblique_volume() -> StoredVolume {
    let (sin, cos) = 12.0_f64.to_radians().sin_cos();
    let mut affine = Affine::identity();
    affine.0[0][0] = 3.0 * cos;
    affine.0[0][1] = -3.0 * sin;
    affine.0[1][0] = 3.0 * sin;
    affine.0[1][1] = 3.0 * cos;
    affine.0[2][2] = 3.5;
    StoredVolume {
        affine,
        voxel_dims: [3.0, 3.0, 3.5],
        slice_timing: SliceTiming {
            slice_duration: 0.08,
            slice_count: 25,
        },
        volume: Volume::constant(1.0, [4, 4, 4]),
    }
}

/// In-memory reader covering every path `config` references.
pub fn reader_for(config: &RunConfiguration) -> InMemoryVolumes {
    reader_with(config, plumb_volume())
}

/// Reader serving `stored` for every referenced path.
pub fn reader_with(config: &RunConfiguration, stored: StoredVolume) -> InMemoryVolumes {
    let mut reader = InMemoryVolumes::new();
    for echo in 0..config.echo_times.count() {
        let path = config
            .dataset_spec
            .resolve(&config.echo_times, echo)
            .expect("dataset path");
        reader.insert(config.start_dir.join(path), stored.clone());
    }
    if let Some(anat) = &config.anatomical {
        reader.insert(config.start_dir.join(anat), stored.clone());
    }
    reader
}

/// Geometry summary for `config` over the plumb synthetic reader.
pub fn summary_for(config: &RunConfiguration) -> GeometrySummary {
    derive_geometry(config, &reader_for(config)).expect("geometry")
}

/// Probe with every referenced file present and the toolkit configured.
pub fn probe_for(config: &RunConfiguration) -> StaticProbe {
    let mut probe = StaticProbe::ready();
    for echo in 0..config.echo_times.count() {
        let dataset = config
            .dataset_spec
            .resolve(&config.echo_times, echo)
            .expect("dataset path");
        probe = probe.with_file(config.start_dir.join(dataset));
    }
    if let Some(anat) = &config.anatomical {
        probe = probe.with_file(config.start_dir.join(anat));
    }
    if config.resume {
        let run = config.run_name().expect("run name");
        probe = probe.with_dir(config.start_dir.join(format!("mec.{run}")));
    }
    probe
}
