//! Shared fixtures for the unit tests.

use mec_core::EchoTimes;
use mec_geom::{Affine, InMemoryVolumes, SliceTiming, StoredVolume, Volume, VolumeReader};
use mec_spec::parse_dataset_spec;

use crate::config::RunConfiguration;
use crate::context::{derive_geometry, GeometrySummary};

/// Two-echo configuration with no anatomical and default options.
pub fn two_echo_config() -> RunConfiguration {
    let echo_times = EchoTimes::new(vec![14.5, 38.5]).expect("echo times");
    let dataset_spec = parse_dataset_spec("rest_e[1,2].nii.gz").expect("dataset spec");
    RunConfiguration::new(echo_times, dataset_spec)
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

/// In-memory reader covering every path `config` references.
pub fn reader_for(config: &RunConfiguration) -> InMemoryVolumes {
    let mut reader = InMemoryVolumes::new();
    for echo in 0..config.echo_times.count() {
        let path = config
            .dataset_spec
            .resolve(&config.echo_times, echo)
            .expect("dataset path");
        reader.insert(config.start_dir.join(path), plumb_volume());
    }
    if let Some(anat) = &config.anatomical {
        reader.insert(config.start_dir.join(anat), plumb_volume());
    }
    reader
}

/// Geometry summary for `config` over the synthetic reader.
pub fn summary_for(config: &RunConfiguration) -> GeometrySummary {
    let reader = reader_for(config);
    derive_geometry(config, &reader as &dyn VolumeReader).expect("geometry")
}
