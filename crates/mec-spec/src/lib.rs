//! Dataset specification parsing and run-name derivation for MEC.

pub mod dataset;
pub mod filename;

pub use dataset::{parse_dataset_spec, DatasetSpec, LonghandSpec, ShorthandSpec};
pub use filename::{parse_name, FileType, ParsedName};
