//! Plan compilation for multi-echo functional preprocessing.
//!
//! Turns a validated [`RunConfiguration`] and derived volume geometry
//! into a deterministic, ordered [`Plan`] of external-toolkit
//! invocations. The compiler emits stages in a fixed group order and
//! threads a deterministic artifact-naming scheme through every stage,
//! so each stage's inputs are guaranteed to have been produced earlier.

pub mod artifact;
pub mod compiler;
pub mod config;
pub mod context;
pub mod hash;
pub mod plan;
pub mod serde;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use artifact::{ArtifactId, NamingScheme, WarpCode};
pub use compiler::compile;
pub use config::{
    AlignBase, BaseTime, CompilerMode, CoregMode, DecompositionOpts, MaskMode, RunConfiguration,
    MNI_TEMPLATE,
};
pub use context::{derive_geometry, GeometrySummary, TimingContext};
pub use hash::stable_hash_string;
pub use plan::{Plan, PlanBuilder, PlanEntry, Stage};
pub use serde::{from_json_slice, from_yaml_slice, to_canonical_json_bytes, to_yaml_string};
pub use validate::{validate, Probe, StaticProbe, SystemProbe, TOOLKIT_ENV_VARS};
