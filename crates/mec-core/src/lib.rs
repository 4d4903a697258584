#![deny(missing_docs)]
#![doc = "Core error taxonomy and shared primitives for the MEC plan compiler."]

pub mod errors;
mod types;

pub use errors::{ErrorInfo, MecError};
pub use types::{EchoTimes, RunName};
