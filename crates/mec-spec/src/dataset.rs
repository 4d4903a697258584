//! Dataset specification resolution.
//!
//! A multi-echo acquisition is described either in shorthand form, with a
//! bracketed echo-marker list (`rest_e[1,2,3].nii.gz`), or in longhand
//! form as a comma separated list of one file per echo. Both resolve to
//! per-echo dataset paths and a canonical run name.

use serde::{Deserialize, Serialize};

use mec_core::{EchoTimes, ErrorInfo, MecError, RunName};

use crate::filename::{parse_name, FileType};

/// Companion suffix appended when a legacy container is addressed by view.
const VIEW_COMPANION: &str = ".HEAD";

fn spec_error(code: &str, message: impl Into<String>) -> MecError {
    MecError::InvalidSpecification(ErrorInfo::new(code, message.into()))
}

/// Shorthand dataset specification: a shared prefix, per-echo markers and
/// a shared trailing segment plus filetype.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShorthandSpec {
    /// Segment before the bracketed marker list.
    pub prefix: String,
    /// Ordered echo markers from inside the brackets.
    pub markers: Vec<String>,
    /// Segment between the closing bracket and the filetype suffix.
    pub trailing: String,
    /// Filetype shared by every echo.
    pub ftype: FileType,
}

/// Longhand dataset specification: one literal file per echo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LonghandSpec {
    /// Ordered per-echo dataset paths.
    pub files: Vec<String>,
}

/// A parsed dataset specification in either form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "kebab-case")]
pub enum DatasetSpec {
    /// Bracketed shorthand form.
    Shorthand(ShorthandSpec),
    /// Comma separated longhand form.
    Longhand(LonghandSpec),
}

/// Parses a dataset specification string in either form.
///
/// The shorthand form is selected when the input carries a bracketed
/// marker list; anything else is treated as longhand.
pub fn parse_dataset_spec(input: &str) -> Result<DatasetSpec, MecError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(spec_error("dataset_spec_empty", "dataset specification is empty"));
    }
    if input.contains('[') {
        parse_shorthand(input).map(DatasetSpec::Shorthand)
    } else {
        let files: Vec<String> = input.split(',').map(|f| f.trim().to_string()).collect();
        if files.iter().any(|f| f.is_empty()) {
            return Err(spec_error(
                "dataset_spec_malformed",
                format!("empty dataset entry in '{input}'"),
            ));
        }
        Ok(DatasetSpec::Longhand(LonghandSpec { files }))
    }
}

fn parse_shorthand(input: &str) -> Result<ShorthandSpec, MecError> {
    let parsed = parse_name(input);
    let fname = parsed.prefix;
    let open = fname.find('[');
    let close = fname.find(']');
    let (open, close) = match (open, close) {
        (Some(open), Some(close)) if close > open => (open, close),
        _ => {
            return Err(spec_error(
                "shorthand_malformed",
                format!("'{input}' does not carry a closed [marker,...] list"),
            ))
        }
    };
    let prefix = fname[..open].to_string();
    let markers: Vec<String> = fname[open + 1..close]
        .split(',')
        .map(|m| m.trim().to_string())
        .collect();
    if markers.iter().any(|m| m.is_empty()) {
        return Err(spec_error(
            "shorthand_malformed",
            format!("empty echo marker in '{input}'"),
        ));
    }
    let trailing = fname[close + 1..].to_string();
    Ok(ShorthandSpec {
        prefix,
        markers,
        trailing,
        ftype: parsed.ftype,
    })
}

impl DatasetSpec {
    /// Number of per-echo datasets the specification describes.
    pub fn dataset_count(&self) -> usize {
        match self {
            DatasetSpec::Shorthand(spec) => spec.markers.len(),
            DatasetSpec::Longhand(spec) => spec.files.len(),
        }
    }

    /// Checks the echo-time/dataset pairing invariant.
    ///
    /// The two lists are matched pairwise by order; a count mismatch is an
    /// error before any plan is built.
    pub fn validate(&self, echo_times: &EchoTimes) -> Result<(), MecError> {
        if self.dataset_count() != echo_times.count() {
            let info = ErrorInfo::new(
                "echo_count_mismatch",
                "number of echo times and input datasets must be equal and matched in order",
            )
            .with_context("echo_times", echo_times.count().to_string())
            .with_context("datasets", self.dataset_count().to_string())
            .with_hint("try double quotes around the dataset argument");
            return Err(MecError::InvalidSpecification(info));
        }
        Ok(())
    }

    /// Resolves the dataset path for `echo` (0-based).
    pub fn resolve(&self, echo_times: &EchoTimes, echo: usize) -> Result<String, MecError> {
        self.validate(echo_times)?;
        if echo >= echo_times.count() {
            return Err(spec_error(
                "echo_index_out_of_range",
                format!("echo index {echo} exceeds the {} configured echoes", echo_times.count()),
            ));
        }
        match self {
            DatasetSpec::Shorthand(spec) => {
                let mut suffix = spec.ftype.as_suffix();
                if spec.ftype.is_view() {
                    suffix.push_str(VIEW_COMPANION);
                }
                Ok(format!(
                    "{}{}{}{}",
                    spec.prefix, spec.markers[echo], spec.trailing, suffix
                ))
            }
            DatasetSpec::Longhand(spec) => Ok(spec.files[echo].clone()),
        }
    }

    /// Derives the canonical run name shared by every echo.
    ///
    /// Shorthand concatenates the prefix, every marker and the trailing
    /// segment. Longhand takes the first file's prefix and appends the
    /// echo-count markers for echoes 2..N.
    pub fn run_name(&self, echo_times: &EchoTimes) -> Result<RunName, MecError> {
        self.validate(echo_times)?;
        match self {
            DatasetSpec::Shorthand(spec) => Ok(RunName::new(format!(
                "{}{}{}",
                spec.prefix,
                spec.markers.concat(),
                spec.trailing
            ))),
            DatasetSpec::Longhand(spec) => {
                let first = parse_name(&spec.files[0]);
                let markers: String = (2..=echo_times.count()).map(|n| n.to_string()).collect();
                Ok(RunName::new(format!("{}{}", first.prefix, markers)))
            }
        }
    }

    /// Filetype of the resolved per-echo datasets.
    pub fn file_type(&self) -> FileType {
        match self {
            DatasetSpec::Shorthand(spec) => spec.ftype.clone(),
            DatasetSpec::Longhand(spec) => parse_name(&spec.files[0]).ftype,
        }
    }
}
