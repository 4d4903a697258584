use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, MecError};

fn spec_error(code: &str, message: impl Into<String>) -> MecError {
    MecError::InvalidSpecification(ErrorInfo::new(code, message.into()))
}

/// Ordered echo times of a multi-echo acquisition, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoTimes(Vec<f64>);

impl EchoTimes {
    /// Builds an echo-time list, rejecting empty or non-finite entries.
    pub fn new(times: Vec<f64>) -> Result<Self, MecError> {
        if times.is_empty() {
            return Err(spec_error("echo_times_empty", "at least one echo time is required"));
        }
        for &te in &times {
            if !te.is_finite() || te <= 0.0 {
                return Err(spec_error(
                    "echo_time_invalid",
                    format!("echo time {te} is not a positive finite value"),
                ));
            }
        }
        Ok(Self(times))
    }

    /// Parses a comma separated list such as `14.5,38.5,62.5`.
    pub fn parse(list: &str) -> Result<Self, MecError> {
        let mut times = Vec::new();
        for token in list.split(',') {
            let token = token.trim();
            if token.is_empty() {
                return Err(spec_error(
                    "echo_times_malformed",
                    format!("empty entry in echo-time list '{list}'"),
                ));
            }
            let te = token.parse::<f64>().map_err(|_| {
                spec_error(
                    "echo_times_malformed",
                    format!("'{token}' is not a valid echo time in milliseconds"),
                )
            })?;
            times.push(te);
        }
        Self::new(times)
    }

    /// Number of echoes in the acquisition.
    pub fn count(&self) -> usize {
        self.0.len()
    }

    /// Echo times in acquisition order.
    pub fn values(&self) -> &[f64] {
        &self.0
    }

    /// Renders the list back into the comma separated wire form.
    pub fn to_arg(&self) -> String {
        self.0
            .iter()
            .map(|te| te.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Canonical identifier derived from the dataset specification.
///
/// Namespaces every artifact of one acquisition; a configured label is
/// appended at configuration build time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunName(String);

impl RunName {
    /// Creates a run name from its canonical string form.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a copy with `label` appended.
    pub fn with_label(&self, label: &str) -> Self {
        Self(format!("{}{}", self.0, label))
    }
}

impl Display for RunName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_times() {
        let tes = EchoTimes::parse("14.5,38.5,62.5").expect("parse");
        assert_eq!(tes.count(), 3);
        assert_eq!(tes.to_arg(), "14.5,38.5,62.5");
    }

    #[test]
    fn rejects_empty_and_malformed_lists() {
        assert!(EchoTimes::parse("").is_err());
        assert!(EchoTimes::parse("14.5,,38.5").is_err());
        assert!(EchoTimes::parse("14.5,fast").is_err());
        assert!(EchoTimes::parse("-3.0").is_err());
    }

    #[test]
    fn label_is_appended_verbatim() {
        let run = RunName::new("sub01e123");
        assert_eq!(run.with_label("_pilot").as_str(), "sub01e123_pilot");
    }
}
