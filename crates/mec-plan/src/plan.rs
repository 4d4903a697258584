//! The compiled plan and its builder.
//!
//! A [`Plan`] is an immutable ordered sequence of [`Stage`]s interleaved
//! with the comments and blank lines of the rendered script. Sequencing
//! alone encodes the dependency contract: the builder refuses any stage
//! consuming an artifact that no earlier stage produced and that is not a
//! declared external input.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use mec_core::{ErrorInfo, MecError};

use crate::artifact::ArtifactId;
use crate::hash::stable_hash_string;

/// One ordered work unit: an opaque external-command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    command: String,
    args: Vec<String>,
    consumes: BTreeSet<ArtifactId>,
    produces: BTreeSet<ArtifactId>,
}

impl Stage {
    /// Starts a stage for the named external command.
    pub fn tool(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            consumes: BTreeSet::new(),
            produces: BTreeSet::new(),
        }
    }

    /// Wraps a full shell line (variable capture, conditional, pipe) as a
    /// single opaque stage.
    pub fn shell(line: impl Into<String>) -> Self {
        Self::tool(line)
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Declares an artifact this stage consumes.
    pub fn reads(mut self, artifact: impl Into<ArtifactId>) -> Self {
        self.consumes.insert(artifact.into());
        self
    }

    /// Declares an artifact this stage produces (possibly overwriting one
    /// it also consumes).
    pub fn writes(mut self, artifact: impl Into<ArtifactId>) -> Self {
        self.produces.insert(artifact.into());
        self
    }

    /// The external command identifier.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Artifacts the stage consumes.
    pub fn consumes(&self) -> &BTreeSet<ArtifactId> {
        &self.consumes
    }

    /// Artifacts the stage produces.
    pub fn produces(&self) -> &BTreeSet<ArtifactId> {
        &self.produces
    }

    /// Renders the stage as one script line.
    pub fn render(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// One entry of the rendered plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entry", content = "value", rename_all = "kebab-case")]
pub enum PlanEntry {
    /// A `# ...` annotation line.
    Comment(String),
    /// A blank separator line.
    Break,
    /// An external-command invocation.
    Stage(Stage),
}

/// Immutable ordered stage sequence; the compiler's sole output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    entries: Vec<PlanEntry>,
    externals: BTreeSet<ArtifactId>,
}

impl Plan {
    /// All entries in emission order.
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    /// Iterates the stages only, in emission order.
    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.entries.iter().filter_map(|entry| match entry {
            PlanEntry::Stage(stage) => Some(stage),
            _ => None,
        })
    }

    /// Inputs the plan assumes to exist before its first stage runs.
    pub fn externals(&self) -> &BTreeSet<ArtifactId> {
        &self.externals
    }

    /// Renders the plan as ordered script lines.
    pub fn script_lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| match entry {
                PlanEntry::Comment(text) => format!("# {text}"),
                PlanEntry::Break => String::new(),
                PlanEntry::Stage(stage) => stage.render(),
            })
            .collect()
    }

    /// Renders the plan as the newline-joined script text.
    pub fn script_text(&self) -> String {
        self.script_lines().join("\n")
    }

    /// Deterministic identity of the compiled plan.
    pub fn plan_hash(&self) -> Result<String, MecError> {
        stable_hash_string(self)
    }

    /// Re-checks the dependency contract over the full sequence.
    ///
    /// Holds by construction for builder-produced plans; exposed so tests
    /// can sweep it across configuration branches.
    pub fn verify_ordering(&self) -> Result<(), MecError> {
        let mut available = self.externals.clone();
        for stage in self.stages() {
            if let Some(missing) = stage.consumes.iter().find(|a| !available.contains(*a)) {
                return Err(ordering_error(stage, missing));
            }
            available.extend(stage.produces.iter().cloned());
        }
        Ok(())
    }
}

fn ordering_error(stage: &Stage, missing: &ArtifactId) -> MecError {
    MecError::Internal(
        ErrorInfo::new(
            "artifact_order_violation",
            "stage consumes an artifact no earlier stage produced",
        )
        .with_context("command", stage.command.clone())
        .with_context("artifact", missing.as_str().to_string()),
    )
}

/// Explicit accumulator for plan emission.
///
/// `restart` models the resume and partial-mode boundaries: everything
/// emitted so far is discarded and its products become externally
/// available inputs for the remaining stages.
#[derive(Debug, Default)]
pub struct PlanBuilder {
    entries: Vec<PlanEntry>,
    externals: BTreeSet<ArtifactId>,
    produced: BTreeSet<ArtifactId>,
}

impl PlanBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an input that exists before the plan runs.
    pub fn external(&mut self, artifact: impl Into<ArtifactId>) {
        self.externals.insert(artifact.into());
    }

    /// Appends a comment line.
    pub fn comment(&mut self, text: impl Into<String>) {
        self.entries.push(PlanEntry::Comment(text.into()));
    }

    /// Appends a blank line followed by a comment, the dominant section
    /// pattern of the rendered script.
    pub fn section(&mut self, text: impl Into<String>) {
        self.entries.push(PlanEntry::Break);
        self.comment(text);
    }

    /// Appends a blank separator line.
    pub fn blank(&mut self) {
        self.entries.push(PlanEntry::Break);
    }

    /// Appends a stage, enforcing the dependency contract.
    pub fn push(&mut self, stage: Stage) -> Result<(), MecError> {
        if let Some(missing) = stage
            .consumes
            .iter()
            .find(|a| !self.produced.contains(*a) && !self.externals.contains(*a))
        {
            return Err(ordering_error(&stage, missing));
        }
        self.produced.extend(stage.produces.iter().cloned());
        self.entries.push(PlanEntry::Stage(stage));
        Ok(())
    }

    /// Discards everything emitted so far and treats its products as
    /// externally available (resume and partial-mode boundaries).
    pub fn restart(&mut self) {
        self.entries.clear();
        self.externals.extend(std::mem::take(&mut self.produced));
    }

    /// Artifacts produced so far.
    pub fn produced(&self) -> &BTreeSet<ArtifactId> {
        &self.produced
    }

    /// Finalizes the accumulated entries into an immutable plan.
    pub fn build(self) -> Plan {
        Plan {
            entries: self.entries,
            externals: self.externals,
        }
    }
}
