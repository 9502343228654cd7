//! Verification runs and their write-once outcomes.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::error::{PapercutError, Result};
use crate::mutation::Choice;
use crate::verify::{ProofOutcome, Verdict};

/// What a run verifies
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOrigin {
    /// One branch of one rewrite
    Branch(Choice),
    /// One exhaustive combination
    Combination(Vec<Choice>),
    /// The mux-encoded design with every select neutral
    Muxed,
    /// The consolidated design
    Consolidated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Passed,
    Failed,
}

impl RunState {
    pub fn is_resolved(self) -> bool {
        matches!(self, RunState::Passed | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Pending => write!(f, "pending"),
            RunState::Running => write!(f, "running"),
            RunState::Passed => write!(f, "passed"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

/// One verification job
#[derive(Debug, Clone)]
pub struct Run {
    pub id: usize,
    /// Name of the design under test
    pub name: String,
    pub wrapper: String,
    pub origin: RunOrigin,
    state: RunState,
    output: String,
    exit_code: Option<i32>,
    elapsed: Duration,
}

impl Run {
    pub fn new(id: usize, name: impl Into<String>, wrapper: impl Into<String>, origin: RunOrigin) -> Self {
        Self {
            id,
            name: name.into(),
            wrapper: wrapper.into(),
            origin,
            state: RunState::Pending,
            output: String::new(),
            exit_code: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn passed(&self) -> bool {
        self.state == RunState::Passed
    }

    pub fn verdict(&self) -> Option<Verdict> {
        match self.state {
            RunState::Passed => Some(Verdict::Pass),
            RunState::Failed => Some(Verdict::Fail),
            _ => None,
        }
    }

    pub fn mark_running(&mut self) -> Result<()> {
        if self.state.is_resolved() {
            return Err(self.already_recorded());
        }
        self.state = RunState::Running;
        Ok(())
    }

    /// Record the prover outcome. An outcome can only be recorded once.
    pub fn record(&mut self, outcome: ProofOutcome) -> Result<()> {
        if self.state.is_resolved() {
            return Err(self.already_recorded());
        }
        self.state = match outcome.verdict {
            Verdict::Pass => RunState::Passed,
            Verdict::Fail => RunState::Failed,
        };
        self.output = outcome.output;
        self.exit_code = outcome.exit_code;
        self.elapsed = outcome.elapsed;
        Ok(())
    }

    fn already_recorded(&self) -> PapercutError {
        PapercutError::OutcomeAlreadyRecorded {
            run: self.name.clone(),
        }
    }
}
