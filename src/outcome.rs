//! Typed results of publish-side steps.
//!
//! Best-effort steps (build, deploy, restart, liveness) never fail a run. Each returns an
//! [`Outcome`] which the run aggregates; failures become entries in the run's error list.

use std::fmt;

use crate::error::SiteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Commit,
    Push,
    Build,
    Deploy,
    Restart,
    Liveness,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            Step::Commit => "commit",
            Step::Push => "push",
            Step::Build => "build",
            Step::Deploy => "deploy",
            Step::Restart => "restart",
            Step::Liveness => "liveness",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Not attempted (disabled in config, or an earlier step failed).
    Skipped(String),
    Failed(String),
}

impl Outcome {
    pub fn from_result<T>(result: Result<T, SiteError>) -> Self {
        match result {
            Ok(_) => Outcome::Success,
            Err(err) => Outcome::Failed(err.headline()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: Step,
    pub outcome: Outcome,
}

impl StepOutcome {
    pub fn new(step: Step, outcome: Outcome) -> Self {
        StepOutcome { step, outcome }
    }

    fn log(&self) {
        match &self.outcome {
            Outcome::Success => tracing::info!("✅ {} succeeded", self.step),
            Outcome::Skipped(reason) => tracing::info!("⏭️ {} skipped: {reason}", self.step),
            Outcome::Failed(reason) => tracing::warn!("⚠️ {} failed: {reason}", self.step),
        }
    }
}

/// Ordered outcomes of the publish-side steps of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    steps: Vec<StepOutcome>,
}

impl PublishReport {
    pub fn record(&mut self, step: Step, outcome: Outcome) -> &Outcome {
        let entry = StepOutcome::new(step, outcome);
        entry.log();
        self.steps.push(entry);
        &self.steps[self.steps.len() - 1].outcome
    }

    pub fn extend(&mut self, other: PublishReport) {
        self.steps.extend(other.steps);
    }

    pub fn steps(&self) -> &[StepOutcome] {
        &self.steps
    }

    pub fn outcome(&self, step: Step) -> Option<&Outcome> {
        self.steps
            .iter()
            .rev()
            .find(|s| s.step == step)
            .map(|s| &s.outcome)
    }

    /// Commit and push both went through.
    pub fn git_succeeded(&self) -> bool {
        [Step::Commit, Step::Push]
            .iter()
            .all(|step| self.outcome(*step).map(Outcome::is_success).unwrap_or(false))
    }

    /// `"<step>: <reason>"` for every failed step.
    pub fn failures(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter_map(|s| match &s.outcome {
                Outcome::Failed(reason) => Some(format!("{}: {reason}", s.step)),
                _ => None,
            })
            .collect()
    }
}
