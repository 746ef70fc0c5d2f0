//! Simulation run lifecycle
//!
//! idle → running → {completed | paused | error}, paused → running | error.
//! Completed and error are terminal for a run; a new run starts from idle.

use chrono::{DateTime, Utc};
use mindstream_core::{Error, Metadata, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Paused,
    Completed,
    Error,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Error)
    }

    pub fn can_transition(self, to: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, to),
            (Idle, Running)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Error)
                | (Paused, Running)
                | (Paused, Error)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::Completed => "completed",
            RunState::Error => "error",
        };
        f.write_str(s)
    }
}

/// One run of the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub name: String,
    pub state: RunState,
    /// Percent complete, 0..=100.
    pub progress: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub parameters: Metadata,
    /// Final metric values, set when the run completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Metadata>,
}

impl Run {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            state: RunState::Idle,
            progress: 0.0,
            started_at: None,
            ended_at: None,
            error: None,
            parameters: Metadata::new(),
            results: None,
        }
    }

    pub fn with_parameters(mut self, parameters: Metadata) -> Self {
        self.parameters = parameters;
        self
    }

    /// Move to `to`, stamping start/end times. Invalid moves leave the run untouched.
    pub fn transition(&mut self, to: RunState) -> Result<()> {
        if !self.state.can_transition(to) {
            return Err(Error::invalid_transition(self.state, to));
        }
        if self.state == RunState::Idle && to == RunState::Running {
            self.started_at = Some(Utc::now());
        }
        if to.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        if to == RunState::Completed {
            self.progress = 100.0;
        }
        self.state = to;
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(RunState::Error)?;
        self.error = Some(reason.into());
        Ok(())
    }

    /// Complete the run and record its results.
    pub fn complete_with(&mut self, results: Metadata) -> Result<()> {
        self.transition(RunState::Completed)?;
        self.results = Some(results);
        Ok(())
    }

    /// Add progress, capped at 100. Returns true when the run just reached 100.
    pub fn advance_progress(&mut self, delta: f64) -> bool {
        if self.state != RunState::Running || !delta.is_finite() {
            return false;
        }
        self.progress = (self.progress + delta.max(0.0)).min(100.0);
        self.progress >= 100.0
    }
}
