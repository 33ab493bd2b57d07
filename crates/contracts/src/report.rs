//! RunReport - outcome of one driven pipeline run.

use serde::{Deserialize, Serialize};

use crate::error::{PipeError, PipeResult};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// A result was captured
    Completed,
    /// Source exhausted with nothing reaching the terminal
    NoResult,
    /// Aborted by an error
    Failed,
}

impl RunOutcome {
    /// Classify a terminal result
    pub fn of<T>(result: &PipeResult<T>) -> Self {
        match result {
            Ok(_) => Self::Completed,
            Err(PipeError::NoResult) => Self::NoResult,
            Err(_) => Self::Failed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::NoResult => "no_result",
            Self::Failed => "failed",
        }
    }
}

/// Run metadata collected by the driver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Pipeline name
    pub pipeline: String,

    /// Ticks delivered to the head of the chain
    pub ticks: u64,

    /// Wall time of the run (milliseconds)
    pub duration_ms: f64,

    pub outcome: RunOutcome,
}
