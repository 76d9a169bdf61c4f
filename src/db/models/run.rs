use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Running" => RunStatus::Running,
            "Completed" => RunStatus::Completed,
            _ => RunStatus::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "Running",
            RunStatus::Completed => "Completed",
            RunStatus::Failed => "Failed",
        }
    }
}

/// Durable audit record for a single tick. Opened by the run tracker at
/// `startRun`, closed at `finishRun` with aggregate counts and structured
/// errors — a run is `Completed` iff every step completed without
/// exception, `Failed` otherwise.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub trigger_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub status: String,
    pub context: String,
    pub opportunities_processed: i64,
    pub notifications_sent: i64,
    pub errors: String,
}

impl Run {
    pub fn status(&self) -> RunStatus {
        RunStatus::parse(&self.status)
    }

    pub fn errors_vec(&self) -> Vec<String> {
        serde_json::from_str(&self.errors).unwrap_or_default()
    }
}

/// Per-step audit row. A `RunStepScope` guard writes this row on every exit
/// path of the step it wraps, including panics, attaching the panic/error
/// message to `error_message` rather than letting the step vanish silently.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RunStep {
    pub id: String,
    pub run_id: String,
    pub step_name: String,
    pub input_data: Option<String>,
    pub output_data: Option<String>,
    pub timestamp: NaiveDateTime,
    pub duration_seconds: f64,
    pub error_message: Option<String>,
}

/// Aggregate result of a tick, returned by `orchestrator::run_tick`.
/// `run_tick` always returns `Ok(RunSummary)` — a tick that failed is
/// reflected in `status`/`errors`, never in the `Result` itself.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub opportunities_processed: i64,
    pub notifications_sent: i64,
    pub errors: Vec<String>,
}
