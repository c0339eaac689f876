use crate::common::error::Result;
use crate::pipeline::{JobContext, RunSummary};
use serde::{Deserialize, Serialize};

/// Raw record as returned from an upstream data-source API.
pub type RawRecord = serde_json::Value;

/// Per-target classification of one fetch attempt. Failures are data, not
/// control flow: a target's outcome never aborts its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    Ok,
    NoData,
    RateLimited,
    ApiError,
}

/// Terminal run states recorded by the run recorder.
/// Lifecycle: running -> ok | error, immutable afterward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Ok,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Ok => "ok",
            RunStatus::Error => "error",
        }
    }
}

/// Core trait that every harvest job implements.
#[async_trait::async_trait]
pub trait HarvestJob: Send + Sync {
    /// Unique identifier for this data source.
    fn source_name(&self) -> &'static str;

    /// Execute one harvest run. Fatal precondition failures (missing
    /// credential, missing input) propagate; per-item upstream failures are
    /// absorbed into the summary.
    async fn run(&self, ctx: &JobContext, run_id: i64) -> Result<RunSummary>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_round_trips_through_serde() {
        let s = serde_json::to_string(&RunStatus::Ok).unwrap();
        assert_eq!(s, "\"ok\"");
        assert_eq!(RunStatus::Error.as_str(), "error");
    }

    #[test]
    fn fetch_outcome_serializes_snake_case() {
        let s = serde_json::to_string(&FetchOutcome::RateLimited).unwrap();
        assert_eq!(s, "\"rate_limited\"");
    }
}
