use crate::common::error::Result;
use crate::common::types::{HarvestJob, RawRecord, RunStatus};
use crate::config::AppConfig;
use crate::params::JobParams;
use crate::recorder::RunRecorder;
use crate::storage::ObjectStore;
use metrics::{counter, histogram};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Everything a job needs for one invocation, constructed once in `main` and
/// passed down: no module globals, no hidden state.
pub struct JobContext {
    pub config: AppConfig,
    pub store: Arc<dyn ObjectStore>,
    pub recorder: Arc<dyn RunRecorder>,
    pub params: JobParams,
}

/// Result of a complete job run, surfaced to the CLI and into run metadata.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub source: String,
    pub new_rows: usize,
    pub total_rows: usize,
    /// Whether the master dataset snapshot was persisted this run.
    pub persisted: bool,
    pub meta: RawRecord,
}

/// Run one harvest job inside the run-recorder lifecycle.
///
/// The run row is created before any work starts and always driven to a
/// terminal status: `ok` with summary metadata on success, `error` with the
/// failure message when a fatal precondition propagates out of the job.
pub async fn run_job(job: &dyn HarvestJob, ctx: &JobContext) -> Result<RunSummary> {
    let source = job.source_name();
    let run_id = ctx.recorder.start_run(source, &ctx.params.label).await?;
    info!(source, run_id, "Starting harvest run");
    counter!("harvest_runs_total", "source" => source).increment(1);
    let started = std::time::Instant::now();

    match job.run(ctx, run_id).await {
        Ok(summary) => {
            let meta = json!({
                "new_rows": summary.new_rows,
                "total_rows": summary.total_rows,
                "persisted": summary.persisted,
                "detail": summary.meta,
            });
            ctx.recorder
                .finish_run(run_id, RunStatus::Ok, Some(meta))
                .await?;
            let elapsed = started.elapsed().as_secs_f64();
            histogram!("harvest_run_duration_seconds", "source" => source).record(elapsed);
            counter!("harvest_rows_total", "source" => source)
                .increment(summary.new_rows as u64);
            info!(
                source,
                run_id,
                new_rows = summary.new_rows,
                total_rows = summary.total_rows,
                elapsed_secs = elapsed,
                "Harvest run finished ok"
            );
            Ok(summary)
        }
        Err(e) => {
            error!(source, run_id, error = %e, "Harvest run failed");
            counter!("harvest_run_errors_total", "source" => source).increment(1);
            ctx.recorder
                .finish_run(run_id, RunStatus::Error, Some(json!({"error": e.to_string()})))
                .await?;
            Err(e)
        }
    }
}

/// Stream result rows to the audit store without letting a persistence
/// failure abort the harvest.
pub async fn append_rows_best_effort(
    recorder: &dyn RunRecorder,
    run_id: i64,
    source: &str,
    rows: &[RawRecord],
) {
    if let Err(e) = recorder.append_rows(run_id, source, rows).await {
        warn!(source, run_id, error = %e, "Failed to append result rows, continuing");
    }
}

/// Persist a master dataset snapshot, absorbing storage failures. Returns
/// whether the write landed; callers skip the progress-state update when it
/// did not, so the next run re-attempts the same items (at-least-once).
pub async fn persist_master_best_effort(
    store: &dyn ObjectStore,
    key: &str,
    rows: &[RawRecord],
) -> bool {
    match crate::merge::save_master(store, key, rows).await {
        Ok(()) => true,
        Err(e) => {
            warn!(key, error = %e, "Failed to persist master dataset, keeping in-memory results");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::HarvestError;
    use crate::recorder::SqliteRunRecorder;
    use crate::storage::InMemoryObjectStore;
    use std::path::PathBuf;

    fn test_ctx(recorder: Arc<SqliteRunRecorder>) -> JobContext {
        JobContext {
            config: AppConfig {
                apify_token: Some("token".into()),
                hunter_api_key: None,
                data_root: PathBuf::from("data"),
                sleep_seconds: 0.0,
                batch_size: 2,
                parallelism: 2,
                max_results: 10,
                run_label: String::new(),
            },
            store: Arc::new(InMemoryObjectStore::new()),
            recorder,
            params: JobParams::default(),
        }
    }

    struct FixedJob {
        fail: bool,
    }

    #[async_trait::async_trait]
    impl HarvestJob for FixedJob {
        fn source_name(&self) -> &'static str {
            "fixed"
        }

        async fn run(&self, _ctx: &JobContext, _run_id: i64) -> Result<RunSummary> {
            if self.fail {
                return Err(HarvestError::Config("Missing TEST_TOKEN env var".into()));
            }
            Ok(RunSummary {
                source: "fixed".into(),
                new_rows: 2,
                total_rows: 5,
                persisted: true,
                meta: json!({"city": "Miami, FL"}),
            })
        }
    }

    #[tokio::test]
    async fn successful_run_is_marked_ok_with_meta() {
        let recorder = Arc::new(SqliteRunRecorder::open_in_memory().unwrap());
        let ctx = test_ctx(recorder.clone());

        let summary = run_job(&FixedJob { fail: false }, &ctx).await.unwrap();
        assert_eq!(summary.new_rows, 2);

        let (status, meta) = recorder.run_status(1).unwrap().unwrap();
        assert_eq!(status, "ok");
        let meta: RawRecord = serde_json::from_str(&meta.unwrap()).unwrap();
        assert_eq!(meta["new_rows"], 2);
        assert_eq!(meta["detail"]["city"], "Miami, FL");
    }

    #[tokio::test]
    async fn fatal_precondition_marks_run_error_and_propagates() {
        let recorder = Arc::new(SqliteRunRecorder::open_in_memory().unwrap());
        let ctx = test_ctx(recorder.clone());

        let err = run_job(&FixedJob { fail: true }, &ctx).await.unwrap_err();
        assert!(matches!(err, HarvestError::Config(_)));

        let (status, meta) = recorder.run_status(1).unwrap().unwrap();
        assert_eq!(status, "error");
        assert!(meta.unwrap().contains("TEST_TOKEN"));
    }
}
