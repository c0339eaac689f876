use crate::common::error::HarvestError;
use crate::common::types::{FetchOutcome, RawRecord};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Shape of one batched fetch pass: fixed-size batches run sequentially,
/// bounded parallelism inside a batch, a stagger before each task so a batch
/// does not burst against the upstream rate limiter, and a cooldown between
/// batches.
#[derive(Debug, Clone)]
pub struct FetchPlan {
    pub batch_size: usize,
    pub parallelism: usize,
    pub stagger: Duration,
    pub cooldown: Duration,
}

impl Default for FetchPlan {
    fn default() -> Self {
        Self {
            batch_size: 30,
            parallelism: 4,
            stagger: Duration::from_millis(250),
            cooldown: Duration::from_secs(2),
        }
    }
}

/// What a successful fetch call yields: zero or more raw records plus the
/// upstream dataset/session identifier when one exists.
#[derive(Debug, Default)]
pub struct FetchPayload {
    pub records: Vec<RawRecord>,
    pub dataset_id: Option<String>,
}

/// Outcome of one target's fetch. Never an `Err`: failure is recorded here
/// and reported in the batch summary, not raised to the caller.
#[derive(Debug)]
pub struct FetchResult<T> {
    pub target: T,
    pub outcome: FetchOutcome,
    pub records: Vec<RawRecord>,
    pub dataset_id: Option<String>,
    pub error: Option<String>,
}

/// Per-run tallies of fetch outcomes, reported in run metadata.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct BatchReport {
    pub ok: usize,
    pub no_data: usize,
    pub rate_limited: usize,
    pub api_errors: usize,
}

impl BatchReport {
    pub fn tally<T>(results: &[FetchResult<T>]) -> Self {
        let mut report = Self::default();
        for r in results {
            match r.outcome {
                FetchOutcome::Ok => report.ok += 1,
                FetchOutcome::NoData => report.no_data += 1,
                FetchOutcome::RateLimited => report.rate_limited += 1,
                FetchOutcome::ApiError => report.api_errors += 1,
            }
        }
        report
    }
}

/// Fetch every target through `fetch`, batch by batch.
///
/// Batches execute strictly sequentially with `plan.cooldown` between them;
/// within a batch up to `plan.parallelism` fetches run concurrently, each
/// delayed by its slot index times `plan.stagger`. Results arrive in
/// completion order within a batch -- callers must not assume submission
/// order. A rate-limit signal is classified `rate_limited`, distinct from
/// `api_error`; neither aborts siblings or later batches.
pub async fn fetch_all<T, F, Fut>(targets: Vec<T>, plan: &FetchPlan, fetch: F) -> Vec<FetchResult<T>>
where
    T: Clone + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = crate::Result<FetchPayload>> + Send + 'static,
{
    let fetch = Arc::new(fetch);
    let batch_size = plan.batch_size.max(1);
    let total_batches = targets.len().div_ceil(batch_size);
    let mut results = Vec::with_capacity(targets.len());

    let batches: Vec<Vec<T>> = targets
        .chunks(batch_size)
        .map(|chunk| chunk.to_vec())
        .collect();

    for (batch_index, batch) in batches.into_iter().enumerate() {
        if batch_index > 0 && !plan.cooldown.is_zero() {
            tokio::time::sleep(plan.cooldown).await;
        }

        let semaphore = Arc::new(Semaphore::new(plan.parallelism.max(1)));
        let mut tasks: JoinSet<FetchResult<T>> = JoinSet::new();

        for (slot, target) in batch.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let fetch = fetch.clone();
            let stagger = plan.stagger;
            tasks.spawn(async move {
                if !stagger.is_zero() {
                    tokio::time::sleep(stagger * slot as u32).await;
                }
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("fetch semaphore closed");
                match fetch(target.clone()).await {
                    Ok(payload) => {
                        let outcome = if payload.records.is_empty() {
                            FetchOutcome::NoData
                        } else {
                            FetchOutcome::Ok
                        };
                        FetchResult {
                            target,
                            outcome,
                            records: payload.records,
                            dataset_id: payload.dataset_id,
                            error: None,
                        }
                    }
                    Err(HarvestError::RateLimited) => FetchResult {
                        target,
                        outcome: FetchOutcome::RateLimited,
                        records: Vec::new(),
                        dataset_id: None,
                        error: Some("rate_limited".into()),
                    },
                    Err(e) => FetchResult {
                        target,
                        outcome: FetchOutcome::ApiError,
                        records: Vec::new(),
                        dataset_id: None,
                        error: Some(e.to_string()),
                    },
                }
            });
        }

        // Barrier: the whole batch completes before the next one starts.
        let batch_start = results.len();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!(error = %e, "Fetch task panicked"),
            }
        }

        let report = BatchReport::tally(&results[batch_start..]);
        info!(
            batch = batch_index + 1,
            total_batches,
            ok = report.ok,
            no_data = report.no_data,
            rate_limited = report.rate_limited,
            api_errors = report.api_errors,
            "Batch complete"
        );
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quick_plan() -> FetchPlan {
        FetchPlan {
            batch_size: 3,
            parallelism: 2,
            stagger: Duration::ZERO,
            cooldown: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_siblings() {
        let targets = vec!["a", "b", "c", "d", "e"];
        let results = fetch_all(targets, &quick_plan(), |t: &'static str| async move {
            if t == "c" {
                Err(HarvestError::Api {
                    message: "boom".into(),
                })
            } else {
                Ok(FetchPayload {
                    records: vec![json!({"target": t})],
                    dataset_id: Some(format!("ds-{t}")),
                })
            }
        })
        .await;

        assert_eq!(results.len(), 5);
        let report = BatchReport::tally(&results);
        assert_eq!(report.ok, 4);
        assert_eq!(report.api_errors, 1);
        let failed = results.iter().find(|r| r.target == "c").unwrap();
        assert_eq!(failed.outcome, FetchOutcome::ApiError);
        assert_eq!(failed.error.as_deref(), Some("API error: boom"));
    }

    #[tokio::test]
    async fn rate_limit_is_classified_distinctly() {
        let results = fetch_all(vec![1u32, 2], &quick_plan(), |t: u32| async move {
            if t == 1 {
                Err(HarvestError::RateLimited)
            } else {
                Err(HarvestError::Api {
                    message: "other".into(),
                })
            }
        })
        .await;

        let report = BatchReport::tally(&results);
        assert_eq!(report.rate_limited, 1);
        assert_eq!(report.api_errors, 1);
    }

    #[tokio::test]
    async fn empty_payload_is_no_data() {
        let results = fetch_all(vec!["x"], &quick_plan(), |_| async {
            Ok(FetchPayload::default())
        })
        .await;
        assert_eq!(results[0].outcome, FetchOutcome::NoData);
    }

    #[tokio::test]
    async fn parallelism_within_a_batch_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let plan = FetchPlan {
            batch_size: 8,
            parallelism: 2,
            stagger: Duration::ZERO,
            cooldown: Duration::ZERO,
        };
        let (in_flight2, peak2) = (in_flight.clone(), peak.clone());
        let results = fetch_all(vec![0u32; 8], &plan, move |_| {
            let in_flight = in_flight2.clone();
            let peak = peak2.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(FetchPayload {
                    records: vec![json!(1)],
                    dataset_id: None,
                })
            }
        })
        .await;

        assert_eq!(results.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn every_target_gets_exactly_one_result() {
        let plan = FetchPlan {
            batch_size: 4,
            parallelism: 3,
            stagger: Duration::ZERO,
            cooldown: Duration::ZERO,
        };
        let results = fetch_all((0..10u32).collect(), &plan, |t: u32| async move {
            Ok(FetchPayload {
                records: vec![json!(t)],
                dataset_id: None,
            })
        })
        .await;
        let mut targets: Vec<u32> = results.iter().map(|r| r.target).collect();
        targets.sort_unstable();
        assert_eq!(targets, (0..10).collect::<Vec<_>>());
    }
}
