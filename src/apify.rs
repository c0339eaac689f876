use crate::common::error::{HarvestError, Result};
use crate::common::types::RawRecord;
use serde::Deserialize;
use tracing::{debug, info};

const BASE_URL: &str = "https://api.apify.com/v2";

/// Minimal client for the actor-platform API every social/directory source
/// sits behind: start an actor run, poll until it finishes, download the
/// default dataset.
pub struct ApifyClient {
    http: reqwest::Client,
    token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorRun {
    pub id: String,
    pub status: String,
    pub default_dataset_id: String,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    data: T,
}

impl ApifyClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.into(),
        }
    }

    async fn check(&self, resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(HarvestError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HarvestError::Api {
                message: format!("apify returned {}: {}", status.as_u16(), body),
            });
        }
        Ok(resp)
    }

    /// Start an actor run. Returns immediately with run metadata.
    pub async fn start_actor(&self, actor_id: &str, input: &RawRecord) -> Result<ActorRun> {
        let url = format!("{BASE_URL}/acts/{actor_id}/runs");
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(input)
            .send()
            .await?;
        let resp = self.check(resp).await?;
        let api_resp: ApiResponse<ActorRun> = resp.json().await?;
        Ok(api_resp.data)
    }

    /// Poll until a run completes. Uses `waitForFinish=60` for efficient
    /// long-polling.
    pub async fn wait_for_run(&self, run_id: &str) -> Result<ActorRun> {
        loop {
            let url = format!("{BASE_URL}/actor-runs/{run_id}?waitForFinish=60");
            let resp = self.http.get(&url).bearer_auth(&self.token).send().await?;
            let resp = self.check(resp).await?;
            let api_resp: ApiResponse<ActorRun> = resp.json().await?;
            match api_resp.data.status.as_str() {
                "SUCCEEDED" => return Ok(api_resp.data),
                "FAILED" | "ABORTED" | "TIMED-OUT" => {
                    return Err(HarvestError::Api {
                        message: format!("actor run {} ended {}", run_id, api_resp.data.status),
                    });
                }
                _ => {
                    debug!(run_id, status = %api_resp.data.status, "Run still in progress");
                    continue;
                }
            }
        }
    }

    /// Fetch all items from a completed run's dataset.
    pub async fn dataset_items(&self, dataset_id: &str) -> Result<Vec<RawRecord>> {
        let url = format!("{BASE_URL}/datasets/{dataset_id}/items?format=json&clean=true");
        let resp = self.http.get(&url).bearer_auth(&self.token).send().await?;
        let resp = self.check(resp).await?;
        let items: Vec<RawRecord> = resp.json().await?;
        Ok(items)
    }

    /// Run an actor end-to-end: start, poll to completion, download items.
    pub async fn call_actor(
        &self,
        actor_id: &str,
        input: &RawRecord,
    ) -> Result<(ActorRun, Vec<RawRecord>)> {
        let run = self.start_actor(actor_id, input).await?;
        debug!(actor_id, run_id = %run.id, "Actor run started, polling for completion");
        let completed = self.wait_for_run(&run.id).await?;
        let items = self.dataset_items(&completed.default_dataset_id).await?;
        info!(
            actor_id,
            run_id = %completed.id,
            dataset_id = %completed.default_dataset_id,
            items = items.len(),
            "Actor run complete"
        );
        Ok((completed, items))
    }
}
