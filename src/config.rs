use crate::common::error::{HarvestError, Result};
use crate::fetcher::FetchPlan;
use std::path::PathBuf;
use std::time::Duration;

fn env_trimmed(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_trimmed(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Runtime configuration, built once in `main` and passed to every component.
/// Credentials stay optional here; each job validates the ones it needs before
/// any fetching starts, so a missing credential is a fatal precondition error
/// rather than a mid-run surprise.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub apify_token: Option<String>,
    pub hunter_api_key: Option<String>,
    /// Root directory for object storage and the run/event database.
    pub data_root: PathBuf,
    /// Cooldown between fetch batches, seconds.
    pub sleep_seconds: f64,
    pub batch_size: usize,
    pub parallelism: usize,
    /// Result cardinality limit passed to upstream actors.
    pub max_results: u32,
    pub run_label: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            apify_token: env_trimmed("APIFY_TOKEN"),
            hunter_api_key: env_trimmed("HUNTER_API_KEY"),
            data_root: env_trimmed("HARVEST_DATA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            sleep_seconds: env_parsed("SLEEP_SECONDS", 2.0),
            batch_size: env_parsed("HARVEST_BATCH_SIZE", 30),
            parallelism: env_parsed("HARVEST_PARALLELISM", 4),
            max_results: env_parsed("HARVEST_MAX_RESULTS", 1000),
            run_label: env_trimmed("RUN_LABEL").unwrap_or_default(),
        }
    }

    pub fn apify_token(&self) -> Result<&str> {
        self.apify_token
            .as_deref()
            .ok_or_else(|| HarvestError::Config("Missing APIFY_TOKEN env var".into()))
    }

    pub fn hunter_api_key(&self) -> Result<&str> {
        self.hunter_api_key
            .as_deref()
            .ok_or_else(|| HarvestError::Config("Missing HUNTER_API_KEY env var".into()))
    }

    pub fn fetch_plan(&self) -> FetchPlan {
        FetchPlan {
            batch_size: self.batch_size.max(1),
            parallelism: self.parallelism.max(1),
            stagger: Duration::from_millis(250),
            cooldown: Duration::from_secs_f64(self.sleep_seconds.max(0.0)),
        }
    }
}
