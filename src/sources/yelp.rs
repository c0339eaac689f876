use crate::apify::ApifyClient;
use crate::common::constants::{master_key, DEFAULT_CITIES, YELP_ACTOR_ID, YELP_SOURCE};
use crate::common::error::Result;
use crate::common::types::{HarvestJob, RawRecord};
use crate::fetcher::{fetch_all, BatchReport, FetchPayload};
use crate::merge;
use crate::pipeline::{append_rows_best_effort, persist_master_best_effort, JobContext, RunSummary};
use crate::progress::ProgressStore;
use crate::sources::{keywords_for_run, now_stamp, resolve_city};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// One business as the review-site actor returns it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YelpListing {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub full_address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zipcode: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub review_count: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl YelpListing {
    fn into_row(self, keyword: &str, search_city: &str, stamp: &str) -> RawRecord {
        json!({
            "business_name": self.name,
            "full_address": self.full_address,
            "city": self.city,
            "state": self.state,
            "zipcode": self.zipcode,
            "phone": self.phone_number,
            "website": self.website,
            "yelp_url": self.url,
            "rating": self.rating,
            "review_count": self.review_count,
            "search_keyword": keyword,
            "search_city": search_city,
            "batch_city": search_city,
            "scraped_at": stamp,
        })
    }
}

fn listing_key(row: &RawRecord) -> Option<String> {
    merge::string_field_key(row, "yelp_url")
}

/// Review-site crawl: one city per run, one actor call per keyword, with a
/// durable seen-URL set so a listing is only ever emitted once.
pub struct YelpJob;

#[async_trait]
impl HarvestJob for YelpJob {
    fn source_name(&self) -> &'static str {
        YELP_SOURCE
    }

    async fn run(&self, ctx: &JobContext, run_id: i64) -> Result<RunSummary> {
        let token = ctx.config.apify_token()?;
        let client = Arc::new(ApifyClient::new(token));

        let progress_store = ProgressStore::for_source(ctx.store.clone(), YELP_SOURCE);
        let mut progress = progress_store.load().await;

        let city = resolve_city(&ctx.params, &progress)
            .unwrap_or_else(|| DEFAULT_CITIES[0].to_string());
        let keywords = keywords_for_run(&ctx.params);
        info!(city, keywords = keywords.len(), "Crawling review-site listings");

        let key = master_key(YELP_SOURCE);
        let existing = merge::load_master(ctx.store.as_ref(), &key).await;

        let plan = ctx.config.fetch_plan();
        let search_city = city.clone();
        let results = fetch_all(keywords.clone(), &plan, move |keyword: String| {
            let client = client.clone();
            let city = search_city.clone();
            async move {
                let input = json!({
                    "keywords": [keyword],
                    "locations": [city],
                    "maxCrawlPages": 20,
                });
                let (run, items) = client.call_actor(YELP_ACTOR_ID, &input).await?;
                Ok(FetchPayload {
                    records: items,
                    dataset_id: Some(run.default_dataset_id),
                })
            }
        })
        .await;
        let report = BatchReport::tally(&results);

        let stamp = now_stamp();
        let mut incoming = Vec::new();
        let mut skipped_seen = 0usize;
        for result in results {
            for item in result.records {
                let listing: YelpListing = serde_json::from_value(item).unwrap_or_default();
                if listing.url.is_empty() {
                    continue;
                }
                if progress.is_processed(&listing.url) {
                    skipped_seen += 1;
                    continue;
                }
                progress.mark_processed(listing.url.clone());
                incoming.push(listing.into_row(&result.target, &city, &stamp));
            }
        }
        let new_rows = incoming.len();
        info!(new_rows, skipped_seen, "Filtered against seen-URL set");

        append_rows_best_effort(ctx.recorder.as_ref(), run_id, YELP_SOURCE, &incoming).await;

        let merged = merge::merge_records(existing, incoming, listing_key);
        let total_rows = merged.len();
        let persisted = persist_master_best_effort(ctx.store.as_ref(), &key, &merged).await;

        if persisted {
            progress.complete_unit(&city);
            progress.record_run();
            if let Err(e) = progress_store.save(&progress).await {
                warn!(error = %e, "Failed to save progress, next run repeats this city");
            }
        }

        Ok(RunSummary {
            source: YELP_SOURCE.into(),
            new_rows,
            total_rows,
            persisted,
            meta: json!({
                "city": city,
                "keywords": keywords.len(),
                "skipped_seen": skipped_seen,
                "fetch": report,
            }),
        })
    }
}
