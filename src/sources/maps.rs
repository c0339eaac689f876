use crate::apify::ApifyClient;
use crate::common::constants::{master_key, MAPS_ACTOR_ID, MAPS_SOURCE};
use crate::common::error::{HarvestError, Result};
use crate::common::types::{HarvestJob, RawRecord};
use crate::fetcher::{fetch_all, BatchReport, FetchPayload};
use crate::identity::composite_key;
use crate::pipeline::{append_rows_best_effort, persist_master_best_effort, JobContext, RunSummary};
use crate::progress::ProgressStore;
use crate::sources::{keywords_for_run, now_stamp, resolve_city};
use crate::merge;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// One place listing as the directory actor returns it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapsListing {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl MapsListing {
    fn into_row(self, keyword: &str, search_city: &str, stamp: &str) -> RawRecord {
        json!({
            "title": self.title,
            "address": self.address,
            "phone": self.phone,
            "website": self.website,
            "city": self.city,
            "state": self.state,
            "emails": self.emails.join(", "),
            "search_keyword": keyword,
            "search_city": search_city,
            "batch_city": search_city,
            "scraped_at": stamp,
        })
    }
}

/// Listings have no canonical URL, so identity is a hash over the weak
/// fields that together distinguish a business.
pub fn listing_key(row: &RawRecord) -> Option<String> {
    let title = row.get("title").and_then(Value::as_str).unwrap_or("");
    let phone = row.get("phone").and_then(Value::as_str).unwrap_or("");
    let website = row.get("website").and_then(Value::as_str).unwrap_or("");
    composite_key(&[title, phone, website])
}

/// Business-directory crawl: one city per run, one actor call per keyword,
/// cursor-resumable over the fixed city list.
pub struct MapsJob;

#[async_trait]
impl HarvestJob for MapsJob {
    fn source_name(&self) -> &'static str {
        MAPS_SOURCE
    }

    async fn run(&self, ctx: &JobContext, run_id: i64) -> Result<RunSummary> {
        let token = ctx.config.apify_token()?;
        let client = Arc::new(ApifyClient::new(token));

        let progress_store = ProgressStore::for_source(ctx.store.clone(), MAPS_SOURCE);
        let mut progress = progress_store.load().await;

        let city = resolve_city(&ctx.params, &progress).ok_or_else(|| {
            HarvestError::MissingInput("a city is required unless --use-progress is set".into())
        })?;
        let keywords = keywords_for_run(&ctx.params);
        info!(city, keywords = keywords.len(), "Crawling directory listings");

        let key = master_key(MAPS_SOURCE);
        let existing = merge::load_master(ctx.store.as_ref(), &key).await;

        let plan = ctx.config.fetch_plan();
        let max_places = ctx.params.limit.unwrap_or(100);
        let search_city = city.clone();
        let results = fetch_all(keywords.clone(), &plan, move |keyword: String| {
            let client = client.clone();
            let city = search_city.clone();
            async move {
                let input = json!({
                    "searchStringsArray": [format!("{keyword} {city}")],
                    "maxCrawledPlaces": max_places,
                    "language": "en",
                    "maxImages": 0,
                    "maxReviews": 0,
                    "includeWebResults": true,
                    "startUrls": [],
                    "proxyConfig": {"useApifyProxy": true},
                });
                let (run, items) = client.call_actor(MAPS_ACTOR_ID, &input).await?;
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
        for result in results {
            for item in result.records {
                let listing: MapsListing = serde_json::from_value(item).unwrap_or_default();
                incoming.push(listing.into_row(&result.target, &city, &stamp));
            }
        }
        let new_rows = incoming.len();

        append_rows_best_effort(ctx.recorder.as_ref(), run_id, MAPS_SOURCE, &incoming).await;

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
            source: MAPS_SOURCE.into(),
            new_rows,
            total_rows,
            persisted,
            meta: json!({ "city": city, "keywords": keywords.len(), "fetch": report }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_raw_actor_item() {
        let item = json!({
            "title": "Glow Medspa",
            "address": "1 Main St, Miami, FL",
            "phone": "(305) 555-0100",
            "website": "https://glowmedspa.com",
            "city": "Miami",
            "state": "FL",
            "emails": ["hello@glowmedspa.com"],
            "totalScore": 4.8
        });
        let listing: MapsListing = serde_json::from_value(item).unwrap();
        assert_eq!(listing.title, "Glow Medspa");
        assert!(listing.extra.contains_key("totalScore"));

        let row = listing.into_row("Botox", "Miami, FL", "2026-01-01T00:00:00Z");
        assert_eq!(row["emails"], "hello@glowmedspa.com");
        assert_eq!(row["search_keyword"], "Botox");
        assert_eq!(row["batch_city"], "Miami, FL");
    }

    #[test]
    fn listing_key_matches_across_case_variants() {
        let a = json!({"title": "Glow Medspa", "phone": "305", "website": "glow.com"});
        let b = json!({"title": "glow medspa ", "phone": "305", "website": "GLOW.com"});
        assert_eq!(listing_key(&a), listing_key(&b));
        assert!(listing_key(&a).is_some());
    }

    #[test]
    fn all_blank_fields_yield_no_key() {
        assert_eq!(listing_key(&json!({"title": "", "phone": " "})), None);
        assert_eq!(listing_key(&json!({})), None);
    }

    #[test]
    fn non_object_item_degrades_to_empty_listing() {
        let listing: MapsListing =
            serde_json::from_value(json!("garbage")).unwrap_or_default();
        assert!(listing.title.is_empty());
    }
}
