use crate::apify::ApifyClient;
use crate::common::constants::{
    hashtags_for_category, master_key, YOUTUBE_SOURCE, YT_CHANNELS_ACTOR_ID, YT_VIDEOS_ACTOR_ID,
};
use crate::common::error::Result;
use crate::common::types::{HarvestJob, RawRecord};
use crate::fetcher::{fetch_all, BatchReport, FetchPayload};
use crate::merge;
use crate::pipeline::{append_rows_best_effort, persist_master_best_effort, JobContext, RunSummary};
use crate::scoring::{
    activity_score, audience_score, channel_engagement_rate, final_score, round3,
    ENGAGEMENT_AUDIENCE_RELEVANCE,
};
use crate::sources::{now_stamp, selected_categories};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// One channel as the channel-details actor returns it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelRecord {
    #[serde(rename = "channelName", default)]
    pub name: String,
    #[serde(rename = "channelUrl", default)]
    pub url: String,
    #[serde(rename = "channelUsername", default)]
    pub username: String,
    #[serde(rename = "numberOfSubscribers", default)]
    pub subscribers: u64,
    #[serde(rename = "channelTotalViews", default)]
    pub total_views: u64,
    #[serde(rename = "channelTotalVideos", default)]
    pub total_videos: u64,
    #[serde(rename = "isChannelVerified", default)]
    pub verified: bool,
    #[serde(rename = "channelLocation", default)]
    pub country: String,
    #[serde(rename = "channelJoinedDate", default)]
    pub joined_date: String,
    #[serde(rename = "channelDescription", default)]
    pub description: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ChannelRecord {
    /// Score and flatten into a master-dataset row.
    fn into_row(self, category: &str, stamp: &str) -> RawRecord {
        let engagement =
            channel_engagement_rate(self.total_views, self.total_videos, self.subscribers);
        let subscriber_score = round3(audience_score(self.subscribers));
        let activity = activity_score(self.total_videos);
        let score = final_score(
            engagement,
            subscriber_score,
            activity,
            &ENGAGEMENT_AUDIENCE_RELEVANCE,
        );
        json!({
            "category": category,
            "channel_name": self.name,
            "channel_url": self.url,
            "channel_username": self.username,
            "subscribers": self.subscribers,
            "total_views": self.total_views,
            "total_videos": self.total_videos,
            "verified": self.verified,
            "country": self.country,
            "joined_date": self.joined_date,
            "description": self.description,
            "engagement_rate": engagement,
            "subscriber_score": subscriber_score,
            "activity_score": activity,
            "final_score": score,
            "harvested_at": stamp,
        })
    }
}

fn channel_key(row: &RawRecord) -> Option<String> {
    merge::string_field_key(row, "channel_url")
}

#[derive(Clone)]
struct TagTarget {
    category: String,
    tag: String,
}

#[derive(Clone)]
struct CategoryTarget {
    category: String,
    urls: Vec<String>,
}

/// Two-phase influencer harvest: hashtag video crawls discover channel
/// URLs, then one bulk channel-details call per category fetches and scores
/// the channels not already in the master dataset.
pub struct YoutubeJob;

#[async_trait]
impl HarvestJob for YoutubeJob {
    fn source_name(&self) -> &'static str {
        YOUTUBE_SOURCE
    }

    async fn run(&self, ctx: &JobContext, run_id: i64) -> Result<RunSummary> {
        let token = ctx.config.apify_token()?;
        let client = Arc::new(ApifyClient::new(token));

        let key = master_key(YOUTUBE_SOURCE);
        let existing = merge::load_master(ctx.store.as_ref(), &key).await;
        let mut known: HashSet<String> = existing
            .iter()
            .filter_map(channel_key)
            .collect();

        let categories = selected_categories(&ctx.params);
        let max_results = ctx.params.limit.unwrap_or(ctx.config.max_results);

        let tag_targets: Vec<TagTarget> = categories
            .iter()
            .flat_map(|cat| {
                hashtags_for_category(cat).iter().map(move |tag| TagTarget {
                    category: cat.to_string(),
                    tag: tag.to_string(),
                })
            })
            .collect();
        info!(
            categories = categories.len(),
            hashtags = tag_targets.len(),
            "Discovering channels via hashtag videos"
        );

        let plan = ctx.config.fetch_plan();
        let discover_client = client.clone();
        let video_results = fetch_all(tag_targets, &plan, move |target: TagTarget| {
            let client = discover_client.clone();
            async move {
                let input = json!({ "hashtags": [target.tag], "maxResults": max_results });
                let (run, items) = client.call_actor(YT_VIDEOS_ACTOR_ID, &input).await?;
                Ok(FetchPayload {
                    records: items,
                    dataset_id: Some(run.default_dataset_id),
                })
            }
        })
        .await;
        let discover_report = BatchReport::tally(&video_results);

        // New channel URLs per category, in discovery order.
        let mut category_targets: Vec<CategoryTarget> = Vec::new();
        for cat in &categories {
            let mut urls = Vec::new();
            for result in video_results.iter().filter(|r| r.target.category == *cat) {
                for item in &result.records {
                    if let Some(url) = item.get("channelUrl").and_then(Value::as_str) {
                        if !url.is_empty() && known.insert(url.to_string()) {
                            urls.push(url.to_string());
                        }
                    }
                }
            }
            info!(category = cat, new_channels = urls.len(), "Discovery complete");
            if !urls.is_empty() {
                category_targets.push(CategoryTarget {
                    category: cat.to_string(),
                    urls,
                });
            }
        }

        let detail_client = client.clone();
        let detail_results = fetch_all(category_targets, &plan, move |target: CategoryTarget| {
            let client = detail_client.clone();
            async move {
                let start_urls: Vec<Value> =
                    target.urls.iter().map(|u| json!({ "url": u })).collect();
                let input = json!({ "startUrls": start_urls, "maxResults": 1 });
                let (run, items) = client.call_actor(YT_CHANNELS_ACTOR_ID, &input).await?;
                Ok(FetchPayload {
                    records: items,
                    dataset_id: Some(run.default_dataset_id),
                })
            }
        })
        .await;
        let detail_report = BatchReport::tally(&detail_results);

        let stamp = now_stamp();
        let mut incoming = Vec::new();
        for result in detail_results {
            for item in result.records {
                let channel: ChannelRecord = serde_json::from_value(item).unwrap_or_default();
                if channel.url.is_empty() {
                    continue;
                }
                incoming.push(channel.into_row(&result.target.category, &stamp));
            }
        }
        let new_rows = incoming.len();

        append_rows_best_effort(ctx.recorder.as_ref(), run_id, YOUTUBE_SOURCE, &incoming).await;

        let merged = merge::merge_records(existing, incoming, channel_key);
        let total_rows = merged.len();
        let persisted = persist_master_best_effort(ctx.store.as_ref(), &key, &merged).await;

        Ok(RunSummary {
            source: YOUTUBE_SOURCE.into(),
            new_rows,
            total_rows,
            persisted,
            meta: json!({
                "categories": categories,
                "discovery": discover_report,
                "details": detail_report,
            }),
        })
    }
}
