use crate::apify::ApifyClient;
use crate::common::constants::{
    hashtags_for_category, master_key, TIKTOK_HASHTAG_ACTOR_ID, TIKTOK_SOURCE,
};
use crate::common::error::Result;
use crate::common::types::{HarvestJob, RawRecord};
use crate::fetcher::{fetch_all, BatchReport, FetchPayload};
use crate::merge;
use crate::pipeline::{append_rows_best_effort, persist_master_best_effort, JobContext, RunSummary};
use crate::scoring::{
    audience_score, engagement_rate, final_score, relevance_score, round2, round3,
    ENGAGEMENT_AUDIENCE_RELEVANCE,
};
use crate::sources::{now_stamp, selected_categories};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthorMeta {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "nickName", default)]
    pub nickname: String,
    #[serde(default)]
    pub fans: u64,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub verified: bool,
}

/// One hashtag post as the actor returns it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HashtagPost {
    #[serde(rename = "authorMeta", default)]
    pub author: AuthorMeta,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "diggCount", default)]
    pub diggs: u64,
    #[serde(rename = "shareCount", default)]
    pub shares: u64,
    #[serde(rename = "commentCount", default)]
    pub comments: u64,
    #[serde(rename = "playCount", default)]
    pub plays: u64,
    #[serde(rename = "webVideoUrl", default)]
    pub video_url: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl HashtagPost {
    /// Score the post's author against the category keyword set. Posts with
    /// no author or no plays carry no usable signal and yield `None`.
    fn into_row(self, category: &str, keywords: &[&str], stamp: &str) -> Option<RawRecord> {
        if self.author.name.is_empty() || self.plays == 0 {
            return None;
        }
        let engagement = engagement_rate(self.diggs + self.shares + self.comments, self.plays);
        let follower_score = round3(audience_score(self.author.fans));
        let combined = format!("{} {}", self.text, self.author.signature);
        let relevance = relevance_score(&combined, keywords);
        let score = final_score(
            engagement,
            follower_score,
            relevance,
            &ENGAGEMENT_AUDIENCE_RELEVANCE,
        );
        Some(json!({
            "category": category,
            "username": self.author.name,
            "nickname": self.author.nickname,
            "followers": self.author.fans,
            "engagement_rate": engagement,
            "follower_score": follower_score,
            "keyword_relevance": round2(relevance * 100.0),
            "final_score": score,
            "verified": self.author.verified,
            "bio": self.author.signature,
            "post_text": self.text,
            "profile_url": format!("https://tiktok.com/@{}", self.author.name),
            "video_url": self.video_url,
            "harvested_at": stamp,
        }))
    }
}

fn influencer_key(row: &RawRecord) -> Option<String> {
    merge::string_field_key(row, "username")
}

#[derive(Clone)]
struct CategoryTarget {
    category: String,
    hashtags: Vec<String>,
}

/// Hashtag influencer harvest: one actor call per category covering all of
/// its hashtags, with composite scoring per author.
pub struct TiktokJob;

#[async_trait]
impl HarvestJob for TiktokJob {
    fn source_name(&self) -> &'static str {
        TIKTOK_SOURCE
    }

    async fn run(&self, ctx: &JobContext, run_id: i64) -> Result<RunSummary> {
        let token = ctx.config.apify_token()?;
        let client = Arc::new(ApifyClient::new(token));

        let categories = selected_categories(&ctx.params);
        let targets: Vec<CategoryTarget> = categories
            .iter()
            .map(|cat| CategoryTarget {
                category: cat.to_string(),
                hashtags: hashtags_for_category(cat)
                    .iter()
                    .map(|t| t.to_string())
                    .collect(),
            })
            .collect();
        for t in &targets {
            info!(category = %t.category, hashtags = t.hashtags.len(), "Run plan");
        }

        let key = master_key(TIKTOK_SOURCE);
        let existing = merge::load_master(ctx.store.as_ref(), &key).await;

        let plan = ctx.config.fetch_plan();
        let results_per_page = ctx.params.limit.unwrap_or(ctx.config.max_results);
        let results = fetch_all(targets, &plan, move |target: CategoryTarget| {
            let client = client.clone();
            async move {
                let input = json!({
                    "hashtags": target.hashtags,
                    "resultsPerPage": results_per_page,
                    "shouldDownloadVideos": false,
                    "shouldDownloadCovers": false,
                    "shouldDownloadSubtitles": false,
                    "shouldDownloadSlideshowImages": false,
                });
                let (run, items) = client.call_actor(TIKTOK_HASHTAG_ACTOR_ID, &input).await?;
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
            let keywords: Vec<&str> = result
                .target
                .hashtags
                .iter()
                .map(String::as_str)
                .collect();
            for item in result.records {
                let post: HashtagPost = serde_json::from_value(item).unwrap_or_default();
                if let Some(row) = post.into_row(&result.target.category, &keywords, &stamp) {
                    incoming.push(row);
                }
            }
        }
        incoming.sort_by(|a, b| {
            let fa = a["final_score"].as_f64().unwrap_or(0.0);
            let fb = b["final_score"].as_f64().unwrap_or(0.0);
            fb.partial_cmp(&fa).unwrap_or(std::cmp::Ordering::Equal)
        });
        let new_rows = incoming.len();

        append_rows_best_effort(ctx.recorder.as_ref(), run_id, TIKTOK_SOURCE, &incoming).await;

        let merged = merge::merge_records(existing, incoming, influencer_key);
        let total_rows = merged.len();
        let persisted = persist_master_best_effort(ctx.store.as_ref(), &key, &merged).await;

        Ok(RunSummary {
            source: TIKTOK_SOURCE.into(),
            new_rows,
            total_rows,
            persisted,
            meta: json!({ "categories": categories, "fetch": report }),
        })
    }
}
