use crate::apify::ApifyClient;
use crate::common::constants::{
    hashtags_for_category, master_key, IG_PROFILE_ACTOR_ID, IG_REELS_ACTOR_ID, INSTAGRAM_SOURCE,
};
use crate::common::error::Result;
use crate::common::types::{FetchOutcome, HarvestJob, RawRecord};
use crate::fetcher::{fetch_all, BatchReport, FetchPayload};
use crate::merge;
use crate::pipeline::{append_rows_best_effort, persist_master_best_effort, JobContext, RunSummary};
use crate::progress::ProgressStore;
use crate::scoring::{
    audience_score, engagement_rate, final_score, round3, ENGAGEMENT_AUDIENCE,
};
use crate::sources::{now_stamp, selected_categories};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// One reel as the hashtag actor returns it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReelItem {
    #[serde(rename = "ownerUsername", default)]
    pub username: String,
    #[serde(rename = "likesCount", default)]
    pub likes: u64,
    #[serde(rename = "commentsCount", default)]
    pub comments: u64,
    #[serde(rename = "videoPlayCount", default)]
    pub views: u64,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "videoUrl", default)]
    pub video_url: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One profile as the profile actor returns it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(default)]
    pub username: String,
    #[serde(rename = "fullName", default)]
    pub full_name: String,
    #[serde(default)]
    pub biography: String,
    #[serde(rename = "followersCount", default)]
    pub followers: u64,
    #[serde(rename = "postsCount", default)]
    pub posts: u64,
    #[serde(default)]
    pub verified: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Reel signals accumulated per author during the hashtag phase.
#[derive(Debug, Default, Clone)]
struct AuthorSignals {
    category: String,
    likes: u64,
    comments: u64,
    views: u64,
    reels: u64,
    post_url: String,
    video_url: String,
}

fn influencer_key(row: &RawRecord) -> Option<String> {
    merge::string_field_key(row, "username")
}

fn build_row(
    username: &str,
    signals: &AuthorSignals,
    profile: Option<&ProfileRecord>,
    stamp: &str,
) -> RawRecord {
    let engagement = engagement_rate(signals.likes + signals.comments, signals.views);
    let followers = profile.map(|p| p.followers).unwrap_or(0);
    let follower_score = round3(audience_score(followers));
    let score = final_score(engagement, follower_score, 0.0, &ENGAGEMENT_AUDIENCE);
    json!({
        "category": signals.category,
        "username": username,
        "full_name": profile.map(|p| p.full_name.clone()).unwrap_or_default(),
        "bio": profile.map(|p| p.biography.clone()).unwrap_or_default(),
        "followers": followers,
        "posts": profile.map(|p| p.posts).unwrap_or(0),
        "verified": profile.map(|p| p.verified).unwrap_or(false),
        "likes": signals.likes,
        "comments": signals.comments,
        "views": signals.views,
        "reels": signals.reels,
        "engagement_rate": engagement,
        "follower_score": follower_score,
        "final_score": score,
        "profile_enriched": profile.is_some(),
        "post_url": signals.post_url,
        "video_url": signals.video_url,
        "profile_url": format!("https://instagram.com/{username}"),
        "harvested_at": stamp,
    })
}

#[derive(Clone)]
struct TagTarget {
    category: String,
    tag: String,
}

/// Hashtag reel harvest followed by batched concurrent profile enrichment
/// of the authors discovered this run.
pub struct InstagramJob;

#[async_trait]
impl HarvestJob for InstagramJob {
    fn source_name(&self) -> &'static str {
        INSTAGRAM_SOURCE
    }

    async fn run(&self, ctx: &JobContext, run_id: i64) -> Result<RunSummary> {
        let token = ctx.config.apify_token()?;
        let client = Arc::new(ApifyClient::new(token));

        let progress_store = ProgressStore::for_source(ctx.store.clone(), INSTAGRAM_SOURCE);
        let mut progress = progress_store.load().await;

        let categories = selected_categories(&ctx.params);
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
            "Harvesting reels"
        );

        let plan = ctx.config.fetch_plan();
        let results_limit = ctx.params.limit.unwrap_or(ctx.config.max_results);
        let reels_client = client.clone();
        let reel_results = fetch_all(tag_targets, &plan, move |target: TagTarget| {
            let client = reels_client.clone();
            async move {
                let input = json!({
                    "hashtags": [target.tag],
                    "resultsType": "reels",
                    "resultsLimit": results_limit,
                });
                let (run, items) = client.call_actor(IG_REELS_ACTOR_ID, &input).await?;
                Ok(FetchPayload {
                    records: items,
                    dataset_id: Some(run.default_dataset_id),
                })
            }
        })
        .await;
        let reel_report = BatchReport::tally(&reel_results);

        // Aggregate reel signals per author.
        let mut authors: BTreeMap<String, AuthorSignals> = BTreeMap::new();
        for result in reel_results {
            for item in result.records {
                let reel: ReelItem = serde_json::from_value(item).unwrap_or_default();
                if reel.username.is_empty() {
                    continue;
                }
                let signals = authors.entry(reel.username.clone()).or_insert_with(|| {
                    AuthorSignals {
                        category: result.target.category.clone(),
                        post_url: reel.url.clone(),
                        video_url: reel.video_url.clone(),
                        ..Default::default()
                    }
                });
                signals.likes += reel.likes;
                signals.comments += reel.comments;
                signals.views += reel.views;
                signals.reels += 1;
            }
        }

        // Batched concurrent profile enrichment of authors not yet seen.
        let to_enrich: Vec<String> = authors
            .keys()
            .filter(|u| !progress.is_processed(u))
            .cloned()
            .collect();
        info!(
            authors = authors.len(),
            to_enrich = to_enrich.len(),
            "Enriching author profiles"
        );

        let profile_client = client.clone();
        let profile_results = fetch_all(to_enrich, &plan, move |username: String| {
            let client = profile_client.clone();
            async move {
                let input = json!({ "usernames": [username] });
                let (run, items) = client.call_actor(IG_PROFILE_ACTOR_ID, &input).await?;
                Ok(FetchPayload {
                    records: items,
                    dataset_id: Some(run.default_dataset_id),
                })
            }
        })
        .await;
        let profile_report = BatchReport::tally(&profile_results);

        let stamp = now_stamp();
        let mut incoming = Vec::new();
        for result in profile_results {
            let username = result.target;
            let Some(signals) = authors.get(&username) else {
                continue;
            };
            let profile: Option<ProfileRecord> = match result.outcome {
                FetchOutcome::Ok => result
                    .records
                    .into_iter()
                    .next()
                    .and_then(|v| serde_json::from_value(v).ok()),
                _ => None,
            };
            incoming.push(build_row(&username, signals, profile.as_ref(), &stamp));
            // Unenriched authors stay out of the seen-set so the next run
            // retries their profile.
            if profile.is_some() {
                progress.mark_processed(username);
            }
        }
        let new_rows = incoming.len();

        append_rows_best_effort(ctx.recorder.as_ref(), run_id, INSTAGRAM_SOURCE, &incoming).await;

        let key = master_key(INSTAGRAM_SOURCE);
        let existing = merge::load_master(ctx.store.as_ref(), &key).await;
        let merged = merge::merge_records(existing, incoming, influencer_key);
        let total_rows = merged.len();
        let persisted = persist_master_best_effort(ctx.store.as_ref(), &key, &merged).await;

        if persisted {
            progress.record_run();
            if let Err(e) = progress_store.save(&progress).await {
                tracing::warn!(error = %e, "Failed to save progress, next run re-enriches");
            }
        }

        Ok(RunSummary {
            source: INSTAGRAM_SOURCE.into(),
            new_rows,
            total_rows,
            persisted,
            meta: json!({
                "categories": categories,
                "reels": reel_report,
                "profiles": profile_report,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reel_and_profile_items() {
        let reel: ReelItem = serde_json::from_value(json!({
            "ownerUsername": "biohack_amy",
            "likesCount": 900,
            "commentsCount": 100,
            "videoPlayCount": 20_000,
            "url": "https://instagram.com/p/abc",
            "videoUrl": "https://cdn.example/v.mp4",
            "timestamp": "2026-01-01T00:00:00Z",
            "hashtags": ["biohacking"]
        }))
        .unwrap();
        assert_eq!(reel.username, "biohack_amy");
        assert_eq!(reel.views, 20_000);

        let profile: ProfileRecord = serde_json::from_value(json!({
            "username": "biohack_amy",
            "fullName": "Amy B",
            "biography": "Longevity and cold plunges",
            "followersCount": 50_000,
            "postsCount": 240,
            "verified": true
        }))
        .unwrap();
        assert_eq!(profile.followers, 50_000);
    }

    #[test]
    fn row_combines_reel_signals_and_profile() {
        let signals = AuthorSignals {
            category: "Biohacking".into(),
            likes: 900,
            comments: 100,
            views: 20_000,
            reels: 2,
            post_url: "https://instagram.com/p/abc".into(),
            video_url: String::new(),
        };
        let profile = ProfileRecord {
            username: "biohack_amy".into(),
            followers: 50_000,
            ..Default::default()
        };
        let row = build_row("biohack_amy", &signals, Some(&profile), "t");

        // (900 + 100) / 20_000 * 100 = 5%
        assert_eq!(row["engagement_rate"], 5.0);
        assert_eq!(row["profile_enriched"], true);
        assert_eq!(influencer_key(&row).as_deref(), Some("biohack_amy"));
        let score = row["final_score"].as_f64().unwrap();
        assert!(score > 0.0 && score <= 100.0);
    }

    #[test]
    fn missing_profile_scores_on_engagement_alone() {
        let signals = AuthorSignals {
            category: "Peptides".into(),
            likes: 50,
            comments: 0,
            views: 1_000,
            reels: 1,
            ..Default::default()
        };
        let row = build_row("ghost", &signals, None, "t");
        assert_eq!(row["followers"], 0);
        assert_eq!(row["profile_enriched"], false);
        // engagement 5% with 0.4 weight: (5/100)*0.4*100 = 2.0
        assert_eq!(row["final_score"], 2.0);
    }
}
