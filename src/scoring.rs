//! Composite ranking scores for harvested entities.
//!
//! All normalizations are pure and deterministic; every input combination
//! yields a finite, bounded output. Weights are policy, the bounds are not.

/// Weights for the convex combination in [`final_score`]. Must sum to 1.
#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    pub engagement: f64,
    pub audience: f64,
    pub relevance: f64,
}

/// Default policy when all three signals are available.
pub const ENGAGEMENT_AUDIENCE_RELEVANCE: ScoreWeights = ScoreWeights {
    engagement: 0.4,
    audience: 0.3,
    relevance: 0.3,
};

/// Policy for sources without a usable relevance signal.
pub const ENGAGEMENT_AUDIENCE: ScoreWeights = ScoreWeights {
    engagement: 0.4,
    audience: 0.6,
    relevance: 0.0,
};

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Piecewise-linear normalization of an audience-size count into [0, 1].
///
/// Four bands (<=1K, <=10K, <=100K, >100K) with diminishing marginal
/// contribution at scale: 500 -> 0.5, 50_000 -> ~0.678, and the top band's
/// unbounded tail is capped at +0.1 so the score saturates at 1.0.
pub fn audience_score(count: u64) -> f64 {
    let n = count as f64;
    if count <= 1_000 {
        n / 1_000.0
    } else if count <= 10_000 {
        0.1 + (n - 1_000.0) / 9_000.0 * 0.4
    } else if count <= 100_000 {
        0.5 + (n - 10_000.0) / 90_000.0 * 0.4
    } else {
        0.9 + ((n - 100_000.0) / 1_000_000.0).min(0.1)
    }
}

/// Interaction rate per impression, as a percentage. Zero impressions means
/// zero rate, never a divide-by-zero fault.
pub fn engagement_rate(interactions: u64, impressions: u64) -> f64 {
    if impressions == 0 {
        return 0.0;
    }
    round2(interactions as f64 / impressions as f64 * 100.0)
}

/// Channel-level engagement: average views per video relative to audience
/// size, as a percentage. Zero videos or zero subscribers yields 0.
pub fn channel_engagement_rate(total_views: u64, total_videos: u64, subscribers: u64) -> f64 {
    if total_videos == 0 || subscribers == 0 {
        return 0.0;
    }
    round2(total_views as f64 / total_videos as f64 / subscribers as f64 * 100.0)
}

/// Posting-volume proxy used where per-post engagement is unavailable:
/// 500 uploads saturates the score.
pub fn activity_score(total_videos: u64) -> f64 {
    round3((total_videos as f64 / 500.0).min(1.0))
}

/// Fraction of the keyword set appearing (case-insensitive substring) in the
/// combined text, bounded to [0, 1]. Empty keyword set scores 0.
pub fn relevance_score<S: AsRef<str>>(text: &str, keywords: &[S]) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let content = text.to_lowercase();
    let matches = keywords
        .iter()
        .filter(|k| content.contains(&k.as_ref().to_lowercase()))
        .count();
    (matches as f64 / keywords.len() as f64).min(1.0)
}

/// Convex combination of the three signals, on a 0-100 scale.
///
/// `engagement` is a percentage rate (rescaled internally); `audience` and
/// `relevance` must already be in [0, 1].
pub fn final_score(engagement: f64, audience: f64, relevance: f64, weights: &ScoreWeights) -> f64 {
    debug_assert!(
        (weights.engagement + weights.audience + weights.relevance - 1.0).abs() < 1e-9,
        "score weights must sum to 1"
    );
    round2(
        (engagement / 100.0 * weights.engagement
            + audience * weights.audience
            + relevance * weights.relevance)
            * 100.0,
    )
}
