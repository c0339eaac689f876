/// Source name constants to ensure consistency across the codebase.
/// These names key progress blobs, master datasets, and run/event rows.
pub const MAPS_SOURCE: &str = "maps";
pub const YELP_SOURCE: &str = "yelp";
pub const HUNTER_SOURCE: &str = "hunter";
pub const YOUTUBE_SOURCE: &str = "youtube";
pub const TIKTOK_SOURCE: &str = "tiktok_hashtags";
pub const INSTAGRAM_SOURCE: &str = "instagram_combined";

// Upstream actor IDs (overridable via env where the job supports it)
pub const MAPS_ACTOR_ID: &str = "WnMxbsRLNbPeYL6ge";
pub const YELP_ACTOR_ID: &str = "BxxFJax5cSD2VeXkV";
pub const YT_VIDEOS_ACTOR_ID: &str = "89uTe0zmDUIatNKSd";
pub const YT_CHANNELS_ACTOR_ID: &str = "67Q6fmd8iedTVcCwY";
pub const TIKTOK_HASHTAG_ACTOR_ID: &str = "f1ZeP0K58iwlqG2pY";
pub const IG_REELS_ACTOR_ID: &str = "reGe1ST3OBgYZSsZJ";
pub const IG_PROFILE_ACTOR_ID: &str = "dSCLg0C3YEZ83HzYX";

/// Default search keywords for the directory/review-site crawls.
pub const DEFAULT_SEARCH_KEYWORDS: &[&str] = &[
    "Medspa",
    "Aesthetic Clinic",
    "Cosmetic Dermatology",
    "Plastic Surgery",
    "Laser Clinic",
    "Skin Care Clinic",
    "Botox",
    "Filler",
    "Dysport",
    "Jeuveau",
    "Kybella",
    "PRP",
    "Microneedling",
    "RF Microneedling",
    "IPL",
    "Laser Hair Removal",
    "Tattoo Removal",
    "Body Contouring",
    "Hair Restoration",
    "Cryotherapy",
    "IV Therapy",
    "IV Hydration",
    "Weight Loss Clinic",
    "Semaglutide",
    "Tirzepatide",
    "GLP-1 Clinic",
    "Hormone Therapy",
    "HRT",
    "TRT",
    "Peptide Therapy",
    "Functional Medicine",
    "Longevity Clinic",
    "Wellness Center",
];

/// Fixed unit list for the cursor-based geographic crawls. Order matters: the
/// resumption cursor walks this list and wraps to the first entry once every
/// city has been completed.
pub const DEFAULT_CITIES: &[&str] = &[
    "New York, NY",
    "Los Angeles, CA",
    "Miami, FL",
    "Orlando, FL",
    "Tampa, FL",
    "Houston, TX",
    "Dallas, TX",
    "Austin, TX",
    "Chicago, IL",
    "Phoenix, AZ",
    "Scottsdale, AZ",
    "Las Vegas, NV",
    "Denver, CO",
    "Atlanta, GA",
    "Boston, MA",
    "Seattle, WA",
    "San Diego, CA",
    "San Francisco, CA",
    "Newark, NJ",
    "Charlotte, NC",
];

/// Social hashtag categories shared by the influencer harvests.
pub const CATEGORY_NAMES: &[&str] = &["Peptides", "Biohacking", "Regenerative Medicine"];

pub fn hashtags_for_category(category: &str) -> &'static [&'static str] {
    match category {
        "Peptides" => &[
            "peptide",
            "collagenpeptides",
            "copperpeptides",
            "skincare",
            "antiaging",
            "bpc157",
            "tb500",
            "semaglutide",
            "tirzepatide",
            "wellness",
            "weightloss",
            "prp",
        ],
        "Biohacking" => &[
            "biohacking",
            "biohacker",
            "longevity",
            "nootropics",
            "redlighttherapy",
            "wearables",
            "sleepoptimization",
            "coldplunge",
            "sauna",
            "hrv",
            "functionalmedicine",
            "recovery",
        ],
        "Regenerative Medicine" => &[
            "regenerativemedicine",
            "prp",
            "stemcelltherapy",
            "exosomes",
            "orthopedics",
            "sportsmedicine",
            "aestheticmedicine",
            "jointpain",
            "arthritis",
            "painmanagement",
            "hairrestoration",
            "celltherapy",
        ],
        _ => &[],
    }
}

/// Object-store key for a source's progress blob.
pub fn progress_key(source: &str) -> String {
    format!("state/{source}_progress.json")
}

/// Object-store key for a source's master dataset snapshot.
pub fn master_key(source: &str) -> String {
    format!("exports/{source}_master.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_category_has_hashtags() {
        for cat in CATEGORY_NAMES {
            assert!(!hashtags_for_category(cat).is_empty(), "{cat} has no hashtags");
        }
    }

    #[test]
    fn unknown_category_is_empty() {
        assert!(hashtags_for_category("Knitting").is_empty());
    }
}
