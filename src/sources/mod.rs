//! One module per upstream data source. Each exposes a job struct
//! implementing [`HarvestJob`](crate::common::types::HarvestJob).

pub mod hunter;
pub mod instagram;
pub mod maps;
pub mod tiktok;
pub mod yelp;
pub mod youtube;

use crate::common::constants::{CATEGORY_NAMES, DEFAULT_CITIES, DEFAULT_SEARCH_KEYWORDS};
use crate::common::types::RawRecord;
use crate::params::JobParams;
use crate::progress::ProgressState;
use chrono::Utc;
use serde_json::Value;

/// Categories selected for this run, filtered against the known set. An
/// empty or fully-unknown selection falls back to every category.
pub(crate) fn selected_categories(params: &JobParams) -> Vec<&'static str> {
    if let Some(requested) = &params.categories {
        let picked: Vec<&'static str> = CATEGORY_NAMES
            .iter()
            .copied()
            .filter(|c| requested.iter().any(|r| r.eq_ignore_ascii_case(c)))
            .collect();
        if !picked.is_empty() {
            return picked;
        }
    }
    CATEGORY_NAMES.to_vec()
}

pub(crate) fn keywords_for_run(params: &JobParams) -> Vec<String> {
    params.keywords.clone().unwrap_or_else(|| {
        DEFAULT_SEARCH_KEYWORDS.iter().map(|s| s.to_string()).collect()
    })
}

/// City for a geographic crawl: the progress cursor when resuming,
/// otherwise the explicitly requested city.
pub(crate) fn resolve_city(params: &JobParams, progress: &ProgressState) -> Option<String> {
    if params.use_progress {
        progress.next_unit(DEFAULT_CITIES).map(str::to_string)
    } else {
        params.city.clone()
    }
}

pub(crate) fn text_field(row: &RawRecord, field: &str) -> String {
    row.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn now_stamp() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_categories_fall_back_to_all() {
        let params = JobParams {
            categories: Some(vec!["Knitting".into()]),
            ..Default::default()
        };
        assert_eq!(selected_categories(&params), CATEGORY_NAMES.to_vec());
    }

    #[test]
    fn category_selection_is_case_insensitive() {
        let params = JobParams {
            categories: Some(vec!["biohacking".into()]),
            ..Default::default()
        };
        assert_eq!(selected_categories(&params), vec!["Biohacking"]);
    }

    #[test]
    fn explicit_city_wins_without_resume_flag() {
        let params = JobParams {
            city: Some("Austin, TX".into()),
            ..Default::default()
        };
        let progress = ProgressState::default();
        assert_eq!(resolve_city(&params, &progress), Some("Austin, TX".into()));
    }

    #[test]
    fn resume_flag_consults_the_cursor() {
        let params = JobParams {
            city: Some("Austin, TX".into()),
            use_progress: true,
            ..Default::default()
        };
        let mut progress = ProgressState::default();
        progress.complete_unit(DEFAULT_CITIES[0]);
        assert_eq!(
            resolve_city(&params, &progress),
            Some(DEFAULT_CITIES[1].to_string())
        );
    }

    #[test]
    fn text_field_defaults_to_empty() {
        let row = json!({"a": "x", "b": 42});
        assert_eq!(text_field(&row, "a"), "x");
        assert_eq!(text_field(&row, "b"), "");
        assert_eq!(text_field(&row, "missing"), "");
    }
}
