use crate::common::constants::{master_key, HUNTER_SOURCE};
use crate::common::error::{HarvestError, Result};
use crate::common::types::{FetchOutcome, HarvestJob, RawRecord};
use crate::fetcher::{fetch_all, BatchReport, FetchPayload};
use crate::hunter_api::{pick_best_email, DomainSearchData, HunterClient};
use crate::identity::normalize_domain;
use crate::pipeline::{append_rows_best_effort, persist_master_best_effort, JobContext, RunSummary};
use crate::progress::ProgressStore;
use crate::sources::{now_stamp, text_field};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Terminal per-row enrichment statuses. A row carrying one of these is
/// never re-enriched.
pub const FINAL_STATUSES: &[&str] = &[
    "person_email_found",
    "generic_email_only",
    "no_emails_found",
    "skipped_blank_or_nonbusiness_url",
    "api_error",
];

fn set_field(row: &mut RawRecord, field: &str, value: Value) {
    if let Some(obj) = row.as_object_mut() {
        obj.insert(field.to_string(), value);
    }
}

fn row_already_done(row: &RawRecord, processed: impl Fn(&str) -> bool) -> bool {
    let source_url = text_field(row, "yelp_url");
    if !source_url.is_empty() && processed(&source_url) {
        return true;
    }
    let status = text_field(row, "hunter_status");
    if FINAL_STATUSES.contains(&status.as_str()) {
        return true;
    }
    let domain = text_field(row, "hunter_domain");
    !domain.is_empty() && !status.is_empty()
}

/// Write the enrichment columns for one row from a domain-search payload.
/// Returns the terminal status assigned.
fn apply_enrichment(row: &mut RawRecord, data: &DomainSearchData) -> &'static str {
    set_field(row, "hunter_email_count", json!(data.emails.len()));
    set_field(
        row,
        "hunter_generic_emails",
        json!(data.generic_emails.iter().take(5).cloned().collect::<Vec<_>>().join(", ")),
    );
    set_field(row, "hunter_company", json!(data.organization_name()));

    if let Some(best) = pick_best_email(&data.emails) {
        set_field(row, "hunter_email", json!(best.value));
        set_field(row, "hunter_first_name", json!(best.first_name.clone().unwrap_or_default()));
        set_field(row, "hunter_last_name", json!(best.last_name.clone().unwrap_or_default()));
        set_field(row, "hunter_position", json!(best.position.clone().unwrap_or_default()));
        set_field(row, "hunter_seniority", json!(best.seniority.clone().unwrap_or_default()));
        set_field(row, "hunter_department", json!(best.department.clone().unwrap_or_default()));
        set_field(row, "hunter_confidence", json!(best.confidence));
        set_field(row, "hunter_type", json!(best.email_type.clone().unwrap_or_default()));
        "person_email_found"
    } else if let Some(generic) = data.generic_emails.first() {
        set_field(row, "hunter_email", json!(generic));
        "generic_email_only"
    } else {
        "no_emails_found"
    }
}

fn live_row(row: &RawRecord, stamp: &str) -> RawRecord {
    json!({
        "yelp_url": text_field(row, "yelp_url"),
        "website": text_field(row, "website"),
        "hunter_domain": text_field(row, "hunter_domain"),
        "hunter_status": text_field(row, "hunter_status"),
        "hunter_error": text_field(row, "hunter_error"),
        "hunter_company": text_field(row, "hunter_company"),
        "hunter_email": text_field(row, "hunter_email"),
        "hunter_enriched_at": stamp,
    })
}

enum DomainLookup {
    Data(DomainSearchData),
    Failed(String),
}

/// Two-stage contact enrichment: takes a previously harvested dataset by
/// object-store reference, resolves each row's website to a canonical
/// domain, and queries the domain-search API once per unique domain.
pub struct HunterJob;

#[async_trait]
impl HarvestJob for HunterJob {
    fn source_name(&self) -> &'static str {
        HUNTER_SOURCE
    }

    async fn run(&self, ctx: &JobContext, run_id: i64) -> Result<RunSummary> {
        let api_key = ctx.config.hunter_api_key()?;

        let input_ref = ctx.params.input_ref.as_deref().ok_or_else(|| {
            HarvestError::MissingInput("an input dataset reference is required (--input)".into())
        })?;
        let bytes = ctx
            .store
            .get(input_ref)
            .await?
            .ok_or_else(|| HarvestError::MissingInput(format!("input dataset not found: {input_ref}")))?;
        let mut rows: Vec<RawRecord> = serde_json::from_slice(&bytes)?;

        if !rows.iter().any(|r| r.get("website").is_some()) {
            return Err(HarvestError::MissingField(
                "input dataset has no 'website' field".into(),
            ));
        }

        let progress_store = ProgressStore::for_source(ctx.store.clone(), HUNTER_SOURCE);
        let mut progress = progress_store.load().await;

        // First pass: decide per row, collect the unique domains to query.
        let mut pending: Vec<(usize, String)> = Vec::new();
        let mut skipped_done = 0usize;
        let mut enriched_now = 0usize;
        let stamp = now_stamp();
        let mut live_rows: Vec<RawRecord> = Vec::new();

        for (i, row) in rows.iter_mut().enumerate() {
            if row_already_done(row, |url| progress.is_processed(url)) {
                skipped_done += 1;
                continue;
            }
            let source_url = text_field(row, "yelp_url");
            match normalize_domain(&text_field(row, "website")) {
                Some(domain) => {
                    set_field(row, "hunter_domain", json!(domain));
                    pending.push((i, domain));
                }
                None => {
                    set_field(row, "hunter_status", json!("skipped_blank_or_nonbusiness_url"));
                    set_field(row, "hunter_enriched_at", json!(stamp));
                    if !source_url.is_empty() {
                        progress.mark_processed(source_url);
                    }
                    enriched_now += 1;
                    live_rows.push(live_row(row, &stamp));
                }
            }
        }

        let domains: Vec<String> = {
            let mut seen = HashSet::new();
            pending
                .iter()
                .map(|(_, d)| d.clone())
                .filter(|d| seen.insert(d.clone()))
                .collect()
        };
        info!(
            rows = rows.len(),
            pending = pending.len(),
            domains = domains.len(),
            skipped_done,
            "Enriching contact data"
        );

        let client = Arc::new(HunterClient::new(api_key));
        let limit = ctx.params.limit.unwrap_or(10);
        let plan = ctx.config.fetch_plan();
        let results = fetch_all(domains, &plan, move |domain: String| {
            let client = client.clone();
            async move {
                let data = client.domain_search(&domain, limit).await?;
                Ok(FetchPayload {
                    records: vec![serde_json::to_value(data)?],
                    dataset_id: None,
                })
            }
        })
        .await;
        let report = BatchReport::tally(&results);

        let mut lookups: HashMap<String, DomainLookup> = HashMap::new();
        for result in results {
            let lookup = match result.outcome {
                FetchOutcome::Ok | FetchOutcome::NoData => {
                    let data = result
                        .records
                        .into_iter()
                        .next()
                        .map(|v| serde_json::from_value(v).unwrap_or_default())
                        .unwrap_or_default();
                    DomainLookup::Data(data)
                }
                FetchOutcome::RateLimited => DomainLookup::Failed("rate_limited".into()),
                FetchOutcome::ApiError => {
                    DomainLookup::Failed(result.error.unwrap_or_else(|| "api_error".into()))
                }
            };
            lookups.insert(result.target, lookup);
        }

        // Second pass: write enrichment columns from the lookup results.
        for (i, domain) in &pending {
            let row = &mut rows[*i];
            let status = match lookups.get(domain) {
                Some(DomainLookup::Data(data)) => apply_enrichment(row, data),
                Some(DomainLookup::Failed(error)) => {
                    set_field(row, "hunter_error", json!(error));
                    "api_error"
                }
                None => {
                    set_field(row, "hunter_error", json!("no lookup result"));
                    "api_error"
                }
            };
            set_field(row, "hunter_status", json!(status));
            set_field(row, "hunter_enriched_at", json!(stamp));

            let source_url = text_field(row, "yelp_url");
            if !source_url.is_empty() {
                progress.mark_processed(source_url);
            }
            enriched_now += 1;
            live_rows.push(live_row(row, &stamp));
        }

        append_rows_best_effort(ctx.recorder.as_ref(), run_id, HUNTER_SOURCE, &live_rows).await;

        let key = master_key(HUNTER_SOURCE);
        let total_rows = rows.len();
        let persisted = persist_master_best_effort(ctx.store.as_ref(), &key, &rows).await;

        if persisted {
            progress.record_run();
            if let Err(e) = progress_store.save(&progress).await {
                warn!(error = %e, "Failed to save progress, next run re-enriches these rows");
            }
        }

        Ok(RunSummary {
            source: HUNTER_SOURCE.into(),
            new_rows: enriched_now,
            total_rows,
            persisted,
            meta: json!({
                "input": input_ref,
                "skipped_done": skipped_done,
                "fetch": report,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hunter_api::HunterEmail;

    fn data_with(emails: Vec<HunterEmail>, generic: Vec<&str>) -> DomainSearchData {
        DomainSearchData {
            organization: Some(json!({"name": "Acme"})),
            emails,
            generic_emails: generic.into_iter().map(String::from).collect(),
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn person_email_wins_over_generic() {
        let mut row = json!({"website": "acme.com"});
        let data = data_with(
            vec![HunterEmail {
                value: "jane@acme.com".into(),
                first_name: Some("Jane".into()),
                last_name: Some("Doe".into()),
                confidence: Some(90),
                ..Default::default()
            }],
            vec!["info@acme.com"],
        );
        assert_eq!(apply_enrichment(&mut row, &data), "person_email_found");
        assert_eq!(row["hunter_email"], "jane@acme.com");
        assert_eq!(row["hunter_company"], "Acme");
        assert_eq!(row["hunter_email_count"], 1);
    }

    #[test]
    fn generic_email_fallback_then_none() {
        let mut row = json!({});
        assert_eq!(
            apply_enrichment(&mut row, &data_with(vec![], vec!["info@acme.com"])),
            "generic_email_only"
        );
        assert_eq!(row["hunter_email"], "info@acme.com");

        let mut empty = json!({});
        assert_eq!(apply_enrichment(&mut empty, &data_with(vec![], vec![])), "no_emails_found");
    }

    #[test]
    fn done_rows_are_detected() {
        let processed = |url: &str| url == "https://yelp.com/biz/done";

        assert!(row_already_done(&json!({"yelp_url": "https://yelp.com/biz/done"}), processed));
        assert!(row_already_done(&json!({"hunter_status": "no_emails_found"}), processed));
        assert!(row_already_done(
            &json!({"hunter_domain": "acme.com", "hunter_status": "anything"}),
            processed
        ));
        assert!(!row_already_done(&json!({"yelp_url": "https://yelp.com/biz/new"}), processed));
        assert!(!row_already_done(&json!({"hunter_domain": "acme.com"}), processed));
    }

    #[test]
    fn generic_emails_are_capped_at_five() {
        let mut row = json!({});
        let generic: Vec<String> = (0..8).map(|i| format!("g{i}@acme.com")).collect();
        let data = DomainSearchData {
            generic_emails: generic,
            ..Default::default()
        };
        apply_enrichment(&mut row, &data);
        let listed = row["hunter_generic_emails"].as_str().unwrap();
        assert_eq!(listed.split(", ").count(), 5);
    }
}
