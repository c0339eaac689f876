use crate::common::error::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DOMAIN_SEARCH_URL: &str = "https://api.hunter.io/v2/domain-search";

/// Client for the contact-enrichment domain-search API.
pub struct HunterClient {
    http: reqwest::Client,
    api_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HunterEmail {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub seniority: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub confidence: Option<i64>,
    #[serde(rename = "type", default)]
    pub email_type: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl HunterEmail {
    fn has_full_name(&self) -> bool {
        self.first_name.as_deref().is_some_and(|s| !s.is_empty())
            && self.last_name.as_deref().is_some_and(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainSearchData {
    /// The upstream serializes this either as an object with a `name` field
    /// or as a bare string.
    #[serde(default)]
    pub organization: Option<Value>,
    #[serde(default)]
    pub emails: Vec<HunterEmail>,
    #[serde(default)]
    pub generic_emails: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl DomainSearchData {
    pub fn organization_name(&self) -> String {
        match &self.organization {
            Some(Value::Object(map)) => map
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            Some(Value::String(s)) => s.clone(),
            _ => String::new(),
        }
    }
}

#[derive(Deserialize)]
struct DomainSearchResponse {
    #[serde(default)]
    data: DomainSearchData,
}

/// Best email first: prefer addresses carrying a full person name, then the
/// highest confidence.
pub fn pick_best_email(emails: &[HunterEmail]) -> Option<&HunterEmail> {
    emails
        .iter()
        .max_by_key(|e| (e.has_full_name(), e.confidence.unwrap_or(0)))
}

impl HunterClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }

    /// Search a domain for contact emails. A 429 is surfaced as the distinct
    /// `RateLimited` error so callers can classify it apart from other API
    /// failures.
    pub async fn domain_search(&self, domain: &str, limit: u32) -> Result<DomainSearchData> {
        let resp = self
            .http
            .get(DOMAIN_SEARCH_URL)
            .query(&[
                ("domain", domain),
                ("api_key", self.api_key.as_str()),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(HarvestError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HarvestError::Api {
                message: format!("hunter returned {}: {}", status.as_u16(), body),
            });
        }

        let payload: DomainSearchResponse = resp.json().await?;
        Ok(payload.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn email(first: Option<&str>, last: Option<&str>, confidence: i64) -> HunterEmail {
        HunterEmail {
            value: "x@example.com".into(),
            first_name: first.map(String::from),
            last_name: last.map(String::from),
            confidence: Some(confidence),
            ..Default::default()
        }
    }

    #[test]
    fn prefers_named_contact_over_higher_confidence() {
        let emails = vec![
            email(None, None, 99),
            email(Some("Ada"), Some("Lovelace"), 50),
        ];
        let best = pick_best_email(&emails).unwrap();
        assert_eq!(best.first_name.as_deref(), Some("Ada"));
    }

    #[test]
    fn falls_back_to_confidence() {
        let emails = vec![email(None, None, 10), email(None, None, 80)];
        assert_eq!(pick_best_email(&emails).unwrap().confidence, Some(80));
        assert!(pick_best_email(&[]).is_none());
    }

    #[test]
    fn organization_name_handles_both_shapes() {
        let as_object: DomainSearchData =
            serde_json::from_value(json!({"organization": {"name": "Acme"}})).unwrap();
        assert_eq!(as_object.organization_name(), "Acme");

        let as_string: DomainSearchData =
            serde_json::from_value(json!({"organization": "Acme Inc"})).unwrap();
        assert_eq!(as_string.organization_name(), "Acme Inc");

        let absent: DomainSearchData = serde_json::from_value(json!({})).unwrap();
        assert_eq!(absent.organization_name(), "");
    }

    #[test]
    fn response_payload_deserializes() {
        let data: DomainSearchData = serde_json::from_value(json!({
            "organization": {"name": "Acme"},
            "emails": [{"value": "a@acme.com", "first_name": "A", "last_name": "B", "confidence": 90, "type": "personal"}],
            "generic_emails": ["info@acme.com"],
            "pattern": "{first}"
        }))
        .unwrap();
        assert_eq!(data.emails.len(), 1);
        assert_eq!(data.generic_emails, vec!["info@acme.com"]);
        assert!(data.extra.contains_key("pattern"));
    }
}
