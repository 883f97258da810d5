//! Per-run aggregation report

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

const UNKNOWN_OWNER: &str = "unknown";
const UNKNOWN_CHAIN: &str = "unknown";
const UNCATEGORIZED: &str = "uncategorized";

/// Counters accumulated over the raw objects of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Aggregation {
    pub total_collections: u64,
    pub collections_with_twitter: u64,
    pub collections_by_owner: BTreeMap<String, u64>,
    /// contract chain → number of contracts
    pub contract_counts: BTreeMap<String, u64>,
    pub categories: BTreeMap<String, u64>,
}

impl Aggregation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, raw: &Value) {
        self.total_collections += 1;

        if non_empty_str(raw, "twitter_username").is_some() {
            self.collections_with_twitter += 1;
        }

        let owner = non_empty_str(raw, "owner").unwrap_or(UNKNOWN_OWNER);
        *self.collections_by_owner.entry(owner.to_string()).or_default() += 1;

        if let Some(contracts) = raw.get("contracts").and_then(Value::as_array) {
            for contract in contracts.iter().filter(|c| c.is_object()) {
                let chain = non_empty_str(contract, "chain").unwrap_or(UNKNOWN_CHAIN);
                *self.contract_counts.entry(chain.to_string()).or_default() += 1;
            }
        }

        let category = non_empty_str(raw, "category").unwrap_or(UNCATEGORIZED);
        *self.categories.entry(category.to_string()).or_default() += 1;
    }

    pub fn report(&self, run_id: Uuid, chain: &str) -> AggregationReport {
        AggregationReport {
            run_id,
            chain: chain.to_string(),
            totals: self.clone(),
            generated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregationReport {
    pub run_id: Uuid,
    pub chain: String,
    #[serde(flatten)]
    pub totals: Aggregation,
    pub generated_at: DateTime<Utc>,
}

fn non_empty_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
