//! Collector output types
//!
//! A collector's result has one map-valued part (its named slot) and
//! several list-valued parts that are concatenated into the state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Observable symptom reported by a collector.
///
/// The hypothesis engine matches sets of these against its pattern library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    LoadNotFound,
    LoadFound,
    NoNetworkRelationship,
    NetworkRelationshipActive,
    InvalidScac,
    ScacVerified,
    NoTrackingUpdates,
    TrackingUpdatesReceived,
    TrackingNotStarted,
    ScrapeFailed,
    CarrierPortalHealthy,
    SubscriptionMissing,
    SubscriptionInactive,
    SubscriptionActive,
    ValidationFailed,
    DuplicateLoad,
    MissingRequiredField,
    IntegrationFailure,
    IntegrationHealthy,
    DeviceOffline,
    GpsPingsMissing,
    DeviceReporting,
    ApiTimeout,
    ApiErrors,
    KnownIncident,
}

/// A typed observation from one collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Collector name that observed it.
    pub source: String,
    pub signal: Signal,
    /// Human-readable statement of what was observed.
    pub statement: String,
    #[serde(default)]
    pub raw: Value,
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
}

impl Finding {
    pub fn new(source: impl Into<String>, signal: Signal, statement: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            signal,
            statement: statement.into(),
            raw: Value::Null,
            observed_at: Utc::now(),
        }
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }
}

/// A log line, ticket or chat message surfaced by a collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source: String,
    pub summary: String,
    #[serde(default)]
    pub raw: Value,
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
}

impl SourceRecord {
    pub fn new(source: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            summary: summary.into(),
            raw: Value::Null,
            observed_at: Utc::now(),
        }
    }
}

/// A query a collector executed against its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub source: String,
    pub query: String,
    pub result_count: usize,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default = "Utc::now")]
    pub executed_at: DateTime<Utc>,
}

impl QueryRecord {
    pub fn new(source: impl Into<String>, query: impl Into<String>, result_count: usize) -> Self {
        Self {
            source: source.into(),
            query: query.into(),
            result_count,
            duration_ms: 0,
            error: None,
            executed_at: Utc::now(),
        }
    }

    pub fn failed(source: impl Into<String>, query: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(source, query, 0)
        }
    }
}

/// Partial result of one collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorOutput {
    /// Value for the collector's own named slot.
    pub slot: Option<Value>,
    pub log_entries: Vec<SourceRecord>,
    pub messages: Vec<SourceRecord>,
    pub findings: Vec<Finding>,
    pub queries: Vec<QueryRecord>,
}

impl CollectorOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slot(mut self, value: Value) -> Self {
        self.slot = Some(value);
        self
    }

    pub fn with_finding(mut self, finding: Finding) -> Self {
        self.findings.push(finding);
        self
    }

    pub fn with_log_entry(mut self, record: SourceRecord) -> Self {
        self.log_entries.push(record);
        self
    }

    pub fn with_message(mut self, record: SourceRecord) -> Self {
        self.messages.push(record);
        self
    }

    pub fn with_query(mut self, query: QueryRecord) -> Self {
        self.queries.push(query);
        self
    }

    /// Number of items this output contributes to the state.
    pub fn result_count(&self) -> usize {
        usize::from(self.slot.is_some())
            + self.log_entries.len()
            + self.messages.len()
            + self.findings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn result_count_covers_every_part() {
        let output = CollectorOutput::new()
            .with_slot(json!({"status": "active"}))
            .with_finding(Finding::new("warehouse", Signal::LoadFound, "load exists"))
            .with_log_entry(SourceRecord::new("log_search", "scrape ok"))
            .with_query(QueryRecord::new("warehouse", "select 1", 1));
        assert_eq!(output.result_count(), 3);
        assert_eq!(CollectorOutput::new().result_count(), 0);
    }

    #[test]
    fn deserializes_sparse_fixture() {
        let output: CollectorOutput = serde_json::from_value(json!({
            "findings": [
                {"source": "warehouse", "signal": "load_not_found", "statement": "no rows"}
            ]
        }))
        .unwrap();
        assert!(output.slot.is_none());
        assert_eq!(output.findings[0].signal, Signal::LoadNotFound);
        assert_eq!(output.findings[0].raw, Value::Null);
    }

    #[test]
    fn failed_query_has_no_results() {
        let record = QueryRecord::failed("ticketing", "search 614258134", "HTTP 500");
        assert_eq!(record.result_count, 0);
        assert_eq!(record.error.as_deref(), Some("HTTP 500"));
    }
}
