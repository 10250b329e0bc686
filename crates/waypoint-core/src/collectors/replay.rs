//! Replay collectors
//!
//! Serve a recorded output (or a recorded failure) instead of querying a
//! live source. Used to re-run past investigations offline.
//!
//! Fixture format: a JSON object keyed by collector id.
//!
//! ```json
//! {
//!   "warehouse": { "slot": {"status": "missing"}, "findings": [...] },
//!   "log_search": { "error": "HTTP 503 from log store" }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{Collector, CollectorContext, CollectorError, CollectorId, CollectorOutput};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FixtureEntry {
    Failure { error: String },
    Output(CollectorOutput),
}

/// Collector that replays a fixed result.
#[derive(Debug, Clone)]
pub struct ReplayCollector {
    id: CollectorId,
    result: Result<CollectorOutput, String>,
    delay: Option<Duration>,
}

impl ReplayCollector {
    pub fn succeeding(id: CollectorId, output: CollectorOutput) -> Self {
        Self {
            id,
            result: Ok(output),
            delay: None,
        }
    }

    pub fn failing(id: CollectorId, error: impl Into<String>) -> Self {
        Self {
            id,
            result: Err(error.into()),
            delay: None,
        }
    }

    /// Wait before answering (simulates source latency).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Collector for ReplayCollector {
    fn id(&self) -> CollectorId {
        self.id
    }

    async fn collect(&self, _ctx: &CollectorContext) -> Result<CollectorOutput, CollectorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone().map_err(CollectorError::Query)
    }
}

/// Parse a fixture document into replay collectors, in table order.
pub fn parse_fixtures(value: Value) -> Result<Vec<ReplayCollector>> {
    let Value::Object(entries) = value else {
        anyhow::bail!("fixture document must be a JSON object keyed by collector id");
    };

    let mut collectors = Vec::with_capacity(entries.len());
    for (key, entry) in entries {
        let id: CollectorId = key.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        let entry: FixtureEntry = serde_json::from_value(entry)
            .with_context(|| format!("Invalid fixture entry for collector '{}'", key))?;
        collectors.push(match entry {
            FixtureEntry::Failure { error } => ReplayCollector::failing(id, error),
            FixtureEntry::Output(output) => ReplayCollector::succeeding(id, output),
        });
    }
    collectors.sort_by_key(|c| c.id);
    Ok(collectors)
}

/// Load replay collectors from a fixture file.
pub fn load_fixtures(path: &Path) -> Result<Vec<ReplayCollector>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixture file {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse fixture file {}", path.display()))?;
    parse_fixtures(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::Signal;
    use crate::identifiers::{IdentifierSet, TransportMode};
    use serde_json::json;
    use std::io::Write;
    use uuid::Uuid;

    #[test]
    fn parses_outputs_and_failures() {
        let collectors = parse_fixtures(json!({
            "log_search": {"error": "HTTP 503"},
            "warehouse": {
                "slot": {"load": null},
                "findings": [{"source": "warehouse", "signal": "load_not_found", "statement": "no rows"}]
            }
        }))
        .unwrap();

        assert_eq!(collectors.len(), 2);
        assert_eq!(collectors[0].id, CollectorId::Warehouse);
        assert!(collectors[0].result.is_ok());
        assert_eq!(collectors[1].result, Err("HTTP 503".to_string()));
    }

    #[test]
    fn rejects_unknown_collector() {
        let err = parse_fixtures(json!({"carrier_pigeon": {}})).unwrap_err();
        assert!(err.to_string().contains("unknown collector"));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"ticketing": {{"findings": [{{"source": "ticketing", "signal": "known_incident", "statement": "INC-1 open"}}]}}}}"#
        )
        .unwrap();

        let collectors = load_fixtures(file.path()).unwrap();
        assert_eq!(collectors.len(), 1);
        let output = collectors[0].result.clone().unwrap();
        assert_eq!(output.findings[0].signal, Signal::KnownIncident);
    }

    #[tokio::test]
    async fn replays_failure_as_query_error() {
        let collector = ReplayCollector::failing(CollectorId::Ticketing, "HTTP 401");
        let ctx = CollectorContext::new(Uuid::new_v4(), IdentifierSet::new(), TransportMode::Unknown);
        let err = collector.collect(&ctx).await.unwrap_err();
        assert_eq!(err.code(), "access_denied");
    }
}
