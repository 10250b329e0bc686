//! Collector registry
//!
//! Maps each [`CollectorId`] to at most one implementation and runs calls
//! under the collector's timeout.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{Collector, CollectorContext, CollectorError, CollectorId, CollectorOutput};

/// Default collector timeout (1 minute)
pub const DEFAULT_COLLECTOR_TIMEOUT: Duration = Duration::from_secs(60);

/// Outcome of one collector call.
#[derive(Debug, Clone)]
pub struct CollectorRun {
    pub collector: CollectorId,
    pub result: Result<CollectorOutput, CollectorError>,
    pub duration: Duration,
}

/// Registry of collector implementations
pub struct CollectorRegistry {
    collectors: BTreeMap<CollectorId, Arc<dyn Collector>>,
    /// Timeout for collectors that do not declare their own
    default_timeout: Duration,
}

impl Default for CollectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self {
            collectors: BTreeMap::new(),
            default_timeout: DEFAULT_COLLECTOR_TIMEOUT,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Register a collector, returning the one it replaced.
    pub fn register(&mut self, collector: Arc<dyn Collector>) -> Option<Arc<dyn Collector>> {
        let id = collector.id();
        let previous = self.collectors.insert(id, collector);
        if previous.is_some() {
            tracing::warn!(collector = %id, "Replaced previously registered collector");
        }
        previous
    }

    pub fn get(&self, id: CollectorId) -> Option<Arc<dyn Collector>> {
        self.collectors.get(&id).cloned()
    }

    pub fn contains(&self, id: CollectorId) -> bool {
        self.collectors.contains_key(&id)
    }

    /// Registered ids in table order.
    pub fn ids(&self) -> Vec<CollectorId> {
        self.collectors.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Execute a collector by id with its timeout. `None` if not registered.
    pub async fn execute(&self, id: CollectorId, ctx: &CollectorContext) -> Option<CollectorRun> {
        let collector = self.get(id)?;
        Some(invoke(collector, ctx, self.default_timeout).await)
    }
}

/// Run one collector call bounded by its timeout.
pub(crate) async fn invoke(
    collector: Arc<dyn Collector>,
    ctx: &CollectorContext,
    default_timeout: Duration,
) -> CollectorRun {
    let id = collector.id();
    let timeout = collector.timeout().unwrap_or(default_timeout);
    let start = Instant::now();

    let result = match tokio::time::timeout(timeout, collector.collect(ctx)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                collector = %id,
                timeout_ms = timeout.as_millis() as u64,
                "Collector timed out"
            );
            Err(CollectorError::Timeout {
                collector: id,
                after: timeout,
            })
        }
    };

    CollectorRun {
        collector: id,
        result,
        duration: start.elapsed(),
    }
}
