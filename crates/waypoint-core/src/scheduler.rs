//! Collection scheduler
//!
//! Runs collectors in waves. Every mode gets wave 1 (the base collectors
//! plus the configuration lookup). Ocean shipments get a second wave whose
//! collectors see wave 1's merged slots, so they can read the subscription
//! reference produced by the configuration lookup.
//!
//! Within a wave each collector runs in its own tokio task. A collector that
//! errors, times out or panics costs only its own output. Results are folded
//! into the state one at a time, in completion order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info, warn};

use crate::collectors::registry::{invoke, CollectorRun};
use crate::collectors::{
    CollectorContext, CollectorError, CollectorId, CollectorRegistry, CollectorRole,
};
use crate::events::{EventSink, InvestigationEvent};
use crate::identifiers::TransportMode;
use crate::state::InvestigationState;

/// Collectors scheduled to run concurrently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wave {
    /// 1-based.
    pub index: usize,
    pub collectors: Vec<CollectorId>,
}

/// Which collectors run for `mode`, and in which wave.
pub fn plan_waves(mode: TransportMode) -> Vec<Wave> {
    let first: Vec<CollectorId> = CollectorId::ALL
        .into_iter()
        .filter(|c| c.role() != CollectorRole::OceanDependent)
        .collect();
    let mut waves = vec![Wave {
        index: 1,
        collectors: first,
    }];

    if mode == TransportMode::Ocean {
        waves.push(Wave {
            index: 2,
            collectors: CollectorId::ALL
                .into_iter()
                .filter(|c| c.role() == CollectorRole::OceanDependent)
                .collect(),
        });
    }
    waves
}

/// What happened to one collector.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorReport {
    pub collector: CollectorId,
    pub wave: usize,
    pub result_count: usize,
    pub duration: Duration,
    pub error: Option<String>,
}

impl CollectorReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a whole collection stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionReport {
    /// In merge (completion) order.
    pub collectors: Vec<CollectorReport>,
    /// Planned but not registered.
    pub skipped: Vec<CollectorId>,
}

impl CollectionReport {
    pub fn succeeded(&self) -> usize {
        self.collectors.iter().filter(|r| r.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.collectors.len() - self.succeeded()
    }

    /// Merge order of collectors in `wave`.
    pub fn merge_order(&self, wave: usize) -> Vec<CollectorId> {
        self.collectors
            .iter()
            .filter(|r| r.wave == wave)
            .map(|r| r.collector)
            .collect()
    }
}

pub struct CollectionScheduler {
    registry: Arc<CollectorRegistry>,
    default_timeout: Duration,
    events: EventSink,
}

impl CollectionScheduler {
    pub fn new(registry: Arc<CollectorRegistry>) -> Self {
        let default_timeout = registry.default_timeout();
        Self {
            registry,
            default_timeout,
            events: EventSink::disabled(),
        }
    }

    /// Timeout for collectors that do not declare their own.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Run every planned wave against `state`, merging as results arrive.
    /// Fails only when `state` is already complete.
    pub async fn collect(
        &self,
        state: &mut InvestigationState,
    ) -> crate::error::Result<CollectionReport> {
        let mut report = CollectionReport::default();

        for wave in plan_waves(state.transport_mode()) {
            let ctx = Arc::new(
                CollectorContext::new(state.id(), state.identifiers().clone(), state.transport_mode())
                    .with_prior_slots(state.slots().clone()),
            );

            let mut pending = FuturesUnordered::new();
            for id in &wave.collectors {
                let Some(collector) = self.registry.get(*id) else {
                    debug!(collector = %id, wave = wave.index, "Collector not registered, skipping");
                    report.skipped.push(*id);
                    continue;
                };

                let id = *id;
                let ctx = Arc::clone(&ctx);
                let timeout = self.default_timeout;
                let started = Instant::now();
                let handle = tokio::spawn(async move { invoke(collector, &ctx, timeout).await });
                pending.push(async move { (id, started, handle.await) });
            }

            let launched = pending.len();
            while let Some((id, started, joined)) = pending.next().await {
                let run = joined.unwrap_or_else(|e| CollectorRun {
                    collector: id,
                    result: Err(CollectorError::Aborted(e.to_string())),
                    duration: started.elapsed(),
                });
                report.collectors.push(self.merge_run(state, wave.index, run)?);
            }

            info!(
                investigation_id = %state.id(),
                wave = wave.index,
                collectors = launched,
                "Collection wave finished"
            );
        }

        Ok(report)
    }

    fn merge_run(
        &self,
        state: &mut InvestigationState,
        wave: usize,
        run: CollectorRun,
    ) -> crate::error::Result<CollectorReport> {
        let CollectorRun {
            collector,
            result,
            duration,
        } = run;
        let duration_ms = duration.as_millis() as u64;

        let (result_count, error) = match result {
            Ok(output) => {
                for query in &output.queries {
                    self.events.emit(InvestigationEvent::QueryExecuted {
                        query: query.clone(),
                    });
                }
                let count = output.result_count();
                debug!(collector = %collector, results = count, duration_ms, "Collector finished");
                state.merge_output(collector, output)?;
                (count, None)
            }
            Err(e) => {
                warn!(
                    investigation_id = %state.id(),
                    collector = %collector,
                    code = e.code(),
                    "Collector failed: {}",
                    e
                );
                let query = state.record_failure(collector, &e)?;
                self.events.emit(InvestigationEvent::QueryExecuted { query });
                self.events.emit(InvestigationEvent::Error {
                    source: collector.to_string(),
                    error: e.to_string(),
                });
                (0, Some(e.to_string()))
            }
        };

        self.events.emit(InvestigationEvent::CollectorFinished {
            collector,
            wave,
            result_count,
            duration_ms,
            error: error.clone(),
        });

        Ok(CollectorReport {
            collector,
            wave,
            result_count,
            duration,
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::{Collector, CollectorOutput, Finding, QueryRecord, ReplayCollector, Signal};
    use crate::identifiers::{IdentifierKind, IdentifierSet};
    use async_trait::async_trait;
    use serde_json::json;

    /// Writes the subscription reference it was given into its slot.
    struct SubscriptionEcho;

    #[async_trait]
    impl Collector for SubscriptionEcho {
        fn id(&self) -> CollectorId {
            CollectorId::OceanSubscription
        }

        async fn collect(&self, ctx: &CollectorContext) -> Result<CollectorOutput, CollectorError> {
            let Some(subscription) = ctx.subscription_ref() else {
                return Err(CollectorError::MissingInput("subscription_id".into()));
            };
            Ok(CollectorOutput::new().with_slot(json!({"seen": subscription})))
        }
    }

    struct Panicking;

    #[async_trait]
    impl Collector for Panicking {
        fn id(&self) -> CollectorId {
            CollectorId::DocumentSearch
        }

        async fn collect(&self, _ctx: &CollectorContext) -> Result<CollectorOutput, CollectorError> {
            panic!("document index corrupted");
        }
    }

    fn ocean_state() -> InvestigationState {
        let mut state = InvestigationState::new("container MSCU1234567 stuck");
        state.set_identifiers(crate::identifiers::ExtractionOutcome {
            identifiers: IdentifierSet::new().with(IdentifierKind::ContainerNumber, "MSCU1234567"),
            transport_mode: TransportMode::Ocean,
            ..Default::default()
        })
        .unwrap();
        state
    }

    fn registry(collectors: Vec<Arc<dyn Collector>>) -> Arc<CollectorRegistry> {
        let mut registry = CollectorRegistry::new();
        for collector in collectors {
            registry.register(collector);
        }
        Arc::new(registry)
    }

    #[test]
    fn ocean_plans_two_waves() {
        let waves = plan_waves(TransportMode::Ocean);
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0].collectors.len(), 6);
        assert!(waves[0].collectors.contains(&CollectorId::ConfigLookup));
        assert_eq!(
            waves[1].collectors,
            vec![
                CollectorId::OceanEvents,
                CollectorId::OceanSubscription,
                CollectorId::VesselSchedule
            ]
        );
    }

    #[test]
    fn other_modes_plan_one_wave_with_config_lookup() {
        for mode in [
            TransportMode::OverTheRoad,
            TransportMode::Air,
            TransportMode::Rail,
            TransportMode::Unknown,
        ] {
            let waves = plan_waves(mode);
            assert_eq!(waves.len(), 1);
            assert!(waves[0].collectors.contains(&CollectorId::ConfigLookup));
            assert!(!waves[0]
                .collectors
                .iter()
                .any(|c| c.role() == CollectorRole::OceanDependent));
        }
    }

    #[tokio::test]
    async fn second_wave_sees_config_lookup_slot() {
        let registry = registry(vec![
            Arc::new(ReplayCollector::succeeding(
                CollectorId::ConfigLookup,
                CollectorOutput::new().with_slot(json!({"subscription_id": "SUB-77"})),
            )),
            Arc::new(SubscriptionEcho),
        ]);
        let mut state = ocean_state();

        let report = CollectionScheduler::new(registry).collect(&mut state).await.unwrap();

        assert_eq!(report.failed(), 0);
        assert_eq!(
            state.slot(CollectorId::OceanSubscription),
            Some(&json!({"seen": "SUB-77"}))
        );
        assert_eq!(report.merge_order(2), vec![CollectorId::OceanSubscription]);
    }

    #[tokio::test]
    async fn failures_do_not_cancel_siblings() {
        let registry = registry(vec![
            Arc::new(Panicking),
            Arc::new(ReplayCollector::failing(CollectorId::LogSearch, "HTTP 503")),
            Arc::new(
                ReplayCollector::succeeding(
                    CollectorId::Warehouse,
                    CollectorOutput::new()
                        .with_finding(Finding::new("warehouse", Signal::LoadFound, "load exists")),
                )
                .with_delay(Duration::from_millis(20)),
            ),
        ]);
        let mut state = InvestigationState::new("load 614258134 not tracking");

        let report = CollectionScheduler::new(registry).collect(&mut state).await.unwrap();

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 2);
        assert_eq!(state.findings().len(), 1);
        let errors: Vec<_> = state.timeline().iter().filter(|e| e.is_error).collect();
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .any(|e| e.error_code.as_deref() == Some("aborted")));
    }

    #[tokio::test]
    async fn merges_in_completion_order() {
        let registry = registry(vec![
            Arc::new(
                ReplayCollector::succeeding(CollectorId::Warehouse, CollectorOutput::new())
                    .with_delay(Duration::from_millis(60)),
            ),
            Arc::new(ReplayCollector::succeeding(CollectorId::Ticketing, CollectorOutput::new())),
        ]);
        let mut state = InvestigationState::new("issue");

        let report = CollectionScheduler::new(registry).collect(&mut state).await.unwrap();
        assert_eq!(
            report.merge_order(1),
            vec![CollectorId::Ticketing, CollectorId::Warehouse]
        );
    }

    #[tokio::test]
    async fn unregistered_collectors_are_skipped() {
        let mut state = ocean_state();
        let report = CollectionScheduler::new(registry(Vec::new()))
            .collect(&mut state)
            .await
            .unwrap();
        assert!(report.collectors.is_empty());
        assert_eq!(report.skipped.len(), CollectorId::ALL.len());
    }

    #[tokio::test]
    async fn emits_query_and_finish_events() {
        let registry = registry(vec![Arc::new(ReplayCollector::succeeding(
            CollectorId::Ticketing,
            CollectorOutput::new().with_query(QueryRecord::new("ticketing", "search 614258134", 2)),
        ))]);
        let (sink, mut rx) = EventSink::channel();
        let mut state = InvestigationState::new("issue");

        CollectionScheduler::new(registry)
            .with_events(sink)
            .collect(&mut state)
            .await
            .unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(serde_json::to_value(&event).unwrap()["type"].clone());
        }
        assert_eq!(kinds, vec![json!("query_executed"), json!("collector_finished")]);
    }

    #[tokio::test]
    async fn failed_collector_reports_its_query() {
        let registry = registry(vec![Arc::new(ReplayCollector::failing(
            CollectorId::LogSearch,
            "HTTP 503 from log store",
        ))]);
        let (sink, mut rx) = EventSink::channel();
        let mut state = InvestigationState::new("issue");

        CollectionScheduler::new(registry)
            .with_events(sink)
            .collect(&mut state)
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        let failed: Vec<&QueryRecord> = events
            .iter()
            .filter_map(|e| match e {
                InvestigationEvent::QueryExecuted { query } => Some(query),
                _ => None,
            })
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].source, "log_search");
        assert!(failed[0].error.as_deref().is_some_and(|e| e.contains("HTTP 503")));
        assert_eq!(Some(failed[0]), state.queries().first());
        assert!(matches!(
            events.last(),
            Some(InvestigationEvent::CollectorFinished { error: Some(_), .. })
        ));
    }

    #[tokio::test]
    async fn complete_state_is_not_collected_into() {
        let registry = registry(vec![Arc::new(ReplayCollector::succeeding(
            CollectorId::Warehouse,
            CollectorOutput::new().with_finding(Finding::new("warehouse", Signal::LoadFound, "late")),
        ))]);
        let mut state = InvestigationState::new("issue");
        for phase in [
            crate::state::Phase::IdentifiersExtracted,
            crate::state::Phase::EvidenceCollected,
            crate::state::Phase::HypothesesFormed,
        ] {
            state.advance(phase).unwrap();
        }
        state
            .conclude(crate::synthesis::decide(&[], &Default::default()))
            .unwrap();

        let err = CollectionScheduler::new(registry)
            .collect(&mut state)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::InvestigationError::AlreadyComplete(_)));
        assert!(state.findings().is_empty());
    }
}
