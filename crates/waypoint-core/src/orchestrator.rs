//! Investigator: the single investigation pipeline.
//!
//! ```text
//!  issue text ──► extraction ──► collection ──► hypotheses ──► synthesis
//!                 (model)        (waves of      (pattern        (decide)
//!                                 collectors)    library)
//! ```
//!
//! Each stage finishes and is merged into the [`InvestigationState`] before
//! the next starts. Stage failures that can be recovered (model errors,
//! collector errors) are recorded and the pipeline carries on; only
//! orchestration errors reach the caller.
//!
//! Transports either await [`Investigator::run`] or call
//! [`Investigator::run_streaming`] and map the [`InvestigationEvent`]s.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::ai::LanguageModel;
use crate::collectors::CollectorRegistry;
use crate::config::InvestigationConfig;
use crate::error::Result;
use crate::events::{EventSink, InvestigationEvent, Stage};
use crate::identifiers::IdentifierExtractor;
use crate::patterns::HypothesisEngine;
use crate::scheduler::CollectionScheduler;
use crate::state::{InvestigationState, Phase};
use crate::synthesis::{decide, Decision};

/// Shared services the investigator needs.
#[derive(Clone)]
pub struct InvestigatorServices {
    pub model: Arc<dyn LanguageModel>,
    pub registry: Arc<CollectorRegistry>,
}

pub struct Investigator {
    services: InvestigatorServices,
    config: InvestigationConfig,
    engine: HypothesisEngine,
}

impl Investigator {
    /// Rejects an invalid configuration up front.
    pub fn new(services: InvestigatorServices, config: InvestigationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            services,
            config,
            engine: HypothesisEngine::new(),
        })
    }

    pub fn config(&self) -> &InvestigationConfig {
        &self.config
    }

    /// Run one investigation to completion.
    ///
    /// A non-empty `manual` map bypasses the model and is used as the
    /// identifier set.
    pub async fn run(
        &self,
        issue_text: &str,
        manual: &BTreeMap<String, String>,
    ) -> Result<InvestigationState> {
        self.run_with_events(issue_text, manual, &EventSink::disabled())
            .await
    }

    /// Start an investigation on a spawned task.
    ///
    /// Returns the event receiver and the task handle, which resolves to the
    /// completed state.
    pub fn run_streaming(
        self,
        issue_text: String,
        manual: BTreeMap<String, String>,
    ) -> (
        mpsc::UnboundedReceiver<InvestigationEvent>,
        JoinHandle<Result<InvestigationState>>,
    ) {
        let (events, event_rx) = EventSink::channel();
        let handle = tokio::spawn(async move {
            self.run_with_events(&issue_text, &manual, &events).await
        });
        (event_rx, handle)
    }

    pub async fn run_with_events(
        &self,
        issue_text: &str,
        manual: &BTreeMap<String, String>,
        events: &EventSink,
    ) -> Result<InvestigationState> {
        let mut state = InvestigationState::new(issue_text);
        let id = state.id();
        info!(investigation_id = %id, "Investigation started");

        // Extraction
        let started = stage_started(events, id, Stage::Extraction);
        let extractor = IdentifierExtractor::new(
            Arc::clone(&self.services.model),
            self.config.extraction_max_tokens,
            self.config.extraction_temperature,
        );
        let outcome = extractor.extract(issue_text, manual).await;
        if let Some(diagnostic) = &outcome.diagnostic {
            events.emit(InvestigationEvent::Error {
                source: "extractor".to_string(),
                error: diagnostic.clone(),
            });
        }
        events.emit(InvestigationEvent::IdentifiersExtracted {
            identifiers: outcome.identifiers.clone(),
            transport_mode: outcome.transport_mode,
            issue_type: outcome.issue_type,
            diagnostic: outcome.diagnostic.clone(),
        });
        state.set_identifiers(outcome)?;
        state.advance(Phase::IdentifiersExtracted)?;
        stage_completed(events, id, Stage::Extraction, started);

        // Collection
        let started = stage_started(events, id, Stage::Collection);
        let scheduler = CollectionScheduler::new(Arc::clone(&self.services.registry))
            .with_default_timeout(self.config.collector_timeout())
            .with_events(events.clone());
        let report = scheduler.collect(&mut state).await?;
        info!(
            investigation_id = %id,
            mode = %state.transport_mode(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped.len(),
            "Evidence collected"
        );
        state.advance(Phase::EvidenceCollected)?;
        stage_completed(events, id, Stage::Collection, started);

        // Hypotheses
        let started = stage_started(events, id, Stage::Hypotheses);
        let hypotheses = self.engine.form(state.findings());
        for h in &hypotheses {
            events.emit(InvestigationEvent::HypothesisUpdated {
                hypothesis_id: h.id(),
                category: h.category(),
                confidence: h.confidence(),
                evidence_count: h.evidence_count(),
            });
        }
        info!(investigation_id = %id, count = hypotheses.len(), "Hypotheses formed");
        state.set_hypotheses(hypotheses)?;
        state.advance(Phase::HypothesesFormed)?;
        stage_completed(events, id, Stage::Hypotheses, started);

        // Synthesis
        let started = stage_started(events, id, Stage::Synthesis);
        let decision = decide(state.hypotheses(), &self.config.policy());
        log_decision(id, &decision);
        events.emit(InvestigationEvent::DecisionReached {
            investigation_id: id,
            needs_human: decision.needs_human(),
            confidence: decision.confidence(),
            root_cause: decision.root_cause().cloned(),
            question: decision.question().cloned(),
        });
        state.conclude(decision)?;
        stage_completed(events, id, Stage::Synthesis, started);

        Ok(state)
    }
}

fn stage_started(events: &EventSink, investigation_id: Uuid, stage: Stage) -> Instant {
    tracing::debug!(investigation_id = %investigation_id, stage = stage.as_str(), "Stage started");
    events.emit(InvestigationEvent::StageStarted {
        investigation_id,
        stage,
    });
    Instant::now()
}

fn stage_completed(events: &EventSink, investigation_id: Uuid, stage: Stage, started: Instant) {
    let duration_ms = started.elapsed().as_millis() as u64;
    tracing::debug!(
        investigation_id = %investigation_id,
        stage = stage.as_str(),
        duration_ms,
        "Stage completed"
    );
    events.emit(InvestigationEvent::StageCompleted {
        investigation_id,
        stage,
        duration_ms,
    });
}

fn log_decision(investigation_id: Uuid, decision: &Decision) {
    match decision {
        Decision::Conclude(root_cause) => info!(
            investigation_id = %investigation_id,
            category = %root_cause.category,
            confidence = root_cause.confidence,
            "Root cause concluded"
        ),
        Decision::NeedsHuman { confidence, .. } => info!(
            investigation_id = %investigation_id,
            confidence = *confidence,
            "Escalating to a human"
        ),
    }
}
