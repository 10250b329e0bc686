//! Investigation event protocol
//!
//! `InvestigationEvent` is everything the investigator reports while it
//! runs. Transports (the CLI's JSON-lines output, a future server) consume
//! these and map them to their own presentation format.
//!
//! Emission is fire-and-forget: a dropped receiver never stalls or fails an
//! investigation.

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::collectors::{CollectorId, QueryRecord};
use crate::hypothesis::RootCauseCategory;
use crate::identifiers::{IdentifierSet, IssueType, TransportMode};
use crate::synthesis::{HumanQuestion, RootCause};

/// Pipeline stage, as reported in stage events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Collection,
    Hypotheses,
    Synthesis,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extraction => "extraction",
            Stage::Collection => "collection",
            Stage::Hypotheses => "hypotheses",
            Stage::Synthesis => "synthesis",
        }
    }
}

/// Events emitted by the investigator.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvestigationEvent {
    // ── Stage lifecycle ────────────────────────────────────────────────
    StageStarted {
        investigation_id: Uuid,
        stage: Stage,
    },

    StageCompleted {
        investigation_id: Uuid,
        stage: Stage,
        duration_ms: u64,
    },

    // ── Extraction ─────────────────────────────────────────────────────
    IdentifiersExtracted {
        identifiers: IdentifierSet,
        transport_mode: TransportMode,
        issue_type: IssueType,
        diagnostic: Option<String>,
    },

    // ── Collection ─────────────────────────────────────────────────────
    /// A collector reported a query it ran.
    QueryExecuted { query: QueryRecord },

    /// A collector finished (successfully or not).
    CollectorFinished {
        collector: CollectorId,
        wave: usize,
        result_count: usize,
        duration_ms: u64,
        error: Option<String>,
    },

    // ── Reasoning ──────────────────────────────────────────────────────
    HypothesisUpdated {
        hypothesis_id: Uuid,
        category: RootCauseCategory,
        confidence: f64,
        evidence_count: usize,
    },

    DecisionReached {
        investigation_id: Uuid,
        needs_human: bool,
        confidence: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        root_cause: Option<RootCause>,
        #[serde(skip_serializing_if = "Option::is_none")]
        question: Option<HumanQuestion>,
    },

    /// A recovered failure (the investigation continues).
    Error { source: String, error: String },
}

/// Sending half of the event stream. Disabled sinks drop everything.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<InvestigationEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<InvestigationEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Create a sink and the receiver that drains it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<InvestigationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: InvestigationEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = InvestigationEvent::CollectorFinished {
            collector: CollectorId::OceanEvents,
            wave: 2,
            result_count: 3,
            duration_ms: 12,
            error: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], json!("collector_finished"));
        assert_eq!(value["collector"], json!("ocean_events"));
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(InvestigationEvent::Error {
            source: "warehouse".to_string(),
            error: "HTTP 500".to_string(),
        });
        EventSink::disabled().emit(InvestigationEvent::StageStarted {
            investigation_id: Uuid::new_v4(),
            stage: Stage::Collection,
        });
    }

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (sink, mut rx) = EventSink::channel();
        let id = Uuid::new_v4();
        sink.emit(InvestigationEvent::StageStarted {
            investigation_id: id,
            stage: Stage::Extraction,
        });
        sink.emit(InvestigationEvent::StageCompleted {
            investigation_id: id,
            stage: Stage::Extraction,
            duration_ms: 1,
        });
        drop(sink);

        let mut stages = Vec::new();
        while let Some(event) = rx.recv().await {
            stages.push(serde_json::to_value(&event).unwrap()["type"].clone());
        }
        assert_eq!(stages, vec![json!("stage_started"), json!("stage_completed")]);
    }
}
