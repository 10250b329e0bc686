//! Investigation state
//!
//! [`InvestigationState`] is the aggregate root of one investigation. It is
//! owned by the orchestrator and never shared mutably: collectors return
//! isolated [`CollectorOutput`]s which are folded in here one at a time.
//!
//! Every field a collector can write declares its [`MergePolicy`]. Named
//! slots are replaced (each is owned by one collector), everything else is
//! appended.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::collectors::failure::normalize_error_fingerprint;
use crate::collectors::{CollectorError, CollectorId, CollectorOutput, Finding, QueryRecord, SourceRecord};
use crate::error::{InvestigationError, Result};
use crate::hypothesis::Hypothesis;
use crate::identifiers::{ExtractionOutcome, IdentifierSet, IssueType, TransportMode};
use crate::synthesis::{Decision, HumanQuestion, RootCause};

/// Pipeline phase. Only forward, one step at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Created,
    IdentifiersExtracted,
    EvidenceCollected,
    HypothesesFormed,
    Concluded,
}

impl Phase {
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Created => Some(Phase::IdentifiersExtracted),
            Phase::IdentifiersExtracted => Some(Phase::EvidenceCollected),
            Phase::EvidenceCollected => Some(Phase::HypothesesFormed),
            Phase::HypothesesFormed => Some(Phase::Concluded),
            Phase::Concluded => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Created => "created",
            Phase::IdentifiersExtracted => "identifiers_extracted",
            Phase::EvidenceCollected => "evidence_collected",
            Phase::HypothesesFormed => "hypotheses_formed",
            Phase::Concluded => "concluded",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Last writer wins.
    Replace,
    /// Concatenate in merge order.
    Append,
}

/// A collector-writable field of the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateField {
    Slot,
    LogEntries,
    Messages,
    Findings,
    Timeline,
    Queries,
}

impl StateField {
    pub fn policy(&self) -> MergePolicy {
        match self {
            StateField::Slot => MergePolicy::Replace,
            StateField::LogEntries
            | StateField::Messages
            | StateField::Findings
            | StateField::Timeline
            | StateField::Queries => MergePolicy::Append,
        }
    }
}

/// One partial update to the state.
#[derive(Debug, Clone)]
pub enum StateUpdate {
    Slot { writer: CollectorId, value: Value },
    LogEntries(Vec<SourceRecord>),
    Messages(Vec<SourceRecord>),
    Findings(Vec<Finding>),
    Timeline(Vec<TimelineEvent>),
    Queries(Vec<QueryRecord>),
}

impl StateUpdate {
    pub fn field(&self) -> StateField {
        match self {
            StateUpdate::Slot { .. } => StateField::Slot,
            StateUpdate::LogEntries(_) => StateField::LogEntries,
            StateUpdate::Messages(_) => StateField::Messages,
            StateUpdate::Findings(_) => StateField::Findings,
            StateUpdate::Timeline(_) => StateField::Timeline,
            StateUpdate::Queries(_) => StateField::Queries,
        }
    }
}

/// Timeline record of something that happened during the investigation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEvent {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub description: String,
    pub is_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl TimelineEvent {
    pub fn info(source: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            source: source.into(),
            description: description.into(),
            is_error: false,
            error_code: None,
            fingerprint: None,
        }
    }

    pub fn error(source: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            timestamp: Utc::now(),
            source: source.into(),
            fingerprint: Some(normalize_error_fingerprint(&message)),
            description: message,
            is_error: true,
            error_code: Some(code.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InvestigationState {
    id: Uuid,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    issue_text: String,
    identifiers: IdentifierSet,
    issue_type: IssueType,
    transport_mode: TransportMode,
    extraction_diagnostic: Option<String>,
    slots: BTreeMap<String, Value>,
    #[serde(skip)]
    slot_writers: BTreeMap<String, CollectorId>,
    log_entries: Vec<SourceRecord>,
    messages: Vec<SourceRecord>,
    findings: Vec<Finding>,
    timeline: Vec<TimelineEvent>,
    queries: Vec<QueryRecord>,
    hypotheses: Vec<Hypothesis>,
    phase: Phase,
    root_cause: Option<RootCause>,
    needs_human: bool,
    human_question: Option<HumanQuestion>,
    decision_confidence: Option<f64>,
    human_response: Option<String>,
}

impl InvestigationState {
    pub fn new(issue_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            completed_at: None,
            issue_text: issue_text.into(),
            identifiers: IdentifierSet::new(),
            issue_type: IssueType::default(),
            transport_mode: TransportMode::default(),
            extraction_diagnostic: None,
            slots: BTreeMap::new(),
            slot_writers: BTreeMap::new(),
            log_entries: Vec::new(),
            messages: Vec::new(),
            findings: Vec::new(),
            timeline: Vec::new(),
            queries: Vec::new(),
            hypotheses: Vec::new(),
            phase: Phase::Created,
            root_cause: None,
            needs_human: false,
            human_question: None,
            decision_confidence: None,
            human_response: None,
        }
    }

    /// Move to `to`, which must be the next phase.
    pub fn advance(&mut self, to: Phase) -> Result<()> {
        if self.phase.next() != Some(to) {
            return Err(InvestigationError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(())
    }

    /// A complete investigation only accepts a human response.
    fn ensure_open(&self) -> Result<()> {
        if self.is_complete() {
            return Err(InvestigationError::AlreadyComplete(self.id));
        }
        Ok(())
    }

    /// Record the extraction result. A degraded extraction lands in the
    /// timeline as an error.
    pub fn set_identifiers(&mut self, outcome: ExtractionOutcome) -> Result<()> {
        self.ensure_open()?;
        if let Some(diagnostic) = &outcome.diagnostic {
            self.timeline
                .push(TimelineEvent::error("extractor", "extraction_degraded", diagnostic.clone()));
        } else {
            self.timeline
                .push(TimelineEvent::info("extractor", outcome.identifiers.summary()));
        }
        self.identifiers = outcome.identifiers;
        self.transport_mode = outcome.transport_mode;
        self.issue_type = outcome.issue_type;
        self.extraction_diagnostic = outcome.diagnostic;
        Ok(())
    }

    /// Apply one update under its field's merge policy.
    pub fn apply(&mut self, update: StateUpdate) -> Result<()> {
        self.ensure_open()?;
        self.apply_unchecked(update);
        Ok(())
    }

    fn apply_unchecked(&mut self, update: StateUpdate) {
        match update {
            StateUpdate::Slot { writer, value } => {
                let name = writer.slot_name().to_string();
                if let Some(previous) = self.slot_writers.insert(name.clone(), writer) {
                    warn!(
                        investigation_id = %self.id,
                        slot = %name,
                        previous = %previous,
                        writer = %writer,
                        "Slot written twice, keeping the latest value"
                    );
                }
                self.slots.insert(name, value);
            }
            StateUpdate::LogEntries(items) => self.log_entries.extend(items),
            StateUpdate::Messages(items) => self.messages.extend(items),
            StateUpdate::Findings(items) => self.findings.extend(items),
            StateUpdate::Timeline(items) => self.timeline.extend(items),
            StateUpdate::Queries(items) => self.queries.extend(items),
        }
    }

    /// Fold one collector's output into the state.
    pub fn merge_output(&mut self, collector: CollectorId, output: CollectorOutput) -> Result<()> {
        self.ensure_open()?;
        let description = format!(
            "{} returned {} result(s)",
            collector,
            output.result_count()
        );
        if let Some(value) = output.slot {
            self.apply_unchecked(StateUpdate::Slot {
                writer: collector,
                value,
            });
        }
        self.apply_unchecked(StateUpdate::LogEntries(output.log_entries));
        self.apply_unchecked(StateUpdate::Messages(output.messages));
        self.apply_unchecked(StateUpdate::Findings(output.findings));
        self.apply_unchecked(StateUpdate::Queries(output.queries));
        self.apply_unchecked(StateUpdate::Timeline(vec![TimelineEvent::info(
            collector.as_str(),
            description,
        )]));
        Ok(())
    }

    /// Record a collector that produced nothing. Returns the failed query
    /// record that was appended.
    pub fn record_failure(
        &mut self,
        collector: CollectorId,
        error: &CollectorError,
    ) -> Result<QueryRecord> {
        self.ensure_open()?;
        let message = error.to_string();
        let record = QueryRecord::failed(collector.as_str(), collector.slot_name(), message.clone());
        self.apply_unchecked(StateUpdate::Queries(vec![record.clone()]));
        self.apply_unchecked(StateUpdate::Timeline(vec![TimelineEvent::error(
            collector.as_str(),
            error.code(),
            message,
        )]));
        Ok(record)
    }

    pub fn set_hypotheses(&mut self, hypotheses: Vec<Hypothesis>) -> Result<()> {
        self.ensure_open()?;
        self.hypotheses = hypotheses;
        Ok(())
    }

    /// Record the decision and finish the investigation.
    pub fn conclude(&mut self, decision: Decision) -> Result<()> {
        self.ensure_open()?;
        self.advance(Phase::Concluded)?;

        self.decision_confidence = Some(decision.confidence());
        match decision {
            Decision::Conclude(root_cause) => {
                self.timeline.push(TimelineEvent::info(
                    "synthesis",
                    format!("Concluded: {}", root_cause.category),
                ));
                self.root_cause = Some(root_cause);
            }
            Decision::NeedsHuman { question, .. } => {
                self.timeline
                    .push(TimelineEvent::info("synthesis", "Escalated for human review"));
                self.needs_human = true;
                self.human_question = Some(question);
            }
        }
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.root_cause.is_some() || self.needs_human
    }

    /// Attach the human's answer to an escalated investigation. Accepted once.
    pub fn record_human_response(&mut self, response: impl Into<String>) -> Result<()> {
        if !self.needs_human || self.human_question.is_none() || self.human_response.is_some() {
            return Err(InvestigationError::NotAwaitingHuman(self.id));
        }
        self.human_response = Some(response.into());
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn issue_text(&self) -> &str {
        &self.issue_text
    }

    pub fn identifiers(&self) -> &IdentifierSet {
        &self.identifiers
    }

    pub fn issue_type(&self) -> IssueType {
        self.issue_type
    }

    pub fn transport_mode(&self) -> TransportMode {
        self.transport_mode
    }

    pub fn extraction_diagnostic(&self) -> Option<&str> {
        self.extraction_diagnostic.as_deref()
    }

    pub fn slots(&self) -> &BTreeMap<String, Value> {
        &self.slots
    }

    pub fn slot(&self, collector: CollectorId) -> Option<&Value> {
        self.slots.get(collector.slot_name())
    }

    pub fn log_entries(&self) -> &[SourceRecord] {
        &self.log_entries
    }

    pub fn messages(&self) -> &[SourceRecord] {
        &self.messages
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn timeline(&self) -> &[TimelineEvent] {
        &self.timeline
    }

    pub fn queries(&self) -> &[QueryRecord] {
        &self.queries
    }

    pub fn hypotheses(&self) -> &[Hypothesis] {
        &self.hypotheses
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn root_cause(&self) -> Option<&RootCause> {
        self.root_cause.as_ref()
    }

    pub fn needs_human(&self) -> bool {
        self.needs_human
    }

    pub fn human_question(&self) -> Option<&HumanQuestion> {
        self.human_question.as_ref()
    }

    pub fn decision_confidence(&self) -> Option<f64> {
        self.decision_confidence
    }

    pub fn human_response(&self) -> Option<&str> {
        self.human_response.as_deref()
    }
}
