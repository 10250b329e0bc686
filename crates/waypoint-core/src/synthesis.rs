//! Synthesis: hypotheses in, decision out
//!
//! [`decide`] is pure. It returns structured data; the plain-text phrasing
//! of a [`HumanQuestion`] lives in its `Display` impl so transports can
//! render it however they like.
//!
//! Decision order:
//! 1. no hypotheses → ask a human
//! 2. sort by confidence (desc), earliest created first on ties
//! 3. top ≥ confidence threshold → conclude
//! 4. more than one above the competing threshold → ask which is right
//! 5. otherwise → ask to confirm the top hypothesis

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::config::InvestigationConfig;
use crate::hypothesis::{Evidence, Hypothesis, RootCauseCategory};

/// Action recommended when nothing more specific is known.
pub const GENERIC_ACTION: &str = "Manual investigation required";

const NO_HYPOTHESES_PROMPT: &str =
    "No hypotheses formed from the collected evidence. Please review the issue manually.";

/// Thresholds the decision procedure applies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionPolicy {
    /// Inclusive threshold for auto-concluding.
    pub confidence_threshold: f64,
    /// Exclusive threshold for counting a hypothesis as a serious contender.
    pub competing_threshold: f64,
    /// How many hypotheses / evidence items a question shows.
    pub max_candidates: usize,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.80,
            competing_threshold: 0.60,
            max_candidates: 3,
        }
    }
}

impl From<&InvestigationConfig> for DecisionPolicy {
    fn from(config: &InvestigationConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            competing_threshold: config.competing_threshold,
            max_candidates: config.max_question_candidates,
        }
    }
}

/// Terminal artifact of an auto-concluded investigation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RootCause {
    pub category: RootCauseCategory,
    pub description: String,
    pub confidence: f64,
    pub evidence: Vec<Evidence>,
    pub recommended_actions: Vec<String>,
}

impl RootCause {
    fn from_hypothesis(hypothesis: &Hypothesis) -> Self {
        Self {
            category: hypothesis.category(),
            description: hypothesis.description().to_string(),
            confidence: hypothesis.confidence(),
            evidence: hypothesis.evidence_for().to_vec(),
            recommended_actions: recommended_actions(hypothesis.category()),
        }
    }
}

/// Hypothesis as shown in a question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateSummary {
    pub hypothesis_id: Uuid,
    pub category: RootCauseCategory,
    pub description: String,
    pub confidence: f64,
}

impl From<&Hypothesis> for CandidateSummary {
    fn from(h: &Hypothesis) -> Self {
        Self {
            hypothesis_id: h.id(),
            category: h.category(),
            description: h.description().to_string(),
            confidence: h.confidence(),
        }
    }
}

/// What a human is asked to do.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HumanQuestion {
    /// Nothing to go on.
    NoHypotheses,
    /// Several strong hypotheses; pick the right one.
    Disambiguate { candidates: Vec<CandidateSummary> },
    /// One leading hypothesis below the threshold; confirm or reject it.
    Confirm {
        candidate: CandidateSummary,
        evidence: Vec<Evidence>,
    },
}

impl fmt::Display for HumanQuestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HumanQuestion::NoHypotheses => f.write_str(NO_HYPOTHESES_PROMPT),
            HumanQuestion::Disambiguate { candidates } => {
                writeln!(f, "Multiple root causes are plausible:")?;
                for (i, c) in candidates.iter().enumerate() {
                    writeln!(f, "  {}. {} ({:.0}% confidence)", i + 1, c.description, c.confidence * 100.0)?;
                }
                write!(f, "Which of these is correct?")
            }
            HumanQuestion::Confirm {
                candidate,
                evidence,
            } => {
                writeln!(
                    f,
                    "Most likely root cause: {} ({:.0}% confidence)",
                    candidate.description,
                    candidate.confidence * 100.0
                )?;
                if !evidence.is_empty() {
                    writeln!(f, "Supporting evidence:")?;
                    for e in evidence {
                        writeln!(f, "  - [{}] {}", e.source, e.finding)?;
                    }
                }
                write!(f, "Can you confirm this is the root cause?")
            }
        }
    }
}

/// Outcome of synthesis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Decision {
    Conclude(RootCause),
    NeedsHuman {
        question: HumanQuestion,
        confidence: f64,
    },
}

impl Decision {
    pub fn needs_human(&self) -> bool {
        matches!(self, Decision::NeedsHuman { .. })
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Decision::Conclude(root_cause) => root_cause.confidence,
            Decision::NeedsHuman { confidence, .. } => *confidence,
        }
    }

    pub fn root_cause(&self) -> Option<&RootCause> {
        match self {
            Decision::Conclude(root_cause) => Some(root_cause),
            Decision::NeedsHuman { .. } => None,
        }
    }

    pub fn question(&self) -> Option<&HumanQuestion> {
        match self {
            Decision::Conclude(_) => None,
            Decision::NeedsHuman { question, .. } => Some(question),
        }
    }
}

/// Recommended remediation steps per category.
pub fn recommended_actions(category: RootCauseCategory) -> Vec<String> {
    let actions: &[&str] = match category {
        RootCauseCategory::LoadNotFound => &[
            "Verify the identifiers against the customer's TMS export",
            "Ask the shipper to resend the load if it was never created",
        ],
        RootCauseCategory::NetworkRelationship => &[
            "Create or re-activate the shipper-carrier network relationship",
            "Re-trigger tracking once the relationship is active",
        ],
        RootCauseCategory::ScacIssue => &[
            "Correct the carrier SCAC on the load",
            "Add a SCAC mapping if the carrier uses an alias",
        ],
        RootCauseCategory::TrackingNotStarted => &[
            "Start tracking manually for the load",
            "Check the tracking start trigger configured for the shipper",
        ],
        RootCauseCategory::ScrapingError => &[
            "Check carrier portal credentials and availability",
            "Escalate to the scraping team if failures persist",
        ],
        RootCauseCategory::OceanSubscription => &[
            "Create or re-activate the container subscription",
            "Confirm the container number and carrier SCAC on the subscription",
        ],
        RootCauseCategory::ValidationError => &[
            "Review the validation error and correct the load data",
            "Resubmit the load",
        ],
        RootCauseCategory::DuplicateLoad => &[
            "Identify the canonical load and cancel the duplicate",
            "Move tracking to the canonical load",
        ],
        RootCauseCategory::MissingFields => &[
            "Ask the shipper to populate the missing required fields",
            "Resubmit the load once fields are complete",
        ],
        RootCauseCategory::IntegrationIssue => &[
            "Inspect recent integration delivery failures",
            "Contact the integration owner to restore the feed",
        ],
        RootCauseCategory::DeviceGps => &[
            "Contact the carrier to confirm the driver app or device is active",
            "Fall back to carrier-provided updates until the device reports",
        ],
        RootCauseCategory::ApiError => &[
            "Check the upstream API status and error rates",
            "Replay missed updates once the API recovers",
        ],
        RootCauseCategory::Unknown => &[GENERIC_ACTION],
    };
    actions.iter().map(|a| a.to_string()).collect()
}

fn rank(a: &Hypothesis, b: &Hypothesis) -> Ordering {
    b.confidence()
        .total_cmp(&a.confidence())
        .then_with(|| a.created_at().cmp(&b.created_at()))
}

/// Top supporting evidence, highest weight first (stable on ties).
fn top_evidence(hypothesis: &Hypothesis, limit: usize) -> Vec<Evidence> {
    let mut evidence = hypothesis.evidence_for().to_vec();
    evidence.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    evidence.truncate(limit);
    evidence
}

/// Apply the decision policy.
pub fn decide(hypotheses: &[Hypothesis], policy: &DecisionPolicy) -> Decision {
    if hypotheses.is_empty() {
        return Decision::NeedsHuman {
            question: HumanQuestion::NoHypotheses,
            confidence: 0.0,
        };
    }

    let mut ranked: Vec<&Hypothesis> = hypotheses.iter().collect();
    ranked.sort_by(|a, b| rank(a, b));
    let top = ranked[0];

    if top.confidence() >= policy.confidence_threshold {
        return Decision::Conclude(RootCause::from_hypothesis(top));
    }

    let competing = ranked
        .iter()
        .filter(|h| h.confidence() > policy.competing_threshold)
        .count();

    if competing > 1 {
        let candidates = ranked
            .iter()
            .take(policy.max_candidates)
            .map(|h| CandidateSummary::from(*h))
            .collect();
        return Decision::NeedsHuman {
            question: HumanQuestion::Disambiguate { candidates },
            confidence: top.confidence(),
        };
    }

    Decision::NeedsHuman {
        question: HumanQuestion::Confirm {
            candidate: CandidateSummary::from(top),
            evidence: top_evidence(top, policy.max_candidates),
        },
        confidence: top.confidence(),
    }
}
