//! Hypotheses and evidence
//!
//! A [`Hypothesis`] owns its evidence lists and derives its confidence from
//! them. Confidence is recomputed on every append and never set by hand
//! after creation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Default confidence of a hypothesis before any evidence is attached.
pub const DEFAULT_PRIOR: f64 = 0.5;

/// Root-cause categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootCauseCategory {
    LoadNotFound,
    NetworkRelationship,
    ScacIssue,
    TrackingNotStarted,
    ScrapingError,
    OceanSubscription,
    ValidationError,
    DuplicateLoad,
    MissingFields,
    IntegrationIssue,
    DeviceGps,
    ApiError,
    Unknown,
}

impl RootCauseCategory {
    pub const ALL: [RootCauseCategory; 13] = [
        RootCauseCategory::LoadNotFound,
        RootCauseCategory::NetworkRelationship,
        RootCauseCategory::ScacIssue,
        RootCauseCategory::TrackingNotStarted,
        RootCauseCategory::ScrapingError,
        RootCauseCategory::OceanSubscription,
        RootCauseCategory::ValidationError,
        RootCauseCategory::DuplicateLoad,
        RootCauseCategory::MissingFields,
        RootCauseCategory::IntegrationIssue,
        RootCauseCategory::DeviceGps,
        RootCauseCategory::ApiError,
        RootCauseCategory::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RootCauseCategory::LoadNotFound => "load_not_found",
            RootCauseCategory::NetworkRelationship => "network_relationship",
            RootCauseCategory::ScacIssue => "scac_issue",
            RootCauseCategory::TrackingNotStarted => "tracking_not_started",
            RootCauseCategory::ScrapingError => "scraping_error",
            RootCauseCategory::OceanSubscription => "ocean_subscription",
            RootCauseCategory::ValidationError => "validation_error",
            RootCauseCategory::DuplicateLoad => "duplicate_load",
            RootCauseCategory::MissingFields => "missing_fields",
            RootCauseCategory::IntegrationIssue => "integration_issue",
            RootCauseCategory::DeviceGps => "device_gps",
            RootCauseCategory::ApiError => "api_error",
            RootCauseCategory::Unknown => "unknown",
        }
    }

    /// Default hypothesis description for this category.
    pub fn description(&self) -> &'static str {
        match self {
            RootCauseCategory::LoadNotFound => {
                "The load does not exist in the tracking platform or was created under different identifiers"
            }
            RootCauseCategory::NetworkRelationship => {
                "No active network relationship between shipper and carrier"
            }
            RootCauseCategory::ScacIssue => "The carrier SCAC code is invalid or not mapped",
            RootCauseCategory::TrackingNotStarted => {
                "Tracking was never started for the load"
            }
            RootCauseCategory::ScrapingError => {
                "Carrier portal scraping is failing for this shipment"
            }
            RootCauseCategory::OceanSubscription => {
                "The ocean container subscription is missing or inactive"
            }
            RootCauseCategory::ValidationError => {
                "The load was rejected by validation on ingestion"
            }
            RootCauseCategory::DuplicateLoad => {
                "A duplicate load is shadowing the tracked shipment"
            }
            RootCauseCategory::MissingFields => {
                "Required load fields are missing, so tracking cannot proceed"
            }
            RootCauseCategory::IntegrationIssue => {
                "The carrier or customer integration is failing to deliver updates"
            }
            RootCauseCategory::DeviceGps => {
                "The tracking device or driver app is not reporting positions"
            }
            RootCauseCategory::ApiError => "Upstream API errors or timeouts are dropping updates",
            RootCauseCategory::Unknown => "Root cause could not be classified",
        }
    }

    /// Confidence a fresh hypothesis of this category starts with.
    pub fn prior(&self) -> f64 {
        match self {
            RootCauseCategory::Unknown => 0.0,
            _ => DEFAULT_PRIOR,
        }
    }
}

impl fmt::Display for RootCauseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One weighted, directional observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Collector name.
    pub source: String,
    pub finding: String,
    pub supports: bool,
    /// Clamped to [0, 1].
    pub weight: f64,
    #[serde(default)]
    pub raw: Value,
    pub observed_at: DateTime<Utc>,
}

impl Evidence {
    pub fn new(source: impl Into<String>, finding: impl Into<String>, supports: bool, weight: f64) -> Self {
        Self {
            source: source.into(),
            finding: finding.into(),
            supports,
            weight: clamp_unit(weight),
            raw: Value::Null,
            observed_at: Utc::now(),
        }
    }

    pub fn supporting(source: impl Into<String>, finding: impl Into<String>, weight: f64) -> Self {
        Self::new(source, finding, true, weight)
    }

    pub fn contradicting(source: impl Into<String>, finding: impl Into<String>, weight: f64) -> Self {
        Self::new(source, finding, false, weight)
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }

    pub fn with_observed_at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = observed_at;
        self
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Count-normalized net weight.
///
/// `(Σ for − Σ against) / (n_for + n_against)`, clamped to [0, 1]; zero when
/// there is no evidence at all.
pub fn compute_confidence(evidence_for: &[Evidence], evidence_against: &[Evidence]) -> f64 {
    let total_count = evidence_for.len() + evidence_against.len();
    if total_count == 0 {
        return 0.0;
    }
    let for_score: f64 = evidence_for.iter().map(|e| e.weight).sum();
    let against_score: f64 = evidence_against.iter().map(|e| e.weight).sum();
    clamp_unit((for_score - against_score) / total_count as f64)
}

/// Candidate root-cause explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    id: Uuid,
    description: String,
    category: RootCauseCategory,
    confidence: f64,
    evidence_for: Vec<Evidence>,
    evidence_against: Vec<Evidence>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Hypothesis {
    /// New hypothesis with the category's default description and prior.
    pub fn new(category: RootCauseCategory) -> Self {
        Self::with_description(category, category.description())
    }

    pub fn with_description(category: RootCauseCategory, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            category,
            confidence: category.prior(),
            evidence_for: Vec::new(),
            evidence_against: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append evidence to the matching list and recompute confidence.
    pub fn add_evidence(&mut self, evidence: Evidence) {
        if evidence.supports {
            self.evidence_for.push(evidence);
        } else {
            self.evidence_against.push(evidence);
        }
        self.confidence = compute_confidence(&self.evidence_for, &self.evidence_against);
        self.updated_at = Utc::now();
    }

    /// Builder form of [`Hypothesis::add_evidence`].
    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.add_evidence(evidence);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn category(&self) -> RootCauseCategory {
        self.category
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn evidence_for(&self) -> &[Evidence] {
        &self.evidence_for
    }

    pub fn evidence_against(&self) -> &[Evidence] {
        &self.evidence_against
    }

    pub fn evidence_count(&self) -> usize {
        self.evidence_for.len() + self.evidence_against.len()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
