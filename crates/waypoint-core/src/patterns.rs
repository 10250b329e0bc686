//! Hypothesis formation
//!
//! Matches the signals observed by collectors against a static library of
//! trigger patterns. Each pattern names a category, the symptoms that must
//! all be present, a weight, and whether a match supports or contradicts
//! the category.

use std::collections::BTreeMap;

use crate::collectors::{Finding, Signal};
use crate::hypothesis::{Evidence, Hypothesis, RootCauseCategory};

/// One entry of the pattern library.
#[derive(Debug, Clone, Copy)]
pub struct TriggerPattern {
    pub category: RootCauseCategory,
    /// All of these must be observed for the pattern to match.
    pub symptoms: &'static [Signal],
    pub weight: f64,
    pub supports: bool,
    pub finding: &'static str,
}

impl TriggerPattern {
    const fn new(
        category: RootCauseCategory,
        symptoms: &'static [Signal],
        weight: f64,
        supports: bool,
        finding: &'static str,
    ) -> Self {
        Self {
            category,
            symptoms,
            weight,
            supports,
            finding,
        }
    }

    fn matches(&self, observed: &BTreeMap<Signal, &Finding>) -> bool {
        !self.symptoms.is_empty() && self.symptoms.iter().all(|s| observed.contains_key(s))
    }
}

use RootCauseCategory as C;
use Signal as S;

/// Built-in pattern library, in formation order.
pub static PATTERNS: &[TriggerPattern] = &[
    // Load not found
    TriggerPattern::new(C::LoadNotFound, &[S::LoadNotFound], 0.85, true, "Load lookup returned no matching record"),
    TriggerPattern::new(C::LoadNotFound, &[S::LoadFound], 0.9, false, "Load record exists in the platform"),
    // Network relationship
    TriggerPattern::new(C::NetworkRelationship, &[S::NoNetworkRelationship], 0.85, true, "No active relationship between shipper and carrier"),
    TriggerPattern::new(C::NetworkRelationship, &[S::NoNetworkRelationship, S::NoTrackingUpdates], 0.9, true, "Tracking is silent and the carrier is not connected to the shipper"),
    TriggerPattern::new(C::NetworkRelationship, &[S::NetworkRelationshipActive], 0.8, false, "Shipper and carrier relationship is active"),
    // SCAC
    TriggerPattern::new(C::ScacIssue, &[S::InvalidScac], 0.85, true, "Carrier SCAC is invalid or unmapped"),
    TriggerPattern::new(C::ScacIssue, &[S::InvalidScac, S::NoTrackingUpdates], 0.9, true, "Tracking is silent for a load with an invalid SCAC"),
    TriggerPattern::new(C::ScacIssue, &[S::ScacVerified], 0.8, false, "Carrier SCAC verified against the carrier registry"),
    // Tracking not started
    TriggerPattern::new(C::TrackingNotStarted, &[S::TrackingNotStarted], 0.8, true, "Tracking was never started for the load"),
    TriggerPattern::new(C::TrackingNotStarted, &[S::LoadFound, S::NoTrackingUpdates], 0.6, true, "Load exists but has no tracking updates"),
    TriggerPattern::new(C::TrackingNotStarted, &[S::TrackingUpdatesReceived], 0.85, false, "Tracking updates have been received"),
    // Scraping
    TriggerPattern::new(C::ScrapingError, &[S::ScrapeFailed], 0.85, true, "Carrier portal scrape attempts are failing"),
    TriggerPattern::new(C::ScrapingError, &[S::ScrapeFailed, S::KnownIncident], 0.9, true, "Scrape failures coincide with a known incident"),
    TriggerPattern::new(C::ScrapingError, &[S::CarrierPortalHealthy], 0.7, false, "Carrier portal responds normally"),
    // Ocean subscription
    TriggerPattern::new(C::OceanSubscription, &[S::SubscriptionMissing], 0.9, true, "No ocean subscription exists for the container"),
    TriggerPattern::new(C::OceanSubscription, &[S::SubscriptionInactive], 0.8, true, "Ocean subscription exists but is inactive"),
    TriggerPattern::new(C::OceanSubscription, &[S::SubscriptionActive], 0.85, false, "Ocean subscription is active"),
    // Validation
    TriggerPattern::new(C::ValidationError, &[S::ValidationFailed], 0.85, true, "Load failed validation on ingestion"),
    // Duplicates
    TriggerPattern::new(C::DuplicateLoad, &[S::DuplicateLoad], 0.85, true, "More than one load matches the identifiers"),
    // Missing fields
    TriggerPattern::new(C::MissingFields, &[S::MissingRequiredField], 0.8, true, "Required load fields are empty"),
    TriggerPattern::new(C::MissingFields, &[S::MissingRequiredField, S::ValidationFailed], 0.85, true, "Validation failed on missing required fields"),
    // Integration
    TriggerPattern::new(C::IntegrationIssue, &[S::IntegrationFailure], 0.8, true, "Integration deliveries are failing"),
    TriggerPattern::new(C::IntegrationIssue, &[S::IntegrationHealthy], 0.7, false, "Integration deliveries are succeeding"),
    // Device / GPS
    TriggerPattern::new(C::DeviceGps, &[S::DeviceOffline], 0.8, true, "Tracking device is offline"),
    TriggerPattern::new(C::DeviceGps, &[S::GpsPingsMissing], 0.7, true, "No GPS pings in the tracking window"),
    TriggerPattern::new(C::DeviceGps, &[S::DeviceReporting], 0.8, false, "Device is reporting positions"),
    // API errors
    TriggerPattern::new(C::ApiError, &[S::ApiTimeout], 0.7, true, "Upstream API calls are timing out"),
    TriggerPattern::new(C::ApiError, &[S::ApiErrors], 0.65, true, "Upstream API calls are returning errors"),
    TriggerPattern::new(C::ApiError, &[S::ApiErrors, S::KnownIncident], 0.85, true, "API errors coincide with a known incident"),
];

/// Converts findings into hypotheses.
#[derive(Debug, Clone)]
pub struct HypothesisEngine {
    patterns: &'static [TriggerPattern],
}

impl Default for HypothesisEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HypothesisEngine {
    pub fn new() -> Self {
        Self { patterns: PATTERNS }
    }

    pub fn with_patterns(patterns: &'static [TriggerPattern]) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> &'static [TriggerPattern] {
        self.patterns
    }

    /// Form hypotheses from findings.
    ///
    /// Supporting matches create or extend a category's hypothesis.
    /// Contradicting matches only attach to hypotheses that already exist.
    /// Output order is pattern library order, so it is deterministic.
    pub fn form(&self, findings: &[Finding]) -> Vec<Hypothesis> {
        let mut observed: BTreeMap<Signal, &Finding> = BTreeMap::new();
        for finding in findings {
            observed.entry(finding.signal).or_insert(finding);
        }

        let mut hypotheses: Vec<Hypothesis> = Vec::new();

        for pattern in self.patterns.iter().filter(|p| p.supports) {
            if !pattern.matches(&observed) {
                continue;
            }
            let evidence = evidence_for_pattern(pattern, &observed);
            match hypotheses
                .iter_mut()
                .find(|h| h.category() == pattern.category)
            {
                Some(existing) => existing.add_evidence(evidence),
                None => hypotheses.push(Hypothesis::new(pattern.category).with_evidence(evidence)),
            }
        }

        for pattern in self.patterns.iter().filter(|p| !p.supports) {
            if !pattern.matches(&observed) {
                continue;
            }
            if let Some(existing) = hypotheses
                .iter_mut()
                .find(|h| h.category() == pattern.category)
            {
                existing.add_evidence(evidence_for_pattern(pattern, &observed));
            }
        }

        hypotheses
    }
}

fn evidence_for_pattern(pattern: &TriggerPattern, observed: &BTreeMap<Signal, &Finding>) -> Evidence {
    let matched: Vec<&Finding> = pattern
        .symptoms
        .iter()
        .filter_map(|s| observed.get(s).copied())
        .collect();

    // `matches` guarantees at least one symptom is present
    let (source, raw) = matched
        .first()
        .map(|f| (f.source.clone(), f.raw.clone()))
        .unwrap_or_default();
    let statements: Vec<&str> = matched.iter().map(|f| f.statement.as_str()).collect();
    let observed_at = matched
        .iter()
        .map(|f| f.observed_at)
        .max()
        .unwrap_or_else(chrono::Utc::now);

    Evidence::new(
        source,
        format!("{}: {}", pattern.finding, statements.join("; ")),
        pattern.supports,
        pattern.weight,
    )
    .with_raw(raw)
    .with_observed_at(observed_at)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(source: &str, signal: Signal) -> Finding {
        Finding::new(source, signal, format!("{:?} observed", signal))
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn no_findings_no_hypotheses() {
        assert!(HypothesisEngine::new().form(&[]).is_empty());
    }

    #[test]
    fn pattern_weights_are_in_range() {
        for pattern in PATTERNS {
            assert!((0.0..=1.0).contains(&pattern.weight), "{:?}", pattern);
            assert!(!pattern.symptoms.is_empty());
            assert_ne!(pattern.category, RootCauseCategory::Unknown);
        }
    }

    #[test]
    fn single_symptom_creates_hypothesis() {
        let hypotheses =
            HypothesisEngine::new().form(&[finding("config_lookup", Signal::SubscriptionMissing)]);
        assert_eq!(hypotheses.len(), 1);
        assert_eq!(hypotheses[0].category(), RootCauseCategory::OceanSubscription);
        assert!(approx(hypotheses[0].confidence(), 0.9));
        assert_eq!(hypotheses[0].evidence_for()[0].source, "config_lookup");
    }

    #[test]
    fn combined_symptoms_add_evidence() {
        let hypotheses = HypothesisEngine::new().form(&[
            finding("warehouse", Signal::InvalidScac),
            finding("log_search", Signal::NoTrackingUpdates),
        ]);
        assert_eq!(hypotheses.len(), 1);
        let scac = &hypotheses[0];
        assert_eq!(scac.category(), RootCauseCategory::ScacIssue);
        assert_eq!(scac.evidence_for().len(), 2);
        assert!(approx(scac.confidence(), (0.85 + 0.9) / 2.0));
    }

    #[test]
    fn contradiction_alone_creates_nothing() {
        let hypotheses = HypothesisEngine::new().form(&[finding("warehouse", Signal::LoadFound)]);
        assert!(hypotheses.is_empty());
    }

    #[test]
    fn contradiction_lowers_existing_hypothesis() {
        let hypotheses = HypothesisEngine::new().form(&[
            finding("ocean_subscription", Signal::SubscriptionInactive),
            finding("config_lookup", Signal::SubscriptionActive),
        ]);
        let sub = &hypotheses[0];
        assert_eq!(sub.evidence_against().len(), 1);
        // (0.8 - 0.85) / 2 clamps to zero
        assert_eq!(sub.confidence(), 0.0);
    }

    #[test]
    fn same_finding_feeds_two_hypotheses_independently() {
        let hypotheses = HypothesisEngine::new().form(&[
            finding("log_search", Signal::NoTrackingUpdates),
            finding("warehouse", Signal::LoadFound),
            finding("warehouse", Signal::InvalidScac),
        ]);
        let categories: Vec<_> = hypotheses.iter().map(|h| h.category()).collect();
        assert_eq!(
            categories,
            vec![RootCauseCategory::ScacIssue, RootCauseCategory::TrackingNotStarted]
        );
        // each hypothesis owns its own copy of the evidence
        assert!(hypotheses[0].evidence_for()[1].finding.contains("NoTrackingUpdates"));
        assert!(hypotheses[1].evidence_for()[0].finding.contains("NoTrackingUpdates"));
    }

    #[test]
    fn formation_is_deterministic() {
        let findings = vec![
            finding("ticketing", Signal::KnownIncident),
            finding("log_search", Signal::ApiErrors),
            finding("log_search", Signal::ScrapeFailed),
        ];
        let engine = HypothesisEngine::new();
        let a: Vec<_> = engine.form(&findings).iter().map(|h| (h.category(), h.confidence())).collect();
        let b: Vec<_> = engine.form(&findings).iter().map(|h| (h.category(), h.confidence())).collect();
        assert_eq!(a, b);
    }

    static CUSTOM: &[TriggerPattern] = &[TriggerPattern::new(
        RootCauseCategory::DeviceGps,
        &[Signal::DeviceOffline],
        0.42,
        true,
        "custom",
    )];

    #[test]
    fn custom_library() {
        let engine = HypothesisEngine::with_patterns(CUSTOM);
        let hypotheses = engine.form(&[finding("warehouse", Signal::DeviceOffline)]);
        assert!(approx(hypotheses[0].confidence(), 0.42));
    }
}
