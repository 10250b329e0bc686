//! Identifier extraction
//!
//! Turns a free-form issue report into an [`IdentifierSet`], a coarse
//! [`IssueType`] and the shipment's [`TransportMode`].
//!
//! Two paths:
//! - Caller-supplied identifiers are taken verbatim and the model is never called.
//! - Otherwise the model is asked for a strict JSON object. Anything that does
//!   not parse degrades to an empty set plus a diagnostic; extraction never
//!   aborts an investigation.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::ai::LanguageModel;

static CODE_FENCE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$").expect("code fence pattern is valid")
});

/// Kind of shipment identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    TrackingId,
    LoadNumber,
    ContainerNumber,
    VesselName,
    ProNumber,
    ShipperName,
    CarrierName,
    Date,
}

impl IdentifierKind {
    pub const ALL: [IdentifierKind; 8] = [
        IdentifierKind::TrackingId,
        IdentifierKind::LoadNumber,
        IdentifierKind::ContainerNumber,
        IdentifierKind::VesselName,
        IdentifierKind::ProNumber,
        IdentifierKind::ShipperName,
        IdentifierKind::CarrierName,
        IdentifierKind::Date,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::TrackingId => "tracking_id",
            IdentifierKind::LoadNumber => "load_number",
            IdentifierKind::ContainerNumber => "container_number",
            IdentifierKind::VesselName => "vessel_name",
            IdentifierKind::ProNumber => "pro_number",
            IdentifierKind::ShipperName => "shipper_name",
            IdentifierKind::CarrierName => "carrier_name",
            IdentifierKind::Date => "date",
        }
    }

    /// Field name in the extraction response (always plural, always a list).
    fn response_field(&self) -> &'static str {
        match self {
            IdentifierKind::TrackingId => "tracking_ids",
            IdentifierKind::LoadNumber => "load_numbers",
            IdentifierKind::ContainerNumber => "container_numbers",
            IdentifierKind::VesselName => "vessel_names",
            IdentifierKind::ProNumber => "pro_numbers",
            IdentifierKind::ShipperName => "shipper_names",
            IdentifierKind::CarrierName => "carrier_names",
            IdentifierKind::Date => "dates",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentifierKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tracking_id" | "tracking" | "tracking_number" => Ok(IdentifierKind::TrackingId),
            "load_number" | "load" | "load_id" => Ok(IdentifierKind::LoadNumber),
            "container_number" | "container" => Ok(IdentifierKind::ContainerNumber),
            "vessel_name" | "vessel" => Ok(IdentifierKind::VesselName),
            "pro_number" | "pro" => Ok(IdentifierKind::ProNumber),
            "shipper_name" | "shipper" => Ok(IdentifierKind::ShipperName),
            "carrier_name" | "carrier" => Ok(IdentifierKind::CarrierName),
            "date" | "dates" => Ok(IdentifierKind::Date),
            other => Err(format!("unknown identifier kind: {}", other)),
        }
    }
}

/// Primary value plus any additional values of the same kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierValue {
    pub primary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional: Vec<String>,
}

/// Structured identifiers for one investigation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierSet {
    values: BTreeMap<IdentifierKind, IdentifierValue>,
    /// Caller-supplied keys that do not name a known kind, kept verbatim.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    extra: BTreeMap<String, String>,
}

impl IdentifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.extra.is_empty()
    }

    /// Number of identifier kinds present (extra keys included).
    pub fn len(&self) -> usize {
        self.values.len() + self.extra.len()
    }

    /// Add a value. The first value of a kind becomes primary, later ones
    /// are appended to `additional`.
    pub fn insert(&mut self, kind: IdentifierKind, value: impl Into<String>) {
        let value = value.into();
        match self.values.get_mut(&kind) {
            Some(existing) => existing.additional.push(value),
            None => {
                self.values.insert(
                    kind,
                    IdentifierValue {
                        primary: value,
                        additional: Vec::new(),
                    },
                );
            }
        }
    }

    /// Builder form of [`IdentifierSet::insert`].
    pub fn with(mut self, kind: IdentifierKind, value: impl Into<String>) -> Self {
        self.insert(kind, value);
        self
    }

    pub fn insert_extra(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.extra.insert(key.into(), value.into());
    }

    pub fn get(&self, kind: IdentifierKind) -> Option<&IdentifierValue> {
        self.values.get(&kind)
    }

    pub fn primary(&self, kind: IdentifierKind) -> Option<&str> {
        self.values.get(&kind).map(|v| v.primary.as_str())
    }

    /// Primary followed by additional values.
    pub fn all(&self, kind: IdentifierKind) -> Vec<&str> {
        self.values
            .get(&kind)
            .map(|v| {
                std::iter::once(v.primary.as_str())
                    .chain(v.additional.iter().map(String::as_str))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn contains(&self, kind: IdentifierKind) -> bool {
        self.values.contains_key(&kind)
    }

    pub fn extra(&self) -> &BTreeMap<String, String> {
        &self.extra
    }

    pub fn iter(&self) -> impl Iterator<Item = (IdentifierKind, &IdentifierValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    /// Transport mode implied by the identifiers alone.
    ///
    /// Container numbers and vessel names only exist for ocean freight.
    pub fn derive_mode(&self) -> TransportMode {
        if self.contains(IdentifierKind::ContainerNumber) || self.contains(IdentifierKind::VesselName)
        {
            TransportMode::Ocean
        } else {
            TransportMode::Unknown
        }
    }

    /// One-line description of what was extracted.
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "No identifiers extracted".to_string();
        }

        let mut parts: Vec<String> = self
            .values
            .iter()
            .map(|(kind, value)| {
                if value.additional.is_empty() {
                    format!("{}={}", kind, value.primary)
                } else {
                    format!("{}={} (+{})", kind, value.primary, value.additional.len())
                }
            })
            .collect();
        parts.extend(self.extra.iter().map(|(k, v)| format!("{}={}", k, v)));

        format!("Extracted {} identifier(s): {}", self.len(), parts.join(", "))
    }
}

/// Shipment transport mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Ocean,
    OverTheRoad,
    Air,
    Rail,
    #[default]
    Unknown,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Ocean => "ocean",
            TransportMode::OverTheRoad => "over_the_road",
            TransportMode::Air => "air",
            TransportMode::Rail => "rail",
            TransportMode::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ocean" | "sea" | "maritime" => Ok(TransportMode::Ocean),
            "over_the_road" | "otr" | "truck" | "ftl" | "ltl" | "road" => {
                Ok(TransportMode::OverTheRoad)
            }
            "air" => Ok(TransportMode::Air),
            "rail" | "intermodal" => Ok(TransportMode::Rail),
            "unknown" | "" => Ok(TransportMode::Unknown),
            other => Err(format!("unknown transport mode: {}", other)),
        }
    }
}

/// Coarse classification of the reported problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    TrackingNotUpdating,
    LoadNotFound,
    IncorrectEta,
    MissingEvents,
    CarrierOnboarding,
    #[default]
    Other,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::TrackingNotUpdating => "tracking_not_updating",
            IssueType::LoadNotFound => "load_not_found",
            IssueType::IncorrectEta => "incorrect_eta",
            IssueType::MissingEvents => "missing_events",
            IssueType::CarrierOnboarding => "carrier_onboarding",
            IssueType::Other => "other",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tracking_not_updating" | "not_tracking" | "no_updates" => {
                Ok(IssueType::TrackingNotUpdating)
            }
            "load_not_found" | "missing_load" => Ok(IssueType::LoadNotFound),
            "incorrect_eta" | "eta" | "wrong_eta" => Ok(IssueType::IncorrectEta),
            "missing_events" | "missing_milestones" => Ok(IssueType::MissingEvents),
            "carrier_onboarding" | "onboarding" => Ok(IssueType::CarrierOnboarding),
            "other" | "unknown" => Ok(IssueType::Other),
            other => Err(format!("unknown issue type: {}", other)),
        }
    }
}

/// Result of the extraction stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionOutcome {
    pub identifiers: IdentifierSet,
    pub transport_mode: TransportMode,
    pub issue_type: IssueType,
    /// Set when extraction degraded (model failure, malformed response).
    pub diagnostic: Option<String>,
}

impl ExtractionOutcome {
    fn degraded(diagnostic: impl Into<String>) -> Self {
        Self {
            diagnostic: Some(diagnostic.into()),
            ..Default::default()
        }
    }
}

/// Build an outcome from caller-supplied identifiers, bypassing the model.
pub fn from_manual(manual: &BTreeMap<String, String>) -> ExtractionOutcome {
    let mut identifiers = IdentifierSet::new();
    for (key, value) in manual {
        match key.parse::<IdentifierKind>() {
            Ok(kind) => identifiers.insert(kind, value.clone()),
            Err(_) => identifiers.insert_extra(key.clone(), value.clone()),
        }
    }
    let transport_mode = identifiers.derive_mode();
    ExtractionOutcome {
        identifiers,
        transport_mode,
        issue_type: IssueType::Other,
        diagnostic: None,
    }
}

/// Prompt sent to the model for extraction.
pub fn build_extraction_prompt(issue_text: &str) -> String {
    let fields: Vec<&str> = IdentifierKind::ALL
        .iter()
        .map(|k| k.response_field())
        .collect();
    format!(
        "Extract shipment identifiers from the logistics support issue below.\n\
         Respond with a single JSON object and nothing else. Keys: {}, each a list of strings \
         (empty list when absent); \"issue_type\" (one of tracking_not_updating, load_not_found, \
         incorrect_eta, missing_events, carrier_onboarding, other); \"transport_mode\" (one of \
         ocean, over_the_road, air, rail, unknown).\n\nIssue:\n{}",
        fields.join(", "),
        issue_text.trim()
    )
}

/// Parse the model's extraction response.
///
/// Accepts a bare JSON object or one wrapped in a markdown code fence. Each
/// identifier field may be a list or a single string.
pub fn parse_extraction_response(text: &str) -> Result<ExtractionOutcome, String> {
    let body = CODE_FENCE_PATTERN
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text)
        .trim();

    let json: Value =
        serde_json::from_str(body).map_err(|e| format!("response is not valid JSON: {}", e))?;
    let Some(object) = json.as_object() else {
        return Err("response is not a JSON object".to_string());
    };

    let mut identifiers = IdentifierSet::new();
    for kind in IdentifierKind::ALL {
        let values: Vec<String> = match object.get(kind.response_field()) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
            _ => Vec::new(),
        };
        for value in values {
            identifiers.insert(kind, value);
        }
    }

    let issue_type = object
        .get("issue_type")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();

    let transport_mode = object
        .get("transport_mode")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<TransportMode>().ok())
        .filter(|m| *m != TransportMode::Unknown)
        .unwrap_or_else(|| identifiers.derive_mode());

    Ok(ExtractionOutcome {
        identifiers,
        transport_mode,
        issue_type,
        diagnostic: None,
    })
}

/// Extraction stage.
pub struct IdentifierExtractor {
    model: Arc<dyn LanguageModel>,
    max_tokens: usize,
    temperature: f32,
}

impl IdentifierExtractor {
    pub fn new(model: Arc<dyn LanguageModel>, max_tokens: usize, temperature: f32) -> Self {
        Self {
            model,
            max_tokens,
            temperature,
        }
    }

    /// Extract identifiers. Never fails: degraded results carry a diagnostic.
    pub async fn extract(
        &self,
        issue_text: &str,
        manual: &BTreeMap<String, String>,
    ) -> ExtractionOutcome {
        let outcome = if !manual.is_empty() {
            from_manual(manual)
        } else if issue_text.trim().is_empty() {
            ExtractionOutcome::degraded("no issue text provided")
        } else {
            self.extract_with_model(issue_text).await
        };

        info!(
            mode = %outcome.transport_mode,
            issue_type = %outcome.issue_type,
            "{}",
            outcome.identifiers.summary()
        );
        outcome
    }

    async fn extract_with_model(&self, issue_text: &str) -> ExtractionOutcome {
        let prompt = build_extraction_prompt(issue_text);
        let response = match self
            .model
            .complete(&prompt, self.max_tokens, self.temperature)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!("Identifier extraction call failed: {:#}", e);
                return ExtractionOutcome::degraded(format!("extraction call failed: {}", e));
            }
        };

        match parse_extraction_response(&response) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Malformed extraction response: {}", e);
                ExtractionOutcome::degraded(format!("malformed extraction response: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedModel {
        reply: anyhow::Result<String>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn ok(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(anyhow::anyhow!("connection reset")),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, _prompt: &str, _max: usize, _temp: f32) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(anyhow::anyhow!("{}", e)),
            }
        }
    }

    #[test]
    fn parses_lists_into_primary_and_additional() {
        let outcome = parse_extraction_response(
            r#"{"tracking_ids": ["614258134", "614258135"], "load_numbers": [], "carrier_names": "ACME"}"#,
        )
        .unwrap();

        let tracking = outcome.identifiers.get(IdentifierKind::TrackingId).unwrap();
        assert_eq!(tracking.primary, "614258134");
        assert_eq!(tracking.additional, vec!["614258135".to_string()]);
        assert_eq!(outcome.identifiers.primary(IdentifierKind::CarrierName), Some("ACME"));
        assert!(!outcome.identifiers.contains(IdentifierKind::LoadNumber));
        assert_eq!(outcome.transport_mode, TransportMode::Unknown);
    }

    #[test]
    fn strips_code_fence() {
        let outcome = parse_extraction_response(
            "```json\n{\"container_numbers\": [\"MSCU1234567\"], \"issue_type\": \"missing_events\"}\n```",
        )
        .unwrap();
        assert_eq!(
            outcome.identifiers.primary(IdentifierKind::ContainerNumber),
            Some("MSCU1234567")
        );
        assert_eq!(outcome.transport_mode, TransportMode::Ocean);
        assert_eq!(outcome.issue_type, IssueType::MissingEvents);
    }

    #[test]
    fn explicit_transport_mode_wins_over_derivation() {
        let outcome =
            parse_extraction_response(r#"{"pro_numbers": ["PRO1"], "transport_mode": "ltl"}"#)
                .unwrap();
        assert_eq!(outcome.transport_mode, TransportMode::OverTheRoad);
    }

    #[test]
    fn rejects_non_json_and_non_objects() {
        assert!(parse_extraction_response("I could not find any identifiers").is_err());
        assert!(parse_extraction_response("[1, 2, 3]").is_err());
    }

    #[test]
    fn manual_identifiers_are_used_verbatim() {
        let mut manual = BTreeMap::new();
        manual.insert("container".to_string(), "MSCU1234567".to_string());
        manual.insert("customer_ref".to_string(), " REF-9 ".to_string());

        let outcome = from_manual(&manual);
        assert_eq!(outcome.transport_mode, TransportMode::Ocean);
        assert_eq!(
            outcome.identifiers.extra().get("customer_ref").map(String::as_str),
            Some(" REF-9 ")
        );
    }

    #[test]
    fn manual_identifiers_without_ocean_keys_are_unknown_mode() {
        let mut manual = BTreeMap::new();
        manual.insert("tracking_id".to_string(), "614258134".to_string());
        assert_eq!(from_manual(&manual).transport_mode, TransportMode::Unknown);
    }

    #[tokio::test]
    async fn manual_identifiers_bypass_the_model() {
        let model = Arc::new(ScriptedModel::ok("{}"));
        let extractor = IdentifierExtractor::new(model.clone(), 256, 0.0);
        let mut manual = BTreeMap::new();
        manual.insert("tracking_id".to_string(), "614258134".to_string());

        let outcome = extractor.extract("ignored", &manual).await;
        assert_eq!(
            outcome.identifiers.primary(IdentifierKind::TrackingId),
            Some("614258134")
        );
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn model_failure_degrades_to_empty_set() {
        let extractor = IdentifierExtractor::new(Arc::new(ScriptedModel::failing()), 256, 0.0);
        let outcome = extractor.extract("load 123 not tracking", &BTreeMap::new()).await;
        assert!(outcome.identifiers.is_empty());
        assert_eq!(outcome.transport_mode, TransportMode::Unknown);
        assert!(outcome.diagnostic.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn malformed_response_degrades_to_empty_set() {
        let extractor = IdentifierExtractor::new(Arc::new(ScriptedModel::ok("not json")), 256, 0.0);
        let outcome = extractor.extract("load 123 not tracking", &BTreeMap::new()).await;
        assert!(outcome.identifiers.is_empty());
        assert!(outcome.diagnostic.unwrap().starts_with("malformed extraction response"));
    }

    #[tokio::test]
    async fn empty_text_skips_the_model() {
        let model = Arc::new(ScriptedModel::ok("{}"));
        let extractor = IdentifierExtractor::new(model.clone(), 256, 0.0);
        let outcome = extractor.extract("   ", &BTreeMap::new()).await;
        assert!(outcome.identifiers.is_empty());
        assert!(outcome.diagnostic.is_some());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn summary_lists_each_kind() {
        let set = IdentifierSet::new()
            .with(IdentifierKind::TrackingId, "614258134")
            .with(IdentifierKind::TrackingId, "614258135");
        assert_eq!(
            set.summary(),
            "Extracted 1 identifier(s): tracking_id=614258134 (+1)"
        );
        assert_eq!(IdentifierSet::new().summary(), "No identifiers extracted");
    }
}
