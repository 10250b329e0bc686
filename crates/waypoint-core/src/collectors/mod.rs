//! Evidence collectors
//!
//! A collector queries one data source and returns a [`CollectorOutput`]
//! or a [`CollectorError`]. Concrete integrations are supplied by the
//! embedding application; the engine only knows the static [`CollectorId`]
//! table and the [`Collector`] trait.
//!
//! ## Table
//! | id                   | slot                | role                |
//! |----------------------|---------------------|---------------------|
//! | `warehouse`          | `tracking_data`     | base                |
//! | `log_search`         | `log_summary`       | base                |
//! | `ticketing`          | `ticket_data`       | base                |
//! | `message_search`     | `message_summary`   | base                |
//! | `document_search`    | `document_data`     | base                |
//! | `config_lookup`      | `config_data`       | dependency producer |
//! | `ocean_events`       | `ocean_events`      | ocean dependent     |
//! | `ocean_subscription` | `subscription_data` | ocean dependent     |
//! | `vessel_schedule`    | `vessel_schedule`   | ocean dependent     |

pub mod failure;
pub mod output;
pub mod registry;
pub mod replay;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::identifiers::{IdentifierSet, TransportMode};

pub use output::{CollectorOutput, Finding, QueryRecord, Signal, SourceRecord};
pub use registry::CollectorRegistry;
pub use replay::ReplayCollector;

/// Field of the `config_data` slot that carries the ocean subscription reference.
pub const SUBSCRIPTION_REF_FIELD: &str = "subscription_id";

/// Identifier of a collector in the static table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorId {
    Warehouse,
    LogSearch,
    Ticketing,
    MessageSearch,
    DocumentSearch,
    ConfigLookup,
    OceanEvents,
    OceanSubscription,
    VesselSchedule,
}

/// Scheduling role of a collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorRole {
    /// Runs for every transport mode, independent of everything else.
    Base,
    /// Always runs; its slot feeds the ocean dependents.
    DependencyProducer,
    /// Ocean only; runs after the dependency producer has been merged.
    OceanDependent,
}

impl CollectorId {
    pub const ALL: [CollectorId; 9] = [
        CollectorId::Warehouse,
        CollectorId::LogSearch,
        CollectorId::Ticketing,
        CollectorId::MessageSearch,
        CollectorId::DocumentSearch,
        CollectorId::ConfigLookup,
        CollectorId::OceanEvents,
        CollectorId::OceanSubscription,
        CollectorId::VesselSchedule,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectorId::Warehouse => "warehouse",
            CollectorId::LogSearch => "log_search",
            CollectorId::Ticketing => "ticketing",
            CollectorId::MessageSearch => "message_search",
            CollectorId::DocumentSearch => "document_search",
            CollectorId::ConfigLookup => "config_lookup",
            CollectorId::OceanEvents => "ocean_events",
            CollectorId::OceanSubscription => "ocean_subscription",
            CollectorId::VesselSchedule => "vessel_schedule",
        }
    }

    /// Name of the state slot this collector owns. No two collectors share one.
    pub fn slot_name(&self) -> &'static str {
        match self {
            CollectorId::Warehouse => "tracking_data",
            CollectorId::LogSearch => "log_summary",
            CollectorId::Ticketing => "ticket_data",
            CollectorId::MessageSearch => "message_summary",
            CollectorId::DocumentSearch => "document_data",
            CollectorId::ConfigLookup => "config_data",
            CollectorId::OceanEvents => "ocean_events",
            CollectorId::OceanSubscription => "subscription_data",
            CollectorId::VesselSchedule => "vessel_schedule",
        }
    }

    pub fn role(&self) -> CollectorRole {
        match self {
            CollectorId::Warehouse
            | CollectorId::LogSearch
            | CollectorId::Ticketing
            | CollectorId::MessageSearch
            | CollectorId::DocumentSearch => CollectorRole::Base,
            CollectorId::ConfigLookup => CollectorRole::DependencyProducer,
            CollectorId::OceanEvents
            | CollectorId::OceanSubscription
            | CollectorId::VesselSchedule => CollectorRole::OceanDependent,
        }
    }
}

impl fmt::Display for CollectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectorId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CollectorId::ALL
            .into_iter()
            .find(|id| id.as_str() == s.trim())
            .ok_or_else(|| format!("unknown collector: {}", s))
    }
}

/// Why a collector produced nothing.
#[derive(Debug, Clone, Error)]
pub enum CollectorError {
    #[error("{collector} timed out after {after:?}")]
    Timeout { collector: CollectorId, after: Duration },

    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("{0}")]
    Query(String),

    #[error("collector task aborted: {0}")]
    Aborted(String),
}

impl CollectorError {
    pub fn query(msg: impl fmt::Display) -> Self {
        CollectorError::Query(msg.to_string())
    }

    /// Stable short code for timeline records and events.
    pub fn code(&self) -> &'static str {
        match self {
            CollectorError::Timeout { .. } => "timeout",
            CollectorError::MissingInput(_) => "missing_input",
            CollectorError::Query(message) => failure::classify_error_code(message),
            CollectorError::Aborted(_) => "aborted",
        }
    }
}

/// Everything a collector may read.
///
/// Built fresh for every wave; `prior_slots` is a snapshot of the slots
/// merged by earlier waves.
#[derive(Debug, Clone)]
pub struct CollectorContext {
    pub investigation_id: Uuid,
    pub identifiers: IdentifierSet,
    pub transport_mode: TransportMode,
    pub prior_slots: BTreeMap<String, Value>,
}

impl CollectorContext {
    pub fn new(investigation_id: Uuid, identifiers: IdentifierSet, mode: TransportMode) -> Self {
        Self {
            investigation_id,
            identifiers,
            transport_mode: mode,
            prior_slots: BTreeMap::new(),
        }
    }

    pub fn with_prior_slots(mut self, slots: BTreeMap<String, Value>) -> Self {
        self.prior_slots = slots;
        self
    }

    /// Slot written by another collector in an earlier wave.
    pub fn prior(&self, collector: CollectorId) -> Option<&Value> {
        self.prior_slots.get(collector.slot_name())
    }

    /// Ocean subscription reference produced by the configuration lookup.
    pub fn subscription_ref(&self) -> Option<&str> {
        self.prior(CollectorId::ConfigLookup)?
            .get(SUBSCRIPTION_REF_FIELD)?
            .as_str()
    }
}

/// Trait for collector implementations
///
/// Implementations must be safe to run concurrently with other collectors
/// and should be read-only queries.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Which table entry this collector fills.
    fn id(&self) -> CollectorId;

    /// Per-call timeout. `None` uses the registry default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Run the query.
    async fn collect(&self, ctx: &CollectorContext) -> Result<CollectorOutput, CollectorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn slot_names_are_unique() {
        let slots: HashSet<_> = CollectorId::ALL.iter().map(|c| c.slot_name()).collect();
        assert_eq!(slots.len(), CollectorId::ALL.len());
    }

    #[test]
    fn ids_round_trip_through_strings() {
        for id in CollectorId::ALL {
            assert_eq!(id.as_str().parse::<CollectorId>().unwrap(), id);
        }
        assert!("nonexistent".parse::<CollectorId>().is_err());
    }

    #[test]
    fn exactly_three_ocean_dependents() {
        let dependents = CollectorId::ALL
            .iter()
            .filter(|c| c.role() == CollectorRole::OceanDependent)
            .count();
        assert_eq!(dependents, 3);
        assert_eq!(
            CollectorId::ConfigLookup.role(),
            CollectorRole::DependencyProducer
        );
    }

    #[test]
    fn subscription_ref_reads_config_slot() {
        let mut slots = BTreeMap::new();
        slots.insert(
            "config_data".to_string(),
            json!({"subscription_id": "SUB-42", "shipper": "ACME"}),
        );
        let ctx = CollectorContext::new(Uuid::new_v4(), IdentifierSet::new(), TransportMode::Ocean)
            .with_prior_slots(slots);
        assert_eq!(ctx.subscription_ref(), Some("SUB-42"));

        let empty = CollectorContext::new(Uuid::new_v4(), IdentifierSet::new(), TransportMode::Ocean);
        assert_eq!(empty.subscription_ref(), None);
    }

    #[test]
    fn error_codes() {
        let timeout = CollectorError::Timeout {
            collector: CollectorId::Warehouse,
            after: Duration::from_secs(30),
        };
        assert_eq!(timeout.code(), "timeout");
        assert_eq!(timeout.to_string(), "warehouse timed out after 30s");
        assert_eq!(CollectorError::query("HTTP 404 not found").code(), "not_found");
        assert_eq!(CollectorError::MissingInput("x".into()).code(), "missing_input");
    }
}
