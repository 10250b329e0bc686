//! Waypoint Core Library
//!
//! Investigation engine for shipment tracking incidents: extracts
//! identifiers from a free-text report, gathers evidence from data sources
//! in dependency-ordered waves, forms root-cause hypotheses, and either
//! concludes or asks a human.

pub mod ai;
pub mod collectors;
pub mod config;
pub mod error;
pub mod events;
pub mod hypothesis;
pub mod identifiers;
pub mod orchestrator;
pub mod paths;
pub mod patterns;
pub mod scheduler;
pub mod state;
pub mod synthesis;

// Re-exports for convenience
pub use ai::{AnthropicClient, LanguageModel, UnavailableModel};
pub use collectors::{
    Collector, CollectorContext, CollectorError, CollectorId, CollectorOutput, CollectorRegistry,
    Finding, ReplayCollector, Signal,
};
pub use config::InvestigationConfig;
pub use error::InvestigationError;
pub use events::{EventSink, InvestigationEvent, Stage};
pub use hypothesis::{Evidence, Hypothesis, RootCauseCategory};
pub use identifiers::{IdentifierKind, IdentifierSet, IssueType, TransportMode};
pub use orchestrator::{Investigator, InvestigatorServices};
pub use scheduler::{plan_waves, CollectionScheduler, Wave};
pub use state::{InvestigationState, Phase};
pub use synthesis::{decide, Decision, DecisionPolicy, HumanQuestion, RootCause};
