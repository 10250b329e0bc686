//! Investigation errors
//!
//! Only orchestrator-level failures surface here. Collector and extraction
//! failures are recovered and recorded in the timeline instead.

use thiserror::Error;
use uuid::Uuid;

use crate::state::Phase;

#[derive(Debug, Error)]
pub enum InvestigationError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid phase transition from {from} to {to}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error("investigation {0} is already complete")]
    AlreadyComplete(Uuid),

    #[error("investigation {0} is not awaiting a human response")]
    NotAwaitingHuman(Uuid),

    #[error("investigation task failed: {0}")]
    TaskFailed(String),
}

pub type Result<T> = std::result::Result<T, InvestigationError>;
