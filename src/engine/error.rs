use thiserror::Error;
use ulid::Ulid;

use crate::model::ReservationStatus;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested window is no longer free.
    #[error("slot taken: window conflicts with reservation {0}")]
    SlotTaken(Ulid),
    #[error("resource {0} is unavailable: {1}")]
    ResourceUnavailable(Ulid, &'static str),
    #[error("this service requires choosing a resource")]
    MissingResource,
    /// Seats left in the window.
    #[error("capacity exceeded: {remaining} seats left, {requested} requested")]
    CapacityExceeded { remaining: u32, requested: u32 },
    #[error("minimum stay not met: {0}")]
    MinimumNotMet(String),
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("already exists: {0}")]
    AlreadyExists(Ulid),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("window starts in the past")]
    InPast,
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    WalError(String),
}

impl EngineError {
    /// Short stable name used for metric labels and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::SlotTaken(_) => "slot_taken",
            EngineError::ResourceUnavailable(..) => "resource_unavailable",
            EngineError::MissingResource => "missing_resource",
            EngineError::CapacityExceeded { .. } => "capacity_exceeded",
            EngineError::MinimumNotMet(_) => "minimum_not_met",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::NotFound(_) => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::InvalidRequest(_) => "invalid_request",
            EngineError::InvalidConfig(_) => "invalid_config",
            EngineError::InPast => "in_past",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "wal_error",
        }
    }
}
