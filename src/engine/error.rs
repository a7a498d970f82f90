use chrono::NaiveDateTime;
use thiserror::Error;
use ulid::Ulid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(Ulid),

    #[error("already exists: {0}")]
    AlreadyExists(Ulid),

    /// The requested time overlaps an active booking (buffer included).
    #[error("conflict with booking: {0}")]
    Conflict(Ulid),

    /// The start is not an offered slot under current schedule and policy.
    #[error("slot no longer available: {start}")]
    SlotUnavailable { start: NaiveDateTime },

    #[error("invalid record: {0}")]
    InvalidRecord(&'static str),

    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
}
