use ulid::Ulid;

use crate::model::{BookingStatus, UnknownStatus};

#[derive(Debug)]
pub enum EngineError {
    /// Room, hotel, or booking id does not resolve.
    NotFound(Ulid),
    /// An entity with this id (or this room number within its hotel) already exists.
    AlreadyExists(Ulid),
    /// The requested stay overlaps the named active booking.
    Conflict(Ulid),
    /// The actor lacks the rights for the requested operation or view.
    Forbidden(&'static str),
    /// Malformed or out-of-range input. Never mutates state.
    Validation(&'static str),
    /// The status state machine has no edge from `from` to `to`.
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    /// Hotel deletion refused while rooms remain.
    HasRooms(Ulid),
    /// Room deletion refused while active bookings remain.
    HasActiveBookings(Ulid),
    LimitExceeded(&'static str),
    /// Opaque persistence failure. Retry policy belongs to the caller.
    Wal(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Conflict(id) => {
                write!(f, "room is not available for the selected dates (conflicts with booking {id})")
            }
            EngineError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            EngineError::Validation(msg) => write!(f, "validation failed: {msg}"),
            EngineError::InvalidTransition { from, to } => {
                write!(f, "no transition from {from} to {to}")
            }
            EngineError::HasRooms(id) => {
                write!(f, "cannot delete hotel {id}: has rooms")
            }
            EngineError::HasActiveBookings(id) => {
                write!(f, "cannot delete room {id}: has active bookings")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Wal(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<UnknownStatus> for EngineError {
    fn from(_: UnknownStatus) -> Self {
        EngineError::Validation("unknown booking status")
    }
}
