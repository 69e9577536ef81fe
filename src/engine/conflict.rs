use ulid::Ulid;

use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

pub(crate) fn validate_stay(stay: &Stay) -> Result<(), EngineError> {
    use crate::limits::*;
    if stay.check_in >= stay.check_out {
        return Err(EngineError::Validation("check-out must be after check-in"));
    }
    if stay.check_in < MIN_VALID_TIMESTAMP_MS || stay.check_out > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if stay.duration_ms() > MAX_STAY_DURATION_MS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}

/// Pure input check — runs before any lookup. The room-capacity check lives
/// in the committer, where the room is known.
pub(crate) fn validate_guests(guests: &Guests) -> Result<(), EngineError> {
    if guests.adults < 1 {
        return Err(EngineError::Validation("at least one adult guest is required"));
    }
    Ok(())
}

/// The single point of truth the committer consults before mutating: scan the
/// room's bookings for an active one overlapping `stay`. Only Pending and
/// Confirmed bookings block; Cancelled and Completed never do. `exclude` skips
/// one booking id, for re-validating an existing booking against its peers.
pub(crate) fn check_no_conflict(
    room: &RoomState,
    stay: &Stay,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    for booking in room.overlapping(stay) {
        if !booking.is_active() {
            continue;
        }
        if exclude == Some(booking.id) {
            continue;
        }
        return Err(EngineError::Conflict(booking.id));
    }
    Ok(())
}
