use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::free_windows;
use super::conflict::check_no_conflict;
use super::{Engine, EngineError};

impl Engine {
    /// Does any active booking for `room_id` overlap the proposed stay?
    /// Half-open semantics: a checkout on day X and a check-in on day X do
    /// not conflict. `exclude_booking` skips one booking, for re-validating
    /// an existing booking against its peers. Read-only.
    pub async fn is_overlapping(
        &self,
        room_id: Ulid,
        stay: Stay,
        exclude_booking: Option<Ulid>,
    ) -> Result<bool, EngineError> {
        if stay.check_in >= stay.check_out {
            return Err(EngineError::Validation("check-out must be after check-in"));
        }
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        match check_no_conflict(&guard, &stay, exclude_booking) {
            Ok(()) => Ok(false),
            Err(EngineError::Conflict(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Free sub-windows of `window` for one room, active bookings subtracted.
    pub async fn room_free_windows(
        &self,
        room_id: Ulid,
        window: Stay,
        min_nights: Option<i64>,
    ) -> Result<Vec<Stay>, EngineError> {
        if window.check_in >= window.check_out {
            return Err(EngineError::Validation("window end must be after window start"));
        }
        if window.duration_ms() > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(free_windows(&guard, &window, min_nights))
    }

    pub fn list_hotels(&self) -> Vec<Hotel> {
        self.hotels.iter().map(|e| e.value().clone()).collect()
    }

    pub async fn get_room(&self, room_id: Ulid) -> Result<RoomInfo, EngineError> {
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(RoomInfo::from(&*guard))
    }

    /// Scoped lookup used by booking validation: the room must exist AND
    /// belong to the stated hotel.
    pub async fn get_room_in_hotel(
        &self,
        room_id: Ulid,
        hotel_id: Ulid,
    ) -> Result<RoomInfo, EngineError> {
        let info = self.get_room(room_id).await?;
        if info.hotel_id != hotel_id {
            return Err(EngineError::NotFound(room_id));
        }
        Ok(info)
    }

    pub async fn list_rooms(&self, hotel_id: Ulid) -> Result<Vec<RoomInfo>, EngineError> {
        if !self.hotels.contains_key(&hotel_id) {
            return Err(EngineError::NotFound(hotel_id));
        }
        let ids = self
            .hotel_rooms
            .get(&hotel_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut rooms = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(rs) = self.get_room_state(&id) {
                let guard = rs.read().await;
                rooms.push(RoomInfo::from(&*guard));
            }
        }
        rooms.sort_by(|a, b| a.number.cmp(&b.number));
        Ok(rooms)
    }

    /// Bookings that count toward the room's overlap invariant
    /// (status Pending or Confirmed).
    pub async fn find_active_bookings_for_room(
        &self,
        room_id: Ulid,
    ) -> Result<Vec<Booking>, EngineError> {
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(guard
            .bookings
            .iter()
            .filter(|b| b.is_active())
            .cloned()
            .collect())
    }

    /// Fetch one booking. Only the owning user and administrators may view.
    pub async fn find_booking(
        &self,
        actor: &Actor,
        booking_id: Ulid,
    ) -> Result<Booking, EngineError> {
        let room_id = self
            .get_room_for_booking(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let guard = rs.read().await;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        if booking.user_id != actor.user_id && !actor.is_admin() {
            return Err(EngineError::Forbidden("not authorized to view this booking"));
        }
        Ok(booking.clone())
    }

    /// List bookings visible to the actor: admins see everything, users see
    /// their own. Sorted by check-in, newest first.
    pub async fn list_bookings(&self, actor: &Actor, filter: &BookingFilter) -> Vec<Booking> {
        let room_ids: Vec<Ulid> = self.rooms.iter().map(|e| *e.key()).collect();
        let mut out = Vec::new();
        for id in room_ids {
            let Some(rs) = self.get_room_state(&id) else { continue };
            let guard = rs.read().await;
            for b in &guard.bookings {
                if !actor.is_admin() && b.user_id != actor.user_id {
                    continue;
                }
                if let Some(status) = filter.status
                    && b.status != status {
                        continue;
                    }
                if let Some(from) = filter.check_in_from
                    && b.stay.check_in < from {
                        continue;
                    }
                if let Some(to) = filter.check_in_to
                    && b.stay.check_in > to {
                        continue;
                    }
                out.push(b.clone());
            }
        }
        out.sort_by(|a, b| b.stay.check_in.cmp(&a.stay.check_in));
        out
    }
}
