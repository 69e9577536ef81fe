use std::sync::Arc;

use tokio::sync::{RwLock, oneshot};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, now_ms, validate_guests, validate_stay};
use super::{Engine, EngineError, WalCommand};

/// The status state machine, in one place. Authorization is decided before
/// transition validity: a non-owning, non-admin actor is rejected no matter
/// what target it asked for.
///
/// - any non-terminal → Cancelled: owner (reason required) or admin
/// - Pending → Confirmed | Completed, Confirmed → Completed: admin only
/// - Cancelled, Completed: terminal
fn check_transition(
    booking: &Booking,
    actor: &Actor,
    to: BookingStatus,
    reason: &Option<String>,
) -> Result<(), EngineError> {
    let is_owner = booking.user_id == actor.user_id;
    if !is_owner && !actor.is_admin() {
        return Err(EngineError::Forbidden("not your booking"));
    }

    let from = booking.status;
    if from.is_terminal() {
        return Err(EngineError::InvalidTransition { from, to });
    }

    match to {
        BookingStatus::Cancelled => {
            if !actor.is_admin() && reason.is_none() {
                return Err(EngineError::Validation("cancellation reason is required"));
            }
            Ok(())
        }
        BookingStatus::Confirmed if from == BookingStatus::Pending => {
            if actor.is_admin() {
                Ok(())
            } else {
                Err(EngineError::Forbidden("only an administrator can update booking status"))
            }
        }
        BookingStatus::Completed if !from.is_terminal() => {
            if actor.is_admin() {
                Ok(())
            } else {
                Err(EngineError::Forbidden("only an administrator can update booking status"))
            }
        }
        _ => Err(EngineError::InvalidTransition { from, to }),
    }
}

impl Engine {
    // ── Catalog registry ─────────────────────────────────────

    pub async fn create_hotel(
        &self,
        actor: &Actor,
        id: Ulid,
        name: String,
    ) -> Result<(), EngineError> {
        if !actor.is_admin() {
            return Err(EngineError::Forbidden("only an administrator can manage hotels"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("hotel name too long"));
        }
        if self.hotels.len() >= MAX_HOTELS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many hotels"));
        }
        if self.hotels.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::HotelCreated { id, name: name.clone() };
        self.wal_append(&event).await?;
        self.hotels.insert(id, Hotel { id, name });
        self.notify.send(id, &event);
        Ok(())
    }

    pub async fn delete_hotel(&self, actor: &Actor, id: Ulid) -> Result<(), EngineError> {
        if !actor.is_admin() {
            return Err(EngineError::Forbidden("only an administrator can manage hotels"));
        }
        if !self.hotels.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        if let Some(rooms) = self.hotel_rooms.get(&id)
            && !rooms.is_empty() {
                return Err(EngineError::HasRooms(id));
            }

        let event = Event::HotelDeleted { id };
        self.wal_append(&event).await?;
        self.hotels.remove(&id);
        self.hotel_rooms.remove(&id);
        self.notify.send(id, &event);
        Ok(())
    }

    pub async fn create_room(
        &self,
        actor: &Actor,
        id: Ulid,
        hotel_id: Ulid,
        number: String,
        kind: RoomKind,
        price_per_night: f64,
        capacity: u32,
    ) -> Result<(), EngineError> {
        if !actor.is_admin() {
            return Err(EngineError::Forbidden("only an administrator can manage rooms"));
        }
        validate_room_attrs(&number, price_per_night, capacity)?;
        if self.rooms.len() >= MAX_ROOMS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        if !self.hotels.contains_key(&hotel_id) {
            return Err(EngineError::NotFound(hotel_id));
        }
        if self.rooms.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        self.check_number_free(hotel_id, &number, None).await?;

        let event = Event::RoomCreated {
            id,
            hotel_id,
            number: number.clone(),
            kind,
            price_per_night,
            capacity,
        };
        self.wal_append(&event).await?;
        let rs = RoomState::new(id, hotel_id, number, kind, price_per_night, capacity);
        self.rooms.insert(id, Arc::new(RwLock::new(rs)));
        self.hotel_rooms.entry(hotel_id).or_default().push(id);
        self.notify.send(id, &event);
        Ok(())
    }

    pub async fn update_room(
        &self,
        actor: &Actor,
        id: Ulid,
        number: String,
        kind: RoomKind,
        price_per_night: f64,
        capacity: u32,
    ) -> Result<(), EngineError> {
        if !actor.is_admin() {
            return Err(EngineError::Forbidden("only an administrator can manage rooms"));
        }
        validate_room_attrs(&number, price_per_night, capacity)?;
        let rs = self
            .get_room_state(&id)
            .ok_or(EngineError::NotFound(id))?;
        let hotel_id = rs.read().await.hotel_id;
        self.check_number_free(hotel_id, &number, Some(id)).await?;

        let mut guard = rs.write().await;
        let event = Event::RoomUpdated { id, number, kind, price_per_night, capacity };
        self.persist_and_apply(id, &mut guard, &event).await
    }

    /// Delete a room and everything booked in it. Refused while active
    /// bookings remain; terminal booking history dies with the room.
    pub async fn delete_room(&self, actor: &Actor, id: Ulid) -> Result<(), EngineError> {
        if !actor.is_admin() {
            return Err(EngineError::Forbidden("only an administrator can manage rooms"));
        }
        let rs = self
            .get_room_state(&id)
            .ok_or(EngineError::NotFound(id))?;
        let guard = rs.read().await;
        if guard.bookings.iter().any(|b| b.is_active()) {
            return Err(EngineError::HasActiveBookings(id));
        }
        let hotel_id = guard.hotel_id;
        let booking_ids: Vec<Ulid> = guard.bookings.iter().map(|b| b.id).collect();
        drop(guard);

        let event = Event::RoomDeleted { id };
        self.wal_append(&event).await?;
        self.rooms.remove(&id);
        if let Some(mut rooms) = self.hotel_rooms.get_mut(&hotel_id) {
            rooms.retain(|r| r != &id);
        }
        for bid in booking_ids {
            self.booking_to_room.remove(&bid);
        }
        self.notify.send(id, &event);
        Ok(())
    }

    // ── Booking committer ────────────────────────────────────

    /// Validate, check availability, price, and persist a new booking as one
    /// atomic unit. The overlap check and the write happen under the room's
    /// write lock, so of two racing requests for overlapping dates exactly
    /// one succeeds; the loser gets `Conflict` and nothing is mutated.
    ///
    /// New bookings start as Pending; confirmation is an explicit admin
    /// transition.
    pub async fn create_booking(
        &self,
        actor: &Actor,
        id: Ulid,
        hotel_id: Ulid,
        room_id: Ulid,
        stay: Stay,
        guests: Guests,
    ) -> Result<Booking, EngineError> {
        validate_stay(&stay)?;
        validate_guests(&guests)?;
        if !self.hotels.contains_key(&hotel_id) {
            return Err(EngineError::NotFound(hotel_id));
        }
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;

        let mut guard = rs.write().await;
        if guard.hotel_id != hotel_id {
            return Err(EngineError::Validation("room does not belong to the stated hotel"));
        }
        if guests.total() > guard.capacity {
            return Err(EngineError::Validation("guest count exceeds room capacity"));
        }
        if self.booking_to_room.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }

        if let Err(e) = check_no_conflict(&guard, &stay, None) {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let at = now_ms();
        let total_price = stay.nights() as f64 * guard.price_per_night;
        let event = Event::BookingCreated {
            id,
            room_id,
            hotel_id,
            user_id: actor.user_id,
            stay,
            guests,
            total_price,
            status: BookingStatus::Pending,
            cancellation_reason: None,
            created_at: at,
            updated_at: at,
        };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);

        guard.booking(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Drive the booking state machine. Serialized per booking via the owning
    /// room's write lock, so racing transitions toward mutually exclusive
    /// terminal states cannot both succeed.
    pub async fn transition_status(
        &self,
        actor: &Actor,
        booking_id: Ulid,
        new_status: BookingStatus,
        reason: Option<String>,
    ) -> Result<Booking, EngineError> {
        if let Some(ref r) = reason
            && r.len() > MAX_REASON_LEN {
                return Err(EngineError::LimitExceeded("cancellation reason too long"));
            }
        let (room_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        check_transition(booking, actor, new_status, &reason)?;

        let event = Event::BookingStatusChanged {
            id: booking_id,
            room_id,
            status: new_status,
            cancellation_reason: reason,
            at: now_ms(),
        };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        metrics::counter!(
            crate::observability::STATUS_TRANSITIONS_TOTAL,
            "status" => new_status.as_str()
        )
        .increment(1);

        guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::NotFound(booking_id))
    }

    /// Administrative hard delete. Bypasses the state machine — and with it
    /// the protection the overlap invariant gets from status transitions.
    pub async fn delete_booking(&self, actor: &Actor, booking_id: Ulid) -> Result<(), EngineError> {
        if !actor.is_admin() {
            return Err(EngineError::Forbidden("only an administrator can delete bookings"));
        }
        let (room_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        if guard.booking(booking_id).is_none() {
            return Err(EngineError::NotFound(booking_id));
        }
        let event = Event::BookingDeleted { id: booking_id, room_id };
        self.persist_and_apply(room_id, &mut guard, &event).await
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to recreate
    /// the current state: one HotelCreated per hotel, one RoomCreated per room,
    /// one BookingCreated per booking (carrying its current status).
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        for entry in self.hotels.iter() {
            let h = entry.value();
            events.push(Event::HotelCreated { id: h.id, name: h.name.clone() });
        }

        let room_ids: Vec<Ulid> = self.rooms.iter().map(|e| *e.key()).collect();
        for id in room_ids {
            let Some(rs) = self.get_room_state(&id) else { continue };
            let guard = rs.read().await;
            events.push(Event::RoomCreated {
                id: guard.id,
                hotel_id: guard.hotel_id,
                number: guard.number.clone(),
                kind: guard.kind,
                price_per_night: guard.price_per_night,
                capacity: guard.capacity,
            });
            for b in &guard.bookings {
                events.push(Event::BookingCreated {
                    id: b.id,
                    room_id: b.room_id,
                    hotel_id: b.hotel_id,
                    user_id: b.user_id,
                    stay: b.stay,
                    guests: b.guests,
                    total_price: b.total_price,
                    status: b.status,
                    cancellation_reason: b.cancellation_reason.clone(),
                    created_at: b.created_at,
                    updated_at: b.updated_at,
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Wal(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    // ── Internal helpers ─────────────────────────────────────

    /// Room numbers are unique within a hotel.
    async fn check_number_free(
        &self,
        hotel_id: Ulid,
        number: &str,
        exclude_room: Option<Ulid>,
    ) -> Result<(), EngineError> {
        let siblings = self
            .hotel_rooms
            .get(&hotel_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        for sibling in siblings {
            if exclude_room == Some(sibling) {
                continue;
            }
            if let Some(rs) = self.get_room_state(&sibling)
                && rs.read().await.number == number {
                    return Err(EngineError::AlreadyExists(sibling));
                }
        }
        Ok(())
    }
}

fn validate_room_attrs(number: &str, price_per_night: f64, capacity: u32) -> Result<(), EngineError> {
    if number.is_empty() {
        return Err(EngineError::Validation("room number is required"));
    }
    if number.len() > MAX_ROOM_NUMBER_LEN {
        return Err(EngineError::LimitExceeded("room number too long"));
    }
    if !price_per_night.is_finite() || price_per_night < 0.0 {
        return Err(EngineError::Validation("price must be a non-negative number"));
    }
    if capacity < 1 {
        return Err(EngineError::Validation("capacity must be at least 1"));
    }
    Ok(())
}
