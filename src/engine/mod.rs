mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{free_windows, merge_overlapping, subtract_intervals};
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

use self::conflict::now_ms;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// One tenant's booking database: hotels, rooms, and their bookings, backed
/// by a WAL. Each room sits behind its own `RwLock`; the committer's
/// check-then-act runs under that room's write lock, so among racing
/// overlapping requests at most one commits.
pub struct Engine {
    pub(super) hotels: DashMap<Ulid, Hotel>,
    pub(super) rooms: DashMap<Ulid, SharedRoomState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: booking id → room id.
    pub(super) booking_to_room: DashMap<Ulid, Ulid>,
    /// Hotel → rooms index for O(1) room listings.
    pub(super) hotel_rooms: DashMap<Ulid, Vec<Ulid>>,
}

/// Apply an event directly to a RoomState (no locking — caller holds the lock).
fn apply_to_room(room: &mut RoomState, event: &Event, booking_map: &DashMap<Ulid, Ulid>) {
    match event {
        Event::BookingCreated {
            id,
            room_id,
            hotel_id,
            user_id,
            stay,
            guests,
            total_price,
            status,
            cancellation_reason,
            created_at,
            updated_at,
        } => {
            room.insert_booking(Booking {
                id: *id,
                user_id: *user_id,
                hotel_id: *hotel_id,
                room_id: *room_id,
                stay: *stay,
                guests: *guests,
                total_price: *total_price,
                status: *status,
                cancellation_reason: cancellation_reason.clone(),
                created_at: *created_at,
                updated_at: *updated_at,
            });
            booking_map.insert(*id, *room_id);
            room.recompute_available_hint(now_ms());
        }
        Event::BookingStatusChanged {
            id,
            status,
            cancellation_reason,
            at,
            ..
        } => {
            if let Some(b) = room.booking_mut(*id) {
                b.status = *status;
                if cancellation_reason.is_some() {
                    b.cancellation_reason = cancellation_reason.clone();
                }
                b.updated_at = *at;
            }
            room.recompute_available_hint(now_ms());
        }
        Event::BookingDeleted { id, .. } => {
            room.remove_booking(*id);
            booking_map.remove(id);
            room.recompute_available_hint(now_ms());
        }
        Event::RoomUpdated {
            number,
            kind,
            price_per_night,
            capacity,
            ..
        } => {
            room.number = number.clone();
            room.kind = *kind;
            room.price_per_night = *price_per_night;
            room.capacity = *capacity;
        }
        // Hotel and room creation/deletion are handled at the DashMap level, not here
        Event::HotelCreated { .. }
        | Event::HotelDeleted { .. }
        | Event::RoomCreated { .. }
        | Event::RoomDeleted { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            hotels: DashMap::new(),
            rooms: DashMap::new(),
            wal_tx,
            notify,
            booking_to_room: DashMap::new(),
            hotel_rooms: DashMap::new(),
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context (e.g. lazy tenant
        // creation).
        for event in &events {
            match event {
                Event::HotelCreated { id, name } => {
                    engine.hotels.insert(*id, Hotel { id: *id, name: name.clone() });
                }
                Event::HotelDeleted { id } => {
                    engine.hotels.remove(id);
                    engine.hotel_rooms.remove(id);
                }
                Event::RoomCreated {
                    id,
                    hotel_id,
                    number,
                    kind,
                    price_per_night,
                    capacity,
                } => {
                    let rs = RoomState::new(
                        *id,
                        *hotel_id,
                        number.clone(),
                        *kind,
                        *price_per_night,
                        *capacity,
                    );
                    engine.rooms.insert(*id, Arc::new(RwLock::new(rs)));
                    engine.hotel_rooms.entry(*hotel_id).or_default().push(*id);
                }
                Event::RoomDeleted { id } => {
                    if let Some(entry) = engine.rooms.get(id) {
                        let rs = entry.try_read().expect("replay: uncontended read");
                        if let Some(mut rooms) = engine.hotel_rooms.get_mut(&rs.hotel_id) {
                            rooms.retain(|r| r != id);
                        }
                        for b in &rs.bookings {
                            engine.booking_to_room.remove(&b.id);
                        }
                    }
                    engine.rooms.remove(id);
                }
                other => {
                    if let Some(room_id) = event_room_id(other)
                        && let Some(entry) = engine.rooms.get(&room_id) {
                            let rs_arc = entry.clone();
                            let mut guard = rs_arc.try_write().expect("replay: uncontended write");
                            apply_to_room(&mut guard, other, &engine.booking_to_room);
                        }
                }
            }
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Wal(e.to_string()))
    }

    pub fn get_hotel(&self, id: &Ulid) -> Option<Hotel> {
        self.hotels.get(id).map(|e| e.value().clone())
    }

    pub fn get_room_state(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn get_room_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_room.get(booking_id).map(|e| *e.value())
    }

    /// WAL-append + apply + notify in one call, under the caller's room write
    /// lock. A WAL failure returns before the in-memory apply, so either both
    /// the durable record and the room-state side effect land, or neither does.
    ///
    /// If the request future is dropped while awaiting the append, the writer
    /// task may still complete the durable write. The drop guard applies the
    /// event to room state in that window, so a cancelled commit lands whole
    /// instead of leaving the log ahead of memory.
    pub(super) async fn persist_and_apply(
        &self,
        room_id: Ulid,
        room: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        let mut pending = PendingApply {
            room: Some(room),
            event,
            bookings: &self.booking_to_room,
        };
        match self.wal_append(event).await {
            Ok(()) => {
                pending.apply();
                self.notify.send(room_id, event);
                Ok(())
            }
            Err(e) => {
                pending.disarm();
                Err(e)
            }
        }
    }

    /// Lookup booking → room, get room, acquire write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<RoomState>), EngineError> {
        let room_id = self
            .get_room_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.write_owned().await;
        Ok((room_id, guard))
    }
}

/// Commit-in-flight guard: applies `event` to `room` exactly once — on the
/// success path, or from Drop if the owning future was cancelled mid-append.
/// `disarm` skips the apply when the append is known to have failed.
struct PendingApply<'a> {
    room: Option<&'a mut RoomState>,
    event: &'a Event,
    bookings: &'a DashMap<Ulid, Ulid>,
}

impl PendingApply<'_> {
    fn apply(&mut self) {
        if let Some(room) = self.room.take() {
            apply_to_room(room, self.event, self.bookings);
        }
    }

    fn disarm(&mut self) {
        self.room = None;
    }
}

impl Drop for PendingApply<'_> {
    fn drop(&mut self) {
        self.apply();
    }
}

/// Extract the room_id from an event (for room-scoped events).
fn event_room_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::BookingCreated { room_id, .. }
        | Event::BookingStatusChanged { room_id, .. }
        | Event::BookingDeleted { room_id, .. } => Some(*room_id),
        Event::RoomUpdated { id, .. } => Some(*id),
        Event::HotelCreated { .. }
        | Event::HotelDeleted { .. }
        | Event::RoomCreated { .. }
        | Event::RoomDeleted { .. } => None,
    }
}
