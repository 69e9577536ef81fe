use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for per-room change feeds. Collaborator layers subscribe to
/// a room and receive every applied event for it (bookings created, status
/// changes, deletions), so they can push "availability changed" to clients.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to notifications for a room. Creates the channel if needed.
    pub fn subscribe(&self, room_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, room_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&room_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Remove a channel (e.g. when a room is deleted).
    #[allow(dead_code)]
    pub fn remove(&self, room_id: &Ulid) {
        self.channels.remove(room_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BookingStatus, Ms};

    fn status_changed(room_id: Ulid, at: Ms) -> Event {
        Event::BookingStatusChanged {
            id: Ulid::new(),
            room_id,
            status: BookingStatus::Confirmed,
            cancellation_reason: None,
            at,
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let room_id = Ulid::new();
        let mut rx = hub.subscribe(room_id);

        let event = status_changed(room_id, 1000);
        hub.send(room_id, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let room_id = Ulid::new();
        // No subscriber — should not panic
        hub.send(room_id, &Event::RoomDeleted { id: room_id });
    }

    #[tokio::test]
    async fn rooms_are_independent_channels() {
        let hub = NotifyHub::new();
        let room_a = Ulid::new();
        let room_b = Ulid::new();
        let mut rx_a = hub.subscribe(room_a);

        hub.send(room_b, &status_changed(room_b, 1));
        hub.send(room_a, &status_changed(room_a, 2));

        let received = rx_a.recv().await.unwrap();
        match received {
            Event::BookingStatusChanged { room_id, at, .. } => {
                assert_eq!(room_id, room_a);
                assert_eq!(at, 2);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
