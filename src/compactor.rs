use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

/// Background task that rewrites a tenant's WAL once enough appends have
/// accumulated since the last compaction. Booking churn (create + cancel)
/// otherwise grows the log without bound.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends >= threshold {
            match engine.compact_wal().await {
                Ok(()) => info!("compacted WAL after {appends} appends"),
                Err(e) => tracing::warn!("WAL compaction failed: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use ulid::Ulid;

    use crate::engine::Engine;
    use crate::model::*;
    use crate::notify::NotifyHub;

    use super::*;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("innkeep_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compaction_preserves_state_and_shrinks_log() {
        let path = test_wal_path("compact_roundtrip.wal");
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(path.clone(), notify).unwrap());

        let admin = Actor::admin(Ulid::new());
        let guest = Actor::user(Ulid::new());
        let hotel_id = Ulid::new();
        let room_id = Ulid::new();
        engine.create_hotel(&admin, hotel_id, "Seaview".into()).await.unwrap();
        engine
            .create_room(&admin, room_id, hotel_id, "101".into(), RoomKind::Double, 80.0, 2)
            .await
            .unwrap();

        // Churn: book and cancel repeatedly, then leave one live booking.
        for i in 0..20 {
            let bid = Ulid::new();
            let stay = Stay::new(i * MS_PER_NIGHT, (i + 1) * MS_PER_NIGHT);
            engine
                .create_booking(&guest, bid, hotel_id, room_id, stay, Guests { adults: 1, children: 0 })
                .await
                .unwrap();
            engine
                .transition_status(&guest, bid, BookingStatus::Cancelled, Some("plans changed".into()))
                .await
                .unwrap();
        }
        let keeper = Ulid::new();
        engine
            .create_booking(
                &guest,
                keeper,
                hotel_id,
                room_id,
                Stay::new(100 * MS_PER_NIGHT, 103 * MS_PER_NIGHT),
                Guests { adults: 2, children: 0 },
            )
            .await
            .unwrap();

        let before = std::fs::metadata(&path).unwrap().len();
        engine.compact_wal().await.unwrap();
        let after = std::fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted WAL should shrink: {after} < {before}");
        assert_eq!(engine.wal_appends_since_compact().await, 0);

        // A fresh engine replaying the compacted WAL sees the same state.
        drop(engine);
        let reopened = Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();
        let active = reopened.find_active_bookings_for_room(room_id).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, keeper);
        assert_eq!(active[0].total_price, 240.0);
        let all = reopened
            .list_bookings(&Actor::admin(Ulid::new()), &BookingFilter::default())
            .await;
        assert_eq!(all.len(), 21); // cancelled history survives compaction

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn compactor_task_fires_at_threshold() {
        let path = test_wal_path("compactor_task.wal");
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(path.clone(), notify).unwrap());

        let admin = Actor::admin(Ulid::new());
        let hotel_id = Ulid::new();
        engine.create_hotel(&admin, hotel_id, "Seaview".into()).await.unwrap();
        assert!(engine.wal_appends_since_compact().await >= 1);

        // Below threshold the compactor must leave the WAL alone.
        let appends_before = engine.wal_appends_since_compact().await;
        let handle = tokio::spawn(run_compactor(engine.clone(), 1_000_000));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
        assert_eq!(engine.wal_appends_since_compact().await, appends_before);

        let _ = std::fs::remove_file(&path);
    }
}
