//! End-to-end flows through the public API: tenant isolation, the booking
//! lifecycle, and the per-room change feed.

use std::path::PathBuf;

use ulid::Ulid;

use innkeep::model::{Event, MS_PER_NIGHT};
use innkeep::{Actor, BookingStatus, EngineError, Guests, RoomKind, Stay, TenantManager};

fn test_data_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("innkeep_test_flows").join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn day(n: i64) -> i64 {
    n * MS_PER_NIGHT
}

#[tokio::test]
async fn booking_lifecycle_across_restart() {
    let dir = test_data_dir("lifecycle");
    let admin = Actor::admin(Ulid::new());
    let guest = Actor::user(Ulid::new());
    let hotel_id = Ulid::new();
    let room_id = Ulid::new();
    let booking_id = Ulid::new();

    {
        let tm = TenantManager::new(dir.clone(), 1000);
        let engine = tm.get_or_create("coastal").unwrap();

        engine.create_hotel(&admin, hotel_id, "Seaview".into()).await.unwrap();
        engine
            .create_room(&admin, room_id, hotel_id, "305".into(), RoomKind::Suite, 250.0, 4)
            .await
            .unwrap();

        let booking = engine
            .create_booking(
                &guest,
                booking_id,
                hotel_id,
                room_id,
                Stay::new(day(30), day(34)),
                Guests { adults: 2, children: 2 },
            )
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.total_price, 1000.0);

        engine
            .transition_status(&admin, booking_id, BookingStatus::Confirmed, None)
            .await
            .unwrap();
    }

    // A fresh manager over the same data dir replays the tenant's WAL.
    let tm = TenantManager::new(dir, 1000);
    let engine = tm.get_or_create("coastal").unwrap();

    let restored = engine.find_booking(&guest, booking_id).await.unwrap();
    assert_eq!(restored.status, BookingStatus::Confirmed);

    // Still blocking its dates...
    let result = engine
        .create_booking(
            &guest,
            Ulid::new(),
            hotel_id,
            room_id,
            Stay::new(day(32), day(36)),
            Guests { adults: 1, children: 0 },
        )
        .await;
    assert!(matches!(result, Err(EngineError::Conflict(id)) if id == booking_id));

    // ...until completed, after which the room frees up.
    engine
        .transition_status(&admin, booking_id, BookingStatus::Completed, None)
        .await
        .unwrap();
    engine
        .create_booking(
            &guest,
            Ulid::new(),
            hotel_id,
            room_id,
            Stay::new(day(32), day(36)),
            Guests { adults: 1, children: 0 },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn tenants_share_nothing() {
    let dir = test_data_dir("isolation");
    let tm = TenantManager::new(dir, 1000);
    let east = tm.get_or_create("east").unwrap();
    let west = tm.get_or_create("west").unwrap();

    let admin = Actor::admin(Ulid::new());
    let guest = Actor::user(Ulid::new());
    let hotel_id = Ulid::new();
    let room_id = Ulid::new();

    for engine in [&east, &west] {
        engine.create_hotel(&admin, hotel_id, "Twin".into()).await.unwrap();
        engine
            .create_room(&admin, room_id, hotel_id, "1".into(), RoomKind::Single, 60.0, 1)
            .await
            .unwrap();
    }

    let stay = Stay::new(day(5), day(8));
    east.create_booking(&guest, Ulid::new(), hotel_id, room_id, stay, Guests { adults: 1, children: 0 })
        .await
        .unwrap();

    // West's identically-named room is unaffected.
    west.create_booking(&guest, Ulid::new(), hotel_id, room_id, stay, Guests { adults: 1, children: 0 })
        .await
        .unwrap();
}

#[tokio::test]
async fn room_feed_announces_booking_events() {
    let dir = test_data_dir("feed");
    let tm = TenantManager::new(dir, 1000);
    let engine = tm.get_or_create("feed").unwrap();

    let admin = Actor::admin(Ulid::new());
    let guest = Actor::user(Ulid::new());
    let hotel_id = Ulid::new();
    let room_id = Ulid::new();
    engine.create_hotel(&admin, hotel_id, "Seaview".into()).await.unwrap();
    engine
        .create_room(&admin, room_id, hotel_id, "101".into(), RoomKind::Double, 100.0, 2)
        .await
        .unwrap();

    let mut feed = engine.notify.subscribe(room_id);

    let booking_id = Ulid::new();
    engine
        .create_booking(
            &guest,
            booking_id,
            hotel_id,
            room_id,
            Stay::new(day(1), day(2)),
            Guests { adults: 1, children: 0 },
        )
        .await
        .unwrap();
    engine
        .transition_status(&guest, booking_id, BookingStatus::Cancelled, Some("typo".into()))
        .await
        .unwrap();

    match feed.recv().await.unwrap() {
        Event::BookingCreated { id, room_id: rid, .. } => {
            assert_eq!(id, booking_id);
            assert_eq!(rid, room_id);
        }
        other => panic!("expected BookingCreated, got {other:?}"),
    }
    match feed.recv().await.unwrap() {
        Event::BookingStatusChanged { id, status, .. } => {
            assert_eq!(id, booking_id);
            assert_eq!(status, BookingStatus::Cancelled);
        }
        other => panic!("expected BookingStatusChanged, got {other:?}"),
    }
}
