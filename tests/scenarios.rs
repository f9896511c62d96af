use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio_test::{assert_err, assert_ok};
use ulid::Ulid;

use viewslot::clock::ManualClock;
use viewslot::config::EngineConfig;
use viewslot::directory::InMemoryDirectory;
use viewslot::engine::{Engine, EngineError};
use viewslot::model::{AppointmentStatus::*, DomainEvent, Ms, Span};
use viewslot::notify::NotifyHub;
use viewslot::store::{AppointmentStore, InMemoryStore, WalStore};

const H: Ms = 3_600_000;
const M: Ms = 60_000;
/// 2025-01-10T00:00:00Z
const DAY: Ms = 1_736_467_200_000;

struct World {
    engine: Engine,
    hub: Arc<NotifyHub>,
    listing: Ulid,
    owner: Ulid,
}

fn world(store: Arc<dyn AppointmentStore>, config: EngineConfig) -> World {
    let directory = Arc::new(InMemoryDirectory::new());
    let (listing, owner) = (Ulid::new(), Ulid::new());
    directory.register(listing, owner);
    let hub = Arc::new(NotifyHub::new());
    let engine = Engine::new(store, directory, hub.clone(), config)
        .with_clock(Arc::new(ManualClock::new(DAY + 8 * H)));
    World {
        engine,
        hub,
        listing,
        owner,
    }
}

fn drain(rx: &mut broadcast::Receiver<DomainEvent>) -> Vec<DomainEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty) => return events,
            Err(e) => panic!("receiver failed: {e}"),
        }
    }
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("viewslot_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

#[tokio::test]
async fn back_to_back_booking_after_confirm() {
    let w = world(Arc::new(InMemoryStore::new()), EngineConfig::default());
    let (v1, v2, v3) = (Ulid::new(), Ulid::new(), Ulid::new());
    let mut owner_feed = w.hub.subscribe(w.listing);
    let mut v2_feed = w.hub.subscribe(v2);

    let first = assert_ok!(w.engine.create(w.listing, v1, DAY + 10 * H, None).await);
    assert_eq!(first.status, Pending);
    assert_eq!(first.span, Span::new(DAY + 10 * H, DAY + 11 * H));

    let err = assert_err!(w.engine.create(w.listing, v2, DAY + 10 * H + 30 * M, None).await);
    assert!(matches!(err, EngineError::SlotUnavailable { .. }));

    let confirmed = assert_ok!(w.engine.change_status(first.id, Confirmed, w.owner).await);
    assert_eq!(confirmed.status, Confirmed);

    let third = assert_ok!(w.engine.create(w.listing, v3, DAY + 11 * H, None).await);
    assert_eq!(third.status, Pending);

    let seen: Vec<(Ulid, bool)> = drain(&mut owner_feed)
        .iter()
        .map(|e| {
            (
                e.appointment().id,
                matches!(e, DomainEvent::AppointmentCreated { .. }),
            )
        })
        .collect();
    assert_eq!(seen, vec![(first.id, true), (first.id, false), (third.id, true)]);
    assert!(drain(&mut v2_feed).is_empty());
}

#[tokio::test]
async fn confirm_cascades_competing_request_once() {
    let config = EngineConfig {
        pending_may_overlap: true,
        ..EngineConfig::default()
    };
    let w = world(Arc::new(InMemoryStore::new()), config);
    let (v1, v2) = (Ulid::new(), Ulid::new());

    let one = assert_ok!(w.engine.create(w.listing, v1, DAY + 10 * H, None).await);
    let two = assert_ok!(w.engine.create(w.listing, v2, DAY + 10 * H + 30 * M, None).await);
    let mut v2_feed = w.hub.subscribe(v2);
    let mut firehose = w.hub.subscribe_all();

    assert_ok!(w.engine.change_status(one.id, Confirmed, w.owner).await);
    assert_eq!(assert_ok!(w.engine.get(two.id).await).status, Cancelled);

    let to_v2 = drain(&mut v2_feed);
    assert_eq!(to_v2.len(), 1);
    assert!(matches!(
        &to_v2[0],
        DomainEvent::AppointmentStatusChanged { appointment, previous: Pending }
            if appointment.id == two.id && appointment.status == Cancelled
    ));
    assert_eq!(drain(&mut firehose).len(), 2);

    // Confirming again changes nothing and tells nobody.
    let again = assert_ok!(w.engine.change_status(one.id, Confirmed, w.owner).await);
    assert_eq!(again.status, Confirmed);
    assert!(drain(&mut v2_feed).is_empty());
    assert!(drain(&mut firehose).is_empty());
    assert_eq!(assert_ok!(w.engine.get(two.id).await).status, Cancelled);
}

#[tokio::test]
async fn schedule_survives_restart() {
    let path = test_wal_path("restart.wal");
    let config = EngineConfig {
        pending_may_overlap: true,
        ..EngineConfig::default()
    };
    let (listing, one, two) = {
        let store = Arc::new(WalStore::open(&path).unwrap());
        let w = world(store, config.clone());
        let one = assert_ok!(w.engine.create(w.listing, Ulid::new(), DAY + 10 * H, None).await);
        let two = assert_ok!(
            w.engine
                .create(w.listing, Ulid::new(), DAY + 10 * H + 30 * M, Some("after work?".into()))
                .await
        );
        assert_ok!(w.engine.change_status(one.id, Confirmed, w.owner).await);
        (w.listing, one, two)
    };

    let store = Arc::new(WalStore::open(&path).unwrap());
    let w = world(store, config);
    let schedule = assert_ok!(w.engine.list_by_listing(listing).await);
    let states: Vec<(Ulid, _)> = schedule.iter().map(|a| (a.id, a.status)).collect();
    assert_eq!(states, vec![(one.id, Confirmed), (two.id, Cancelled)]);
    assert_eq!(schedule[1].note.as_deref(), Some("after work?"));
}
