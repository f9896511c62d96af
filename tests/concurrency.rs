use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use ulid::Ulid;

use viewslot::clock::ManualClock;
use viewslot::config::EngineConfig;
use viewslot::directory::InMemoryDirectory;
use viewslot::engine::{Engine, EngineError};
use viewslot::model::{Appointment, AppointmentStatus, Ms};
use viewslot::notify::NullSink;
use viewslot::store::{AppointmentStore, InMemoryStore, WalStore};

const H: Ms = 3_600_000;
const M: Ms = 60_000;
/// 2025-01-10T00:00:00Z
const DAY: Ms = 1_736_467_200_000;

fn engine(store: Arc<dyn AppointmentStore>, config: EngineConfig) -> (Arc<Engine>, Ulid, Ulid) {
    let directory = Arc::new(InMemoryDirectory::new());
    let (listing, owner) = (Ulid::new(), Ulid::new());
    directory.register(listing, owner);
    let engine = Engine::new(store, directory, Arc::new(NullSink), config)
        .with_clock(Arc::new(ManualClock::new(DAY)));
    (Arc::new(engine), listing, owner)
}

fn lenient() -> EngineConfig {
    EngineConfig {
        pending_may_overlap: true,
        ..EngineConfig::default()
    }
}

fn assert_no_confirmed_overlap(schedule: &[Appointment]) {
    let confirmed: Vec<&Appointment> = schedule
        .iter()
        .filter(|a| a.status == AppointmentStatus::Confirmed)
        .collect();
    for (i, a) in confirmed.iter().enumerate() {
        for b in &confirmed[i + 1..] {
            assert!(!a.span.overlaps(&b.span), "{} overlaps {}", a.span, b.span);
        }
    }
}

async fn race_creates(engine: &Arc<Engine>, listing: Ulid, starts: &[Ms]) -> Vec<Result<Appointment, EngineError>> {
    let handles = starts.iter().map(|&start| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.create(listing, Ulid::new(), start, None).await })
    });
    join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn exactly_one_of_n_identical_creates_wins() {
    let (engine, listing, _) = engine(Arc::new(InMemoryStore::new()), EngineConfig::default());
    let n = 64;
    let results = race_creates(&engine, listing, &vec![DAY + 10 * H; n]).await;

    let won = results.iter().filter(|r| r.is_ok()).count();
    let lost = results
        .iter()
        .filter(|r| matches!(r, Err(EngineError::SlotUnavailable { .. })))
        .count();
    assert_eq!((won, lost), (1, n - 1));
    assert_eq!(engine.list_by_listing(listing).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn staggered_overlapping_creates_leave_no_overlap() {
    let (engine, listing, _) = engine(Arc::new(InMemoryStore::new()), EngineConfig::default());
    // Every 15 minutes across 6 hours: many pairwise overlaps.
    let starts: Vec<Ms> = (0..24).map(|i| DAY + 10 * H + i * 15 * M).collect();
    let results = race_creates(&engine, listing, &starts).await;

    let mut booked: Vec<Appointment> = results.into_iter().filter_map(Result::ok).collect();
    booked.sort_by_key(|a| a.span.start);
    for pair in booked.windows(2) {
        assert!(!pair[0].span.overlaps(&pair[1].span));
    }
    assert!(!booked.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn racing_confirms_on_overlapping_requests() {
    let (engine, listing, owner) = engine(Arc::new(InMemoryStore::new()), lenient());
    let a = engine.create(listing, Ulid::new(), DAY + 10 * H, None).await.unwrap();
    let b = engine
        .create(listing, Ulid::new(), DAY + 10 * H + 30 * M, None)
        .await
        .unwrap();

    let confirms = [a.id, b.id].map(|id| {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .change_status(id, AppointmentStatus::Confirmed, owner)
                .await
        })
    });
    let results: Vec<_> = join_all(confirms).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(
        *loser,
        EngineError::InvalidTransition {
            from: AppointmentStatus::Cancelled,
            to: AppointmentStatus::Confirmed
        }
    );
    let schedule = engine.list_by_listing(listing).await.unwrap();
    let statuses: Vec<_> = schedule.iter().map(|x| x.status).collect();
    assert!(statuses.contains(&AppointmentStatus::Confirmed));
    assert!(statuses.contains(&AppointmentStatus::Cancelled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn confirmed_never_overlap_under_mixed_load() {
    let (engine, listing, owner) = engine(Arc::new(InMemoryStore::new()), lenient());
    let starts: Vec<Ms> = (0..40).map(|i| DAY + 9 * H + (i * 37 % 300) * M).collect();
    let created: Vec<Appointment> = race_creates(&engine, listing, &starts)
        .await
        .into_iter()
        .filter_map(Result::ok)
        .collect();
    assert_eq!(created.len(), starts.len());

    let confirms = created.iter().map(|a| {
        let engine = engine.clone();
        let id = a.id;
        tokio::spawn(async move {
            engine
                .change_status(id, AppointmentStatus::Confirmed, owner)
                .await
        })
    });
    for joined in join_all(confirms).await {
        match joined.unwrap() {
            Ok(_)
            | Err(EngineError::InvalidTransition { .. })
            | Err(EngineError::SlotUnavailable { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    let schedule = engine.list_by_listing(listing).await.unwrap();
    assert_no_confirmed_overlap(&schedule);
    // Every pending survivor is clear of every confirmed slot.
    for a in schedule.iter().filter(|a| a.status == AppointmentStatus::Pending) {
        assert!(
            schedule
                .iter()
                .filter(|c| c.status == AppointmentStatus::Confirmed)
                .all(|c| !c.span.overlaps(&a.span))
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn listings_do_not_block_each_other() {
    let directory = Arc::new(InMemoryDirectory::new());
    let listings: Vec<Ulid> = (0..16).map(|_| Ulid::new()).collect();
    for l in &listings {
        directory.register(*l, Ulid::new());
    }
    let engine = Arc::new(
        Engine::new(
            Arc::new(InMemoryStore::new()),
            directory,
            Arc::new(NullSink),
            EngineConfig::default(),
        )
        .with_clock(Arc::new(ManualClock::new(DAY))),
    );

    let handles = listings.iter().map(|&listing| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.create(listing, Ulid::new(), DAY + 10 * H, None).await })
    });
    for joined in join_all(handles).await {
        assert!(joined.unwrap().is_ok());
    }
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("viewslot_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn durable_store_race_persists_single_winner() {
    let path = test_wal_path("race.wal");
    let listing = {
        let store = Arc::new(WalStore::open(&path).unwrap());
        let (engine, listing, _) = engine(store, EngineConfig::default());
        let results = race_creates(&engine, listing, &vec![DAY + 10 * H; 32]).await;
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        listing
    };

    let reopened = WalStore::open(&path).unwrap();
    assert_eq!(reopened.snapshot(listing).await.unwrap().appointments.len(), 1);
}
