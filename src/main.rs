use std::sync::Arc;

use tracing::info;

use viewslot::compactor::compact_if_needed;
use viewslot::config::Settings;
use viewslot::directory::InMemoryDirectory;
use viewslot::engine::Engine;
use viewslot::notify::NotifyHub;
use viewslot::store::{AppointmentStore, WalStore};

/// Opens the appointment log in the data dir and prints one JSON line per
/// listing schedule, then a stats line.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let settings = Settings::from_env();
    viewslot::observability::init(settings.metrics_port)?;

    std::fs::create_dir_all(&settings.data_dir)?;
    let path = settings.wal_path();
    let store = Arc::new(WalStore::open(&path)?);
    info!("data_dir: {}", settings.data_dir.display());
    info!(
        "  slot: {} min, pending may overlap: {}",
        settings.engine.slot_duration_ms / 60_000,
        settings.engine.pending_may_overlap
    );

    if compact_if_needed(&store, settings.compact_threshold).await? {
        info!("  log compacted: {}", store.path().display());
    }

    let engine = Engine::new(
        store.clone(),
        Arc::new(InMemoryDirectory::new()),
        Arc::new(NotifyHub::new()),
        settings.engine.clone(),
    );

    for listing_id in store.listing_ids().await? {
        let schedule = engine.list_by_listing(listing_id).await?;
        let line = serde_json::json!({
            "listing_id": listing_id,
            "appointments": schedule,
        });
        println!("{line}");
    }
    let stats = engine.stats().await?;
    println!("{}", serde_json::json!({ "stats": stats, "total": stats.total() }));

    Ok(())
}
