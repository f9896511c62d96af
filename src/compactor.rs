use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::store::{StoreError, WalStore};

/// Compact once if at least `threshold` records were appended since the last
/// compaction. Returns whether it compacted.
pub async fn compact_if_needed(store: &WalStore, threshold: u64) -> Result<bool, StoreError> {
    let appends = store.appends_since_compact().await;
    if appends < threshold {
        debug!("compactor skip: {appends}/{threshold} appends");
        return Ok(false);
    }
    store.compact().await?;
    metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
    info!("compacted WAL after {appends} appends");
    Ok(true)
}

/// Background task that periodically compacts the store's WAL.
pub async fn run_compactor(store: Arc<WalStore>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_needed(&store, threshold).await {
            warn!("compaction failed: {e}");
        }
    }
}
