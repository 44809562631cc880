// src/pipeline/cycle.rs

//! One extraction/broadcast cycle and the periodic watcher.

use std::time::Duration;

use crate::error::Result;
use crate::models::{Snapshot, render_snapshot};
use crate::pipeline::broadcast::{BroadcastReport, Broadcaster};
use crate::pipeline::extract::Extractor;
use crate::storage::Storage;

/// What a cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Neither strategy produced data; nothing was stored or sent.
    NoData,
    Broadcast {
        records: usize,
        digest: String,
        report: BroadcastReport,
    },
}

/// Extract, store the new snapshot, then broadcast it against the previous one.
pub async fn run_cycle(
    extractor: &Extractor,
    storage: &dyn Storage,
    broadcaster: &Broadcaster,
) -> Result<CycleOutcome> {
    let Some(records) = extractor.extract().await else {
        log::warn!("No data from any strategy, cycle skipped");
        return Ok(CycleOutcome::NoData);
    };

    let previous = storage.latest_data().await?;
    let snapshot = Snapshot::new(render_snapshot(&records));
    storage.append_snapshot(&snapshot).await?;
    log::info!(
        "Stored snapshot {} ({} records)",
        snapshot.short_digest(),
        records.len()
    );

    let subscribers = storage.subscribers().await?;
    let report = broadcaster
        .broadcast(&snapshot.data, &previous, &subscribers)
        .await;

    Ok(CycleOutcome::Broadcast {
        records: records.len(),
        digest: snapshot.digest,
        report,
    })
}

/// Run a cycle every `interval` until the future is dropped.
///
/// A failed cycle is logged and the next one runs on schedule.
pub async fn watch(
    extractor: &Extractor,
    storage: &dyn Storage,
    broadcaster: &Broadcaster,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match run_cycle(extractor, storage, broadcaster).await {
            Ok(CycleOutcome::NoData) => {}
            Ok(CycleOutcome::Broadcast { report, .. }) => {
                log::info!("Cycle complete: {} messages sent", report.sent);
            }
            Err(e) => log::error!("Cycle failed: {}", e),
        }
    }
}
