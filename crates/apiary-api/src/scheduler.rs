//! Background scrape/collate loop.
//!
//! Runs sequentially: a new pass never starts before the previous one
//! finished, so overlapping scrapes cannot happen. A failed pass is logged
//! and counted but never crashes the process.
//!
//! Shutdown is observed between passes: a pass that has started always runs
//! to completion, so collation is never torn down mid-publish. The caller
//! bounds how long it waits for that final pass.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use apiary_scraper::Scraper;
use apiary_store::Storage;

pub async fn run(
    scraper: Scraper,
    storage: Arc<dyn Storage>,
    services: Vec<String>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval = ?interval, "scrape scheduler started");
    loop {
        match scraper.run().await {
            Ok(()) => {}
            Err(err) => warn!(error = %err, "scrape pass had failures"),
        }
        if let Err(err) = storage.collate_versions(&services).await {
            error!(error = %err, "collation failed; previous collated versions remain");
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }
    }
    info!("scrape scheduler stopped");
}
