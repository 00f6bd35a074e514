//! romdex daemon
//!
//! Keeps the library cache warm for in-process consumers.
//!
//! Startup sequence:
//! 1. Load configuration
//! 2. Open the store and restore the index from it (warm start)
//! 3. Run a full scan in the background
//! 4. Watch the catalog and rescan after each settled burst of edits

use anyhow::{Context, Result};
use romdex_config::{RomdexConfig, WatcherConfig};
use romdex_library::{CacheSettings, LibraryCache, LibraryError, ScanEvent, ScanStage};
use romdex_storage::{CatalogWatcher, WatchOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    setup_logging();

    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

/// Setup logging to console
fn setup_logging() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_ansi(false))
        .init();
}

async fn run() -> Result<()> {
    info!("romdex {} starting", VERSION);

    let config = RomdexConfig::load_default().context("Failed to load configuration")?;
    let settings = CacheSettings::from_config(&config);
    info!("ROM root: {}", settings.paths.roms.display());
    info!("Catalog: {}", settings.paths.catalog.display());

    let catalog = settings.paths.catalog.clone();
    let cache = Arc::new(LibraryCache::open(settings).context("Failed to open library store")?);

    if config.cache.warm_start {
        match cache.restore_from_store().await {
            Ok(restored) => info!("Warm start: {} games available before scanning", restored),
            Err(e) => warn!("Warm start failed, waiting for scan: {}", e),
        }
    }

    let (rescan_tx, rescan_rx) = mpsc::unbounded_channel();
    let scans = tokio::spawn(scan_loop(Arc::clone(&cache), rescan_rx));

    // Initial scan
    rescan_tx
        .send(())
        .context("Scan loop exited before the first scan")?;

    let _watcher = if config.watcher.enabled {
        start_watcher(&catalog, &config.watcher, rescan_tx.clone())
    } else {
        info!("Catalog watcher disabled");
        None
    };

    signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down");
    scans.abort();
    Ok(())
}

fn watch_options(config: &WatcherConfig) -> WatchOptions {
    WatchOptions {
        debounce: Duration::from_millis(config.debounce_ms),
        max_errors_per_window: config.max_errors_per_window,
        error_window: Duration::from_secs(config.error_window_secs),
    }
}

/// Watch the catalog; each settled burst queues a full rescan
fn start_watcher(
    catalog: &Path,
    config: &WatcherConfig,
    rescan: UnboundedSender<()>,
) -> Option<CatalogWatcher> {
    let on_change = move || {
        if rescan.send(()).is_err() {
            debug!("Scan loop gone, dropping rescan request");
        }
    };

    match CatalogWatcher::start(catalog, watch_options(config), on_change) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!("Catalog watcher unavailable: {}", e);
            None
        }
    }
}

/// Run scans one at a time. Requests queued during a scan collapse into
/// a single follow-up scan.
async fn scan_loop(cache: Arc<LibraryCache>, mut requests: UnboundedReceiver<()>) {
    while requests.recv().await.is_some() {
        while requests.try_recv().is_ok() {}
        run_scan(&cache).await;
    }
}

async fn run_scan(cache: &Arc<LibraryCache>) {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handle = match cache.spawn_full_scan(Some(tx)) {
        Ok(handle) => handle,
        Err(LibraryError::ScanInProgress) => {
            info!("Scan already in progress, ignoring request");
            return;
        }
        Err(e) => {
            error!("Failed to start scan: {}", e);
            return;
        }
    };

    while let Some(event) = rx.recv().await {
        log_progress(&event);
    }

    match handle.await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!("Scan failed: {}", e),
        Err(e) => error!("Scan task panicked: {}", e),
    }
}

fn log_progress(event: &ScanEvent) {
    match event {
        ScanEvent::Progress {
            stage: ScanStage::SystemScanned,
            percent,
            detail,
        } => debug!(
            "[{:>3}%] scanned {}",
            percent,
            detail.as_deref().unwrap_or("?")
        ),
        ScanEvent::Progress { stage, percent, .. } => info!("[{:>3}%] {:?}", percent, stage),
        ScanEvent::Completed(summary) => info!(
            "Library ready: {} games across {} systems in {:?}",
            summary.game_count, summary.accessible_system_count, summary.duration
        ),
        ScanEvent::Failed { error } => warn!("Scan aborted: {}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_options_from_config() {
        let config = WatcherConfig {
            enabled: true,
            debounce_ms: 750,
            max_errors_per_window: 3,
            error_window_secs: 10,
        };
        let options = watch_options(&config);
        assert_eq!(options.debounce, Duration::from_millis(750));
        assert_eq!(options.max_errors_per_window, 3);
        assert_eq!(options.error_window, Duration::from_secs(10));
    }
}
