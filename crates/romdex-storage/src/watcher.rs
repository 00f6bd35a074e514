//! Catalog file watcher
//!
//! Watches the systems catalog for external edits and calls back once per
//! settled burst of events. ROM trees are deliberately not watched; they may
//! live on slow network mounts.

use crate::StorageError;
use notify::event::EventKind;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{RecvTimeoutError, channel};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often the worker thread wakes up to check the debounce deadline
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Watcher settings
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Quiet period required before a burst is considered settled
    pub debounce: Duration,
    /// Backend errors logged per window before the rest are suppressed
    pub max_errors_per_window: u32,
    /// Error throttling window
    pub error_window: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(2),
            max_errors_per_window: 5,
            error_window: Duration::from_secs(60),
        }
    }
}

/// Trailing-edge debounce: every event pushes the deadline out
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// Record an event at `now`, resetting the timer
    pub fn event(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    /// Returns true exactly once when the burst has settled
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }
}

/// Caps how many errors get logged per time window
#[derive(Debug, Clone)]
pub struct ErrorThrottle {
    max_per_window: u32,
    window: Duration,
    window_start: Option<Instant>,
    logged: u32,
    suppressed: u32,
}

impl ErrorThrottle {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            window_start: None,
            logged: 0,
            suppressed: 0,
        }
    }

    /// Whether an error seen at `now` should be logged.
    ///
    /// When a new window opens, the number of errors suppressed in the
    /// previous one is returned alongside so the caller can report it.
    pub fn allow(&mut self, now: Instant) -> (bool, u32) {
        let mut carried = 0;
        let expired = match self.window_start {
            Some(start) => now.duration_since(start) >= self.window,
            None => true,
        };

        if expired {
            carried = self.suppressed;
            self.window_start = Some(now);
            self.logged = 0;
            self.suppressed = 0;
        }

        if self.logged < self.max_per_window {
            self.logged += 1;
            (true, carried)
        } else {
            self.suppressed += 1;
            (false, carried)
        }
    }
}

/// Watches a single catalog file and fires a callback per settled burst
pub struct CatalogWatcher {
    path: PathBuf,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CatalogWatcher {
    /// Start watching `catalog`. `on_change` runs on the watcher thread.
    pub fn start<F>(catalog: &Path, options: WatchOptions, on_change: F) -> Result<Self, StorageError>
    where
        F: FnMut() + Send + 'static,
    {
        let file_name = catalog
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| StorageError::WatchFailed(format!("not a file: {}", catalog.display())))?;

        // Watch the parent so editors that replace the file atomically
        // (write temp + rename) are still observed.
        let parent = match catalog.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(tx, notify::Config::default())
            .map_err(|e| StorageError::WatchFailed(e.to_string()))?;
        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .map_err(|e| StorageError::WatchFailed(e.to_string()))?;

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let watched = catalog.to_path_buf();

        let handle = thread::Builder::new()
            .name("romdex-catalog-watcher".to_string())
            .spawn(move || {
                // Keep the backend alive for the lifetime of the thread
                let _watcher = watcher;
                let mut on_change = on_change;
                let mut debouncer = Debouncer::new(options.debounce);
                let mut throttle =
                    ErrorThrottle::new(options.max_errors_per_window, options.error_window);

                tracing::info!("Watching catalog {}", watched.display());

                while thread_running.load(Ordering::SeqCst) {
                    match rx.recv_timeout(POLL_INTERVAL) {
                        Ok(Ok(event)) => {
                            if is_catalog_event(&event, &file_name) {
                                tracing::debug!("Catalog event: {:?}", event.kind);
                                debouncer.event(Instant::now());
                            }
                        }
                        Ok(Err(err)) => {
                            let (log, suppressed) = throttle.allow(Instant::now());
                            if suppressed > 0 {
                                tracing::warn!("{} catalog watcher errors suppressed", suppressed);
                            }
                            if log {
                                tracing::warn!("Catalog watcher error: {}", err);
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }

                    if debouncer.poll(Instant::now()) {
                        tracing::info!("Catalog changed, requesting rescan");
                        on_change();
                    }
                }

                tracing::info!("Catalog watcher stopped");
            })?;

        Ok(Self {
            path: catalog.to_path_buf(),
            running,
            handle: Some(handle),
        })
    }

    /// The watched catalog file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop watching and wait for the worker thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Catalog watcher thread panicked");
            }
        }
    }
}

impl Drop for CatalogWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn is_catalog_event(event: &Event, file_name: &OsString) -> bool {
    let relevant_kind = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    );

    relevant_kind
        && event
            .paths
            .iter()
            .any(|p| p.file_name().is_some_and(|n| n == file_name.as_os_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind};
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    #[test]
    fn test_debouncer_fires_once_after_quiet_period() {
        let start = Instant::now();
        let mut d = Debouncer::new(Duration::from_millis(500));

        assert!(!d.poll(start));
        d.event(start);
        assert!(d.is_pending());
        assert!(!d.poll(start + Duration::from_millis(499)));
        assert!(d.poll(start + Duration::from_millis(500)));
        assert!(!d.poll(start + Duration::from_millis(900)));
    }

    #[test]
    fn test_debouncer_resets_on_new_event() {
        let start = Instant::now();
        let mut d = Debouncer::new(Duration::from_millis(500));

        d.event(start);
        d.event(start + Duration::from_millis(400));
        assert!(!d.poll(start + Duration::from_millis(600)));
        assert!(d.poll(start + Duration::from_millis(900)));
    }

    #[test]
    fn test_error_throttle_caps_per_window() {
        let start = Instant::now();
        let mut t = ErrorThrottle::new(2, Duration::from_secs(10));

        assert_eq!(t.allow(start), (true, 0));
        assert_eq!(t.allow(start + Duration::from_secs(1)), (true, 0));
        assert_eq!(t.allow(start + Duration::from_secs(2)), (false, 0));
        assert_eq!(t.allow(start + Duration::from_secs(3)), (false, 0));

        // new window reports what was swallowed
        assert_eq!(t.allow(start + Duration::from_secs(11)), (true, 2));
    }

    #[test]
    fn test_is_catalog_event_filters_by_name() {
        let name = OsString::from("es_systems.xml");

        let hit = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/etc/es/es_systems.xml"));
        let miss = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/etc/es/es_settings.cfg"));
        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/etc/es/es_systems.xml"));

        assert!(is_catalog_event(&hit, &name));
        assert!(!is_catalog_event(&miss, &name));
        assert!(!is_catalog_event(&access, &name));
    }

    #[test]
    fn test_watcher_reports_burst_once() {
        let dir = TempDir::new().unwrap();
        let catalog = dir.path().join("es_systems.xml");
        std::fs::write(&catalog, "<systemList/>").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let options = WatchOptions {
            debounce: Duration::from_millis(300),
            ..Default::default()
        };

        let mut watcher = CatalogWatcher::start(&catalog, options, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert!(watcher.is_running());

        for i in 0..3 {
            std::fs::write(&catalog, format!("<systemList><!-- {} --></systemList>", i)).unwrap();
            thread::sleep(Duration::from_millis(20));
        }

        let deadline = Instant::now() + Duration::from_secs(10);
        while calls.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }
        // let any stray trailing callback surface before asserting
        thread::sleep(Duration::from_millis(600));

        watcher.stop();
        assert!(!watcher.is_running());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_watcher_rejects_bare_root() {
        let result = CatalogWatcher::start(Path::new("/"), WatchOptions::default(), || {});
        assert!(matches!(result, Err(StorageError::WatchFailed(_))));
    }
}
