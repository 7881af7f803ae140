// =============================================================================
// Reload coordinator — file-watch loop with publish-on-change
// =============================================================================
//
// One watcher per watched artifact. The loop polls the file's modification
// timestamp at a fixed interval; when it changes, the owner's callback runs
// (load + validate + swap + notify). The callback returning an error must not
// disturb the active artifact — that contract belongs to the owner.
//
// Stopping is condvar-signalled so `stop()` returns well within one poll
// interval. Enable/disable on the owning component is idempotent: enabling
// twice replaces the previous watcher, disabling twice is a no-op.
// =============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

impl StopSignal {
    fn new() -> Self {
        Self {
            stopped: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Wait up to `timeout`. Returns true when a stop was requested.
    fn wait(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if *stopped {
            return true;
        }
        self.condvar.wait_for(&mut stopped, timeout);
        *stopped
    }

    fn raise(&self) {
        *self.stopped.lock() = true;
        self.condvar.notify_all();
    }
}

/// Background watcher for a single file artifact.
///
/// Dropping the watcher stops the thread.
pub struct FileWatcher {
    path: PathBuf,
    stop: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl FileWatcher {
    /// Spawn a watcher thread polling `path` every `interval`.
    ///
    /// `on_change` runs on the watcher thread each time the modification
    /// timestamp differs from the last observed one. The first observation is
    /// taken at spawn so a pre-existing file does not fire immediately.
    pub fn spawn<F>(path: impl Into<PathBuf>, interval: Duration, on_change: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let path = path.into();
        let stop = Arc::new(StopSignal::new());

        let thread_path = path.clone();
        let thread_stop = stop.clone();
        let handle = std::thread::spawn(move || {
            let mut last_mtime = mtime_of(&thread_path);
            debug!(path = %thread_path.display(), ?interval, "file watcher started");

            loop {
                if thread_stop.wait(interval) {
                    break;
                }

                match mtime_of(&thread_path) {
                    Some(mtime) if last_mtime != Some(mtime) => {
                        debug!(path = %thread_path.display(), "change detected");
                        last_mtime = Some(mtime);
                        on_change();
                    }
                    Some(_) => {}
                    None => {
                        // File missing or unreadable — keep the last known
                        // mtime so reappearance triggers a reload.
                        warn!(path = %thread_path.display(), "watched file not readable");
                    }
                }
            }

            debug!(path = %thread_path.display(), "file watcher stopped");
        });

        Self {
            path,
            stop,
            handle: Some(handle),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Signal the watcher thread and join it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.raise();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn mtime_of(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scratch_file(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("meridian-watch-{}-{}", std::process::id(), name));
        path
    }

    #[test]
    fn fires_on_modification() {
        let path = scratch_file("fires");
        std::fs::write(&path, "v1").unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let watcher = FileWatcher::spawn(&path, Duration::from_millis(20), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Ensure the mtime actually advances on coarse-grained filesystems.
        std::thread::sleep(Duration::from_millis(1100));
        std::fs::write(&path, "v2").unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        while fired.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(fired.load(Ordering::SeqCst) >= 1, "watcher never fired");

        watcher.stop();
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn does_not_fire_without_change() {
        let path = scratch_file("quiet");
        std::fs::write(&path, "stable").unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let watcher = FileWatcher::spawn(&path, Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        watcher.stop();
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn stop_returns_promptly() {
        let path = scratch_file("stop");
        std::fs::write(&path, "x").unwrap();

        let watcher = FileWatcher::spawn(&path, Duration::from_secs(3600), || {});
        let started = std::time::Instant::now();
        watcher.stop();
        assert!(
            started.elapsed() < Duration::from_secs(1),
            "stop blocked for a full poll interval"
        );

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_does_not_panic() {
        let path = scratch_file("missing");
        let _ = std::fs::remove_file(&path);
        let watcher = FileWatcher::spawn(&path, Duration::from_millis(10), || {});
        std::thread::sleep(Duration::from_millis(50));
        watcher.stop();
    }
}
