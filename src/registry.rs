//! Process-global context registry
//!
//! Maps an execution context (the calling thread) to its own lazily-created
//! [`SpanTracker`], so the common one-tracker-per-thread case needs no
//! plumbing. All trackers share the clock and export callbacks from the
//! config passed to [`init`].
//!
//! The registry replaces ambient mutable global state with an explicit
//! lifecycle: [`init`] exactly once, [`teardown`] to drop it (test
//! isolation). Using it outside that window is a contract violation and
//! panics. First access from multiple threads is race-free: the shared
//! config sits behind a `RwLock` and each tracker lives in thread-local
//! storage, so no tracker is ever constructed twice for one thread.

use crate::tracker::{SpanTracker, TrackerConfig};
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

static REGISTRY: RwLock<Option<TrackerConfig>> = RwLock::new(None);

/// Bumped on every init and teardown; cached per-thread trackers from an
/// earlier generation are discarded on next access.
static GENERATION: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static CURRENT: RefCell<Option<(u64, SpanTracker)>> = const { RefCell::new(None) };
}

fn read_lock() -> RwLockReadGuard<'static, Option<TrackerConfig>> {
    // A poisoning panic here can only come from a registry misuse assert,
    // which leaves the data consistent.
    REGISTRY.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock() -> RwLockWriteGuard<'static, Option<TrackerConfig>> {
    REGISTRY.write().unwrap_or_else(PoisonError::into_inner)
}

/// Initialize the global registry with the shared tracker configuration
///
/// # Panics
///
/// Panics if the registry is already initialized.
pub fn init(config: TrackerConfig) {
    let mut registry = write_lock();
    if registry.is_some() {
        drop(registry);
        panic!("context registry initialized twice (call teardown first)");
    }
    GENERATION.fetch_add(1, Ordering::SeqCst);
    *registry = Some(config);
    tracing::debug!("context registry initialized");
}

/// Drop the global registry, invalidating every per-thread tracker
///
/// Typically only needed by tests; the registry is otherwise reusable for
/// the life of the process.
///
/// # Panics
///
/// Panics if the registry was never initialized.
pub fn teardown() {
    let mut registry = write_lock();
    if registry.is_none() {
        drop(registry);
        panic!("context registry teardown without init");
    }
    GENERATION.fetch_add(1, Ordering::SeqCst);
    *registry = None;
    tracing::debug!("context registry torn down");
}

/// Whether the registry is currently initialized
pub fn is_initialized() -> bool {
    read_lock().is_some()
}

/// Run `f` with the calling thread's tracker, creating it on first access
///
/// Reentrant calls from within `f` are not supported: the tracker is held
/// exclusively for the duration of the closure.
///
/// # Panics
///
/// Panics if the registry is not initialized.
pub fn with_current<R>(f: impl FnOnce(&mut SpanTracker) -> R) -> R {
    let generation = {
        let registry = read_lock();
        if registry.is_none() {
            drop(registry);
            panic!("context registry queried before initialization");
        }
        GENERATION.load(Ordering::SeqCst)
    };

    CURRENT.with(|cell| {
        let mut slot = cell.borrow_mut();
        let stale = !matches!(&*slot, Some((cached, _)) if *cached == generation);
        if stale {
            let config = read_lock()
                .clone()
                .unwrap_or_else(|| panic!("context registry torn down mid-access"));
            *slot = Some((generation, SpanTracker::new(config)));
        }
        let (_, tracker) = slot.as_mut().unwrap();
        f(tracker)
    })
}
