//! Process-wide registry of live file mappings
//!
//! When enabled, every successful [`MMapBuffer`](super::MMapBuffer) open
//! registers a weak handle to its mapping and every close removes it. A
//! broadcast walks the registry under the read lock; registration and
//! removal take the write lock, so a mapping is never unmapped while a
//! broadcast is touching it.
//!
//! The initial state comes from [`MmapConfig::global`]; tests and embedders
//! can flip it with [`set_tracking_enabled`].

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::{Arc, LazyLock, Weak};

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::config::MmapConfig;
use crate::syscalls::{self, Advice};

/// Page-aligned extent of one mapping
#[derive(Debug)]
pub(crate) struct MappingHandle {
    pub(crate) addr: NonNull<u8>,
    pub(crate) len: usize,
}

// SAFETY: the handle carries only the address and length of a mapping. It is
// dereferenced solely by madvise under the registry lock, which the owning
// buffer also takes before unmapping.
unsafe impl Send for MappingHandle {}
unsafe impl Sync for MappingHandle {}

struct Registry {
    enabled: bool,
    next_id: u64,
    mappings: HashMap<u64, Weak<MappingHandle>>,
}

static REGISTRY: LazyLock<RwLock<Registry>> = LazyLock::new(|| {
    RwLock::new(Registry {
        enabled: MmapConfig::global().tracking_enabled,
        next_id: 0,
        mappings: HashMap::new(),
    })
});

/// Outcome of a broadcast over the tracked mappings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastSummary {
    /// Mappings the advice was applied to
    pub advised: usize,
    /// Mappings where the advice failed
    pub failed: usize,
}

/// Turn the registry on or off.
///
/// Turning it off forgets every tracked mapping; mappings opened while it is
/// off are never tracked.
pub fn set_tracking_enabled(enabled: bool) {
    let mut registry = REGISTRY.write();
    registry.enabled = enabled;
    if !enabled {
        registry.mappings.clear();
    }
    debug!(enabled, "mapping tracking toggled");
}

pub fn is_tracking_enabled() -> bool {
    REGISTRY.read().enabled
}

/// Number of tracked mappings that are still open
pub fn tracked_mappings() -> usize {
    REGISTRY
        .read()
        .mappings
        .values()
        .filter(|weak| weak.strong_count() > 0)
        .count()
}

pub(crate) fn register(handle: &Arc<MappingHandle>) -> Option<u64> {
    let mut registry = REGISTRY.write();
    if !registry.enabled {
        return None;
    }
    let id = registry.next_id;
    registry.next_id += 1;
    registry.mappings.insert(id, Arc::downgrade(handle));
    trace!(id, length = handle.len, "mapping tracked");
    Some(id)
}

/// Whether `id` is still in the registry; a disable in between drops it
pub(crate) fn is_registered(id: u64) -> bool {
    REGISTRY.read().mappings.contains_key(&id)
}

pub(crate) fn deregister(id: u64) {
    if REGISTRY.write().mappings.remove(&id).is_some() {
        trace!(id, "mapping untracked");
    }
}

/// Advise "don't need" on every tracked mapping.
///
/// Failures on individual mappings are logged and counted; they never stop
/// the batch.
pub(crate) fn advise_dont_need_all() -> BroadcastSummary {
    let registry = REGISTRY.read();
    let mut summary = BroadcastSummary::default();

    for (id, weak) in &registry.mappings {
        let Some(handle) = weak.upgrade() else {
            continue;
        };
        // SAFETY: the owning buffer removes the entry under the write lock
        // before unmapping, so a handle reachable here is still mapped.
        match unsafe { syscalls::memory_advise(handle.addr, handle.len, Advice::DontNeed) } {
            Ok(()) => summary.advised += 1,
            Err(err) => {
                warn!(id, length = handle.len, error = %err, "madvise(DONTNEED) failed");
                summary.failed += 1;
            }
        }
    }

    debug!(advised = summary.advised, failed = summary.failed, "tracked mappings advised");
    summary
}
