//! Atomic counters for ownership observability.
//!
//! All counters use relaxed ordering. They are diagnostic only and never
//! synchronize other memory.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global ownership operation counters.
pub struct OwnershipMetrics {
    /// Slots that took ownership of a non-null value.
    pub slots_acquired: AtomicU64,
    /// Non-null values released by a slot.
    pub slots_released: AtomicU64,
    /// Non-null values handed back out of a slot (`into_box`/`into_raw`).
    pub slots_relinquished: AtomicU64,
    /// Heap blocks produced by the promoter.
    pub blocks_promoted: AtomicU64,
    /// Heap blocks released (drop or `release_raw`).
    pub blocks_released: AtomicU64,
    /// Null sources answered with "no block" under the tolerant policy.
    pub null_sources_tolerated: AtomicU64,
    /// Arguments rejected under the strict policy.
    pub invalid_arguments: AtomicU64,
    /// Untyped pointers reinterpreted as typed references.
    pub reinterpretations: AtomicU64,
}

impl OwnershipMetrics {
    /// Create a new zeroed metrics instance.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots_acquired: AtomicU64::new(0),
            slots_released: AtomicU64::new(0),
            slots_relinquished: AtomicU64::new(0),
            blocks_promoted: AtomicU64::new(0),
            blocks_released: AtomicU64::new(0),
            null_sources_tolerated: AtomicU64::new(0),
            invalid_arguments: AtomicU64::new(0),
            reinterpretations: AtomicU64::new(0),
        }
    }

    /// Increment a counter by 1.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read a counter value.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Snapshot all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            slots_acquired: Self::get(&self.slots_acquired),
            slots_released: Self::get(&self.slots_released),
            slots_relinquished: Self::get(&self.slots_relinquished),
            blocks_promoted: Self::get(&self.blocks_promoted),
            blocks_released: Self::get(&self.blocks_released),
            null_sources_tolerated: Self::get(&self.null_sources_tolerated),
            invalid_arguments: Self::get(&self.invalid_arguments),
            reinterpretations: Self::get(&self.reinterpretations),
        }
    }
}

impl Default for OwnershipMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of all ownership counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub slots_acquired: u64,
    pub slots_released: u64,
    pub slots_relinquished: u64,
    pub blocks_promoted: u64,
    pub blocks_released: u64,
    pub null_sources_tolerated: u64,
    pub invalid_arguments: u64,
    pub reinterpretations: u64,
}

impl MetricsSnapshot {
    /// Slot values acquired but not yet released.
    #[must_use]
    pub fn live_slots(&self) -> u64 {
        self.slots_acquired
            .saturating_sub(self.slots_released)
            .saturating_sub(self.slots_relinquished)
    }

    /// Heap blocks promoted but not yet released.
    #[must_use]
    pub fn live_blocks(&self) -> u64 {
        self.blocks_promoted.saturating_sub(self.blocks_released)
    }
}

/// Global metrics instance.
static GLOBAL_METRICS: OwnershipMetrics = OwnershipMetrics::new();

/// Access the global metrics singleton.
#[must_use]
pub fn global_metrics() -> &'static OwnershipMetrics {
    &GLOBAL_METRICS
}
