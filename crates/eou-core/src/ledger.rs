//! Ownership ledger for auditing callers.
//!
//! The primitives never consult the ledger. Drivers and tests record each
//! acquisition and release they perform and the ledger reports the two
//! violations the primitives cannot see: an address acquired by a second
//! owner while still held, and an address released twice.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::EouError;

/// Lifecycle state of a recorded address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipState {
    /// Address has never been recorded.
    Unknown,
    /// Address is held by exactly one owner.
    Held,
    /// Address has been released and not re-acquired.
    Released,
}

/// Ledger entry for one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    pub addr: usize,
    /// Bumped on every acquisition; the allocator may hand an address out
    /// again after it is released.
    pub generation: u64,
    pub state: OwnershipState,
    pub releases: u64,
}

/// Totals over the whole ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    pub acquisitions: u64,
    pub releases: u64,
    /// Addresses still held.
    pub outstanding: usize,
}

/// Address-keyed ownership ledger.
#[derive(Debug, Default)]
pub struct OwnershipLedger {
    entries: RwLock<HashMap<usize, LedgerEntry>>,
}

impl OwnershipLedger {
    /// Create a new empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that an owner took `ptr`. Null is ignored.
    pub fn record_acquire<T>(&self, ptr: *const T) -> Result<(), EouError> {
        let addr = ptr as usize;
        if addr == 0 {
            return Ok(());
        }
        let mut entries = self.entries.write();
        let entry = entries.entry(addr).or_insert(LedgerEntry {
            addr,
            generation: 0,
            state: OwnershipState::Unknown,
            releases: 0,
        });
        if entry.state == OwnershipState::Held {
            return Err(EouError::AlreadyHeld { addr });
        }
        entry.state = OwnershipState::Held;
        entry.generation = entry.generation.saturating_add(1);
        Ok(())
    }

    /// Record that the owner of `ptr` released it. Null is ignored.
    pub fn record_release<T>(&self, ptr: *const T) -> Result<(), EouError> {
        let addr = ptr as usize;
        if addr == 0 {
            return Ok(());
        }
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(&addr) else {
            return Err(EouError::UnknownRelease { addr });
        };
        match entry.state {
            OwnershipState::Held => {
                entry.state = OwnershipState::Released;
                entry.releases = entry.releases.saturating_add(1);
                Ok(())
            }
            OwnershipState::Released => Err(EouError::DoubleRelease { addr }),
            OwnershipState::Unknown => Err(EouError::UnknownRelease { addr }),
        }
    }

    /// Current state of `ptr`.
    #[must_use]
    pub fn state_of<T>(&self, ptr: *const T) -> OwnershipState {
        self.lookup(ptr)
            .map_or(OwnershipState::Unknown, |entry| entry.state)
    }

    /// Ledger entry for `ptr`, if recorded.
    #[must_use]
    pub fn lookup<T>(&self, ptr: *const T) -> Option<LedgerEntry> {
        self.entries.read().get(&(ptr as usize)).copied()
    }

    /// Addresses still held, in ascending order.
    #[must_use]
    pub fn outstanding(&self) -> Vec<usize> {
        let mut held: Vec<usize> = self
            .entries
            .read()
            .values()
            .filter(|entry| entry.state == OwnershipState::Held)
            .map(|entry| entry.addr)
            .collect();
        held.sort_unstable();
        held
    }

    #[must_use]
    pub fn summary(&self) -> LedgerSummary {
        let entries = self.entries.read();
        entries
            .values()
            .fold(LedgerSummary::default(), |mut summary, entry| {
                summary.acquisitions += entry.generation;
                summary.releases += entry.releases;
                if entry.state == OwnershipState::Held {
                    summary.outstanding += 1;
                }
                summary
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_until_recorded() {
        let ledger = OwnershipLedger::new();
        let local = 7_u8;
        assert_eq!(ledger.state_of(&local as *const u8), OwnershipState::Unknown);
        assert!(ledger.lookup(&local as *const u8).is_none());
    }

    #[test]
    fn acquire_release_cycle() {
        let ledger = OwnershipLedger::new();
        let value = Box::new(1_i64);
        let ptr: *const i64 = &*value;

        ledger.record_acquire(ptr).expect("acquire");
        assert_eq!(ledger.state_of(ptr), OwnershipState::Held);
        assert_eq!(ledger.outstanding(), vec![ptr as usize]);

        ledger.record_release(ptr).expect("release");
        assert_eq!(ledger.state_of(ptr), OwnershipState::Released);
        assert!(ledger.outstanding().is_empty());

        let summary = ledger.summary();
        assert_eq!(summary.acquisitions, 1);
        assert_eq!(summary.releases, 1);
        assert_eq!(summary.outstanding, 0);
    }

    #[test]
    fn second_owner_is_rejected() {
        let ledger = OwnershipLedger::new();
        let value = 3_u32;
        let ptr: *const u32 = &value;
        ledger.record_acquire(ptr).expect("first owner");
        assert_eq!(
            ledger.record_acquire(ptr),
            Err(EouError::AlreadyHeld { addr: ptr as usize })
        );
    }

    #[test]
    fn double_and_unknown_release_are_reported() {
        let ledger = OwnershipLedger::new();
        let a = 1_u8;
        let b = 2_u8;
        let pa: *const u8 = &a;
        let pb: *const u8 = &b;

        assert_eq!(
            ledger.record_release(pb),
            Err(EouError::UnknownRelease { addr: pb as usize })
        );

        ledger.record_acquire(pa).expect("acquire");
        ledger.record_release(pa).expect("release");
        assert_eq!(
            ledger.record_release(pa),
            Err(EouError::DoubleRelease { addr: pa as usize })
        );
    }

    #[test]
    fn reacquired_address_bumps_generation() {
        let ledger = OwnershipLedger::new();
        let value = 0_u16;
        let ptr: *const u16 = &value;
        for _ in 0..3 {
            ledger.record_acquire(ptr).expect("acquire");
            ledger.record_release(ptr).expect("release");
        }
        let entry = ledger.lookup(ptr).expect("recorded");
        assert_eq!(entry.generation, 3);
        assert_eq!(entry.releases, 3);
    }

    #[test]
    fn null_is_ignored() {
        let ledger = OwnershipLedger::new();
        ledger.record_acquire(std::ptr::null::<u8>()).expect("null acquire");
        ledger.record_release(std::ptr::null::<u8>()).expect("null release");
        assert_eq!(ledger.summary(), LedgerSummary::default());
    }
}
