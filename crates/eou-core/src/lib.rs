//! Manual-ownership primitives over raw memory.
//!
//! Three independent leaf components:
//! - **Owning slot** (`slot`): move-only owner of a nullable heap pointer,
//!   released exactly once. [`SlotValue`] separates heap-owned from
//!   stack-borrowed storage.
//! - **Reseatable reference** (`reference`): non-owning handle that can be
//!   pointed elsewhere and writes through to its referent.
//! - **Promoter** (`promote`): copies a byte block to a caller-owned heap
//!   block.
//!
//! Ambient pieces:
//! - **Configuration** (`config`): null/invalid-argument policy
//! - **Errors** (`error`): [`EouError`]
//! - **Metrics** (`metrics`): atomic counters for observability
//! - **Ledger** (`ledger`): ownership audit for drivers and tests
//!
//! Nothing here is thread-safe, reference-counted, or serializable.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod promote;
pub mod reference;
pub mod slot;

pub use config::{SafetyLevel, safety_level, set_safety_level};
pub use error::EouError;
pub use ledger::{LedgerSummary, OwnershipLedger, OwnershipState};
pub use metrics::{MetricsSnapshot, OwnershipMetrics, global_metrics};
pub use promote::{BLOCK_ALIGN, HeapBlock, promote, promote_bytes, promote_with};
pub use reference::ReseatRef;
pub use slot::{OwnedSlot, SlotValue};
