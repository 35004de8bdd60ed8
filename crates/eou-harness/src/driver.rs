//! Record-driven exerciser for owning slots.
//!
//! Reads native-endian 8-byte signed records and stores each one in a slot
//! table. Every record is decoded through a [`ReseatRef`] reinterpreted from
//! the raw record buffer under the configured [`SafetyLevel`]. The first
//! `stack_slots` values are written into a stack-resident region and stored
//! as [`SlotValue::BorrowedStack`]; for the rest the record bytes are
//! promoted to the heap and stored as [`SlotValue::OwnedHeap`].
//!
//! Reading stops at the first negative record, at end of input, or when the
//! table is full. A short trailing record is policy-dependent: strict runs
//! reject it and stop, tolerant runs decode it zero-padded and keep going.
//! Teardown releases every heap slot through the slot itself and audits each
//! acquisition and release against an [`OwnershipLedger`].

#![allow(unsafe_code)]

use std::ffi::c_void;
use std::io::{self, Read, Write};

use serde::{Serialize, Serializer};
use serde_json::json;

use eou_core::{EouError, OwnershipLedger, ReseatRef, SafetyLevel, SlotValue, promote_with};

use crate::error::DriverError;
use crate::structured_log::{LogEmitter, LogLevel, Storage};

/// Bytes per input record.
pub const RECORD_SIZE: usize = 8;
/// Default slot table size.
pub const DEFAULT_CAPACITY: usize = 1024;
/// Default number of leading records kept in stack storage.
pub const DEFAULT_STACK_SLOTS: usize = 50;
/// Size of the stack region backing `BorrowedStack` slots.
pub const STACK_REGION_SLOTS: usize = 256;

/// Driver run parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    pub capacity: usize,
    pub stack_slots: usize,
    pub mode: SafetyLevel,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            stack_slots: DEFAULT_STACK_SLOTS,
            mode: SafetyLevel::default(),
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.capacity == 0 {
            return Err(DriverError::Config("capacity must be at least 1".into()));
        }
        if self.stack_slots > STACK_REGION_SLOTS {
            return Err(DriverError::Config(format!(
                "stack_slots {} exceeds the {STACK_REGION_SLOTS}-slot stack region",
                self.stack_slots
            )));
        }
        Ok(())
    }
}

/// One input record, aligned for an in-place `i64` view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C, align(8))]
pub struct RecordBuf {
    pub bytes: [u8; RECORD_SIZE],
}

impl RecordBuf {
    fn as_mut_ptr(&mut self) -> *mut c_void {
        self.bytes.as_mut_ptr().cast::<c_void>()
    }
}

/// Fill `record` from `input`, retrying short reads until a full record or
/// EOF. Returns the number of bytes read; unread bytes keep their value.
pub fn read_record<R: Read>(input: &mut R, record: &mut RecordBuf) -> io::Result<usize> {
    let mut filled = 0;
    while filled < RECORD_SIZE {
        match input.read(&mut record.bytes[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Decode the first `filled` bytes of `record` as an `i64` under `level`.
///
/// Strict rejects a short record; tolerant reads the full buffer, so missing
/// bytes decode as whatever `record` already held.
pub fn decode_record(
    level: SafetyLevel,
    record: &mut RecordBuf,
    filled: usize,
) -> Result<i64, EouError> {
    // SAFETY: the buffer is 8-aligned and initialized for RECORD_SIZE bytes,
    // every bit pattern is a valid i64, and the view does not outlive
    // `record`'s borrow.
    let view =
        unsafe { ReseatRef::<i64>::reinterpret_with(level, record.as_mut_ptr(), filled) }?;
    view.map(|view| view.get()).ok_or(EouError::InvalidArgument {
        operation: "decode_record",
        reason: "null record buffer",
    })
}

/// Copy the record bytes to the heap under `level` and read the value back.
fn promote_record(level: SafetyLevel, record: &RecordBuf) -> Result<i64, EouError> {
    // SAFETY: the record is readable for RECORD_SIZE bytes.
    let source = record.bytes.as_ptr().cast::<c_void>();
    let block = unsafe { promote_with(level, source, RECORD_SIZE) }?;
    // SAFETY: any RECORD_SIZE bytes form a valid i64.
    block
        .and_then(|block| unsafe { block.read_as::<i64>() })
        .ok_or(EouError::InvalidArgument {
            operation: "promote_record",
            reason: "no block for a non-null record",
        })
}

/// Why the driver stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    NegativeRecord,
    EndOfInput,
    TruncatedRecord,
    CapacityReached,
}

/// Ledger totals at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerReport {
    pub acquisitions: u64,
    pub releases: u64,
    pub outstanding: usize,
}

/// Machine-readable run summary.
#[derive(Debug, Clone, Serialize)]
pub struct DriverReport {
    #[serde(serialize_with = "serialize_level")]
    pub mode: SafetyLevel,
    pub stop_reason: StopReason,
    pub records_stored: usize,
    /// Short trailing records decoded zero-padded (tolerant runs only).
    pub records_padded: usize,
    pub stack_slots: usize,
    pub heap_slots: usize,
    pub heap_released: usize,
    pub sum: i128,
    pub ledger: LedgerReport,
}

fn serialize_level<S: Serializer>(
    level: &SafetyLevel,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(level.as_str())
}

impl DriverReport {
    /// Every heap value was released exactly once and nothing is still held.
    #[must_use]
    pub fn audit_passed(&self) -> bool {
        self.ledger.outstanding == 0
            && self.ledger.acquisitions == self.ledger.releases
            && self.heap_released == self.heap_slots
    }
}

/// Run the driver over `input`, logging lifecycle events to `log`.
pub fn run<R: Read, W: Write>(
    mut input: R,
    config: &DriverConfig,
    log: &mut LogEmitter<W>,
) -> Result<DriverReport, DriverError> {
    config.validate()?;
    let mode = config.mode.as_str();
    let ledger = OwnershipLedger::new();

    let entry = log
        .entry(LogLevel::Info, "run_start")
        .with_mode(mode)
        .with_details(json!({
            "capacity": config.capacity,
            "stack_slots": config.stack_slots,
        }));
    log.emit_entry(entry)?;

    let mut stack_region = [0_i64; STACK_REGION_SLOTS];
    let mut stack_cells = stack_region[..config.stack_slots].iter_mut();
    let mut slots: Vec<SlotValue<'_, i64>> = Vec::with_capacity(config.capacity);

    let mut records_padded = 0;
    let stop_reason = loop {
        if slots.len() >= config.capacity {
            break StopReason::CapacityReached;
        }
        let mut record = RecordBuf::default();
        let filled = read_record(&mut input, &mut record)?;
        if filled == 0 {
            break StopReason::EndOfInput;
        }
        let value = match decode_record(config.mode, &mut record, filled) {
            Ok(value) => value,
            Err(err) if filled < RECORD_SIZE => {
                let entry = log
                    .entry(LogLevel::Warn, "record_rejected")
                    .with_mode(mode)
                    .with_details(json!({
                        "bytes": filled,
                        "expected": RECORD_SIZE,
                        "error": err.to_string(),
                    }));
                log.emit_entry(entry)?;
                break StopReason::TruncatedRecord;
            }
            Err(err) => return Err(DriverError::Rejected(err)),
        };
        if filled < RECORD_SIZE {
            records_padded += 1;
            let entry = log
                .entry(LogLevel::Warn, "record_padded")
                .with_mode(mode)
                .with_value(value)
                .with_details(json!({ "bytes": filled, "expected": RECORD_SIZE }));
            log.emit_entry(entry)?;
        }
        if value < 0 {
            break StopReason::NegativeRecord;
        }

        let index = slots.len();
        let slot = match stack_cells.next() {
            Some(cell) => {
                *cell = value;
                SlotValue::stack(cell)
            }
            None => {
                let promoted =
                    promote_record(config.mode, &record).map_err(DriverError::Rejected)?;
                let slot = SlotValue::heap(promoted);
                ledger.record_acquire(slot.as_ptr())?;
                slot
            }
        };
        let storage = if slot.is_heap() {
            Storage::OwnedHeap
        } else {
            Storage::BorrowedStack
        };
        let entry = log
            .entry(LogLevel::Debug, "slot_store")
            .with_slot(index, storage)
            .with_addr(slot.as_ptr())
            .with_value(value);
        log.emit_entry(entry)?;
        slots.push(slot);
    };

    let sum: i128 = slots
        .iter()
        .filter_map(|slot| slot.get())
        .map(|&v| i128::from(v))
        .sum();
    let stack_slots = slots.iter().filter(|slot| !slot.is_heap()).count();
    let heap_slots = slots.len() - stack_slots;

    let mut heap_released = 0;
    for (index, slot) in slots.iter_mut().enumerate() {
        let addr = slot.as_ptr();
        if slot.release() {
            ledger.record_release(addr)?;
            heap_released += 1;
            let entry = log
                .entry(LogLevel::Debug, "slot_release")
                .with_slot(index, Storage::OwnedHeap)
                .with_addr(addr);
            log.emit_entry(entry)?;
        }
    }
    let records_stored = slots.len();
    drop(slots);

    let summary = ledger.summary();
    let report = DriverReport {
        mode: config.mode,
        stop_reason,
        records_stored,
        records_padded,
        stack_slots,
        heap_slots,
        heap_released,
        sum,
        ledger: LedgerReport {
            acquisitions: summary.acquisitions,
            releases: summary.releases,
            outstanding: summary.outstanding,
        },
    };

    let level = if report.audit_passed() {
        LogLevel::Info
    } else {
        LogLevel::Error
    };
    let entry = log
        .entry(level, "run_end")
        .with_mode(mode)
        .with_details(serde_json::to_value(&report)?);
    log.emit_entry(entry)?;
    log.flush()?;

    Ok(report)
}
