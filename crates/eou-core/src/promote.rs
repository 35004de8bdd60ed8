//! Stack-to-heap promotion of fixed-size byte blocks.
//!
//! [`promote`] copies `size` bytes from a (typically stack-resident) source
//! into a fresh heap allocation and hands the resulting [`HeapBlock`] to the
//! caller. The block releases itself on drop; callers that need a raw
//! pointer take one with [`HeapBlock::into_raw`] and must pair it with exactly
//! one [`HeapBlock::release_raw`].
//!
//! A null source never reaches the copy: it yields `Ok(None)` under
//! [`SafetyLevel::Tolerant`] and `Err(InvalidArgument)` under
//! [`SafetyLevel::Strict`]. Allocator failure is fatal
//! (`std::alloc::handle_alloc_error`).

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ffi::c_void;
use std::fmt;
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};
use std::slice;

use crate::config::{SafetyLevel, safety_level};
use crate::error::EouError;
use crate::metrics::{OwnershipMetrics, global_metrics};

/// Alignment of every promoted block (the malloc guarantee on 64-bit targets).
pub const BLOCK_ALIGN: usize = 16;

/// Caller-owned heap copy of a byte block.
pub struct HeapBlock {
    ptr: NonNull<u8>,
    len: usize,
}

impl HeapBlock {
    fn layout(len: usize) -> Result<Layout, EouError> {
        Layout::from_size_align(len, BLOCK_ALIGN).map_err(|_| EouError::InvalidLayout {
            size: len,
            align: BLOCK_ALIGN,
        })
    }

    const fn empty() -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
        }
    }

    /// Allocate `len` bytes and copy them from `source`.
    ///
    /// # Safety
    ///
    /// `source` must be valid for reads of `len` initialized bytes.
    unsafe fn copy_from(source: NonNull<u8>, len: usize) -> Result<Self, EouError> {
        if len == 0 {
            return Ok(Self::empty());
        }
        let layout = Self::layout(len)?;
        // SAFETY: `layout` has non-zero size.
        let raw = unsafe { alloc::alloc(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };
        // SAFETY: the source is readable for `len` bytes (caller contract),
        // the fresh allocation is writable for `len` bytes, and the two
        // cannot overlap.
        unsafe { ptr::copy_nonoverlapping(source.as_ptr(), ptr.as_ptr(), len) };
        OwnershipMetrics::inc(&global_metrics().blocks_promoted);
        Ok(Self { ptr, len })
    }

    /// Number of bytes in the block.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr().cast_const()
    }

    #[must_use]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr` is valid for `len` initialized bytes (dangling and
        // aligned when `len == 0`).
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as in `as_slice`, with exclusive access through `&mut self`.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Read the leading bytes back as a `T`. `None` if the block is shorter
    /// than `T`.
    ///
    /// # Safety
    ///
    /// The first `size_of::<T>()` bytes must be a valid `T`, e.g. because they
    /// were promoted from one.
    #[must_use]
    pub unsafe fn read_as<T: Copy>(&self) -> Option<T> {
        if self.len < size_of::<T>() {
            return None;
        }
        // SAFETY: in bounds (checked above), validity per caller contract.
        Some(unsafe { self.ptr.as_ptr().cast::<T>().read_unaligned() })
    }

    /// Hand the allocation to the caller as `(ptr, len)`. An empty block
    /// yields a null pointer. Release it with [`HeapBlock::release_raw`].
    #[must_use = "the returned pointer must be released exactly once"]
    pub fn into_raw(self) -> (*mut u8, usize) {
        let block = ManuallyDrop::new(self);
        if block.len == 0 {
            return (ptr::null_mut(), 0);
        }
        (block.ptr.as_ptr(), block.len)
    }

    /// Reclaim a block from [`HeapBlock::into_raw`]. A null `ptr` or zero
    /// `len` gives an empty block that owns nothing.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` with non-zero `len` must be an unreleased
    /// `(ptr, len)` pair produced by [`HeapBlock::into_raw`].
    #[must_use]
    pub unsafe fn from_raw(ptr: *mut u8, len: usize) -> Self {
        match NonNull::new(ptr) {
            Some(ptr) if len > 0 => Self { ptr, len },
            _ => Self::empty(),
        }
    }

    /// Release a raw block. Null or zero-length input is a no-op.
    ///
    /// # Safety
    ///
    /// Same as [`HeapBlock::from_raw`]; the pair must not be used afterwards.
    pub unsafe fn release_raw(ptr: *mut u8, len: usize) {
        // SAFETY: forwarded caller contract.
        drop(unsafe { Self::from_raw(ptr, len) });
    }
}

impl Drop for HeapBlock {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        if let Ok(layout) = Self::layout(self.len) {
            // SAFETY: `ptr` was allocated in `copy_from` with this layout and
            // the block is its only owner.
            unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) };
            OwnershipMetrics::inc(&global_metrics().blocks_released);
        }
    }
}

impl fmt::Debug for HeapBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapBlock")
            .field("addr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

/// Promote an initialized byte slice to the heap.
pub fn promote_bytes(source: &[u8]) -> Result<HeapBlock, EouError> {
    let ptr = NonNull::from(source).cast::<u8>();
    // SAFETY: a slice is readable for its length.
    unsafe { HeapBlock::copy_from(ptr, source.len()) }
}

/// Promote `size` bytes at `source` to the heap, under the process-wide
/// [`SafetyLevel`].
///
/// # Safety
///
/// A non-null `source` must be valid for reads of `size` initialized bytes.
pub unsafe fn promote(source: *const c_void, size: usize) -> Result<Option<HeapBlock>, EouError> {
    // SAFETY: forwarded caller contract.
    unsafe { promote_with(safety_level(), source, size) }
}

/// [`promote`] with an explicit policy.
///
/// # Safety
///
/// See [`promote`].
pub unsafe fn promote_with(
    level: SafetyLevel,
    source: *const c_void,
    size: usize,
) -> Result<Option<HeapBlock>, EouError> {
    let Some(source) = NonNull::new(source.cast_mut().cast::<u8>()) else {
        let metrics = global_metrics();
        if level.rejects_invalid() {
            OwnershipMetrics::inc(&metrics.invalid_arguments);
            return Err(EouError::invalid("promote", "null source"));
        }
        OwnershipMetrics::inc(&metrics.null_sources_tolerated);
        return Ok(None);
    };
    // SAFETY: forwarded caller contract.
    unsafe { HeapBlock::copy_from(source, size) }.map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promoted_bytes_match_at_distinct_address() {
        let stack = [1_u8, 2, 3, 4, 5, 6, 7, 8, 9];
        let block = promote_bytes(&stack).expect("promote");
        assert_eq!(block.len(), stack.len());
        assert_eq!(block.as_slice(), &stack);
        assert_ne!(block.as_ptr(), stack.as_ptr());
        assert_eq!(block.as_ptr() as usize % BLOCK_ALIGN, 0);
    }

    #[test]
    fn raw_promotion_copies_value_bytes() {
        let value = 0x0102_0304_0506_0708_i64;
        let src = ptr::from_ref(&value).cast::<c_void>();
        for level in [SafetyLevel::Tolerant, SafetyLevel::Strict] {
            // SAFETY: `src` points at a live, initialized i64.
            let block = unsafe { promote_with(level, src, size_of::<i64>()) }
                .expect("promote")
                .expect("non-null source");
            assert_eq!(block.as_slice(), &value.to_ne_bytes());
            // SAFETY: the block holds the bytes of an i64.
            assert_eq!(unsafe { block.read_as::<i64>() }, Some(value));
            assert_eq!(unsafe { block.read_as::<[i64; 2]>() }, None);
        }
    }

    #[test]
    fn tolerant_null_source_yields_no_block() {
        // SAFETY: null is handled before any read.
        let out = unsafe { promote_with(SafetyLevel::Tolerant, ptr::null(), 64) };
        assert!(matches!(out, Ok(None)));
    }

    #[test]
    fn strict_null_source_is_invalid_argument() {
        // SAFETY: null is handled before any read.
        let err = unsafe { promote_with(SafetyLevel::Strict, ptr::null(), 64) }
            .expect_err("strict null");
        assert_eq!(err, EouError::invalid("promote", "null source"));
    }

    #[test]
    fn zero_size_promotion_allocates_nothing() {
        let block = promote_bytes(&[]).expect("promote");
        assert!(block.is_empty());
        assert!(block.as_slice().is_empty());
        let (raw, len) = block.into_raw();
        assert!(raw.is_null());
        assert_eq!(len, 0);
        // SAFETY: null/zero is a documented no-op.
        unsafe { HeapBlock::release_raw(raw, len) };
    }

    #[test]
    fn oversized_request_is_invalid_layout() {
        let byte = 0_u8;
        // SAFETY: the layout is rejected before any read.
        let err = unsafe {
            promote_with(
                SafetyLevel::Tolerant,
                ptr::from_ref(&byte).cast::<c_void>(),
                usize::MAX,
            )
        }
        .expect_err("no layout");
        assert!(matches!(err, EouError::InvalidLayout { size: usize::MAX, .. }));
    }

    #[test]
    fn raw_round_trip_then_single_release() {
        let block = promote_bytes(b"heap").expect("promote");
        let (raw, len) = block.into_raw();
        assert!(!raw.is_null());
        // SAFETY: `(raw, len)` came from `into_raw` and is unreleased.
        let mut back = unsafe { HeapBlock::from_raw(raw, len) };
        back.as_mut_slice()[0] = b'H';
        assert_eq!(back.as_slice(), b"Heap");
        let (raw, len) = back.into_raw();
        // SAFETY: released exactly once.
        unsafe { HeapBlock::release_raw(raw, len) };
    }

    #[test]
    fn mutation_does_not_touch_source() {
        let source = [7_u8; 32];
        let mut block = promote_bytes(&source).expect("promote");
        block.as_mut_slice().fill(0);
        assert_eq!(source, [7_u8; 32]);
    }
}
