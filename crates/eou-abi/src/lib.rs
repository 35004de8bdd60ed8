//! C ABI preview entrypoints for the eou promoter.
//!
//! Symbols are namespaced `eou_*_preview` so they never collide with a host
//! allocator. C callers cannot receive an [`eou_core::EouError`], so every
//! rejected or empty promotion is reported as a null return; strict-mode
//! rejections still show up in the ownership metrics.
#![allow(clippy::missing_safety_doc)]

use std::ffi::{c_int, c_void};

use eou_core::{HeapBlock, SafetyLevel, global_metrics, promote, safety_level};

/// `eou_mode_preview` return value for the tolerant policy.
pub const EOU_MODE_TOLERANT: c_int = 0;
/// `eou_mode_preview` return value for the strict policy.
pub const EOU_MODE_STRICT: c_int = 1;

/// Copy `size` bytes at `src` into a fresh heap block.
///
/// Returns null for a null `src`, a zero `size`, or a size no allocation can
/// describe. A non-null result must be passed to
/// [`eou_block_release_preview`] exactly once, with the same `size`.
///
/// # Safety
///
/// A non-null `src` must be valid for reads of `size` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn eou_promote_preview(src: *const c_void, size: usize) -> *mut c_void {
    // SAFETY: forwarded caller contract.
    match unsafe { promote(src, size) } {
        Ok(Some(block)) => block.into_raw().0.cast::<c_void>(),
        Ok(None) | Err(_) => std::ptr::null_mut(),
    }
}

/// Release a block returned by [`eou_promote_preview`]. Null is a no-op.
///
/// # Safety
///
/// `ptr` must be null or an unreleased result of [`eou_promote_preview`]
/// called with the same `size`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn eou_block_release_preview(ptr: *mut c_void, size: usize) {
    // SAFETY: forwarded caller contract.
    unsafe { HeapBlock::release_raw(ptr.cast::<u8>(), size) };
}

/// The process-wide policy: [`EOU_MODE_TOLERANT`] or [`EOU_MODE_STRICT`].
#[unsafe(no_mangle)]
pub extern "C" fn eou_mode_preview() -> c_int {
    match safety_level() {
        SafetyLevel::Tolerant => EOU_MODE_TOLERANT,
        SafetyLevel::Strict => EOU_MODE_STRICT,
    }
}

/// Blocks promoted and not yet released, process-wide.
#[unsafe(no_mangle)]
pub extern "C" fn eou_live_blocks_preview() -> u64 {
    global_metrics().snapshot().live_blocks()
}
