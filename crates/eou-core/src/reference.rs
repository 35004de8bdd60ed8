//! Non-owning, reseatable reference with write-through access.
//!
//! A [`ReseatRef`] observes a `T` it does not own. It can be pointed at a
//! different `T` at any time ([`ReseatRef::reseat`] and friends), which
//! changes only the address it holds. Writing a value
//! ([`ReseatRef::write`]) goes through to the current referent. The two are
//! separate operations:
//!
//! ```
//! use eou_core::ReseatRef;
//!
//! let mut a = 1_i32;
//! let mut b = 2_i32;
//! let mut r = ReseatRef::new(&mut a);
//! r.write(10);                  // a = 10
//! r.reseat_to(&mut b);          // r now observes b; a untouched
//! assert_eq!(r.get(), 2);
//! ```
//!
//! Handles are `Copy`: duplicating one copies the address, never the value.
//! Because several handles may observe one referent, access follows `Cell`
//! rules (values in and out, no long-lived borrows) unless the caller opts
//! into [`ReseatRef::as_ref`]/[`ReseatRef::as_mut`].
//!
//! Handles built from references are lifetime-checked. Handles built from raw
//! or untyped pointers are not: using one after its referent's storage is
//! released is undefined behavior and entirely the caller's obligation.

#![allow(unsafe_code)]

use std::cell::Cell;
use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use crate::config::{SafetyLevel, safety_level};
use crate::error::EouError;
use crate::metrics::{OwnershipMetrics, global_metrics};

/// Reseatable, non-owning handle to a `T`.
pub struct ReseatRef<'a, T> {
    target: NonNull<T>,
    _referent: PhantomData<&'a Cell<T>>,
}

impl<'a, T> ReseatRef<'a, T> {
    /// Observe `target` for `'a`.
    #[must_use]
    pub fn new(target: &'a mut T) -> Self {
        Self::from_non_null(NonNull::from(target))
    }

    /// Observe a value that is already shared through a `Cell`.
    #[must_use]
    pub fn from_cell(target: &'a Cell<T>) -> Self {
        // `Cell<T>` has the same in-memory representation as `T`.
        Self::from_non_null(NonNull::from(target).cast::<T>())
    }

    /// Observe the `T` at `ptr`. Returns `None` for null.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must be valid for reads and writes of an initialized,
    /// aligned `T` for all of `'a`, and must not be accessed other than
    /// through `ReseatRef` handles while any of them is in use.
    #[must_use]
    pub unsafe fn from_raw(ptr: *mut T) -> Option<Self> {
        NonNull::new(ptr).map(Self::from_non_null)
    }

    /// Reinterpret an untyped pointer to `size` bytes as a `T`, under the
    /// process-wide [`SafetyLevel`].
    ///
    /// # Safety
    ///
    /// Same as [`ReseatRef::from_raw`]; in addition the bytes at `ptr` must
    /// form a valid `T`. Under [`SafetyLevel::Tolerant`] neither `size` nor
    /// alignment is checked.
    pub unsafe fn reinterpret(ptr: *mut c_void, size: usize) -> Result<Option<Self>, EouError> {
        // SAFETY: forwarded caller contract.
        unsafe { Self::reinterpret_with(safety_level(), ptr, size) }
    }

    /// [`ReseatRef::reinterpret`] with an explicit policy.
    ///
    /// - null `ptr`: `Err(InvalidArgument)` when strict, `Ok(None)` when
    ///   tolerant;
    /// - strict only: `size < size_of::<T>()` or a misaligned `ptr` is
    ///   `Err(InvalidArgument)`.
    ///
    /// # Safety
    ///
    /// See [`ReseatRef::reinterpret`].
    pub unsafe fn reinterpret_with(
        level: SafetyLevel,
        ptr: *mut c_void,
        size: usize,
    ) -> Result<Option<Self>, EouError> {
        let metrics = global_metrics();
        let Some(target) = NonNull::new(ptr.cast::<T>()) else {
            if level.rejects_invalid() {
                OwnershipMetrics::inc(&metrics.invalid_arguments);
                return Err(EouError::invalid("reinterpret", "null untyped pointer"));
            }
            OwnershipMetrics::inc(&metrics.null_sources_tolerated);
            return Ok(None);
        };

        if level.rejects_invalid() {
            if size < size_of::<T>() {
                OwnershipMetrics::inc(&metrics.invalid_arguments);
                return Err(EouError::invalid(
                    "reinterpret",
                    "size smaller than the target type",
                ));
            }
            if (target.as_ptr() as usize) % align_of::<T>() != 0 {
                OwnershipMetrics::inc(&metrics.invalid_arguments);
                return Err(EouError::invalid(
                    "reinterpret",
                    "pointer misaligned for the target type",
                ));
            }
        }

        OwnershipMetrics::inc(&metrics.reinterpretations);
        Ok(Some(Self::from_non_null(target)))
    }

    fn from_non_null(target: NonNull<T>) -> Self {
        Self {
            target,
            _referent: PhantomData,
        }
    }

    /// Observe whatever `other` observes. Only the address is copied.
    pub fn reseat(&mut self, other: ReseatRef<'a, T>) {
        self.target = other.target;
    }

    /// Observe `target` instead of the current referent.
    pub fn reseat_to(&mut self, target: &'a mut T) {
        self.target = NonNull::from(target);
    }

    /// Observe a `Cell`-shared value instead of the current referent.
    pub fn reseat_cell(&mut self, target: &'a Cell<T>) {
        self.target = NonNull::from(target).cast::<T>();
    }

    /// Observe the `T` at `ptr`. A null `ptr` leaves the handle unchanged and
    /// returns `false`.
    ///
    /// # Safety
    ///
    /// Same as [`ReseatRef::from_raw`].
    pub unsafe fn reseat_raw(&mut self, ptr: *mut T) -> bool {
        match NonNull::new(ptr) {
            Some(target) => {
                self.target = target;
                true
            }
            None => false,
        }
    }

    /// Write `value` through to the referent (`*target = value`). The
    /// previous value is dropped; the handle keeps its address.
    pub fn write(&self, value: T) {
        drop(self.replace(value));
    }

    /// Write `value` through and return the previous referent value.
    pub fn replace(&self, value: T) -> T {
        // SAFETY: the target is valid for reads and writes for `'a`, and no
        // reference into it is live (access is value-in/value-out).
        unsafe { ptr::replace(self.target.as_ptr(), value) }
    }

    /// Copy of the referent.
    #[must_use]
    pub fn get(&self) -> T
    where
        T: Copy,
    {
        // SAFETY: as in `replace`.
        unsafe { self.target.as_ptr().read() }
    }

    /// Read-modify-write through the reference.
    pub fn update(&self, f: impl FnOnce(T) -> T)
    where
        T: Copy,
    {
        self.write(f(self.get()));
    }

    /// The referent's address.
    #[must_use]
    pub fn as_ptr(&self) -> *mut T {
        self.target.as_ptr()
    }

    /// Returns true if both handles observe the same address.
    #[must_use]
    pub fn same_target(&self, other: &ReseatRef<'_, T>) -> bool {
        self.target == other.target
    }

    /// Borrow the referent.
    ///
    /// # Safety
    ///
    /// No write may go through any handle to the same referent while the
    /// returned borrow is live.
    #[must_use]
    pub unsafe fn as_ref(&self) -> &T {
        // SAFETY: caller guarantees no concurrent writes; target is valid.
        unsafe { self.target.as_ref() }
    }

    /// Mutably borrow the referent.
    ///
    /// # Safety
    ///
    /// No other access may go through any handle to the same referent while
    /// the returned borrow is live.
    #[allow(clippy::mut_from_ref)]
    #[must_use]
    pub unsafe fn as_mut(&self) -> &mut T {
        // SAFETY: caller guarantees exclusivity; target is valid.
        unsafe { &mut *self.target.as_ptr() }
    }
}

impl<T> Clone for ReseatRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ReseatRef<'_, T> {}

impl<'a, T> From<&'a mut T> for ReseatRef<'a, T> {
    fn from(target: &'a mut T) -> Self {
        Self::new(target)
    }
}

impl<T> From<ReseatRef<'_, T>> for *mut T {
    fn from(reference: ReseatRef<'_, T>) -> Self {
        reference.as_ptr()
    }
}

impl<T> fmt::Debug for ReseatRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReseatRef").field(&self.target).finish()
    }
}

impl<T> fmt::Pointer for ReseatRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.target, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_equals_referent() {
        let mut v = 42_i64;
        let r = ReseatRef::new(&mut v);
        assert_eq!(r.get(), 42);
    }

    #[test]
    fn write_mutates_in_place() {
        let mut v = 1_i64;
        let addr = ptr::from_mut(&mut v);
        {
            let r = ReseatRef::new(&mut v);
            r.write(99);
            assert_eq!(r.as_ptr(), addr, "write must not reseat");
            assert_eq!(r.get(), 99);
        }
        assert_eq!(v, 99);
    }

    #[test]
    fn reseat_leaves_old_target_untouched() {
        let mut a = 1_i32;
        let mut b = 2_i32;
        {
            let mut r = ReseatRef::new(&mut a);
            r.reseat_to(&mut b);
            assert_eq!(r.get(), 2);
            r.write(20);
        }
        assert_eq!(a, 1);
        assert_eq!(b, 20);
    }

    #[test]
    fn reseat_from_other_copies_address_only() {
        let a = Cell::new(5_u32);
        let b = Cell::new(6_u32);
        let mut r = ReseatRef::from_cell(&a);
        let other = ReseatRef::from_cell(&b);

        r.reseat(other);
        assert!(r.same_target(&other));
        assert_eq!(a.get(), 5, "reseat must not copy the value");
        r.write(60);
        assert_eq!(b.get(), 60);
        assert_eq!(other.get(), 60);
    }

    #[test]
    fn copies_alias_the_same_referent() {
        let cell = Cell::new(String::from("a"));
        let r1 = ReseatRef::from_cell(&cell);
        let r2 = r1;
        r2.write(String::from("b"));
        assert_eq!(r1.replace(String::new()), "b");
        assert_eq!(cell.take(), "");
    }

    #[test]
    fn update_applies_through_reference() {
        let mut v = 3_u8;
        let r = ReseatRef::new(&mut v);
        r.update(|x| x * 2);
        assert_eq!(r.get(), 6);
    }

    #[test]
    fn pointer_decay_and_formatting() {
        let mut v = 0_u16;
        let expected = ptr::from_mut(&mut v);
        let r = ReseatRef::new(&mut v);
        let raw: *mut u16 = r.into();
        assert_eq!(raw, expected);
        assert_eq!(format!("{r:p}"), format!("{expected:p}"));
    }

    #[test]
    fn raw_construction_and_null_reseat() {
        let mut a = 7_i32;
        let mut b = 8_i32;
        let pa = ptr::from_mut(&mut a);
        let pb = ptr::from_mut(&mut b);

        // SAFETY: null is rejected without being dereferenced.
        assert!(unsafe { ReseatRef::<i32>::from_raw(ptr::null_mut()) }.is_none());

        // SAFETY: `pa`/`pb` point at live locals accessed only through the handle.
        let mut r = unsafe { ReseatRef::from_raw(pa) }.expect("non-null");
        assert_eq!(r.get(), 7);
        assert!(!unsafe { r.reseat_raw(ptr::null_mut()) });
        assert_eq!(r.as_ptr(), pa);
        assert!(unsafe { r.reseat_raw(pb) });
        assert_eq!(r.get(), 8);
    }

    #[test]
    fn deref_forwards_to_referent() {
        let mut pair = (1_u8, 2_u8);
        let r = ReseatRef::new(&mut pair);
        // SAFETY: no writes through other handles while borrowed.
        unsafe {
            assert_eq!(r.as_ref().1, 2);
            r.as_mut().0 = 10;
        }
        assert_eq!(r.get(), (10, 2));
    }

    #[test]
    fn reinterpret_tolerant_null_is_none() {
        // SAFETY: null is rejected before any access.
        let out = unsafe {
            ReseatRef::<u64>::reinterpret_with(SafetyLevel::Tolerant, ptr::null_mut(), 8)
        };
        assert!(matches!(out, Ok(None)));
    }

    #[test]
    fn reinterpret_strict_rejects_null_and_undersized() {
        // SAFETY: null is rejected before any access.
        let err = unsafe {
            ReseatRef::<u64>::reinterpret_with(SafetyLevel::Strict, ptr::null_mut(), 8)
        }
        .expect_err("strict null");
        assert!(err.is_invalid_argument());

        let mut v = 0_u64;
        let p = ptr::from_mut(&mut v).cast::<c_void>();
        // SAFETY: rejected before any access.
        let err = unsafe { ReseatRef::<u64>::reinterpret_with(SafetyLevel::Strict, p, 4) }
            .expect_err("strict undersized");
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn reinterpret_strict_rejects_misaligned() {
        let mut words = [0_u64; 2];
        let p = words.as_mut_ptr().cast::<u8>().wrapping_add(1).cast::<c_void>();
        // SAFETY: rejected before any access.
        let err = unsafe { ReseatRef::<u64>::reinterpret_with(SafetyLevel::Strict, p, 8) }
            .expect_err("strict misaligned");
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn reinterpret_valid_pointer_reads_and_writes() {
        let mut v = 0x1122_3344_u32;
        let p = ptr::from_mut(&mut v).cast::<c_void>();
        for level in [SafetyLevel::Tolerant, SafetyLevel::Strict] {
            // SAFETY: `p` points at a live, aligned u32 used only via the handle.
            let r = unsafe { ReseatRef::<u32>::reinterpret_with(level, p, 4) }
                .expect("valid")
                .expect("non-null");
            assert_eq!(r.get(), 0x1122_3344);
        }
        // SAFETY: as above.
        let r = unsafe { ReseatRef::<u32>::reinterpret_with(SafetyLevel::Tolerant, p, 4) }
            .expect("valid")
            .expect("non-null");
        r.write(5);
        assert_eq!(v, 5);
    }
}
